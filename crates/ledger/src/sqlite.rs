//! SQLite ledger store.
//!
//! A single `usage_records` table with a UNIQUE constraint on the query
//! id. Idempotency is the database's job: a replayed insert hits the
//! constraint, does nothing, and the original row is returned.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tollgate_core::{
    AccountId, AccountUsageTotals, LedgerError, LedgerStore, SettlementStatus, UsageRecord,
};
use tracing::{debug, info};

/// A durable SQLite-backed ledger store.
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    /// Open (or create) the database at `path` and run migrations.
    /// Pass `"sqlite::memory:"` for an ephemeral database in tests.
    pub async fn new(path: &str) -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| LedgerError::Storage(format!("invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| LedgerError::Storage(format!("failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite ledger store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS usage_records (
                id            TEXT PRIMARY KEY,
                query_id      TEXT UNIQUE NOT NULL,
                account_id    TEXT NOT NULL,
                input_tokens  INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                cost          INTEGER NOT NULL,
                status        TEXT NOT NULL DEFAULT 'pending',
                created_at    TEXT NOT NULL,
                flushed_at    TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(format!("usage_records table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_usage_status_created
             ON usage_records(status, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(format!("status index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_usage_account ON usage_records(account_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(format!("account index: {e}")))?;

        debug!("ledger migrations complete");
        Ok(())
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<UsageRecord, LedgerError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| LedgerError::Storage(format!("id column: {e}")))?;
        let query_id: String = row
            .try_get("query_id")
            .map_err(|e| LedgerError::Storage(format!("query_id column: {e}")))?;
        let account_id: String = row
            .try_get("account_id")
            .map_err(|e| LedgerError::Storage(format!("account_id column: {e}")))?;
        let input_tokens: i64 = row
            .try_get("input_tokens")
            .map_err(|e| LedgerError::Storage(format!("input_tokens column: {e}")))?;
        let output_tokens: i64 = row
            .try_get("output_tokens")
            .map_err(|e| LedgerError::Storage(format!("output_tokens column: {e}")))?;
        let cost: i64 = row
            .try_get("cost")
            .map_err(|e| LedgerError::Storage(format!("cost column: {e}")))?;
        let status_str: String = row
            .try_get("status")
            .map_err(|e| LedgerError::Storage(format!("status column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| LedgerError::Storage(format!("created_at column: {e}")))?;
        let flushed_at_str: Option<String> = row
            .try_get("flushed_at")
            .map_err(|e| LedgerError::Storage(format!("flushed_at column: {e}")))?;

        let status = match status_str.as_str() {
            "settled" => SettlementStatus::Settled,
            "failed" => SettlementStatus::Failed,
            _ => SettlementStatus::Pending,
        };

        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let flushed_at = flushed_at_str.and_then(|s| {
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        });

        Ok(UsageRecord {
            id,
            query_id,
            account_id: AccountId(account_id),
            input_tokens: input_tokens as u32,
            output_tokens: output_tokens as u32,
            cost: cost as u64,
            status,
            created_at,
            flushed_at,
        })
    }

    fn status_str(status: SettlementStatus) -> &'static str {
        match status {
            SettlementStatus::Pending => "pending",
            SettlementStatus::Settled => "settled",
            SettlementStatus::Failed => "failed",
        }
    }

    /// Build a `?` placeholder list for an id set.
    fn placeholders(count: usize) -> String {
        (1..=count)
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert_if_absent(&self, record: UsageRecord) -> Result<UsageRecord, LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO usage_records
                (id, query_id, account_id, input_tokens, output_tokens, cost, status, created_at, flushed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(query_id) DO NOTHING
            "#,
        )
        .bind(&record.id)
        .bind(&record.query_id)
        .bind(record.account_id.as_str())
        .bind(record.input_tokens as i64)
        .bind(record.output_tokens as i64)
        .bind(record.cost as i64)
        .bind(Self::status_str(record.status))
        .bind(record.created_at.to_rfc3339())
        .bind(record.flushed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(format!("INSERT failed: {e}")))?;

        // First insert or replay, the row for this query id is the truth.
        let stored = self.get_by_query(&record.query_id).await?;
        stored.ok_or_else(|| LedgerError::Storage("record vanished after insert".into()))
    }

    async fn get_by_query(&self, query_id: &str) -> Result<Option<UsageRecord>, LedgerError> {
        let row = sqlx::query("SELECT * FROM usage_records WHERE query_id = ?1")
            .bind(query_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LedgerError::Storage(format!("SELECT by query id: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(Self::row_to_record(r)?)),
            None => Ok(None),
        }
    }

    async fn unflushed(&self, limit: usize) -> Result<Vec<UsageRecord>, LedgerError> {
        let rows = sqlx::query(
            "SELECT * FROM usage_records WHERE status != 'settled'
             ORDER BY created_at ASC, id ASC LIMIT ?1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(format!("unflushed scan: {e}")))?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn mark_settled(
        &self,
        record_ids: &[String],
        flushed_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if record_ids.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "UPDATE usage_records SET status = 'settled', flushed_at = ?{} WHERE id IN ({})",
            record_ids.len() + 1,
            Self::placeholders(record_ids.len()),
        );

        let mut query = sqlx::query(&sql);
        for id in record_ids {
            query = query.bind(id);
        }
        query = query.bind(flushed_at.to_rfc3339());

        query
            .execute(&self.pool)
            .await
            .map_err(|e| LedgerError::Storage(format!("mark settled: {e}")))?;
        Ok(())
    }

    async fn mark_failed(&self, record_ids: &[String]) -> Result<(), LedgerError> {
        if record_ids.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "UPDATE usage_records SET status = 'failed'
             WHERE status != 'settled' AND id IN ({})",
            Self::placeholders(record_ids.len()),
        );

        let mut query = sqlx::query(&sql);
        for id in record_ids {
            query = query.bind(id);
        }

        query
            .execute(&self.pool)
            .await
            .map_err(|e| LedgerError::Storage(format!("mark failed: {e}")))?;
        Ok(())
    }

    async fn account_totals(
        &self,
        account_id: &AccountId,
    ) -> Result<AccountUsageTotals, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS cnt,
                   COALESCE(SUM(input_tokens), 0) AS input_tokens,
                   COALESCE(SUM(output_tokens), 0) AS output_tokens,
                   COALESCE(SUM(cost), 0) AS credits
            FROM usage_records WHERE account_id = ?1
            "#,
        )
        .bind(account_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(format!("totals query: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| LedgerError::Storage(format!("cnt column: {e}")))?;
        let input_tokens: i64 = row
            .try_get("input_tokens")
            .map_err(|e| LedgerError::Storage(format!("input_tokens sum: {e}")))?;
        let output_tokens: i64 = row
            .try_get("output_tokens")
            .map_err(|e| LedgerError::Storage(format!("output_tokens sum: {e}")))?;
        let credits: i64 = row
            .try_get("credits")
            .map_err(|e| LedgerError::Storage(format!("credits sum: {e}")))?;

        Ok(AccountUsageTotals {
            record_count: cnt as u64,
            input_tokens: input_tokens as u64,
            output_tokens: output_tokens as u64,
            credits: credits as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteLedgerStore {
        SqliteLedgerStore::new("sqlite::memory:").await.unwrap()
    }

    fn record(query_id: &str, cost: u64) -> UsageRecord {
        UsageRecord::new(query_id, AccountId("acct-1".into()), 100, 50, cost)
    }

    #[tokio::test]
    async fn insert_and_fetch() {
        let store = test_store().await;
        let stored = store.insert_if_absent(record("q-1", 3)).await.unwrap();
        assert_eq!(stored.query_id, "q-1");
        assert_eq!(stored.status, SettlementStatus::Pending);

        let fetched = store.get_by_query("q-1").await.unwrap().unwrap();
        assert_eq!(fetched.id, stored.id);
        assert_eq!(fetched.cost, 3);
    }

    #[tokio::test]
    async fn replay_returns_original_row() {
        let store = test_store().await;
        let first = store.insert_if_absent(record("q-1", 3)).await.unwrap();
        let replay = store.insert_if_absent(record("q-1", 99)).await.unwrap();

        assert_eq!(replay.id, first.id);
        assert_eq!(replay.cost, 3);
    }

    #[tokio::test]
    async fn unflushed_excludes_settled() {
        let store = test_store().await;
        let a = store.insert_if_absent(record("q-a", 1)).await.unwrap();
        store.insert_if_absent(record("q-b", 1)).await.unwrap();

        store.mark_settled(&[a.id], Utc::now()).await.unwrap();

        let pending = store.unflushed(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].query_id, "q-b");
    }

    #[tokio::test]
    async fn failed_records_remain_eligible() {
        let store = test_store().await;
        let r = store.insert_if_absent(record("q-1", 1)).await.unwrap();
        store.mark_failed(&[r.id.clone()]).await.unwrap();

        let stored = store.get_by_query("q-1").await.unwrap().unwrap();
        assert_eq!(stored.status, SettlementStatus::Failed);

        let pending = store.unflushed(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, r.id);
    }

    #[tokio::test]
    async fn mark_failed_never_downgrades_settled() {
        let store = test_store().await;
        let r = store.insert_if_absent(record("q-1", 1)).await.unwrap();
        store
            .mark_settled(&[r.id.clone()], Utc::now())
            .await
            .unwrap();
        store.mark_failed(&[r.id]).await.unwrap();

        let stored = store.get_by_query("q-1").await.unwrap().unwrap();
        assert_eq!(stored.status, SettlementStatus::Settled);
    }

    #[tokio::test]
    async fn totals_by_account() {
        let store = test_store().await;
        store.insert_if_absent(record("q-1", 3)).await.unwrap();
        store.insert_if_absent(record("q-2", 4)).await.unwrap();

        let mut other = record("q-3", 9);
        other.account_id = AccountId("acct-2".into());
        store.insert_if_absent(other).await.unwrap();

        let totals = store
            .account_totals(&AccountId("acct-1".into()))
            .await
            .unwrap();
        assert_eq!(totals.record_count, 2);
        assert_eq!(totals.credits, 7);
        assert_eq!(totals.input_tokens, 200);
    }

    #[tokio::test]
    async fn totals_for_unknown_account_are_zero() {
        let store = test_store().await;
        let totals = store
            .account_totals(&AccountId("nobody".into()))
            .await
            .unwrap();
        assert_eq!(totals.record_count, 0);
        assert_eq!(totals.credits, 0);
    }

    #[tokio::test]
    async fn flushed_at_round_trip() {
        let store = test_store().await;
        let r = store.insert_if_absent(record("q-1", 1)).await.unwrap();
        let when = Utc::now();
        store.mark_settled(&[r.id], when).await.unwrap();

        let stored = store.get_by_query("q-1").await.unwrap().unwrap();
        let flushed = stored.flushed_at.unwrap();
        assert!((flushed - when).num_seconds().abs() < 2);
    }
}
