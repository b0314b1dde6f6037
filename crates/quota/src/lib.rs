//! Quota store — per-account credit counters with atomic
//! reserve / settle / release.
//!
//! A reservation is an optimistic hold: the available balance is
//! decremented before any paid work begins, so concurrent requests from
//! the same account can never overdraw. Settlement reconciles the
//! estimate to the metered cost; release restores the full hold when
//! downstream work fails before any tokens were consumed.
//!
//! Concurrency discipline: the account registry is a read-mostly
//! `RwLock`; each account's counters sit behind their own `Mutex`
//! (single-writer-per-account). There is no process-wide lock on the
//! balance path, and no two locks are ever held at once.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tollgate_core::{Account, AccountId, QuotaError, Tier};
use tracing::{debug, error, info};

/// A provisional hold against an account's balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique reservation id.
    pub id: String,
    /// The account charged.
    pub account_id: AccountId,
    /// Credits held.
    pub amount: u64,
}

/// Outcome of settling a reservation to its actual cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    /// The metered cost that was charged.
    pub actual_cost: u64,
    /// Credits returned to the account (estimate exceeded actual).
    pub refunded: u64,
    /// Extra credits taken beyond the reservation (actual exceeded estimate).
    pub extra_charged: u64,
    /// Portion of the extra charge the balance could not cover. Nonzero
    /// means the account's billing-deficit flag was raised.
    pub deficit_incurred: u64,
}

/// A point-in-time view of one account's balance, for the usage endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub account_id: AccountId,
    pub tier: Tier,
    pub active: bool,
    pub available: u64,
    pub lifetime_granted: u64,
    /// Accumulated uncovered overdraw. Operational signal, never shown
    /// to callers in error responses.
    pub deficit: u64,
}

/// Per-account mutable state. Only ever touched under its own mutex.
struct AccountState {
    account: Account,
    available: u64,
    lifetime_granted: u64,
    deficit: u64,
}

/// The quota store.
pub struct QuotaStore {
    accounts: RwLock<HashMap<AccountId, Arc<Mutex<AccountState>>>>,
    reservations: Mutex<HashMap<String, Reservation>>,
    initial_grant: u64,
}

impl QuotaStore {
    /// Create a store granting `initial_grant` credits to new accounts.
    pub fn new(initial_grant: u64) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            reservations: Mutex::new(HashMap::new()),
            initial_grant,
        }
    }

    // ── Account registry ─────────────────────────────────────────────

    /// Create a new account with the configured initial grant.
    pub fn create_account(&self, name: impl Into<String>, tier: Tier) -> Account {
        let account = Account::new(name, tier);
        let state = AccountState {
            account: account.clone(),
            available: self.initial_grant,
            lifetime_granted: self.initial_grant,
            deficit: 0,
        };
        self.accounts
            .write()
            .expect("accounts lock poisoned")
            .insert(account.id.clone(), Arc::new(Mutex::new(state)));
        info!(account = %account.id, tier = %account.tier, grant = self.initial_grant, "account created");
        account
    }

    /// Register an existing account with an explicit grant. Fails if the
    /// id is already registered.
    pub fn register(&self, account: Account, grant: u64) -> Result<(), QuotaError> {
        let mut accounts = self.accounts.write().expect("accounts lock poisoned");
        if accounts.contains_key(&account.id) {
            return Err(QuotaError::AccountExists(account.id.to_string()));
        }
        let id = account.id.clone();
        accounts.insert(
            id,
            Arc::new(Mutex::new(AccountState {
                account,
                available: grant,
                lifetime_granted: grant,
                deficit: 0,
            })),
        );
        Ok(())
    }

    /// Top up an account's balance.
    pub fn grant(&self, account_id: &AccountId, credits: u64) -> Result<u64, QuotaError> {
        let state = self.account_state(account_id)?;
        let mut state = state.lock().expect("account lock poisoned");
        state.available = state.available.saturating_add(credits);
        state.lifetime_granted = state.lifetime_granted.saturating_add(credits);
        Ok(state.available)
    }

    /// Deactivate an account. History is kept; new reservations fail.
    pub fn deactivate(&self, account_id: &AccountId) -> Result<(), QuotaError> {
        let state = self.account_state(account_id)?;
        let mut state = state.lock().expect("account lock poisoned");
        state.account.active = false;
        Ok(())
    }

    /// A point-in-time balance view.
    pub fn snapshot(&self, account_id: &AccountId) -> Result<BalanceSnapshot, QuotaError> {
        let state = self.account_state(account_id)?;
        let state = state.lock().expect("account lock poisoned");
        Ok(BalanceSnapshot {
            account_id: state.account.id.clone(),
            tier: state.account.tier,
            active: state.account.active,
            available: state.available,
            lifetime_granted: state.lifetime_granted,
            deficit: state.deficit,
        })
    }

    // ── Reserve / settle / release ───────────────────────────────────

    /// Atomically hold `estimated_cost` credits against the account.
    ///
    /// The decrement happens before any paid work, so the available
    /// balance can never be observed below zero no matter how requests
    /// interleave.
    pub fn reserve(
        &self,
        account_id: &AccountId,
        estimated_cost: u64,
    ) -> Result<Reservation, QuotaError> {
        let state = self.account_state(account_id)?;

        {
            let mut state = state.lock().expect("account lock poisoned");
            if !state.account.active {
                return Err(QuotaError::AccountInactive(account_id.to_string()));
            }
            if state.available < estimated_cost {
                return Err(QuotaError::InsufficientCredit {
                    requested: estimated_cost,
                    available: state.available,
                });
            }
            state.available -= estimated_cost;
        }

        let reservation = Reservation {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.clone(),
            amount: estimated_cost,
        };
        self.reservations
            .lock()
            .expect("reservations lock poisoned")
            .insert(reservation.id.clone(), reservation.clone());

        debug!(account = %account_id, reservation = %reservation.id, amount = estimated_cost, "reserved");
        Ok(reservation)
    }

    /// Reconcile a reservation to the actual metered cost.
    ///
    /// Refunds the unused portion, or charges the shortfall when the
    /// actual cost exceeded the estimate. An extra charge the balance
    /// cannot cover still completes — the request was already served —
    /// but clamps at zero and raises the account's deficit flag.
    pub fn settle(
        &self,
        reservation_id: &str,
        actual_cost: u64,
    ) -> Result<Settlement, QuotaError> {
        let reservation = self.take_reservation(reservation_id)?;
        let state = self.account_state(&reservation.account_id)?;
        let mut state = state.lock().expect("account lock poisoned");

        let settlement = if actual_cost <= reservation.amount {
            let refund = reservation.amount - actual_cost;
            state.available += refund;
            Settlement {
                actual_cost,
                refunded: refund,
                extra_charged: 0,
                deficit_incurred: 0,
            }
        } else {
            let extra = actual_cost - reservation.amount;
            let covered = extra.min(state.available);
            let shortfall = extra - covered;
            state.available -= covered;
            if shortfall > 0 {
                state.deficit += shortfall;
                // Operational alert: the caller already got their answer,
                // so this is never surfaced in the response.
                error!(
                    account = %reservation.account_id,
                    reservation = %reservation.id,
                    shortfall,
                    "billing deficit raised during settlement"
                );
            }
            Settlement {
                actual_cost,
                refunded: 0,
                extra_charged: covered,
                deficit_incurred: shortfall,
            }
        };

        debug!(
            account = %reservation.account_id,
            reservation = %reservation.id,
            actual_cost,
            refunded = settlement.refunded,
            "settled"
        );
        Ok(settlement)
    }

    /// Restore the full reservation after a downstream failure that
    /// consumed no tokens.
    pub fn release(&self, reservation_id: &str) -> Result<(), QuotaError> {
        let reservation = self.take_reservation(reservation_id)?;
        let state = self.account_state(&reservation.account_id)?;
        let mut state = state.lock().expect("account lock poisoned");
        state.available += reservation.amount;
        debug!(account = %reservation.account_id, reservation = %reservation.id, amount = reservation.amount, "released");
        Ok(())
    }

    /// Number of reservations currently outstanding.
    pub fn outstanding_reservations(&self) -> usize {
        self.reservations
            .lock()
            .expect("reservations lock poisoned")
            .len()
    }

    // ── Internals ────────────────────────────────────────────────────

    fn account_state(&self, account_id: &AccountId) -> Result<Arc<Mutex<AccountState>>, QuotaError> {
        self.accounts
            .read()
            .expect("accounts lock poisoned")
            .get(account_id)
            .cloned()
            .ok_or_else(|| QuotaError::UnknownAccount(account_id.to_string()))
    }

    fn take_reservation(&self, reservation_id: &str) -> Result<Reservation, QuotaError> {
        self.reservations
            .lock()
            .expect("reservations lock poisoned")
            .remove(reservation_id)
            .ok_or_else(|| QuotaError::UnknownReservation(reservation_id.to_string()))
    }
}
