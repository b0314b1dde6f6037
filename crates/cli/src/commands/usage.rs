//! `tollgate usage` — print the usage snapshot of a running gateway.

pub async fn run(base_url: &str, token: &str) -> Result<(), Box<dyn std::error::Error>> {
    let url = format!("{}/v1/usage", base_url.trim_end_matches('/'));

    let response = reqwest::Client::new()
        .get(&url)
        .header("Authorization", format!("Bearer {token}"))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(format!("gateway returned {status}: {body}").into());
    }

    let usage: serde_json::Value = response.json().await?;

    println!("📊 Usage Snapshot");
    println!("─────────────────────────────────────");
    println!("  Account:         {}", usage["account_id"].as_str().unwrap_or("?"));
    println!("  Tier:            {}", usage["tier"].as_str().unwrap_or("?"));
    println!("  Active:          {}", usage["active"]);
    println!("  Credits left:    {}", usage["available"]);
    println!("  Lifetime grants: {}", usage["lifetime_granted"]);
    println!("  Deficit:         {}", usage["deficit"]);
    println!("  Queries:         {}", usage["queries"]);
    println!("  Input tokens:    {}", usage["input_tokens"]);
    println!("  Output tokens:   {}", usage["output_tokens"]);
    println!("  Credits spent:   {}", usage["credits_spent"]);

    Ok(())
}
