//! Smoke check against a running gateway

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::executor::ExecuteResponse;

/// Headroom on top of the execution timeout for the whole HTTP exchange
const CLIENT_SLACK_SECS: u64 = 30;

const SAMPLE_CODE: &str = r#"
print("Hello from E2B!")
import math
result = math.sqrt(16)
print(f"Square root of 16 is: {result}")

# Test with some data processing
data = [1, 2, 3, 4, 5]
squared = [x**2 for x in data]
print(f"Squared numbers: {squared}")
"#;

/// Hit `/health`, `/` and `/execute` and print what comes back.
/// Fails when the service is unreachable or the execution reports failure.
pub async fn run(base_url: &str, timeout: u64) -> Result<()> {
    let base_url = base_url.trim_end_matches('/');
    let client = Client::builder()
        .timeout(client_timeout(timeout))
        .build()?;

    println!("Testing health endpoint...");
    let response = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .context("Health request failed")?;
    let status = response.status();
    let body: Value = response.json().await?;
    println!("Health: {} - {}", status.as_u16(), body);

    println!("\nTesting root endpoint...");
    let response = client.get(format!("{}/", base_url)).send().await?;
    let status = response.status();
    let body: Value = response.json().await?;
    println!("Root: {} - {}", status.as_u16(), body);

    println!("\nTesting code execution...");
    let response = client
        .post(format!("{}/execute", base_url))
        .json(&json!({ "code": SAMPLE_CODE, "timeout": timeout }))
        .send()
        .await
        .context("Execute request failed")?;
    let status = response.status();
    println!("Execute: {}", status.as_u16());
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Execute returned {}: {}", status, body);
    }

    let result: ExecuteResponse = response.json().await?;
    println!("Success: {}", result.success);
    println!("Output: {}", result.output);
    if let Some(error) = &result.error {
        println!("Error: {}", error);
    }
    match result.execution_time {
        Some(secs) => println!("Execution time: {:.3} seconds", secs),
        None => println!("Execution time: n/a"),
    }

    if !result.success {
        anyhow::bail!("Execution failed");
    }
    Ok(())
}

fn client_timeout(timeout: u64) -> Duration {
    Duration::from_secs(timeout.saturating_add(CLIENT_SLACK_SECS))
}
