//! Helper functions

use anyhow::{Context, Result};
use solana_sdk::signature::Keypair;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

/// `base * 2^attempt`, with the exponent capped so the delay stays bounded
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.pow(attempt.min(6))
}

pub fn load_keypair(path: &Path) -> Result<Keypair> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read keypair file: {:?}", path))?;

    let bytes: Vec<u8> = serde_json::from_str(&content)
        .with_context(|| "Failed to parse keypair JSON")?;

    Keypair::from_bytes(&bytes)
        .map_err(|e| anyhow::anyhow!("Invalid keypair: {}", e))
}

pub fn load_keypair_from_env_or_file(env_var: &str, file_path: &Path) -> Result<Keypair> {
    if let Ok(key_str) = std::env::var(env_var) {
        if let Ok(bytes) = serde_json::from_str::<Vec<u8>>(&key_str) {
            return Keypair::from_bytes(&bytes)
                .map_err(|e| anyhow::anyhow!("Invalid keypair from env: {}", e));
        }
        if let Ok(bytes) = bs58::decode(&key_str).into_vec() {
            return Keypair::from_bytes(&bytes)
                .map_err(|e| anyhow::anyhow!("Invalid keypair from env: {}", e));
        }
    }
    load_keypair(file_path)
}

/// Retry `operation` while `should_retry` accepts the error, doubling the
/// delay after each failure.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    mut operation: F,
    max_retries: u32,
    initial_delay_ms: u64,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut delay = initial_delay_ms;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_retries && should_retry(&e) => {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
