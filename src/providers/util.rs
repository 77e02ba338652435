use anyhow::Result;
use reqwest::Response;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error};

/// Retries an async operation, doubling the delay after every failure.
///
/// Total runs are `1 + retries`. Only used for one-off documents; quote
/// requests are never retried.
pub async fn with_retry<F, Fut, T>(mut operation: F, retries: usize, delay: Duration) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    let mut delay = delay;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) if attempt > retries => return Err(err),
            Err(err) => {
                debug!("Attempt {attempt}/{retries} failed: {err:#}. Retrying...");
                attempt += 1;
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
}

/// Reads the body and parses it, logging the raw body when it is not the
/// expected shape.
pub async fn parse_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        error!(error = ?e, response = %text, "Failed to parse {what}");
        anyhow::Error::new(e).context(format!("Failed to parse {what}"))
    })
}
