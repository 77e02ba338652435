use super::util::{parse_json, with_retry};
use crate::core::priority::{PaymentTypePriorityMap, PrioritySource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Priority document served over HTTP as
/// `{"<payment type>": {"<provider id>": <priority>}}`.
pub struct HttpPrioritySource {
    client: reqwest::Client,
    url: String,
}

impl HttpPrioritySource {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl PrioritySource for HttpPrioritySource {
    async fn fetch(&self) -> Result<PaymentTypePriorityMap> {
        debug!("Fetching provider priorities from {}", self.url);
        let response = with_retry(
            || async move {
                Ok(self
                    .client
                    .get(&self.url)
                    .send()
                    .await?
                    .error_for_status()?)
            },
            2,
            Duration::from_millis(250),
        )
        .await
        .context("Priority request failed")?;

        parse_json(response, "priority document").await
    }
}
