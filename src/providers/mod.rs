pub mod http_provider;
pub mod priority;
pub mod util;

use crate::core::cache::{KeyValueCollection, Store};
use crate::core::config::AppConfig;
use crate::core::priority::{PrioritySource, StaticPrioritySource};
use crate::core::provider::RampProvider;
use http_provider::HttpRampProvider;
use priority::HttpPrioritySource;
use std::sync::Arc;
use tracing::{debug, warn};

/// Collaborators handed to a provider when it is created.
pub struct ProviderInit {
    pub id: String,
    pub display_name: Option<String>,
    pub base_url: String,
    pub api_key: Option<String>,
    pub client: reqwest::Client,
    /// Private to the provider, scoped by its store id.
    pub store: Arc<dyn KeyValueCollection>,
}

/// Creates every enabled provider from configuration.
///
/// Providers missing a required API key are skipped rather than failing the
/// whole run.
pub fn initialize_providers(
    config: &AppConfig,
    store: &dyn Store,
    client: &reqwest::Client,
) -> Vec<Arc<dyn RampProvider>> {
    let mut providers: Vec<Arc<dyn RampProvider>> = Vec::new();
    for provider_config in &config.providers {
        if !provider_config.enabled {
            debug!("Provider {} is disabled", provider_config.id);
            continue;
        }
        if provider_config.requires_api_key && provider_config.api_key.is_none() {
            warn!("Skipping provider {}: missing API key", provider_config.id);
            continue;
        }

        let store_id = provider_config.store_id();
        let Some(collection) = store
            .get_collection(store_id, true, true)
            .or_else(|| store.get_collection(store_id, false, true))
        else {
            warn!("Skipping provider {}: no store available", provider_config.id);
            continue;
        };

        providers.push(Arc::new(HttpRampProvider::new(ProviderInit {
            id: provider_config.id.clone(),
            display_name: provider_config.display_name.clone(),
            base_url: provider_config.base_url.clone(),
            api_key: provider_config.api_key.clone(),
            client: client.clone(),
            store: collection,
        })));
    }
    debug!("Initialized {} providers", providers.len());
    providers
}

/// Remote document when a URL is configured, otherwise the inline one.
pub fn priority_source(config: &AppConfig, client: &reqwest::Client) -> Box<dyn PrioritySource> {
    match &config.priority.url {
        Some(url) => Box::new(HttpPrioritySource::new(client.clone(), url)),
        None => Box::new(StaticPrioritySource::new(config.priority.document.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KeyValueStore;

    fn parse_config(yaml: &str) -> AppConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_initialize_skips_disabled_and_keyless() {
        let config = parse_config(
            r#"
providers:
  - id: alpha
    base_url: "https://alpha.example.com"
  - id: beta
    base_url: "https://beta.example.com"
    enabled: false
  - id: gamma
    base_url: "https://gamma.example.com"
    requires_api_key: true
  - id: delta
    display_name: Delta
    base_url: "https://delta.example.com"
    requires_api_key: true
    api_key: "k"
"#,
        );
        let store = KeyValueStore::in_memory();

        let providers = initialize_providers(&config, &store, &reqwest::Client::new());
        let ids: Vec<&str> = providers.iter().map(|p| p.provider_id()).collect();
        assert_eq!(ids, vec!["alpha", "delta"]);
        assert_eq!(providers[1].display_name(), "Delta");
        assert_eq!(providers[0].display_name(), "alpha");
    }

    #[tokio::test]
    async fn test_inline_priority_source() {
        let config = parse_config(
            r#"
priority:
  static:
    credit:
      alpha: 3
"#,
        );
        let source = priority_source(&config, &reqwest::Client::new());
        assert_eq!(source.fetch().await.unwrap()["credit"]["alpha"], 3);

        let source = priority_source(&parse_config("providers: []"), &reqwest::Client::new());
        assert!(source.fetch().await.is_err());
    }
}
