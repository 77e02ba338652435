use crate::core::aggregator::{AggregatorOptions, PinnedProviderPolicy, Promotion, SessionParams};
use crate::core::priority::PaymentTypePriorityMap;
use crate::core::provider::{Direction, RegionCode};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProviderConfig {
    pub id: String,
    pub display_name: Option<String>,
    pub base_url: String,
    pub api_key: Option<String>,
    /// Providers that cannot work without a key are skipped when it is missing.
    #[serde(default)]
    pub requires_api_key: bool,
    /// Namespace for the provider's persisted data, defaults to `id`.
    pub store_id: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ProviderConfig {
    pub fn store_id(&self) -> &str {
        self.store_id.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct PriorityConfig {
    /// Remote priority document, fetched once per run.
    pub url: Option<String>,
    #[serde(rename = "static")]
    pub document: Option<PaymentTypePriorityMap>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SessionConfig {
    #[serde(default = "SessionConfig::default_fiat")]
    pub fiat_currency: String,
    #[serde(default)]
    pub region: RegionCode,
    #[serde(default = "SessionConfig::default_payment_types")]
    pub payment_types: Vec<String>,
    #[serde(default = "SessionConfig::default_direction")]
    pub direction: Direction,
    #[serde(default)]
    pub pinned_provider_policy: PinnedProviderPolicy,
    pub purchase_limit: Option<Decimal>,
    pub promotion: Option<Promotion>,
}

impl SessionConfig {
    fn default_fiat() -> String {
        "iso:USD".to_string()
    }

    fn default_payment_types() -> Vec<String> {
        vec!["credit".to_string()]
    }

    fn default_direction() -> Direction {
        Direction::Buy
    }

    /// Session parameters for `direction`, with the configured defaults.
    pub fn params(&self, direction: Direction, pinned_provider: Option<String>) -> SessionParams {
        SessionParams {
            direction,
            region: self.region.clone(),
            payment_types: self.payment_types.clone(),
            pinned_provider,
            fiat_currency_code: self.fiat_currency.clone(),
            promotion: self.promotion.clone(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            fiat_currency: Self::default_fiat(),
            region: RegionCode::default(),
            payment_types: Self::default_payment_types(),
            direction: Self::default_direction(),
            pinned_provider_policy: PinnedProviderPolicy::default(),
            purchase_limit: None,
            promotion: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub priority: PriorityConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Receive addresses handed to providers on approval, keyed by chain.
    #[serde(default)]
    pub wallet_addresses: HashMap<String, String>,
    pub data_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("io", "fiatramp", "fiatramp")
            .context("Could not determine project directories")
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        Ok(Self::project_dirs()?.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn aggregator_options(&self) -> AggregatorOptions {
        AggregatorOptions {
            timeout: self.timeout(),
            pinned_provider_policy: self.session.pinned_provider_policy,
            purchase_limit: self.session.purchase_limit,
        }
    }
}
