//! Ramp provider abstractions and core types

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Direction::Buy => "buy",
                Direction::Sell => "sell",
            }
        )
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(Direction::Buy),
            "sell" => Ok(Direction::Sell),
            _ => Err(anyhow::anyhow!("Invalid direction: {}", s)),
        }
    }
}

/// Which field the user typed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmountType {
    Fiat,
    Crypto,
}

impl Display for AmountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                AmountType::Fiat => "fiat",
                AmountType::Crypto => "crypto",
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionCode {
    pub country_code: String,
    #[serde(default)]
    pub state_province_code: Option<String>,
}

impl Default for RegionCode {
    fn default() -> Self {
        RegionCode {
            country_code: "US".to_string(),
            state_province_code: None,
        }
    }
}

impl Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state_province_code {
            Some(state) => write!(f, "{}:{}", self.country_code, state),
            None => write!(f, "{}", self.country_code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFilter {
    pub direction: Direction,
    pub payment_types: Vec<String>,
    pub region: RegionCode,
}

/// Currencies a single provider can trade, keyed by chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAssetMap {
    pub provider_id: String,
    #[serde(default)]
    pub crypto: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub fiat: BTreeSet<String>,
    #[serde(default)]
    pub required_amount_type: Option<AmountType>,
}

impl ProviderAssetMap {
    pub fn empty(provider_id: &str) -> Self {
        ProviderAssetMap {
            provider_id: provider_id.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteParams {
    pub chain: String,
    /// Code of the crypto asset being bought or sold.
    pub display_currency_code: String,
    pub exchange_amount: Decimal,
    pub fiat_currency_code: String,
    pub amount_type: AmountType,
    pub direction: Direction,
    pub payment_types: Vec<String>,
    pub region: RegionCode,
    /// Only set for providers the running promotion targets.
    pub promo_code: Option<String>,
}

/// Receives the outcome of a user approving a quote.
#[async_trait]
pub trait WalletContext: Send + Sync {
    async fn receive_address(&self, chain: &str, asset: &str) -> Result<String>;
    async fn open_url(&self, url: &str) -> Result<()>;
}

/// Provider-side handling of a quote once it is selected.
///
/// `approve` is invoked at most once per user submission. `close` must be
/// safe to call even when `approve` never ran.
#[async_trait]
pub trait QuoteActions: Send + Sync {
    async fn approve(&self, wallet: &dyn WalletContext) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct Quote {
    pub provider_id: String,
    pub display_name: String,
    pub direction: Direction,
    pub fiat_currency_code: String,
    pub fiat_amount: Decimal,
    pub display_currency_code: String,
    pub crypto_amount: Decimal,
    pub payment_types: Vec<String>,
    pub expiration: Option<DateTime<Utc>>,
    pub is_estimate: bool,
    pub actions: Arc<dyn QuoteActions>,
}

impl Quote {
    pub async fn approve(&self, wallet: &dyn WalletContext) -> Result<()> {
        self.actions.approve(wallet).await
    }

    pub async fn close(&self) -> Result<()> {
        self.actions.close().await
    }
}

impl fmt::Debug for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Quote")
            .field("provider_id", &self.provider_id)
            .field("direction", &self.direction)
            .field("fiat_currency_code", &self.fiat_currency_code)
            .field("fiat_amount", &self.fiat_amount)
            .field("display_currency_code", &self.display_currency_code)
            .field("crypto_amount", &self.crypto_amount)
            .field("expiration", &self.expiration)
            .field("is_estimate", &self.is_estimate)
            .finish_non_exhaustive()
    }
}

/// Business rejection reported by a provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{provider_id}: {kind}")]
pub struct ProviderError {
    pub provider_id: String,
    pub kind: ProviderErrorKind,
}

impl ProviderError {
    pub fn new(provider_id: &str, kind: ProviderErrorKind) -> Self {
        ProviderError {
            provider_id: provider_id.to_string(),
            kind,
        }
    }
}

/// Amounts are denominated in the amount-type of the request that produced
/// the error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderErrorKind {
    #[error("amount under limit")]
    UnderLimit {
        amount: Option<Decimal>,
        display_currency_code: Option<String>,
    },
    #[error("amount over limit")]
    OverLimit {
        amount: Option<Decimal>,
        display_currency_code: Option<String>,
    },
    #[error("region restricted")]
    RegionRestricted {
        display_currency_code: Option<String>,
    },
    #[error("asset unsupported")]
    AssetUnsupported,
    #[error("payment type unsupported")]
    PaymentUnsupported,
}

#[derive(Error, Debug)]
pub enum QuoteError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// Transport or parse failure. Never shown to the user verbatim.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl QuoteError {
    pub fn as_provider_error(&self) -> Option<&ProviderError> {
        match self {
            QuoteError::Provider(e) => Some(e),
            QuoteError::Transport(_) => None,
        }
    }
}

#[async_trait]
pub trait RampProvider: Send + Sync {
    fn provider_id(&self) -> &str;

    fn display_name(&self) -> &str {
        self.provider_id()
    }

    /// Never fails. Internal failures yield an empty map.
    async fn get_supported_assets(&self, filter: &AssetFilter) -> ProviderAssetMap;

    async fn get_quote(&self, params: &QuoteParams) -> Result<Quote, QuoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_from_str() {
        assert_eq!("BUY".parse::<Direction>().unwrap(), Direction::Buy);
        assert_eq!("sell".parse::<Direction>().unwrap(), Direction::Sell);
        assert!("swap".parse::<Direction>().is_err());
    }

    #[test]
    fn test_region_display() {
        let region = RegionCode {
            country_code: "US".to_string(),
            state_province_code: Some("CA".to_string()),
        };
        assert_eq!(region.to_string(), "US:CA");
        assert_eq!(RegionCode::default().to_string(), "US");
    }

    #[test]
    fn test_quote_error_exposes_provider_error() {
        let err: QuoteError = ProviderError::new("alpha", ProviderErrorKind::AssetUnsupported).into();
        assert_eq!(
            err.as_provider_error().map(|e| e.provider_id.as_str()),
            Some("alpha")
        );
        assert_eq!(err.to_string(), "alpha: asset unsupported");

        let err: QuoteError = anyhow::anyhow!("connection reset").into();
        assert!(err.as_provider_error().is_none());
    }
}
