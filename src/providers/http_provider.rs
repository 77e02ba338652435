//! Provider adapter for ramp services speaking the generic JSON quote API
//!
//! * `GET  {base}/assets?direction=..&region=..&payment_types=..`
//! * `POST {base}/quote`, answered with a quote or a 4xx error body
//! * `DELETE {base}/quotes/{id}` once the quote is closed

use super::ProviderInit;
use super::util::parse_json;
use crate::core::cache::KeyValueCollection;
use crate::core::provider::{
    AmountType, AssetFilter, Direction, ProviderAssetMap, ProviderError, ProviderErrorKind, Quote,
    QuoteActions, QuoteError, QuoteParams, RampProvider, WalletContext,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, StatusCode, Url};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const ACCOUNT_KEY: &str = "account";
const ASSETS_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Serialize, Deserialize)]
struct AssetsResponse {
    #[serde(default)]
    crypto: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    fiat: BTreeSet<String>,
    #[serde(default)]
    required_amount_type: Option<AmountType>,
}

#[derive(Debug, Serialize)]
struct QuoteRequest<'a> {
    chain: &'a str,
    asset: &'a str,
    fiat_currency: &'a str,
    amount: Decimal,
    amount_type: AmountType,
    direction: Direction,
    payment_types: &'a [String],
    region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    promo_code: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    quote_id: String,
    fiat_amount: Decimal,
    crypto_amount: Decimal,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    is_estimate: bool,
    approve_url: String,
    /// Provider-side account created for this wallet, reused on later quotes.
    #[serde(default)]
    account: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ErrorCode {
    UnderLimit,
    OverLimit,
    RegionRestricted,
    AssetUnsupported,
    PaymentUnsupported,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorCode,
    #[serde(default)]
    amount: Option<Decimal>,
    #[serde(default)]
    currency_code: Option<String>,
}

impl ErrorResponse {
    fn into_kind(self) -> ProviderErrorKind {
        match self.error {
            ErrorCode::UnderLimit => ProviderErrorKind::UnderLimit {
                amount: self.amount,
                display_currency_code: self.currency_code,
            },
            ErrorCode::OverLimit => ProviderErrorKind::OverLimit {
                amount: self.amount,
                display_currency_code: self.currency_code,
            },
            ErrorCode::RegionRestricted => ProviderErrorKind::RegionRestricted {
                display_currency_code: self.currency_code,
            },
            ErrorCode::AssetUnsupported => ProviderErrorKind::AssetUnsupported,
            ErrorCode::PaymentUnsupported => ProviderErrorKind::PaymentUnsupported,
        }
    }
}

pub struct HttpRampProvider {
    id: String,
    display_name: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    store: Arc<dyn KeyValueCollection>,
}

impl HttpRampProvider {
    pub fn new(init: ProviderInit) -> Self {
        Self {
            display_name: init.display_name.unwrap_or_else(|| init.id.clone()),
            id: init.id,
            base_url: init.base_url.trim_end_matches('/').to_string(),
            api_key: init.api_key,
            client: init.client,
            store: init.store,
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn assets_cache_key(filter: &AssetFilter) -> String {
        format!(
            "assets:{}:{}:{}",
            filter.direction,
            filter.region,
            filter.payment_types.join(",")
        )
    }

    async fn fetch_assets(&self, filter: &AssetFilter) -> Result<ProviderAssetMap> {
        let cache_key = Self::assets_cache_key(filter);
        let response: AssetsResponse = match self.store.get(&cache_key).await {
            Some(cached) => {
                debug!("Using cached assets for {}", self.id);
                serde_json::from_str(&cached).context("Corrupt cached asset map")?
            }
            None => {
                let url = Url::parse_with_params(
                    &format!("{}/assets", self.base_url),
                    &[
                        ("direction", filter.direction.to_string()),
                        ("region", filter.region.to_string()),
                        ("payment_types", filter.payment_types.join(",")),
                    ],
                )?;
                let response = self
                    .authorized(self.client.get(url))
                    .send()
                    .await
                    .context("Asset request failed")?
                    .error_for_status()?;
                let assets: AssetsResponse = parse_json(response, "asset map").await?;
                self.store
                    .put(&cache_key, serde_json::to_string(&assets)?, Some(ASSETS_TTL))
                    .await;
                assets
            }
        };

        Ok(ProviderAssetMap {
            provider_id: self.id.clone(),
            crypto: response.crypto,
            fiat: response.fiat,
            required_amount_type: response.required_amount_type,
        })
    }

    async fn request_quote(&self, params: &QuoteParams) -> Result<Quote, QuoteError> {
        let body = QuoteRequest {
            chain: &params.chain,
            asset: &params.display_currency_code,
            fiat_currency: &params.fiat_currency_code,
            amount: params.exchange_amount,
            amount_type: params.amount_type,
            direction: params.direction,
            payment_types: &params.payment_types,
            region: params.region.to_string(),
            account: self.store.get(ACCOUNT_KEY).await,
            promo_code: params.promo_code.as_deref(),
        };

        let response = self
            .authorized(self.client.post(format!("{}/quote", self.base_url)))
            .json(&body)
            .send()
            .await
            .context("Quote request failed")?;

        let status = response.status();
        if status.is_client_error() && status != StatusCode::UNAUTHORIZED {
            let error: ErrorResponse = parse_json(response, "quote error").await?;
            return Err(ProviderError::new(&self.id, error.into_kind()).into());
        }
        let response = response.error_for_status().context("Quote request failed")?;
        let quote: QuoteResponse = parse_json(response, "quote").await?;

        if let Some(account) = &quote.account {
            self.store.put(ACCOUNT_KEY, account.clone(), None).await;
        }

        let actions = HttpQuoteActions {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            quote_id: quote.quote_id,
            approve_url: quote.approve_url,
            chain: params.chain.clone(),
            asset: params.display_currency_code.clone(),
        };
        Ok(Quote {
            provider_id: self.id.clone(),
            display_name: self.display_name.clone(),
            direction: params.direction,
            fiat_currency_code: params.fiat_currency_code.clone(),
            fiat_amount: quote.fiat_amount,
            display_currency_code: params.display_currency_code.clone(),
            crypto_amount: quote.crypto_amount,
            payment_types: params.payment_types.clone(),
            expiration: quote.expires_at,
            is_estimate: quote.is_estimate,
            actions: Arc::new(actions),
        })
    }
}

#[async_trait]
impl RampProvider for HttpRampProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    #[instrument(skip(self), fields(provider = %self.id))]
    async fn get_supported_assets(&self, filter: &AssetFilter) -> ProviderAssetMap {
        match self.fetch_assets(filter).await {
            Ok(assets) => assets,
            Err(e) => {
                warn!("Failed to fetch supported assets: {e:#}");
                ProviderAssetMap::empty(&self.id)
            }
        }
    }

    #[instrument(skip(self), fields(provider = %self.id))]
    async fn get_quote(&self, params: &QuoteParams) -> Result<Quote, QuoteError> {
        self.request_quote(params).await
    }
}

struct HttpQuoteActions {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    quote_id: String,
    approve_url: String,
    chain: String,
    asset: String,
}

#[async_trait]
impl QuoteActions for HttpQuoteActions {
    async fn approve(&self, wallet: &dyn WalletContext) -> Result<()> {
        let address = wallet.receive_address(&self.chain, &self.asset).await?;
        let url = Url::parse_with_params(
            &self.approve_url,
            &[("quote_id", self.quote_id.as_str()), ("address", address.as_str())],
        )
        .with_context(|| format!("Invalid approve url: {}", self.approve_url))?;
        wallet.open_url(url.as_str()).await
    }

    async fn close(&self) -> Result<()> {
        let request = self
            .client
            .delete(format!("{}/quotes/{}", self.base_url, self.quote_id));
        let request = match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        };
        request
            .send()
            .await
            .context("Failed to close quote")?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::RegionCode;
    use crate::core::testing::{RecordingWallet, dec};
    use crate::store::memory::MemoryCollection;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, store: Arc<dyn KeyValueCollection>) -> HttpRampProvider {
        HttpRampProvider::new(ProviderInit {
            id: "alpha".to_string(),
            display_name: Some("Alpha Ramp".to_string()),
            base_url: format!("{}/", server.uri()),
            api_key: Some("secret".to_string()),
            client: reqwest::Client::new(),
            store,
        })
    }

    fn filter() -> AssetFilter {
        AssetFilter {
            direction: Direction::Buy,
            payment_types: vec!["credit".to_string()],
            region: RegionCode::default(),
        }
    }

    fn params(amount: &str) -> QuoteParams {
        QuoteParams {
            chain: "bitcoin".to_string(),
            display_currency_code: "BTC".to_string(),
            exchange_amount: dec(amount),
            fiat_currency_code: "iso:USD".to_string(),
            amount_type: AmountType::Fiat,
            direction: Direction::Buy,
            payment_types: vec!["credit".to_string()],
            region: RegionCode::default(),
            promo_code: None,
        }
    }

    const QUOTE_JSON: &str = r#"{
        "quote_id": "q-1",
        "fiat_amount": "100",
        "crypto_amount": "0.0021",
        "expires_at": "2030-01-01T00:00:00Z",
        "approve_url": "https://alpha.example.com/checkout",
        "account": "acc-42"
    }"#;

    #[tokio::test]
    async fn test_supported_assets_are_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/assets"))
            .and(query_param("direction", "buy"))
            .and(query_param("payment_types", "credit"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"crypto": {"bitcoin": ["BTC"]}, "fiat": ["USD"], "required_amount_type": "fiat"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;
        let provider = provider(&server, Arc::new(MemoryCollection::new()));

        let assets = provider.get_supported_assets(&filter()).await;
        assert_eq!(assets.provider_id, "alpha");
        assert!(assets.crypto["bitcoin"].contains("BTC"));
        assert_eq!(assets.required_amount_type, Some(AmountType::Fiat));

        let cached = provider.get_supported_assets(&filter()).await;
        assert_eq!(cached, assets);
    }

    #[tokio::test]
    async fn test_asset_failure_yields_empty_map() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/assets"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let provider = provider(&server, Arc::new(MemoryCollection::new()));

        assert_eq!(
            provider.get_supported_assets(&filter()).await,
            ProviderAssetMap::empty("alpha")
        );
    }

    #[tokio::test]
    async fn test_quote_persists_account() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/quote"))
            .and(body_partial_json(serde_json::json!({
                "chain": "bitcoin",
                "asset": "BTC",
                "amount_type": "fiat",
                "direction": "buy"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(QUOTE_JSON))
            .mount(&server)
            .await;
        let store: Arc<dyn KeyValueCollection> = Arc::new(MemoryCollection::new());
        let provider = provider(&server, Arc::clone(&store));

        let quote = provider.get_quote(&params("100")).await.unwrap();
        assert_eq!(quote.provider_id, "alpha");
        assert_eq!(quote.display_name, "Alpha Ramp");
        assert_eq!(quote.crypto_amount, dec("0.0021"));
        assert_eq!(quote.fiat_amount, dec("100"));
        assert!(quote.expiration.is_some());
        assert!(!quote.is_estimate);
        assert_eq!(store.get(ACCOUNT_KEY).await.as_deref(), Some("acc-42"));
    }

    #[tokio::test]
    async fn test_stored_account_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/quote"))
            .and(body_partial_json(serde_json::json!({"account": "acc-7"})))
            .respond_with(ResponseTemplate::new(200).set_body_string(QUOTE_JSON))
            .expect(1)
            .mount(&server)
            .await;
        let store: Arc<dyn KeyValueCollection> = Arc::new(MemoryCollection::new());
        store.put(ACCOUNT_KEY, "acc-7".to_string(), None).await;

        assert!(provider(&server, store).get_quote(&params("100")).await.is_ok());
    }

    #[tokio::test]
    async fn test_promo_code_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/quote"))
            .and(body_partial_json(serde_json::json!({"promo_code": "SPRING"})))
            .respond_with(ResponseTemplate::new(200).set_body_string(QUOTE_JSON))
            .expect(1)
            .mount(&server)
            .await;

        let mut params = params("100");
        params.promo_code = Some("SPRING".to_string());
        let provider = provider(&server, Arc::new(MemoryCollection::new()));
        assert!(provider.get_quote(&params).await.is_ok());
    }

    #[tokio::test]
    async fn test_business_errors_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(422).set_body_string(
                r#"{"error": "over_limit", "amount": "5000", "currency_code": "USD"}"#,
            ))
            .mount(&server)
            .await;
        let provider = provider(&server, Arc::new(MemoryCollection::new()));

        let err = provider.get_quote(&params("99999")).await.unwrap_err();
        assert_eq!(
            err.as_provider_error(),
            Some(&ProviderError::new(
                "alpha",
                ProviderErrorKind::OverLimit {
                    amount: Some(dec("5000")),
                    display_currency_code: Some("USD".to_string()),
                }
            ))
        );
    }

    #[tokio::test]
    async fn test_server_errors_are_transport_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        let provider = provider(&server, Arc::new(MemoryCollection::new()));

        let err = provider.get_quote(&params("100")).await.unwrap_err();
        assert!(matches!(err, QuoteError::Transport(_)));
    }

    #[tokio::test]
    async fn test_approve_and_close() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_string(QUOTE_JSON))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/quotes/q-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        let provider = provider(&server, Arc::new(MemoryCollection::new()));
        let quote = provider.get_quote(&params("100")).await.unwrap();
        let wallet = RecordingWallet::default();

        quote.approve(&wallet).await.unwrap();
        assert_eq!(
            wallet.opened.lock().unwrap().as_slice(),
            ["https://alpha.example.com/checkout?quote_id=q-1&address=bitcoin-address"]
        );

        quote.close().await.unwrap();
    }
}
