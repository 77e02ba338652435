//! Test doubles shared by the core unit tests

use crate::core::provider::{
    AmountType, AssetFilter, Direction, ProviderAssetMap, ProviderError, ProviderErrorKind, Quote,
    QuoteActions, QuoteError, QuoteParams, RampProvider, WalletContext,
};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

#[derive(Default)]
pub(crate) struct RecordingActions {
    pub approvals: AtomicUsize,
    pub closes: AtomicUsize,
}

#[async_trait]
impl QuoteActions for RecordingActions {
    async fn approve(&self, wallet: &dyn WalletContext) -> Result<()> {
        self.approvals.fetch_add(1, Ordering::SeqCst);
        wallet.open_url("https://example.com/checkout").await
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) fn quote(provider_id: &str, crypto_amount: &str, fiat_amount: &str) -> Quote {
    Quote {
        provider_id: provider_id.to_string(),
        display_name: provider_id.to_uppercase(),
        direction: Direction::Buy,
        fiat_currency_code: "iso:USD".to_string(),
        fiat_amount: dec(fiat_amount),
        display_currency_code: "BTC".to_string(),
        crypto_amount: dec(crypto_amount),
        payment_types: vec!["credit".to_string()],
        expiration: None,
        is_estimate: false,
        actions: Arc::new(RecordingActions::default()),
    }
}

#[derive(Default)]
pub(crate) struct RecordingWallet {
    pub opened: Mutex<Vec<String>>,
}

#[async_trait]
impl WalletContext for RecordingWallet {
    async fn receive_address(&self, chain: &str, _asset: &str) -> Result<String> {
        Ok(format!("{chain}-address"))
    }

    async fn open_url(&self, url: &str) -> Result<()> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// Quotes at a fixed rate of crypto per unit of fiat.
pub(crate) struct MockProvider {
    id: String,
    assets: ProviderAssetMap,
    delay: Duration,
    delays_by_amount: HashMap<Decimal, Duration>,
    rate: Decimal,
    quote_direction: Option<Direction>,
    error: Option<ProviderErrorKind>,
    transport_failure: bool,
    max_fiat: Option<Decimal>,
    estimate: bool,
    pub actions: Arc<RecordingActions>,
    pub quote_calls: AtomicUsize,
    pub promo_codes: Mutex<Vec<Option<String>>>,
}

impl MockProvider {
    pub fn new(id: &str) -> Self {
        let mut assets = ProviderAssetMap::empty(id);
        assets
            .crypto
            .entry("bitcoin".to_string())
            .or_default()
            .insert("BTC".to_string());
        assets.fiat.insert("USD".to_string());
        MockProvider {
            id: id.to_string(),
            assets,
            delay: Duration::ZERO,
            delays_by_amount: HashMap::new(),
            rate: dec("0.00001"),
            quote_direction: None,
            error: None,
            transport_failure: false,
            max_fiat: None,
            estimate: false,
            actions: Arc::new(RecordingActions::default()),
            quote_calls: AtomicUsize::new(0),
            promo_codes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_assets(mut self, assets: ProviderAssetMap) -> Self {
        self.assets = assets;
        self
    }

    pub fn with_required_amount_type(mut self, amount_type: AmountType) -> Self {
        self.assets.required_amount_type = Some(amount_type);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_delay_for(mut self, amount: &str, delay: Duration) -> Self {
        self.delays_by_amount.insert(dec(amount), delay);
        self
    }

    pub fn with_rate(mut self, rate: &str) -> Self {
        self.rate = dec(rate);
        self
    }

    pub fn with_quote_direction(mut self, direction: Direction) -> Self {
        self.quote_direction = Some(direction);
        self
    }

    pub fn with_error(mut self, kind: ProviderErrorKind) -> Self {
        self.error = Some(kind);
        self
    }

    pub fn with_transport_failure(mut self) -> Self {
        self.transport_failure = true;
        self
    }

    pub fn with_max_fiat(mut self, max: &str) -> Self {
        self.max_fiat = Some(dec(max));
        self
    }

    pub fn estimated(mut self) -> Self {
        self.estimate = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RampProvider for MockProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn get_supported_assets(&self, _filter: &AssetFilter) -> ProviderAssetMap {
        tokio::time::sleep(self.delay).await;
        self.assets.clone()
    }

    async fn get_quote(&self, params: &QuoteParams) -> Result<Quote, QuoteError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        self.promo_codes.lock().unwrap().push(params.promo_code.clone());
        let delay = self
            .delays_by_amount
            .get(&params.exchange_amount)
            .copied()
            .unwrap_or(self.delay);
        tokio::time::sleep(delay).await;

        if self.transport_failure {
            return Err(anyhow::anyhow!("connection refused").into());
        }
        if let Some(kind) = &self.error {
            return Err(ProviderError::new(&self.id, kind.clone()).into());
        }

        let (fiat_amount, crypto_amount) = match params.amount_type {
            AmountType::Fiat => (params.exchange_amount, params.exchange_amount * self.rate),
            AmountType::Crypto => (params.exchange_amount / self.rate, params.exchange_amount),
        };
        if let Some(max) = self.max_fiat
            && fiat_amount > max
        {
            let (amount, code) = match params.amount_type {
                AmountType::Fiat => (max, params.fiat_currency_code.clone()),
                AmountType::Crypto => (max * self.rate, params.display_currency_code.clone()),
            };
            return Err(ProviderError::new(
                &self.id,
                ProviderErrorKind::OverLimit {
                    amount: Some(amount),
                    display_currency_code: Some(code),
                },
            )
            .into());
        }

        Ok(Quote {
            provider_id: self.id.clone(),
            display_name: self.id.to_uppercase(),
            direction: self.quote_direction.unwrap_or(params.direction),
            fiat_currency_code: params.fiat_currency_code.clone(),
            fiat_amount,
            display_currency_code: params.display_currency_code.clone(),
            crypto_amount,
            payment_types: params.payment_types.clone(),
            expiration: None,
            is_estimate: self.estimate,
            actions: Arc::clone(&self.actions) as Arc<dyn QuoteActions>,
        })
    }
}
