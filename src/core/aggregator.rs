//! Quote aggregation across ramp providers
//!
//! A [`QuoteAggregator`] owns the initialized providers and the priority
//! document. Each user interaction starts a [`RampSession`], which discovers
//! the assets the eligible providers support. Picking an asset yields a
//! [`QuoteFlow`] that fans out quote requests on every amount edit and keeps
//! only the result of the latest edit.

use crate::core::assets::{AllowedAssets, fetch_allowed_assets};
use crate::core::errors::{BestError, get_best_error, no_quote_text};
use crate::core::fuzzy::fuzzy_timeout;
use crate::core::priority::{
    PaymentTypePriorityMap, PriorityTiers, PrioritySource, create_priority_tiers,
};
use crate::core::provider::{
    AmountType, AssetFilter, Direction, ProviderErrorKind, Quote, QuoteError, QuoteParams,
    RampProvider, RegionCode, WalletContext,
};
use crate::core::selection::{format_amount, get_best_quote, rate_text, strip_iso_prefix};
use futures::FutureExt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Quoted when the user asks for the maximum buy amount. Larger than any
/// reasonable purchase so providers answer with their ceiling.
const MAX_QUOTE_VALUE: &str = "10000000000";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("No providers are configured")]
    NoProviders,
    #[error("No {0} providers are available")]
    NoEligibleProviders(Direction),
    #[error("Pinned provider '{0}' is not configured")]
    UnknownPinnedProvider(String),
    #[error("A payment type is required")]
    NoPaymentType,
    #[error("Multiple payment types are not supported: {0:?}")]
    MultiplePaymentTypes(Vec<String>),
    #[error("{asset} on {chain} is not supported by any provider")]
    UnsupportedAsset { chain: String, asset: String },
}

/// How a pinned provider interacts with priority exclusion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinnedProviderPolicy {
    /// The pinned provider is queried and surfaced even when excluded.
    #[default]
    BypassTiers,
    /// An excluded pinned provider is never queried.
    RespectExclusion,
}

#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    pub timeout: Duration,
    pub pinned_provider_policy: PinnedProviderPolicy,
    /// Largest fiat amount a single buy may approve.
    pub purchase_limit: Option<Decimal>,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        AggregatorOptions {
            timeout: DEFAULT_TIMEOUT,
            pinned_provider_policy: PinnedProviderPolicy::default(),
            purchase_limit: None,
        }
    }
}

/// A promotion code handed only to the providers running the promotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub code: String,
    #[serde(default)]
    pub provider_ids: Vec<String>,
}

impl Promotion {
    fn code_for(&self, provider_id: &str) -> Option<String> {
        self.provider_ids
            .iter()
            .any(|id| id == provider_id)
            .then(|| self.code.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub direction: Direction,
    pub region: RegionCode,
    pub payment_types: Vec<String>,
    pub pinned_provider: Option<String>,
    pub fiat_currency_code: String,
    pub promotion: Option<Promotion>,
}

pub struct QuoteAggregator {
    providers: Vec<Arc<dyn RampProvider>>,
    priorities: Option<PaymentTypePriorityMap>,
    options: AggregatorOptions,
}

impl QuoteAggregator {
    pub fn new(
        providers: Vec<Arc<dyn RampProvider>>,
        priorities: Option<PaymentTypePriorityMap>,
        options: AggregatorOptions,
    ) -> Self {
        QuoteAggregator {
            providers,
            priorities,
            options,
        }
    }

    /// Builds an aggregator, fetching the priority document once.
    ///
    /// A failed fetch is not fatal: every provider is then treated as equal.
    pub async fn load(
        providers: Vec<Arc<dyn RampProvider>>,
        source: &dyn PrioritySource,
        options: AggregatorOptions,
    ) -> Self {
        let priorities = match source.fetch().await {
            Ok(document) => Some(document),
            Err(e) => {
                warn!("Failed to fetch provider priorities, using equal priority: {e:#}");
                None
            }
        };
        Self::new(providers, priorities, options)
    }

    fn priority_tiers(&self, payment_types: &[String]) -> Result<PriorityTiers, SessionError> {
        let all_providers = || PriorityTiers::flat(self.providers.iter().map(|p| p.provider_id()));
        match payment_types {
            [] => Err(SessionError::NoPaymentType),
            [payment_type] => {
                match self
                    .priorities
                    .as_ref()
                    .and_then(|document| document.get(payment_type))
                    .filter(|map| !map.is_empty())
                {
                    Some(map) => Ok(create_priority_tiers(map)),
                    None => {
                        debug!("No priorities for payment type {payment_type}, using equal priority");
                        Ok(all_providers())
                    }
                }
            }
            _ => Err(SessionError::MultiplePaymentTypes(payment_types.to_vec())),
        }
    }

    pub async fn start_session(&self, params: SessionParams) -> Result<RampSession, SessionError> {
        if self.providers.is_empty() {
            return Err(SessionError::NoProviders);
        }

        let tiers = self.priority_tiers(&params.payment_types)?;
        debug!("Priority tiers for {}: {:?}", params.direction, tiers);

        let candidates: Vec<Arc<dyn RampProvider>> = match &params.pinned_provider {
            Some(pinned) => {
                let provider = self
                    .providers
                    .iter()
                    .find(|p| p.provider_id() == pinned)
                    .ok_or_else(|| SessionError::UnknownPinnedProvider(pinned.clone()))?;
                let allowed = tiers.contains(pinned)
                    || self.options.pinned_provider_policy == PinnedProviderPolicy::BypassTiers;
                if allowed {
                    vec![Arc::clone(provider)]
                } else {
                    info!("Pinned provider {pinned} is excluded by priority");
                    Vec::new()
                }
            }
            None => self
                .providers
                .iter()
                .filter(|p| tiers.contains(p.provider_id()))
                .cloned()
                .collect(),
        };
        if candidates.is_empty() {
            return Err(SessionError::NoEligibleProviders(params.direction));
        }

        let filter = AssetFilter {
            direction: params.direction,
            payment_types: params.payment_types.clone(),
            region: params.region.clone(),
        };
        let assets = fetch_allowed_assets(&candidates, &filter, self.options.timeout).await;
        let providers: Vec<Arc<dyn RampProvider>> = candidates
            .into_iter()
            .filter(|p| assets.providers.contains(p.provider_id()))
            .collect();
        if providers.is_empty() {
            return Err(SessionError::NoEligibleProviders(params.direction));
        }

        info!(
            "Started {} session with {} providers",
            params.direction,
            providers.len()
        );
        Ok(RampSession {
            params,
            tiers,
            providers,
            assets,
            options: self.options.clone(),
        })
    }
}

/// Providers and assets available for one direction/region/payment type.
pub struct RampSession {
    params: SessionParams,
    tiers: PriorityTiers,
    providers: Vec<Arc<dyn RampProvider>>,
    assets: AllowedAssets,
    options: AggregatorOptions,
}

impl RampSession {
    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn allowed_assets(&self) -> &AllowedAssets {
        &self.assets
    }

    pub fn tiers(&self) -> &PriorityTiers {
        &self.tiers
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.provider_id()).collect()
    }

    /// The only field quotes may be requested for, when providers restrict it.
    pub fn forced_amount_type(&self) -> Option<AmountType> {
        self.assets.forced_amount_type()
    }

    pub fn select_asset(&self, chain: &str, asset: &str) -> Result<QuoteFlow, SessionError> {
        if !self.assets.supports(chain, asset) {
            return Err(SessionError::UnsupportedAsset {
                chain: chain.to_string(),
                asset: asset.to_string(),
            });
        }

        // A pinned provider is not subject to the tier allow-list
        let selection_tiers = match &self.params.pinned_provider {
            Some(pinned) if !self.tiers.contains(pinned) => PriorityTiers::flat([pinned.as_str()]),
            _ => self.tiers.clone(),
        };

        Ok(QuoteFlow {
            params: self.params.clone(),
            chain: chain.to_string(),
            asset: asset.to_string(),
            providers: self.providers.clone(),
            tiers: selection_tiers,
            assets: self.assets.clone(),
            timeout: self.options.timeout,
            purchase_limit: self.options.purchase_limit,
            epoch: AtomicU64::new(0),
            state: Mutex::new(FlowState::default()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusText {
    pub text: String,
    pub kind: StatusKind,
}

impl StatusText {
    fn error(text: impl Into<String>) -> Self {
        StatusText {
            text: text.into(),
            kind: StatusKind::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == StatusKind::Error
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub provider_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    /// Amount for the field the user did not type into.
    pub value: String,
    pub status: StatusText,
    pub attribution: Attribution,
}

/// What the UI should show after an amount edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Converted(Conversion),
    Status(StatusText),
    /// Zero or empty input: clear the opposite field.
    Cleared,
    /// A later edit replaced this one; leave the UI untouched.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaxOutcome {
    Filled {
        fiat_value: String,
        crypto_value: String,
        conversion: Conversion,
    },
    Status(StatusText),
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Approved(Attribution),
    NothingSelected,
    Rejected(StatusText),
}

#[derive(Default)]
struct FlowState {
    selected: Option<Quote>,
    quotes: Vec<Quote>,
    last_source: Option<AmountType>,
}

/// Amount entry for one chosen asset.
pub struct QuoteFlow {
    params: SessionParams,
    chain: String,
    asset: String,
    providers: Vec<Arc<dyn RampProvider>>,
    tiers: PriorityTiers,
    assets: AllowedAssets,
    timeout: Duration,
    purchase_limit: Option<Decimal>,
    epoch: AtomicU64,
    state: Mutex<FlowState>,
}

fn parse_amount(raw: &str) -> Result<Option<Decimal>, ()> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let amount = Decimal::from_str(trimmed).map_err(|_| ())?;
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(());
    }
    Ok((!amount.is_zero()).then_some(amount))
}

impl QuoteFlow {
    pub fn asset(&self) -> &str {
        &self.asset
    }

    /// Fiat currency code without the `iso:` prefix.
    pub fn fiat_code(&self) -> &str {
        strip_iso_prefix(&self.params.fiat_currency_code)
    }

    fn currency_code(&self, amount_type: AmountType) -> &str {
        match amount_type {
            AmountType::Fiat => self.fiat_code(),
            AmountType::Crypto => &self.asset,
        }
    }

    fn converted_value(quote: &Quote, source: AmountType) -> String {
        match source {
            AmountType::Fiat => format_amount(quote.crypto_amount, 6),
            AmountType::Crypto => format_amount(quote.fiat_amount, 2),
        }
    }

    fn conversion(quote: &Quote, source: AmountType) -> Conversion {
        Conversion {
            value: Self::converted_value(quote, source),
            status: StatusText {
                text: rate_text(quote),
                kind: if quote.is_estimate {
                    StatusKind::Warning
                } else {
                    StatusKind::Info
                },
            },
            attribution: Attribution {
                provider_id: quote.provider_id.clone(),
                display_name: quote.display_name.clone(),
            },
        }
    }

    /// Bumps the epoch without publishing, so in-flight batches go stale.
    async fn reset(&self) {
        let mut state = self.state.lock().await;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *state = FlowState::default();
    }

    /// Handles the user typing `raw` into the `source` field.
    pub async fn on_amount_edit(&self, source: AmountType, raw: &str) -> EditOutcome {
        self.convert(source, raw).await.0
    }

    async fn convert(&self, source: AmountType, raw: &str) -> (EditOutcome, Option<BestError>) {
        let amount = match parse_amount(raw) {
            Ok(Some(amount)) => amount,
            Ok(None) => {
                self.reset().await;
                return (EditOutcome::Cleared, None);
            }
            Err(()) => {
                self.reset().await;
                return (EditOutcome::Status(StatusText::error("Invalid amount")), None);
            }
        };

        if let Some(forced) = self.assets.forced_amount_type()
            && forced != source
        {
            self.reset().await;
            let text = format!("Enter the amount in {}", self.currency_code(forced));
            return (EditOutcome::Status(StatusText::error(text)), None);
        }

        let local_epoch = {
            let mut state = self.state.lock().await;
            *state = FlowState::default();
            self.epoch.fetch_add(1, Ordering::SeqCst) + 1
        };

        let params = QuoteParams {
            chain: self.chain.clone(),
            display_currency_code: self.asset.clone(),
            exchange_amount: amount,
            fiat_currency_code: self.params.fiat_currency_code.clone(),
            amount_type: source,
            direction: self.params.direction,
            payment_types: self.params.payment_types.clone(),
            region: self.params.region.clone(),
            promo_code: None,
        };
        let operations: Vec<_> = self
            .providers
            .iter()
            .filter(|p| self.assets.accepts(p.provider_id(), source))
            .map(|provider| {
                let provider = Arc::clone(provider);
                let mut params = params.clone();
                params.promo_code = self
                    .params
                    .promotion
                    .as_ref()
                    .and_then(|promotion| promotion.code_for(provider.provider_id()));
                async move { provider.get_quote(&params).await }.boxed()
            })
            .collect();
        debug!(
            "Epoch {local_epoch}: requesting {} quotes for {amount} {}",
            operations.len(),
            self.currency_code(source)
        );

        let (quotes, failures): (Vec<Quote>, Vec<QuoteError>) =
            match fuzzy_timeout(operations, self.timeout).await {
                Ok(quotes) => (quotes, Vec::new()),
                Err(failures) => (Vec::new(), failures),
            };

        let mut state = self.state.lock().await;
        if self.epoch.load(Ordering::SeqCst) != local_epoch {
            debug!("Epoch {local_epoch} superseded, dropping results");
            return (EditOutcome::Superseded, None);
        }

        for failure in &failures {
            debug!("Quote request failed: {failure:#}");
        }

        let good_quotes: Vec<Quote> = quotes
            .into_iter()
            .filter(|q| q.direction == self.params.direction)
            .filter(|q| self.tiers.contains(&q.provider_id))
            .collect();

        let Some(best) = get_best_quote(self.params.direction, &good_quotes, &self.tiers).cloned()
        else {
            let best_error = get_best_error(
                failures.iter().filter_map(QuoteError::as_provider_error),
                self.currency_code(source),
                self.params.direction,
            );
            let text = best_error
                .as_ref()
                .map(|e| e.text.clone())
                .unwrap_or_else(|| no_quote_text(self.params.direction));
            return (EditOutcome::Status(StatusText::error(text)), best_error);
        };

        info!(
            "Best quote from {}: {} {} for {} {}",
            best.provider_id,
            best.crypto_amount,
            best.display_currency_code,
            best.fiat_amount,
            self.fiat_code()
        );
        let conversion = Self::conversion(&best, source);
        state.selected = Some(best);
        state.quotes = good_quotes;
        state.last_source = Some(source);
        (EditOutcome::Converted(conversion), None)
    }

    /// Fills both fields with the largest amount the providers accept.
    ///
    /// Buys ask for an absurdly large fiat amount; sells use the wallet's
    /// spendable `balance`. An over-limit answer carrying its ceiling is
    /// re-quoted at that ceiling.
    pub async fn on_max(&self, balance: Option<Decimal>) -> MaxOutcome {
        let (source, requested) = match self.params.direction {
            Direction::Buy => (AmountType::Fiat, MAX_QUOTE_VALUE.to_string()),
            Direction::Sell => match balance {
                Some(balance) => (AmountType::Crypto, balance.normalize().to_string()),
                None => {
                    return MaxOutcome::Status(StatusText::error(format!(
                        "Unable to determine the {} balance",
                        self.asset
                    )));
                }
            },
        };
        let failure_text = format!("Unable to find the maximum {} amount", self.params.direction);

        let (outcome, best_error) = self.convert(source, &requested).await;
        match outcome {
            EditOutcome::Converted(conversion) => {
                let (fiat_value, crypto_value) = match source {
                    AmountType::Fiat => (requested, conversion.value.clone()),
                    AmountType::Crypto => (conversion.value.clone(), requested),
                };
                return MaxOutcome::Filled {
                    fiat_value,
                    crypto_value,
                    conversion,
                };
            }
            EditOutcome::Superseded => return MaxOutcome::Superseded,
            EditOutcome::Status(_) | EditOutcome::Cleared => {}
        }

        let Some(BestError { error, .. }) = best_error else {
            return MaxOutcome::Status(StatusText::error(failure_text));
        };
        let ProviderErrorKind::OverLimit {
            amount: Some(limit),
            display_currency_code: Some(code),
        } = error.kind
        else {
            return MaxOutcome::Status(StatusText::error(failure_text));
        };

        let limit_code = strip_iso_prefix(&code);
        let limit_source = if limit_code == self.fiat_code() {
            AmountType::Fiat
        } else if limit_code == self.asset {
            AmountType::Crypto
        } else {
            debug!("Over limit reported in unknown currency {code}");
            return MaxOutcome::Status(StatusText::error(failure_text));
        };

        let limit = limit.normalize().to_string();
        match self.convert(limit_source, &limit).await.0 {
            EditOutcome::Converted(conversion) => {
                let (fiat_value, crypto_value) = match limit_source {
                    AmountType::Fiat => (limit, conversion.value.clone()),
                    AmountType::Crypto => (conversion.value.clone(), limit),
                };
                MaxOutcome::Filled {
                    fiat_value,
                    crypto_value,
                    conversion,
                }
            }
            EditOutcome::Superseded => MaxOutcome::Superseded,
            EditOutcome::Status(status) => MaxOutcome::Status(status),
            EditOutcome::Cleared => MaxOutcome::Status(StatusText::error(failure_text)),
        }
    }

    /// Every quote that survived filtering for the latest edit.
    pub async fn quotes(&self) -> Vec<Quote> {
        self.state.lock().await.quotes.clone()
    }

    pub async fn selected(&self) -> Option<Quote> {
        self.state.lock().await.selected.clone()
    }

    /// Overrides the automatic choice with another provider's quote.
    pub async fn select_provider(&self, provider_id: &str) -> Option<Conversion> {
        let mut state = self.state.lock().await;
        let source = state.last_source?;
        let quote = state
            .quotes
            .iter()
            .find(|q| q.provider_id == provider_id)
            .cloned()?;
        info!("User selected quote from {provider_id}");
        let conversion = Self::conversion(&quote, source);
        state.selected = Some(quote);
        Some(conversion)
    }

    /// Approves the selected quote once.
    pub async fn on_submit(&self, wallet: &dyn WalletContext) -> anyhow::Result<SubmitOutcome> {
        let Some(quote) = self.selected().await else {
            return Ok(SubmitOutcome::NothingSelected);
        };

        if self.params.direction == Direction::Buy
            && let Some(limit) = self.purchase_limit
            && quote.fiat_amount > limit
        {
            return Ok(SubmitOutcome::Rejected(StatusText::error(format!(
                "Purchases are limited to {} {}",
                limit.normalize(),
                self.fiat_code()
            ))));
        }

        info!("Approving quote from {}", quote.provider_id);
        quote.approve(wallet).await?;
        Ok(SubmitOutcome::Approved(Attribution {
            provider_id: quote.provider_id.clone(),
            display_name: quote.display_name.clone(),
        }))
    }

    /// Releases the selected quote, approved or not.
    pub async fn close(&self) -> anyhow::Result<()> {
        let selected = {
            let mut state = self.state.lock().await;
            state.quotes.clear();
            state.selected.take()
        };
        if let Some(quote) = selected {
            debug!("Closing quote from {}", quote.provider_id);
            quote.close().await?;
        }
        Ok(())
    }
}
