//! Supported asset discovery across providers

use crate::core::fuzzy::fuzzy_timeout;
use crate::core::provider::{AmountType, AssetFilter, ProviderAssetMap, RampProvider};
use futures::FutureExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Union of every responding provider's supported currencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedAssets {
    pub crypto: BTreeMap<String, BTreeSet<String>>,
    pub fiat: BTreeSet<String>,
    pub providers: BTreeSet<String>,
    required_amount_types: BTreeMap<String, AmountType>,
}

impl AllowedAssets {
    pub fn merge<I>(maps: I) -> Self
    where
        I: IntoIterator<Item = ProviderAssetMap>,
    {
        let mut allowed = AllowedAssets::default();
        for map in maps {
            debug!(
                "Merging {} chains and {} fiats from {}",
                map.crypto.len(),
                map.fiat.len(),
                map.provider_id
            );
            for (chain, assets) in map.crypto {
                allowed.crypto.entry(chain).or_default().extend(assets);
            }
            allowed.fiat.extend(map.fiat);
            if let Some(amount_type) = map.required_amount_type {
                allowed
                    .required_amount_types
                    .insert(map.provider_id.clone(), amount_type);
            }
            allowed.providers.insert(map.provider_id);
        }
        allowed
    }

    pub fn supports(&self, chain: &str, asset: &str) -> bool {
        self.crypto
            .get(chain)
            .is_some_and(|assets| assets.contains(asset))
    }

    pub fn required_amount_type(&self, provider_id: &str) -> Option<AmountType> {
        self.required_amount_types.get(provider_id).copied()
    }

    /// Whether a provider takes amounts typed into the given field.
    pub fn accepts(&self, provider_id: &str, amount_type: AmountType) -> bool {
        self.required_amount_type(provider_id)
            .is_none_or(|required| required == amount_type)
    }

    /// The only field the user may type into, if providers restrict it.
    ///
    /// Restrictions only apply when no responding provider is flexible. Fiat
    /// wins when some providers need fiat and others need crypto.
    pub fn forced_amount_type(&self) -> Option<AmountType> {
        let flexible = self
            .providers
            .iter()
            .any(|id| self.required_amount_type(id).is_none());
        if flexible {
            return None;
        }

        let required: BTreeSet<AmountType> = self.required_amount_types.values().copied().collect();
        if required.contains(&AmountType::Fiat) {
            Some(AmountType::Fiat)
        } else if required.contains(&AmountType::Crypto) {
            Some(AmountType::Crypto)
        } else {
            None
        }
    }
}

/// Queries every provider for its supported assets and merges the answers.
pub async fn fetch_allowed_assets(
    providers: &[Arc<dyn RampProvider>],
    filter: &AssetFilter,
    timeout: Duration,
) -> AllowedAssets {
    let operations: Vec<_> = providers
        .iter()
        .map(|provider| {
            let provider = Arc::clone(provider);
            let filter = filter.clone();
            async move { Ok::<_, ()>(provider.get_supported_assets(&filter).await) }.boxed()
        })
        .collect();

    match fuzzy_timeout(operations, timeout).await {
        Ok(maps) => AllowedAssets::merge(maps),
        Err(_) => {
            warn!("No provider answered the supported asset query");
            AllowedAssets::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::{Direction, RegionCode};
    use crate::core::testing::MockProvider;

    fn asset_map(provider_id: &str, chains: &[(&str, &[&str])], fiats: &[&str]) -> ProviderAssetMap {
        ProviderAssetMap {
            provider_id: provider_id.to_string(),
            crypto: chains
                .iter()
                .map(|(chain, assets)| {
                    (
                        chain.to_string(),
                        assets.iter().map(|a| a.to_string()).collect(),
                    )
                })
                .collect(),
            fiat: fiats.iter().map(|f| f.to_string()).collect(),
            required_amount_type: None,
        }
    }

    #[test]
    fn test_merge_is_a_union() {
        let allowed = AllowedAssets::merge(vec![
            asset_map("a", &[("bitcoin", &["BTC"])], &["USD"]),
            asset_map("b", &[("ethereum", &["ETH", "USDC"]), ("bitcoin", &["BTC"])], &["EUR"]),
        ]);

        assert!(allowed.supports("bitcoin", "BTC"));
        assert!(allowed.supports("ethereum", "USDC"));
        assert!(!allowed.supports("ethereum", "BTC"));
        assert_eq!(allowed.fiat.len(), 2);
        assert_eq!(allowed.providers.len(), 2);
    }

    #[test]
    fn test_fiat_merged_without_crypto() {
        let allowed = AllowedAssets::merge(vec![asset_map("a", &[], &["GBP"])]);
        assert!(allowed.fiat.contains("GBP"));
    }

    #[test]
    fn test_flexible_provider_lifts_restrictions() {
        let mut strict = asset_map("strict", &[], &[]);
        strict.required_amount_type = Some(AmountType::Crypto);
        let allowed = AllowedAssets::merge(vec![strict, asset_map("loose", &[], &[])]);

        assert_eq!(allowed.forced_amount_type(), None);
        assert!(!allowed.accepts("strict", AmountType::Fiat));
        assert!(allowed.accepts("strict", AmountType::Crypto));
        assert!(allowed.accepts("loose", AmountType::Fiat));
    }

    #[test]
    fn test_fiat_requirement_wins() {
        let mut fiat_only = asset_map("f", &[], &[]);
        fiat_only.required_amount_type = Some(AmountType::Fiat);
        let mut crypto_only = asset_map("c", &[], &[]);
        crypto_only.required_amount_type = Some(AmountType::Crypto);

        let allowed = AllowedAssets::merge(vec![crypto_only.clone()]);
        assert_eq!(allowed.forced_amount_type(), Some(AmountType::Crypto));

        let allowed = AllowedAssets::merge(vec![crypto_only, fiat_only]);
        assert_eq!(allowed.forced_amount_type(), Some(AmountType::Fiat));
    }

    #[tokio::test]
    async fn test_fetch_skips_unresponsive_providers() {
        let fast: Arc<dyn RampProvider> = Arc::new(
            MockProvider::new("fast").with_assets(asset_map("fast", &[("bitcoin", &["BTC"])], &["USD"])),
        );
        let hung: Arc<dyn RampProvider> = Arc::new(
            MockProvider::new("hung")
                .with_assets(asset_map("hung", &[("ethereum", &["ETH"])], &["EUR"]))
                .with_delay(Duration::from_secs(60)),
        );
        let filter = AssetFilter {
            direction: Direction::Buy,
            payment_types: vec!["credit".to_string()],
            region: RegionCode::default(),
        };

        let allowed = fetch_allowed_assets(&[fast, hung], &filter, Duration::from_millis(50)).await;
        assert!(allowed.supports("bitcoin", "BTC"));
        assert!(!allowed.supports("ethereum", "ETH"));
        assert_eq!(allowed.providers, BTreeSet::from(["fast".to_string()]));
    }
}
