//! Provider priority tiers

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};

/// Provider id to priority. Higher is preferred, `<= 0` excludes the provider.
pub type PriorityMap = HashMap<String, i64>;

/// Payment type to [`PriorityMap`], the shape of the remote priority document.
pub type PaymentTypePriorityMap = HashMap<String, PriorityMap>;

/// Groups of providers sharing a priority, highest priority first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriorityTiers {
    tiers: Vec<BTreeSet<String>>,
}

impl PriorityTiers {
    /// A single tier holding every given provider.
    pub fn flat<I, S>(provider_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tier: BTreeSet<String> = provider_ids.into_iter().map(Into::into).collect();
        if tier.is_empty() {
            return Self::default();
        }
        PriorityTiers { tiers: vec![tier] }
    }

    pub fn contains(&self, provider_id: &str) -> bool {
        self.tiers.iter().any(|tier| tier.contains(provider_id))
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BTreeSet<String>> {
        self.tiers.iter()
    }
}

pub fn create_priority_tiers(priorities: &PriorityMap) -> PriorityTiers {
    let mut ranked: Vec<(&String, i64)> = priorities
        .iter()
        .filter(|(_, priority)| **priority > 0)
        .map(|(id, priority)| (id, *priority))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    let mut tiers: Vec<BTreeSet<String>> = Vec::new();
    let mut current_priority = None;
    for (provider_id, priority) in ranked {
        if current_priority != Some(priority) {
            tiers.push(BTreeSet::new());
            current_priority = Some(priority);
        }
        if let Some(tier) = tiers.last_mut() {
            tier.insert(provider_id.clone());
        }
    }

    PriorityTiers { tiers }
}

/// Supplies the priority document once per session.
#[async_trait]
pub trait PrioritySource: Send + Sync {
    async fn fetch(&self) -> Result<PaymentTypePriorityMap>;
}

/// Priorities taken from local configuration.
pub struct StaticPrioritySource {
    document: Option<PaymentTypePriorityMap>,
}

impl StaticPrioritySource {
    pub fn new(document: Option<PaymentTypePriorityMap>) -> Self {
        StaticPrioritySource { document }
    }
}

#[async_trait]
impl PrioritySource for StaticPrioritySource {
    async fn fetch(&self) -> Result<PaymentTypePriorityMap> {
        self.document
            .clone()
            .ok_or_else(|| anyhow::anyhow!("No priority document configured"))
    }
}
