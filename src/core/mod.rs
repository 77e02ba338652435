//! Core quote aggregation logic and abstractions

pub mod aggregator;
pub mod assets;
pub mod cache;
pub mod config;
pub mod errors;
pub mod fuzzy;
pub mod log;
pub mod priority;
pub mod provider;
pub mod selection;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for cleaner imports
pub use aggregator::{
    AggregatorOptions, EditOutcome, MaxOutcome, Promotion, QuoteAggregator, QuoteFlow, RampSession,
    SessionError, SessionParams, SubmitOutcome,
};
pub use provider::{AmountType, Direction, Quote, RampProvider, WalletContext};
