pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::cli::quote::{CliWallet, QuoteRequest};
use crate::core::aggregator::QuoteAggregator;
use crate::core::config::AppConfig;
use crate::core::provider::Direction;
use crate::store::KeyValueStore;
use anyhow::Result;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Assets {
        direction: Option<Direction>,
    },
    Quote {
        direction: Option<Direction>,
        provider: Option<String>,
        request: QuoteRequest,
    },
    ClearStore {
        provider_id: String,
    },
}

async fn build_aggregator(config: &AppConfig, store: &KeyValueStore) -> QuoteAggregator {
    let client = reqwest::Client::new();
    let providers = providers::initialize_providers(config, store, &client);
    let priority_source = providers::priority_source(config, &client);
    QuoteAggregator::load(providers, priority_source.as_ref(), config.aggregator_options()).await
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("fiatramp starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let store = KeyValueStore::new(&config.default_data_path()?);

    match command {
        AppCommand::Assets { direction } => {
            let direction = direction.unwrap_or(config.session.direction);
            let aggregator = build_aggregator(&config, &store).await;
            cli::assets::run(&aggregator, config.session.params(direction, None)).await
        }
        AppCommand::Quote {
            direction,
            provider,
            request,
        } => {
            let direction = direction.unwrap_or(config.session.direction);
            let aggregator = build_aggregator(&config, &store).await;
            let wallet = CliWallet::new(config.wallet_addresses.clone());
            cli::quote::run(
                &aggregator,
                config.session.params(direction, provider),
                &request,
                &wallet,
            )
            .await
        }
        AppCommand::ClearStore { provider_id } => {
            cli::clear_store::run(&config, &store, &provider_id)
        }
    }
}
