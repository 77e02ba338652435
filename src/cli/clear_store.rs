use super::ui;
use crate::core::cache::Store;
use crate::core::config::AppConfig;
use anyhow::{Result, bail};
use tracing::info;

/// Deletes everything a provider persisted between runs, e.g. its account id.
pub fn run(config: &AppConfig, store: &dyn Store, provider_id: &str) -> Result<()> {
    let Some(provider) = config.providers.iter().find(|p| p.id == provider_id) else {
        bail!("Unknown provider: {provider_id}");
    };

    let store_id = provider.store_id();
    let message = if store.remove_collection(store_id) {
        info!("Removed data store {store_id} for {provider_id}");
        format!("Cleared stored data for {provider_id}")
    } else {
        format!("No stored data for {provider_id}")
    };
    println!("{}", ui::style_text(&message, ui::StyleType::Value));
    Ok(())
}
