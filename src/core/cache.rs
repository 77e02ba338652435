use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// String keyed storage handed to a single provider.
///
/// Failures are logged and surface as misses; provider state is always
/// recoverable by asking the provider again.
#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn put(&self, key: &str, value: String, ttl: Option<Duration>);
}

pub trait Store: Send + Sync {
    /// Opens the named collection, on disk when `persist` is set.
    fn get_collection(
        &self,
        name: &str,
        persist: bool,
        create_if_missing: bool,
    ) -> Option<Arc<dyn KeyValueCollection>>;

    fn remove_collection(&self, name: &str) -> bool;
}
