use crate::core::cache::KeyValueCollection;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= Instant::now())
    }
}

/// Collection that lives as long as the process.
#[derive(Default)]
pub struct MemoryCollection {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueCollection for MemoryCollection {
    async fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                debug!("Memory entry expired for key: {key}");
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => {
                debug!("Memory MISS for key: {key}");
                None
            }
        }
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) {
        let expires_at = ttl.map(|duration| Instant::now() + duration);
        self.entries
            .lock()
            .await
            .insert(key.to_string(), Entry { value, expires_at });
    }
}
