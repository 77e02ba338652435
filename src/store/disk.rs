use crate::core::cache::KeyValueCollection;
use anyhow::Result;
use async_trait::async_trait;
use fjall::PartitionHandle;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use tracing::debug;

#[derive(Serialize, Deserialize)]
struct DiskEntry {
    value: String,
    expires_at: Option<SystemTime>,
}

/// Collection backed by a fjall partition.
pub struct DiskCollection {
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn new(partition: PartitionHandle) -> Self {
        Self { partition }
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        let Some(raw) = self.partition.get(key)? else {
            return Ok(None);
        };
        let entry: DiskEntry = serde_json::from_slice(&raw)?;
        if entry
            .expires_at
            .is_some_and(|expires_at| SystemTime::now() > expires_at)
        {
            debug!("Disk entry expired for key: {key}");
            self.partition.remove(key)?;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    fn write(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let entry = DiskEntry {
            value,
            expires_at: ttl.map(|d| SystemTime::now() + d),
        };
        self.partition.insert(key, serde_json::to_vec(&entry)?)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &str) -> Option<String> {
        self.read(key).unwrap_or_else(|e| {
            debug!("Disk read failed for key {key}: {e}");
            None
        })
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) {
        if let Err(e) = self.write(key, value, ttl) {
            debug!("Disk write failed for key {key}: {e}");
        }
    }
}
