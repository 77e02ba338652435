pub mod disk;
pub mod memory;

use crate::core::cache::{KeyValueCollection, Store};
use disk::DiskCollection;
use fjall::{Keyspace, PartitionCreateOptions};
use memory::MemoryCollection;
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, RwLock},
};
use tracing::{debug, warn};

/// A thread-safe key-value store that can hold multiple collections.
///
/// Persistent collections fall back to `None` when the keyspace could not
/// be opened; in-memory collections are always available.
pub struct KeyValueStore {
    collections: RwLock<HashMap<String, Arc<dyn KeyValueCollection>>>,
    keyspace: Option<Keyspace>,
}

impl KeyValueStore {
    #[cfg(test)]
    pub(crate) fn new_for_test(path: &Path) -> Self {
        let keyspace = fjall::Config::new(path).temporary(true).open().ok();
        Self::with_keyspace(keyspace)
    }

    /// Opens (or creates) the on-disk store under `data_path`.
    pub fn new(data_path: &Path) -> Self {
        let store_dir = data_path.join("store");
        let keyspace = match fjall::Config::new(&store_dir).open() {
            Ok(keyspace) => Some(keyspace),
            Err(e) => {
                warn!("Failed to open store at {}: {e}", store_dir.display());
                None
            }
        };
        Self::with_keyspace(keyspace)
    }

    /// A store without persistence, every collection lives in memory.
    pub fn in_memory() -> Self {
        Self::with_keyspace(None)
    }

    fn with_keyspace(keyspace: Option<Keyspace>) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace,
        }
    }

    fn open_collection(&self, name: &str, persist: bool) -> Option<Arc<dyn KeyValueCollection>> {
        if !persist {
            return Some(Arc::new(MemoryCollection::new()));
        }
        let keyspace = self.keyspace.as_ref()?;
        match keyspace.open_partition(name, PartitionCreateOptions::default()) {
            Ok(partition) => Some(Arc::new(DiskCollection::new(partition))),
            Err(e) => {
                warn!("Failed to open collection {name}: {e}");
                None
            }
        }
    }
}

impl Store for KeyValueStore {
    fn get_collection(
        &self,
        name: &str,
        persist: bool,
        create_if_missing: bool,
    ) -> Option<Arc<dyn KeyValueCollection>> {
        let key = format!("{name}:{persist}");
        if let Some(collection) = self
            .collections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            return Some(Arc::clone(collection));
        }
        if !create_if_missing {
            return None;
        }

        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        if let Some(collection) = collections.get(&key) {
            return Some(Arc::clone(collection));
        }
        let collection = self.open_collection(name, persist)?;
        debug!("Opened collection {name} (persist: {persist})");
        collections.insert(key, Arc::clone(&collection));
        Some(collection)
    }

    fn remove_collection(&self, name: &str) -> bool {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        let in_memory = collections.remove(&format!("{name}:false")).is_some();
        let on_disk = collections.remove(&format!("{name}:true")).is_some();

        let mut deleted = false;
        if let Some(keyspace) = &self.keyspace
            && keyspace.partition_exists(name)
        {
            let removed = keyspace
                .open_partition(name, PartitionCreateOptions::default())
                .and_then(|partition| keyspace.delete_partition(partition));
            match removed {
                Ok(()) => deleted = true,
                Err(e) => warn!("Failed to delete collection {name}: {e}"),
            }
        }
        in_memory || on_disk || deleted
    }
}
