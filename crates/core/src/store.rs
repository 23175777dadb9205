//! Local persistence contract and the well-known state keys.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::errors::Result;

/// Key holding the serialized drain snapshot.
pub const STATE_KEY_DRAINS: &str = "drains";

/// Key holding the sync code of the remote blob linked to this device.
pub const STATE_KEY_SYNC_CODE: &str = "cloud_sync_id";

/// Key holding the set of already-fired alert keys.
pub const STATE_KEY_NOTIFIED: &str = "notified_alerts";

/// Durable key/value store for application state. Values are serialized
/// JSON strings; implementations are expected to be local and fast.
pub trait StateStore: Send + Sync {
    fn save(&self, key: &str, value: &str) -> Result<()>;
    fn load(&self, key: &str) -> Result<Option<String>>;
}

/// Volatile in-memory store for tests and ephemeral setups.
#[derive(Default)]
pub struct MemoryStateStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn save(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }
}
