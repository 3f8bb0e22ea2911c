use std::collections::BTreeMap;

use parking_lot::RwLock;

/// In-memory key-value handle injected under the `$KV` token.
///
/// This is the interface contract modules program against; a production
/// deployment points the same surface at a real backend.
#[derive(Debug, Default)]
pub struct KvStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl KvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.write().insert(key.into(), value.into());
    }

    /// Removes `key`, reporting whether it was present.
    pub fn del(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn flush(&self) {
        self.entries.write().clear();
    }
}
