//! Session state: the shared artifact carrier threaded through a run.

use crate::errors::MissingArtifactError;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Thread-safe key/value carrier for artifacts produced by earlier stages
/// and consumed by later ones.
///
/// `set` is the only mutation path and overwrites unconditionally; readers
/// always see the most recently committed value for a key. Stages only
/// ever observe committed values, never the working data of an
/// in-progress retry attempt. Across the fork/join point concurrent
/// writers touch disjoint keys by stage declaration, so no ordering
/// protocol beyond the lock is needed.
#[derive(Debug, Default)]
pub struct SessionState {
    artifacts: RwLock<BTreeMap<String, serde_json::Value>>,
}

impl SessionState {
    /// Creates an empty session state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Commits an artifact under a key, overwriting any previous value.
    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.artifacts.write().insert(key.into(), value);
    }

    /// Reads a committed artifact.
    ///
    /// # Errors
    ///
    /// Returns [`MissingArtifactError`] if the key was never set.
    pub fn get(&self, key: &str) -> Result<serde_json::Value, MissingArtifactError> {
        self.artifacts
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| MissingArtifactError::new(key))
    }

    /// Reads a committed artifact, or `None` if the key was never set.
    #[must_use]
    pub fn get_opt(&self, key: &str) -> Option<serde_json::Value> {
        self.artifacts.read().get(key).cloned()
    }

    /// Checks whether a key has been committed.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.artifacts.read().contains_key(key)
    }

    /// Returns an immutable copy of all committed artifacts.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, serde_json::Value> {
        self.artifacts.read().clone()
    }

    /// Returns the committed keys in sorted order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.artifacts.read().keys().cloned().collect()
    }

    /// Returns the number of committed artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    /// Returns true if nothing has been committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.read().is_empty()
    }
}
