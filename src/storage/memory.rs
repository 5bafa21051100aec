//! In-process storage, used by tests and ephemeral setups.

use super::StateStorage;
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    values: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

/// Map-backed storage.
///
/// Clones share the same map, so a second store built from a clone sees
/// exactly what the first one persisted (a simulated restart).
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save`/`remove` fail with an IO error.
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Raw stored value, bypassing the failure switch.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner.values.lock().get(key).cloned()
    }

    /// Store a raw value, bypassing the failure switch.
    pub fn insert_raw(&self, key: &str, contents: &str) {
        self.inner
            .values
            .lock()
            .insert(key.to_string(), contents.to_string());
    }

    fn check_writable(&self) -> Result<()> {
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(io::Error::other("storage unavailable").into());
        }
        Ok(())
    }
}

impl StateStorage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.values.lock().get(key).cloned())
    }

    fn save(&self, key: &str, contents: &str) -> Result<()> {
        self.check_writable()?;
        self.insert_raw(key, contents);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check_writable()?;
        self.inner.values.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StateError;

    #[test]
    fn test_clones_share_values() {
        let storage = MemoryStorage::new();
        let other = storage.clone();

        storage.save("k", "v").unwrap();
        assert_eq!(other.load("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_failing_writes() {
        let storage = MemoryStorage::new();
        storage.save("k", "v1").unwrap();

        storage.set_failing(true);
        assert!(matches!(storage.save("k", "v2"), Err(StateError::Io(_))));
        assert!(matches!(storage.remove("k"), Err(StateError::Io(_))));
        assert_eq!(storage.load("k").unwrap().as_deref(), Some("v1"));

        storage.set_failing(false);
        storage.save("k", "v2").unwrap();
        assert_eq!(storage.raw("k").as_deref(), Some("v2"));
    }
}
