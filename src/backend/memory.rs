//! In-memory backend, primarily for tests.
//!
//! Storage is a process-wide map keyed by the label passed at
//! construction, so that two `MemoryBackend` instances created with the
//! same label observe each other's writes (see DESIGN.md).

use super::{Backend, BackendError, BackendResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

type Store = HashMap<String, Vec<u8>>;

static REGISTRY: LazyLock<Mutex<HashMap<String, Arc<Mutex<Store>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn store_for(label: &str) -> Arc<Mutex<Store>> {
    REGISTRY.lock().entry(label.to_string()).or_insert_with(|| Arc::new(Mutex::new(HashMap::new()))).clone()
}

/// Trivial in-memory backend mapping all operations onto a shared dict.
/// Does not persist across process restarts; intended for testing.
pub struct MemoryBackend {
    label: String,
    store: Arc<Mutex<Store>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new(label: &str) -> Self {
        Self { label: label.to_string(), store: store_for(label) }
    }

    /// Drop all state for `label`, freeing memory and severing sharing for
    /// any instance constructed with it afterwards. Test-only convenience.
    pub fn reset(label: &str) {
        REGISTRY.lock().remove(label);
    }
}

impl Backend for MemoryBackend {
    fn put(&mut self, name: &str, data: &[u8]) -> BackendResult<()> {
        self.store.lock().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn get(&mut self, name: &str) -> BackendResult<Vec<u8>> {
        self.store
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("{}:{name}", self.label)))
    }

    fn list(&mut self) -> BackendResult<Vec<String>> {
        Ok(self.store.lock().keys().cloned().collect())
    }

    fn delete(&mut self, name: &str) -> BackendResult<()> {
        self.store.lock().remove(name);
        Ok(())
    }

    fn exists(&mut self) -> BackendResult<bool> {
        Ok(true)
    }

    fn create(&mut self) -> BackendResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_and_listing() {
        let label = "test-round-trip";
        MemoryBackend::reset(label);
        let mut b = MemoryBackend::new(label);
        b.put("a", b"hello").unwrap();
        assert_eq!(b.get("a").unwrap(), b"hello");
        assert!(b.list().unwrap().contains(&"a".to_string()));
        b.delete("a").unwrap();
        assert!(!b.list().unwrap().contains(&"a".to_string()));
        assert!(b.get("a").is_err());
    }

    #[test]
    fn distinct_instances_with_same_label_share_state() {
        let label = "test-shared-label";
        MemoryBackend::reset(label);
        let mut b1 = MemoryBackend::new(label);
        let mut b2 = MemoryBackend::new(label);
        b1.put("k", b"v").unwrap();
        assert_eq!(b2.get("k").unwrap(), b"v");
    }

    #[test]
    fn distinct_labels_are_isolated() {
        let mut b1 = MemoryBackend::new("test-iso-1");
        let mut b2 = MemoryBackend::new("test-iso-2");
        b1.put("k", b"v1").unwrap();
        assert!(b2.get("k").is_err());
    }

    #[test]
    fn idempotent_put_last_writer_wins() {
        let mut b = MemoryBackend::new("test-idempotent-put");
        b.put("k", b"v1").unwrap();
        b.put("k", b"v1").unwrap();
        assert_eq!(b.get("k").unwrap(), b"v1");
        b.put("k", b"v2").unwrap();
        assert_eq!(b.get("k").unwrap(), b"v2");
    }
}
