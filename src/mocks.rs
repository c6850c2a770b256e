//! Mock lock store for unit testing without a real Redis.
//!
//! Enabled with the `test-support` feature:
//!
//! ```toml
//! [dev-dependencies]
//! cron-mutex = { path = "...", features = ["test-support"] }
//! ```

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::{Duration, Instant};

use crate::traits::LockStore;

struct LockEntry {
    expires_at: Instant,
    /// The ttl as handed to `set_if_absent`, kept for assertions.
    ttl: Duration,
}

/// In-memory `LockStore` honoring expiry, with a switch to simulate the
/// store being unreachable.
#[derive(Clone, Default)]
pub struct MockLockStore {
    entries: Arc<Mutex<HashMap<String, LockEntry>>>,
    unreachable: Arc<AtomicBool>,
}

impl MockLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with a transport error.
    pub fn set_unreachable(&self, down: bool) {
        self.unreachable.store(down, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        purge_expired(&mut entries);
        entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        purge_expired(&mut entries);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The ttl that was handed to `set_if_absent` for `key`, if held.
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        let mut entries = self.entries.lock().unwrap();
        purge_expired(&mut entries);
        entries.get(key).map(|e| e.ttl)
    }

    /// Force a held lock to its natural-expiry state immediately.
    pub fn expire_now(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Instant::now();
        }
    }
}

fn purge_expired(entries: &mut HashMap<String, LockEntry>) {
    let now = Instant::now();
    entries.retain(|_, e| e.expires_at > now);
}

#[derive(Debug)]
pub struct MockStoreError(pub &'static str);

impl std::fmt::Display for MockStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MockStoreError {}

impl LockStore for MockLockStore {
    type Error = MockStoreError;

    async fn set_if_absent(
        &self,
        key: String,
        _value: String,
        ttl: Duration,
    ) -> Result<bool, MockStoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(MockStoreError("store unreachable"));
        }
        let mut entries = self.entries.lock().unwrap();
        purge_expired(&mut entries);
        if entries.contains_key(&key) {
            return Ok(false);
        }
        entries.insert(
            key,
            LockEntry {
                expires_at: Instant::now() + ttl,
                ttl,
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: String) -> Result<(), MockStoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(MockStoreError("store unreachable"));
        }
        self.entries.lock().unwrap().remove(&key);
        Ok(())
    }
}
