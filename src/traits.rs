use std::future::Future;
use std::time::Duration;

/// The two atomic primitives the lock protocol needs from a shared key-value
/// store. Implement this to swap the store out in tests.
///
/// The coordinator never reads-then-writes: all mutual exclusion rests on
/// `set_if_absent` being atomic on the store side.
pub trait LockStore: Send + Sync + Clone + 'static {
    type Error: std::error::Error + Send + Sync;

    /// Set `key` to `value` with expiry `ttl`, only if the key does not
    /// already exist. Returns `true` if the key was set (lock acquired).
    fn set_if_absent(
        &self,
        key: String,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Delete `key`. Absence of the key is not an error.
    fn delete(&self, key: String) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
