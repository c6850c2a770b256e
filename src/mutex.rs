//! The lock coordinator: acquire/release keyed by job identity, with the
//! lease derived from the job's own schedule.

use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::{config::MutexConfig, error::CronError, schedule, traits::LockStore};

pub struct CronMutex<S: LockStore> {
    store: S,
    key_prefix: String,
    lag_factor: f64,
    store_timeout: Duration,
    /// Stored as the lock value so a held lock identifies its owner replica.
    node_id: String,
}

impl<S: LockStore> CronMutex<S> {
    pub fn new(store: S, conf: &MutexConfig) -> Self {
        let conf = conf.clone().normalized();
        Self {
            store,
            key_prefix: conf.key_prefix,
            lag_factor: conf.lag_factor,
            store_timeout: Duration::from_secs(conf.store_timeout_sec),
            node_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// One lock key per job name; the name is the sole identity.
    ///
    /// A trailing `/` in the prefix is collapsed into the single separator,
    /// so the prefixes `"jobs"` and `"jobs/"` alias to the same key space.
    fn lock_key(&self, job_name: &str) -> String {
        format!("{}/{}", self.key_prefix.trim_end_matches('/'), job_name)
    }

    /// Try to claim the current occurrence of `job_name`.
    ///
    /// The lease is `(next fire − now) × (1 + lag_factor)`, computed fresh on
    /// every attempt, so the lock outlives the occurrence by the safety
    /// margin and then expires on its own, with no renewal and no heartbeat.
    ///
    /// Returns [`CronError::AlreadyLocked`] when another replica holds the
    /// occurrence (recoverable, expected) and [`CronError::Store`] on any
    /// transport failure or timeout.
    pub async fn acquire(&self, job_name: &str, schedule_expr: &str) -> Result<(), CronError> {
        let lease = schedule::lease_duration(schedule_expr, Utc::now(), self.lag_factor)?;
        let key = self.lock_key(job_name);

        let attempt = self
            .store
            .set_if_absent(key.clone(), self.node_id.clone(), lease);
        match tokio::time::timeout(self.store_timeout, attempt).await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(CronError::AlreadyLocked),
            Ok(Err(e)) => Err(CronError::Store(e.to_string())),
            Err(_) => Err(CronError::Store(format!(
                "acquire of '{key}' timed out after {:?}",
                self.store_timeout
            ))),
        }
    }

    /// Drop the lock for `job_name`. Deleting a key that is absent (already
    /// expired, or never held) is not an error.
    pub async fn release(&self, job_name: &str) -> Result<(), CronError> {
        let key = self.lock_key(job_name);

        let attempt = self.store.delete(key.clone());
        match tokio::time::timeout(self.store_timeout, attempt).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(CronError::Store(e.to_string())),
            Err(_) => Err(CronError::Store(format!(
                "release of '{key}' timed out after {:?}",
                self.store_timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockLockStore;

    const EVERY_MINUTE: &str = "0 * * * * *";

    fn mutex(store: MockLockStore) -> CronMutex<MockLockStore> {
        CronMutex::new(store, &MutexConfig::default())
    }

    #[tokio::test]
    async fn second_acquire_before_release_is_already_locked() {
        let store = MockLockStore::new();
        let m = mutex(store);

        m.acquire("backup", EVERY_MINUTE).await.unwrap();
        let err = m.acquire("backup", EVERY_MINUTE).await.unwrap_err();
        assert!(err.is_already_locked());
    }

    #[tokio::test]
    async fn acquire_succeeds_again_after_release() {
        let store = MockLockStore::new();
        let m = mutex(store);

        m.acquire("backup", EVERY_MINUTE).await.unwrap();
        m.release("backup").await.unwrap();
        m.acquire("backup", EVERY_MINUTE).await.unwrap();
    }

    #[tokio::test]
    async fn release_of_non_held_lock_is_not_an_error() {
        let store = MockLockStore::new();
        let m = mutex(store);

        m.release("never-acquired").await.unwrap();
    }

    #[tokio::test]
    async fn different_job_names_do_not_contend() {
        let store = MockLockStore::new();
        let m = mutex(store);

        m.acquire("backup", EVERY_MINUTE).await.unwrap();
        m.acquire("report", EVERY_MINUTE).await.unwrap();
    }

    #[tokio::test]
    async fn lock_key_is_prefix_slash_name() {
        let store = MockLockStore::new();
        let m = mutex(store.clone());

        m.acquire("backup", EVERY_MINUTE).await.unwrap();
        assert!(store.contains("cron-defaults/backup"));
    }

    #[tokio::test]
    async fn custom_prefix_without_trailing_slash_gets_one_separator() {
        let store = MockLockStore::new();
        let conf = MutexConfig {
            key_prefix: "jobs".to_string(),
            ..Default::default()
        };
        let m = CronMutex::new(store.clone(), &conf);

        m.acquire("backup", EVERY_MINUTE).await.unwrap();
        assert!(store.contains("jobs/backup"));
    }

    #[tokio::test]
    async fn prefix_with_and_without_trailing_slash_share_a_key_space() {
        let store = MockLockStore::new();
        let plain = CronMutex::new(
            store.clone(),
            &MutexConfig {
                key_prefix: "jobs".to_string(),
                ..Default::default()
            },
        );
        let slashed = CronMutex::new(
            store.clone(),
            &MutexConfig {
                key_prefix: "jobs/".to_string(),
                ..Default::default()
            },
        );

        plain.acquire("backup", EVERY_MINUTE).await.unwrap();
        let err = slashed.acquire("backup", EVERY_MINUTE).await.unwrap_err();
        assert!(err.is_already_locked());
    }

    #[tokio::test]
    async fn non_finite_lag_factor_from_config_does_not_panic_acquire() {
        let store = MockLockStore::new();
        let m = CronMutex::new(
            store.clone(),
            &MutexConfig {
                lag_factor: f64::NAN,
                ..Default::default()
            },
        );

        m.acquire("backup", EVERY_MINUTE).await.unwrap();
        assert!(store.ttl_of("cron-defaults/backup").unwrap() > Duration::ZERO);
    }

    #[tokio::test]
    async fn lease_handed_to_store_matches_formula() {
        let store = MockLockStore::new();
        let m = mutex(store.clone());

        // Every-minute schedule with the default 0.5 lag factor: the lease
        // is at most 60s × 1.5, and strictly positive.
        m.acquire("backup", EVERY_MINUTE).await.unwrap();
        let ttl = store.ttl_of("cron-defaults/backup").unwrap();
        assert!(ttl > Duration::ZERO);
        assert!(ttl <= Duration::from_secs(90));
    }

    #[tokio::test]
    async fn store_failure_is_a_transport_error_not_already_locked() {
        let store = MockLockStore::new();
        store.set_unreachable(true);
        let m = mutex(store);

        let err = m.acquire("backup", EVERY_MINUTE).await.unwrap_err();
        assert!(matches!(err, CronError::Store(_)));
        let err = m.release("backup").await.unwrap_err();
        assert!(matches!(err, CronError::Store(_)));
    }

    #[tokio::test]
    async fn malformed_expression_fails_before_touching_the_store() {
        let store = MockLockStore::new();
        let m = mutex(store.clone());

        let err = m.acquire("backup", "garbage").await.unwrap_err();
        assert!(matches!(err, CronError::InvalidCronExpression { .. }));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn expired_lease_frees_the_lock() {
        let store = MockLockStore::new();
        let m = mutex(store.clone());

        m.acquire("backup", EVERY_MINUTE).await.unwrap();
        store.expire_now("cron-defaults/backup");
        m.acquire("backup", EVERY_MINUTE).await.unwrap();
    }
}
