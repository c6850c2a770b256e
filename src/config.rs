use serde::{Deserialize, Serialize};

pub const DEFAULT_KEY_PREFIX: &str = "cron-defaults/";
pub const DEFAULT_LAG_FACTOR: f64 = 0.5;
pub const DEFAULT_STORE_TIMEOUT_SEC: u64 = 5;

/// Connection parameters for the shared lock store.
///
/// The credential is skipped on serialization and redacted from `Debug` so it
/// can never leak into logs or diagnostics.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing, default)]
    pub password: String,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: String::new(),
        }
    }
}

impl StoreConfig {
    /// Redis connection URL. The credential is embedded here and nowhere else.
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/", self.host, self.port)
        } else {
            format!("redis://:{}@{}:{}/", self.password, self.host, self.port)
        }
    }
}

/// What the tick handler does when the lock store is unreachable at acquire
/// time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutagePolicy {
    /// Run the job anyway. A store outage must not stall every job forever,
    /// at the cost of possible duplicate runs across replicas.
    #[default]
    FailOpen,
    /// Skip the occurrence. Preserves at-most-once across replicas, at the
    /// cost of zero runs while the store is down.
    FailClosed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MutexConfig {
    pub store: StoreConfig,
    /// Namespace for lock keys in the shared store. Empty means
    /// [`DEFAULT_KEY_PREFIX`].
    #[serde(default)]
    pub key_prefix: String,
    /// Fraction of the inter-fire interval added to the lease as safety
    /// margin. Values ≤ 0 mean [`DEFAULT_LAG_FACTOR`].
    #[serde(default)]
    pub lag_factor: f64,
    #[serde(default)]
    pub outage_policy: OutagePolicy,
    /// Skip a tick on this replica while the previous occurrence of the same
    /// job is still running locally.
    #[serde(default)]
    pub serialize_local: bool,
    /// Bound on each lock-store round trip. 0 means
    /// [`DEFAULT_STORE_TIMEOUT_SEC`].
    #[serde(default)]
    pub store_timeout_sec: u64,
    /// Optional bound on a single work invocation; on expiry the work's
    /// cancellation token is cancelled and the lock is released.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub work_timeout_sec: Option<u64>,
}

impl MutexConfig {
    /// Apply defaults for unset fields. Idempotent.
    pub fn normalized(mut self) -> Self {
        if self.key_prefix.is_empty() {
            self.key_prefix = DEFAULT_KEY_PREFIX.to_string();
        }
        // NaN/infinity would make the lease arithmetic panic downstream, so
        // non-finite values fall back like unset ones.
        if !self.lag_factor.is_finite() || self.lag_factor <= 0.0 {
            self.lag_factor = DEFAULT_LAG_FACTOR;
        }
        if self.store_timeout_sec == 0 {
            self.store_timeout_sec = DEFAULT_STORE_TIMEOUT_SEC;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_fills_defaults() {
        let conf = MutexConfig::default().normalized();
        assert_eq!(conf.key_prefix, DEFAULT_KEY_PREFIX);
        assert_eq!(conf.lag_factor, DEFAULT_LAG_FACTOR);
        assert_eq!(conf.store_timeout_sec, DEFAULT_STORE_TIMEOUT_SEC);
    }

    #[test]
    fn normalized_keeps_explicit_values() {
        let conf = MutexConfig {
            key_prefix: "jobs".to_string(),
            lag_factor: 0.25,
            store_timeout_sec: 2,
            ..Default::default()
        }
        .normalized();
        assert_eq!(conf.key_prefix, "jobs");
        assert_eq!(conf.lag_factor, 0.25);
        assert_eq!(conf.store_timeout_sec, 2);
    }

    #[test]
    fn negative_lag_factor_falls_back_to_default() {
        let conf = MutexConfig {
            lag_factor: -1.0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(conf.lag_factor, DEFAULT_LAG_FACTOR);
    }

    #[test]
    fn non_finite_lag_factor_falls_back_to_default() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let conf = MutexConfig {
                lag_factor: bad,
                ..Default::default()
            }
            .normalized();
            assert_eq!(conf.lag_factor, DEFAULT_LAG_FACTOR);
        }
    }

    #[test]
    fn password_never_appears_in_debug_output() {
        let store = StoreConfig {
            host: "redis.internal".to_string(),
            port: 6380,
            password: "s3cret".to_string(),
        };
        let rendered = format!("{store:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn password_never_appears_in_serialized_config() {
        let conf = MutexConfig {
            store: StoreConfig {
                host: "redis.internal".to_string(),
                port: 6379,
                password: "s3cret".to_string(),
            },
            ..Default::default()
        };
        let json = serde_json::to_string(&conf).unwrap();
        assert!(!json.contains("s3cret"));
    }

    #[test]
    fn url_embeds_credential_only_when_present() {
        let mut store = StoreConfig::default();
        assert_eq!(store.url(), "redis://127.0.0.1:6379/");
        store.password = "pw".to_string();
        assert_eq!(store.url(), "redis://:pw@127.0.0.1:6379/");
    }
}
