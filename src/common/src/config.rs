use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::store::ConsistencyLevel;

/// Column-store session configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend DSN. `memory://` selects the in-process backend.
    pub dsn: String,
    /// Consistency level for every statement.
    pub consistency: ConsistencyLevel,
    /// Per-statement row-mutation quota enforced by the in-memory backend;
    /// wire backends get this from the store itself.
    pub row_quota: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("memory://"),
            consistency: ConsistencyLevel::LocalQuorum,
            row_quota: None,
        }
    }
}

/// Object storage holding the delete-request files.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `memory://`, `file:///path`, or `s3://[key:secret@]host[:port]/bucket`.
    pub dsn: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("memory://"),
        }
    }
}

/// Bounded backoff applied to transient store failures. Orthogonal to the
/// quota-driven chunk shrink, which never sleeps.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Erasure engine tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErasureConfig {
    /// Lower bound of the deletion horizon, safely before any record's
    /// earliest possible service date.
    pub horizon_start: NaiveDate,
    /// Width of the per-job member worker pool.
    pub worker_width: usize,
    pub retry: RetryConfig,
}

impl Default for ErasureConfig {
    fn default() -> Self {
        Self {
            horizon_start: NaiveDate::from_ymd_opt(2000, 1, 1).expect("valid epoch date"),
            worker_width: 30,
            retry: RetryConfig::default(),
        }
    }
}

/// File intake and archival prefixes inside the object store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub source_prefix: String,
    pub archive_prefix: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            source_prefix: String::from("raw"),
            archive_prefix: String::from("deleted-members"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Configuration {
    pub store: StoreConfig,
    pub storage: StorageConfig,
    pub erasure: ErasureConfig,
    pub dispatcher: DispatcherConfig,
}

impl Configuration {
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file("claimscrub.toml"))
            .merge(Env::prefixed("CLAIMSCRUB__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("CLAIMSCRUB__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_run_configless() {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .extract::<Configuration>()
            .unwrap();

        assert_eq!(config.store.dsn, "memory://");
        assert_eq!(config.store.consistency, ConsistencyLevel::LocalQuorum);
        assert_eq!(config.erasure.worker_width, 30);
        assert_eq!(
            config.erasure.horizon_start,
            NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()
        );
        assert_eq!(config.erasure.retry.max_retries, 3);
        assert_eq!(config.erasure.retry.base_delay, Duration::from_millis(100));
        assert_eq!(config.dispatcher.archive_prefix, "deleted-members");
    }

    #[test]
    fn toml_file_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "claimscrub.toml",
                r#"
                [store]
                row_quota = 1000

                [erasure]
                horizon_start = "2010-06-15"
                worker_width = 4

                [erasure.retry]
                max_retries = 5
                base_delay = "50ms"
                "#,
            )?;

            let config = Configuration::load().expect("load");
            assert_eq!(config.store.row_quota, Some(1000));
            assert_eq!(config.erasure.worker_width, 4);
            assert_eq!(
                config.erasure.horizon_start,
                NaiveDate::from_ymd_opt(2010, 6, 15).unwrap()
            );
            assert_eq!(config.erasure.retry.max_retries, 5);
            assert_eq!(config.erasure.retry.base_delay, Duration::from_millis(50));
            Ok(())
        });
    }

    #[test]
    fn env_vars_override_with_double_underscore() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("CLAIMSCRUB__STORE__DSN", "memory://");
            jail.set_env("CLAIMSCRUB__DISPATCHER__SOURCE_PREFIX", "incoming");

            let config = Configuration::load().expect("load");
            assert_eq!(config.store.dsn, "memory://");
            assert_eq!(config.dispatcher.source_prefix, "incoming");
            Ok(())
        });
    }
}
