use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::error::{ConfigurationError, StoreError};
use crate::model::{DeleteWindow, PartitionKey};

/// Result type for store statement execution.
pub type StoreResult<T> = Result<T, StoreError>;

/// Consistency level applied to every statement a backend executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyLevel {
    #[default]
    LocalQuorum,
    Quorum,
    LocalOne,
}

/// The four primitive statements the erasure engine issues against the
/// partitioned column store, plus the full-partition secondary delete.
///
/// Backends prepare their statements once at construction and execute them
/// parameterized at the configured consistency level. A statement that the
/// store rejects for touching more rows than its per-statement quota must
/// surface as [`StoreError::QuotaExceeded`]; backends translate the raw
/// driver message through [`crate::error::StoreError::from_rejection`].
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Delete every primary-table row under `key`, regardless of service
    /// date or claim number. A no-op on an already-empty partition.
    async fn delete_claims(&self, key: &PartitionKey) -> StoreResult<()>;

    /// Delete every secondary duplicate-check row under `key`.
    async fn delete_duplicate_checks(&self, key: &PartitionKey) -> StoreResult<()>;

    /// Scan the primary table for claim numbers with a service date inside
    /// `window`. May return duplicates; callers deduplicate.
    async fn scan_claim_numbers(
        &self,
        key: &PartitionKey,
        window: &DeleteWindow,
    ) -> StoreResult<Vec<String>>;

    /// Range-bounded delete of primary rows under `key` inside `window`.
    async fn delete_claims_in_window(
        &self,
        key: &PartitionKey,
        window: &DeleteWindow,
    ) -> StoreResult<()>;

    /// Delete the duplicate-check rows for `claim_numbers` under `key` as a
    /// single unlogged batch. Callers bound the batch size; the batch is
    /// intentionally non-atomic.
    async fn delete_duplicate_check_batch(
        &self,
        key: &PartitionKey,
        claim_numbers: &[String],
    ) -> StoreResult<()>;
}

/// Build the store backend named by the configuration DSN.
///
/// Fails at startup for DSNs with no backend, so a misconfigured session
/// never survives to the first statement.
pub fn create_claim_store(config: &StoreConfig) -> Result<Arc<dyn ClaimStore>, ConfigurationError> {
    match config.dsn.as_str() {
        "memory://" => Ok(Arc::new(memory::MemoryClaimStore::new(
            config.row_quota,
            config.consistency,
        ))),
        other => Err(ConfigurationError::UnsupportedDsn(other.to_string())),
    }
}

pub mod memory;
pub use memory::MemoryClaimStore;
