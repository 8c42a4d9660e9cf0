use std::collections::BTreeSet;
use std::sync::Arc;

use common::config::RetryConfig;
use common::error::StoreError;
use common::model::{DeleteWindow, PartitionKey};
use common::store::ClaimStore;

use crate::retry::with_backoff;

/// Upper bound on statements per unlogged duplicate-check batch. Bounds the
/// per-round-trip cost and stays under the store's own batch ceiling.
pub const SECONDARY_DELETE_BATCH_SIZE: usize = 30;

/// Translates partition-level and window-level erasure intents into store
/// statements. Transient failures are retried with backoff around every
/// primitive call; quota rejections pass through for the orchestrator to
/// handle.
pub struct StatementExecutor {
    store: Arc<dyn ClaimStore>,
    retry: RetryConfig,
}

impl StatementExecutor {
    pub fn new(store: Arc<dyn ClaimStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    /// Delete every row under `key` in both tables with two full-partition
    /// statements. No scan is needed: the partition deletes take every row
    /// regardless of service date or claim number. A no-op when the
    /// partition is already empty.
    pub async fn erase_partition(&self, key: &PartitionKey) -> Result<(), StoreError> {
        with_backoff(&self.retry, || self.store.delete_claims(key)).await?;
        with_backoff(&self.retry, || self.store.delete_duplicate_checks(key)).await?;
        Ok(())
    }

    /// Full-partition delete of the duplicate-check table only. The fast
    /// path's primary delete can succeed before its secondary delete is
    /// rejected, and window scans of an empty primary table observe no
    /// claim numbers; this sweeps whatever secondary rows remain.
    pub async fn erase_duplicate_checks(&self, key: &PartitionKey) -> Result<(), StoreError> {
        with_backoff(&self.retry, || self.store.delete_duplicate_checks(key)).await
    }

    /// Erase one service-date window: scan the window's claim numbers, range
    /// delete the primary rows, then clean the duplicate-check rows for the
    /// scanned claim numbers in batches.
    ///
    /// The scan must run before the range delete, because claim numbers are
    /// not derivable from the window bounds once the rows are gone. Only
    /// claim numbers observed by this window's own scan are cleaned; nothing
    /// is deleted speculatively.
    ///
    /// Returns the count of distinct claim numbers cleaned.
    pub async fn erase_window(
        &self,
        key: &PartitionKey,
        window: &DeleteWindow,
    ) -> Result<usize, StoreError> {
        let scanned = with_backoff(&self.retry, || self.store.scan_claim_numbers(key, window)).await?;
        let distinct: BTreeSet<String> = scanned.into_iter().collect();

        with_backoff(&self.retry, || self.store.delete_claims_in_window(key, window)).await?;

        let claim_numbers: Vec<String> = distinct.into_iter().collect();
        for batch in claim_numbers.chunks(SECONDARY_DELETE_BATCH_SIZE) {
            with_backoff(&self.retry, || {
                self.store.delete_duplicate_check_batch(key, batch)
            })
            .await?;
        }

        log::debug!(
            "erased window {window} for {key}: {} distinct claim number(s) cleaned",
            claim_numbers.len()
        );
        Ok(claim_numbers.len())
    }
}
