use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures::future::BoxFuture;

use common::config::ErasureConfig;
use common::error::{StoreError, ValidationError};
use common::model::{DeleteWindow, ErasureJob, Granularity, PartitionKey};
use common::store::ClaimStore;

use crate::executor::StatementExecutor;

/// Terminal failure for one partition's erasure. Quota rejections are
/// handled internally and only surface as [`EraseError::QuotaFloor`] once a
/// one-month window still exceeds the store's limit.
#[derive(Debug, thiserror::Error)]
pub enum EraseError {
    /// A one-month window still spans more rows than one statement may
    /// touch. Non-retryable; the data is not silently skipped.
    #[error("window {window} for {key} still exceeds the store quota at one-month granularity")]
    QuotaFloor {
        key: PartitionKey,
        window: DeleteWindow,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// How a partition ended up erased, for logging and job reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErasureOutcome {
    /// One full-partition statement pair sufficed.
    FastPath,
    /// The partition exceeded the fast-path quota and was erased window by
    /// window.
    Windowed {
        windows: usize,
        /// Distinct claim numbers whose duplicate-check rows were cleaned.
        cleaned: usize,
    },
}

/// Guarantees a partition is fully erased regardless of its size.
///
/// Tries the cheap full-partition delete first; when the store rejects it
/// for exceeding the per-statement quota, tiles the horizon
/// `[horizon_start, today + 1 day)` into one-year windows and erases each,
/// shrinking the chunk granularity 12 → 6 → 3 → 1 months over any span that
/// keeps tripping the quota. Granularity never widens once shrunk within a
/// span; sibling spans stay at their own granularity.
pub struct ErasureOrchestrator {
    executor: StatementExecutor,
    horizon_start: NaiveDate,
}

impl ErasureOrchestrator {
    pub fn new(executor: StatementExecutor, horizon_start: NaiveDate) -> Self {
        Self {
            executor,
            horizon_start,
        }
    }

    pub fn from_config(store: Arc<dyn ClaimStore>, config: &ErasureConfig) -> Self {
        Self::new(
            StatementExecutor::new(store, config.retry.clone()),
            config.horizon_start,
        )
    }

    /// Erase every record belonging to `(payer_key, member_key)`.
    pub async fn erase(
        &self,
        payer_key: i64,
        member_key: i64,
    ) -> Result<ErasureOutcome, EraseError> {
        self.erase_job(&ErasureJob::full_partition(PartitionKey::new(
            payer_key, member_key,
        )))
        .await
    }

    /// Erase one job: the full partition, or just its explicit window when
    /// the caller has already scoped the work.
    pub async fn erase_job(&self, job: &ErasureJob) -> Result<ErasureOutcome, EraseError> {
        let key = job.key;
        if let Some(window) = job.window {
            let cleaned = self.erase_span(&key, window, Granularity::Twelve).await?;
            return Ok(ErasureOutcome::Windowed { windows: 1, cleaned });
        }

        match self.executor.erase_partition(&key).await {
            Ok(()) => {
                log::info!("erased partition {key} via fast path");
                Ok(ErasureOutcome::FastPath)
            }
            Err(err) if err.is_quota_exceeded() => {
                log::warn!("fast path over quota for {key}, switching to windowed mode");
                let horizon = DeleteWindow::horizon(self.horizon_start, Utc::now().date_naive())?;
                let outcome = self.erase_horizon(&key, horizon).await?;
                // The fast path may have emptied the primary table before its
                // secondary delete was rejected; window scans then observe no
                // claim numbers and the duplicate-check rows survive. The
                // per-window batches have drained every correlated row, so
                // sweep the remainder with one idempotent partition delete.
                self.executor.erase_duplicate_checks(&key).await?;
                Ok(outcome)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Windowed erasure over an explicit horizon. `erase_job` computes the
    /// horizon from the configured epoch and the current UTC date; tests
    /// pass a fixed one.
    pub async fn erase_horizon(
        &self,
        key: &PartitionKey,
        horizon: DeleteWindow,
    ) -> Result<ErasureOutcome, EraseError> {
        let windows = horizon.tile_months(Granularity::Twelve.months());
        let mut cleaned = 0;
        for window in &windows {
            cleaned += self.erase_span(key, *window, Granularity::Twelve).await?;
        }
        log::info!(
            "erased partition {key} via {} window(s), {cleaned} claim number(s) cleaned",
            windows.len()
        );
        Ok(ErasureOutcome::Windowed {
            windows: windows.len(),
            cleaned,
        })
    }

    /// Erase `span` in chunks of the given granularity. A chunk rejected for
    /// quota is retried over the same dates at the next narrower step;
    /// failing at one month is terminal.
    fn erase_span<'a>(
        &'a self,
        key: &'a PartitionKey,
        span: DeleteWindow,
        granularity: Granularity,
    ) -> BoxFuture<'a, Result<usize, EraseError>> {
        Box::pin(async move {
            let mut cleaned = 0;
            for chunk in span.tile_months(granularity.months()) {
                match self.executor.erase_window(key, &chunk).await {
                    Ok(count) => cleaned += count,
                    Err(err) if err.is_quota_exceeded() => match granularity.shrink() {
                        Some(narrower) => {
                            log::warn!(
                                "chunk {chunk} for {key} over quota at {granularity}, \
                                 retrying at {narrower}"
                            );
                            cleaned += self.erase_span(key, chunk, narrower).await?;
                        }
                        None => {
                            return Err(EraseError::QuotaFloor {
                                key: *key,
                                window: chunk,
                            });
                        }
                    },
                    Err(err) => return Err(err.into()),
                }
            }
            Ok(cleaned)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::config::RetryConfig;
    use common::store::memory::{MemoryClaimStore, Statement};
    use std::time::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn orchestrator(store: Arc<MemoryClaimStore>) -> ErasureOrchestrator {
        let retry = RetryConfig {
            base_delay: Duration::from_millis(1),
            ..Default::default()
        };
        ErasureOrchestrator::new(
            StatementExecutor::new(store, retry),
            date(2000, 1, 1),
        )
    }

    fn scan_count(statements: &[Statement]) -> usize {
        statements
            .iter()
            .filter(|s| **s == Statement::ScanClaimNumbers)
            .count()
    }

    #[tokio::test]
    async fn small_partition_takes_the_fast_path() {
        let store = Arc::new(MemoryClaimStore::new(Some(100), Default::default()));
        let key = PartitionKey::new(1, 10);
        store.insert_claim(key, date(2015, 3, 3), "CLM-1");
        store.insert_duplicate_check(key, "CLM-1");

        let outcome = orchestrator(store.clone()).erase(1, 10).await.unwrap();

        assert_eq!(outcome, ErasureOutcome::FastPath);
        // Exactly two statements, no scan.
        assert_eq!(
            store.statements(),
            vec![Statement::DeleteClaims, Statement::DeleteDuplicateChecks]
        );
        assert_eq!(store.claim_count(&key), 0);
        assert_eq!(store.duplicate_check_count(&key), 0);
    }

    #[tokio::test]
    async fn erasing_an_empty_partition_twice_succeeds() {
        let store = Arc::new(MemoryClaimStore::new(Some(10), Default::default()));
        let orchestrator = orchestrator(store);

        assert_eq!(
            orchestrator.erase(1, 10).await.unwrap(),
            ErasureOutcome::FastPath
        );
        assert_eq!(
            orchestrator.erase(1, 10).await.unwrap(),
            ErasureOutcome::FastPath
        );
    }

    #[tokio::test]
    async fn oversized_partition_is_erased_window_by_window() {
        // 12 rows total trips the quota of 5 on the fast path; no single
        // year holds more than 2 rows, so every window fits at 12 months.
        let store = Arc::new(MemoryClaimStore::new(Some(5), Default::default()));
        let key = PartitionKey::new(2, 20);
        for year in 0..12 {
            let claim_number = format!("CLM-{year}");
            store.insert_claim(key, date(2000 + year, 7, 1), &claim_number);
            store.insert_duplicate_check(key, &claim_number);
        }

        let orchestrator = orchestrator(store.clone());
        let horizon = DeleteWindow::new(date(2000, 1, 1), date(2024, 6, 1)).unwrap();
        store.clear_log();
        let outcome = orchestrator.erase_horizon(&key, horizon).await.unwrap();

        // 24 full years plus the clamped [2024-01-01, 2024-06-01) window.
        assert_eq!(
            outcome,
            ErasureOutcome::Windowed {
                windows: 25,
                cleaned: 12
            }
        );
        let statements = store.statements();
        assert_eq!(scan_count(&statements), 25);
        assert_eq!(
            statements
                .iter()
                .filter(|s| **s == Statement::DeleteClaimsInWindow)
                .count(),
            25
        );
        assert_eq!(store.claim_count(&key), 0);
        assert_eq!(store.duplicate_check_count(&key), 0);
    }

    #[tokio::test]
    async fn fallback_triggers_on_quota_and_erases_everything() {
        let store = Arc::new(MemoryClaimStore::new(Some(3), Default::default()));
        let key = PartitionKey::new(3, 30);
        for i in 0..8 {
            store.insert_claim(key, date(2010 + i, 4, 1), format!("CLM-{i}"));
        }

        let outcome = orchestrator(store.clone()).erase(3, 30).await.unwrap();

        assert!(matches!(outcome, ErasureOutcome::Windowed { .. }));
        // Fast path was attempted first and rejected.
        assert_eq!(store.statements()[0], Statement::DeleteClaims);
        assert_eq!(store.claim_count(&key), 0);
    }

    #[tokio::test]
    async fn hot_span_shrinks_to_three_months_while_others_stay_at_twelve() {
        // Quota 3. 2005 holds 2 rows per quarter: 8 > 3 at twelve months,
        // 4 > 3 at six, 2 <= 3 at three. Other years hold a single row.
        let store = Arc::new(MemoryClaimStore::new(Some(3), Default::default()));
        let key = PartitionKey::new(4, 40);
        for (i, month) in [1, 2, 4, 5, 7, 8, 10, 11].iter().enumerate() {
            store.insert_claim(key, date(2005, *month, 10), format!("HOT-{i}"));
        }
        store.insert_claim(key, date(2004, 6, 1), "COLD-2004");
        store.insert_claim(key, date(2006, 6, 1), "COLD-2006");

        let orchestrator = orchestrator(store.clone());
        let horizon = DeleteWindow::new(date(2004, 1, 1), date(2007, 1, 1)).unwrap();
        let outcome = orchestrator.erase_horizon(&key, horizon).await.unwrap();

        assert_eq!(
            outcome,
            ErasureOutcome::Windowed {
                windows: 3,
                cleaned: 10
            }
        );
        // 2004 and 2006 scan once each; 2005 scans at 12 months (rejected),
        // twice at 6 (rejected), then four times at 3 (each succeeds).
        assert_eq!(scan_count(&store.statements()), 2 + 1 + 2 + 4);
        assert_eq!(store.claim_count(&key), 0);
    }

    #[tokio::test]
    async fn fallback_sweeps_duplicate_checks_the_window_scans_never_saw() {
        // Primary trips the quota, so the claims survive into windowed mode
        // and their duplicate checks drain batch by batch; the two stale
        // rows with no primary counterpart are invisible to every window
        // scan and only the final partition sweep removes them.
        let store = Arc::new(MemoryClaimStore::new(Some(3), Default::default()));
        let key = PartitionKey::new(8, 80);
        for i in 0..8 {
            let claim_number = format!("CLM-{i}");
            store.insert_claim(key, date(2010 + i, 4, 1), &claim_number);
            store.insert_duplicate_check(key, &claim_number);
        }
        store.insert_duplicate_check(key, "STALE-1");
        store.insert_duplicate_check(key, "STALE-2");

        let outcome = orchestrator(store.clone()).erase(8, 80).await.unwrap();

        assert!(matches!(outcome, ErasureOutcome::Windowed { .. }));
        assert_eq!(store.claim_count(&key), 0);
        assert_eq!(store.duplicate_check_count(&key), 0);
        assert_eq!(
            store.statements().last(),
            Some(&Statement::DeleteDuplicateChecks)
        );
    }

    #[tokio::test]
    async fn secondary_only_quota_failure_is_not_reported_as_success() {
        // The primary fits under the quota and is deleted, but the ten
        // duplicate-check rows do not. Windowed mode then scans an empty
        // primary table and cleans nothing, and the final sweep is still
        // over quota: the run must fail rather than orphan the rows behind
        // a success report.
        let store = Arc::new(MemoryClaimStore::new(Some(5), Default::default()));
        let key = PartitionKey::new(1, 10);
        store.insert_claim(key, date(2015, 2, 1), "CLM-0");
        store.insert_claim(key, date(2016, 2, 1), "CLM-1");
        for i in 0..10 {
            store.insert_duplicate_check(key, format!("DUP-{i}"));
        }

        let err = orchestrator(store.clone()).erase(1, 10).await.unwrap_err();

        assert!(matches!(
            err,
            EraseError::Store(StoreError::QuotaExceeded(_))
        ));
        // Nothing was silently dropped: the unerased rows are still there.
        assert_eq!(store.duplicate_check_count(&key), 10);
    }

    #[tokio::test]
    async fn quota_failure_at_one_month_is_fatal() {
        // 5 rows inside a single month can never fit under a quota of 3.
        let store = Arc::new(MemoryClaimStore::new(Some(3), Default::default()));
        let key = PartitionKey::new(5, 50);
        for day in 1..=5 {
            store.insert_claim(key, date(2012, 8, day), format!("CLM-{day}"));
        }

        let orchestrator = orchestrator(store.clone());
        let horizon = DeleteWindow::new(date(2012, 1, 1), date(2013, 1, 1)).unwrap();
        let err = orchestrator.erase_horizon(&key, horizon).await.unwrap_err();

        match err {
            EraseError::QuotaFloor { window, .. } => {
                assert_eq!(window.from_inclusive(), date(2012, 8, 1));
                assert_eq!(window.to_exclusive(), date(2012, 9, 1));
            }
            other => panic!("expected QuotaFloor, got {other:?}"),
        }
        // The data is still there; nothing was silently skipped.
        assert_eq!(store.claim_count(&key), 5);
    }

    #[tokio::test]
    async fn non_quota_store_errors_propagate_without_fallback() {
        let store = Arc::new(MemoryClaimStore::unbounded());
        let key = PartitionKey::new(6, 60);
        store.insert_claim(key, date(2020, 1, 1), "CLM-1");
        // More transient faults than the retry budget allows.
        store.inject_transient_faults(10);

        let retry = RetryConfig {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
        };
        let orchestrator = ErasureOrchestrator::new(
            StatementExecutor::new(store.clone(), retry),
            date(2000, 1, 1),
        );

        let err = orchestrator.erase(6, 60).await.unwrap_err();
        assert!(matches!(err, EraseError::Store(StoreError::Transient(_))));
        // No windowed fallback was attempted.
        assert_eq!(scan_count(&store.statements()), 0);
    }

    #[tokio::test]
    async fn explicit_job_window_skips_the_fast_path() {
        let store = Arc::new(MemoryClaimStore::unbounded());
        let key = PartitionKey::new(7, 70);
        store.insert_claim(key, date(2019, 5, 5), "CLM-IN");
        store.insert_claim(key, date(2021, 5, 5), "CLM-OUT");

        let job = ErasureJob::windowed(
            key,
            DeleteWindow::new(date(2019, 1, 1), date(2020, 1, 1)).unwrap(),
        );
        let outcome = orchestrator(store.clone()).erase_job(&job).await.unwrap();

        assert_eq!(
            outcome,
            ErasureOutcome::Windowed {
                windows: 1,
                cleaned: 1
            }
        );
        assert!(!store.statements().contains(&Statement::DeleteClaims));
        assert_eq!(store.claim_count(&key), 1);
    }
}
