use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{ClaimStore, ConsistencyLevel, StoreResult};
use crate::error::StoreError;
use crate::model::{DeleteWindow, PartitionKey};

/// One statement kind executed against the backend, recorded in order so
/// tests can assert call counts and sequencing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statement {
    DeleteClaims,
    DeleteDuplicateChecks,
    ScanClaimNumbers,
    DeleteClaimsInWindow,
    DeleteDuplicateCheckBatch,
}

#[derive(Debug, Clone)]
struct ClaimRow {
    service_date: NaiveDate,
    claim_number: String,
}

#[derive(Debug, Default)]
struct State {
    claims: BTreeMap<PartitionKey, Vec<ClaimRow>>,
    duplicate_checks: BTreeMap<PartitionKey, BTreeSet<String>>,
    statements: Vec<Statement>,
    batch_sizes: Vec<usize>,
    transient_faults: usize,
}

/// In-memory [`ClaimStore`] backend.
///
/// Simulates the store's per-statement row-mutation quota: any range or
/// partition delete (and any scan) touching more than `row_quota` rows is
/// rejected the way the wire backend reports it, so the engine's fallback
/// and shrink paths can be exercised without a cluster. Batch deletes are
/// keyed by exact primary key and are never quota-bound.
pub struct MemoryClaimStore {
    state: Mutex<State>,
    row_quota: Option<usize>,
    consistency: ConsistencyLevel,
}

impl MemoryClaimStore {
    pub fn new(row_quota: Option<usize>, consistency: ConsistencyLevel) -> Self {
        Self {
            state: Mutex::new(State::default()),
            row_quota,
            consistency,
        }
    }

    /// Unbounded backend for tests that never hit the quota.
    pub fn unbounded() -> Self {
        Self::new(None, ConsistencyLevel::default())
    }

    pub fn consistency(&self) -> ConsistencyLevel {
        self.consistency
    }

    pub fn insert_claim(
        &self,
        key: PartitionKey,
        service_date: NaiveDate,
        claim_number: impl Into<String>,
    ) {
        let mut state = self.lock();
        state.claims.entry(key).or_default().push(ClaimRow {
            service_date,
            claim_number: claim_number.into(),
        });
    }

    pub fn insert_duplicate_check(&self, key: PartitionKey, claim_number: impl Into<String>) {
        let mut state = self.lock();
        state
            .duplicate_checks
            .entry(key)
            .or_default()
            .insert(claim_number.into());
    }

    pub fn claim_count(&self, key: &PartitionKey) -> usize {
        self.lock().claims.get(key).map_or(0, Vec::len)
    }

    pub fn duplicate_check_count(&self, key: &PartitionKey) -> usize {
        self.lock().duplicate_checks.get(key).map_or(0, BTreeSet::len)
    }

    /// Every statement executed so far, in order.
    pub fn statements(&self) -> Vec<Statement> {
        self.lock().statements.clone()
    }

    /// Sizes of the unlogged duplicate-check batches, in execution order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.lock().batch_sizes.clone()
    }

    pub fn clear_log(&self) {
        let mut state = self.lock();
        state.statements.clear();
        state.batch_sizes.clear();
    }

    /// Make the next `count` statements fail with a transient error before
    /// touching any data.
    pub fn inject_transient_faults(&self, count: usize) {
        self.lock().transient_faults = count;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // Poisoning only happens if a test panicked mid-statement.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin(&self, statement: Statement) -> StoreResult<()> {
        let mut state = self.lock();
        state.statements.push(statement);
        if state.transient_faults > 0 {
            state.transient_faults -= 1;
            return Err(StoreError::Transient("store timed out".to_string()));
        }
        Ok(())
    }

    fn check_quota(&self, rows: usize) -> StoreResult<()> {
        match self.row_quota {
            Some(quota) if rows > quota => Err(StoreError::from_rejection(format!(
                "Range delete requests are limited to {quota} rows, statement spans {rows}"
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ClaimStore for MemoryClaimStore {
    async fn delete_claims(&self, key: &PartitionKey) -> StoreResult<()> {
        self.begin(Statement::DeleteClaims)?;
        let rows = self.lock().claims.get(key).map_or(0, Vec::len);
        self.check_quota(rows)?;
        self.lock().claims.remove(key);
        Ok(())
    }

    async fn delete_duplicate_checks(&self, key: &PartitionKey) -> StoreResult<()> {
        self.begin(Statement::DeleteDuplicateChecks)?;
        let rows = self.lock().duplicate_checks.get(key).map_or(0, BTreeSet::len);
        self.check_quota(rows)?;
        self.lock().duplicate_checks.remove(key);
        Ok(())
    }

    async fn scan_claim_numbers(
        &self,
        key: &PartitionKey,
        window: &DeleteWindow,
    ) -> StoreResult<Vec<String>> {
        self.begin(Statement::ScanClaimNumbers)?;
        let state = self.lock();
        let matches: Vec<String> = state
            .claims
            .get(key)
            .map(|rows| {
                rows.iter()
                    .filter(|row| {
                        row.service_date >= window.from_inclusive()
                            && row.service_date < window.to_exclusive()
                    })
                    .map(|row| row.claim_number.clone())
                    .collect()
            })
            .unwrap_or_default();
        drop(state);
        self.check_quota(matches.len())?;
        Ok(matches)
    }

    async fn delete_claims_in_window(
        &self,
        key: &PartitionKey,
        window: &DeleteWindow,
    ) -> StoreResult<()> {
        self.begin(Statement::DeleteClaimsInWindow)?;
        let mut state = self.lock();
        let touched = state.claims.get(key).map_or(0, |rows| {
            rows.iter()
                .filter(|row| {
                    row.service_date >= window.from_inclusive()
                        && row.service_date < window.to_exclusive()
                })
                .count()
        });
        drop(state);
        self.check_quota(touched)?;
        let mut state = self.lock();
        if let Some(rows) = state.claims.get_mut(key) {
            rows.retain(|row| {
                row.service_date < window.from_inclusive()
                    || row.service_date >= window.to_exclusive()
            });
            if rows.is_empty() {
                state.claims.remove(key);
            }
        }
        Ok(())
    }

    async fn delete_duplicate_check_batch(
        &self,
        key: &PartitionKey,
        claim_numbers: &[String],
    ) -> StoreResult<()> {
        self.begin(Statement::DeleteDuplicateCheckBatch)?;
        let mut state = self.lock();
        state.batch_sizes.push(claim_numbers.len());
        if let Some(checks) = state.duplicate_checks.get_mut(key) {
            for claim_number in claim_numbers {
                checks.remove(claim_number);
            }
            if checks.is_empty() {
                state.duplicate_checks.remove(key);
            }
        }
        Ok(())
    }
}
