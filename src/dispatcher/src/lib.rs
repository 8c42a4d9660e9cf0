use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use object_store::{ObjectStore, path::Path};
use serde::{Deserialize, Serialize};

use common::config::DispatcherConfig;
use common::error::ValidationError;
use common::model::PartitionKey;
use eraser::{ErasureOrchestrator, ErasureOutcome};

/// One newline-delimited record from a delete-request file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRecord {
    pub payer_key: i64,
    pub member_key: i64,
}

/// File-level failures. Member-level erasure failures are not errors of the
/// file; they land in the [`JobReport`].
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("object storage failure: {0}")]
    Storage(#[from] object_store::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// A member whose erasure failed terminally. The member stays in the source
/// data and is picked up again when the job is resubmitted.
#[derive(Debug)]
pub struct MemberFailure {
    pub key: PartitionKey,
    pub reason: String,
}

/// Outcome of one delete-request file.
#[derive(Debug)]
pub struct JobReport {
    pub file: String,
    pub erased: usize,
    pub failures: Vec<MemberFailure>,
}

impl JobReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of a batch of files. A file that could not be read or decoded
/// does not abort its siblings.
#[derive(Debug, Default)]
pub struct DispatchSummary {
    pub reports: Vec<JobReport>,
    pub failed_files: Vec<(String, DispatchError)>,
}

impl DispatchSummary {
    pub fn is_clean(&self) -> bool {
        self.failed_files.is_empty() && self.reports.iter().all(JobReport::is_clean)
    }
}

/// Decode the newline-delimited member records of one file. A malformed
/// line rejects the whole file before any store call is made.
pub fn decode_members(bytes: &[u8]) -> Result<Vec<MemberRecord>, ValidationError> {
    let mut members = Vec::new();
    for (index, line) in bytes.split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let record: MemberRecord =
            serde_json::from_slice(line).map_err(|e| ValidationError::MalformedRecord {
                line: index + 1,
                reason: e.to_string(),
            })?;
        members.push(record);
    }
    Ok(members)
}

/// Turns delete-request files into erasure runs: downloads a file, fans its
/// members out over a bounded worker pool, collects terminal failures into
/// the returned report, and archive-moves the file when done.
pub struct JobDispatcher {
    object_store: Arc<dyn ObjectStore>,
    orchestrator: ErasureOrchestrator,
    worker_width: usize,
    source_prefix: String,
    archive_prefix: String,
}

impl JobDispatcher {
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        orchestrator: ErasureOrchestrator,
        config: &DispatcherConfig,
        worker_width: usize,
    ) -> Self {
        Self {
            object_store,
            orchestrator,
            worker_width: worker_width.max(1),
            source_prefix: config.source_prefix.clone(),
            archive_prefix: config.archive_prefix.clone(),
        }
    }

    /// List the delete-request files waiting under the source prefix.
    pub async fn list_files(&self) -> Result<Vec<Path>, DispatchError> {
        let prefix = Path::from(self.source_prefix.as_str());
        let files: Vec<Path> = self
            .object_store
            .list(Some(&prefix))
            .map_ok(|meta| meta.location)
            .try_collect()
            .await?;
        Ok(files)
    }

    /// Process a batch of files. Each file is isolated: a failure is logged
    /// and recorded without aborting the rest.
    pub async fn process_files(&self, files: Vec<Path>) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        for file in files {
            match self.process_file(&file).await {
                Ok(report) => summary.reports.push(report),
                Err(err) => {
                    log::error!("failed to process {file}: {err}");
                    summary.failed_files.push((file.to_string(), err));
                }
            }
        }
        summary
    }

    /// Process one file: decode every member record up front, erase the
    /// members in parallel (each member's own statement chain stays strictly
    /// sequential inside the orchestrator), then archive-move the file.
    pub async fn process_file(&self, file: &Path) -> Result<JobReport, DispatchError> {
        let bytes = self.object_store.get(file).await?.bytes().await?;
        let members = decode_members(&bytes)?;
        log::info!("processing {file}: {} member(s)", members.len());

        let results: Vec<(PartitionKey, Result<ErasureOutcome, eraser::EraseError>)> =
            stream::iter(members)
                .map(|member| async move {
                    let key = PartitionKey::new(member.payer_key, member.member_key);
                    let outcome = self
                        .orchestrator
                        .erase(member.payer_key, member.member_key)
                        .await;
                    (key, outcome)
                })
                .buffer_unordered(self.worker_width)
                .collect()
                .await;

        let mut report = JobReport {
            file: file.to_string(),
            erased: 0,
            failures: Vec::new(),
        };
        for (key, outcome) in results {
            match outcome {
                Ok(_) => report.erased += 1,
                Err(err) => {
                    log::error!("erasure failed for {key}: {err}");
                    report.failures.push(MemberFailure {
                        key,
                        reason: err.to_string(),
                    });
                }
            }
        }

        self.archive(file).await?;
        log::info!(
            "finished {file}: {} erased, {} failed",
            report.erased,
            report.failures.len()
        );
        Ok(report)
    }

    /// Move a processed file under the archive prefix (copy, then delete;
    /// object stores have no rename across prefixes).
    async fn archive(&self, file: &Path) -> Result<(), DispatchError> {
        let target = Path::from(format!("{}/{}", self.archive_prefix, file));
        self.object_store.copy(file, &target).await?;
        self.object_store.delete(file).await?;
        log::debug!("archived {file} to {target}");
        Ok(())
    }
}
