pub mod executor;
pub mod orchestrator;
pub mod retry;

pub use executor::{SECONDARY_DELETE_BATCH_SIZE, StatementExecutor};
pub use orchestrator::{EraseError, ErasureOrchestrator, ErasureOutcome};
