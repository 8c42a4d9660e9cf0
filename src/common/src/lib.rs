pub mod config;
pub mod error;
pub mod model;
pub mod storage;
pub mod store;

pub use error::{ConfigurationError, StoreError, ValidationError};
pub use model::{DeleteWindow, ErasureJob, Granularity, PartitionKey};
pub use store::ClaimStore;
