/// Substring the store reports when a single range delete would touch more
/// rows than it permits. This is the only place the store-specific signal
/// lives; backends call [`is_range_delete_limit`] when translating driver
/// errors so the rest of the engine only ever matches on
/// [`StoreError::QuotaExceeded`].
const RANGE_DELETE_LIMIT_SIGNAL: &str = "range delete requests are limited";

/// Classify a raw store error message as the per-statement row-mutation
/// quota rejection. Case-insensitive substring match, as the store does not
/// expose a structured code for it.
pub fn is_range_delete_limit(message: &str) -> bool {
    message.to_lowercase().contains(RANGE_DELETE_LIMIT_SIGNAL)
}

/// Errors surfaced by a [`crate::store::ClaimStore`] backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The statement would mutate more rows than the store permits at once.
    /// Recoverable: the caller falls back to windowed mode or shrinks its
    /// chunk granularity.
    #[error("statement exceeds the store's range delete quota: {0}")]
    QuotaExceeded(String),

    /// A timeout or unavailability that is expected to clear on retry.
    #[error("transient store failure: {0}")]
    Transient(String),

    /// Any other store-side rejection. Fatal for the current partition.
    #[error("store rejected statement: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    /// Translate a raw rejection message into the taxonomy, routing the
    /// quota signal through [`is_range_delete_limit`].
    pub fn from_rejection(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_range_delete_limit(&message) {
            StoreError::QuotaExceeded(message)
        } else {
            StoreError::Rejected(message)
        }
    }
}

/// Startup-time failures: an unusable session, an unsupported DSN, or a
/// statement that fails to prepare. These abort bootstrap rather than
/// surfacing at first use.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("unsupported store DSN '{0}'")]
    UnsupportedDsn(String),

    #[error("store session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Input rejected before any store call is made.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("malformed delete window: from {from} must precede to {to}")]
    EmptyWindow { from: String, to: String },

    #[error("malformed member record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },
}
