//! Error types for Brainy operations.
//!
//! All fallible operations return `Result<T, BrainyError>`. Every variant
//! names the offending entity, field, or ID so callers can build
//! user-facing messages without re-deriving context.
use thiserror::Error;

/// The error type for all Brainy operations.
#[derive(Error, Debug)]
pub enum BrainyError {
    /// Null/undefined data, malformed fields, or a bad ID.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// Description of what was wrong with the input.
        reason: String,
    },

    /// A vector's length didn't match the store's configured dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The store's configured dimension.
        expected: usize,
        /// The length of the vector that was provided.
        actual: usize,
    },

    /// NaN, infinity, or a zero-norm vector where cosine distance is required.
    #[error("invalid vector: {reason}")]
    InvalidVector {
        /// Description of the invalid component.
        reason: String,
    },

    /// A noun type tag outside the closed enumeration.
    #[error("unknown noun type: '{0}'")]
    UnknownNounType(String),

    /// A verb type tag outside the closed enumeration.
    #[error("unknown verb type: '{0}'")]
    UnknownVerbType(String),

    /// Get/update/delete on a missing ID.
    #[error("not found: {kind} '{id}'")]
    NotFound {
        /// `"noun"` or `"verb"`.
        kind: &'static str,
        /// The ID that was not found.
        id: String,
    },

    /// A mutating operation was attempted by a reader.
    #[error("read-only: {operation} is not permitted in reader mode")]
    ReadOnly {
        /// The operation that was rejected.
        operation: &'static str,
    },

    /// A search was attempted by a writer that has not opted into search.
    #[error("write-only: {operation} is not permitted in writer mode")]
    WriteOnly {
        /// The operation that was rejected.
        operation: &'static str,
    },

    /// The instance is frozen; even statistics writes and log polling are disabled.
    #[error("frozen: {operation} is not permitted on a frozen instance")]
    Frozen {
        /// The operation that was rejected.
        operation: &'static str,
    },

    /// No role could be resolved for the config manager at startup.
    #[error("role required: no explicit config, ROLE env var, or hint resolved a role")]
    RoleRequired,

    /// A role string outside `reader | writer | hybrid`.
    #[error("invalid role: '{0}'")]
    InvalidRole(String),

    /// A storage backend I/O operation failed (after its own retry policy, if any).
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The external embedder failed to produce a vector.
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    /// A stored record's schema version is newer than this build supports.
    #[error("invalid data: {reason}")]
    InvalidData {
        /// Description of the unsupported record.
        reason: String,
    },

    /// Optimistic compare-and-set lost a race on a config or statistics record. Retryable.
    #[error("conflicting version: expected {expected}, found {found}")]
    ConflictingVersion {
        /// The version this writer expected to replace.
        expected: u64,
        /// The version actually present in storage.
        found: u64,
    },

    /// An unsupported parameter combination in the construction-time configuration.
    #[error("invalid config: {reason}")]
    InvalidConfig {
        /// Description of the unsupported combination.
        reason: String,
    },

    /// Serialization error converting a record to/from JSON.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Filesystem I/O error from the filesystem storage backend.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Brainy operations.
pub type BrainyResult<T> = Result<T, BrainyError>;
