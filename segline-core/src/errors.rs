use thiserror::Error;

/// Result type used across the Segline crates.
pub type Result<T> = std::result::Result<T, SegmentError>;

/// Canonical error representation shared by every Segline crate.
///
/// Every variant aborts the enclosing transaction; none is retried.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("invalid boundary: {0}")]
    InvalidBoundary(String),

    #[error("range {proposed} overlaps existing segment(s): {existing}")]
    Overlap { proposed: String, existing: String },

    #[error("range {range} is not within span range {span_range}")]
    OutOfSpanRange { range: String, span_range: String },

    #[error("segment {segment} has no {direction} neighbor")]
    NoNeighbor {
        segment: String,
        direction: &'static str,
    },

    #[error("split value {value} is not strictly inside {range}")]
    InvalidSplitPoint { value: String, range: String },

    #[error("misconfigured model: {0}")]
    Misconfigured(String),

    /// Raised by the relationship validation pass and consumed by the repair.
    #[error("segment relationships out of order: {0}")]
    RelationshipInconsistency(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("span not found: {0}")]
    SpanNotFound(String),

    #[error("segment not found: {0}")]
    SegmentNotFound(String),

    #[error("segment {segment} is referenced as previous segment by {referenced_by}")]
    ProtectedPrevious {
        segment: String,
        referenced_by: String,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SegmentError {
    pub fn type_mismatch(expected: impl ToString, found: impl ToString) -> Self {
        SegmentError::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub fn invalid_boundary(message: impl Into<String>) -> Self {
        SegmentError::InvalidBoundary(message.into())
    }

    pub fn misconfigured(message: impl Into<String>) -> Self {
        SegmentError::Misconfigured(message.into())
    }

    /// Whether the error reports a broken partition invariant rather than an
    /// infrastructure failure.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            SegmentError::TypeMismatch { .. }
                | SegmentError::InvalidBoundary(_)
                | SegmentError::Overlap { .. }
                | SegmentError::OutOfSpanRange { .. }
                | SegmentError::NoNeighbor { .. }
                | SegmentError::InvalidSplitPoint { .. }
                | SegmentError::ProtectedPrevious { .. }
        )
    }
}

impl From<sqlx::Error> for SegmentError {
    fn from(err: sqlx::Error) -> Self {
        SegmentError::Storage(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for SegmentError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        SegmentError::Storage(err.to_string())
    }
}

/// Dedicated configuration error used by the settings module.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for environment variable {key}: {value}")]
    InvalidEnvVar { key: String, value: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ConfigError> for SegmentError {
    fn from(value: ConfigError) -> Self {
        SegmentError::Config(value.to_string())
    }
}
