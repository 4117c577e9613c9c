//! Error types for recommender operations.

pub type Result<T> = std::result::Result<T, SimrecError>;

/// Errors surfaced by recommender operations.
///
/// Configuration and argument errors are raised before any store traffic.
/// Redis transport and scripting errors pass through unchanged; the library
/// performs no retries and leaves logging policy to the caller.
#[derive(Debug, thiserror::Error)]
pub enum SimrecError {
    #[error("recommender name must not be empty")]
    EmptyName,

    #[error("matrix label must not be empty")]
    EmptyLabel,

    #[error("duplicate matrix label: {0}")]
    DuplicateLabel(String),

    #[error("matrix {label} has non-positive weight {weight}")]
    InvalidWeight { label: String, weight: f64 },

    #[error("unknown matrix label: {0}")]
    UnknownMatrix(String),

    #[error("empty identifier")]
    EmptyId,

    #[error("redis error: {0}")]
    Store(#[from] redis::RedisError),
}
