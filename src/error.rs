use thiserror::Error;

/// A single failed operation inside a bulk batch.
#[derive(Debug, Clone)]
pub struct BulkItemFailure {
    /// Zero-based position of the operation within the batch.
    pub position: usize,
    /// Document id the operation referred to.
    pub id: String,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum Error {
    /// Index creation, mapping application or health wait failed. Fatal, no retry.
    #[error("Setup error: {0}")]
    Setup(String),

    #[error("Mapping error: {0}")]
    Mapping(String),

    /// One or more documents in a bulk load failed. Never a partial success.
    #[error("Bulk failed for {} document(s), first: {}", .0.len(), .0.first().map(|f| f.reason.as_str()).unwrap_or("?"))]
    BulkPartialFailure(Vec<BulkItemFailure>),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// The specification cannot be translated for execution.
    #[error("Invalid specification: {0}")]
    InvalidSpec(String),

    /// A query/filter/facet request failed at the engine.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Required health was not reached within the caller's deadline.
    #[error("Cluster unavailable: {0}")]
    ClusterUnavailable(String),

    /// Test-level: actual response shape diverged from the expected one.
    #[error("Assertion mismatch: {0}")]
    AssertionMismatch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),
}

pub type Result<T> = std::result::Result<T, Error>;
