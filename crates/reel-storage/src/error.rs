//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    ConfigError(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    /// The backend answered with something that is not the API contract,
    /// typically an HTML error page from a proxy in front of the bucket.
    #[error("Unexpected response body: {0}")]
    UnexpectedResponse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("List failed: {0}")]
    ListFailed(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("AWS SDK error: {0}")]
    AwsSdk(String),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Network faults, 5xx answers and unparseable bodies are transient.
    /// Conflicts, permission errors and missing objects are not.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::UnexpectedResponse(_)
            | StorageError::Network(_)
            | StorageError::ServiceUnavailable(_) => true,
            StorageError::UploadFailed(msg)
            | StorageError::DownloadFailed(msg)
            | StorageError::ListFailed(msg)
            | StorageError::AwsSdk(msg) => looks_like_html(msg) || looks_like_network_fault(msg),
            _ => false,
        }
    }

    /// Whether the failure came from parsing a non-API (HTML) response.
    pub fn is_unexpected_response(&self) -> bool {
        match self {
            StorageError::UnexpectedResponse(_) => true,
            StorageError::UploadFailed(msg) | StorageError::AwsSdk(msg) => looks_like_html(msg),
            _ => false,
        }
    }
}

/// Heuristic for "expected JSON/XML, got an HTML page".
pub fn looks_like_html(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("<html")
        || lower.contains("<!doctype")
        || lower.contains("unexpected token '<'")
        || lower.contains("unexpected token <")
}

/// Heuristic for transport-level faults surfaced only as text.
pub fn looks_like_network_fault(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    [
        "connection reset",
        "econnreset",
        "timed out",
        "timeout",
        "dns error",
        "failed to lookup address",
        "enotfound",
        "broken pipe",
        "connection refused",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StorageError::UnexpectedResponse("x".into()).is_transient());
        assert!(StorageError::Network("reset".into()).is_transient());
        assert!(StorageError::ServiceUnavailable("503".into()).is_transient());
        assert!(!StorageError::Conflict("duplicate".into()).is_transient());
        assert!(!StorageError::PermissionDenied("403".into()).is_transient());
        assert!(!StorageError::NotFound("k".into()).is_transient());
    }

    #[test]
    fn test_html_in_message_is_transient() {
        let err = StorageError::upload_failed("Unexpected token '<', \"<html>\" is not valid JSON");
        assert!(err.is_transient());
        assert!(err.is_unexpected_response());
    }

    #[test]
    fn test_network_text_is_transient() {
        assert!(StorageError::upload_failed("connection reset by peer").is_transient());
        assert!(StorageError::AwsSdk("dns error: failed to lookup address".into()).is_transient());
        assert!(!StorageError::upload_failed("The resource already exists").is_transient());
    }
}
