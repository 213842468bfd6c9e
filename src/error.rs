use thiserror::Error;

/// Catalog cache error types
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Cache lookup miss. Expected when the cache is stale or incomplete.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Query submission failed: {0}")]
    Submission(String),

    #[error("Query failed: {0}")]
    Poll(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CatalogError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound(_))
    }

    /// Message without the variant prefix, used as notification detail text.
    pub fn detail(&self) -> &str {
        match self {
            CatalogError::NotFound(msg)
            | CatalogError::Submission(msg)
            | CatalogError::Poll(msg)
            | CatalogError::UnsupportedOperation(msg)
            | CatalogError::Transport(msg)
            | CatalogError::Storage(msg)
            | CatalogError::Serialization(msg)
            | CatalogError::Validation(msg)
            | CatalogError::Internal(msg) => msg,
        }
    }
}

impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        CatalogError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        CatalogError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_strips_prefix() {
        let error = CatalogError::Submission("no query id".to_string());
        assert_eq!(error.detail(), "no query id");
        assert_eq!(error.to_string(), "Query submission failed: no query id");
    }

    #[test]
    fn test_is_not_found() {
        assert!(CatalogError::NotFound("db".to_string()).is_not_found());
        assert!(!CatalogError::Storage("disk".to_string()).is_not_found());
    }
}
