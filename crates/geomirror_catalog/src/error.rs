//! Error types for catalog and cache operations.

use thiserror::Error;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors reported by a catalog client or a content cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The target resource already exists on the server.
    #[error("{0} already exists")]
    Conflict(String),

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The server answered with an unexpected status code.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Response status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The content cache failed.
    #[error("cache error: {0}")]
    Cache(String),

    /// A server base URL could not be used to build request URLs.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl CatalogError {
    /// Returns true if this error means the target is already present.
    ///
    /// Typed [`CatalogError::Conflict`] errors always qualify. Other errors
    /// qualify when their text mentions "already exists" or "409", which
    /// covers clients that only surface the server's raw message.
    pub fn is_conflict(&self) -> bool {
        match self {
            CatalogError::Conflict(_) => true,
            CatalogError::Http { status: 409, .. } => true,
            other => is_conflict_text(&other.to_string()),
        }
    }
}

/// Returns true if an error message describes an existing resource.
pub fn is_conflict_text(message: &str) -> bool {
    message.contains("already exists") || message.contains("409")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_conflict() {
        assert!(CatalogError::Conflict("workspace 'parks'".into()).is_conflict());
        assert!(CatalogError::Http {
            status: 409,
            message: String::new()
        }
        .is_conflict());
    }

    #[test]
    fn textual_conflict_fallback() {
        assert!(CatalogError::Transport("Workspace 'parks' already exists".into()).is_conflict());
        assert!(CatalogError::Transport("server said 409".into()).is_conflict());
        assert!(!CatalogError::Transport("connection refused".into()).is_conflict());
        assert!(!CatalogError::NotFound("style 'green'".into()).is_conflict());
    }

    #[test]
    fn error_display() {
        let err = CatalogError::Http {
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "HTTP 500: boom");

        let err = CatalogError::Conflict("store 'roads'".into());
        assert_eq!(err.to_string(), "store 'roads' already exists");
    }
}
