//! Error types for stash-state

use thiserror::Error;

/// Coarse classification of a [`StoreError`].
///
/// Callers branch on this rather than on individual variants: `NotFound` and
/// `InvalidArgument` are final, `Unavailable` may succeed on a later attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Unavailable,
    InvalidArgument,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::InvalidArgument => write!(f, "invalid_argument"),
        }
    }
}

/// Errors that can occur in the artifact store and memory index
#[derive(Error, Debug)]
pub enum StoreError {
    /// No artifact with this name exists under the identity key
    #[error("artifact not found: {name}")]
    ArtifactNotFound { name: String },

    /// The artifact exists but the requested version does not
    #[error("artifact {name} has no version {version}")]
    VersionNotFound { name: String, version: u64 },

    /// Malformed identity key, empty artifact name, bad configuration value
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Backing medium failure (connection, query, lock, task join)
    #[error("storage backend unavailable: {0}")]
    Backend(String),

    /// Stored payload could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ArtifactNotFound { .. } | Self::VersionNotFound { .. } => ErrorKind::NotFound,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Backend(_) | Self::Serialization(_) | Self::Io(_) => ErrorKind::Unavailable,
        }
    }

    /// Whether a caller may reasonably retry the operation.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Unavailable
    }

    /// Status code a transport layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::Unavailable => 503,
            ErrorKind::InvalidArgument => 400,
        }
    }
}

impl From<surrealdb::Error> for StoreError {
    fn from(err: surrealdb::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_variants_classify_as_not_found() {
        let missing = StoreError::ArtifactNotFound {
            name: "a.txt".into(),
        };
        let missing_version = StoreError::VersionNotFound {
            name: "a.txt".into(),
            version: 3,
        };
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        assert_eq!(missing_version.kind(), ErrorKind::NotFound);
        assert_eq!(missing.http_status(), 404);
        assert!(!missing.is_retryable());
    }

    #[test]
    fn backend_failures_are_retryable() {
        let io = StoreError::Io(std::io::Error::other("disk gone"));
        let backend = StoreError::Backend("connection reset".into());
        assert_eq!(io.kind(), ErrorKind::Unavailable);
        assert!(io.is_retryable());
        assert!(backend.is_retryable());
        assert_eq!(backend.http_status(), 503);
    }

    #[test]
    fn invalid_argument_maps_to_400() {
        let err = StoreError::InvalidArgument("empty artifact name".into());
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.http_status(), 400);
        assert!(!err.is_retryable());
    }

    #[test]
    fn serde_errors_become_serialization() {
        let err: StoreError = serde_json::from_str::<u64>("not json").unwrap_err().into();
        assert!(matches!(err, StoreError::Serialization(_)));
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn error_messages_name_the_artifact() {
        let err = StoreError::VersionNotFound {
            name: "report.md".into(),
            version: 7,
        };
        assert_eq!(err.to_string(), "artifact report.md has no version 7");
    }
}
