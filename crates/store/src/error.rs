use thiserror::Error;

/// Result type for route store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in route store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend (transport, connectivity or engine) failure
    #[error("store backend error: {0}")]
    Backend(String),

    /// The operation was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// The store has been closed
    #[error("store is closed")]
    Closed,

    /// The operation did not complete before its deadline
    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    /// Stored bytes could not be decoded into a route
    #[error("failed to decode route {key}: {source}")]
    Decode {
        /// The key whose value failed to decode
        key: String,

        /// Underlying decode failure
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The key is empty or reserved
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The route can't be stored as given
    #[error("invalid route {key}: {reason}")]
    InvalidRoute {
        /// The key the route was to be stored under
        key: String,

        /// What is wrong with it
        reason: &'static str,
    },

    /// No route is stored under the key
    #[error("route not found: {0}")]
    NotFound(String),
}

/// Coarse classification of a [`StoreError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The key is absent. Expected, not a fault.
    NotFound,

    /// Stored data is corrupt or from an incompatible version.
    Decode,

    /// Transport, connectivity or backend-internal failure.
    Store,
}

impl StoreError {
    /// Build a decode error for `key`.
    pub fn decode(
        key: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Decode {
            key: key.into(),
            source: source.into(),
        }
    }

    /// Which part of the taxonomy this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Backend(_)
            | Self::Cancelled
            | Self::Closed
            | Self::DeadlineExceeded
            | Self::InvalidKey(_)
            | Self::InvalidRoute { .. } => ErrorKind::Store,
        }
    }

    /// Whether the error means the key is absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(StoreError::NotFound("a".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            StoreError::decode("a", "bad json").kind(),
            ErrorKind::Decode
        );
        assert_eq!(StoreError::Closed.kind(), ErrorKind::Store);
        assert_eq!(StoreError::Cancelled.kind(), ErrorKind::Store);
        assert_eq!(
            StoreError::Backend("boom".into()).kind(),
            ErrorKind::Store
        );
    }

    #[test]
    fn test_decode_error_message_names_key() {
        let err = StoreError::decode("go/docs", "expected value at line 1");
        assert_eq!(
            err.to_string(),
            "failed to decode route go/docs: expected value at line 1"
        );
    }
}
