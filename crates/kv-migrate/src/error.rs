//! Error types for the migration library.

use std::time::Duration;
use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error returned by the store client.
    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    /// Store could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A store command did not finish within its timeout.
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// The value read from the source does not have the declared type.
    #[error("type mismatch for key {key}: expected {expected}, got {actual}")]
    TypeMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    /// The key holds a type the engine cannot migrate.
    #[error("unsupported key type {key_type} for key {key}")]
    UnsupportedType { key: String, key_type: String },

    /// The key does not exist.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Transfer of a single key failed.
    #[error("Transfer failed for key {key}: {message}")]
    Transfer { key: String, message: String },

    /// A store call made for one key failed.
    #[error("{step} failed for key {key}: {source}")]
    KeyOperation {
        key: String,
        step: String,
        #[source]
        source: Box<MigrateError>,
    },

    /// Post-migration verification failed.
    #[error("Verification failed: {0}")]
    Verification(String),

    /// State file error
    #[error("State file error: {0}")]
    State(String),

    /// Config hash mismatch on resume
    #[error("Config has changed since last run - cannot resume. Start a fresh run instead.")]
    ConfigChanged,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Transfer error
    pub fn transfer(key: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Attach the key and the failing step to a store error.
    pub fn key_operation(
        key: impl Into<String>,
        step: impl Into<String>,
        source: MigrateError,
    ) -> Self {
        MigrateError::KeyOperation {
            key: key.into(),
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// Create a Timeout error
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        MigrateError::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Errors that describe the data rather than the connection.
    ///
    /// These are never retried, whatever the configured classifiers say.
    pub fn is_fatal_for_key(&self) -> bool {
        if let MigrateError::KeyOperation { source, .. } = self {
            return source.is_fatal_for_key();
        }
        matches!(
            self,
            MigrateError::TypeMismatch { .. }
                | MigrateError::UnsupportedType { .. }
                | MigrateError::KeyNotFound(_)
                | MigrateError::Cancelled
        )
    }

    /// Text matched against the retryable-error patterns.
    ///
    /// Key names and operation labels are left out: a key called
    /// `session:timeout` must not make an auth failure look transient.
    pub fn classification_text(&self) -> String {
        match self {
            MigrateError::KeyOperation { source, .. } => source.classification_text(),
            MigrateError::Timeout { after, .. } => format!("timed out after {:?}", after),
            MigrateError::Transfer { message, .. } => message.clone(),
            MigrateError::TypeMismatch { .. }
            | MigrateError::UnsupportedType { .. }
            | MigrateError::KeyNotFound(_) => String::new(),
            other => other.to_string(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Json(_) => 1,
            MigrateError::Store(_) | MigrateError::Connection(_) | MigrateError::Timeout { .. } => {
                2
            }
            MigrateError::TypeMismatch { .. }
            | MigrateError::UnsupportedType { .. }
            | MigrateError::KeyNotFound(_)
            | MigrateError::Transfer { .. }
            | MigrateError::KeyOperation { .. } => 3,
            MigrateError::Verification(_) => 4,
            MigrateError::State(_) | MigrateError::ConfigChanged => 5,
            MigrateError::Cancelled => 6,
            MigrateError::Io(_) => 7,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mismatch_is_fatal_for_key() {
        let err = MigrateError::TypeMismatch {
            key: "k".into(),
            expected: "hash".into(),
            actual: "string".into(),
        };
        assert!(err.is_fatal_for_key());
        assert!(err.to_string().contains("k"));
        assert!(!MigrateError::Connection("reset".into()).is_fatal_for_key());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), 1);
        assert_eq!(MigrateError::Cancelled.exit_code(), 6);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(MigrateError::from(io).exit_code(), 7);
    }

    #[test]
    fn test_classification_text_omits_key() {
        let err = MigrateError::key_operation(
            "session:timeout:1",
            "write to target",
            MigrateError::Connection("NOAUTH authentication required".into()),
        );
        let text = err.classification_text();
        assert!(!text.contains("timeout"));
        assert!(text.contains("NOAUTH"));
        assert!(err.to_string().contains("session:timeout:1"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_key_operation_keeps_fatal_source() {
        let err = MigrateError::key_operation(
            "k",
            "read from source",
            MigrateError::KeyNotFound("k".into()),
        );
        assert!(err.is_fatal_for_key());
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_timeout_classification_drops_operation() {
        let err = MigrateError::timeout("HGETALL page:loading", Duration::from_secs(5));
        assert_eq!(err.classification_text(), "timed out after 5s");
    }

    #[test]
    fn test_timeout_message_is_classifiable() {
        let err = MigrateError::timeout("HGETALL user:1", Duration::from_secs(5));
        assert!(err.to_string().contains("timed out"));
    }
}
