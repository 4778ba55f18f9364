use thiserror::Error;

/// Top-level error type for the Keel kernel.
///
/// Subsystem crates define their own error types and implement
/// `From<KeelError>` so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KeelError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<toml::de::Error> for KeelError {
    fn from(err: toml::de::Error) -> Self {
        KeelError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for KeelError {
    fn from(err: toml::ser::Error) -> Self {
        KeelError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for KeelError {
    fn from(err: serde_json::Error) -> Self {
        KeelError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Keel operations.
pub type Result<T> = std::result::Result<T, KeelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let cases: Vec<(KeelError, &str)> = vec![
            (
                KeelError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                KeelError::Storage("disk full".to_string()),
                "Storage error: disk full",
            ),
            (
                KeelError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
            (
                KeelError::InvalidInput("content must not be empty".to_string()),
                "Invalid input: content must not be empty",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: KeelError = io_err.into();
        assert!(matches!(err, KeelError::Io(_)));
        assert!(err.to_string().starts_with("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let keel_err: KeelError = err.unwrap_err().into();
        assert!(matches!(keel_err, KeelError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let keel_err: KeelError = err.unwrap_err().into();
        assert!(matches!(keel_err, KeelError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
