//! Error types for foldwise

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Device memory exhausted: requested {requested} bytes, {available} available")]
    ResourceExhausted { requested: usize, available: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Feature extraction failed: {0}")]
    Feature(String),

    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Dataset accessed before a scaler was bound")]
    ScalerNotBound,

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl Error {
    /// Whether this error signals device memory exhaustion
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, Error::ResourceExhausted { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_exhausted_display() {
        let err = Error::ResourceExhausted {
            requested: 2048,
            available: 1024,
        };
        assert!(err.is_resource_exhausted());
        assert_eq!(
            err.to_string(),
            "Device memory exhausted: requested 2048 bytes, 1024 available"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_resource_exhausted());
    }
}
