//! Error types for section extraction and ranking.
//!
//! Configuration problems (bad input shape, no documents) are kept apart from
//! per-document failures ([`Error::Document`]). The pipeline skips documents
//! that fail to load; configuration errors surface to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the secrank pipeline.
///
/// # Examples
///
/// ```rust,ignore
/// use secrank_core::Error;
///
/// match pipeline.extract_document(&source, path) {
///     Ok(sections) => println!("{} sections", sections.len()),
///     Err(Error::Document { path, message }) => eprintln!("skipping {}: {message}", path.display()),
///     Err(e) => return Err(e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input record or tunables.
    ///
    /// Raised for a missing `documents` list, zero documents, or an input
    /// shape that cannot be resolved into a query.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single document could not be read or decoded.
    #[error("Document error ({}): {message}", path.display())]
    Document {
        /// Path of the offending document
        path: PathBuf,
        /// What went wrong
        message: String,
    },

    /// The embedding backend failed.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The fallback heading classifier failed or could not be loaded.
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Build a per-document error.
    pub fn document(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Document {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for secrank operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_error_display() {
        let err = Error::document("/tmp/missing.pdf", "file not found");
        assert_eq!(
            err.to_string(),
            "Document error (/tmp/missing.pdf): file not found"
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = Error::Config("no documents".to_string());
        assert_eq!(err.to_string(), "Configuration error: no documents");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
