//! Content error types.

use thiserror::Error;

/// Errors raised while loading or reloading a book.
#[derive(Debug, Error)]
pub enum ContentError {
    /// The book file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file that was read.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a well-formed book document.
    #[error("invalid book yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The book parsed but breaks a structural rule.
    #[error("invalid book: {0}")]
    Invalid(String),

    /// A section could not be serialized for hashing.
    #[error("section hashing failed: {0}")]
    Hash(#[from] serde_json::Error),

    /// `reload` was called on a library built from memory.
    #[error("library has no source file to reload from")]
    NoSource,
}
