//! Error types for the mmit data pipeline.

use thiserror::Error;

/// Result type alias for mmit operations.
pub type Result<T> = std::result::Result<T, MmitError>;

/// Which lookup table a missing key was requested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    /// The instruction/answer record table.
    Record,
    /// The base64 image table.
    Image,
    /// The in-context train configuration table.
    TrainConfig,
}

impl std::fmt::Display for LookupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Record => "record",
            Self::Image => "image",
            Self::TrainConfig => "train config",
        };
        f.write_str(name)
    }
}

/// Main error type for mmit operations.
#[derive(Error, Debug)]
pub enum MmitError {
    /// Configuration errors, including missing data files.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed base64 payload or undecodable image bytes.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A record, image, or train-config id was not present in its store.
    #[error("Missing {kind} id: {id}")]
    Lookup {
        /// Store the id was looked up in.
        kind: LookupKind,
        /// The id that was requested.
        id: String,
    },

    /// Skipping unsupported records ran past the end of the dataset.
    #[error("Index {index} exhausted the dataset of length {len}")]
    IndexExhausted {
        /// Index at which the search stopped.
        index: usize,
        /// Dataset length.
        len: usize,
    },

    /// Tensor shape mismatch.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        actual: Vec<usize>,
    },

    /// Tokenizer errors.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl MmitError {
    /// Shorthand for a missing-id error.
    pub fn lookup(kind: LookupKind, id: impl Into<String>) -> Self {
        Self::Lookup {
            kind,
            id: id.into(),
        }
    }
}

impl From<serde_json::Error> for MmitError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for MmitError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
