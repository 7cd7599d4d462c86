//! Error types for the vigil engine.
//!
//! Uses `thiserror` for public API error types. Only two conditions are ever
//! surfaced to callers: catalog loading problems at initialization and a
//! missing language-model provider when one is required. Every other failure
//! on the scan path is recovered locally and carried inside the layered
//! result for diagnosis.

use std::path::PathBuf;

/// Top-level error type for the vigil engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("pattern catalog error in {path}: {message}")]
    PatternLoad { path: PathBuf, message: String },

    #[error("invalid regex in category '{category}' ({pattern}): {message}")]
    InvalidRegex {
        category: String,
        pattern: String,
        message: String,
    },

    #[error("no LLM provider available and the semantic layer requires one")]
    NoLlmProvider,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A type alias for results using the engine error.
pub type Result<T> = std::result::Result<T, EngineError>;
