//! Unified error types for the transformation engine.
//!
//! Only structural failures are errors. Data-quality conditions (unresolved
//! identity, bad timestamps, malformed payloads, duplicate transactions) are
//! counted in stage stats and never surface here.
//!
//! Error codes:
//! - INPUT_001-002: Input errors
//! - OUTPUT_001: Publication errors
//! - CONFIG_001: Configuration errors

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Input error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputErrorCode {
    /// INPUT_001: Input location missing or unreadable
    Unreadable,
    /// INPUT_002: No partition files found
    NoPartitions,
}

impl InputErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unreadable => "INPUT_001",
            Self::NoPartitions => "INPUT_002",
        }
    }
}

/// Output error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputErrorCode {
    /// OUTPUT_001: Failed to publish an artifact
    WriteFailed,
}

impl OutputErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::WriteFailed => "OUTPUT_001",
        }
    }
}

/// Unified error type for the transformation engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Input error with code.
    #[error("[{code}] {message}: {}", path.display())]
    Input {
        code: &'static str,
        message: String,
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Output error with code.
    #[error("[{code}] {message}: {}", path.display())]
    Output {
        code: &'static str,
        message: String,
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("[CONFIG_001] invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create an input error.
    pub fn input(
        code: InputErrorCode,
        msg: impl Into<String>,
        path: impl AsRef<Path>,
        source: Option<std::io::Error>,
    ) -> Self {
        Self::Input {
            code: code.code(),
            message: msg.into(),
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create an output error.
    pub fn output(
        code: OutputErrorCode,
        msg: impl Into<String>,
        path: impl AsRef<Path>,
        source: Option<std::io::Error>,
    ) -> Self {
        Self::Output {
            code: code.code(),
            message: msg.into(),
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Input { code, .. } => Some(code),
            Self::Output { code, .. } => Some(code),
            Self::Config(_) => Some("CONFIG_001"),
            Self::Serialization(_) => None,
        }
    }
}
