//! The single tagged error type surfaced by every fallible public operation.

use std::fmt;

use wim_lzx::ChunkDecompressError;

/// Error returned by any fallible operation in this crate.
///
/// Carries the operation that failed, the file path involved (when known), and the underlying
/// [`WimErrorKind`].
#[derive(Debug, thiserror::Error)]
#[error("{operation}{}: {kind}", path.as_deref().map(|p| format!(" ({p})")).unwrap_or_default())]
pub struct WimError {
    pub operation: &'static str,
    pub path: Option<String>,
    #[source]
    pub kind: WimErrorKind,
}

impl WimError {
    pub fn new(operation: &'static str, kind: WimErrorKind) -> Self {
        Self {
            operation,
            path: None,
            kind,
        }
    }

    pub fn with_path(operation: &'static str, path: impl Into<String>, kind: WimErrorKind) -> Self {
        Self {
            operation,
            path: Some(path.into()),
            kind,
        }
    }

    pub fn io(operation: &'static str, source: std::io::Error) -> Self {
        Self::new(operation, WimErrorKind::Io(source))
    }
}

/// The six error kinds from the error-handling design: unsupported format, truncated record,
/// structural mismatch, missing content, I/O failure, and decompression failure.
#[derive(Debug, thiserror::Error)]
pub enum WimErrorKind {
    #[error("unsupported format: {0}")]
    Unsupported(String),

    #[error("truncated record: {0}")]
    Truncated(String),

    #[error("structural mismatch: {0}")]
    Structural(String),

    #[error("missing content: {0}")]
    MissingContent(String),

    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),

    #[error("decompression failed: {0}")]
    Decompression(#[source] DecompressionError),
}

/// A decompression failure, tagged with the chunk index that failed.
#[derive(Debug)]
pub struct DecompressionError {
    pub chunk_index: u64,
    pub cause: DecompressionCause,
}

impl fmt::Display for DecompressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk {}: {}", self.chunk_index, self.cause)
    }
}

impl std::error::Error for DecompressionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            DecompressionCause::Decompressor(e) => Some(e),
            DecompressionCause::MalformedOffsetTable(_) => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecompressionCause {
    #[error(transparent)]
    Decompressor(#[from] ChunkDecompressError),

    #[error("malformed chunk-offset table: {0}")]
    MalformedOffsetTable(String),
}

pub type Result<T> = std::result::Result<T, WimError>;
