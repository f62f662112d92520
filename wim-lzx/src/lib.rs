//! LZX chunk decompression, kept separate from the container parser in `wim` the same way
//! compression codecs live in their own crates in this family (see `zstd`/`flate2` usage in
//! `ms-pdb-msfz`).
//!
//! WIM splits a compressed resource into independent 32 KB chunks: unlike CAB-style LZX, decoder
//! state (window contents, Huffman trees, recent-match offsets) does not carry across a chunk
//! boundary. [`LzxChunkDecompressor`] takes advantage of this by constructing a fresh [`lzxd::Lzxd`]
//! per call, which also makes it trivially `Sync`.

use lzxd::{Lzxd, WindowSize};
use thiserror::Error;

/// A decompressor for a single chunk of LZX-compressed data.
///
/// Implementations need not retain state across calls: WIM resets LZX decoder state at every
/// chunk boundary, so each call is independent.
pub trait ChunkDecompressor {
    /// Decompresses `in_chunk` into exactly `out_len` bytes of output.
    fn decompress(&self, in_chunk: &[u8], out_len: usize) -> Result<Vec<u8>, ChunkDecompressError>;
}

/// Error produced by a [`ChunkDecompressor`].
#[derive(Debug, Error)]
pub enum ChunkDecompressError {
    #[error("LZX decode failed: {0:?}")]
    Lzxd(lzxd::DecodeFailed),

    #[error("decompressed chunk has length {actual}, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Default [`ChunkDecompressor`] backed by the `lzxd` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct LzxChunkDecompressor {
    window_size: WindowSizeArg,
}

/// The LZX window size to request from the decoder. WIM always uses a 32 KB chunk and a matching
/// 32 KB window; [`WindowSizeArg::Kb64`] is kept available for non-standard producers.
#[derive(Debug, Clone, Copy, Default)]
pub enum WindowSizeArg {
    #[default]
    Kb32,
    Kb64,
}

impl From<WindowSizeArg> for WindowSize {
    fn from(value: WindowSizeArg) -> Self {
        match value {
            WindowSizeArg::Kb32 => WindowSize::KB32,
            WindowSizeArg::Kb64 => WindowSize::KB64,
        }
    }
}

impl LzxChunkDecompressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window_size(window_size: WindowSizeArg) -> Self {
        Self { window_size }
    }
}

impl ChunkDecompressor for LzxChunkDecompressor {
    #[tracing::instrument(level = "trace", skip(self, in_chunk))]
    fn decompress(&self, in_chunk: &[u8], out_len: usize) -> Result<Vec<u8>, ChunkDecompressError> {
        let mut lzxd = Lzxd::new(self.window_size.into());
        let decoded = lzxd
            .decompress_next(in_chunk)
            .map_err(ChunkDecompressError::Lzxd)?;
        if decoded.len() != out_len {
            return Err(ChunkDecompressError::LengthMismatch {
                expected: out_len,
                actual: decoded.len(),
            });
        }
        Ok(decoded.to_vec())
    }
}
