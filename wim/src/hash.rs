//! The 20-byte SHA-1 content hash used to key the offset table.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// A raw 20-byte SHA-1 digest as stored on disk. All-zero is the "no content" sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(transparent)]
pub struct ContentHash(pub [u8; 20]);

impl ContentHash {
    pub const ZERO: ContentHash = ContentHash([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Returns `Some(self)` unless this is the "no content" sentinel.
    pub fn non_zero(self) -> Option<ContentHash> {
        if self.is_zero() {
            None
        } else {
            Some(self)
        }
    }
}

impl std::fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
