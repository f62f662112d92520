//! Windows `FILETIME` values: 100-nanosecond ticks since 1601-01-01 UTC.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, LE, U64};

/// Ticks between the FILETIME epoch (1601-01-01) and the Unix epoch (1970-01-01).
const FILETIME_EPOCH_DELTA_TICKS: i64 = 116_444_736_000_000_000;

/// A raw on-disk FILETIME, stored little-endian.
#[derive(Clone, Copy, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(transparent)]
pub struct FileTimeLe(pub U64<LE>);

impl FileTimeLe {
    pub fn get(&self) -> FileTime {
        FileTime(self.0.get())
    }
}

/// A Windows FILETIME: 100-nanosecond ticks since 1601-01-01 UTC.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileTime(pub u64);

impl FileTime {
    /// Converts to nanoseconds since the Unix epoch. Negative for times before 1970.
    pub fn to_unix_nanos(self) -> i64 {
        (self.0 as i64 - FILETIME_EPOCH_DELTA_TICKS) * 100
    }
}

impl std::fmt::Debug for FileTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FileTime({}, unix_ns={})", self.0, self.to_unix_nanos())
    }
}
