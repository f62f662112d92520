//! The security-descriptor table at the head of an image-metadata resource (§4.6).

use std::io::Read;

use tracing::{debug, warn};

use crate::error::{Result, WimError, WimErrorKind};

/// The security descriptors for one image, indexed by the zero-based position directory entries
/// reference. `0xFFFFFFFF` means "no security descriptor" and is represented as `None` by callers.
#[derive(Debug, Default)]
pub struct SecurityTable {
    entries: Vec<Vec<u8>>,
}

impl SecurityTable {
    pub fn get(&self, index: u32) -> Option<&[u8]> {
        self.entries.get(index as usize).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parses the security block from `reader` and returns it together with the aligned total length
/// consumed (the caller uses this to compute where directory entries begin).
pub(crate) fn parse_security_table(reader: &mut impl Read) -> Result<(SecurityTable, u64)> {
    let mut header = [0u8; 8];
    reader
        .read_exact(&mut header)
        .map_err(|e| WimError::io("read security table header", e))?;
    let total_length = u32::from_le_bytes(header[0..4].try_into().unwrap()) as u64;
    let num_entries = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;

    let aligned_length = (total_length + 7) & !7;
    debug!(total_length, aligned_length, num_entries, "security table header");

    let mut consumed = 8u64;

    let mut sizes = Vec::with_capacity(num_entries);
    for _ in 0..num_entries {
        let mut size_bytes = [0u8; 8];
        reader
            .read_exact(&mut size_bytes)
            .map_err(|e| WimError::io("read security descriptor size", e))?;
        consumed += 8;
        let raw_size = u64::from_le_bytes(size_bytes);
        // High 32 bits are discarded; preserved here as documented ambiguous-source behavior.
        let size = (raw_size & 0xFFFF_FFFF) as u32;
        if raw_size >> 32 != 0 {
            warn!(raw_size, "security descriptor size has nonzero high 32 bits; masking");
        }
        sizes.push(size as u64);
    }

    if consumed > aligned_length {
        return Err(WimError::new(
            "parse security table",
            WimErrorKind::Structural("security table size array overruns declared length".into()),
        ));
    }

    let mut entries = Vec::with_capacity(num_entries);
    for size in sizes {
        let mut buf = vec![0u8; size as usize];
        reader
            .read_exact(&mut buf)
            .map_err(|e| WimError::io("read security descriptor", e))?;
        consumed += size;
        if consumed > aligned_length {
            return Err(WimError::new(
                "parse security table",
                WimErrorKind::Structural("security table overrun while reading descriptors".into()),
            ));
        }
        entries.push(buf);
    }

    let padding = aligned_length - consumed;
    if padding > 0 {
        let mut skip = vec![0u8; padding as usize];
        reader
            .read_exact(&mut skip)
            .map_err(|e| WimError::io("read security table padding", e))?;
    }

    Ok((SecurityTable { entries }, aligned_length))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn empty_table() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&8u32.to_le_bytes()); // total_length
        bytes.extend_from_slice(&0u32.to_le_bytes()); // num_entries
        let (table, consumed) = parse_security_table(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(consumed, 8);
        assert!(table.is_empty());
    }

    #[test]
    fn masks_high_bits_of_size() {
        let mut bytes = Vec::new();
        let total_length = 8 + 8 + 4u64; // header + one size + 4-byte descriptor, aligned to 8
        let aligned = (total_length + 7) & !7;
        bytes.extend_from_slice(&(aligned as u32).to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        let poisoned_size: u64 = (0xAAu64 << 32) | 4;
        bytes.extend_from_slice(&poisoned_size.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        bytes.extend(std::iter::repeat(0).take((aligned - total_length) as usize));

        let (table, consumed) = parse_security_table(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(consumed, aligned);
        assert_eq!(table.get(0), Some(&[1u8, 2, 3, 4][..]));
    }
}
