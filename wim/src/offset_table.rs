//! The top-level offset table: a flat list of 50-byte stream descriptors at the head of the file.

use std::collections::HashMap;

use tracing::{debug, instrument, trace, warn};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, LE, U16, U32};

use crate::error::{Result, WimError, WimErrorKind};
use crate::hash::ContentHash;
use crate::resource::{ResourceDescriptor, ResourceDescriptorRaw, ResourceFlags};

/// On-disk layout of a single offset-table entry: 50 bytes.
#[derive(Clone, Copy, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct StreamDescriptorRaw {
    pub resource: ResourceDescriptorRaw,
    pub part_number: U16<LE>,
    pub ref_count: U32<LE>,
    pub hash: ContentHash,
}

static_assertions::const_assert_eq!(std::mem::size_of::<StreamDescriptorRaw>(), 50);

/// The decoded offset table: a hash-keyed map of file-data resources, and the ordered list of
/// per-image metadata resources.
pub struct OffsetTable {
    pub hash_map: HashMap<ContentHash, ResourceDescriptor>,
    pub images: Vec<ResourceDescriptor>,
}

impl OffsetTable {
    /// Decodes the offset table from its fully-buffered raw bytes.
    ///
    /// `expected_image_count` comes from the header; a mismatched count of `METADATA` entries is
    /// fatal (§3 invariants).
    #[instrument(level = "debug", skip(bytes))]
    pub fn decode(bytes: &[u8], expected_image_count: u32) -> Result<OffsetTable> {
        let mut hash_map = HashMap::new();
        let mut images = Vec::new();

        let mut rest = bytes;
        let mut index = 0u64;
        while !rest.is_empty() {
            let (entry, tail) = StreamDescriptorRaw::ref_from_prefix(rest).map_err(|_| {
                WimError::new(
                    "decode offset table",
                    WimErrorKind::Truncated(format!(
                        "entry {index} is shorter than {} bytes",
                        std::mem::size_of::<StreamDescriptorRaw>()
                    )),
                )
            })?;
            rest = tail;

            let descriptor = entry.resource.decode();
            if !descriptor.flags.is_supported() {
                let unsupported = descriptor.flags & !ResourceFlags::SUPPORTED;
                return Err(WimError::new(
                    "decode offset table",
                    WimErrorKind::Unsupported(format!(
                        "entry {index} has unsupported resource flags {unsupported:?}"
                    )),
                ));
            }

            if descriptor.is_metadata() {
                trace!(index, "found metadata (image) resource");
                images.push(descriptor);
            } else {
                let hash = entry.hash;
                if hash_map.insert(hash, descriptor).is_some() {
                    warn!(index, hash = %hash, "duplicate hash in offset table; last writer wins");
                }
            }

            index += 1;
        }

        debug!(
            entries = index,
            images = images.len(),
            hashes = hash_map.len(),
            "decoded offset table"
        );

        if images.len() as u32 != expected_image_count {
            return Err(WimError::new(
                "decode offset table",
                WimErrorKind::Structural(format!(
                    "header declares {expected_image_count} images but offset table has {}",
                    images.len()
                )),
            ));
        }

        Ok(OffsetTable { hash_map, images })
    }

    /// Looks up the resource descriptor for a non-zero content hash, tagging the error with
    /// `path` on failure.
    pub fn resolve(&self, hash: ContentHash, path: &str) -> Result<ResourceDescriptor> {
        self.hash_map.get(&hash).copied().ok_or_else(|| {
            WimError::with_path(
                "resolve content hash",
                path,
                WimErrorKind::MissingContent(format!(
                    "could not find file data matching hash {hash}"
                )),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::U64;

    fn entry(flags: ResourceFlags, hash: [u8; 20]) -> StreamDescriptorRaw {
        let packed = (flags.bits() as u64) << 56;
        StreamDescriptorRaw {
            resource: ResourceDescriptorRaw::read_from_bytes(
                &[
                    packed.to_le_bytes(),
                    0u64.to_le_bytes(),
                    16u64.to_le_bytes(),
                ]
                .concat(),
            )
            .unwrap(),
            part_number: U16::new(1),
            ref_count: U32::new(1),
            hash: ContentHash(hash),
        }
    }

    #[test]
    fn splits_metadata_and_file_entries() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(entry(ResourceFlags::METADATA | ResourceFlags::COMPRESSED, [0; 20]).as_bytes());
        let mut hash = [0u8; 20];
        hash[0] = 1;
        bytes.extend_from_slice(entry(ResourceFlags::COMPRESSED, hash).as_bytes());

        let table = OffsetTable::decode(&bytes, 1).unwrap();
        assert_eq!(table.images.len(), 1);
        assert_eq!(table.hash_map.len(), 1);
        assert!(table.hash_map.contains_key(&ContentHash(hash)));
    }

    #[test]
    fn image_count_mismatch_is_fatal() {
        let bytes = entry(ResourceFlags::METADATA, [0; 20]).as_bytes().to_vec();
        assert!(OffsetTable::decode(&bytes, 2).is_err());
    }

    #[test]
    fn missing_hash_reports_path() {
        let table = OffsetTable {
            hash_map: HashMap::new(),
            images: Vec::new(),
        };
        let mut hash = [0u8; 20];
        hash[0] = 9;
        let err = table.resolve(ContentHash(hash), "a.txt").unwrap_err();
        assert_eq!(err.path.as_deref(), Some("a.txt"));
    }
}
