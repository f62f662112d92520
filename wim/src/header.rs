//! The 208-byte WIM header and its flag set.

use uuid::Uuid;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, LE, U16, U32, U64};

use crate::error::{Result, WimError, WimErrorKind};
use crate::resource::ResourceDescriptorRaw;

pub const MAGIC: [u8; 8] = *b"MSWIM\0\0\0";
pub const CHUNK_SIZE: u32 = 32768;

bitflags::bitflags! {
    /// Header flag bits (§6). Only [`WimFlags::SUPPORTED`] may be set.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct WimFlags: u32 {
        const RESERVED = 0x1;
        const COMPRESSED = 0x2;
        const READONLY = 0x4;
        const SPANNED = 0x8;
        const RESOURCE_ONLY = 0x10;
        const METADATA_ONLY = 0x20;
        const WRITE_IN_PROGRESS = 0x40;
        const RP_FIX = 0x80;
        const COMPRESS_XPRESS = 0x20000;
        const COMPRESS_LZX = 0x40000;
    }
}

impl WimFlags {
    pub const SUPPORTED: WimFlags = WimFlags::RP_FIX
        .union(WimFlags::READONLY)
        .union(WimFlags::COMPRESSED)
        .union(WimFlags::COMPRESS_LZX);

    pub fn is_supported(self) -> bool {
        (self & !Self::SUPPORTED).is_empty()
    }
}

/// On-disk layout of the 208-byte WIM header.
#[derive(Clone, Copy, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct HeaderRaw {
    pub magic: [u8; 8],
    pub header_size: U32<LE>,
    pub version: U32<LE>,
    pub flags: U32<LE>,
    pub chunk_size: U32<LE>,
    pub guid: [u8; 16],
    pub part_number: U16<LE>,
    pub total_parts: U16<LE>,
    pub image_count: U32<LE>,
    pub offset_table: ResourceDescriptorRaw,
    pub xml_data: ResourceDescriptorRaw,
    pub boot_metadata: ResourceDescriptorRaw,
    pub integrity: ResourceDescriptorRaw,
    pub boot_index: U32<LE>,
    _padding: [u8; 60],
}

static_assertions::const_assert_eq!(std::mem::size_of::<HeaderRaw>(), 208);

/// A decoded, validated WIM header.
#[derive(Clone, Debug)]
pub struct Header {
    pub version: u32,
    pub flags: WimFlags,
    pub guid: Uuid,
    pub image_count: u32,
    pub offset_table: crate::resource::ResourceDescriptor,
    pub xml_data: crate::resource::ResourceDescriptor,
    pub boot_metadata: crate::resource::ResourceDescriptor,
    pub integrity: crate::resource::ResourceDescriptor,
    pub boot_index: u32,
}

impl HeaderRaw {
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn validate_and_decode(&self) -> Result<Header> {
        if self.magic != MAGIC {
            return Err(WimError::new(
                "parse header",
                WimErrorKind::Unsupported(format!("bad magic tag {:?}", self.magic)),
            ));
        }

        let flags = WimFlags::from_bits_retain(self.flags.get());
        if !flags.is_supported() {
            let unsupported = flags & !WimFlags::SUPPORTED;
            return Err(WimError::new(
                "parse header",
                WimErrorKind::Unsupported(format!("unsupported flag bits {unsupported:?}")),
            ));
        }

        if self.chunk_size.get() != CHUNK_SIZE {
            return Err(WimError::new(
                "parse header",
                WimErrorKind::Unsupported(format!(
                    "unsupported chunk size {} (expected {CHUNK_SIZE})",
                    self.chunk_size.get()
                )),
            ));
        }

        if self.total_parts.get() != 1 {
            return Err(WimError::new(
                "parse header",
                WimErrorKind::Unsupported(format!(
                    "multi-part (spanned) WIM not supported: total_parts={}",
                    self.total_parts.get()
                )),
            ));
        }

        tracing::debug!(
            image_count = self.image_count.get(),
            flags = ?flags,
            "header validated"
        );

        Ok(Header {
            version: self.version.get(),
            flags,
            guid: Uuid::from_bytes(self.guid),
            image_count: self.image_count.get(),
            offset_table: self.offset_table.decode(),
            xml_data: self.xml_data.decode(),
            boot_metadata: self.boot_metadata.decode(),
            integrity: self.integrity.decode(),
            boot_index: self.boot_index.get(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_header_bytes() -> Vec<u8> {
        let mut buf = vec![0u8; 208];
        buf[0..8].copy_from_slice(&MAGIC);
        buf[8..12].copy_from_slice(&208u32.to_le_bytes()); // header_size (unused by decode)
        buf[16..20].copy_from_slice(&0u32.to_le_bytes()); // flags
        buf[20..24].copy_from_slice(&CHUNK_SIZE.to_le_bytes());
        buf[40..42].copy_from_slice(&1u16.to_le_bytes()); // part_number
        buf[42..44].copy_from_slice(&1u16.to_le_bytes()); // total_parts
        buf[44..48].copy_from_slice(&1u32.to_le_bytes()); // image_count
        buf
    }

    #[test]
    fn accepts_valid_header() {
        let bytes = valid_header_bytes();
        let (raw, _) = HeaderRaw::ref_from_prefix(&bytes).unwrap();
        let header = raw.validate_and_decode().unwrap();
        assert_eq!(header.image_count, 1);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = valid_header_bytes();
        bytes[0] = b'X';
        let (raw, _) = HeaderRaw::ref_from_prefix(&bytes).unwrap();
        assert!(raw.validate_and_decode().is_err());
    }

    #[test]
    fn rejects_unknown_flag_bit() {
        let mut bytes = valid_header_bytes();
        bytes[16..20].copy_from_slice(&0x100u32.to_le_bytes());
        let (raw, _) = HeaderRaw::ref_from_prefix(&bytes).unwrap();
        let err = raw.validate_and_decode().unwrap_err();
        assert!(matches!(err.kind, WimErrorKind::Unsupported(_)));
    }

    #[test]
    fn rejects_spanned_wim() {
        let mut bytes = valid_header_bytes();
        bytes[42..44].copy_from_slice(&2u16.to_le_bytes());
        let (raw, _) = HeaderRaw::ref_from_prefix(&bytes).unwrap();
        assert!(raw.validate_and_decode().is_err());
    }
}
