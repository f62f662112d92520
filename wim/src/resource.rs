//! The 24-byte resource descriptor: a packed flags+size field, a file offset, and an original size.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, LE, U64};

bitflags::bitflags! {
    /// Flags packed into the high 8 bits of a resource descriptor's first field.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ResourceFlags: u8 {
        const FREE = 0x01;
        const METADATA = 0x02;
        const COMPRESSED = 0x04;
        const SPANNED = 0x08;
    }
}

impl ResourceFlags {
    /// The only bits a resource descriptor may set; any other bit (`FREE`, `SPANNED`) is fatal.
    pub const SUPPORTED: ResourceFlags = ResourceFlags::METADATA.union(ResourceFlags::COMPRESSED);

    /// True if `self` sets no bit outside [`Self::SUPPORTED`].
    pub fn is_supported(self) -> bool {
        (self & !Self::SUPPORTED).is_empty()
    }
}

/// On-disk layout of a resource descriptor: 24 bytes.
#[derive(Clone, Copy, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct ResourceDescriptorRaw {
    /// High 8 bits: [`ResourceFlags`]. Low 56 bits: compressed (on-disk) size.
    packed_flags_size: U64<LE>,
    offset: U64<LE>,
    original_size: U64<LE>,
}

static_assertions::const_assert_eq!(std::mem::size_of::<ResourceDescriptorRaw>(), 24);

/// A decoded resource descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub flags: ResourceFlags,
    pub compressed_size: u64,
    pub offset: u64,
    pub original_size: u64,
}

impl ResourceDescriptorRaw {
    pub fn decode(&self) -> ResourceDescriptor {
        let packed = self.packed_flags_size.get();
        let flags = ResourceFlags::from_bits_retain((packed >> 56) as u8);
        let compressed_size = packed & 0x00FF_FFFF_FFFF_FFFF;
        ResourceDescriptor {
            flags,
            compressed_size,
            offset: self.offset.get(),
            original_size: self.original_size.get(),
        }
    }
}

impl ResourceDescriptor {
    pub fn is_compressed(&self) -> bool {
        self.flags.contains(ResourceFlags::COMPRESSED)
    }

    pub fn is_metadata(&self) -> bool {
        self.flags.contains(ResourceFlags::METADATA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpacks_flags_and_size() {
        let packed = (ResourceFlags::METADATA.bits() as u64) << 56 | 0x1234;
        let raw = ResourceDescriptorRaw {
            packed_flags_size: U64::new(packed),
            offset: U64::new(0x100),
            original_size: U64::new(0x200),
        };
        let desc = raw.decode();
        assert_eq!(desc.flags, ResourceFlags::METADATA);
        assert_eq!(desc.compressed_size, 0x1234);
        assert_eq!(desc.offset, 0x100);
        assert_eq!(desc.original_size, 0x200);
    }

    #[test]
    fn rejects_unsupported_flag_combo() {
        let weird = ResourceFlags::FREE | ResourceFlags::SPANNED;
        assert!(!weird.is_supported());
    }
}
