//! Dispatches a resource descriptor + logical offset to either a bounded plain-bytes view or a
//! [`CompressedResourceReader`](crate::compressed::CompressedResourceReader), per §4.3.

use std::io::Read;
use std::sync::Arc;

use sync_file::ReadAt;

use crate::compressed::CompressedResourceReader;
use crate::error::{Result, WimError, WimErrorKind};
use crate::resource::ResourceDescriptor;

/// A sequential byte stream over a resource's decompressed content, opened at some logical
/// offset. Owns an `Arc` clone of the byte source so it can outlive the call that created it.
pub enum ResourceReader<F> {
    Plain(PlainResourceReader<F>),
    Compressed(CompressedResourceReader<F>),
}

impl<F: ReadAt> Read for ResourceReader<F> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            ResourceReader::Plain(r) => r.read(buf),
            ResourceReader::Compressed(r) => r.read(buf),
        }
    }
}

/// A bounded, uncompressed view directly over the byte source.
pub struct PlainResourceReader<F> {
    source: Arc<F>,
    pos: u64,
    end: u64,
}

impl<F: ReadAt> Read for PlainResourceReader<F> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = self.end.saturating_sub(self.pos);
        if remaining == 0 {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(remaining) as usize;
        let n = self.source.read_at(&mut buf[..want], self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

/// Opens `descriptor` for sequential decompressed reading starting at `logical_offset`.
pub(crate) fn open_resource<F: ReadAt>(
    source: Arc<F>,
    descriptor: &ResourceDescriptor,
    logical_offset: u64,
) -> Result<ResourceReader<F>> {
    if logical_offset > descriptor.original_size {
        return Err(WimError::new(
            "open resource",
            WimErrorKind::Structural(format!(
                "logical offset {logical_offset} is beyond original size {}",
                descriptor.original_size
            )),
        ));
    }

    if !descriptor.is_compressed() {
        let start = descriptor.offset + logical_offset;
        let end = descriptor.offset + descriptor.compressed_size;
        return Ok(ResourceReader::Plain(PlainResourceReader {
            source,
            pos: start,
            end,
        }));
    }

    Ok(ResourceReader::Compressed(CompressedResourceReader::open(
        source,
        descriptor,
        logical_offset,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use sync_file::RandomAccessFile;

    fn mem_file(bytes: &[u8]) -> Arc<RandomAccessFile> {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("wim-test-{:x}", bytes.len() as u64 ^ 0x9E37_79B9));
        std::fs::write(&path, bytes).unwrap();
        let f = std::fs::File::open(&path).unwrap();
        Arc::new(RandomAccessFile::from(f))
    }

    #[test]
    fn plain_resource_reads_bounded_slice() {
        let data = b"0123456789abcdef".to_vec();
        let source = mem_file(&data);
        let descriptor = ResourceDescriptor {
            flags: crate::resource::ResourceFlags::empty(),
            compressed_size: 10,
            offset: 2,
            original_size: 10,
        };
        let mut reader = open_resource(source, &descriptor, 3).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"56789ab");
    }
}
