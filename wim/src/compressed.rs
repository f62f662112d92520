//! Random-access decompression of a chunked, LZX-compressed resource (§4.4).
//!
//! A compressed resource is a chunk-offset table followed immediately by the compressed payload.
//! Each chunk decompresses to at most 32768 bytes; one decoded chunk is cached at a time, matching
//! the corpus's single-chunk `OnceLock` cache in spirit, except the cache here is a plain mutable
//! field since a `CompressedResourceReader` is owned by a single read session (§5), not shared.

use std::io;
use std::sync::Arc;

use sync_file::ReadAt;
use tracing::trace;
use wim_lzx::{ChunkDecompressor, LzxChunkDecompressor};

use crate::error::{DecompressionCause, DecompressionError, WimError, WimErrorKind};
use crate::resource::ResourceDescriptor;

pub const CHUNK_SIZE: u64 = 32768;

pub struct CompressedResourceReader<F> {
    source: Arc<F>,
    decompressor: Arc<dyn ChunkDecompressor + Send + Sync>,
    /// Absolute file offset at which the compressed payload (after the chunk-offset table) begins.
    payload_offset: u64,
    /// Byte boundaries of each chunk within the payload, relative to `payload_offset`.
    /// Length is `chunk_count + 1`; `boundaries[0] == 0`.
    boundaries: Vec<u64>,
    original_size: u64,
    chunk_count: usize,
    next_chunk: usize,
    current: Option<(Vec<u8>, usize)>,
}

impl<F: ReadAt> CompressedResourceReader<F> {
    pub(crate) fn open(
        source: Arc<F>,
        descriptor: &ResourceDescriptor,
        logical_offset: u64,
    ) -> crate::error::Result<Self> {
        Self::open_with_decompressor(
            source,
            descriptor,
            logical_offset,
            Arc::new(LzxChunkDecompressor::new()),
        )
    }

    pub(crate) fn open_with_decompressor(
        source: Arc<F>,
        descriptor: &ResourceDescriptor,
        logical_offset: u64,
        decompressor: Arc<dyn ChunkDecompressor + Send + Sync>,
    ) -> crate::error::Result<Self> {
        let original_size = descriptor.original_size;
        let chunk_count = div_ceil(original_size, CHUNK_SIZE) as usize;
        let num_table_entries = chunk_count.saturating_sub(1);
        let entry_width: u64 = if original_size <= 1u64 << 32 { 4 } else { 8 };
        let table_size = num_table_entries as u64 * entry_width;

        let mut table_bytes = vec![0u8; table_size as usize];
        source
            .read_exact_at(&mut table_bytes, descriptor.offset)
            .map_err(|e| WimError::io("read chunk-offset table", e))?;

        let mut offsets = Vec::with_capacity(num_table_entries);
        for i in 0..num_table_entries {
            let value = if entry_width == 4 {
                let bytes: [u8; 4] = table_bytes[i * 4..i * 4 + 4].try_into().unwrap();
                u32::from_le_bytes(bytes) as u64
            } else {
                let bytes: [u8; 8] = table_bytes[i * 8..i * 8 + 8].try_into().unwrap();
                u64::from_le_bytes(bytes)
            };
            offsets.push(value);
        }

        if descriptor.compressed_size < table_size {
            return Err(malformed_table(0, "compressed size smaller than chunk table"));
        }
        let payload_size = descriptor.compressed_size - table_size;

        let mut boundaries = Vec::with_capacity(chunk_count + 1);
        boundaries.push(0u64);
        boundaries.extend_from_slice(&offsets);
        boundaries.push(payload_size);

        for w in boundaries.windows(2) {
            if w[1] < w[0] {
                return Err(malformed_table(0, "chunk offsets are not monotonically increasing"));
            }
        }
        if let Some(&last) = boundaries.last() {
            if last > payload_size {
                return Err(malformed_table(
                    chunk_count.saturating_sub(1) as u64,
                    "chunk offset extends past end of resource",
                ));
            }
        }

        let payload_offset = descriptor.offset + table_size;

        let mut reader = CompressedResourceReader {
            source,
            decompressor,
            payload_offset,
            boundaries,
            original_size,
            chunk_count,
            next_chunk: 0,
            current: None,
        };

        if chunk_count > 0 {
            let c = (logical_offset / CHUNK_SIZE) as usize;
            let in_chunk = (logical_offset % CHUNK_SIZE) as usize;
            let data = reader.decode_chunk(c)?;
            reader.current = Some((data, in_chunk));
            reader.next_chunk = c + 1;
        }

        Ok(reader)
    }

    fn decompressed_len(&self, index: usize) -> usize {
        if index + 1 == self.chunk_count {
            let rem = self.original_size % CHUNK_SIZE;
            if rem == 0 {
                CHUNK_SIZE as usize
            } else {
                rem as usize
            }
        } else {
            CHUNK_SIZE as usize
        }
    }

    fn decode_chunk(&self, index: usize) -> crate::error::Result<Vec<u8>> {
        let start = self.boundaries[index];
        let end = self.boundaries[index + 1];
        let on_disk_len = (end - start) as usize;
        let expected_len = self.decompressed_len(index);

        trace!(index, on_disk_len, expected_len, "decoding chunk");

        let mut raw = vec![0u8; on_disk_len];
        self.source
            .read_exact_at(&mut raw, self.payload_offset + start)
            .map_err(|e| WimError::io("read chunk payload", e))?;

        if on_disk_len >= expected_len {
            raw.truncate(expected_len);
            return Ok(raw);
        }

        self.decompressor
            .decompress(&raw, expected_len)
            .map_err(|cause| {
                WimError::new(
                    "decompress chunk",
                    WimErrorKind::Decompression(DecompressionError {
                        chunk_index: index as u64,
                        cause: DecompressionCause::Decompressor(cause),
                    }),
                )
            })
    }
}

fn malformed_table(chunk_index: u64, message: &str) -> WimError {
    WimError::new(
        "parse chunk-offset table",
        WimErrorKind::Decompression(DecompressionError {
            chunk_index,
            cause: DecompressionCause::MalformedOffsetTable(message.to_string()),
        }),
    )
}

fn div_ceil(a: u64, b: u64) -> u64 {
    if a == 0 {
        0
    } else {
        (a - 1) / b + 1
    }
}

impl<F: ReadAt> io::Read for CompressedResourceReader<F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if let Some((data, pos)) = &mut self.current {
                if *pos < data.len() {
                    let n = (buf.len()).min(data.len() - *pos);
                    buf[..n].copy_from_slice(&data[*pos..*pos + n]);
                    *pos += n;
                    return Ok(n);
                }
                self.current = None;
            }

            if self.next_chunk >= self.chunk_count {
                return Ok(0);
            }

            let data = self
                .decode_chunk(self.next_chunk)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            self.current = Some((data, 0));
            self.next_chunk += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::Arc;
    use sync_file::RandomAccessFile;
    use wim_lzx::ChunkDecompressError;

    struct IdentityDecompressor;
    impl ChunkDecompressor for IdentityDecompressor {
        fn decompress(&self, in_chunk: &[u8], out_len: usize) -> Result<Vec<u8>, ChunkDecompressError> {
            let mut v = in_chunk.to_vec();
            v.resize(out_len, 0);
            Ok(v)
        }
    }

    fn mem_file(bytes: &[u8]) -> Arc<RandomAccessFile> {
        let path = std::env::temp_dir().join(format!("wim-compressed-test-{:x}", bytes.len()));
        std::fs::write(&path, bytes).unwrap();
        Arc::new(RandomAccessFile::from(std::fs::File::open(&path).unwrap()))
    }

    #[test]
    fn single_stored_chunk_roundtrips() {
        // original_size == 5, fits in one chunk, no table entries.
        let payload = b"hello".to_vec();
        let source = mem_file(&payload);
        let descriptor = ResourceDescriptor {
            flags: crate::resource::ResourceFlags::COMPRESSED,
            compressed_size: payload.len() as u64,
            offset: 0,
            original_size: 5,
        };
        let mut reader =
            CompressedResourceReader::open_with_decompressor(source, &descriptor, 0, Arc::new(IdentityDecompressor))
                .unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn exact_chunk_multiple_has_full_last_chunk() {
        let chunk_count = 2usize;
        let original_size = CHUNK_SIZE * chunk_count as u64;
        // one table entry (u32, since original_size <= u32::MAX): offset of chunk 1 == CHUNK_SIZE
        // (chunks are "stored" here, so on-disk length == CHUNK_SIZE each).
        let mut buf = Vec::new();
        buf.extend_from_slice(&(CHUNK_SIZE as u32).to_le_bytes());
        buf.extend(std::iter::repeat(1u8).take(CHUNK_SIZE as usize));
        buf.extend(std::iter::repeat(2u8).take(CHUNK_SIZE as usize));
        let source = mem_file(&buf);
        let descriptor = ResourceDescriptor {
            flags: crate::resource::ResourceFlags::COMPRESSED,
            compressed_size: buf.len() as u64,
            offset: 0,
            original_size,
        };
        let mut reader = CompressedResourceReader::open_with_decompressor(
            source,
            &descriptor,
            0,
            Arc::new(IdentityDecompressor),
        )
        .unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), original_size as usize);
        assert!(out[..CHUNK_SIZE as usize].iter().all(|&b| b == 1));
        assert!(out[CHUNK_SIZE as usize..].iter().all(|&b| b == 2));
    }

    #[test]
    fn random_access_open_skips_in_chunk_bytes() {
        let payload = (0u32..10).flat_map(|b| vec![b as u8; 1]).collect::<Vec<_>>();
        let source = mem_file(&payload);
        let descriptor = ResourceDescriptor {
            flags: crate::resource::ResourceFlags::COMPRESSED,
            compressed_size: payload.len() as u64,
            offset: 0,
            original_size: payload.len() as u64,
        };
        let mut reader = CompressedResourceReader::open_with_decompressor(
            source,
            &descriptor,
            3,
            Arc::new(IdentityDecompressor),
        )
        .unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload[3..]);
    }
}
