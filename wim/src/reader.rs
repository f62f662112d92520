//! The top-level [`Reader`]: owns the byte source and the offset table, and is the root of the
//! shared-ownership graph (`Image`/`File`/`Stream` all hold an `Arc<Reader<F>>`, directly or
//! indirectly).

use std::sync::Arc;

use sync_file::{RandomAccessFile, ReadAt};
use tracing::{info, instrument};
use zerocopy::FromBytes;

use crate::error::{Result, WimError, WimErrorKind};
use crate::header::{Header, HeaderRaw};
use crate::image::Image;
use crate::offset_table::OffsetTable;
use crate::resource_reader::open_resource;

/// An opened WIM. Owns the random-access byte source and the resolved offset table.
///
/// `Reader` is immutable after construction; it is safe to share across threads for reading
/// (each `Image`'s own one-shot security-descriptor cache is the only interior mutability, and
/// it is synchronized independently — see [`crate::image::Image`]).
pub struct Reader<F> {
    source: Arc<F>,
    pub(crate) header: Header,
    pub(crate) offset_table: OffsetTable,
}

impl Reader<RandomAccessFile> {
    /// Opens a WIM file from a filesystem path.
    pub fn open_path<P: AsRef<std::path::Path>>(path: P) -> Result<Arc<Self>> {
        let file = std::fs::File::open(path.as_ref())
            .map_err(|e| WimError::io("open WIM file", e))?;
        Self::open(RandomAccessFile::from(file))
    }
}

impl<F: ReadAt> Reader<F> {
    /// Opens a WIM from any random-access byte source: parses and validates the header, then
    /// loads the offset table.
    #[instrument(level = "info", skip(source))]
    pub fn open(source: F) -> Result<Arc<Self>> {
        let mut header_bytes = [0u8; std::mem::size_of::<HeaderRaw>()];
        source
            .read_exact_at(&mut header_bytes, 0)
            .map_err(|e| WimError::io("read WIM header", e))?;

        let header_raw = HeaderRaw::ref_from_bytes(&header_bytes).map_err(|_| {
            WimError::new(
                "parse header",
                WimErrorKind::Truncated("header shorter than 208 bytes".into()),
            )
        })?;
        let header = header_raw.validate_and_decode()?;

        let source = Arc::new(source);

        let offset_table_bytes = read_resource_fully(&source, &header.offset_table)?;
        let offset_table = OffsetTable::decode(&offset_table_bytes, header.image_count)?;

        info!(
            image_count = header.image_count,
            chunk_size = crate::header::CHUNK_SIZE,
            "opened WIM"
        );

        Ok(Arc::new(Reader {
            source,
            header,
            offset_table,
        }))
    }

    /// The images contained in this WIM, in on-disk order.
    pub fn images(self: &Arc<Self>) -> Vec<Arc<Image<F>>> {
        (0..self.offset_table.images.len())
            .map(|i| Arc::new(Image::new(Arc::clone(self), i)))
            .collect()
    }

    /// Decodes the UTF-16LE, BOM-prefixed XML metadata blob. Returns an empty string if the WIM
    /// carries no XML resource.
    #[instrument(level = "debug", skip(self))]
    pub fn read_xml(&self) -> Result<String> {
        crate::xml::read_xml(&self.source, &self.header.xml_data)
    }

    pub(crate) fn source_arc(&self) -> Arc<F> {
        Arc::clone(&self.source)
    }
}

#[cfg(feature = "verify-hashes")]
impl<F: ReadAt> Reader<F> {
    /// Streams every file-data resource through SHA-1 and compares it against the hash recorded
    /// in the offset table. Not part of normal open (§4.2) — a latent debug mode for callers who
    /// want to catch offset-table corruption that structural validation alone wouldn't notice.
    #[instrument(level = "debug", skip(self))]
    pub fn verify_hashes(&self) -> Result<()> {
        use std::io::Read;

        use sha1::{Digest, Sha1};

        for (hash, descriptor) in &self.offset_table.hash_map {
            let mut stream = open_resource(Arc::clone(&self.source), descriptor, 0)?;
            let mut hasher = Sha1::new();
            let mut buf = [0u8; 8192];
            loop {
                let n = stream
                    .read(&mut buf)
                    .map_err(|e| WimError::io("verify resource hash", e))?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            let digest: [u8; 20] = hasher.finalize().into();
            if digest != hash.0 {
                return Err(WimError::new(
                    "verify resource hash",
                    WimErrorKind::Structural(format!(
                        "resource at offset {} hashes to {digest:02x?}, expected {:02x?}",
                        descriptor.offset, hash.0
                    )),
                ));
            }
        }

        Ok(())
    }
}

/// Reads a resource's full decompressed contents into memory. Used for the offset table and XML
/// blob, both of which are small and read once.
pub(crate) fn read_resource_fully<F: ReadAt>(
    source: &Arc<F>,
    descriptor: &crate::resource::ResourceDescriptor,
) -> Result<Vec<u8>> {
    use std::io::Read;

    let mut stream = open_resource(Arc::clone(source), descriptor, 0)?;
    let mut buf = Vec::with_capacity(descriptor.original_size as usize);
    stream
        .read_to_end(&mut buf)
        .map_err(|e| WimError::io("read resource", e))?;
    Ok(buf)
}
