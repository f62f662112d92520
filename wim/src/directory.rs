//! Directory-entry and stream-entry decoding, the directory walker, and the public `File`/`Stream`
//! types (§4.7, §4.8).

use std::io::Read;
use std::sync::Arc;

use sync_file::ReadAt;
use tracing::{instrument, trace};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, LE, U16, U32, U64};

use crate::attr::FileAttributes;
use crate::error::{Result, WimError, WimErrorKind};
use crate::filetime::{FileTime, FileTimeLe};
use crate::hash::ContentHash;
use crate::image::Image;
use crate::resource::ResourceDescriptor;
use crate::resource_reader::{open_resource, ResourceReader};

const DIRECTORY_ENTRY_PREFIX_LEN: usize = 102;
const STREAM_ENTRY_PREFIX_LEN: usize = 38;

/// Fixed 102-byte prefix of a directory entry.
#[derive(Clone, Copy, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct DirectoryEntryRaw {
    length: U64<LE>,
    attributes: U32<LE>,
    security_id: U32<LE>,
    subdir_offset: U64<LE>,
    _reserved1: U64<LE>,
    _reserved2: U64<LE>,
    creation_time: FileTimeLe,
    last_access_time: FileTimeLe,
    last_write_time: FileTimeLe,
    hash: ContentHash,
    _padding: U32<LE>,
    reparse_or_hardlink: U64<LE>,
    stream_count: U16<LE>,
    short_name_length: U16<LE>,
    file_name_length: U16<LE>,
}

static_assertions::const_assert_eq!(std::mem::size_of::<DirectoryEntryRaw>(), DIRECTORY_ENTRY_PREFIX_LEN);

/// Fixed 38-byte prefix of a stream entry.
#[derive(Clone, Copy, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct StreamEntryRaw {
    length: U64<LE>,
    _reserved: U64<LE>,
    hash: ContentHash,
    name_length: U16<LE>,
}

static_assertions::const_assert_eq!(std::mem::size_of::<StreamEntryRaw>(), STREAM_ENTRY_PREFIX_LEN);

const SECURITY_ID_NONE: u32 = 0xFFFF_FFFF;

/// An alternate (or primary) data stream attached to a file.
pub struct Stream<F> {
    image: Arc<Image<F>>,
    pub name: String,
    pub size: u64,
    hash: Option<ContentHash>,
    descriptor: Option<ResourceDescriptor>,
}

impl<F: ReadAt> Stream<F> {
    /// Opens the stream's resource at logical offset 0.
    pub fn open(&self) -> Result<FileStream<F>> {
        open_content(&self.image, self.descriptor)
    }

    pub fn hash(&self) -> Option<ContentHash> {
        self.hash
    }
}

/// One directory entry: a file, a directory, or a reparse point.
pub struct File<F> {
    image: Arc<Image<F>>,
    pub name: String,
    pub short_name: String,
    pub attributes: FileAttributes,
    pub creation_time: FileTime,
    pub last_access_time: FileTime,
    pub last_write_time: FileTime,
    pub size: u64,
    hash: Option<ContentHash>,
    descriptor: Option<ResourceDescriptor>,
    subdir_offset: u64,
    pub link_id: Option<u64>,
    pub reparse_tag: Option<u32>,
    pub reparse_reserved: Option<u32>,
    security_descriptor: Option<Arc<[u8]>>,
    pub streams: Vec<Stream<F>>,
}

impl<F: ReadAt> File<F> {
    pub fn is_dir(&self) -> bool {
        self.attributes.is_dir()
    }

    pub fn hash(&self) -> Option<ContentHash> {
        self.hash
    }

    pub fn security_descriptor(&self) -> Option<&[u8]> {
        self.security_descriptor.as_deref()
    }

    /// Opens the file's primary-content resource at logical offset 0.
    pub fn open(&self) -> Result<FileStream<F>> {
        open_content(&self.image, self.descriptor)
    }

    /// Lists the directory's children. Fails if this entry is not a directory.
    #[instrument(level = "debug", skip(self), fields(name = %self.name))]
    pub fn readdir(&self) -> Result<Vec<File<F>>> {
        if !self.is_dir() {
            return Err(WimError::with_path(
                "readdir",
                self.name.clone(),
                WimErrorKind::Structural("not a directory".into()),
            ));
        }
        walk_directory(&self.image, self.subdir_offset)
    }
}

fn open_content<F: ReadAt>(
    image: &Arc<Image<F>>,
    descriptor: Option<ResourceDescriptor>,
) -> Result<FileStream<F>> {
    match descriptor {
        None => Ok(FileStream::Empty),
        Some(descriptor) => Ok(FileStream::Resource(open_resource(
            image.reader_source(),
            &descriptor,
            0,
        )?)),
    }
}

/// The byte stream returned by [`File::open`]/[`Stream::open`]: either a real resource reader, or
/// an always-empty stream for the all-zero-hash sentinel.
pub enum FileStream<F> {
    Resource(ResourceReader<F>),
    Empty,
}

impl<F: ReadAt> Read for FileStream<F> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            FileStream::Resource(r) => r.read(buf),
            FileStream::Empty => Ok(0),
        }
    }
}

/// Reads exactly `buf.len()` bytes, translating a short read (but nonzero) into a truncation
/// error; a read of exactly zero bytes at the very start of an entry is end-of-directory.
fn read_fully(reader: &mut impl Read, buf: &mut [u8]) -> Result<()> {
    reader
        .read_exact(buf)
        .map_err(|e| WimError::io("read directory entry", e))
}

/// Runs the directory walker at `subdir_offset` within `image`'s metadata resource.
#[instrument(level = "trace", skip(image))]
pub(crate) fn walk_directory<F: ReadAt>(image: &Arc<Image<F>>, subdir_offset: u64) -> Result<Vec<File<F>>> {
    let mut reader = open_resource(image.reader_source(), image.metadata_descriptor(), subdir_offset)?;
    let mut files = Vec::new();

    loop {
        let mut length_bytes = [0u8; 8];
        read_fully(&mut reader, &mut length_bytes)?;
        let length = u64::from_le_bytes(length_bytes);
        if length == 0 {
            break;
        }
        if length < DIRECTORY_ENTRY_PREFIX_LEN as u64 {
            return Err(WimError::new(
                "decode directory entry",
                WimErrorKind::Truncated(format!(
                    "entry length {length} is below the {DIRECTORY_ENTRY_PREFIX_LEN}-byte fixed prefix"
                )),
            ));
        }

        let mut rest_of_prefix = [0u8; DIRECTORY_ENTRY_PREFIX_LEN - 8];
        read_fully(&mut reader, &mut rest_of_prefix)?;
        let mut prefix_bytes = [0u8; DIRECTORY_ENTRY_PREFIX_LEN];
        prefix_bytes[..8].copy_from_slice(&length_bytes);
        prefix_bytes[8..].copy_from_slice(&rest_of_prefix);
        let entry = DirectoryEntryRaw::read_from_bytes(&prefix_bytes[..]).expect("fixed size");

        let file_name_length = entry.file_name_length.get() as u64;
        let short_name_length = entry.short_name_length.get() as u64;
        let name_block_len = length - DIRECTORY_ENTRY_PREFIX_LEN as u64;
        if name_block_len < file_name_length + 2 + short_name_length {
            return Err(WimError::new(
                "decode directory entry",
                WimErrorKind::Truncated("entry is too short for its declared name lengths".into()),
            ));
        }

        let mut name_block = vec![0u8; name_block_len as usize];
        read_fully(&mut reader, &mut name_block)?;

        let file_name = decode_utf16le(&name_block[0..file_name_length as usize])?;
        let short_name_start = file_name_length as usize + 2;
        let short_name = decode_utf16le(
            &name_block[short_name_start..short_name_start + short_name_length as usize],
        )?;

        let attributes = FileAttributes::from_bits_truncate(entry.attributes.get());
        let security_id = entry.security_id.get();
        let security_descriptor = if security_id != SECURITY_ID_NONE {
            Some(Arc::from(
                image
                    .security_table()?
                    .get(security_id)
                    .ok_or_else(|| {
                        WimError::with_path(
                            "decode directory entry",
                            file_name.clone(),
                            WimErrorKind::Structural(format!(
                                "security descriptor index {security_id} out of range"
                            )),
                        )
                    })?
                    .to_vec()
                    .into_boxed_slice(),
            ))
        } else {
            None
        };

        let dir_hash = entry.hash.non_zero();
        let dir_descriptor = match dir_hash {
            Some(hash) => Some(image.reader_offset_table().resolve(hash, &file_name)?),
            None => None,
        };

        let reparse_point = attributes.contains(FileAttributes::REPARSE_POINT);
        let subdir_offset = entry.subdir_offset.get();

        let (link_id, reparse_tag, reparse_reserved) = if reparse_point {
            let raw = entry.reparse_or_hardlink.get();
            (None, Some(raw as u32), Some((raw >> 32) as u32))
        } else {
            (Some(entry.reparse_or_hardlink.get()), None, None)
        };

        let is_directory = attributes.is_dir();
        if is_directory != (subdir_offset != 0) {
            return Err(WimError::with_path(
                "decode directory entry",
                file_name.clone(),
                WimErrorKind::Structural(
                    "directory attribute and subdirectory offset are inconsistent".into(),
                ),
            ));
        }

        trace!(name = %file_name, is_directory, stream_count = entry.stream_count.get(), "decoded directory entry");

        // The directory entry's own hash is the default primary content; the first empty-named
        // stream entry, if any, overwrites it entirely. Later empty-named streams are dropped.
        let mut hash = dir_hash;
        let mut descriptor = dir_descriptor;
        let mut primary_seen = false;
        let mut streams = Vec::new();
        for _ in 0..entry.stream_count.get() {
            let stream = decode_stream_entry(&mut reader, image, &file_name)?;
            if stream.name.is_empty() {
                if !primary_seen {
                    hash = stream.hash;
                    descriptor = stream.descriptor;
                    primary_seen = true;
                }
            } else {
                streams.push(stream);
            }
        }
        let size = descriptor.map(|d| d.original_size).unwrap_or(0);

        if reparse_point && size == 0 {
            return Err(WimError::with_path(
                "decode directory entry",
                file_name.clone(),
                WimErrorKind::Structural("reparse point has zero size".into()),
            ));
        }

        files.push(File {
            image: Arc::clone(image),
            name: file_name,
            short_name,
            attributes,
            creation_time: entry.creation_time.get(),
            last_access_time: entry.last_access_time.get(),
            last_write_time: entry.last_write_time.get(),
            size,
            hash,
            descriptor,
            subdir_offset,
            link_id,
            reparse_tag,
            reparse_reserved,
            security_descriptor,
            streams,
        });
    }

    Ok(files)
}

fn decode_stream_entry<F: ReadAt>(
    reader: &mut ResourceReader<F>,
    image: &Arc<Image<F>>,
    owner_name: &str,
) -> Result<Stream<F>> {
    let mut length_bytes = [0u8; 8];
    read_fully(reader, &mut length_bytes)?;
    let length = u64::from_le_bytes(length_bytes);
    if length < STREAM_ENTRY_PREFIX_LEN as u64 {
        return Err(WimError::with_path(
            "decode stream entry",
            owner_name,
            WimErrorKind::Truncated(format!(
                "stream entry length {length} is below the {STREAM_ENTRY_PREFIX_LEN}-byte fixed prefix"
            )),
        ));
    }

    let mut rest = [0u8; STREAM_ENTRY_PREFIX_LEN - 8];
    read_fully(reader, &mut rest)?;
    let mut prefix_bytes = [0u8; STREAM_ENTRY_PREFIX_LEN];
    prefix_bytes[..8].copy_from_slice(&length_bytes);
    prefix_bytes[8..].copy_from_slice(&rest);
    let entry = StreamEntryRaw::read_from_bytes(&prefix_bytes[..]).expect("fixed size");

    let name_length = entry.name_length.get() as u64;
    if length - STREAM_ENTRY_PREFIX_LEN as u64 < name_length {
        return Err(WimError::with_path(
            "decode stream entry",
            owner_name,
            WimErrorKind::Truncated("stream entry is too short for its declared name length".into()),
        ));
    }
    let padding = length - STREAM_ENTRY_PREFIX_LEN as u64 - name_length;

    let mut name_bytes = vec![0u8; name_length as usize];
    read_fully(reader, &mut name_bytes)?;
    let name = decode_utf16le(&name_bytes)?;

    if padding > 0 {
        let mut skip = vec![0u8; padding as usize];
        read_fully(reader, &mut skip)?;
    }

    let hash = entry.hash.non_zero();
    let descriptor = match hash {
        Some(hash) => Some(image.reader_offset_table().resolve(hash, owner_name)?),
        None => None,
    };
    let size = descriptor.map(|d| d.original_size).unwrap_or(0);

    Ok(Stream {
        image: Arc::clone(image),
        name,
        size,
        hash,
        descriptor,
    })
}

fn decode_utf16le(bytes: &[u8]) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(WimError::new(
            "decode UTF-16LE name",
            WimErrorKind::Truncated("name has odd byte length".into()),
        ));
    }
    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
    String::from_utf16(&units).map_err(|e| {
        WimError::new(
            "decode UTF-16LE name",
            WimErrorKind::Structural(format!("invalid UTF-16: {e}")),
        )
    })
}
