//! One WIM image: a security-descriptor table plus a directory tree rooted in a metadata resource
//! (§4.6).

use std::sync::{Arc, OnceLock};

use sync_file::ReadAt;
use tracing::instrument;

use crate::directory::{walk_directory, File};
use crate::error::{Result, WimError, WimErrorKind};
use crate::offset_table::OffsetTable;
use crate::reader::Reader;
use crate::resource::ResourceDescriptor;
use crate::resource_reader::open_resource;
use crate::security::{parse_security_table, SecurityTable};

/// One image (root filesystem tree) within a WIM.
///
/// The security-descriptor table is parsed lazily on first use and cached for the lifetime of the
/// `Image`. The cache is a [`OnceLock`] rather than the non-`Sync` once-cell this family uses
/// elsewhere, because concurrent first-opens of the same `Image` must be serialized (§5).
pub struct Image<F> {
    reader: Arc<Reader<F>>,
    index: usize,
    cache: OnceLock<(SecurityTable, u64)>,
}

impl<F: ReadAt> Image<F> {
    pub(crate) fn new(reader: Arc<Reader<F>>, index: usize) -> Self {
        Image {
            reader,
            index,
            cache: OnceLock::new(),
        }
    }

    pub(crate) fn metadata_descriptor(&self) -> &ResourceDescriptor {
        &self.reader.offset_table.images[self.index]
    }

    pub(crate) fn reader_source(&self) -> Arc<F> {
        self.reader.source_arc()
    }

    pub(crate) fn reader_offset_table(&self) -> &OffsetTable {
        &self.reader.offset_table
    }

    /// Parses (or returns the cached) security-descriptor table and the root directory offset.
    pub(crate) fn security_table(&self) -> Result<&SecurityTable> {
        self.load()?;
        Ok(&self.cache.get().expect("just initialized").0)
    }

    fn root_offset(&self) -> Result<u64> {
        self.load()?;
        Ok(self.cache.get().expect("just initialized").1)
    }

    #[instrument(level = "debug", skip(self))]
    fn load(&self) -> Result<()> {
        if self.cache.get().is_some() {
            return Ok(());
        }

        let descriptor = *self.metadata_descriptor();
        let mut reader = open_resource(self.reader_source(), &descriptor, 0)?;
        let (table, root_offset) = parse_security_table(&mut reader)?;

        // `OnceLock::get_or_init` serializes concurrent first-opens; if another thread won the
        // race its result is used instead of ours, matching the "computed exactly once" contract.
        self.cache.get_or_init(|| (table, root_offset));
        Ok(())
    }

    /// Opens the root directory of this image.
    #[instrument(level = "info", skip(self))]
    pub fn open(self: Arc<Self>) -> Result<File<F>> {
        let root_offset = self.root_offset()?;
        let mut roots = walk_directory(&self, root_offset)?;
        if roots.len() != 1 {
            return Err(WimError::new(
                "open image",
                WimErrorKind::Structural(format!(
                    "expected exactly one root directory entry, found {}",
                    roots.len()
                )),
            ));
        }
        Ok(roots.remove(0))
    }
}
