//! File attribute bits, passed through unchanged to consumers (§6).

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct FileAttributes: u32 {
        const READONLY = 0x1;
        const HIDDEN = 0x2;
        const SYSTEM = 0x4;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
        const DEVICE = 0x40;
        const NORMAL = 0x80;
        const TEMPORARY = 0x100;
        const SPARSE_FILE = 0x200;
        const REPARSE_POINT = 0x400;
        const COMPRESSED = 0x800;
        const OFFLINE = 0x1000;
        const NOT_CONTENT_INDEXED = 0x2000;
        const ENCRYPTED = 0x4000;
        const INTEGRITY_STREAM = 0x8000;
        const VIRTUAL = 0x10000;
        const NO_SCRUB_DATA = 0x20000;
        const EA = 0x40000;
    }
}

impl FileAttributes {
    /// True iff `DIRECTORY` is set and `REPARSE_POINT` is not — reparse directories read as leaves.
    pub fn is_dir(self) -> bool {
        self.contains(FileAttributes::DIRECTORY) && !self.contains(FileAttributes::REPARSE_POINT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reparse_directory_is_not_a_dir() {
        let attrs = FileAttributes::DIRECTORY | FileAttributes::REPARSE_POINT;
        assert!(!attrs.is_dir());
    }

    #[test]
    fn plain_directory_is_a_dir() {
        assert!(FileAttributes::DIRECTORY.is_dir());
    }
}
