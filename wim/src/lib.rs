//! A read-only parser for the Windows Imaging Format (WIM).
//!
//! `Reader::open` parses the header and offset table of a random-access byte source. Each `Image`
//! lazily materializes its security-descriptor table and directory tree on first use; `File` and
//! `Stream` values expose their content as plain [`std::io::Read`] byte streams, transparently
//! decompressing chunked LZX resources via [`wim_lzx`].
//!
//! WIM writing, XPRESS compression, spanned (multi-part) WIMs, integrity-table verification, and
//! interpretation of reparse-point payloads or security-descriptor SDDL are all out of scope.

#![forbid(unsafe_code)]

pub mod attr;
pub mod compressed;
pub mod directory;
pub mod error;
pub mod filetime;
pub mod hash;
pub mod header;
pub mod image;
pub mod offset_table;
pub mod reader;
pub mod resource;
mod resource_reader;
mod security;
mod xml;

pub use attr::FileAttributes;
pub use directory::{File, FileStream, Stream};
pub use error::{WimError, WimErrorKind};
pub use filetime::FileTime;
pub use hash::ContentHash;
pub use header::{Header, WimFlags};
pub use image::Image;
pub use reader::Reader;
pub use resource::{ResourceDescriptor, ResourceFlags};
pub use resource_reader::ResourceReader;
