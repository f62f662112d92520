//! Decodes the UTF-16LE, BOM-prefixed XML metadata blob (§4.5).

use std::io::Read;
use std::sync::Arc;

use sync_file::ReadAt;

use crate::error::{Result, WimError, WimErrorKind};
use crate::resource::ResourceDescriptor;
use crate::resource_reader::open_resource;

const BOM: u16 = 0xFEFF;

pub(crate) fn read_xml<F: ReadAt>(source: &Arc<F>, descriptor: &ResourceDescriptor) -> Result<String> {
    if descriptor.original_size == 0 {
        return Ok(String::new());
    }

    let mut stream = open_resource(Arc::clone(source), descriptor, 0)?;
    let mut bytes = Vec::with_capacity(descriptor.original_size as usize);
    stream
        .read_to_end(&mut bytes)
        .map_err(|e| WimError::io("read XML resource", e))?;

    if bytes.len() % 2 != 0 {
        return Err(WimError::new(
            "decode XML",
            WimErrorKind::Truncated("XML resource has odd byte length".into()),
        ));
    }

    let code_units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();

    match code_units.split_first() {
        Some((&BOM, rest)) => String::from_utf16(rest).map_err(|e| {
            WimError::new(
                "decode XML",
                WimErrorKind::Structural(format!("invalid UTF-16 in XML resource: {e}")),
            )
        }),
        _ => Err(WimError::new(
            "decode XML",
            WimErrorKind::Structural("XML resource is missing its UTF-16 BOM".into()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use sync_file::RandomAccessFile;

    fn mem_file(bytes: &[u8]) -> Arc<RandomAccessFile> {
        let path = std::env::temp_dir().join(format!("wim-xml-test-{:x}", bytes.len()));
        std::fs::write(&path, bytes).unwrap();
        Arc::new(RandomAccessFile::from(std::fs::File::open(&path).unwrap()))
    }

    fn utf16le_with_bom(text: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&BOM.to_le_bytes());
        for unit in text.encode_utf16() {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out
    }

    #[test]
    fn empty_descriptor_yields_empty_string() {
        let source = mem_file(&[]);
        let descriptor = ResourceDescriptor {
            flags: crate::resource::ResourceFlags::empty(),
            compressed_size: 0,
            offset: 0,
            original_size: 0,
        };
        assert_eq!(read_xml(&source, &descriptor).unwrap(), "");
    }

    #[test]
    fn decodes_bom_prefixed_utf16() {
        let bytes = utf16le_with_bom("<WIM/>");
        let source = mem_file(&bytes);
        let descriptor = ResourceDescriptor {
            flags: crate::resource::ResourceFlags::empty(),
            compressed_size: bytes.len() as u64,
            offset: 0,
            original_size: bytes.len() as u64,
        };
        assert_eq!(read_xml(&source, &descriptor).unwrap(), "<WIM/>");
    }

    #[test]
    fn missing_bom_is_an_error() {
        let mut bytes = Vec::new();
        for unit in "no bom".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let source = mem_file(&bytes);
        let descriptor = ResourceDescriptor {
            flags: crate::resource::ResourceFlags::empty(),
            compressed_size: bytes.len() as u64,
            offset: 0,
            original_size: bytes.len() as u64,
        };
        assert!(read_xml(&source, &descriptor).is_err());
    }
}
