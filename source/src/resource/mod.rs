//! Source 2 compiled resources (`*_c` files).
//!
//! A resource is a small header followed by a table of tagged blocks. Blocks
//! find each other by tag: a texture's `DATA` block looks up `REDI`/`RED2`
//! for compiler metadata, and pixel data follows the last block.

pub mod pixels;
pub mod redi;
pub mod rerl;
pub mod texture;

use std::sync::Arc;

use common::prelude::*;

use crate::kv3::{is_kv3, KV3Document};

pub use pixels::{BlockDecoder, DecodeHints, DecodedImage, ImageOptions};
pub use redi::{ResourceEditInfo, SpecialDependency};
pub use rerl::{ExternalReference, ExternalReferences};
pub use texture::{TextureHeader, VTexFormat};

pub const RESOURCE_HEADER_VERSION: u16 = 12;

/// Size of the fixed header that precedes the block table.
pub const RESOURCE_HEADER_SIZE: usize = 16;

/// One typed region of a resource file.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ResourceBlock {
    pub tag: [u8; 4],
    /// Offset from the start of the file.
    pub offset: usize,
    pub size: usize,
}

impl ResourceBlock {
    pub fn tag_str(&self) -> &str {
        std::str::from_utf8(&self.tag).unwrap_or("????")
    }

    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

#[derive(Debug, Clone)]
pub struct CompiledResource {
    data: ByteReader,
    pub file_size: u32,
    pub header_version: u16,
    pub version: u16,
    pub blocks: Vec<ResourceBlock>,
}

/// Whether `data` starts like a compiled resource header.
pub fn is_compiled_resource(data: &[u8]) -> bool {
    data.len() >= RESOURCE_HEADER_SIZE
        && u16::from_le_bytes([data[4], data[5]]) == RESOURCE_HEADER_VERSION
}

/// Reads a `u32` offset relative to its own position and follows it to a
/// NUL-terminated string. A zero offset is the empty string.
pub(crate) fn read_relative_string(reader: &mut ByteReader) -> Result<String> {
    let field = reader.tell();
    let offset = reader.read_u32()? as usize;
    if offset == 0 {
        return Ok(String::new());
    }
    reader.with_position(field + offset, |r| r.read_cstring())
}

impl CompiledResource {
    pub fn parse(data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let mut data = ByteReader::new(data);
        let file_size = data.read_u32()?;
        let header_version = data.read_u16()?;
        if header_version != RESOURCE_HEADER_VERSION {
            return Err(Error::unsupported(format!(
                "resource header version {header_version}"
            )));
        }
        let version = data.read_u16()?;
        if file_size as usize != data.len() {
            log::warn!(
                "resource header claims {file_size} bytes, buffer holds {}",
                data.len()
            );
        }

        let table_field = data.tell();
        let table_offset = data.read_u32()? as usize;
        let block_count = data.read_u32()?;
        data.seek_to(table_field + table_offset)?;

        let mut blocks = Vec::with_capacity(block_count.min(64) as usize);
        for _ in 0..block_count {
            let tag = data.read_array::<4>()?;
            let field = data.tell();
            let offset = field + data.read_u32()? as usize;
            let size = data.read_u32()? as usize;
            if offset.checked_add(size).map_or(true, |end| end > data.len()) {
                return Err(Error::assertion(
                    field,
                    format!(
                        "block {} spans {offset}+{size}, outside {} byte file",
                        String::from_utf8_lossy(&tag),
                        data.len()
                    ),
                ));
            }
            blocks.push(ResourceBlock { tag, offset, size });
        }
        log::debug!(
            "resource v{version}: {}",
            blocks
                .iter()
                .map(|b| b.tag_str())
                .collect::<Vec<_>>()
                .join(" ")
        );

        Ok(Self {
            data,
            file_size,
            header_version,
            version,
            blocks,
        })
    }

    pub fn get_block(&self, tag: &str) -> Option<&ResourceBlock> {
        self.blocks.iter().find(|b| b.tag == tag.as_bytes())
    }

    pub fn block_reader(&self, block: &ResourceBlock) -> Result<ByteReader> {
        self.data.slice(block.offset, block.size)
    }

    /// Everything after `block` to the end of the file.
    pub fn trailing_reader(&self, block: &ResourceBlock) -> Result<ByteReader> {
        let start = block.end();
        self.data.slice(start, self.data.len().saturating_sub(start))
    }

    /// Decodes a block holding binary KV3. `None` when the block is absent.
    pub fn kv3_block(&self, tag: &str) -> Result<Option<KV3Document>> {
        let Some(block) = self.get_block(tag) else {
            return Ok(None);
        };
        let mut reader = self.block_reader(block)?;
        if !is_kv3(reader.as_slice()) {
            return Err(Error::unsupported(format!(
                "block {tag} does not hold a known kv3 signature"
            )));
        }
        KV3Document::parse_reader(&mut reader).map(Some)
    }

    /// Dependency metadata from `REDI`, or from the KV3 `RED2` block.
    pub fn edit_info(&self) -> Result<Option<ResourceEditInfo>> {
        if let Some(block) = self.get_block("REDI") {
            let mut reader = self.block_reader(block)?;
            return ResourceEditInfo::read(&mut reader).map(Some);
        }
        match self.kv3_block("RED2")? {
            Some(doc) => Ok(Some(ResourceEditInfo::from_kv3(&doc))),
            None => Ok(None),
        }
    }

    pub fn external_references(&self) -> Result<Option<ExternalReferences>> {
        let Some(block) = self.get_block("RERL") else {
            return Ok(None);
        };
        let mut reader = self.block_reader(block)?;
        ExternalReferences::read(&mut reader).map(Some)
    }

    /// The texture header stored in the `DATA` block of a compiled texture.
    pub fn texture(&self) -> Result<TextureHeader> {
        let block = self
            .get_block("DATA")
            .ok_or_else(|| Error::assertion(0, "resource has no DATA block"))?;
        let mut reader = self.block_reader(block)?;
        TextureHeader::read(&mut reader)
    }
}
