use std::fmt;

use common::prelude::*;

use super::consts::{GOLDSRC_HEADER_LUMPS, GOLDSRC_VERSION, HEADER_LUMPS, VBSP_IDENT};

const PSBV_IDENT: [u8; 4] = *b"PSBV";

// https://developer.valvesoftware.com/wiki/BSP_(Source)
#[repr(C, packed)]
#[derive(Debug, Default, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPLump {
    pub file_ofs: i32, // offset into file (bytes)
    pub file_len: i32, // length of lump (bytes)
    pub version: i32,  // lump format version
    // non-zero when the lump is LZMA compressed
    pub uncompressed_len: i32,
}

impl BSPLump {
    pub fn is_present(&self) -> bool {
        self.file_len > 0
    }

    pub fn offset(&self) -> usize {
        self.file_ofs.max(0) as usize
    }

    pub fn len(&self) -> usize {
        self.file_len.max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        !self.is_present()
    }

    pub fn is_compressed(&self) -> bool {
        self.uncompressed_len != 0
    }
}

#[repr(C, packed)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SourceHeader {
    pub ident: [u8; 4],                 // BSP file identifier
    pub version: i32,                   // BSP file version
    pub lumps: [BSPLump; HEADER_LUMPS], // lump directory array
    pub map_revision: i32,              // the map's revision (iteration, version) number
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GoldSrcLump {
    pub file_ofs: i32,
    pub file_len: i32,
}

#[repr(C, packed)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GoldSrcHeader {
    pub version: i32,
    pub lumps: [GoldSrcLump; GOLDSRC_HEADER_LUMPS],
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BSPEngine {
    Source,
    GoldSrc,
}

/// Lump directory of either engine, normalised to Source's lump record.
#[derive(Clone)]
pub struct BSPHeader {
    pub engine: BSPEngine,
    pub version: i32,
    pub map_revision: i32,
    pub lumps: Vec<BSPLump>,
}

impl fmt::Debug for BSPHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BSPHeader")
            .field("engine", &self.engine)
            .field("version", &self.version)
            .field("map_revision", &self.map_revision)
            .field(
                "present_lumps",
                &self.lumps.iter().filter(|l| l.is_present()).count(),
            )
            .finish()
    }
}

impl BSPHeader {
    pub fn read(reader: &mut ByteReader) -> Result<Self> {
        // This way around means little endian, PSBV is big endian
        match reader.peek_with(|r| r.read_array::<4>())? {
            VBSP_IDENT => {
                let header: SourceHeader = reader.read_pod()?;
                Ok(Self {
                    engine: BSPEngine::Source,
                    version: header.version,
                    map_revision: header.map_revision,
                    lumps: header.lumps.to_vec(),
                })
            }
            PSBV_IDENT => Err(Error::unsupported("big-endian (console) bsp")),
            _ => {
                let header: GoldSrcHeader = reader.read_pod()?;
                let version = header.version;
                if version != GOLDSRC_VERSION {
                    return Err(Error::unsupported(format!(
                        "bsp without VBSP ident and version {version}"
                    )));
                }
                Ok(Self {
                    engine: BSPEngine::GoldSrc,
                    version,
                    map_revision: 0,
                    lumps: header
                        .lumps
                        .iter()
                        .map(|l| BSPLump {
                            file_ofs: l.file_ofs,
                            file_len: l.file_len,
                            version: 0,
                            uncompressed_len: 0,
                        })
                        .collect(),
                })
            }
        }
    }

    /// Absent slots yield a zeroed lump.
    pub fn lump(&self, id: usize) -> BSPLump {
        self.lumps.get(id).copied().unwrap_or_default()
    }

    /// Every present lump must lie inside a file of `file_len` bytes.
    pub fn validate(&self, file_len: usize) -> Result<()> {
        for (id, lump) in self.lumps.iter().enumerate() {
            let (ofs, len) = (lump.file_ofs, lump.file_len);
            if len == 0 {
                continue;
            }
            let in_bounds = ofs >= 0
                && len > 0
                && (ofs as usize)
                    .checked_add(len as usize)
                    .is_some_and(|end| end <= file_len);
            if !in_bounds {
                return Err(Error::assertion(
                    ofs.max(0) as usize,
                    format!("lump {id} spans {ofs}+{len}, outside {file_len} byte file"),
                ));
            }
        }
        Ok(())
    }
}
