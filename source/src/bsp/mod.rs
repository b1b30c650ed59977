// https://developer.valvesoftware.com/wiki/BSP_(Source)
//
// A BSP file holds nearly everything the engine needs to render and play a
// map: polygon geometry, texture references and their orientation, entities,
// and the BSP tree plus visibility data. Optionally it also embeds custom
// content (textures, models) in a zip archive stored in the pakfile lump.
//
// Everything past the header is addressed through the lump directory, so each
// lump can be decoded on its own. GoldSrc maps use the same idea with a
// shorter directory and a few different record layouts.

pub mod consts;
pub mod displacement;
pub mod edges;
pub mod entities;
pub mod face;
pub mod gamelump;
pub mod goldsrc;
pub mod header;
pub mod lightmap;
pub mod lump;
pub mod model;
pub mod pak;
pub mod plane;
pub mod textures;

use std::{
    any::{type_name, Any},
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

use ahash::AHashMap;
use glam::Vec3;

use common::prelude::*;

pub use displacement::{BSPDispInfo, BSPDispVert, DisplacementMesh};
pub use edges::{BSPEdge, BSPSurfEdge, BSPVertex};
pub use entities::{BSPEntities, Entity};
pub use face::{BSPFace, BSPOriginalFace};
pub use gamelump::{BSPGameLump, StaticProp, StaticPropLump};
pub use header::{BSPEngine, BSPHeader, BSPLump};
pub use lump::{Lump, LumpData};
pub use model::BSPModel;
pub use pak::PakLump;
pub use plane::BSPPlane;
pub use textures::{BSPTexData, BSPTexDataStringData, BSPTexDataStringTable, BSPTexInfo};

type LumpCache = AHashMap<usize, Arc<dyn Any + Send + Sync>>;

/// A map file with lazily decoded, cached lumps.
pub struct BSPFile {
    header: BSPHeader,
    data: ByteReader,
    cache: Mutex<LumpCache>,
}

impl std::fmt::Debug for BSPFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BSPFile")
            .field("header", &self.header)
            .field("len", &self.data.len())
            .finish()
    }
}

impl BSPFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("loading {}", path.display());
        Self::from_bytes(std::fs::read(path)?)
    }

    pub fn from_bytes(data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let mut data = ByteReader::new(data);
        let header = BSPHeader::read(&mut data)?;
        header.validate(data.len())?;
        log::debug!("{header:?}");
        data.seek_to(0)?;
        Ok(Self {
            header,
            data,
            cache: Mutex::new(AHashMap::new()),
        })
    }

    pub fn header(&self) -> &BSPHeader {
        &self.header
    }

    pub fn engine(&self) -> BSPEngine {
        self.header.engine
    }

    /// A reader over the whole file, for records addressed by file offset.
    pub fn file_reader(&self) -> ByteReader {
        self.data.clone()
    }

    pub fn lump_header(&self, id: usize) -> BSPLump {
        self.header.lump(id)
    }

    /// Raw lump bytes; absent lumps are empty.
    pub fn lump_bytes(&self, id: usize) -> Result<&[u8]> {
        let lump = self.lump_header(id);
        if lump.is_empty() {
            return Ok(&[]);
        }
        if lump.is_compressed() {
            return Err(Error::unsupported(format!("LZMA compressed lump {id}")));
        }
        let bytes = self.data.as_slice();
        bytes
            .get(lump.offset()..lump.offset() + lump.len())
            .ok_or_else(|| Error::OutOfBounds {
                offset: lump.offset(),
                requested: lump.len(),
                len: bytes.len(),
            })
    }

    pub fn lump_reader(&self, id: usize) -> Result<ByteReader> {
        let lump = self.lump_header(id);
        if lump.is_empty() {
            return Ok(ByteReader::new(Vec::new()));
        }
        if lump.is_compressed() {
            return Err(Error::unsupported(format!("LZMA compressed lump {id}")));
        }
        self.data.slice(lump.offset(), lump.len())
    }

    /// Decodes a lump on first use and hands out the cached copy after that.
    pub fn get_lump<T: LumpData>(&self) -> Result<Arc<T>> {
        let engine = self.engine();
        let id = T::lump_id(engine).ok_or_else(|| {
            Error::unsupported(format!("{} in a {engine:?} map", type_name::<T>()))
        })?;

        let cached = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned();
        if let Some(cached) = cached {
            return match cached.downcast::<T>() {
                Ok(lump) => Ok(lump),
                // same slot read as a different type
                Err(_) => T::parse(self, id).map(Arc::new),
            };
        }

        let lump = Arc::new(T::parse(self, id)?);
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, lump.clone());
        Ok(lump)
    }

    /// Material name of a texdata entry.
    pub fn texture_name(&self, tex_data: usize) -> Result<String> {
        let data = self.get_lump::<Vec<BSPTexData>>()?;
        let table = self.get_lump::<Vec<BSPTexDataStringTable>>()?;
        let strings = self.get_lump::<BSPTexDataStringData>()?;

        let entry = data.get(tex_data).ok_or_else(|| {
            Error::assertion(0, format!("texdata {tex_data} outside {} entries", data.len()))
        })?;
        let string_id = entry.name_string_table_id;
        let offset = table
            .get(string_id.max(0) as usize)
            .map(|s| s.index)
            .filter(|&offset| string_id >= 0 && offset >= 0)
            .ok_or_else(|| {
                Error::assertion(
                    0,
                    format!("texture name {string_id} outside {} table entries", table.len()),
                )
            })?;
        strings.get(offset as usize)
    }

    /// Corner positions of a face in winding order.
    pub fn face_positions(&self, face: &BSPFace) -> Result<Vec<Vec3>> {
        let vertices = self.get_lump::<Vec<BSPVertex>>()?;
        let edges = self.get_lump::<Vec<BSPEdge>>()?;
        let surfedges = self.get_lump::<Vec<BSPSurfEdge>>()?;
        face.vertex_indices(&edges, &surfedges)?
            .into_iter()
            .map(|i| {
                vertices.get(i).map(|v| v.0).ok_or_else(|| {
                    Error::assertion(0, format!("vertex {i} outside {} vertices", vertices.len()))
                })
            })
            .collect()
    }

    pub fn displacement(&self, index: usize) -> Result<DisplacementMesh> {
        let infos = self.get_lump::<Vec<BSPDispInfo>>()?;
        let faces = self.get_lump::<Vec<BSPFace>>()?;
        let disp_verts = self.get_lump::<Vec<BSPDispVert>>()?;
        let tex_infos = self.get_lump::<Vec<BSPTexInfo>>()?;
        let tex_datas = self.get_lump::<Vec<BSPTexData>>()?;

        let out_of_range =
            |what: &str, i: usize, len: usize| Error::assertion(0, format!("{what} {i} outside {len}"));

        let info = infos
            .get(index)
            .ok_or_else(|| out_of_range("displacement", index, infos.len()))?;
        let face_index = info.map_face as usize;
        let face = faces
            .get(face_index)
            .ok_or_else(|| out_of_range("face", face_index, faces.len()))?;
        let tex_info_index = face.tex_info.max(0) as usize;
        let tex_info = tex_infos
            .get(tex_info_index)
            .ok_or_else(|| out_of_range("texinfo", tex_info_index, tex_infos.len()))?;
        let tex_data_index = tex_info.tex_data.max(0) as usize;
        let tex_data = tex_datas
            .get(tex_data_index)
            .ok_or_else(|| out_of_range("texdata", tex_data_index, tex_datas.len()))?;

        let corners = self.face_positions(face)?;
        DisplacementMesh::build(info, &corners, &disp_verts, tex_info, tex_data)
    }
}
