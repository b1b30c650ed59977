//! GoldSrc (version 30) records that differ from their Source counterparts.
//! Planes, vertices, edges and surf-edges share the Source layout.

use glam::{Vec2, Vec3, Vec4};

use common::prelude::*;

use super::{
    consts::{GoldSrcLumpType, MAX_MAP_FACES, MAX_MAP_MODELS, MAX_MAP_TEXINFO},
    edges::{BSPEdge, BSPSurfEdge},
    face::face_vertex_indices,
    header::BSPEngine,
    BSPFile, Lump, LumpData,
};
use crate::resource::pixels::flip_rows;

pub const MIPTEX_NAME_LENGTH: usize = 16;
pub const MIP_LEVELS: usize = 4;
pub const PALETTE_START: [u8; 2] = [0x00, 0x01];
pub const PALETTE_END: [u8; 2] = [0x00, 0x00];
const PALETTE_SIZE: usize = 256 * 3;
const TRANSPARENT_INDEX: u8 = 255;

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GoldSrcFace {
    pub plane_num: u16,
    pub side: u16,
    pub first_edge: i32,
    pub num_edges: u16,
    pub tex_info: u16,
    pub styles: [u8; 4],
    pub light_ofs: i32,
}

impl GoldSrcFace {
    pub fn vertex_indices(&self, edges: &[BSPEdge], surfedges: &[BSPSurfEdge]) -> Result<Vec<usize>> {
        face_vertex_indices(self.first_edge, self.num_edges as i32, edges, surfedges)
    }
}

impl Lump for GoldSrcFace {
    fn max() -> usize {
        MAX_MAP_FACES
    }
    fn lump_id(engine: BSPEngine) -> Option<usize> {
        (engine == BSPEngine::GoldSrc).then_some(GoldSrcLumpType::Faces as usize)
    }
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GoldSrcTexInfo {
    pub s: Vec4,
    pub t: Vec4,
    /// Index into the texture lump.
    pub texture: u32,
    pub flags: u32,
}

impl GoldSrcTexInfo {
    pub fn tex_coords(&self, pos: Vec3) -> Vec2 {
        let (s, t) = (self.s, self.t);
        Vec2::new(s.truncate().dot(pos) + s.w, t.truncate().dot(pos) + t.w)
    }
}

impl Lump for GoldSrcTexInfo {
    fn max() -> usize {
        MAX_MAP_TEXINFO
    }
    fn lump_id(engine: BSPEngine) -> Option<usize> {
        (engine == BSPEngine::GoldSrc).then_some(GoldSrcLumpType::TexInfo as usize)
    }
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GoldSrcModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    pub head_nodes: [i32; 4],
    pub vis_leafs: i32,
    pub first_face: i32,
    pub num_faces: i32,
}

impl GoldSrcModel {
    pub fn faces(&self) -> std::ops::Range<usize> {
        let first = self.first_face.max(0) as usize;
        first..first + self.num_faces.max(0) as usize
    }
}

impl Lump for GoldSrcModel {
    fn max() -> usize {
        MAX_MAP_MODELS
    }
    fn lump_id(engine: BSPEngine) -> Option<usize> {
        (engine == BSPEngine::GoldSrc).then_some(GoldSrcLumpType::Models as usize)
    }
}

/// Expands palette indices to RGBA8. In transparent textures the last
/// palette slot is fully clear.
pub fn palette_to_rgba(indices: &[u8], palette: &[u8], transparent: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(indices.len() * 4);
    for &i in indices {
        let base = i as usize * 3;
        let rgb = palette.get(base..base + 3).unwrap_or(&[0, 0, 0]);
        if transparent && i == TRANSPARENT_INDEX {
            out.extend_from_slice(&[0, 0, 0, 0]);
        } else {
            out.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
    }
    out
}

/// A mip texture. Textures stored in external WADs carry only their name and
/// size, so `rgba` is `None`.
#[derive(Debug, Clone)]
pub struct GoldSrcTexture {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub offsets: [u32; MIP_LEVELS],
    /// Top mip as RGBA8, bottom row first.
    pub rgba: Option<Vec<u8>>,
}

impl GoldSrcTexture {
    pub fn is_transparent(&self) -> bool {
        self.name.starts_with('{')
    }

    /// Reads the mip texture header at the cursor along with its embedded
    /// pixels, if any. Offsets are relative to the header.
    pub fn read(reader: &mut ByteReader) -> Result<Self> {
        let entry = reader.tell();
        let name = reader.read_fixed_string(MIPTEX_NAME_LENGTH)?.to_ascii_uppercase();
        let width = reader.read_u32()?;
        let height = reader.read_u32()?;
        let mut offsets = [0u32; MIP_LEVELS];
        for o in offsets.iter_mut() {
            *o = reader.read_u32()?;
        }

        let mut texture = Self {
            name,
            width,
            height,
            offsets,
            rgba: None,
        };
        if offsets.iter().all(|&o| o == 0) {
            return Ok(texture);
        }

        let pixels = width as usize * height as usize;
        reader.seek_to(entry + offsets[0] as usize)?;
        let indices = reader.read(pixels)?;

        // the palette follows the smallest mip, which is 1/64th of the top one
        let anchor = entry + offsets[MIP_LEVELS - 1] as usize + (pixels >> 6);
        reader.seek_to(anchor)?;
        if reader.read_array::<2>()? != PALETTE_START {
            return Err(Error::assertion(
                anchor,
                format!("texture {} has no palette start anchor", texture.name),
            ));
        }
        let palette = reader.read(PALETTE_SIZE)?;
        if reader.read_array::<2>()? != PALETTE_END {
            return Err(Error::assertion(
                anchor + 2 + PALETTE_SIZE,
                format!("texture {} has no palette end anchor", texture.name),
            ));
        }

        let mut rgba = palette_to_rgba(&indices, &palette, texture.is_transparent());
        flip_rows(&mut rgba, width as usize);
        texture.rgba = Some(rgba);
        Ok(texture)
    }
}

/// The texture lump: a count, an offset per texture, then the mip textures.
#[derive(Debug, Clone, Default)]
pub struct GoldSrcTextures {
    /// `None` where the offset table holds -1.
    pub textures: Vec<Option<GoldSrcTexture>>,
}

impl GoldSrcTextures {
    pub fn read(reader: &mut ByteReader) -> Result<Self> {
        if reader.is_empty() {
            return Ok(Self::default());
        }
        let count = reader.read_u32()? as usize;
        let offsets = reader.read_pod_slice::<i32>(count)?;
        let textures = offsets
            .into_iter()
            .map(|offset| {
                if offset < 0 {
                    return Ok(None);
                }
                reader.seek_to(offset as usize)?;
                GoldSrcTexture::read(reader).map(Some)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { textures })
    }

    pub fn get(&self, index: usize) -> Option<&GoldSrcTexture> {
        self.textures.get(index)?.as_ref()
    }
}

impl LumpData for GoldSrcTextures {
    fn lump_id(engine: BSPEngine) -> Option<usize> {
        (engine == BSPEngine::GoldSrc).then_some(GoldSrcLumpType::Textures as usize)
    }

    fn parse(bsp: &BSPFile, id: usize) -> Result<Self> {
        let mut reader = bsp.lump_reader(id)?;
        Self::read(&mut reader)
    }
}

#[cfg(test)]
pub(crate) mod goldsrc_tests {
    use super::*;

    /// A 8x8 mip texture with every mip level and a palette where slot `i`
    /// is `(i, 255 - i, 7)`.
    pub(crate) fn mip_texture(name: &str, width: u32, height: u32) -> Vec<u8> {
        let pixels = (width * height) as usize;
        let header = 16 + 8 + 16;
        let mut offsets = [0u32; 4];
        let mut mips = Vec::new();
        for (level, offset) in offsets.iter_mut().enumerate() {
            *offset = (header + mips.len()) as u32;
            let count = pixels >> (level * 2);
            mips.extend((0..count).map(|i| (i % 256) as u8));
        }

        let mut out = Vec::new();
        let mut fixed = [0u8; 16];
        fixed[..name.len()].copy_from_slice(name.as_bytes());
        out.extend_from_slice(&fixed);
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&height.to_le_bytes());
        for o in offsets {
            out.extend_from_slice(&o.to_le_bytes());
        }
        out.extend_from_slice(&mips);
        out.extend_from_slice(&PALETTE_START);
        for i in 0..=255u8 {
            out.extend_from_slice(&[i, 255 - i, 7]);
        }
        out.extend_from_slice(&PALETTE_END);
        out
    }

    #[test]
    fn record_sizes() {
        assert_eq!(std::mem::size_of::<GoldSrcFace>(), 20);
        assert_eq!(std::mem::size_of::<GoldSrcTexInfo>(), 40);
        assert_eq!(std::mem::size_of::<GoldSrcModel>(), 64);
    }

    #[test]
    fn decodes_embedded_texture() {
        let mut reader = ByteReader::from_vec(mip_texture("brick01", 8, 8));
        let tex = GoldSrcTexture::read(&mut reader).unwrap();
        assert_eq!(tex.name, "BRICK01");
        assert_eq!((tex.width, tex.height), (8, 8));
        let rgba = tex.rgba.unwrap();
        assert_eq!(rgba.len(), 8 * 8 * 4);
        // index 56 sat at the start of the last row before the flip
        assert_eq!(&rgba[..4], &[56, 199, 7, 255]);
        assert_eq!(&rgba[rgba.len() - 4..], &[7, 248, 7, 255]);
    }

    #[test]
    fn transparent_textures_clear_last_slot() {
        let rgba = palette_to_rgba(&[255, 1], &[9; PALETTE_SIZE], true);
        assert_eq!(rgba, [0, 0, 0, 0, 9, 9, 9, 255]);
        let rgba = palette_to_rgba(&[255], &[9; PALETTE_SIZE], false);
        assert_eq!(rgba, [9, 9, 9, 255]);
    }

    #[test]
    fn missing_palette_anchor() {
        let mut data = mip_texture("{fence", 8, 8);
        let anchor = data.len() - PALETTE_SIZE - 4;
        data[anchor + 1] = 0x02;
        let err = GoldSrcTexture::read(&mut ByteReader::from_vec(data)).unwrap_err();
        assert!(matches!(err, Error::Assertion { offset, .. } if offset == anchor));
    }

    #[test]
    fn external_textures_have_no_pixels() {
        let mut data = mip_texture("sky", 8, 8);
        data[24..40].fill(0);
        data.truncate(40);
        let tex = GoldSrcTexture::read(&mut ByteReader::from_vec(data)).unwrap();
        assert_eq!(tex.name, "SKY");
        assert!(tex.rgba.is_none());
    }

    #[test]
    fn texture_lump_with_gaps() {
        let tex = mip_texture("water", 8, 8);
        let mut lump = Vec::new();
        lump.extend_from_slice(&2u32.to_le_bytes());
        lump.extend_from_slice(&(-1i32).to_le_bytes());
        lump.extend_from_slice(&12i32.to_le_bytes());
        lump.extend_from_slice(&tex);
        let textures = GoldSrcTextures::read(&mut ByteReader::from_vec(lump)).unwrap();
        assert!(textures.get(0).is_none());
        assert_eq!(textures.get(1).unwrap().name, "WATER");
    }
}
