use flagset::FlagSet;
use glam::{Vec2, Vec3, Vec4};

use common::prelude::*;

use super::{
    consts::{
        LumpType, SurfaceFlags, MAX_MAP_TEXDATA, MAX_MAP_TEXDATA_STRING_DATA,
        MAX_MAP_TEXDATA_STRING_TABLE, MAX_MAP_TEXINFO,
    },
    header::BSPEngine,
    BSPFile, Lump, LumpData,
};

// Texinfo
//
// u = tex_s.xyz · p + tex_s.w, v = tex_t.xyz · p + tex_t.w, then divide by
// the texture's size to get normalised coordinates. The lightmap vectors map
// the same way into luxel space.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPTexInfo {
    /// [s/t][xyz offset]
    pub tex_s: Vec4,
    /// [s/t][xyz offset]
    pub tex_t: Vec4,
    pub lightmap_s: Vec4, // [s/t][xyz offset] - length is in units of texels/area
    pub lightmap_t: Vec4, // [s/t][xyz offset] - length is in units of texels/area
    pub flags: i32,       // miptex flags overrides
    pub tex_data: i32,    // Pointer to texture name, size, etc.
}

impl BSPTexInfo {
    pub fn surface_flags(&self) -> FlagSet<SurfaceFlags> {
        FlagSet::new_truncated(self.flags)
    }

    /// Texel-space coordinates of a world position.
    pub fn tex_coords(&self, pos: Vec3) -> Vec2 {
        let (s, t) = (self.tex_s, self.tex_t);
        Vec2::new(s.truncate().dot(pos) + s.w, t.truncate().dot(pos) + t.w)
    }
}

impl Lump for BSPTexInfo {
    fn max() -> usize {
        MAX_MAP_TEXINFO
    }
    fn lump_id(engine: BSPEngine) -> Option<usize> {
        (engine == BSPEngine::Source).then_some(LumpType::TexInfo as usize)
    }
}

/// The reflectivity vector is the average colour of the texture, used in
/// radiosity. The other members relate to the source image.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPTexData {
    pub reflectivity: Vec3,
    /// Index into the texdata string table.
    pub name_string_table_id: i32,
    pub width: i32,
    pub height: i32,
    pub view_width: i32,
    pub view_height: i32,
}

impl Lump for BSPTexData {
    fn max() -> usize {
        MAX_MAP_TEXDATA
    }
    fn lump_id(engine: BSPEngine) -> Option<usize> {
        (engine == BSPEngine::Source).then_some(LumpType::TexData as usize)
    }
}

/// Offset into the string data lump.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPTexDataStringTable {
    pub index: i32,
}

impl Lump for BSPTexDataStringTable {
    fn max() -> usize {
        MAX_MAP_TEXDATA_STRING_TABLE
    }
    fn lump_id(engine: BSPEngine) -> Option<usize> {
        (engine == BSPEngine::Source).then_some(LumpType::TexDataStringTable as usize)
    }
}

/// Concatenated NUL-terminated texture names.
#[derive(Debug, Clone)]
pub struct BSPTexDataStringData {
    data: ByteReader,
}

impl BSPTexDataStringData {
    pub fn get(&self, offset: usize) -> Result<String> {
        let mut data = self.data.clone();
        data.seek_to(offset)?;
        data.read_cstring()
    }
}

impl LumpData for BSPTexDataStringData {
    fn lump_id(engine: BSPEngine) -> Option<usize> {
        (engine == BSPEngine::Source).then_some(LumpType::TexDataStringData as usize)
    }

    fn parse(bsp: &BSPFile, id: usize) -> Result<Self> {
        let data = bsp.lump_reader(id)?;
        if data.len() > MAX_MAP_TEXDATA_STRING_DATA {
            log::warn!("{} bytes of texture names, over the engine limit", data.len());
        }
        Ok(Self { data })
    }
}
