use bytemuck::{Pod, Zeroable};
use common::prelude::*;
use glam::{Vec2, Vec3, Vec4};

pub const VVD_ID: [u8; 4] = *b"IDSV";
pub const VVD_VERSION: i32 = 4;
pub const MAX_LODS: usize = 8;

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct VertexFileHeader {
    pub id: [u8; 4],
    pub version: i32,
    /// Matches the checksum in the MDL header.
    pub checksum: i32,
    pub num_lods: i32,
    pub num_lod_vertexes: [i32; MAX_LODS],
    pub num_fixups: i32,
    pub fixup_table_start: i32,
    pub vertex_data_start: i32,
    pub tangent_data_start: i32,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct StudioVertex {
    pub bone_weights: [f32; 3],
    pub bone_ids: [u8; 3],
    pub num_bones: u8,
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl StudioVertex {
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn normal(&self) -> Vec3 {
        Vec3::from_array(self.normal)
    }

    pub fn uv(&self) -> Vec2 {
        Vec2::from_array(self.uv)
    }

    /// Bone index and weight pairs actually in use.
    pub fn weights(&self) -> impl Iterator<Item = (u8, f32)> {
        let (ids, weights) = (self.bone_ids, self.bone_weights);
        let count = (self.num_bones as usize).min(3);
        ids.into_iter().zip(weights).take(count)
    }
}

/// Copies `count` vertices from `src` into the LOD stream for every LOD up
/// to and including `lod`.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct VertexFixup {
    pub lod: i32,
    pub src: i32,
    pub count: i32,
}

pub struct VVD {
    pub header: VertexFileHeader,
    pub vertices: Vec<StudioVertex>,
    pub tangents: Vec<Vec4>,
    pub fixups: Vec<VertexFixup>,
}

impl VVD {
    pub fn read(reader: &mut ByteReader) -> Result<Self> {
        let header: VertexFileHeader = reader.read_pod()?;
        let id = header.id;
        if id != VVD_ID {
            return Err(Error::unsupported(format!(
                "vvd id {:?}",
                String::from_utf8_lossy(&id)
            )));
        }
        let version = header.version;
        if version != VVD_VERSION {
            return Err(Error::unsupported(format!("vvd version {version}")));
        }
        let num_lods = header.num_lods;
        if !(0..=MAX_LODS as i32).contains(&num_lods) {
            return Err(Error::assertion(12, format!("vvd has {num_lods} lods")));
        }

        let count = |n: i32, what: &str| {
            usize::try_from(n).map_err(|_| Error::assertion(0, format!("negative {what} count {n}")))
        };
        let offset = |n: i32, what: &str| {
            usize::try_from(n).map_err(|_| Error::assertion(0, format!("negative {what} offset {n}")))
        };

        let lod_vertexes = header.num_lod_vertexes;
        let total = count(lod_vertexes[0], "vertex")?;
        let vertices = reader.with_position(offset(header.vertex_data_start, "vertex")?, |r| {
            r.read_pod_slice::<StudioVertex>(total)
        })?;

        let tangent_start = header.tangent_data_start;
        let tangents = if tangent_start == 0 {
            Vec::new()
        } else {
            reader.with_position(offset(tangent_start, "tangent")?, |r| {
                Ok(r.read_pod_slice::<[f32; 4]>(total)?
                    .into_iter()
                    .map(Vec4::from_array)
                    .collect())
            })?
        };

        let fixups = reader.with_position(offset(header.fixup_table_start, "fixup")?, |r| {
            r.read_pod_slice::<VertexFixup>(count(header.num_fixups, "fixup")?)
        })?;
        for (i, fixup) in fixups.iter().enumerate() {
            let (src, n) = (fixup.src, fixup.count);
            let end = src.checked_add(n).and_then(|e| usize::try_from(e).ok());
            if src < 0 || end.map_or(true, |e| e > total) {
                return Err(Error::assertion(
                    i,
                    format!("fixup {i} copies {n} vertices from {src} of {total}"),
                ));
            }
        }

        log::debug!(
            "vvd: {total} vertices, {} lods, {} fixups",
            num_lods,
            fixups.len()
        );
        Ok(Self {
            header,
            vertices,
            tangents,
            fixups,
        })
    }

    pub fn checksum(&self) -> i32 {
        self.header.checksum
    }

    pub fn lod_count(&self) -> usize {
        self.header.num_lods as usize
    }

    fn fixup_ranges(&self, lod: usize) -> impl Iterator<Item = std::ops::Range<usize>> + '_ {
        self.fixups
            .iter()
            .filter(move |f| f.lod >= lod as i32)
            .map(|f| f.src as usize..(f.src + f.count) as usize)
    }

    /// The vertex stream a given LOD's meshes index into.
    pub fn vertices_for_lod(&self, lod: usize) -> Vec<StudioVertex> {
        if self.fixups.is_empty() {
            return self.vertices.clone();
        }
        self.fixup_ranges(lod)
            .flat_map(|range| self.vertices[range].iter().copied())
            .collect()
    }

    pub fn tangents_for_lod(&self, lod: usize) -> Vec<Vec4> {
        if self.fixups.is_empty() || self.tangents.is_empty() {
            return self.tangents.clone();
        }
        self.fixup_ranges(lod)
            .flat_map(|range| self.tangents[range].iter().copied())
            .collect()
    }
}
