//! Optimised strip data (`.dx90.vtx`). Every level is a `(count, offset)`
//! array whose offset is relative to the record holding it.

use bytemuck::{Pod, Zeroable};
use common::prelude::*;
use flagset::{flags, FlagSet};

use super::{read_name, StudioArray};

flags! {
    pub enum StripGroupFlags: u8 {
        Flexed = 0x01,
        HardwareSkinned = 0x02,
        DeltaFlexed = 0x04,
        SuppressHardwareMorph = 0x08,
    }

    pub enum StripFlags: u8 {
        TriList = 0x01,
        TriStrip = 0x02,
        QuadListRegular = 0x04,
        QuadListExtra = 0x08,
    }
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct VTXHeader {
    pub version: i32,
    pub vert_cache_size: i32,
    pub max_bones_per_strip: u16,
    pub max_bones_per_tri: u16,
    pub max_bones_per_vert: i32,
    /// Matches the checksum in the MDL header.
    pub checksum: i32,
    pub num_lods: i32,
    pub material_replacement_list_offset: i32,
    pub body_parts: StudioArray,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
struct ModelLodRaw {
    meshes: StudioArray,
    switch_point: f32,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
struct MeshRaw {
    strip_groups: StudioArray,
    flags: u8,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
struct StripGroupRaw {
    vertices: StudioArray,
    indices: StudioArray,
    strips: StudioArray,
    flags: u8,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
struct StripRaw {
    num_indices: i32,
    index_offset: i32,
    num_vertices: i32,
    vertex_offset: i32,
    num_bones: i16,
    flags: u8,
    bone_state_changes: StudioArray,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
struct MaterialReplacementRaw {
    material_id: i16,
    name_offset: i32,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct VTXVertex {
    pub bone_weight_index: [u8; 3],
    pub num_bones: u8,
    /// Index into the MDL mesh's vertex range.
    pub original_mesh_vertex: u16,
    pub bone_ids: [i8; 3],
}

#[derive(Clone, Debug, PartialEq)]
pub struct VTXStrip {
    pub flags: FlagSet<StripFlags>,
    /// Range of the group's index array this strip draws.
    pub index_offset: usize,
    pub num_indices: usize,
    pub vertex_offset: usize,
    pub num_vertices: usize,
    pub num_bones: i16,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VTXStripGroup {
    pub flags: FlagSet<StripGroupFlags>,
    pub vertices: Vec<VTXVertex>,
    pub indices: Vec<u16>,
    pub strips: Vec<VTXStrip>,
    pub topology: Vec<u16>,
}

impl VTXStripGroup {
    /// Triangles as MDL mesh vertex ids, with strips unrolled to lists.
    pub fn triangles(&self) -> Result<Vec<[u16; 3]>> {
        let vertex = |index: u16| {
            self.vertices
                .get(index as usize)
                .map(|v| v.original_mesh_vertex)
                .ok_or_else(|| {
                    Error::assertion(
                        index as usize,
                        format!("strip index {index} past {} vertices", self.vertices.len()),
                    )
                })
        };

        let mut triangles = Vec::new();
        for strip in &self.strips {
            let indices = strip
                .index_offset
                .checked_add(strip.num_indices)
                .and_then(|end| self.indices.get(strip.index_offset..end))
                .ok_or_else(|| {
                    Error::assertion(
                        strip.index_offset,
                        format!("strip reads {} indices of {}", strip.num_indices, self.indices.len()),
                    )
                })?;

            if strip.flags.contains(StripFlags::TriStrip) {
                for (i, w) in indices.windows(3).enumerate() {
                    let (a, b, c) = if i % 2 == 0 { (w[0], w[1], w[2]) } else { (w[1], w[0], w[2]) };
                    if a == b || b == c || a == c {
                        continue;
                    }
                    triangles.push([vertex(a)?, vertex(b)?, vertex(c)?]);
                }
            } else {
                for t in indices.chunks_exact(3) {
                    triangles.push([vertex(t[0])?, vertex(t[1])?, vertex(t[2])?]);
                }
            }
        }
        Ok(triangles)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VTXMesh {
    pub flags: u8,
    pub strip_groups: Vec<VTXStripGroup>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VTXModelLod {
    pub switch_point: f32,
    pub meshes: Vec<VTXMesh>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VTXModel {
    pub lods: Vec<VTXModelLod>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VTXBodyPart {
    pub models: Vec<VTXModel>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaterialReplacement {
    pub material_id: i16,
    pub name: String,
}

pub struct VTX {
    pub header: VTXHeader,
    pub body_parts: Vec<VTXBodyPart>,
    /// One list per LOD.
    pub material_replacements: Vec<Vec<MaterialReplacement>>,
}

impl VTX {
    /// `mdl_version` selects the strip layout: version 7 files written for
    /// MDL 49 and later carry topology arrays on groups and strips.
    pub fn read(reader: &mut ByteReader, mdl_version: i32) -> Result<Self> {
        let header: VTXHeader = reader.read_pod()?;
        let version = header.version;
        if !(6..=7).contains(&version) {
            return Err(Error::unsupported(format!("vtx version {version}")));
        }
        let extended = version == 7 && mdl_version >= 49;

        let body_parts = header
            .body_parts
            .read::<StudioArray>(reader, 0)?
            .into_iter()
            .map(|(at, models)| {
                let models = models
                    .read::<StudioArray>(reader, at)?
                    .into_iter()
                    .map(|(at, lods)| {
                        let lods = lods
                            .read::<ModelLodRaw>(reader, at)?
                            .into_iter()
                            .map(|(at, lod)| read_lod(reader, at, lod, extended))
                            .collect::<Result<Vec<_>>>()?;
                        Ok(VTXModel { lods })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(VTXBodyPart { models })
            })
            .collect::<Result<Vec<_>>>()?;

        let material_replacements = read_replacements(reader, &header)?;
        log::debug!(
            "vtx v{version}: {} body parts, {} lods{}",
            body_parts.len(),
            { header.num_lods },
            if extended { ", extended strips" } else { "" }
        );
        Ok(Self {
            header,
            body_parts,
            material_replacements,
        })
    }

    pub fn checksum(&self) -> i32 {
        self.header.checksum
    }
}

fn read_lod(reader: &mut ByteReader, at: usize, lod: ModelLodRaw, extended: bool) -> Result<VTXModelLod> {
    let meshes = lod
        .meshes
        .read::<MeshRaw>(reader, at)?
        .into_iter()
        .map(|(at, mesh)| {
            let strip_groups = read_records(reader, at, mesh.strip_groups, if extended { 33 } else { 25 })?
                .into_iter()
                .map(|at| read_strip_group(reader, at, extended))
                .collect::<Result<Vec<_>>>()?;
            Ok(VTXMesh {
                flags: mesh.flags,
                strip_groups,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(VTXModelLod {
        switch_point: lod.switch_point,
        meshes,
    })
}

/// Record positions for arrays whose stride depends on the file layout.
fn read_records(reader: &ByteReader, base: usize, array: StudioArray, stride: usize) -> Result<Vec<usize>> {
    let (count, offset) = (array.count, array.offset);
    if count <= 0 {
        return Ok(Vec::new());
    }
    let start = super::checked_offset(base, offset)?;
    let end = (count as usize)
        .checked_mul(stride)
        .and_then(|n| n.checked_add(start))
        .filter(|&end| end <= reader.len())
        .ok_or(Error::OutOfBounds {
            offset: start,
            requested: count as usize * stride,
            len: reader.len(),
        })?;
    Ok((start..end).step_by(stride).collect())
}

fn read_strip_group(reader: &mut ByteReader, at: usize, extended: bool) -> Result<VTXStripGroup> {
    let (raw, topology_array) = reader.with_position(at, |r| {
        let raw: StripGroupRaw = r.read_pod()?;
        let topology: StudioArray = if extended { r.read_pod()? } else { StudioArray::default() };
        Ok((raw, topology))
    })?;

    let vertices = raw.vertices.read::<VTXVertex>(reader, at)?;
    let indices = raw.indices.read::<u16>(reader, at)?;
    let topology = topology_array.read::<u16>(reader, at)?;

    let strips = read_records(reader, at, raw.strips, if extended { 35 } else { 27 })?
        .into_iter()
        .map(|at| {
            let strip: StripRaw = reader.with_position(at, |r| r.read_pod())?;
            let non_negative = |v: i32| {
                usize::try_from(v).map_err(|_| Error::assertion(at, format!("negative strip field {v}")))
            };
            Ok(VTXStrip {
                flags: FlagSet::new_truncated(strip.flags),
                index_offset: non_negative(strip.index_offset)?,
                num_indices: non_negative(strip.num_indices)?,
                vertex_offset: non_negative(strip.vertex_offset)?,
                num_vertices: non_negative(strip.num_vertices)?,
                num_bones: strip.num_bones,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(VTXStripGroup {
        flags: FlagSet::new_truncated(raw.flags),
        vertices: vertices.into_iter().map(|(_, v)| v).collect(),
        indices: indices.into_iter().map(|(_, i)| i).collect(),
        strips,
        topology: topology.into_iter().map(|(_, i)| i).collect(),
    })
}

fn read_replacements(reader: &mut ByteReader, header: &VTXHeader) -> Result<Vec<Vec<MaterialReplacement>>> {
    let (offset, num_lods) = (header.material_replacement_list_offset, header.num_lods);
    if offset <= 0 || num_lods <= 0 {
        return Ok(Vec::new());
    }
    StudioArray {
        count: num_lods,
        offset,
    }
    .read::<StudioArray>(reader, 0)?
    .into_iter()
    .map(|(at, list)| {
        list.read::<MaterialReplacementRaw>(reader, at)?
            .into_iter()
            .map(|(at, raw)| {
                Ok(MaterialReplacement {
                    material_id: raw.material_id,
                    name: read_name(reader, at, raw.name_offset)?,
                })
            })
            .collect::<Result<Vec<_>>>()
    })
    .collect()
}
