//! GoldSrc studio models (`.mdl` version 10). Unlike Source models every
//! offset is from the start of the file.

use bytemuck::{Pod, Zeroable};
use common::prelude::*;
use flagset::{flags, FlagSet};
use glam::{EulerRot, Quat, Vec3};

use super::{
    bones::{Bone, Skeleton},
    StudioArray,
};
use crate::bsp::goldsrc::palette_to_rgba;

pub const GOLDSRC_MDL_VERSION: i32 = 10;
const PALETTE_SIZE: usize = 256 * 3;

flags! {
    pub enum StudioTextureFlags: u32 {
        FlatShade = 0x01,
        Chrome = 0x02,
        FullBright = 0x04,
        NoMips = 0x08,
        Alpha = 0x10,
        Additive = 0x20,
        Masked = 0x40,
    }
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct GoldSrcStudioHeader {
    pub id: [u8; 4],
    pub version: i32,
    pub name: [u8; 64],
    pub length: i32,
    pub eye_position: [f32; 3],
    pub min: [f32; 3],
    pub max: [f32; 3],
    pub bbox_min: [f32; 3],
    pub bbox_max: [f32; 3],
    pub flags: i32,
    pub bones: StudioArray,
    pub bone_controllers: StudioArray,
    pub hitboxes: StudioArray,
    pub sequences: StudioArray,
    pub sequence_groups: StudioArray,
    pub textures: StudioArray,
    pub texture_data_index: i32,
    pub num_skin_refs: i32,
    pub num_skin_families: i32,
    pub skin_index: i32,
    pub body_parts: StudioArray,
    pub attachments: StudioArray,
    pub sound_table: i32,
    pub sound_index: i32,
    pub sound_groups: i32,
    pub sound_group_index: i32,
    pub transitions: StudioArray,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct BoneRaw {
    name: [u8; 32],
    parent: i32,
    flags: i32,
    bone_controller: [i32; 6],
    /// Position then Euler angles.
    value: [f32; 6],
    scale: [f32; 6],
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct BodyPartRaw {
    name: [u8; 64],
    models: StudioArray,
    base: i32,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct ModelRaw {
    name: [u8; 64],
    kind: i32,
    bounding_radius: f32,
    meshes: StudioArray,
    num_vertices: i32,
    vertex_info_index: i32,
    vertex_index: i32,
    num_normals: i32,
    normal_info_index: i32,
    normal_index: i32,
    groups: StudioArray,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct MeshRaw {
    num_triangles: i32,
    triangle_index: i32,
    skin_ref: i32,
    num_normals: i32,
    normal_index: i32,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct TextureRaw {
    name: [u8; 64],
    flags: i32,
    width: i32,
    height: i32,
    index: i32,
}

/// One corner of a triangle command.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct TriangleVertex {
    pub vertex: i16,
    pub normal: i16,
    pub s: i16,
    pub t: i16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TriangleCommand {
    Strip(Vec<TriangleVertex>),
    Fan(Vec<TriangleVertex>),
}

impl TriangleCommand {
    pub fn triangles(&self) -> Vec<[TriangleVertex; 3]> {
        match self {
            TriangleCommand::Fan(v) => (1..v.len().saturating_sub(1))
                .map(|i| [v[0], v[i + 1], v[i]])
                .collect(),
            TriangleCommand::Strip(v) => (0..v.len().saturating_sub(2))
                .map(|i| [v[i], v[i + 2 - (i & 1)], v[i + 1 + (i & 1)]])
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GoldSrcMesh {
    pub skin_ref: i32,
    pub triangle_count: i32,
    pub commands: Vec<TriangleCommand>,
}

impl GoldSrcMesh {
    pub fn triangles(&self) -> Vec<[TriangleVertex; 3]> {
        self.commands.iter().flat_map(TriangleCommand::triangles).collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GoldSrcModel {
    pub name: String,
    pub vertices: Vec<Vec3>,
    /// Bone each vertex is attached to.
    pub vertex_bones: Vec<u8>,
    pub normals: Vec<Vec3>,
    pub normal_bones: Vec<u8>,
    pub meshes: Vec<GoldSrcMesh>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GoldSrcBodyPart {
    pub name: String,
    pub base: i32,
    pub models: Vec<GoldSrcModel>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StudioTexture {
    pub name: String,
    pub flags: FlagSet<StudioTextureFlags>,
    pub width: u32,
    pub height: u32,
    /// `None` when the pixels live in a companion `T.mdl`.
    pub rgba: Option<Vec<u8>>,
}

pub struct GoldSrcMDL {
    pub header: GoldSrcStudioHeader,
    pub name: String,
    pub skeleton: Skeleton,
    pub body_parts: Vec<GoldSrcBodyPart>,
    pub textures: Vec<StudioTexture>,
    pub skin_families: Vec<Vec<i16>>,
}

fn fixed_name(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn vec3s(reader: &mut ByteReader, offset: i32, count: i32) -> Result<Vec<Vec3>> {
    Ok(StudioArray { count, offset }
        .read::<[f32; 3]>(reader, 0)?
        .into_iter()
        .map(|(_, v)| Vec3::from_array(v))
        .collect())
}

fn bytes(reader: &mut ByteReader, offset: i32, count: i32) -> Result<Vec<u8>> {
    Ok(StudioArray { count, offset }
        .read::<u8>(reader, 0)?
        .into_iter()
        .map(|(_, b)| b)
        .collect())
}

fn read_commands(reader: &mut ByteReader, at: usize) -> Result<Vec<TriangleCommand>> {
    reader.with_position(at, |r| {
        let mut commands = Vec::new();
        loop {
            let count = r.read_i16()?;
            if count == 0 {
                break;
            }
            let vertices = r.read_pod_slice::<TriangleVertex>(count.unsigned_abs() as usize)?;
            commands.push(if count > 0 {
                TriangleCommand::Strip(vertices)
            } else {
                TriangleCommand::Fan(vertices)
            });
        }
        Ok(commands)
    })
}

impl GoldSrcMDL {
    pub fn read(reader: &mut ByteReader) -> Result<Self> {
        let header: GoldSrcStudioHeader = reader.read_pod()?;
        let (id, version) = (header.id, header.version);
        if &id != b"IDST" {
            return Err(Error::unsupported(format!(
                "goldsrc mdl id {:?}",
                String::from_utf8_lossy(&id)
            )));
        }
        if version != GOLDSRC_MDL_VERSION {
            return Err(Error::unsupported(format!("goldsrc mdl version {version}")));
        }
        let name = fixed_name(&{ header.name });

        let bones = header
            .bones
            .read::<BoneRaw>(reader, 0)?
            .into_iter()
            .map(|(_, raw)| {
                let v = raw.value;
                Bone {
                    name: fixed_name(&{ raw.name }),
                    parent: raw.parent,
                    position: Vec3::new(v[0], v[1], v[2]),
                    rotation: Quat::from_euler(EulerRot::ZYX, v[5], v[4], v[3]),
                }
            })
            .collect();
        let skeleton = Skeleton::new(bones)?;

        let body_parts = header
            .body_parts
            .read::<BodyPartRaw>(reader, 0)?
            .into_iter()
            .map(|(_, part)| {
                let models = part
                    .models
                    .read::<ModelRaw>(reader, 0)?
                    .into_iter()
                    .map(|(_, model)| Self::read_model(reader, &model))
                    .collect::<Result<Vec<_>>>()?;
                Ok(GoldSrcBodyPart {
                    name: fixed_name(&{ part.name }),
                    base: part.base,
                    models,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let textures = header
            .textures
            .read::<TextureRaw>(reader, 0)?
            .into_iter()
            .map(|(_, raw)| Self::read_texture(reader, &raw))
            .collect::<Result<Vec<_>>>()?;

        let (refs, families, skin_index) = (
            header.num_skin_refs,
            header.num_skin_families,
            header.skin_index,
        );
        let skin_families = if refs > 0 && families > 0 {
            reader.with_position(skin_index.max(0) as usize, |r| {
                (0..families)
                    .map(|_| r.read_pod_slice::<i16>(refs as usize))
                    .collect::<Result<Vec<_>>>()
            })?
        } else {
            Vec::new()
        };

        log::debug!(
            "goldsrc mdl {name}: {} bones, {} body parts, {} textures",
            skeleton.len(),
            body_parts.len(),
            textures.len()
        );
        Ok(Self {
            header,
            name,
            skeleton,
            body_parts,
            textures,
            skin_families,
        })
    }

    fn read_model(reader: &mut ByteReader, model: &ModelRaw) -> Result<GoldSrcModel> {
        let meshes = model
            .meshes
            .read::<MeshRaw>(reader, 0)?
            .into_iter()
            .map(|(_, mesh)| {
                let at = usize::try_from(mesh.triangle_index).map_err(|_| {
                    Error::assertion(0, format!("triangle commands at {}", { mesh.triangle_index }))
                })?;
                Ok(GoldSrcMesh {
                    skin_ref: mesh.skin_ref,
                    triangle_count: mesh.num_triangles,
                    commands: read_commands(reader, at)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(GoldSrcModel {
            name: fixed_name(&{ model.name }),
            vertices: vec3s(reader, model.vertex_index, model.num_vertices)?,
            vertex_bones: bytes(reader, model.vertex_info_index, model.num_vertices)?,
            normals: vec3s(reader, model.normal_index, model.num_normals)?,
            normal_bones: bytes(reader, model.normal_info_index, model.num_normals)?,
            meshes,
        })
    }

    fn read_texture(reader: &mut ByteReader, raw: &TextureRaw) -> Result<StudioTexture> {
        let (width, height, index) = (raw.width, raw.height, raw.index);
        let (Ok(width), Ok(height)) = (u32::try_from(width), u32::try_from(height)) else {
            return Err(Error::assertion(0, format!("texture size {width}x{height}")));
        };
        let flags = FlagSet::<StudioTextureFlags>::new_truncated(raw.flags as u32);
        let pixels = width as usize * height as usize;

        let rgba = match usize::try_from(index) {
            Ok(at) if at > 0 && at + pixels + PALETTE_SIZE <= reader.len() => {
                let data = reader.with_position(at, |r| r.read(pixels + PALETTE_SIZE))?;
                let (indices, palette) = data.split_at(pixels);
                Some(palette_to_rgba(
                    indices,
                    palette,
                    flags.contains(StudioTextureFlags::Masked),
                ))
            }
            _ => None,
        };

        Ok(StudioTexture {
            name: fixed_name(&{ raw.name }),
            flags,
            width,
            height,
            rgba,
        })
    }

    /// Texture index a mesh uses under `skin`.
    pub fn texture_for(&self, skin: usize, mesh: &GoldSrcMesh) -> Option<&StudioTexture> {
        let skin_ref = usize::try_from(mesh.skin_ref).ok()?;
        let index = match self.skin_families.get(skin).or_else(|| self.skin_families.first()) {
            Some(family) => usize::try_from(*family.get(skin_ref)?).ok()?,
            None => skin_ref,
        };
        self.textures.get(index)
    }
}

#[cfg(test)]
mod goldsrc_mdl_tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn fixed<const N: usize>(s: &str) -> [u8; N] {
        let mut out = [0u8; N];
        out[..s.len()].copy_from_slice(s.as_bytes());
        out
    }

    fn push<T: Pod>(data: &mut Vec<u8>, value: T) -> usize {
        let at = data.len();
        data.extend_from_slice(bytemuck::bytes_of(&value));
        at
    }

    fn corner(vertex: i16) -> TriangleVertex {
        TriangleVertex {
            vertex,
            normal: 0,
            s: vertex * 2,
            t: 0,
        }
    }

    fn build() -> Vec<u8> {
        let header_size = std::mem::size_of::<GoldSrcStudioHeader>();
        let mut data = vec![0u8; header_size];

        let mut bone = BoneRaw::zeroed();
        bone.name = fixed("Bip01");
        bone.parent = -1;
        bone.value = [1.0, 2.0, 3.0, 0.0, 0.0, std::f32::consts::FRAC_PI_2];
        let bones_at = push(&mut data, bone);

        let verts_at = data.len();
        for v in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]] {
            push(&mut data, v);
        }
        let vert_info_at = data.len();
        data.extend_from_slice(&[0, 0, 0, 0]);

        let commands_at = data.len();
        push(&mut data, 4i16);
        for i in 0..4 {
            push(&mut data, corner(i));
        }
        push(&mut data, -4i16);
        for i in [0, 1, 2, 3] {
            push(&mut data, corner(i));
        }
        push(&mut data, 0i16);

        let mesh_at = push(
            &mut data,
            MeshRaw {
                num_triangles: 4,
                triangle_index: commands_at as i32,
                skin_ref: 0,
                num_normals: 0,
                normal_index: 0,
            },
        );

        let mut model = ModelRaw::zeroed();
        model.name = fixed("body");
        model.meshes = StudioArray {
            count: 1,
            offset: mesh_at as i32,
        };
        model.num_vertices = 4;
        model.vertex_index = verts_at as i32;
        model.vertex_info_index = vert_info_at as i32;
        let model_at = push(&mut data, model);

        let part_at = push(
            &mut data,
            BodyPartRaw {
                name: fixed("studio"),
                models: StudioArray {
                    count: 1,
                    offset: model_at as i32,
                },
                base: 1,
            },
        );

        let pixels_at = data.len();
        data.extend_from_slice(&[0, 1, 255, 1]);
        let mut palette = vec![0u8; PALETTE_SIZE];
        palette[3..6].copy_from_slice(&[10, 20, 30]);
        palette[255 * 3..].copy_from_slice(&[0, 0, 255]);
        data.extend_from_slice(&palette);
        let texture_at = push(
            &mut data,
            TextureRaw {
                name: fixed("skin.bmp"),
                flags: FlagSet::from(StudioTextureFlags::Masked).bits() as i32,
                width: 2,
                height: 2,
                index: pixels_at as i32,
            },
        );
        push(
            &mut data,
            TextureRaw {
                name: fixed("external.bmp"),
                flags: 0,
                width: 64,
                height: 64,
                index: 0,
            },
        );
        let skins_at = push(&mut data, [1i16, 0i16]);

        let mut header = GoldSrcStudioHeader::zeroed();
        header.id = *b"IDST";
        header.version = GOLDSRC_MDL_VERSION;
        header.name = fixed("barney.mdl");
        header.bones = StudioArray {
            count: 1,
            offset: bones_at as i32,
        };
        header.body_parts = StudioArray {
            count: 1,
            offset: part_at as i32,
        };
        header.textures = StudioArray {
            count: 2,
            offset: texture_at as i32,
        };
        header.num_skin_refs = 1;
        header.num_skin_families = 2;
        header.skin_index = skins_at as i32;
        data[..header_size].copy_from_slice(bytemuck::bytes_of(&header));
        data
    }

    #[test]
    fn record_sizes() {
        assert_eq!(std::mem::size_of::<GoldSrcStudioHeader>(), 244);
        assert_eq!(std::mem::size_of::<BoneRaw>(), 112);
        assert_eq!(std::mem::size_of::<BodyPartRaw>(), 76);
        assert_eq!(std::mem::size_of::<ModelRaw>(), 112);
        assert_eq!(std::mem::size_of::<MeshRaw>(), 20);
        assert_eq!(std::mem::size_of::<TextureRaw>(), 80);
    }

    #[test]
    fn reads_skeleton_and_geometry() {
        let mdl = GoldSrcMDL::read(&mut ByteReader::from_vec(build())).unwrap();
        assert_eq!(mdl.name, "barney.mdl");

        let bone = &mdl.skeleton.bones[0];
        assert_eq!(bone.name, "Bip01");
        assert_eq!(bone.position, Vec3::new(1.0, 2.0, 3.0));
        // quarter turn about z
        assert!((bone.rotation * Vec3::X).abs_diff_eq(Vec3::Y, 1e-6));

        let model = &mdl.body_parts[0].models[0];
        assert_eq!(mdl.body_parts[0].name, "studio");
        assert_eq!(model.name, "body");
        assert_eq!(model.vertices.len(), 4);
        assert_eq!(model.vertex_bones, [0, 0, 0, 0]);
        assert!(model.normals.is_empty());

        let mesh = &model.meshes[0];
        assert_eq!(mesh.commands.len(), 2);
        assert!(matches!(mesh.commands[0], TriangleCommand::Strip(_)));
        assert!(matches!(mesh.commands[1], TriangleCommand::Fan(_)));
        let triangles: Vec<[i16; 3]> = mesh
            .triangles()
            .iter()
            .map(|t| t.map(|c| c.vertex))
            .collect();
        // strips alternate winding, fans pivot on the first corner
        assert_eq!(triangles, [[0, 2, 1], [1, 2, 3], [0, 2, 1], [0, 3, 2]]);
    }

    #[test]
    fn reads_textures_and_skins() {
        let mdl = GoldSrcMDL::read(&mut ByteReader::from_vec(build())).unwrap();
        let skin = &mdl.textures[0];
        assert_eq!(skin.name, "skin.bmp");
        assert_eq!((skin.width, skin.height), (2, 2));
        assert_eq!(
            skin.rgba.as_deref(),
            Some(&[0, 0, 0, 255, 10, 20, 30, 255, 0, 0, 0, 0, 10, 20, 30, 255][..])
        );
        assert_eq!(mdl.textures[1].rgba, None);

        let mesh = &mdl.body_parts[0].models[0].meshes[0];
        assert_eq!(mdl.skin_families, [vec![1], vec![0]]);
        assert_eq!(mdl.texture_for(0, mesh).unwrap().name, "external.bmp");
        assert_eq!(mdl.texture_for(1, mesh).unwrap().name, "skin.bmp");
    }

    #[test]
    fn rejects_other_versions() {
        let mut data = build();
        data[4..8].copy_from_slice(&44i32.to_le_bytes());
        assert!(matches!(
            GoldSrcMDL::read(&mut ByteReader::from_vec(data)),
            Err(Error::UnsupportedFormat(_))
        ));

        let mut data = build();
        let len = data.len();
        data.truncate(len - 100);
        assert!(GoldSrcMDL::read(&mut ByteReader::from_vec(data)).is_err());
    }
}
