//! Source 1 studio model headers (`.mdl`, versions 44 to 49).
//!
//! Geometry lives in the companion [`VVD`](super::VVD) and
//! [`VTX`](super::VTX) files; the MDL holds the skeleton, the body part tree
//! that points into them, materials and facial flex data.

use bytemuck::{Pod, Zeroable};
use common::prelude::*;
use glam::{Mat4, Quat, Vec3};

use super::{
    bones::{Bone, Skeleton},
    checked_offset,
    flex::{build_rule, FlexController, FlexExpr, FlexOp},
    read_name, StudioArray,
};

pub const MDL_ID: [u8; 4] = *b"IDST";
pub const MDL_VERSIONS: std::ops::RangeInclusive<i32> = 44..=49;
/// Size of one VVD vertex, the unit of [`MDLModel::vertex_index`].
pub const VERTEX_STRIDE: usize = 48;

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct StudioHeader {
    pub id: [u8; 4],
    pub version: i32,
    pub checksum: i32,
    pub name: [u8; 64],
    pub length: i32,
    pub eye_position: [f32; 3],
    pub illum_position: [f32; 3],
    pub hull_min: [f32; 3],
    pub hull_max: [f32; 3],
    pub view_bbox_min: [f32; 3],
    pub view_bbox_max: [f32; 3],
    pub flags: i32,
    pub bones: StudioArray,
    pub bone_controllers: StudioArray,
    pub hitbox_sets: StudioArray,
    pub local_animations: StudioArray,
    pub local_sequences: StudioArray,
    pub activity_list_version: i32,
    pub events_indexed: i32,
    pub textures: StudioArray,
    /// Absolute offsets of material search directories.
    pub texture_dirs: StudioArray,
    pub num_skin_refs: i32,
    pub num_skin_families: i32,
    pub skin_index: i32,
    pub body_parts: StudioArray,
    pub attachments: StudioArray,
    pub local_node_count: i32,
    pub local_node_index: i32,
    pub local_node_name_index: i32,
    pub flex_descs: StudioArray,
    pub flex_controllers: StudioArray,
    pub flex_rules: StudioArray,
    pub ik_chains: StudioArray,
    pub mouths: StudioArray,
    pub pose_parameters: StudioArray,
    pub surface_prop_index: i32,
    pub key_value_index: i32,
    pub key_value_size: i32,
    pub ik_locks: StudioArray,
    pub mass: f32,
    pub contents: i32,
    pub include_models: StudioArray,
    pub virtual_model: i32,
    pub anim_blocks_name_index: i32,
    pub anim_blocks_count: i32,
    pub anim_blocks_index: i32,
    pub anim_block_model: i32,
    pub bone_table_by_name_index: i32,
    pub vertex_base: i32,
    pub index_base: i32,
    pub directional_light_dot: u8,
    pub root_lod: u8,
    pub num_allowed_root_lods: u8,
    pub unused0: u8,
    pub unused1: i32,
    pub flex_controller_ui: StudioArray,
    pub vert_anim_fixed_point_scale: f32,
    pub unused2: i32,
    pub studio_hdr2_index: i32,
    pub unused3: i32,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct BoneRaw {
    pub name_index: i32,
    pub parent: i32,
    pub bone_controller: [i32; 6],
    pub position: [f32; 3],
    pub quat: [f32; 4],
    pub rotation: [f32; 3],
    pub position_scale: [f32; 3],
    pub rotation_scale: [f32; 3],
    pub pose_to_bone: [f32; 12],
    pub alignment: [f32; 4],
    pub flags: i32,
    pub proc_type: i32,
    pub proc_index: i32,
    pub physics_bone: i32,
    pub surface_prop_index: i32,
    pub contents: i32,
    pub unused: [i32; 8],
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct BoneControllerRaw {
    bone: i32,
    kind: i32,
    start: f32,
    end: f32,
    rest: i32,
    input_field: i32,
    unused: [i32; 8],
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct BodyPartRaw {
    name_index: i32,
    num_models: i32,
    base: i32,
    model_index: i32,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct ModelRaw {
    name: [u8; 64],
    kind: i32,
    bounding_radius: f32,
    meshes: StudioArray,
    num_vertices: i32,
    vertex_index: i32,
    tangents_index: i32,
    attachments: StudioArray,
    eyeballs: StudioArray,
    vertex_data: [i32; 2],
    unused: [i32; 8],
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct MeshRaw {
    material: i32,
    model_index: i32,
    num_vertices: i32,
    vertex_offset: i32,
    flexes: StudioArray,
    material_type: i32,
    material_param: i32,
    mesh_id: i32,
    center: [f32; 3],
    vertex_data: i32,
    num_lod_vertexes: [i32; 8],
    unused: [i32; 8],
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct AttachmentRaw {
    name_index: i32,
    flags: i32,
    local_bone: i32,
    local: [f32; 12],
    unused: [i32; 8],
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct TextureRaw {
    name_index: i32,
    flags: i32,
    used: i32,
    unused0: i32,
    material: i32,
    client_material: i32,
    unused: [i32; 10],
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct FlexControllerRaw {
    type_index: i32,
    name_index: i32,
    local_to_global: i32,
    min: f32,
    max: f32,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct FlexRuleRaw {
    flex: i32,
    ops: StudioArray,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoneController {
    pub bone: i32,
    pub kind: i32,
    pub start: f32,
    pub end: f32,
    pub rest: i32,
    pub input_field: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MDLMesh {
    /// Index into the active skin family.
    pub material: i32,
    pub num_vertices: i32,
    /// First vertex, relative to the owning model.
    pub vertex_offset: i32,
    pub material_type: i32,
    pub mesh_id: i32,
    pub center: Vec3,
    pub lod_vertices: [i32; 8],
}

#[derive(Clone, Debug, PartialEq)]
pub struct MDLModel {
    pub name: String,
    pub kind: i32,
    pub bounding_radius: f32,
    pub num_vertices: i32,
    /// Byte offset into the VVD vertex stream.
    pub vertex_index: i32,
    pub meshes: Vec<MDLMesh>,
    pub eyeball_count: i32,
}

impl MDLModel {
    pub fn first_vertex(&self) -> usize {
        self.vertex_index.max(0) as usize / VERTEX_STRIDE
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MDLBodyPart {
    pub name: String,
    pub base: i32,
    pub models: Vec<MDLModel>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MDLAttachment {
    pub name: String,
    pub flags: i32,
    pub bone: i32,
    /// Bone-local transform.
    pub transform: Mat4,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MDLTexture {
    pub name: String,
    pub flags: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MDLFlexRule {
    /// Index into [`MDL::flex_names`].
    pub flex: usize,
    pub expr: FlexExpr,
}

pub struct MDL {
    pub header: StudioHeader,
    pub name: String,
    pub skeleton: Skeleton,
    pub bone_flags: Vec<i32>,
    pub bone_controllers: Vec<BoneController>,
    pub body_parts: Vec<MDLBodyPart>,
    pub attachments: Vec<MDLAttachment>,
    pub textures: Vec<MDLTexture>,
    pub texture_dirs: Vec<String>,
    /// `skin_families[skin][material]` is an index into `textures`.
    pub skin_families: Vec<Vec<i16>>,
    pub flex_names: Vec<String>,
    pub flex_controllers: Vec<FlexController>,
    pub flex_rules: Vec<MDLFlexRule>,
    pub surface_prop: String,
    pub key_values: String,
}

/// Row-major 3x4 matrix to a column-major affine transform.
fn matrix3x4(m: [f32; 12]) -> Mat4 {
    Mat4::from_cols_array(&[
        m[0], m[4], m[8], 0.0, //
        m[1], m[5], m[9], 0.0, //
        m[2], m[6], m[10], 0.0, //
        m[3], m[7], m[11], 1.0,
    ])
}

fn fixed_name(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

impl MDL {
    pub fn read(reader: &mut ByteReader) -> Result<Self> {
        let header: StudioHeader = reader.read_pod()?;
        let id = header.id;
        if id != MDL_ID {
            return Err(Error::unsupported(format!(
                "mdl id {:?}",
                String::from_utf8_lossy(&id)
            )));
        }
        let version = header.version;
        if !MDL_VERSIONS.contains(&version) {
            return Err(Error::unsupported(format!("mdl version {version}")));
        }
        let name = fixed_name(&{ header.name });

        let (skeleton, bone_flags) = Self::read_bones(reader, &header)?;

        let bone_controllers = header
            .bone_controllers
            .read::<BoneControllerRaw>(reader, 0)?
            .into_iter()
            .map(|(_, c)| BoneController {
                bone: c.bone,
                kind: c.kind,
                start: c.start,
                end: c.end,
                rest: c.rest,
                input_field: c.input_field,
            })
            .collect();

        let body_parts = header
            .body_parts
            .read::<BodyPartRaw>(reader, 0)?
            .into_iter()
            .map(|(at, part)| {
                let models = StudioArray {
                    count: part.num_models,
                    offset: part.model_index,
                }
                .read::<ModelRaw>(reader, at)?
                .into_iter()
                .map(|(at, model)| Self::read_model(reader, at, &model))
                .collect::<Result<Vec<_>>>()?;
                Ok(MDLBodyPart {
                    name: read_name(reader, at, part.name_index)?,
                    base: part.base,
                    models,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let attachments = header
            .attachments
            .read::<AttachmentRaw>(reader, 0)?
            .into_iter()
            .map(|(at, a)| {
                Ok(MDLAttachment {
                    name: read_name(reader, at, a.name_index)?,
                    flags: a.flags,
                    bone: a.local_bone,
                    transform: matrix3x4(a.local),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let textures = header
            .textures
            .read::<TextureRaw>(reader, 0)?
            .into_iter()
            .map(|(at, t)| {
                Ok(MDLTexture {
                    name: read_name(reader, at, t.name_index)?,
                    flags: t.flags,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let texture_dirs = header
            .texture_dirs
            .read::<i32>(reader, 0)?
            .into_iter()
            .map(|(_, offset)| read_name(reader, 0, offset))
            .collect::<Result<Vec<_>>>()?;

        let skin_families = Self::read_skins(reader, &header)?;
        let (flex_names, flex_controllers, flex_rules) = Self::read_flexes(reader, &header)?;

        let surface_prop = read_name(reader, 0, header.surface_prop_index)?;
        let key_values = match (header.key_value_index, header.key_value_size) {
            (index, size) if index > 0 && size > 0 => reader
                .with_position(index as usize, |r| r.read_fixed_string(size as usize))?,
            _ => String::new(),
        };

        log::debug!(
            "mdl v{version} {name}: {} bones, {} body parts, {} textures, {} flex rules",
            skeleton.len(),
            body_parts.len(),
            textures.len(),
            flex_rules.len()
        );

        Ok(Self {
            header,
            name,
            skeleton,
            bone_flags,
            bone_controllers,
            body_parts,
            attachments,
            textures,
            texture_dirs,
            skin_families,
            flex_names,
            flex_controllers,
            flex_rules,
            surface_prop,
            key_values,
        })
    }

    fn read_bones(reader: &mut ByteReader, header: &StudioHeader) -> Result<(Skeleton, Vec<i32>)> {
        let mut flags = Vec::new();
        let bones = header
            .bones
            .read::<BoneRaw>(reader, 0)?
            .into_iter()
            .map(|(at, raw)| {
                flags.push(raw.flags);
                Ok(Bone {
                    name: read_name(reader, at, raw.name_index)?,
                    parent: raw.parent,
                    position: Vec3::from_array(raw.position),
                    rotation: Quat::from_array(raw.quat),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((Skeleton::new(bones)?, flags))
    }

    fn read_model(reader: &mut ByteReader, at: usize, model: &ModelRaw) -> Result<MDLModel> {
        let meshes = model
            .meshes
            .read::<MeshRaw>(reader, at)?
            .into_iter()
            .map(|(_, mesh)| MDLMesh {
                material: mesh.material,
                num_vertices: mesh.num_vertices,
                vertex_offset: mesh.vertex_offset,
                material_type: mesh.material_type,
                mesh_id: mesh.mesh_id,
                center: Vec3::from_array(mesh.center),
                lod_vertices: mesh.num_lod_vertexes,
            })
            .collect();
        Ok(MDLModel {
            name: fixed_name(&{ model.name }),
            kind: model.kind,
            bounding_radius: model.bounding_radius,
            num_vertices: model.num_vertices,
            vertex_index: model.vertex_index,
            meshes,
            eyeball_count: model.eyeballs.count,
        })
    }

    fn read_skins(reader: &mut ByteReader, header: &StudioHeader) -> Result<Vec<Vec<i16>>> {
        let (refs, families, index) = (
            header.num_skin_refs,
            header.num_skin_families,
            header.skin_index,
        );
        if refs <= 0 || families <= 0 {
            return Ok(Vec::new());
        }
        let start = checked_offset(0, index)?;
        reader.with_position(start, |r| {
            (0..families)
                .map(|_| r.read_pod_slice::<i16>(refs as usize))
                .collect()
        })
    }

    #[allow(clippy::type_complexity)]
    fn read_flexes(
        reader: &mut ByteReader,
        header: &StudioHeader,
    ) -> Result<(Vec<String>, Vec<FlexController>, Vec<MDLFlexRule>)> {
        let flex_names = header
            .flex_descs
            .read::<i32>(reader, 0)?
            .into_iter()
            .map(|(at, facs)| read_name(reader, at, facs))
            .collect::<Result<Vec<_>>>()?;

        let controllers = header
            .flex_controllers
            .read::<FlexControllerRaw>(reader, 0)?
            .into_iter()
            .map(|(at, c)| {
                Ok(FlexController {
                    kind: read_name(reader, at, c.type_index)?,
                    name: read_name(reader, at, c.name_index)?,
                    local_to_global: c.local_to_global,
                    min: c.min,
                    max: c.max,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let rules = header
            .flex_rules
            .read::<FlexRuleRaw>(reader, 0)?
            .into_iter()
            .map(|(at, rule)| {
                let flex = usize::try_from(rule.flex)
                    .ok()
                    .filter(|&f| f < flex_names.len())
                    .ok_or_else(|| Error::assertion(at, format!("flex rule targets flex {}", { rule.flex })))?;
                let ops: Vec<FlexOp> = rule
                    .ops
                    .read::<FlexOp>(reader, at)?
                    .into_iter()
                    .map(|(_, op)| op)
                    .collect();
                let expr = build_rule(&ops, &controllers, &flex_names)?;
                Ok(MDLFlexRule { flex, expr })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((flex_names, controllers, rules))
    }

    pub fn version(&self) -> i32 {
        self.header.version
    }

    pub fn checksum(&self) -> i32 {
        self.header.checksum
    }

    /// Material name a mesh uses under `skin`, falling back to the default
    /// skin when the family does not exist.
    pub fn material_for(&self, skin: usize, mesh: &MDLMesh) -> Option<&str> {
        let family = self.skin_families.get(skin).or_else(|| self.skin_families.first());
        let texture = match family {
            Some(family) => *family.get(usize::try_from(mesh.material).ok()?)? as i32,
            None => mesh.material,
        };
        self.textures
            .get(usize::try_from(texture).ok()?)
            .map(|t| t.name.as_str())
    }

    pub fn flex_rule_name(&self, rule: &MDLFlexRule) -> &str {
        &self.flex_names[rule.flex]
    }
}

#[cfg(test)]
mod mdl_tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::studio::flex::{flex_tests, FlexOpCode};

    /// Appends records and strings; offsets are patched by the caller.
    #[derive(Default)]
    struct Blob {
        data: Vec<u8>,
    }

    impl Blob {
        fn push<T: Pod>(&mut self, value: T) -> usize {
            let at = self.data.len();
            self.data.extend_from_slice(bytemuck::bytes_of(&value));
            at
        }

        fn string(&mut self, s: &str) -> usize {
            let at = self.data.len();
            self.data.extend_from_slice(s.as_bytes());
            self.data.push(0);
            at
        }
    }

    fn rel(to: usize, from: usize) -> i32 {
        to as i32 - from as i32
    }

    fn array(count: usize, at: usize) -> StudioArray {
        StudioArray {
            count: count as i32,
            offset: at as i32,
        }
    }

    fn fixed<const N: usize>(s: &str) -> [u8; N] {
        let mut out = [0u8; N];
        out[..s.len()].copy_from_slice(s.as_bytes());
        out
    }

    fn build_mdl() -> Vec<u8> {
        let size = std::mem::size_of::<StudioHeader>();
        let mut b = Blob {
            data: vec![0; size],
        };
        let s_root = b.string("root");
        let s_head = b.string("head");
        let s_body = b.string("studio");
        let s_eyes = b.string("eyes");
        let s_skin = b.string("skin");
        let s_dir = b.string("models\\props\\");
        let s_flex = b.string("blink");
        let s_kind = b.string("eyes");
        let s_ctrl = b.string("close_lid");
        let s_prop = b.string("flesh");
        let s_kv = b.string("mdlkeyvalue{}");

        let mut bone = BoneRaw::zeroed();
        bone.parent = -1;
        bone.quat = [0.0, 0.0, 0.0, 1.0];
        let bones_at = b.data.len();
        bone.name_index = rel(s_root, bones_at);
        b.push(bone);
        bone.parent = 0;
        bone.position = [0.0, 0.0, 60.0];
        bone.flags = 0x100;
        bone.name_index = rel(s_head, bones_at + 216);
        b.push(bone);

        let mut controller = BoneControllerRaw::zeroed();
        controller.bone = 1;
        controller.end = 90.0;
        let controllers_at = b.push(controller);

        let part_at = b.data.len();
        let models_at = part_at + 16;
        b.push(BodyPartRaw {
            name_index: rel(s_body, part_at),
            num_models: 1,
            base: 1,
            model_index: rel(models_at, part_at),
        });
        let mut model = ModelRaw::zeroed();
        model.name = fixed("body.smd");
        model.num_vertices = 3;
        model.vertex_index = 96;
        model.meshes = array(1, 148);
        b.push(model);
        let mut mesh = MeshRaw::zeroed();
        mesh.material = 0;
        mesh.num_vertices = 3;
        mesh.center = [1.0, 2.0, 3.0];
        b.push(mesh);

        let mut attachment = AttachmentRaw::zeroed();
        let attachment_at = b.data.len();
        attachment.name_index = rel(s_eyes, attachment_at);
        attachment.local_bone = 1;
        attachment.local = [1.0, 0.0, 0.0, 5.0, 0.0, 1.0, 0.0, 6.0, 0.0, 0.0, 1.0, 7.0];
        b.push(attachment);

        let mut texture = TextureRaw::zeroed();
        let texture_at = b.data.len();
        texture.name_index = rel(s_skin, texture_at);
        b.push(texture);
        let dirs_at = b.push(s_dir as i32);
        let skins_at = b.push(0i16);
        b.push(0i16);

        let desc_at = b.data.len();
        b.push(rel(s_flex, desc_at));
        let ctrl_at = b.data.len();
        b.push(FlexControllerRaw {
            type_index: rel(s_kind, ctrl_at),
            name_index: rel(s_ctrl, ctrl_at),
            local_to_global: 0,
            min: 0.0,
            max: 1.0,
        });
        let rule_at = b.data.len();
        b.push(FlexRuleRaw {
            flex: 0,
            ops: array(3, 12),
        });
        b.push(flex_tests::op(FlexOpCode::Fetch1, 0));
        b.push(flex_tests::constant(2.0));
        b.push(flex_tests::op(FlexOpCode::Mul, 0));

        let mut header = StudioHeader::zeroed();
        header.id = MDL_ID;
        header.version = 48;
        header.checksum = 0x1234;
        header.name = fixed("props/test.mdl");
        header.length = b.data.len() as i32;
        header.bones = array(2, bones_at);
        header.bone_controllers = array(1, controllers_at);
        header.body_parts = array(1, part_at);
        header.attachments = array(1, attachment_at);
        header.textures = array(1, texture_at);
        header.texture_dirs = array(1, dirs_at);
        header.num_skin_refs = 1;
        header.num_skin_families = 2;
        header.skin_index = skins_at as i32;
        header.flex_descs = array(1, desc_at);
        header.flex_controllers = array(1, ctrl_at);
        header.flex_rules = array(1, rule_at);
        header.surface_prop_index = s_prop as i32;
        header.key_value_index = s_kv as i32;
        header.key_value_size = 13;
        b.data[..size].copy_from_slice(bytemuck::bytes_of(&header));
        b.data
    }

    #[test]
    fn record_sizes() {
        assert_eq!(std::mem::size_of::<StudioHeader>(), 408);
        assert_eq!(std::mem::size_of::<BoneRaw>(), 216);
        assert_eq!(std::mem::size_of::<BoneControllerRaw>(), 56);
        assert_eq!(std::mem::size_of::<ModelRaw>(), 148);
        assert_eq!(std::mem::size_of::<MeshRaw>(), 116);
        assert_eq!(std::mem::size_of::<AttachmentRaw>(), 92);
        assert_eq!(std::mem::size_of::<TextureRaw>(), 64);
        assert_eq!(std::mem::size_of::<FlexControllerRaw>(), 20);
    }

    #[test]
    fn reads_model() {
        let mdl = MDL::read(&mut ByteReader::from_vec(build_mdl())).unwrap();
        assert_eq!(mdl.version(), 48);
        assert_eq!(mdl.checksum(), 0x1234);
        assert_eq!(mdl.name, "props/test.mdl");

        assert_eq!(mdl.skeleton.len(), 2);
        assert_eq!(mdl.skeleton.bones[1].name, "head");
        assert_eq!(mdl.skeleton.bones[1].parent, 0);
        assert_eq!(mdl.bone_flags, [0, 0x100]);
        let head = mdl.skeleton.world_transforms()[1].transform_point3(Vec3::ZERO);
        assert_eq!(head, Vec3::new(0.0, 0.0, 60.0));
        assert_eq!(mdl.bone_controllers[0].end, 90.0);

        let part = &mdl.body_parts[0];
        assert_eq!(part.name, "studio");
        assert_eq!(part.models[0].name, "body.smd");
        assert_eq!(part.models[0].first_vertex(), 2);
        let mesh = &part.models[0].meshes[0];
        assert_eq!(mesh.center, Vec3::new(1.0, 2.0, 3.0));

        assert_eq!(mdl.attachments[0].name, "eyes");
        assert_eq!(
            mdl.attachments[0].transform.transform_point3(Vec3::ZERO),
            Vec3::new(5.0, 6.0, 7.0)
        );

        assert_eq!(mdl.texture_dirs, ["models\\props\\"]);
        assert_eq!(mdl.skin_families, [vec![0], vec![0]]);
        assert_eq!(mdl.material_for(1, mesh), Some("skin"));
        assert_eq!(mdl.material_for(7, mesh), Some("skin"));

        assert_eq!(mdl.surface_prop, "flesh");
        assert_eq!(mdl.key_values, "mdlkeyvalue{}");
    }

    #[test]
    fn reads_flex_rules() {
        let mdl = MDL::read(&mut ByteReader::from_vec(build_mdl())).unwrap();
        assert_eq!(mdl.flex_names, ["blink"]);
        assert_eq!(mdl.flex_controllers[0].kind, "eyes");
        assert_eq!(mdl.flex_controllers[0].name, "close_lid");
        let rule = &mdl.flex_rules[0];
        assert_eq!(mdl.flex_rule_name(rule), "blink");
        assert_eq!(rule.expr.to_string(), "close_lid*2.0");
    }

    #[test]
    fn rejects_unknown_versions() {
        let mut data = build_mdl();
        data[4..8].copy_from_slice(&37i32.to_le_bytes());
        assert!(matches!(
            MDL::read(&mut ByteReader::from_vec(data)),
            Err(Error::UnsupportedFormat(_))
        ));

        let mut data = build_mdl();
        data[0..4].copy_from_slice(b"IDSQ");
        assert!(MDL::read(&mut ByteReader::from_vec(data)).is_err());

        // first bone claims the second as its parent
        let mut data = build_mdl();
        let bones_at = 408 + "root head studio eyes skin models\\props\\ blink eyes close_lid flesh mdlkeyvalue{} ".len();
        data[bones_at + 4..bones_at + 8].copy_from_slice(&1i32.to_le_bytes());
        assert!(MDL::read(&mut ByteReader::from_vec(data)).is_err());
    }
}
