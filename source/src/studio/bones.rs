use common::prelude::*;
use glam::{Mat4, Quat, Vec3};

use crate::kv3::{KV3Document, KV3Value};

#[derive(Clone, Debug, PartialEq)]
pub struct Bone {
    pub name: String,
    /// Index of the parent bone, -1 for roots.
    pub parent: i32,
    /// Position relative to the parent.
    pub position: Vec3,
    pub rotation: Quat,
}

impl Bone {
    pub fn local_transform(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    pub fn parent_index(&self) -> Option<usize> {
        usize::try_from(self.parent).ok()
    }
}

/// Bones ordered so that every parent precedes its children.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
}

impl Skeleton {
    pub fn new(bones: Vec<Bone>) -> Result<Self> {
        for (i, bone) in bones.iter().enumerate() {
            let parent = bone.parent;
            if parent < -1 || (parent >= 0 && parent as usize >= i) {
                return Err(Error::assertion(
                    i,
                    format!("bone {} ({i}) has parent {parent}", bone.name),
                ));
            }
        }
        Ok(Self { bones })
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name.eq_ignore_ascii_case(name))
    }

    /// Model-space transform of every bone.
    pub fn world_transforms(&self) -> Vec<Mat4> {
        let mut world: Vec<Mat4> = Vec::with_capacity(self.bones.len());
        for bone in &self.bones {
            let local = bone.local_transform();
            let transform = match bone.parent_index() {
                Some(parent) => world[parent] * local,
                None => local,
            };
            world.push(transform);
        }
        world
    }

    /// Reads a Source 2 `m_modelSkeleton` object: parallel arrays of names,
    /// parent indices, positions and rotations.
    pub fn from_kv3(doc: &KV3Document, skeleton: &KV3Value) -> Result<Self> {
        let field = |name: &str| {
            doc.get(skeleton, name)
                .and_then(KV3Value::as_array)
                .ok_or_else(|| Error::assertion(0, format!("skeleton has no {name} array")))
        };
        let names = field("m_boneName")?;
        let parents = field("m_nParent")?;
        let positions = field("m_bonePosParent")?;
        let rotations = field("m_boneRotParent")?;
        if [parents.len(), positions.len(), rotations.len()] != [names.len(); 3] {
            return Err(Error::assertion(
                0,
                format!(
                    "skeleton arrays disagree: {} names, {} parents, {} positions, {} rotations",
                    names.len(),
                    parents.len(),
                    positions.len(),
                    rotations.len()
                ),
            ));
        }

        let bones = (0..names.len())
            .map(|i| {
                let name = doc.str_value(&names[i]).unwrap_or_default().to_owned();
                let parent = parents[i].as_i64().unwrap_or(-1) as i32;
                let position = floats::<3>(&positions[i])
                    .map(Vec3::from_array)
                    .ok_or_else(|| Error::assertion(i, format!("bone {name} position")))?;
                let rotation = floats::<4>(&rotations[i])
                    .map(Quat::from_array)
                    .ok_or_else(|| Error::assertion(i, format!("bone {name} rotation")))?;
                Ok(Bone {
                    name,
                    parent,
                    position,
                    rotation,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(bones)
    }
}

/// A fixed length vector stored either as a double array or a list of numbers.
fn floats<const N: usize>(value: &KV3Value) -> Option<[f32; N]> {
    let mut out = [0f32; N];
    if let Some(doubles) = value.as_doubles() {
        if doubles.len() != N {
            return None;
        }
        for (o, d) in out.iter_mut().zip(doubles) {
            *o = *d as f32;
        }
        return Some(out);
    }
    let items = value.as_array()?;
    if items.len() != N {
        return None;
    }
    for (o, item) in out.iter_mut().zip(items) {
        *o = item.as_f64()? as f32;
    }
    Some(out)
}

#[cfg(test)]
mod bones_tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;
    use crate::kv3::{kv3_fixtures::Fixture, KV3TypedArray};

    fn bone(name: &str, parent: i32, position: Vec3, rotation: Quat) -> Bone {
        Bone {
            name: name.to_owned(),
            parent,
            position,
            rotation,
        }
    }

    #[test]
    fn parents_precede_children() {
        assert!(Skeleton::new(vec![bone("a", -1, Vec3::ZERO, Quat::IDENTITY)]).is_ok());
        assert!(Skeleton::new(vec![bone("a", 0, Vec3::ZERO, Quat::IDENTITY)]).is_err());
        assert!(Skeleton::new(vec![
            bone("a", -1, Vec3::ZERO, Quat::IDENTITY),
            bone("b", 2, Vec3::ZERO, Quat::IDENTITY),
            bone("c", 0, Vec3::ZERO, Quat::IDENTITY),
        ])
        .is_err());
        assert!(Skeleton::new(vec![bone("a", -2, Vec3::ZERO, Quat::IDENTITY)]).is_err());
    }

    #[test]
    fn world_space() {
        let skeleton = Skeleton::new(vec![
            bone("root", -1, Vec3::new(0.0, 0.0, 10.0), Quat::from_rotation_z(FRAC_PI_2)),
            bone("arm", 0, Vec3::new(5.0, 0.0, 0.0), Quat::IDENTITY),
            bone("hand", 1, Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY),
        ])
        .unwrap();
        let world = skeleton.world_transforms();
        let hand = world[2].transform_point3(Vec3::ZERO);
        assert!(hand.abs_diff_eq(Vec3::new(0.0, 6.0, 10.0), 1e-5));
        assert_eq!(skeleton.find("ARM"), Some(1));
    }

    #[test]
    fn source2_skeleton() {
        let mut f = Fixture::default();
        let names = KV3Value::Array(vec![f.string("root"), f.string("spine")]);
        let vec3 = |v: [f64; 3]| KV3Value::TypedArray(KV3TypedArray::Doubles(v.to_vec()));
        let quat = |v: [f64; 4]| KV3Value::TypedArray(KV3TypedArray::Doubles(v.to_vec()));
        let skeleton = f.object(vec![
            ("m_boneName", names),
            ("m_nParent", KV3Value::Array(vec![KV3Value::Int(-1), KV3Value::Int(0)])),
            (
                "m_bonePosParent",
                KV3Value::Array(vec![vec3([0.0, 0.0, 0.0]), vec3([0.0, 0.0, 4.0])]),
            ),
            (
                "m_boneRotParent",
                KV3Value::Array(vec![quat([0.0, 0.0, 0.0, 1.0]), quat([0.0, 0.0, 0.0, 1.0])]),
            ),
        ]);
        let root = f.object(vec![("m_modelSkeleton", skeleton)]);
        let doc = KV3Document::parse(f.encode(&root)).unwrap();

        let value = doc.get(doc.root(), "m_modelSkeleton").unwrap();
        let skeleton = Skeleton::from_kv3(&doc, value).unwrap();
        assert_eq!(skeleton.len(), 2);
        assert_eq!(skeleton.bones[1].name, "spine");
        assert_eq!(skeleton.bones[1].parent, 0);
        assert_eq!(skeleton.bones[1].position, Vec3::new(0.0, 0.0, 4.0));

        assert!(Skeleton::from_kv3(&doc, doc.root()).is_err());
    }
}
