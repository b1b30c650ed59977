use glam::Vec3;

use super::{
    consts::{LumpType, MAX_MAP_MODELS},
    header::BSPEngine,
    Lump,
};

/// A brush model. Model 0 is the world; the rest belong to brush entities
/// that reference them as `*N`.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPModel {
    mins: Vec3,
    maxs: Vec3,
    origin: Vec3,
    headnode: i32,
    firstface: i32,
    numfaces: i32,
}

impl BSPModel {
    pub fn maxs(&self) -> Vec3 {
        self.maxs
    }

    pub fn mins(&self) -> Vec3 {
        self.mins
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Range of face indices this model owns.
    pub fn faces(&self) -> std::ops::Range<usize> {
        let first = self.firstface.max(0) as usize;
        first..first + self.numfaces.max(0) as usize
    }
}

impl Lump for BSPModel {
    fn max() -> usize {
        MAX_MAP_MODELS
    }

    fn lump_id(engine: BSPEngine) -> Option<usize> {
        (engine == BSPEngine::Source).then_some(LumpType::Models as usize)
    }
}
