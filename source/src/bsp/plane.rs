use glam::Vec3;

use super::{
    consts::{LumpType, MAX_MAP_PLANES},
    header::BSPEngine,
    Lump,
};

/// Splitting plane `normal · p = dist`. Both engines share this 20 byte layout.
///
/// `axis` is 0-2 for planes facing X, Y or Z, and 3-5 for non-axial planes
/// (the axis they are closest to).
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPPlane {
    pub normal: Vec3, // normal vector
    pub dist: f32,    // distance from origin
    pub axis: i32,    // plane axis identifier
}

impl BSPPlane {
    /// Signed distance of `point` in front of the plane.
    pub fn distance_to(&self, point: Vec3) -> f32 {
        let normal = self.normal;
        normal.dot(point) - self.dist
    }
}

impl Lump for BSPPlane {
    fn max() -> usize {
        MAX_MAP_PLANES
    }

    fn lump_id(_engine: BSPEngine) -> Option<usize> {
        Some(LumpType::Planes as usize)
    }
}
