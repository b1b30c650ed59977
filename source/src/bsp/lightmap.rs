use glam::{vec3, vec4, Vec3, Vec4};

use super::{
    consts::{LumpType, MAX_MAP_LIGHTING},
    header::BSPEngine,
    Lump,
};

/// One lightmap luxel: RGB scaled by `2^exponent`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ColorRGBExp32 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub exponent: i8,
}

impl From<ColorRGBExp32> for Vec3 {
    fn from(value: ColorRGBExp32) -> Self {
        let scale = 2f32.powi(value.exponent.into()) / 255.0;
        vec3(value.r as f32, value.g as f32, value.b as f32) * scale
    }
}

impl From<ColorRGBExp32> for Vec4 {
    fn from(value: ColorRGBExp32) -> Self {
        let v3: Vec3 = value.into();
        vec4(v3.x, v3.y, v3.z, 1.0)
    }
}

impl Lump for ColorRGBExp32 {
    fn max() -> usize {
        MAX_MAP_LIGHTING
    }
    fn lump_id(engine: BSPEngine) -> Option<usize> {
        (engine == BSPEngine::Source).then_some(LumpType::Lighting as usize)
    }
}
