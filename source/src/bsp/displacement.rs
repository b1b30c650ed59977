use glam::{Vec2, Vec3};

use common::prelude::*;

use super::{
    consts::{
        num_disp_power_verts, LumpType, MAX_DISP_CORNER_NEIGHBORS, MAX_MAP_DISPINFO,
        MAX_MAP_DISP_POWER, MAX_MAP_DISP_VERTS,
    },
    header::BSPEngine,
    textures::{BSPTexData, BSPTexInfo},
    Lump,
};

/// Per-axis tolerance when matching `start_position` to a face corner.
pub const CORNER_EPSILON: f32 = 0.005;

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPDispInfo {
    pub start_position: Vec3,  // start position used for orientation
    pub disp_vert_start: i32,  // Index into LUMP_DISP_VERTS.
    pub disp_tri_start: i32,   // Index into LUMP_DISP_TRIS.
    pub power: u32,            // power - indicates size of surface (2^power 1)
    pub min_tess: i32,         // minimum tesselation allowed
    pub smoothing_angle: f32,  // lighting smoothing angle
    pub contents: i32,         // surface contents
    pub map_face: u16,         // Which map face this displacement comes from.
    _pad0: [u8; 2],
    pub lightmap_alpha_start: i32, // Index into ddisplightmapalpha.
    pub lightmap_sample_position_start: i32, // Index into LUMP_DISP_LIGHTMAP_SAMPLE_POSITIONS.
    pub edge_neighbours: [CDispNeighbour; 4], // Indexed by NEIGHBOREDGE_ defines.
    pub corner_neighbours: [CDispCornerNeighbours; 4], // Indexed by CORNER_ defines.
    pub allowed_verts: [u32; 10], // active verticies
}

impl BSPDispInfo {
    /// Vertices along one side of the grid.
    pub fn side_len(&self) -> usize {
        (1 << self.power) + 1
    }

    pub fn vert_count(&self) -> usize {
        num_disp_power_verts(self.power)
    }
}

impl Lump for BSPDispInfo {
    fn max() -> usize {
        MAX_MAP_DISPINFO
    }

    fn lump_id(engine: BSPEngine) -> Option<usize> {
        (engine == BSPEngine::Source).then_some(LumpType::DispInfo as usize)
    }
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CDispNeighbour {
    // a neighbour that fills the whole side (corner to corner) is always first
    pub sub_neighbours: [CDispSubNeighbour; 2],
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CDispSubNeighbour {
    pub i_neighbour: u16, // This indexes into ddispinfos.
    // 0xFFFF if there is no neighbour here.
    pub neighbour_orientation: u8, // (CCW) rotation of the neighbour wrt this displacement.

    pub span: u8,           // Where the neighbour fits onto this side of our displacement.
    pub neighbour_span: u8, // Where we fit onto our neighbour.

    pub offset: u8,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CDispCornerNeighbours {
    pub neighbours: [u16; MAX_DISP_CORNER_NEIGHBORS], // indices of neighbours.
    pub n_neighbours: u8,
    _pad: u8,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPDispVert {
    pub vec: Vec3,  // direction of the offset
    pub dist: f32,  // length of the offset
    pub alpha: f32, // "per vertex" alpha values.
}

impl BSPDispVert {
    pub fn offset(&self) -> Vec3 {
        self.vec * self.dist
    }
}

impl Lump for BSPDispVert {
    fn max() -> usize {
        MAX_MAP_DISP_VERTS
    }

    fn lump_id(engine: BSPEngine) -> Option<usize> {
        (engine == BSPEngine::Source).then_some(LumpType::DispVerts as usize)
    }
}

/// Which corner of the source quad the displacement grid starts from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StartCorner {
    /// A corner within [`CORNER_EPSILON`] of `start_position` on every axis.
    Exact(usize),
    /// No corner matched, so the corner with the lowest component sum of
    /// `corner - start_position` was taken. Ties go to the earlier corner.
    Nearest(usize),
}

impl StartCorner {
    pub fn index(self) -> usize {
        match self {
            Self::Exact(i) | Self::Nearest(i) => i,
        }
    }
}

pub fn match_start_corner(corners: &[Vec3], start: Vec3) -> StartCorner {
    let exact = corners.iter().position(|c| {
        (*c - start)
            .abs()
            .cmple(Vec3::splat(CORNER_EPSILON))
            .all()
    });
    if let Some(i) = exact {
        return StartCorner::Exact(i);
    }

    let mut min_index = 0;
    let mut lowest = 999.0e16;
    for (i, corner) in corners.iter().enumerate() {
        let value = (*corner - start).dot(Vec3::ONE);
        if value < lowest {
            min_index = i;
            lowest = value;
        }
    }
    StartCorner::Nearest(min_index)
}

/// Triangulated displacement surface.
#[derive(Clone, Debug, Default)]
pub struct DisplacementMesh {
    /// Grid positions with the displacement offsets applied.
    pub positions: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub alphas: Vec<f32>,
    pub triangles: Vec<[u32; 3]>,
    pub start_corner: Option<StartCorner>,
}

impl DisplacementMesh {
    /// `corners` are the source face's four vertices in winding order.
    pub fn build(
        info: &BSPDispInfo,
        corners: &[Vec3],
        disp_verts: &[BSPDispVert],
        tex_info: &BSPTexInfo,
        tex_data: &BSPTexData,
    ) -> Result<Self> {
        let power = info.power;
        let map_face = info.map_face;
        if corners.len() != 4 {
            return Err(Error::assertion(
                0,
                format!(
                    "displacement on face {map_face} needs a quad, face has {} vertices",
                    corners.len()
                ),
            ));
        }
        if power > MAX_MAP_DISP_POWER {
            return Err(Error::assertion(
                0,
                format!("displacement power {power} on face {map_face}"),
            ));
        }

        let start_corner = match_start_corner(corners, info.start_position);
        let m = start_corner.index();
        let corner = |i: usize| corners[(i + m) & 3];

        let side = info.side_len();
        let count = side * side;
        let first = info.disp_vert_start.max(0) as usize;
        let offsets = disp_verts.get(first..first + count).ok_or_else(|| {
            Error::assertion(
                0,
                format!(
                    "displacement verts {first}+{count} outside {} disp verts",
                    disp_verts.len()
                ),
            )
        })?;

        let scale = 1.0 / (side - 1) as f32;
        let left_step = (corner(1) - corner(0)) * scale;
        let right_step = (corner(2) - corner(3)) * scale;

        let mut grid = Vec::with_capacity(count);
        for i in 0..side {
            let left_end = corner(0) + left_step * i as f32;
            let right_end = corner(3) + right_step * i as f32;
            let left_right_step = (right_end - left_end) * scale;
            for j in 0..side {
                grid.push(left_end + left_right_step * j as f32);
            }
        }

        let (s, t) = (tex_info.tex_s, tex_info.tex_t);
        let (view_width, view_height) = (tex_data.view_width as f32, tex_data.view_height as f32);
        let uvs = grid
            .iter()
            .map(|p| {
                Vec2::new(
                    (p.dot(s.truncate()) + s.w) / view_width,
                    1.0 - (p.dot(t.truncate()) + t.w) / view_height,
                )
            })
            .collect();

        let positions = grid
            .iter()
            .zip(offsets)
            .map(|(p, v)| *p + v.offset())
            .collect();
        let alphas = offsets.iter().map(|v| v.alpha).collect();

        let mut triangles = Vec::with_capacity((side - 1) * (side - 1) * 2);
        let n = side as u32;
        for i in 0..n - 1 {
            for j in 0..n - 1 {
                let index = i * n + j;
                if index & 1 == 1 {
                    triangles.push([index, index + 1, index + n]);
                    triangles.push([index + 1, index + n + 1, index + n]);
                } else {
                    triangles.push([index, index + n + 1, index + n]);
                    triangles.push([index, index + 1, index + n + 1]);
                }
            }
        }

        Ok(Self {
            positions,
            uvs,
            alphas,
            triangles,
            start_corner: Some(start_corner),
        })
    }
}

#[cfg(test)]
mod displacement_tests {
    use bytemuck::Zeroable;
    use glam::{vec3, Vec4};

    use super::*;

    fn square() -> [Vec3; 4] {
        [
            vec3(0.0, 0.0, 0.0),
            vec3(0.0, 64.0, 0.0),
            vec3(64.0, 64.0, 0.0),
            vec3(64.0, 0.0, 0.0),
        ]
    }

    #[test]
    fn record_sizes() {
        assert_eq!(std::mem::size_of::<BSPDispInfo>(), 176);
        assert_eq!(std::mem::size_of::<BSPDispVert>(), 20);
    }

    #[test]
    fn exact_corner_within_tolerance() {
        let start = vec3(64.004, 63.996, 0.0);
        assert_eq!(match_start_corner(&square(), start), StartCorner::Exact(2));
    }

    #[test]
    fn nearest_corner_fallback() {
        // component sums relative to the start: -200, -136, -72, -136
        let start = vec3(100.0, 100.0, 0.0);
        assert_eq!(match_start_corner(&square(), start), StartCorner::Nearest(0));
    }

    // Known edge case: the fallback ranks corners by the signed sum of their
    // offset from the start, not by distance, and keeps the first of equal
    // candidates.
    #[test]
    fn nearest_corner_ties_keep_first() {
        let corners = [
            vec3(64.0, 0.0, 0.0),
            vec3(0.0, 64.0, 0.0),
            vec3(64.0, 64.0, 0.0),
            vec3(128.0, 0.0, 0.0),
        ];
        let start = vec3(10.0, 10.0, 10.0);
        assert_eq!(match_start_corner(&corners, start), StartCorner::Nearest(0));
        let rotated = [corners[1], corners[0], corners[2], corners[3]];
        assert_eq!(match_start_corner(&rotated, start), StartCorner::Nearest(0));
    }

    fn info(power: u32, start: Vec3) -> BSPDispInfo {
        BSPDispInfo {
            start_position: start,
            power,
            ..BSPDispInfo::zeroed()
        }
    }

    fn tex() -> (BSPTexInfo, BSPTexData) {
        let tex_info = BSPTexInfo {
            tex_s: Vec4::new(1.0, 0.0, 0.0, 0.0),
            tex_t: Vec4::new(0.0, 1.0, 0.0, 0.0),
            ..BSPTexInfo::zeroed()
        };
        let tex_data = BSPTexData {
            view_width: 64,
            view_height: 64,
            ..BSPTexData::zeroed()
        };
        (tex_info, tex_data)
    }

    #[test]
    fn builds_grid_from_start_corner() {
        let verts = vec![
            BSPDispVert {
                vec: Vec3::Z,
                dist: 2.0,
                alpha: 128.0,
            };
            25
        ];
        let (tex_info, tex_data) = tex();
        let mesh = DisplacementMesh::build(
            &info(2, Vec3::ZERO),
            &square(),
            &verts,
            &tex_info,
            &tex_data,
        )
        .unwrap();

        assert_eq!(mesh.start_corner, Some(StartCorner::Exact(0)));
        assert_eq!(mesh.positions.len(), 25);
        assert_eq!(mesh.positions[0], vec3(0.0, 0.0, 2.0));
        assert_eq!(mesh.positions[7], vec3(32.0, 16.0, 2.0));
        assert_eq!(mesh.positions[24], vec3(64.0, 64.0, 2.0));
        assert_eq!(mesh.uvs[6], Vec2::new(0.25, 0.75));
        assert_eq!(mesh.alphas[3], 128.0);

        assert_eq!(mesh.triangles.len(), 32);
        assert_eq!(&mesh.triangles[..4], &[[0, 6, 5], [0, 1, 6], [1, 2, 6], [2, 7, 6]]);
    }

    #[test]
    fn rejects_bad_inputs() {
        let verts = vec![BSPDispVert::zeroed(); 24];
        let (tex_info, tex_data) = tex();
        // one vertex short of a power 2 grid
        assert!(DisplacementMesh::build(&info(2, Vec3::ZERO), &square(), &verts, &tex_info, &tex_data).is_err());
        // triangles are not quads
        assert!(
            DisplacementMesh::build(&info(2, Vec3::ZERO), &square()[..3], &verts, &tex_info, &tex_data)
                .is_err()
        );
    }
}
