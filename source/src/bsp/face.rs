use glam::IVec2;

use common::prelude::*;

use super::{
    consts::{LumpType, MAX_MAP_FACES},
    edges::{BSPEdge, BSPSurfEdge},
    header::BSPEngine,
    Lump,
};

/// A face of the compiled map.
///
/// The original face lump (27) has the same layout but holds the faces from
/// before BSP splitting, so they are closer to the brush faces of the source
/// map. Both arrays are culled of faces pointing into the void.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPFace {
    /// Index into the plane array for the plane this face lies on.
    pub plane_num: u16,
    /// Non-zero when the face points opposite to its plane's normal.
    pub side: i8,
    /// 1 if on a node, 0 if in a leaf
    pub on_node: i8,
    /// First of `num_edges` consecutive surf-edges. Their signs give the
    /// direction each edge is walked, tracing the face clockwise.
    pub first_edge: i32,
    pub num_edges: i16,
    /// Index into the texinfo array.
    pub tex_info: i16,
    /// Index into the dispinfo array, or -1 for a plain face.
    pub disp_info: i16,
    pub surface_fog_volume_id: i16,
    /// switchable lighting info
    pub styles: [i8; 4],
    /// offset into lightmap lump
    pub light_ofs: i32,
    /// face area in units^2
    pub area: f32,
    pub lightmap_texture_mins_in_luxels: IVec2,
    pub lightmap_texture_size_in_luxels: IVec2,
    /// Index of the original face this one was split from.
    pub orig_face: i32,
    pub num_prims: u16,
    pub first_prim_id: u16,
    /// lightmap smoothing group
    pub smoothing_groups: u32,
}

impl BSPFace {
    pub fn is_displacement(&self) -> bool {
        self.disp_info >= 0
    }

    /// Vertex indices of the face in winding order, one per edge.
    pub fn vertex_indices(&self, edges: &[BSPEdge], surfedges: &[BSPSurfEdge]) -> Result<Vec<usize>> {
        face_vertex_indices(self.first_edge, self.num_edges as i32, edges, surfedges)
    }
}

pub(crate) fn face_vertex_indices(
    first_edge: i32,
    num_edges: i32,
    edges: &[BSPEdge],
    surfedges: &[BSPSurfEdge],
) -> Result<Vec<usize>> {
    let start = usize::try_from(first_edge).unwrap_or(usize::MAX);
    let count = num_edges.max(0) as usize;
    let run = start
        .checked_add(count)
        .and_then(|end| surfedges.get(start..end))
        .ok_or_else(|| {
            Error::assertion(
                0,
                format!(
                    "face edges {first_edge}+{num_edges} outside {} surf-edges",
                    surfedges.len()
                ),
            )
        })?;
    run.iter()
        .map(|surfedge| surfedge.get_edge(edges).map(|(v, _)| v as usize))
        .collect()
}

impl Lump for BSPFace {
    fn max() -> usize {
        MAX_MAP_FACES
    }
    fn lump_id(engine: BSPEngine) -> Option<usize> {
        (engine == BSPEngine::Source).then_some(LumpType::Faces as usize)
    }
}

#[repr(transparent)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPOriginalFace(pub BSPFace);

impl Lump for BSPOriginalFace {
    fn max() -> usize {
        MAX_MAP_FACES
    }
    fn lump_id(engine: BSPEngine) -> Option<usize> {
        (engine == BSPEngine::Source).then_some(LumpType::OriginalFaces as usize)
    }
}

#[cfg(test)]
mod face_tests {
    use bytemuck::Zeroable;

    use super::*;

    #[test]
    fn face_record_size() {
        assert_eq!(std::mem::size_of::<BSPFace>(), 56);
    }

    #[test]
    fn vertices_follow_surf_edge_winding() {
        let edges = [
            BSPEdge { v: [0, 0] },
            BSPEdge { v: [0, 1] },
            BSPEdge { v: [2, 1] },
            BSPEdge { v: [2, 3] },
            BSPEdge { v: [0, 3] },
        ];
        let surfedges = [1, -2, 3, -4].map(|index| BSPSurfEdge { index });
        let face = BSPFace {
            first_edge: 0,
            num_edges: 4,
            disp_info: -1,
            ..BSPFace::zeroed()
        };
        assert_eq!(face.vertex_indices(&edges, &surfedges).unwrap(), [0, 1, 2, 3]);
        assert!(!face.is_displacement());

        let overrun = BSPFace {
            first_edge: 2,
            num_edges: 4,
            ..face
        };
        assert!(overrun.vertex_indices(&edges, &surfedges).is_err());
    }
}
