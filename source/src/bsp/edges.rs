use glam::Vec3;

use common::prelude::*;

use super::{
    consts::{LumpType, MAX_MAP_EDGES, MAX_MAP_SURFEDGES, MAX_MAP_VERTS},
    header::BSPEngine,
    Lump,
};

#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPVertex(pub Vec3);

impl Lump for BSPVertex {
    fn max() -> usize {
        MAX_MAP_VERTS
    }
    fn lump_id(_engine: BSPEngine) -> Option<usize> {
        Some(LumpType::Vertexes as usize)
    }
}

/// A pair of vertex indices. Edges are shared between neighbouring faces and
/// usually reached through the surf-edge array.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPEdge {
    pub v: [u16; 2],
}

impl Lump for BSPEdge {
    fn max() -> usize {
        MAX_MAP_EDGES
    }
    fn lump_id(_engine: BSPEngine) -> Option<usize> {
        Some(LumpType::Edges as usize)
    }
}

/// Signed index into the edge array. A positive value walks the edge from its
/// first to its second vertex; zero or negative walks it backwards.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPSurfEdge {
    pub index: i32,
}

impl BSPSurfEdge {
    /// The edge's vertices in winding order.
    pub fn get_edge(&self, edges: &[BSPEdge]) -> Result<(u16, u16)> {
        let index = self.index;
        let id = index.unsigned_abs() as usize;
        let edge = edges.get(id).ok_or_else(|| {
            Error::assertion(0, format!("surf-edge {index} outside {} edges", edges.len()))
        })?;
        let [v0, v1] = edge.v;
        Ok(if index > 0 { (v0, v1) } else { (v1, v0) })
    }
}

impl Lump for BSPSurfEdge {
    fn max() -> usize {
        MAX_MAP_SURFEDGES
    }
    fn lump_id(_engine: BSPEngine) -> Option<usize> {
        Some(LumpType::SurfEdges as usize)
    }
}
