pub use common::prelude::*;

pub use crate::bsp::{
    consts::LumpType, lightmap::ColorRGBExp32, BSPDispInfo, BSPDispVert, BSPEdge, BSPEngine, BSPEntities,
    BSPFace, BSPFile, BSPHeader, BSPLump, BSPModel, BSPPlane, BSPSurfEdge, BSPTexData, BSPTexDataStringTable,
    BSPTexInfo, Entity, LumpData, PakLump,
};
pub use crate::codec::CompressionMethod;
pub use crate::content::{ContentManager, ContentProvider, LooseFiles};
pub use crate::kv3::{KV3Document, KV3Value};
pub use crate::resource::{CompiledResource, TextureHeader, VTexFormat};
pub use crate::studio::{GoldSrcMDL, Skeleton, MDL, VTX, VVD};
pub use crate::vpk::{VPKDirectory, VPKFile};
