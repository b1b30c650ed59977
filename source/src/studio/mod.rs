//! Studio models: Source MDL/VVD/VTX, GoldSrc MDL v10 and Source 2
//! skeletons.
//!
//! MDL files are a header of `(count, offset)` pairs. Offsets in the header
//! are from the start of the file; offsets inside a record are from the
//! start of that record.

pub mod bones;
pub mod flex;
pub mod goldsrc;
pub mod mdl;
pub mod vtx;
pub mod vvd;

use bytemuck::{Pod, Zeroable};
use common::prelude::*;

pub use bones::{Bone, Skeleton};
pub use flex::{FlexExpr, FlexFunction, FlexInputs, FlexValues};
pub use goldsrc::GoldSrcMDL;
pub use mdl::MDL;
pub use vtx::VTX;
pub use vvd::VVD;

/// A `(count, offset)` pair pointing at an array of records.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct StudioArray {
    pub count: i32,
    pub offset: i32,
}

impl StudioArray {
    /// Reads `count` records of `T` from `base + offset`, each paired with
    /// its own position so nested offsets can be resolved.
    pub(crate) fn read<T: Pod>(&self, reader: &mut ByteReader, base: usize) -> Result<Vec<(usize, T)>> {
        let (count, offset) = (self.count, self.offset);
        if count <= 0 {
            return Ok(Vec::new());
        }
        let start = checked_offset(base, offset)?;
        let size = std::mem::size_of::<T>();
        reader.with_position(start, |r| {
            let records = r.read_pod_slice::<T>(count as usize)?;
            Ok(records
                .into_iter()
                .enumerate()
                .map(|(i, record)| (start + i * size, record))
                .collect())
        })
    }
}

pub(crate) fn checked_offset(base: usize, offset: i32) -> Result<usize> {
    base.checked_add_signed(offset as isize)
        .ok_or_else(|| Error::assertion(base, format!("offset {offset} points before the file")))
}

/// NUL-terminated name at `base + offset`. A zero offset is an empty name.
pub(crate) fn read_name(reader: &mut ByteReader, base: usize, offset: i32) -> Result<String> {
    if offset == 0 {
        return Ok(String::new());
    }
    let at = checked_offset(base, offset)?;
    reader.with_position(at, |r| r.read_cstring())
}
