use std::mem;

use bytemuck::Pod;
use common::prelude::*;

use super::{header::BSPEngine, BSPFile};

/// Anything that can be decoded from one lump and cached on a [`BSPFile`].
pub trait LumpData: Sized + Send + Sync + 'static {
    /// Lump slot for this data in the given engine's directory, if it has one.
    fn lump_id(engine: BSPEngine) -> Option<usize>;

    fn parse(bsp: &BSPFile, id: usize) -> Result<Self>;
}

/// A fixed-size record stored as a flat array in its lump.
pub trait Lump: Pod + Send + Sync {
    fn max() -> usize;
    fn lump_id(engine: BSPEngine) -> Option<usize>;
}

impl<T: Lump> LumpData for Vec<T> {
    fn lump_id(engine: BSPEngine) -> Option<usize> {
        T::lump_id(engine)
    }

    fn parse(bsp: &BSPFile, id: usize) -> Result<Self> {
        let mut reader = bsp.lump_reader(id)?;
        let item_size = mem::size_of::<T>();
        if reader.len() % item_size != 0 {
            return Err(Error::assertion(
                bsp.header().lump(id).offset(),
                format!(
                    "lump {id} is {} bytes, not a multiple of its {item_size} byte record",
                    reader.len()
                ),
            ));
        }
        let count = reader.len() / item_size;
        if count > T::max() {
            log::warn!(
                "lump {id} holds {count} records, over the engine limit of {}",
                T::max()
            );
        }
        reader.read_pod_slice(count)
    }
}
