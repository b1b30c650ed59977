use std::sync::Arc;

use ahash::AHashMap;

use crate::{reader::ByteReader, vpath::VPath};

#[derive(Default, Clone)]
pub struct VFile {
    pub data: Arc<[u8]>,
}

/// In-memory file table keyed by normalized path.
#[derive(Default, Clone)]
pub struct VFileSystem {
    pub files: Arc<AHashMap<String, VFile>>,
}

impl VFileSystem {
    pub fn insert(&mut self, path: &dyn VPath, data: impl Into<Arc<[u8]>>) {
        Arc::make_mut(&mut self.files).insert(path.full(), VFile { data: data.into() });
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, path: &dyn VPath) -> Option<ByteReader> {
        self.get_str(&path.full())
    }

    pub fn get_str(&self, path: &str) -> Option<ByteReader> {
        match self.files.get(path) {
            Some(file) => Some(ByteReader::new(file.data.clone())),
            None => {
                log::debug!("{:?} file not found", path);
                None
            }
        }
    }
}
