pub use crate::error::{Error, Result};
pub use crate::reader::{ByteReader, Whence};
pub use crate::vfile::{VFile, VFileSystem};
pub use crate::vpath::{normalize_path, VGlobalPath, VPath, VSplitPath};
