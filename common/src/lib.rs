pub mod error;
pub mod prelude;
pub mod reader;
pub mod vfile;
pub mod vpath;
