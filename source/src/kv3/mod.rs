//! Binary KeyValues3: Valve's tagged binary object format.

mod decoder;
mod value;

pub use decoder::*;
pub use value::*;
