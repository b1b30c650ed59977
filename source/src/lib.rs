//! Readers for Valve game assets: Source and GoldSrc BSP maps, VPK archives,
//! binary KeyValues3, Source 2 compiled resources and studio models.
//!
//! Every reader takes bytes already in memory and returns an immutable,
//! validated value. Malformed input is reported through
//! [`common::error::Error`], never by panicking.

pub mod bsp;
pub mod codec;
pub mod content;
pub mod kv3;
pub mod prelude;
pub mod resource;
pub mod studio;
pub mod vpk;
