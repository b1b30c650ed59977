//! LZHAM has no pure Rust decoder, so the actual decompressor is supplied by
//! the host application through [`install_backend`]. The slot is process-wide
//! and can only be filled once.

use std::sync::OnceLock;

use common::prelude::*;
use num_derive::FromPrimitive;

#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum DecompressStatus {
    NotFinished = 0,
    HasMoreOutput = 1,
    NeedsMoreInput = 2,
    Success = 3,
    Failure = 4,
    DestinationBufferTooSmall = 5,
    ExpectedMoreRawBytes = 6,
    BadCode = 7,
    Adler32 = 8,
    BadRawBlock = 9,
    BadCompBlockSyncCheck = 10,
    BadZlibHeader = 11,
    NeedSeedBytes = 12,
    BadSeedBytes = 13,
    BadSyncBlock = 14,
    InvalidParameter = 15,
}

pub const DEFAULT_DICT_SIZE_LOG2: u32 = 15;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecompressionParameters {
    /// Size of the native parameter struct on a 64-bit host.
    pub struct_size: u32,
    pub dict_size_log2: u32,
    pub flags: u32,
    pub seed_bytes: Vec<u8>,
}

impl Default for DecompressionParameters {
    fn default() -> Self {
        Self {
            struct_size: 24,
            dict_size_log2: DEFAULT_DICT_SIZE_LOG2,
            flags: 0,
            seed_bytes: Vec::new(),
        }
    }
}

impl DecompressionParameters {
    pub fn with_dict_size(dict_size_log2: u32) -> Self {
        Self {
            dict_size_log2,
            ..Default::default()
        }
    }
}

pub trait LzhamBackend: Send + Sync {
    /// Decompress a complete stream in one call.
    fn decompress_memory(
        &self,
        params: &DecompressionParameters,
        data: &[u8],
        decompressed_size: usize,
    ) -> std::result::Result<Vec<u8>, DecompressStatus>;
}

static BACKEND: OnceLock<Box<dyn LzhamBackend>> = OnceLock::new();

/// Returns the backend back if one was already installed.
pub fn install_backend(
    backend: Box<dyn LzhamBackend>,
) -> std::result::Result<(), Box<dyn LzhamBackend>> {
    BACKEND.set(backend)
}

pub fn has_backend() -> bool {
    BACKEND.get().is_some()
}

pub fn decompress(
    params: &DecompressionParameters,
    data: &[u8],
    decompressed_size: usize,
) -> Result<Vec<u8>> {
    let Some(backend) = BACKEND.get() else {
        return Err(Error::unsupported("lzham stream, no decoder installed"));
    };
    if !(15..=29).contains(&params.dict_size_log2) {
        return Err(Error::decompression(
            "lzham",
            format!("dictionary size 2^{} out of range", params.dict_size_log2),
        ));
    }
    let out = backend
        .decompress_memory(params, data, decompressed_size)
        .map_err(|status| Error::decompression("lzham", format!("{status:?}")))?;
    super::check_size("lzham", out, decompressed_size)
}
