use std::io::Read;

use common::prelude::*;

/// Stream-decode a ZSTD frame. The whole frame must expand to `expected_size`.
pub fn decompress(data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let mut decoder = ::zstd::stream::read::Decoder::new(data)
        .map_err(|e| Error::decompression("zstd", e.to_string()))?;
    let mut out = Vec::with_capacity(expected_size);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::decompression("zstd", e.to_string()))?;
    super::check_size("zstd", out, expected_size)
}
