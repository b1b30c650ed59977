use common::prelude::*;

/// Largest distance an LZ4 match can reach back.
const WINDOW_SIZE: usize = 64 * 1024;

/// Decode one LZ4 block of known output size.
pub fn decompress(data: &[u8], decompressed_size: usize) -> Result<Vec<u8>> {
    let out = lz4_flex::block::decompress(data, decompressed_size)
        .map_err(|e| Error::decompression("lz4", e.to_string()))?;
    super::check_size("lz4", out, decompressed_size)
}

/// Decodes a run of LZ4 blocks where later blocks may reference bytes
/// produced by earlier ones.
#[derive(Default)]
pub struct ChainDecoder {
    history: Vec<u8>,
}

impl ChainDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decompress(&mut self, data: &[u8], decompressed_size: usize) -> Result<Vec<u8>> {
        let out = lz4_flex::block::decompress_with_dict(data, decompressed_size, &self.history)
            .map_err(|e| Error::decompression("lz4 chain", e.to_string()))?;
        let out = super::check_size("lz4 chain", out, decompressed_size)?;

        self.history.extend_from_slice(&out);
        if self.history.len() > WINDOW_SIZE {
            let excess = self.history.len() - WINDOW_SIZE;
            self.history.drain(..excess);
        }
        Ok(out)
    }
}
