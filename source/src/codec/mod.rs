//! Byte-buffer decompressors used by the format readers.
//!
//! Every codec takes the compressed bytes and the size the caller expects and
//! either returns exactly that many bytes or an [`Error::Decompression`].

use common::prelude::*;

pub mod block;
pub mod lz4;
pub mod lzham;
pub mod zstd;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompressionMethod {
    None,
    Lz4,
    Zstd,
    /// The KV3 block-mask codec, which carries its own size header.
    Block,
    Lzham,
}

pub fn decompress(
    method: CompressionMethod,
    data: &[u8],
    decompressed_size: usize,
) -> Result<Vec<u8>> {
    let out = match method {
        CompressionMethod::None => data.to_vec(),
        CompressionMethod::Lz4 => lz4::decompress(data, decompressed_size)?,
        CompressionMethod::Zstd => zstd::decompress(data, decompressed_size)?,
        CompressionMethod::Block => block::decompress(data)?,
        CompressionMethod::Lzham => lzham::decompress(
            &lzham::DecompressionParameters::default(),
            data,
            decompressed_size,
        )?,
    };
    check_size(method_name(method), out, decompressed_size)
}

fn method_name(method: CompressionMethod) -> &'static str {
    match method {
        CompressionMethod::None => "raw",
        CompressionMethod::Lz4 => "lz4",
        CompressionMethod::Zstd => "zstd",
        CompressionMethod::Block => "kv3 block",
        CompressionMethod::Lzham => "lzham",
    }
}

pub(crate) fn check_size(codec: &'static str, out: Vec<u8>, expected: usize) -> Result<Vec<u8>> {
    if out.len() != expected {
        return Err(Error::decompression(
            codec,
            format!("produced {} bytes, expected {expected}", out.len()),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod codec_tests {
    use super::*;

    #[test]
    fn raw_size_mismatch_is_rejected() {
        assert_eq!(
            decompress(CompressionMethod::None, &[1, 2, 3], 3).unwrap(),
            vec![1, 2, 3]
        );
        assert!(matches!(
            decompress(CompressionMethod::None, &[1, 2, 3], 4),
            Err(Error::Decompression { codec: "raw", .. })
        ));
    }

    #[test]
    fn dispatches_lz4() {
        let input = b"dispatch dispatch dispatch dispatch".to_vec();
        let packed = lz4_flex::block::compress(&input);
        assert_eq!(
            decompress(CompressionMethod::Lz4, &packed, input.len()).unwrap(),
            input
        );
    }
}
