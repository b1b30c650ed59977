//! The block-mask LZ codec used by `VKV\x03` documents with the
//! block-compressed encoding.
//!
//! Layout: four flag bytes (24-bit output size, bit 7 of the fourth byte marks
//! a stored payload), then groups of a u16 mask followed by up to sixteen
//! items. A set mask bit is a u16 back-reference, a clear bit a literal byte.

use common::prelude::*;

const CODEC: &str = "kv3 block";

pub fn declared_size(flags: [u8; 4]) -> usize {
    flags[0] as usize | (flags[1] as usize) << 8 | (flags[2] as usize) << 16
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    decompress_from(&mut ByteReader::new(data))
}

/// Decode from the reader's current position to the end of its view.
pub fn decompress_from(reader: &mut ByteReader) -> Result<Vec<u8>> {
    let flags: [u8; 4] = reader.read_array()?;
    if flags[3] & 0x80 != 0 {
        return Ok(reader.read_to_end());
    }

    let size = declared_size(flags);
    let mut out = Vec::with_capacity(size);
    let truncated = |produced: usize| {
        Error::decompression(
            CODEC,
            format!("input ended after {produced} of {size} bytes"),
        )
    };

    'groups: while out.len() < size {
        let mask = reader.read_u16().map_err(|_| truncated(out.len()))?;
        for bit in 0..16 {
            if mask & (1 << bit) != 0 {
                let token = reader.read_u16().map_err(|_| truncated(out.len()))?;
                let offset = ((token & 0xfff0) >> 4) as usize + 1;
                let len = (token & 0x000f) as usize + 3;
                if offset > out.len() {
                    return Err(Error::decompression(
                        CODEC,
                        format!(
                            "back-reference {offset} bytes behind position {}",
                            out.len()
                        ),
                    ));
                }
                // the source run may overlap what this copy writes
                let from = out.len() - offset;
                for i in 0..len {
                    let byte = out[from + i];
                    out.push(byte);
                }
            } else {
                out.push(reader.read_u8().map_err(|_| truncated(out.len()))?);
            }

            if out.len() >= size {
                break 'groups;
            }
        }
    }

    super::check_size(CODEC, out, size)
}

#[cfg(test)]
mod block_tests {
    use super::*;

    /// Greedy encoder producing streams the decoder accepts.
    fn compress(input: &[u8]) -> Vec<u8> {
        let size = input.len() as u32;
        let mut out = size.to_le_bytes().to_vec();
        out[3] = 0;

        let mut pos = 0;
        while pos < input.len() {
            let mut mask = 0u16;
            let mut items = Vec::new();
            for bit in 0..16 {
                if pos >= input.len() {
                    break;
                }
                let (offset, len) = longest_match(input, pos);
                if len >= 3 {
                    mask |= 1 << bit;
                    let token = (((offset - 1) as u16) << 4) | (len - 3) as u16;
                    items.extend_from_slice(&token.to_le_bytes());
                    pos += len;
                } else {
                    items.push(input[pos]);
                    pos += 1;
                }
            }
            out.extend_from_slice(&mask.to_le_bytes());
            out.extend_from_slice(&items);
        }
        out
    }

    fn longest_match(input: &[u8], pos: usize) -> (usize, usize) {
        let max_len = 18.min(input.len() - pos);
        let mut best = (0, 0);
        for offset in 1..=pos.min(4096) {
            let start = pos - offset;
            let mut len = 0;
            while len < max_len && input[start + len] == input[pos + len] {
                len += 1;
            }
            if len > best.1 {
                best = (offset, len);
            }
        }
        best
    }

    #[test]
    fn encoder_roundtrip() {
        let samples: [&[u8]; 4] = [
            b"",
            b"x",
            b"the quick brown fox jumps over the quick brown dog, the quick end",
            &[0u8; 300],
        ];
        for sample in samples {
            let packed = compress(sample);
            assert_eq!(decompress(&packed).unwrap(), sample);
        }

        let mixed: Vec<u8> = (0..2000u32).map(|i| ((i * 7) % 13) as u8).collect();
        assert_eq!(decompress(&compress(&mixed)).unwrap(), mixed);
    }

    #[test]
    fn overlapping_back_reference_repeats_pattern() {
        // 'a', 'b', then copy 8 bytes from 2 back
        let token: u16 = (1 << 4) | (8 - 3);
        let mut data = vec![10, 0, 0, 0, 0b100, 0, b'a', b'b'];
        data.extend_from_slice(&token.to_le_bytes());
        assert_eq!(decompress(&data).unwrap(), b"ababababab".to_vec());
    }

    #[test]
    fn stored_payload() {
        assert_eq!(decompress(&[3, 0, 0, 0x80, 1, 2, 3]).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn malformed_streams() {
        // declares five bytes, supplies two literals
        let short = [5, 0, 0, 0, 0, 0, b'a', b'b'];
        assert!(matches!(
            decompress(&short),
            Err(Error::Decompression { codec: CODEC, .. })
        ));

        // reference before the start of output
        let token: u16 = (4 << 4) | 0;
        let mut early = vec![4, 0, 0, 0, 0b10, 0, b'a'];
        early.extend_from_slice(&token.to_le_bytes());
        assert!(decompress(&early).is_err());

        // copy runs past the declared size
        let token: u16 = 0xf;
        let mut long = vec![4, 0, 0, 0, 0b10, 0, b'a'];
        long.extend_from_slice(&token.to_le_bytes());
        assert!(decompress(&long).is_err());
    }
}
