//! Conversion of texture payloads to tightly packed RGBA8.
//!
//! DXT1, DXT5, ATI1N (BC4) and ATI2N (BC5) are unpacked here along with the
//! plain byte formats. Everything else (BC6H, BC7, ETC2, ...) goes through a
//! caller supplied [`BlockDecoder`].

use common::prelude::*;
use half::f16;

use super::texture::VTexFormat;

/// Per-texture facts a block decoder may need beyond the raw bytes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodeHints {
    /// BC7 data stores a hemi-octahedral normal in RG and roughness in B.
    pub hemi_oct_rb: bool,
}

/// Options for [`TextureHeader::read_image`](super::TextureHeader::read_image).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageOptions {
    /// Store rows bottom-up.
    pub flip: bool,
    pub mip: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

/// Decoder for the block formats this module does not unpack itself.
pub trait BlockDecoder {
    /// Returns `width * height * 4` bytes of RGBA8.
    fn decode(
        &self,
        format: VTexFormat,
        data: &[u8],
        width: usize,
        height: usize,
        hints: DecodeHints,
    ) -> Result<Vec<u8>>;
}

/// Reverses row order in place.
pub fn flip_rows(rgba: &mut [u8], width: usize) {
    let stride = width * 4;
    if stride == 0 {
        return;
    }
    let rows = rgba.len() / stride;
    for y in 0..rows / 2 {
        let (top, bottom) = rgba.split_at_mut((rows - 1 - y) * stride);
        top[y * stride..(y + 1) * stride].swap_with_slice(&mut bottom[..stride]);
    }
}

/// Decodes one mip worth of `data` in `format` to RGBA8.
pub fn decode(
    format: VTexFormat,
    data: &[u8],
    width: usize,
    height: usize,
    hints: DecodeHints,
    fallback: Option<&dyn BlockDecoder>,
) -> Result<Vec<u8>> {
    match format {
        VTexFormat::RGBA8888 => copy_pixels(data, width, height, 4, |p| [p[0], p[1], p[2], p[3]]),
        VTexFormat::BGRA8888 => copy_pixels(data, width, height, 4, |p| [p[2], p[1], p[0], p[3]]),
        VTexFormat::I8 => copy_pixels(data, width, height, 1, |p| [p[0], p[0], p[0], 255]),
        VTexFormat::IA88 => copy_pixels(data, width, height, 2, |p| [p[0], p[0], p[0], p[1]]),
        VTexFormat::RGBA16161616F => copy_pixels(data, width, height, 8, |p| {
            let channel = |i: usize| {
                let v = f16::from_le_bytes([p[i * 2], p[i * 2 + 1]]).to_f32();
                (v.clamp(0.0, 1.0) * 255.0).round() as u8
            };
            [channel(0), channel(1), channel(2), channel(3)]
        }),
        VTexFormat::DXT1 => decode_blocks(data, width, height, 8, |b, out| {
            color_block(b, out, true);
        }),
        VTexFormat::DXT5 => decode_blocks(data, width, height, 16, |b, out| {
            color_block(&b[8..], out, false);
            let alpha = alpha_block(&b[..8]);
            for (px, a) in out.iter_mut().zip(alpha) {
                px[3] = a;
            }
        }),
        VTexFormat::ATI1N => decode_blocks(data, width, height, 8, |b, out| {
            for (px, v) in out.iter_mut().zip(alpha_block(b)) {
                *px = [v, v, v, 255];
            }
        }),
        VTexFormat::ATI2N => decode_blocks(data, width, height, 16, |b, out| {
            let red = alpha_block(&b[..8]);
            let green = alpha_block(&b[8..]);
            for ((px, r), g) in out.iter_mut().zip(red).zip(green) {
                *px = [r, g, normal_z(r, g), 255];
            }
        }),
        other => match fallback {
            Some(decoder) => {
                let rgba = decoder.decode(other, data, width, height, hints)?;
                if rgba.len() != width * height * 4 {
                    return Err(Error::decompression(
                        "texture",
                        format!(
                            "{other:?} decoder produced {} bytes for {width}x{height}",
                            rgba.len()
                        ),
                    ));
                }
                Ok(rgba)
            }
            None => Err(Error::unsupported(format!(
                "no decoder installed for {other:?} pixels"
            ))),
        },
    }
}

fn copy_pixels(
    data: &[u8],
    width: usize,
    height: usize,
    bpp: usize,
    f: impl Fn(&[u8]) -> [u8; 4],
) -> Result<Vec<u8>> {
    let needed = width * height * bpp;
    if data.len() < needed {
        return Err(Error::OutOfBounds {
            offset: 0,
            requested: needed,
            len: data.len(),
        });
    }
    Ok(data[..needed].chunks_exact(bpp).flat_map(f).collect())
}

/// Walks 4x4 blocks, dropping pixels that fall outside the image.
fn decode_blocks(
    data: &[u8],
    width: usize,
    height: usize,
    block_size: usize,
    f: impl Fn(&[u8], &mut [[u8; 4]; 16]),
) -> Result<Vec<u8>> {
    let blocks_x = width.div_ceil(4);
    let blocks_y = height.div_ceil(4);
    let needed = blocks_x * blocks_y * block_size;
    if data.len() < needed {
        return Err(Error::OutOfBounds {
            offset: 0,
            requested: needed,
            len: data.len(),
        });
    }

    let mut rgba = vec![0u8; width * height * 4];
    let mut texels = [[0u8; 4]; 16];
    for (i, block) in data[..needed].chunks_exact(block_size).enumerate() {
        let (bx, by) = (i % blocks_x * 4, i / blocks_x * 4);
        f(block, &mut texels);
        for (j, texel) in texels.iter().enumerate() {
            let (x, y) = (bx + j % 4, by + j / 4);
            if x < width && y < height {
                let at = (y * width + x) * 4;
                rgba[at..at + 4].copy_from_slice(texel);
            }
        }
    }
    Ok(rgba)
}

fn rgb565(c: u16) -> [u8; 4] {
    let r = (c >> 11) as u8 & 0x1F;
    let g = (c >> 5) as u8 & 0x3F;
    let b = c as u8 & 0x1F;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2), 255]
}

fn blend(a: [u8; 4], b: [u8; 4], wa: u16, wb: u16) -> [u8; 4] {
    let mix = |i: usize| ((a[i] as u16 * wa + b[i] as u16 * wb) / (wa + wb)) as u8;
    [mix(0), mix(1), mix(2), 255]
}

/// An 8 byte BC1 colour block. Outside DXT1 the four colour mode always applies.
fn color_block(b: &[u8], out: &mut [[u8; 4]; 16], dxt1: bool) {
    let c0 = u16::from_le_bytes([b[0], b[1]]);
    let c1 = u16::from_le_bytes([b[2], b[3]]);
    let (p0, p1) = (rgb565(c0), rgb565(c1));
    let palette = if c0 > c1 || !dxt1 {
        [p0, p1, blend(p0, p1, 2, 1), blend(p0, p1, 1, 2)]
    } else {
        [p0, p1, blend(p0, p1, 1, 1), [0, 0, 0, 0]]
    };
    let indices = u32::from_le_bytes([b[4], b[5], b[6], b[7]]);
    for (i, px) in out.iter_mut().enumerate() {
        *px = palette[(indices >> (i * 2)) as usize & 3];
    }
}

/// An 8 byte BC4 block: two endpoints and sixteen 3-bit indices.
fn alpha_block(b: &[u8]) -> [u8; 16] {
    let (a0, a1) = (b[0] as u16, b[1] as u16);
    let mut palette = [0u8; 8];
    palette[0] = a0 as u8;
    palette[1] = a1 as u8;
    if a0 > a1 {
        for i in 1..7u16 {
            palette[i as usize + 1] = (((7 - i) * a0 + i * a1) / 7) as u8;
        }
    } else {
        for i in 1..5u16 {
            palette[i as usize + 1] = (((5 - i) * a0 + i * a1) / 5) as u8;
        }
        palette[6] = 0;
        palette[7] = 255;
    }

    let mut bits = [0u8; 8];
    bits[..6].copy_from_slice(&b[2..8]);
    let bits = u64::from_le_bytes(bits);
    std::array::from_fn(|i| palette[(bits >> (i * 3)) as usize & 7])
}

/// Blue channel for a two channel normal map.
fn normal_z(r: u8, g: u8) -> u8 {
    let x = r as f32 / 255.0 * 2.0 - 1.0;
    let y = g as f32 / 255.0 * 2.0 - 1.0;
    let z = (1.0 - x * x - y * y).max(0.0).sqrt();
    ((z * 0.5 + 0.5) * 255.0).round() as u8
}
