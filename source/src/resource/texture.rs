use bytemuck::{Pod, Zeroable};
use common::prelude::*;
use flagset::{flags, FlagSet};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use super::pixels::{self, BlockDecoder, DecodeHints, DecodedImage, ImageOptions};
use super::CompiledResource;
use crate::codec::lz4;

#[derive(Copy, Clone, FromPrimitive, Debug, PartialEq, Eq)]
#[repr(u8)]
#[allow(non_camel_case_types)]
pub enum VTexFormat {
    UNKNOWN = 0,
    DXT1 = 1,
    DXT5 = 2,
    I8 = 3,
    RGBA8888 = 4,
    R16 = 5,
    RG1616 = 6,
    RGBA16161616 = 7,
    R16F = 8,
    RG1616F = 9,
    RGBA16161616F = 10,
    R32F = 11,
    RG3232F = 12,
    RGB323232F = 13,
    RGBA32323232F = 14,
    JPEG_RGBA8888 = 15,
    PNG_RGBA8888 = 16,
    JPEG_DXT5 = 17,
    PNG_DXT5 = 18,
    BC6H = 19,
    BC7 = 20,
    ATI2N = 21,
    IA88 = 22,
    ETC2 = 23,
    ETC2_EAC = 24,
    R11_EAC = 25,
    RG11_EAC = 26,
    ATI1N = 27,
    BGRA8888 = 28,
}

impl VTexFormat {
    /// Bytes per pixel, or per 4x4 block for block compressed formats.
    pub fn block_size(self) -> Option<usize> {
        use VTexFormat::*;
        Some(match self {
            DXT1 | ETC2 | ATI1N => 8,
            DXT5 | BC6H | BC7 | ETC2_EAC | ATI2N => 16,
            RGBA8888 | BGRA8888 | RG1616 | RG1616F | R32F => 4,
            R16 | R16F | IA88 => 2,
            RGBA16161616 | RGBA16161616F | RG3232F => 8,
            RGB323232F => 12,
            RGBA32323232F => 16,
            _ => return None,
        })
    }

    pub fn is_block_compressed(self) -> bool {
        use VTexFormat::*;
        matches!(self, DXT1 | DXT5 | BC6H | BC7 | ETC2 | ETC2_EAC | ATI1N | ATI2N)
    }
}

flags! {
    pub enum VTexFlags: u16 {
        SuggestClampS = 0x01,
        SuggestClampT = 0x02,
        SuggestClampU = 0x04,
        NoLod = 0x08,
        CubeTexture = 0x10,
        VolumeTexture = 0x20,
        TextureArray = 0x40,
    }
}

#[derive(Copy, Clone, FromPrimitive, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum VTexExtraData {
    Unknown = 0,
    FallbackBits = 1,
    Sheet = 2,
    FillToPowerOfTwo = 3,
    CompressedMipSize = 4,
    CubemapRadianceSH = 5,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct VTexHeaderRaw {
    version: u16,
    flags: u16,
    reflectivity: [f32; 4],
    width: u16,
    height: u16,
    depth: u16,
    format: u8,
    mip_count: u8,
    picmip: u32,
}

const VTEX_VERSION: u16 = 1;

/// The `DATA` block of a compiled texture.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureHeader {
    pub flags: FlagSet<VTexFlags>,
    pub reflectivity: [f32; 4],
    pub width: u16,
    pub height: u16,
    pub depth: u16,
    pub format: VTexFormat,
    pub mip_count: u8,
    pub picmip: u32,
    /// Side table entries other than the compressed mip sizes.
    pub extra_data: Vec<(VTexExtraData, Vec<u8>)>,
    /// Stored size of each mip level, largest first. Empty when mips are
    /// stored raw.
    pub compressed_mips: Vec<u32>,
    pub compressed: bool,
}

impl TextureHeader {
    pub fn read(reader: &mut ByteReader) -> Result<Self> {
        let start = reader.tell();
        let raw: VTexHeaderRaw = reader.read_pod()?;
        let version = raw.version;
        if version != VTEX_VERSION {
            return Err(Error::unsupported(format!("texture version {version}")));
        }
        let format_id = raw.format;
        let format = VTexFormat::from_u8(format_id)
            .ok_or_else(|| Error::unsupported(format!("texture format {format_id}")))?;
        let flags = FlagSet::<VTexFlags>::new_truncated(raw.flags);

        let mut header = Self {
            flags,
            reflectivity: raw.reflectivity,
            width: raw.width,
            height: raw.height,
            depth: raw.depth,
            format,
            mip_count: raw.mip_count,
            picmip: raw.picmip,
            extra_data: Vec::new(),
            compressed_mips: Vec::new(),
            compressed: false,
        };

        let table_field = reader.tell();
        let table_offset = reader.read_u32()? as usize;
        let count = reader.read_u32()?;
        if count > 0 {
            reader.seek_to(table_field + table_offset)?;
        }
        for _ in 0..count {
            let kind_id = reader.read_u32()?;
            let field = reader.tell();
            let offset = reader.read_u32()? as usize;
            let size = reader.read_u32()? as usize;
            let kind = VTexExtraData::from_u32(kind_id).unwrap_or(VTexExtraData::Unknown);

            reader.with_position(field + offset, |r| {
                if kind == VTexExtraData::CompressedMipSize {
                    header.read_compressed_mips(r)
                } else {
                    header.extra_data.push((kind, r.read(size)?));
                    Ok(())
                }
            })?;
        }
        log::debug!(
            "texture {}x{}x{} {:?} mips={} compressed={} at {start}",
            header.width,
            header.height,
            header.depth,
            header.format,
            header.mip_count,
            header.compressed
        );
        Ok(header)
    }

    fn read_compressed_mips(&mut self, r: &mut ByteReader) -> Result<()> {
        let at = r.tell();
        let mode = r.read_u32()?;
        let stride = r.read_u32()?;
        if mode > 1 || stride != 8 {
            return Err(Error::assertion(
                at,
                format!("compressed mip table header {mode}/{stride}"),
            ));
        }
        let mips = r.read_u32()? as usize;
        self.compressed = mode == 1;
        self.compressed_mips = (0..mips).map(|_| r.read_u32()).collect::<Result<_>>()?;
        Ok(())
    }

    pub fn is_cube(&self) -> bool {
        self.flags.contains(VTexFlags::CubeTexture)
    }

    /// Dimensions of `mip`, never below one pixel.
    pub fn mip_dimensions(&self, mip: u8) -> (usize, usize, usize) {
        let shrink = |v: u16| ((v as usize) >> mip).max(1);
        (shrink(self.width), shrink(self.height), shrink(self.depth))
    }

    /// Decoded byte size of one mip level. Block formats round each side up
    /// to whole blocks. Cube faces are not multiplied in.
    pub fn mip_buffer_size(&self, mip: u8) -> usize {
        let Some(bytes) = self.format.block_size() else {
            return 0;
        };
        let (width, height, mut depth) = self.mip_dimensions(mip);
        if !self.format.is_block_compressed() {
            return width * height * depth * bytes;
        }
        if depth > 1 && depth < 4 {
            depth = 4;
        }
        let (width, height) = (width.next_multiple_of(4), height.next_multiple_of(4));
        ((width * height) >> 4) * depth * bytes
    }

    /// Bytes of `mip`, decompressed if the mip table says so. Pixel data
    /// follows the `DATA` block, smallest mip first.
    pub fn read_mip(&self, resource: &CompiledResource, mip: u8) -> Result<Vec<u8>> {
        if mip >= self.mip_count.max(1) {
            return Err(Error::assertion(
                0,
                format!("mip {mip} requested from {} levels", self.mip_count),
            ));
        }
        let block = resource
            .get_block("DATA")
            .ok_or_else(|| Error::assertion(0, "resource has no DATA block"))?;
        let mut reader = resource.trailing_reader(block)?;

        let level = mip as usize;
        let uncompressed = self.mip_buffer_size(mip);
        let stored = if self.compressed {
            let sizes = &self.compressed_mips;
            let size = *sizes.get(level).ok_or_else(|| {
                Error::assertion(0, format!("no compressed size for mip {mip}"))
            })?;
            let skipped: u64 = sizes[level + 1..].iter().map(|s| *s as u64).sum();
            reader.skip(skipped as usize)?;
            size as usize
        } else {
            let skipped: usize = (mip + 1..self.mip_count)
                .map(|m| self.mip_buffer_size(m))
                .sum();
            reader.skip(skipped)?;
            uncompressed
        };

        if stored >= uncompressed {
            return reader.read(uncompressed);
        }
        let compressed = reader.read(stored)?;
        lz4::decompress(&compressed, uncompressed)
    }

    /// Decodes one mip to RGBA8. BC7 textures pick up the hemi-octahedral
    /// hint from the resource's edit info.
    pub fn read_image(
        &self,
        resource: &CompiledResource,
        options: ImageOptions,
        decoder: Option<&dyn BlockDecoder>,
    ) -> Result<DecodedImage> {
        let data = self.read_mip(resource, options.mip)?;
        let (width, height, _) = self.mip_dimensions(options.mip);

        let hints = DecodeHints {
            hemi_oct_rb: self.format == VTexFormat::BC7
                && resource
                    .edit_info()?
                    .is_some_and(|info| info.is_hemi_oct_roughness()),
        };
        let mut rgba = pixels::decode(self.format, &data, width, height, hints, decoder)?;
        if options.flip {
            pixels::flip_rows(&mut rgba, width);
        }
        Ok(DecodedImage {
            width,
            height,
            rgba,
        })
    }
}

#[cfg(test)]
mod texture_tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::resource::redi::{redi_tests::redi_block, HEMI_OCT_COMPILER, HEMI_OCT_SETTING};
    use crate::resource::resource_tests::build_resource;

    fn header(format: VTexFormat, width: u16, height: u16, mips: u8) -> Vec<u8> {
        let raw = VTexHeaderRaw {
            version: 1,
            flags: 0,
            reflectivity: [0.5; 4],
            width,
            height,
            depth: 1,
            format: format as u8,
            mip_count: mips,
            picmip: 0,
        };
        let mut out = bytemuck::bytes_of(&raw).to_vec();
        out.extend_from_slice(&[0; 8]);
        out
    }

    /// Appends a compressed mip side table to a header built by [`header`].
    fn with_mip_table(mut data: Vec<u8>, compressed: bool, sizes: &[u32]) -> Vec<u8> {
        let table_field = data.len() - 8;
        let entry = data.len();
        data[table_field..table_field + 4].copy_from_slice(&((entry - table_field) as u32).to_le_bytes());
        data[table_field + 4..table_field + 8].copy_from_slice(&1u32.to_le_bytes());

        let body = entry + 12;
        data.extend_from_slice(&(VTexExtraData::CompressedMipSize as u32).to_le_bytes());
        data.extend_from_slice(&((body - (entry + 4)) as u32).to_le_bytes());
        data.extend_from_slice(&((12 + sizes.len() * 4) as u32).to_le_bytes());
        data.extend_from_slice(&(compressed as u32).to_le_bytes());
        data.extend_from_slice(&8u32.to_le_bytes());
        data.extend_from_slice(&(sizes.len() as u32).to_le_bytes());
        for s in sizes {
            data.extend_from_slice(&s.to_le_bytes());
        }
        data
    }

    #[test]
    fn header_fields() {
        let file = build_resource(&[("DATA", header(VTexFormat::DXT1, 64, 32, 7))], &[]);
        let resource = CompiledResource::parse(file).unwrap();
        let tex = resource.texture().unwrap();
        assert_eq!(tex.format, VTexFormat::DXT1);
        assert_eq!((tex.width, tex.height, tex.mip_count), (64, 32, 7));
        assert_eq!(tex.reflectivity, [0.5; 4]);
        assert!(!tex.compressed);
        assert!(!tex.is_cube());
    }

    #[test]
    fn bad_version_and_format() {
        let mut data = header(VTexFormat::DXT1, 4, 4, 1);
        data[0] = 2;
        assert!(TextureHeader::read(&mut ByteReader::from_vec(data)).is_err());
        let mut data = header(VTexFormat::DXT1, 4, 4, 1);
        data[26] = 200;
        assert!(matches!(
            TextureHeader::read(&mut ByteReader::from_vec(data)),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn buffer_sizes() {
        let data = header(VTexFormat::DXT1, 64, 32, 7);
        let tex = TextureHeader::read(&mut ByteReader::from_vec(data)).unwrap();
        assert_eq!(tex.mip_buffer_size(0), 16 * 8 * 8);
        // 2x1 rounds up to a single block
        assert_eq!(tex.mip_buffer_size(5), 8);
        assert_eq!(tex.mip_buffer_size(6), 8);

        let data = header(VTexFormat::RGBA8888, 8, 4, 3);
        let tex = TextureHeader::read(&mut ByteReader::from_vec(data)).unwrap();
        assert_eq!(tex.mip_buffer_size(0), 128);
        assert_eq!(tex.mip_buffer_size(2), 2 * 1 * 4);
        assert_eq!(tex.mip_dimensions(3), (1, 1, 1));
    }

    #[test]
    fn raw_mips_skip_smaller_levels() {
        // mips stored smallest first: 1x1 (4 bytes), 2x2 (16 bytes)
        let mut pixels = vec![9u8; 4];
        pixels.extend_from_slice(&[1, 2, 3, 4].repeat(4));
        let file = build_resource(&[("DATA", header(VTexFormat::RGBA8888, 2, 2, 2))], &pixels);
        let resource = CompiledResource::parse(file).unwrap();
        let tex = resource.texture().unwrap();
        assert_eq!(tex.read_mip(&resource, 1).unwrap(), [9; 4]);
        assert_eq!(tex.read_mip(&resource, 0).unwrap(), [1, 2, 3, 4].repeat(4));
        assert!(tex.read_mip(&resource, 2).is_err());

        let image = tex
            .read_image(&resource, ImageOptions { flip: true, mip: 0 }, None)
            .unwrap();
        assert_eq!((image.width, image.height), (2, 2));
        assert_eq!(image.rgba, [1, 2, 3, 4].repeat(4));
    }

    #[test]
    fn compressed_mips() {
        let level0 = [5u8, 6, 7, 8].repeat(64);
        let packed0 = lz4_flex::block::compress(&level0);
        assert!(packed0.len() < level0.len());
        // stored at full size, so read as is
        let level1 = vec![1u8; 64];

        let data = with_mip_table(
            header(VTexFormat::RGBA8888, 8, 8, 2),
            true,
            &[packed0.len() as u32, 64],
        );
        let mut pixels = level1.clone();
        pixels.extend_from_slice(&packed0);
        let file = build_resource(&[("DATA", data)], &pixels);
        let resource = CompiledResource::parse(file).unwrap();
        let tex = resource.texture().unwrap();
        assert!(tex.compressed);
        assert_eq!(tex.compressed_mips, [packed0.len() as u32, 64]);
        assert_eq!(tex.read_mip(&resource, 0).unwrap(), level0);
        assert_eq!(tex.read_mip(&resource, 1).unwrap(), level1);
    }

    #[test]
    fn bad_mip_table() {
        let mut data = with_mip_table(header(VTexFormat::RGBA8888, 2, 2, 1), true, &[16]);
        let stride_at = data.len() - 12;
        data[stride_at..stride_at + 4].copy_from_slice(&4u32.to_le_bytes());
        assert!(matches!(
            TextureHeader::read(&mut ByteReader::from_vec(data)),
            Err(Error::Assertion { .. })
        ));
    }

    struct Marker;

    impl BlockDecoder for Marker {
        fn decode(
            &self,
            _format: VTexFormat,
            _data: &[u8],
            width: usize,
            height: usize,
            hints: DecodeHints,
        ) -> Result<Vec<u8>> {
            Ok([hints.hemi_oct_rb as u8; 4].repeat(width * height))
        }
    }

    #[test]
    fn bc7_hemi_oct_hint() {
        let redi = redi_block(HEMI_OCT_COMPILER, HEMI_OCT_SETTING);
        let file = build_resource(
            &[("REDI", redi), ("DATA", header(VTexFormat::BC7, 4, 4, 1))],
            &[0; 16],
        );
        let resource = CompiledResource::parse(file).unwrap();
        let tex = resource.texture().unwrap();
        let image = tex
            .read_image(&resource, ImageOptions::default(), Some(&Marker))
            .unwrap();
        assert_eq!(image.rgba, [1u8; 64]);

        let file = build_resource(&[("DATA", header(VTexFormat::BC7, 4, 4, 1))], &[0; 16]);
        let resource = CompiledResource::parse(file).unwrap();
        let image = resource
            .texture()
            .unwrap()
            .read_image(&resource, ImageOptions::default(), Some(&Marker))
            .unwrap();
        assert_eq!(image.rgba, [0u8; 64]);
    }
}
