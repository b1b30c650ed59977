use glam::Vec3;

use common::prelude::*;

use super::{consts::LumpType, header::BSPEngine, BSPFile, LumpData};

pub const STATIC_PROP_LUMP_ID: [u8; 4] = *b"sprp";
pub const STATIC_PROP_NAME_LENGTH: usize = 128;
const GAMELUMP_COMPRESSED: u16 = 0x0001;

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GameLumpEntry {
    /// Stored as a little-endian integer, so the bytes are reversed on disk.
    pub id: [u8; 4],
    pub flags: u16,
    pub version: u16,
    /// Offset from the start of the bsp file.
    pub file_ofs: i32,
    pub file_len: i32,
}

impl GameLumpEntry {
    /// The four character code in reading order, e.g. `sprp`.
    pub fn code(&self) -> [u8; 4] {
        let mut id = self.id;
        id.reverse();
        id
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.code()).into_owned()
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & GAMELUMP_COMPRESSED != 0
    }
}

/// Directory of the game-specific lumps stored inside lump 35.
#[derive(Debug, Clone)]
pub struct BSPGameLump {
    pub entries: Vec<GameLumpEntry>,
    file: ByteReader,
}

impl BSPGameLump {
    pub fn find(&self, code: [u8; 4]) -> Option<&GameLumpEntry> {
        self.entries.iter().find(|e| e.code() == code)
    }

    pub fn entry_reader(&self, entry: &GameLumpEntry) -> Result<ByteReader> {
        if entry.is_compressed() {
            return Err(Error::unsupported(format!(
                "compressed game lump {}",
                entry.name()
            )));
        }
        let (ofs, len) = (entry.file_ofs, entry.file_len);
        if ofs < 0 || len < 0 {
            return Err(Error::assertion(
                0,
                format!("game lump {} spans {ofs}+{len}", entry.name()),
            ));
        }
        self.file.slice(ofs as usize, len as usize)
    }

    /// Static props, if the map has any.
    pub fn static_props(&self) -> Result<Option<StaticPropLump>> {
        let Some(entry) = self.find(STATIC_PROP_LUMP_ID) else {
            return Ok(None);
        };
        let mut reader = self.entry_reader(entry)?;
        StaticPropLump::read(&mut reader, entry.version).map(Some)
    }
}

impl LumpData for BSPGameLump {
    fn lump_id(engine: BSPEngine) -> Option<usize> {
        (engine == BSPEngine::Source).then_some(LumpType::GameLump as usize)
    }

    fn parse(bsp: &BSPFile, id: usize) -> Result<Self> {
        let mut reader = bsp.lump_reader(id)?;
        if reader.is_empty() {
            return Ok(Self {
                entries: Vec::new(),
                file: bsp.file_reader(),
            });
        }
        let count = reader.read_i32()?;
        let entries: Vec<GameLumpEntry> = reader.read_pod_slice(count.max(0) as usize)?;
        for e in &entries {
            let version = e.version;
            log::debug!("game lump {} version {version}", e.name());
        }
        Ok(Self {
            entries,
            file: bsp.file_reader(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticProp {
    pub origin: Vec3,
    pub angles: Vec3,
    /// Index into the model dictionary.
    pub prop_type: u16,
    pub first_leaf: u16,
    pub leaf_count: u16,
    pub solid: u8,
    pub flags: u8,
    pub skin: i32,
    pub fade_min_dist: f32,
    pub fade_max_dist: f32,
    pub lighting_origin: Vec3,
    pub forced_fade_scale: f32,
    pub min_dx_level: u16,
    pub max_dx_level: u16,
    pub min_cpu_level: u8,
    pub max_cpu_level: u8,
    pub min_gpu_level: u8,
    pub max_gpu_level: u8,
    pub diffuse_modulation: [u8; 4],
    pub disable_x360: bool,
    pub flags_ex: u32,
    pub uniform_scale: f32,
}

/// Record size of each supported static prop version.
pub fn static_prop_size(version: u16) -> Option<usize> {
    Some(match version {
        4 => 56,
        5 => 60,
        6 => 64,
        7 | 8 => 68,
        9 => 72,
        10 => 76,
        11 => 80,
        _ => return None,
    })
}

impl StaticProp {
    pub fn read(reader: &mut ByteReader, version: u16) -> Result<Self> {
        let mut prop = StaticProp {
            origin: reader.read_vec3()?,
            angles: reader.read_vec3()?,
            prop_type: reader.read_u16()?,
            first_leaf: reader.read_u16()?,
            leaf_count: reader.read_u16()?,
            solid: reader.read_u8()?,
            flags: reader.read_u8()?,
            skin: reader.read_i32()?,
            fade_min_dist: reader.read_f32()?,
            fade_max_dist: reader.read_f32()?,
            lighting_origin: reader.read_vec3()?,
            uniform_scale: 1.0,
            ..Default::default()
        };
        if version >= 5 {
            prop.forced_fade_scale = reader.read_f32()?;
        }
        if version == 6 || version == 7 {
            prop.min_dx_level = reader.read_u16()?;
            prop.max_dx_level = reader.read_u16()?;
        }
        if version >= 8 {
            prop.min_cpu_level = reader.read_u8()?;
            prop.max_cpu_level = reader.read_u8()?;
            prop.min_gpu_level = reader.read_u8()?;
            prop.max_gpu_level = reader.read_u8()?;
        }
        if version >= 7 {
            prop.diffuse_modulation = reader.read_array()?;
        }
        if version >= 9 {
            prop.disable_x360 = reader.read_u8()? != 0;
            reader.skip(3)?;
        }
        if version >= 10 {
            prop.flags_ex = reader.read_u32()?;
        }
        if version >= 11 {
            prop.uniform_scale = reader.read_f32()?;
        }
        Ok(prop)
    }
}

/// Contents of the `sprp` game lump.
#[derive(Debug, Clone, Default)]
pub struct StaticPropLump {
    pub version: u16,
    pub model_names: Vec<String>,
    pub leaves: Vec<u16>,
    pub props: Vec<StaticProp>,
}

impl StaticPropLump {
    pub fn read(reader: &mut ByteReader, version: u16) -> Result<Self> {
        let Some(size) = static_prop_size(version) else {
            return Err(Error::unsupported(format!("static prop lump version {version}")));
        };

        let dict_count = reader.read_i32()?.max(0) as usize;
        let model_names = (0..dict_count)
            .map(|_| reader.read_fixed_string(STATIC_PROP_NAME_LENGTH))
            .collect::<Result<Vec<_>>>()?;

        let leaf_count = reader.read_i32()?.max(0) as usize;
        let leaves = reader.read_pod_slice::<u16>(leaf_count)?;

        let prop_count = reader.read_i32()?.max(0) as usize;
        let mut stride = size;
        if prop_count > 0 && reader.remaining() != prop_count * size {
            stride = reader.remaining() / prop_count;
            log::warn!(
                "{prop_count} version {version} static props in {} bytes, using a {stride} byte stride",
                reader.remaining()
            );
        }

        let mut props = Vec::with_capacity(prop_count);
        for _ in 0..prop_count {
            let mut record = reader.read_reader(stride)?;
            let prop = StaticProp::read(&mut record, version)?;
            if prop.prop_type as usize >= model_names.len() {
                return Err(Error::assertion(
                    reader.tell(),
                    format!(
                        "static prop model {} outside a {} name dictionary",
                        prop.prop_type,
                        model_names.len()
                    ),
                ));
            }
            props.push(prop);
        }

        Ok(Self {
            version,
            model_names,
            leaves,
            props,
        })
    }

    pub fn model_name(&self, prop: &StaticProp) -> Option<&str> {
        self.model_names.get(prop.prop_type as usize).map(String::as_str)
    }
}

#[cfg(test)]
mod gamelump_tests {
    use super::*;

    fn sprp_body(version: u16, stride: usize) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&2i32.to_le_bytes());
        for name in ["models/props/crate.mdl", "models/props/barrel.mdl"] {
            let mut fixed = [0u8; STATIC_PROP_NAME_LENGTH];
            fixed[..name.len()].copy_from_slice(name.as_bytes());
            out.extend_from_slice(&fixed);
        }
        out.extend_from_slice(&1i32.to_le_bytes());
        out.extend_from_slice(&7u16.to_le_bytes());
        out.extend_from_slice(&1i32.to_le_bytes());

        let start = out.len();
        for v in [16.0f32, 32.0, 48.0, 0.0, 90.0, 0.0] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&1u16.to_le_bytes()); // prop_type
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.push(6); // solid
        out.push(0);
        out.extend_from_slice(&3i32.to_le_bytes());
        for v in [100.0f32, 900.0, 16.0, 32.0, 64.0] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        if version >= 5 {
            out.extend_from_slice(&1.0f32.to_le_bytes());
        }
        if version >= 8 {
            out.extend_from_slice(&[1, 2, 3, 4]);
            out.extend_from_slice(&[255, 128, 64, 255]);
        }
        if version >= 9 {
            out.extend_from_slice(&[1, 0, 0, 0]);
        }
        if version >= 10 {
            out.extend_from_slice(&4u32.to_le_bytes());
        }
        if version >= 11 {
            out.extend_from_slice(&2.5f32.to_le_bytes());
        }
        out.resize(start + stride, 0);
        out
    }

    #[test]
    fn record_sizes() {
        assert_eq!(std::mem::size_of::<GameLumpEntry>(), 16);
        assert_eq!(static_prop_size(8), Some(68));
        assert_eq!(static_prop_size(12), None);
    }

    #[test]
    fn reversed_codes() {
        let entry = GameLumpEntry {
            id: *b"prps",
            flags: 0,
            version: 10,
            file_ofs: 0,
            file_len: 0,
        };
        assert_eq!(entry.code(), STATIC_PROP_LUMP_ID);
        assert_eq!(entry.name(), "sprp");
    }

    #[test]
    fn reads_v4_props() {
        let mut reader = ByteReader::from_vec(sprp_body(4, 56));
        let lump = StaticPropLump::read(&mut reader, 4).unwrap();
        assert_eq!(lump.leaves, [7]);
        let prop = &lump.props[0];
        assert_eq!(prop.origin, Vec3::new(16.0, 32.0, 48.0));
        assert_eq!(prop.angles, Vec3::new(0.0, 90.0, 0.0));
        assert_eq!(prop.solid, 6);
        assert_eq!(prop.skin, 3);
        assert_eq!(prop.lighting_origin, Vec3::new(16.0, 32.0, 64.0));
        assert_eq!(prop.uniform_scale, 1.0);
        assert_eq!(lump.model_name(prop), Some("models/props/barrel.mdl"));
    }

    #[test]
    fn reads_v11_props() {
        let mut reader = ByteReader::from_vec(sprp_body(11, 80));
        let lump = StaticPropLump::read(&mut reader, 11).unwrap();
        let prop = &lump.props[0];
        assert_eq!(
            (prop.min_cpu_level, prop.max_cpu_level, prop.min_gpu_level, prop.max_gpu_level),
            (1, 2, 3, 4)
        );
        assert_eq!(prop.diffuse_modulation, [255, 128, 64, 255]);
        assert!(prop.disable_x360);
        assert_eq!(prop.flags_ex, 4);
        assert_eq!(prop.uniform_scale, 2.5);
    }

    #[test]
    fn odd_stride_is_tolerated() {
        // a v10 lump padded out to 80 bytes per prop
        let mut reader = ByteReader::from_vec(sprp_body(10, 80));
        let lump = StaticPropLump::read(&mut reader, 10).unwrap();
        assert_eq!(lump.props.len(), 1);
        assert_eq!(lump.props[0].flags_ex, 4);
    }

    #[test]
    fn unknown_version() {
        let mut reader = ByteReader::from_vec(sprp_body(4, 56));
        assert!(matches!(
            StaticPropLump::read(&mut reader, 3),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
