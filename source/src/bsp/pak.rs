use std::io::Read;

use flate2::read::DeflateDecoder;
use indexmap::IndexMap;
use stream_unzip::ZipReader;

use common::prelude::*;

use super::{consts::LumpType, header::BSPEngine, BSPFile, LumpData};
use crate::vpk::VPK_CRC;

const ZIP_STORED: u16 = 0;
const ZIP_DEFLATED: u16 = 8;

/// A file embedded in the map's pakfile.
#[derive(Debug, Clone)]
pub struct PakEntry {
    pub filename: String,
    pub crc: u32,
    pub data: Vec<u8>,
}

/// The zip archive stored in the pakfile lump, keyed by normalised path.
#[derive(Debug, Default)]
pub struct PakLump {
    entries: IndexMap<String, PakEntry>,
}

pub(crate) fn normalize_pak_path(path: &str) -> String {
    path.replace('\\', "/")
        .trim_matches('/')
        .to_ascii_lowercase()
}

impl PakLump {
    pub fn from_zip(data: Vec<u8>) -> Result<Self> {
        let mut zip_reader = ZipReader::default();
        zip_reader.update(data.into());
        zip_reader.finish();

        let mut entries = IndexMap::new();
        for e in zip_reader.drain_entries() {
            let header = e.header();
            let expected = header.uncompressed_size as usize;
            let compressed = e.compressed_data();

            let data = match header.compression {
                ZIP_STORED => compressed.to_vec(),
                ZIP_DEFLATED => {
                    let mut out = Vec::with_capacity(expected);
                    DeflateDecoder::new(&compressed[..])
                        .read_to_end(&mut out)
                        .map_err(|err| Error::decompression("deflate", err.to_string()))?;
                    out
                }
                method => {
                    return Err(Error::unsupported(format!(
                        "pakfile entry {} uses zip method {method}",
                        header.filename
                    )))
                }
            };
            if data.len() != expected {
                return Err(Error::decompression(
                    "zip",
                    format!(
                        "{} holds {} bytes, header says {expected}",
                        header.filename,
                        data.len()
                    ),
                ));
            }

            let crc = header.crc32;
            if VPK_CRC.checksum(&data) != crc {
                return Err(Error::assertion(
                    0,
                    format!("pakfile entry {} fails its crc check", header.filename),
                ));
            }

            let key = normalize_pak_path(&header.filename);
            if key.is_empty() || key.ends_with('/') {
                continue;
            }
            entries.insert(
                key,
                PakEntry {
                    filename: header.filename.clone(),
                    crc,
                    data,
                },
            );
        }
        log::debug!("pakfile holds {} entries", entries.len());
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &PakEntry> {
        self.entries.values()
    }

    pub fn find_entry(&self, path: &str) -> Option<&PakEntry> {
        self.entries.get(&normalize_pak_path(path))
    }

    /// Case-insensitive lookup; either slash style works.
    pub fn find_file(&self, path: &str) -> Option<&[u8]> {
        self.find_entry(path).map(|e| e.data.as_slice())
    }
}

impl LumpData for PakLump {
    fn lump_id(engine: BSPEngine) -> Option<usize> {
        (engine == BSPEngine::Source).then_some(LumpType::PakFile as usize)
    }

    fn parse(bsp: &BSPFile, id: usize) -> Result<Self> {
        let data = bsp.lump_reader(id)?;
        if data.is_empty() {
            return Ok(Self::default());
        }
        Self::from_zip(data.as_slice().to_vec())
    }
}

#[cfg(test)]
pub(crate) mod pak_tests {
    use std::io::Write;

    use flate2::{write::DeflateEncoder, Compression};

    use super::*;

    fn put16(out: &mut Vec<u8>, v: u16) {
        out.extend_from_slice(&v.to_le_bytes());
    }

    fn put32(out: &mut Vec<u8>, v: u32) {
        out.extend_from_slice(&v.to_le_bytes());
    }

    /// Builds a zip archive, deflating entries when `deflate` is set.
    pub(crate) fn build_zip(files: &[(&str, &[u8], bool)]) -> Vec<u8> {
        let files = files
            .iter()
            .map(|&(name, data, deflate)| (name, data, if deflate { ZIP_DEFLATED } else { ZIP_STORED }))
            .collect::<Vec<_>>();
        build_zip_with_methods(&files)
    }

    /// Entries with method 8 are deflated; any other method stores the bytes
    /// as given under that method number.
    fn build_zip_with_methods(files: &[(&str, &[u8], u16)]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut central = Vec::new();
        for &(name, data, method) in files {
            let crc = VPK_CRC.checksum(data);
            let body = if method == ZIP_DEFLATED {
                let mut enc = DeflateEncoder::new(Vec::new(), Compression::best());
                enc.write_all(data).unwrap();
                enc.finish().unwrap()
            } else {
                data.to_vec()
            };
            let local_offset = out.len() as u32;

            put32(&mut out, 0x0403_4b50);
            put16(&mut out, 20);
            put16(&mut out, 0);
            put16(&mut out, method);
            put16(&mut out, 0);
            put16(&mut out, 0);
            put32(&mut out, crc);
            put32(&mut out, body.len() as u32);
            put32(&mut out, data.len() as u32);
            put16(&mut out, name.len() as u16);
            put16(&mut out, 0);
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(&body);

            put32(&mut central, 0x0201_4b50);
            put16(&mut central, 20);
            put16(&mut central, 20);
            put16(&mut central, 0);
            put16(&mut central, method);
            put16(&mut central, 0);
            put16(&mut central, 0);
            put32(&mut central, crc);
            put32(&mut central, body.len() as u32);
            put32(&mut central, data.len() as u32);
            put16(&mut central, name.len() as u16);
            put16(&mut central, 0);
            put16(&mut central, 0);
            put16(&mut central, 0);
            put16(&mut central, 0);
            put32(&mut central, 0);
            put32(&mut central, local_offset);
            central.extend_from_slice(name.as_bytes());
        }
        let central_offset = out.len() as u32;
        out.extend_from_slice(&central);
        put32(&mut out, 0x0605_4b50);
        put16(&mut out, 0);
        put16(&mut out, 0);
        put16(&mut out, files.len() as u16);
        put16(&mut out, files.len() as u16);
        put32(&mut out, central.len() as u32);
        put32(&mut out, central_offset);
        put16(&mut out, 0);
        out
    }

    #[test]
    fn reads_stored_and_deflated_entries() {
        let vmt = b"LightmappedGeneric { $basetexture \"brick/wall01\" }".repeat(4);
        let zip = build_zip(&[
            ("materials/maps/test/cubemap.vtf", b"VTF\0raw bytes", false),
            ("materials/Brick/Wall01.vmt", &vmt, true),
        ]);
        let pak = PakLump::from_zip(zip).unwrap();

        assert_eq!(pak.len(), 2);
        assert_eq!(
            pak.find_file("materials/maps/test/cubemap.vtf"),
            Some(&b"VTF\0raw bytes"[..])
        );
        assert_eq!(pak.find_file("\\MATERIALS\\brick\\wall01.vmt"), Some(&vmt[..]));
        assert_eq!(
            pak.find_entry("materials/brick/wall01.vmt").unwrap().filename,
            "materials/Brick/Wall01.vmt"
        );
        assert!(pak.find_file("materials/brick/wall02.vmt").is_none());
    }

    #[test]
    fn method_decides_decoding() {
        // stored bytes that happen to be a valid deflate stream stay raw
        let mut deflated = DeflateEncoder::new(Vec::new(), Compression::best());
        deflated.write_all(b"hello hello hello").unwrap();
        let deflated = deflated.finish().unwrap();
        let zip = build_zip_with_methods(&[
            ("scripts/stored.bin", &deflated, ZIP_STORED),
            ("scripts/deflated.txt", b"hello hello hello", ZIP_DEFLATED),
        ]);
        let pak = PakLump::from_zip(zip).unwrap();
        assert_eq!(pak.find_file("scripts/stored.bin"), Some(&deflated[..]));
        assert_eq!(pak.find_file("scripts/deflated.txt"), Some(&b"hello hello hello"[..]));
    }

    #[test]
    fn rejects_unknown_methods() {
        let zip = build_zip_with_methods(&[("maps/test.nav", b"lzma payload", 14)]);
        assert!(matches!(PakLump::from_zip(zip), Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn rejects_crc_mismatch() {
        let mut zip = build_zip(&[("scripts/game.txt", b"original text", false)]);
        let at = zip
            .windows(8)
            .position(|w| w == b"original")
            .unwrap();
        zip[at] = b'O';
        assert!(matches!(PakLump::from_zip(zip), Err(Error::Assertion { .. })));
    }

    #[test]
    fn path_normalisation() {
        assert_eq!(normalize_pak_path("/Models\\Props/Crate.MDL/"), "models/props/crate.mdl");
    }
}
