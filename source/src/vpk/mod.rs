//! Valve Pack archives: a `_dir.vpk` index plus numbered `_NNN.vpk` parts.
//!
//! <https://developer.valvesoftware.com/wiki/VPK_(file_format)#Tree>

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use ahash::AHashMap;
use crc::{Crc, CRC_32_ISO_HDLC};
use indexmap::IndexMap;
use md5::{Digest, Md5};

use common::prelude::*;

pub const VPK_SIGNATURE: u32 = 0x55AA_1234;
pub const VPK_TERMINATOR: u16 = 0xFFFF;
/// Archive index meaning the data follows the directory tree in the dir file.
pub const DIR_ARCHIVE_INDEX: u16 = 0x7FFF;

pub(crate) const VPK_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VPKHeaderV1 {
    pub signature: u32,
    pub version: u32,
    // size in bytes of the directory tree
    pub tree_size: u32,
}

/// Fields version 2 adds after the v1 header.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VPKHeaderV2Ext {
    // bytes of file content stored in the dir file itself
    pub file_data_section_size: u32,
    pub archive_md5_section_size: u32,
    // should always be 48
    pub other_md5_section_size: u32,
    pub signature_section_size: u32,
}

#[derive(Copy, Clone, Debug)]
pub struct VPKHeader {
    pub version: u32,
    pub tree_size: u32,
    pub v2: VPKHeaderV2Ext,
}

impl VPKHeader {
    pub fn read(reader: &mut ByteReader) -> Result<Self> {
        let v1: VPKHeaderV1 = reader.read_pod()?;
        let (signature, version, tree_size) = (v1.signature, v1.version, v1.tree_size);
        if signature != VPK_SIGNATURE {
            return Err(Error::unsupported(format!("vpk signature {signature:#010x}")));
        }
        let v2 = match version {
            1 => VPKHeaderV2Ext::default(),
            2 => reader.read_pod()?,
            v => return Err(Error::unsupported(format!("vpk version {v}"))),
        };
        Ok(Self {
            version,
            tree_size,
            v2,
        })
    }

    pub fn size(&self) -> usize {
        match self.version {
            1 => 12,
            _ => 28,
        }
    }

    /// Offset of the embedded file data section within the dir file.
    pub fn data_offset(&self) -> usize {
        self.size() + self.tree_size as usize
    }
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VPKDirectoryEntry {
    pub crc: u32,
    pub preload_bytes: u16,
    // zero based archive index, or 0x7fff when stored after the tree
    pub archive_index: u16,
    pub entry_offset: u32,
    // zero when the whole file sits in the preload data
    pub entry_length: u32,
    pub terminator: u16,
}

#[derive(Debug, Clone)]
pub struct VPKFile {
    entry: VPKDirectoryEntry,
    preload: Option<Vec<u8>>,
}

impl VPKFile {
    pub fn crc(&self) -> u32 {
        self.entry.crc
    }

    pub fn archive_index(&self) -> u16 {
        self.entry.archive_index
    }

    pub fn offset(&self) -> u32 {
        self.entry.entry_offset
    }

    pub fn length(&self) -> u32 {
        self.entry.entry_length
    }

    pub fn preload(&self) -> &[u8] {
        self.preload.as_deref().unwrap_or_default()
    }

    pub fn is_in_dir_file(&self) -> bool {
        self.archive_index() == DIR_ARCHIVE_INDEX
    }

    /// Total size once preload and archive bytes are joined.
    pub fn size(&self) -> usize {
        self.preload().len() + self.length() as usize
    }

    pub fn verify_crc(&self, data: &[u8]) -> bool {
        VPK_CRC.checksum(data) == self.crc()
    }
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ArchiveMD5Entry {
    pub archive_id: u32,
    pub offset: u32,
    pub size: u32,
    pub checksum: [u8; 16],
}

pub struct VPKDirectory {
    dir_path: PathBuf,
    header: VPKHeader,
    data: ByteReader,
    files: IndexMap<String, VPKFile>,
    archive_md5: Vec<ArchiveMD5Entry>,
    max_pack_file: Option<u16>,
    archives: Mutex<AHashMap<u16, File>>,
}

impl std::fmt::Debug for VPKDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VPKDirectory")
            .field("dir_path", &self.dir_path)
            .field("header", &self.header)
            .field("files", &self.files.len())
            .finish()
    }
}

impl VPKDirectory {
    pub fn load(dir_path: impl AsRef<Path>) -> Result<Self> {
        let dir_path = dir_path.as_ref();
        let data = std::fs::read(dir_path)?;
        Self::from_bytes(dir_path, data)
    }

    /// Parse a dir file already in memory. `dir_path` is only used to locate
    /// the numbered archive parts.
    pub fn from_bytes(dir_path: impl Into<PathBuf>, data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let dir_path = dir_path.into();
        let mut reader = ByteReader::new(data);
        let header = VPKHeader::read(&mut reader)?;

        let mut files = IndexMap::new();
        let mut max_pack_file = None;

        loop {
            let ext = reader.read_cstring()?;
            if ext.is_empty() {
                break;
            }
            loop {
                let dir = reader.read_cstring()?;
                if dir.is_empty() {
                    break;
                }
                loop {
                    let filename = reader.read_cstring()?;
                    if filename.is_empty() {
                        break;
                    }
                    let path = normalize_path(&VSplitPath::new(&dir, &filename, ext.trim()).full());

                    let entry_offset = reader.tell();
                    let entry: VPKDirectoryEntry = reader.read_pod()?;
                    let terminator = entry.terminator;
                    if terminator != VPK_TERMINATOR {
                        return Err(Error::assertion(
                            entry_offset,
                            format!("entry {path:?} terminator {terminator:#06x}"),
                        ));
                    }

                    let archive_index = entry.archive_index;
                    if archive_index != DIR_ARCHIVE_INDEX {
                        max_pack_file = max_pack_file.max(Some(archive_index));
                    }

                    let preload = match entry.preload_bytes {
                        0 => None,
                        n => Some(reader.read(n as usize)?),
                    };

                    if files.insert(path.clone(), VPKFile { entry, preload }).is_some() {
                        log::warn!("duplicate vpk entry {path:?}, keeping the last one");
                    }
                }
            }
        }

        let mut archive_md5 = Vec::new();
        let md5_size = header.v2.archive_md5_section_size as usize;
        if md5_size > 0 {
            let offset = header.data_offset() + header.v2.file_data_section_size as usize;
            let count = md5_size / std::mem::size_of::<ArchiveMD5Entry>();
            archive_md5 = reader.with_position(offset, |r| r.read_pod_slice(count))?;
        }

        log::debug!(
            "vpk v{} {:?}: {} files, {} archive parts",
            header.version,
            dir_path,
            files.len(),
            max_pack_file.map_or(0, |m| m as usize + 1),
        );

        Ok(Self {
            dir_path,
            header,
            data: reader,
            files,
            archive_md5,
            max_pack_file,
            archives: Mutex::new(AHashMap::new()),
        })
    }

    pub fn header(&self) -> &VPKHeader {
        &self.header
    }

    pub fn dir_path(&self) -> &Path {
        &self.dir_path
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Entries in directory order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &VPKFile)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn max_pack_file(&self) -> Option<u16> {
        self.max_pack_file
    }

    pub fn find_entry(&self, path: &str) -> Option<&VPKFile> {
        self.files.get(&normalize_path(path))
    }

    /// Preload bytes followed by the archive bytes, or `None` when the path is
    /// not in this archive.
    pub fn find_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.find_entry(path) {
            Some(file) => self.read_file(file).map(Some),
            None => Ok(None),
        }
    }

    pub fn read_file(&self, file: &VPKFile) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(file.size());
        out.extend_from_slice(file.preload());
        if file.length() > 0 {
            let data = self.read_range(file.archive_index(), file.offset(), file.length())?;
            out.extend_from_slice(&data);
        }
        Ok(out)
    }

    /// Name of archive part `index`, next to the dir file.
    pub fn archive_path(&self, index: u16) -> PathBuf {
        let stem = self
            .dir_path
            .file_stem()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default();
        let base = stem.strip_suffix("_dir").unwrap_or(&stem);
        self.dir_path.with_file_name(format!("{base}_{index:03}.vpk"))
    }

    fn read_range(&self, archive_index: u16, offset: u32, length: u32) -> Result<Vec<u8>> {
        if archive_index == DIR_ARCHIVE_INDEX {
            return self
                .data
                .slice(self.header.data_offset() + offset as usize, length as usize)
                .map(|mut r| r.read_to_end());
        }

        let mut archives = self.archives.lock().unwrap_or_else(|e| e.into_inner());
        let file = match archives.entry(archive_index) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                let path = self.archive_path(archive_index);
                log::debug!("opening vpk part {path:?}");
                e.insert(File::open(path)?)
            }
        };
        file.seek(SeekFrom::Start(offset as u64))?;
        let mut buf = vec![0; length as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn archive_md5_entries(&self) -> &[ArchiveMD5Entry] {
        &self.archive_md5
    }

    /// Hash the archive range an MD5 entry covers and compare.
    pub fn verify_archive_md5(&self, entry: &ArchiveMD5Entry) -> Result<bool> {
        let (archive_id, offset, size) = (entry.archive_id, entry.offset, entry.size);
        let archive_index = u16::try_from(archive_id)
            .map_err(|_| Error::unsupported(format!("vpk archive id {archive_id}")))?;
        let data = self.read_range(archive_index, offset, size)?;
        let checksum = entry.checksum;
        Ok(Md5::digest(&data).as_slice() == checksum)
    }
}
