//! Where asset bytes come from: VPK archives, map pakfiles, loose
//! directories and in-memory file tables, searched in mount order.

use std::{
    io,
    path::{Path, PathBuf},
};

use ini::Ini;

use common::prelude::*;

use crate::{bsp::pak::PakLump, vpk::VPKDirectory};

pub const MOUNT_SECTION: &str = "mount";

pub trait ContentProvider: Send + Sync {
    /// Label used in logs.
    fn name(&self) -> String;

    /// `Ok(None)` when this provider does not hold `path`.
    fn find_file(&self, path: &str) -> Result<Option<Vec<u8>>>;
}

impl ContentProvider for VPKDirectory {
    fn name(&self) -> String {
        self.dir_path().display().to_string()
    }

    fn find_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        VPKDirectory::find_file(self, path)
    }
}

impl ContentProvider for PakLump {
    fn name(&self) -> String {
        "pakfile".to_owned()
    }

    fn find_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(PakLump::find_file(self, path).map(<[u8]>::to_vec))
    }
}

impl ContentProvider for VFileSystem {
    fn name(&self) -> String {
        format!("memory ({} files)", self.len())
    }

    fn find_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .get_str(&normalize_path(path))
            .map(|mut reader| reader.read_to_end()))
    }
}

/// Files on disk under a root directory.
#[derive(Debug, Clone)]
pub struct LooseFiles {
    root: PathBuf,
}

impl LooseFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ContentProvider for LooseFiles {
    fn name(&self) -> String {
        self.root.display().to_string()
    }

    fn find_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let relative = normalize_path(path);
        if relative.split('/').any(|part| part == "..") {
            return Ok(None);
        }
        let full = self.root.join(relative);
        if !full.is_file() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(full)?))
    }
}

/// Ordered set of providers. The first one holding a path wins.
#[derive(Default)]
pub struct ContentManager {
    providers: Vec<Box<dyn ContentProvider>>,
}

impl ContentManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(&mut self, provider: impl ContentProvider + 'static) {
        log::debug!("mounted {}", provider.name());
        self.providers.push(Box::new(provider));
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Searches providers in mount order. A provider that fails to read is
    /// logged and skipped.
    pub fn find_file(&self, path: &str) -> Option<Vec<u8>> {
        for provider in &self.providers {
            match provider.find_file(path) {
                Ok(Some(data)) => return Some(data),
                Ok(None) => {}
                Err(err) => log::warn!("{} could not read {path}: {err}", provider.name()),
            }
        }
        log::debug!("{path} not found in {} providers", self.providers.len());
        None
    }

    /// Builds a manager from the `[mount]` section:
    ///
    /// ```ini
    /// [mount]
    /// root = /games/hl2
    /// vpk = hl2/hl2_textures_dir.vpk
    /// vpk = hl2/hl2_misc_dir.vpk
    /// dir = hl2
    /// ```
    ///
    /// Paths are relative to `root`. Entries that fail to mount are logged
    /// and skipped.
    pub fn from_ini(ini: &Ini) -> Self {
        let mut manager = Self::new();
        let Some(mount) = ini.section(Some(MOUNT_SECTION)) else {
            log::warn!("no [{MOUNT_SECTION}] section, nothing mounted");
            return manager;
        };
        let root = PathBuf::from(mount.get("root").unwrap_or_default());

        for vpk in mount.get_all("vpk") {
            let path = root.join(vpk);
            match VPKDirectory::load(&path) {
                Ok(dir) => manager.mount(dir),
                Err(err) => log::warn!("could not mount {}: {err}", path.display()),
            }
        }
        for dir in mount.get_all("dir") {
            let path = root.join(dir);
            if path.is_dir() {
                manager.mount(LooseFiles::new(path));
            } else {
                log::warn!("could not mount {}: not a directory", path.display());
            }
        }
        log::info!("mounted {} content providers", manager.len());
        manager
    }

    pub fn load_ini(path: impl AsRef<Path>) -> Result<Self> {
        let ini = Ini::load_from_file(path.as_ref())
            .map_err(|err| Error::Io(io::Error::new(io::ErrorKind::InvalidData, err.to_string())))?;
        Ok(Self::from_ini(&ini))
    }
}

#[cfg(test)]
mod content_tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        bsp::pak::pak_tests::build_zip,
        vpk::{VPKDirectoryEntry, VPKHeaderV1, DIR_ARCHIVE_INDEX, VPK_CRC, VPK_SIGNATURE, VPK_TERMINATOR},
    };

    /// A v1 dir file holding `scripts/<name>.txt` entirely in preload bytes.
    fn single_file_vpk(name: &str, data: &[u8]) -> Vec<u8> {
        let mut tree = Vec::new();
        for s in ["txt", "scripts", name] {
            tree.extend_from_slice(s.as_bytes());
            tree.push(0);
        }
        let entry = VPKDirectoryEntry {
            crc: VPK_CRC.checksum(data),
            preload_bytes: data.len() as u16,
            archive_index: DIR_ARCHIVE_INDEX,
            entry_offset: 0,
            entry_length: 0,
            terminator: VPK_TERMINATOR,
        };
        tree.extend_from_slice(bytemuck::bytes_of(&entry));
        tree.extend_from_slice(data);
        tree.extend_from_slice(&[0, 0, 0]);

        let header = VPKHeaderV1 {
            signature: VPK_SIGNATURE,
            version: 1,
            tree_size: tree.len() as u32,
        };
        let mut out = bytemuck::bytes_of(&header).to_vec();
        out.extend_from_slice(&tree);
        out
    }

    #[test]
    fn first_provider_wins() {
        let mut memory = VFileSystem::default();
        memory.insert(&VGlobalPath::new("scripts/game.txt"), b"memory".to_vec());
        let vpk = VPKDirectory::from_bytes("test_dir.vpk", single_file_vpk("game", b"archive")).unwrap();
        let pak = PakLump::from_zip(build_zip(&[("maps/cfg/extra.txt", b"pak", false)])).unwrap();

        let mut content = ContentManager::new();
        content.mount(vpk);
        content.mount(memory);
        content.mount(pak);

        assert_eq!(content.len(), 3);
        assert_eq!(content.find_file("Scripts\\Game.txt").as_deref(), Some(&b"archive"[..]));
        assert_eq!(content.find_file("maps/cfg/extra.txt").as_deref(), Some(&b"pak"[..]));
        assert_eq!(content.find_file("missing.txt"), None);
        assert_eq!(content.provider_names()[2], "pakfile");
    }

    #[test]
    fn loose_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("materials")).unwrap();
        std::fs::write(dir.path().join("materials/wall.vmt"), b"LightmappedGeneric").unwrap();

        let loose = LooseFiles::new(dir.path());
        assert_eq!(
            loose.find_file("materials/wall.vmt").unwrap().as_deref(),
            Some(&b"LightmappedGeneric"[..])
        );
        assert_eq!(loose.find_file("materials/none.vmt").unwrap(), None);
        assert_eq!(loose.find_file("../secret").unwrap(), None);
    }

    #[test]
    fn mounts_from_ini() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pak01_dir.vpk"), single_file_vpk("game", b"vpk")).unwrap();
        std::fs::create_dir_all(dir.path().join("custom/scripts")).unwrap();
        std::fs::write(dir.path().join("custom/scripts/extra.txt"), b"loose").unwrap();

        let text = format!(
            "[mount]\nroot = {}\nvpk = pak01_dir.vpk\nvpk = missing_dir.vpk\ndir = custom\ndir = nowhere\n",
            dir.path().display()
        );
        let ini = Ini::load_from_str(&text).unwrap();
        let content = ContentManager::from_ini(&ini);

        // the missing vpk and directory are skipped
        assert_eq!(content.len(), 2);
        assert_eq!(content.find_file("scripts/game.txt").as_deref(), Some(&b"vpk"[..]));
        assert_eq!(content.find_file("scripts/extra.txt").as_deref(), Some(&b"loose"[..]));

        let empty = ContentManager::from_ini(&Ini::load_from_str("[other]\nkey = value\n").unwrap());
        assert!(empty.is_empty());
    }
}
