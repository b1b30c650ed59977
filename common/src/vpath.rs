/// Lower-case, forward-slash form used as the lookup key in every archive index.
pub fn normalize_path(path: &str) -> String {
    let mut out = path.replace('\\', "/").to_ascii_lowercase();
    while out.contains("//") {
        out = out.replace("//", "/");
    }
    out.trim_start_matches("./").trim_start_matches('/').to_owned()
}

// for an item materials/x/y/z.vmt
pub trait VPath {
    // return vmt
    fn ext(&self) -> &str;
    // return z
    fn filename(&self) -> &str;
    // return materials/x/y
    fn dir(&self) -> String;

    fn full(&self) -> String {
        let dir = self.dir();
        let ext = self.ext();
        let mut path = if dir.is_empty() {
            self.filename().to_owned()
        } else {
            format!("{dir}/{}", self.filename())
        };
        if !ext.is_empty() {
            path.push('.');
            path.push_str(ext);
        }
        path
    }
}

/// A complete path such as `materials/x/y/z.vmt`, normalized on construction.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VGlobalPath {
    path: String,
}

impl VGlobalPath {
    pub fn new(path: &str) -> Self {
        Self {
            path: normalize_path(path),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    fn file_part(&self) -> &str {
        match self.path.rfind('/') {
            Some(last_sep) => &self.path[last_sep + 1..],
            None => &self.path,
        }
    }
}

impl From<&str> for VGlobalPath {
    fn from(value: &str) -> Self {
        VGlobalPath::new(value)
    }
}

/// A path already split into the triplet VPK directories are keyed by.
pub struct VSplitPath<'a> {
    directory: &'a str,
    filename: &'a str,
    ext: &'a str,
}

impl<'a> VSplitPath<'a> {
    pub fn new(directory: &'a str, filename: &'a str, ext: &'a str) -> Self {
        Self {
            directory,
            filename,
            ext,
        }
    }
}

impl VPath for VGlobalPath {
    fn ext(&self) -> &str {
        let file = self.file_part();
        match file.rfind('.') {
            Some(ext_sep) => &file[ext_sep + 1..],
            None => "",
        }
    }

    fn filename(&self) -> &str {
        let file = self.file_part();
        match file.rfind('.') {
            Some(ext_sep) => &file[..ext_sep],
            None => file,
        }
    }

    fn dir(&self) -> String {
        match self.path.rfind('/') {
            Some(last_sep) => self.path[..last_sep].to_owned(),
            None => String::new(),
        }
    }

    fn full(&self) -> String {
        self.path.clone()
    }
}

impl<'a> VPath for VSplitPath<'a> {
    fn ext(&self) -> &str {
        self.ext
    }

    fn filename(&self) -> &str {
        self.filename
    }

    fn dir(&self) -> String {
        // VPK trees store the root directory as a single space
        match self.directory.trim() {
            "" => String::new(),
            dir => normalize_path(dir),
        }
    }
}
