use common::prelude::*;

use super::read_relative_string;
use crate::kv3::{KV3Document, KV3Value};

/// Compiler setting that marks BC7 textures packing roughness into blue.
pub const HEMI_OCT_COMPILER: &str = "CompileTexture";
pub const HEMI_OCT_SETTING: &str = "Texture Compiler Version Mip HemiOctIsoRoughness_RG_B";

const REDI_STRUCT_COUNT: usize = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputDependency {
    pub relative_filename: String,
    pub search_path: String,
    pub file_crc: u32,
    pub flags: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentDependency {
    pub parameter_name: String,
    pub parameter_type: String,
    pub fingerprint: u32,
    pub fingerprint_default: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecialDependency {
    pub string: String,
    pub compiler_identifier: String,
    pub fingerprint: u32,
    pub user_data: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChildResource {
    pub id: u64,
    pub name: String,
}

/// Compiler bookkeeping from a `REDI` or `RED2` block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceEditInfo {
    pub input_dependencies: Vec<InputDependency>,
    pub additional_input_dependencies: Vec<InputDependency>,
    pub argument_dependencies: Vec<ArgumentDependency>,
    pub special_dependencies: Vec<SpecialDependency>,
    pub custom_dependency_count: usize,
    pub additional_related_file_count: usize,
    pub child_resources: Vec<ChildResource>,
    pub extra_ints: Vec<(String, i32)>,
    pub extra_floats: Vec<(String, f32)>,
    pub extra_strings: Vec<(String, String)>,
}

/// Runs `f` once per record of a `(relative offset, count)` table.
fn read_table<T>(
    reader: &mut ByteReader,
    field: usize,
    mut f: impl FnMut(&mut ByteReader) -> Result<T>,
) -> Result<Vec<T>> {
    reader.seek_to(field)?;
    let offset = reader.read_u32()? as usize;
    let count = reader.read_u32()? as usize;
    if count == 0 {
        return Ok(Vec::new());
    }
    reader.with_position(field + offset, |r| {
        let mut out = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            out.push(f(r)?);
        }
        Ok(out)
    })
}

fn table_count(reader: &mut ByteReader, field: usize) -> Result<usize> {
    reader.with_position(field + 4, |r| r.read_u32().map(|c| c as usize))
}

fn input_dependency(r: &mut ByteReader) -> Result<InputDependency> {
    Ok(InputDependency {
        relative_filename: read_relative_string(r)?,
        search_path: read_relative_string(r)?,
        file_crc: r.read_u32()?,
        flags: r.read_u32()?,
    })
}

impl ResourceEditInfo {
    /// Parses the binary `REDI` layout: ten `(offset, count)` tables.
    pub fn read(reader: &mut ByteReader) -> Result<Self> {
        let base = reader.tell();
        if reader.remaining() < REDI_STRUCT_COUNT * 8 {
            return Err(Error::assertion(
                base,
                format!("REDI block of {} bytes", reader.remaining()),
            ));
        }
        let field = |i: usize| base + i * 8;

        let info = Self {
            input_dependencies: read_table(reader, field(0), input_dependency)?,
            additional_input_dependencies: read_table(reader, field(1), input_dependency)?,
            argument_dependencies: read_table(reader, field(2), |r| {
                Ok(ArgumentDependency {
                    parameter_name: read_relative_string(r)?,
                    parameter_type: read_relative_string(r)?,
                    fingerprint: r.read_u32()?,
                    fingerprint_default: r.read_u32()?,
                })
            })?,
            special_dependencies: read_table(reader, field(3), |r| {
                Ok(SpecialDependency {
                    string: read_relative_string(r)?,
                    compiler_identifier: read_relative_string(r)?,
                    fingerprint: r.read_u32()?,
                    user_data: r.read_u32()?,
                })
            })?,
            custom_dependency_count: table_count(reader, field(4))?,
            additional_related_file_count: table_count(reader, field(5))?,
            child_resources: read_table(reader, field(6), |r| {
                let id = r.read_u64()?;
                let name = read_relative_string(r)?;
                r.skip(4)?;
                Ok(ChildResource { id, name })
            })?,
            extra_ints: read_table(reader, field(7), |r| {
                Ok((read_relative_string(r)?, r.read_i32()?))
            })?,
            extra_floats: read_table(reader, field(8), |r| {
                Ok((read_relative_string(r)?, r.read_f32()?))
            })?,
            extra_strings: read_table(reader, field(9), |r| {
                Ok((read_relative_string(r)?, read_relative_string(r)?))
            })?,
        };
        reader.seek_to(field(REDI_STRUCT_COUNT))?;
        Ok(info)
    }

    /// Reads the same information from a `RED2` KV3 document. Missing keys
    /// leave their lists empty.
    pub fn from_kv3(doc: &KV3Document) -> Self {
        let root = doc.root();
        let list = |name: &str| doc.get(root, name).and_then(KV3Value::as_array).unwrap_or(&[]);
        let text = |item: &KV3Value, name: &str| {
            doc.get_str(item, name).unwrap_or_default().to_owned()
        };
        let number = |item: &KV3Value, name: &str| {
            doc.get(item, name)
                .and_then(KV3Value::as_u64)
                .map_or(0, |v| v as u32)
        };
        let inputs = |name: &str| -> Vec<InputDependency> {
            list(name)
                .iter()
                .map(|item| InputDependency {
                    relative_filename: text(item, "m_RelativeFilename"),
                    search_path: text(item, "m_SearchPath"),
                    file_crc: number(item, "m_nFileCRC"),
                    flags: 0,
                })
                .collect()
        };

        Self {
            input_dependencies: inputs("m_InputDependencies"),
            additional_input_dependencies: inputs("m_AdditionalInputDependencies"),
            argument_dependencies: list("m_ArgumentDependencies")
                .iter()
                .map(|item| ArgumentDependency {
                    parameter_name: text(item, "m_ParameterName"),
                    parameter_type: text(item, "m_ParameterType"),
                    fingerprint: number(item, "m_nFingerprint"),
                    fingerprint_default: number(item, "m_nFingerprintDefault"),
                })
                .collect(),
            special_dependencies: list("m_SpecialDependencies")
                .iter()
                .map(|item| SpecialDependency {
                    string: text(item, "m_String"),
                    compiler_identifier: text(item, "m_CompilerIdentifier"),
                    fingerprint: number(item, "m_nFingerprint"),
                    user_data: number(item, "m_nUserData"),
                })
                .collect(),
            custom_dependency_count: list("m_CustomDependencies").len(),
            additional_related_file_count: list("m_AdditionalRelatedFiles").len(),
            child_resources: list("m_ChildResourceList")
                .iter()
                .filter_map(|item| doc.str_value(item))
                .map(|name| ChildResource {
                    id: 0,
                    name: name.to_owned(),
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn has_special_dependency(&self, compiler_identifier: &str, string: &str) -> bool {
        self.special_dependencies
            .iter()
            .any(|d| d.compiler_identifier == compiler_identifier && d.string == string)
    }

    /// BC7 textures compiled with hemi-octahedral normals and roughness.
    pub fn is_hemi_oct_roughness(&self) -> bool {
        self.has_special_dependency(HEMI_OCT_COMPILER, HEMI_OCT_SETTING)
    }
}
