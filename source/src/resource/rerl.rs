use common::prelude::*;

use super::read_relative_string;

/// A resource referenced by id from inside another resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalReference {
    pub id: u64,
    pub name: String,
}

/// The `RERL` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalReferences {
    pub entries: Vec<ExternalReference>,
}

const RERL_ENTRY_SIZE: usize = 16;

impl ExternalReferences {
    pub fn read(reader: &mut ByteReader) -> Result<Self> {
        let field = reader.tell();
        let offset = reader.read_u32()? as usize;
        let count = reader.read_u32()? as usize;
        if count == 0 {
            return Ok(Self::default());
        }

        let start = field + offset;
        if start + count * RERL_ENTRY_SIZE > reader.len() {
            return Err(Error::assertion(
                field,
                format!("{count} external references do not fit the block"),
            ));
        }
        let entries = reader.with_position(start, |r| {
            (0..count)
                .map(|_| {
                    let id = r.read_u64()?;
                    let name = read_relative_string(r)?;
                    r.skip(4)?;
                    Ok(ExternalReference { id, name })
                })
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(Self { entries })
    }

    pub fn find(&self, id: u64) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
