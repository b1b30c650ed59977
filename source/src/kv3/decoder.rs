use flagset::FlagSet;
use num_traits::FromPrimitive;

use common::prelude::*;

use crate::codec::{block, lz4, zstd};

use super::value::{KV3Document, KV3Object, KV3TypedArray, KV3Value, KVFlag, KVType, StrId};

pub const KV3_V1_SIG: [u8; 4] = *b"\x013VK";
pub const KV3_V2_SIG: [u8; 4] = *b"\x023VK";
pub const VKV3_SIG: [u8; 4] = *b"VKV\x03";

pub const KV3_ENCODING_BINARY_BLOCK_COMPRESSED: [u8; 16] = [
    0x46, 0x1A, 0x79, 0x95, 0xBC, 0x95, 0x6C, 0x4F, 0xA7, 0x0B, 0x05, 0xBC, 0xA1, 0xB7, 0xDF, 0xD2,
];
pub const KV3_ENCODING_BINARY_UNCOMPRESSED: [u8; 16] = [
    0x00, 0x05, 0x86, 0x1B, 0xD8, 0xF7, 0xC1, 0x40, 0xAD, 0x82, 0x75, 0xA4, 0x82, 0x67, 0xE7, 0x14,
];
pub const KV3_ENCODING_BINARY_BLOCK_LZ4: [u8; 16] = [
    0x8A, 0x34, 0x47, 0x68, 0xA1, 0x63, 0x5C, 0x4F, 0xA1, 0x97, 0x53, 0x80, 0x6F, 0xD9, 0xB1, 0x19,
];
pub const KV3_FORMAT_GENERIC: [u8; 16] = [
    0x7C, 0x16, 0x12, 0x74, 0xE9, 0x06, 0x98, 0x46, 0xAF, 0xF2, 0xE6, 0x3E, 0xB5, 0x90, 0x37, 0xE7,
];

/// Separates the string/type region from the block size table in v2 streams.
pub const BLOCK_SENTINEL: u32 = 0xFFEE_DD00;

const MAX_DEPTH: usize = 512;

pub fn is_kv3(data: &[u8]) -> bool {
    data.len() >= 4 && [KV3_V1_SIG, KV3_V2_SIG, VKV3_SIG].contains(&[data[0], data[1], data[2], data[3]])
}

impl KV3Document {
    pub fn parse(data: impl Into<std::sync::Arc<[u8]>>) -> Result<Self> {
        Self::parse_reader(&mut ByteReader::new(data))
    }

    /// Decode a document starting at the reader's cursor and running to the
    /// end of its view.
    pub fn parse_reader(reader: &mut ByteReader) -> Result<Self> {
        let start = reader.tell();
        let signature: [u8; 4] = reader.read_array()?;
        let doc = match signature {
            KV3_V1_SIG => read_v1(reader),
            KV3_V2_SIG => read_v2(reader),
            VKV3_SIG => read_v3(reader),
            other => Err(Error::unsupported(format!(
                "kv3 signature {other:02x?} at offset {start}"
            ))),
        }?;
        log::debug!(
            "kv3 document: {} strings, root {:?}",
            doc.strings().len(),
            doc.root().len()
        );
        Ok(doc)
    }
}

#[derive(Copy, Clone)]
enum Pool {
    Bytes,
    Ints,
    Doubles,
}

/// Binary blobs stored outside the main stream, handed out one per blob in
/// declaration order.
struct BlockQueue {
    data: ByteReader,
    sizes: Vec<u32>,
    next: usize,
}

impl BlockQueue {
    fn next_blob(&mut self) -> Result<Vec<u8>> {
        let Some(&size) = self.sizes.get(self.next) else {
            return Err(Error::assertion(
                self.data.tell(),
                format!("binary blob #{} has no matching block", self.next),
            ));
        };
        self.next += 1;
        self.data.read(size as usize)
    }
}

struct Parser {
    strings: Vec<String>,
    /// Separate type-tag array (v1/v2); tags are inline in `buffer` otherwise.
    types: Option<ByteReader>,
    buffer: ByteReader,
    bytes: ByteReader,
    ints: ByteReader,
    doubles: ByteReader,
    /// All pools alias `buffer` (v3).
    shared_pools: bool,
    blocks: Option<BlockQueue>,
}

impl Parser {
    /// Carve the blob, int and double pools off the front of `buffer`.
    fn with_pools(
        mut buffer: ByteReader,
        blob_bytes: u32,
        int_count: u32,
        double_count: u32,
    ) -> Result<Self> {
        let bytes = buffer.read_reader(blob_bytes as usize)?;
        buffer.align(4)?;
        let ints = buffer.read_reader(int_count as usize * 4)?;
        buffer.align(8)?;
        let doubles = buffer.read_reader(double_count as usize * 8)?;
        Ok(Self {
            strings: Vec::new(),
            types: None,
            buffer,
            bytes,
            ints,
            doubles,
            shared_pools: false,
            blocks: None,
        })
    }

    fn shared(buffer: ByteReader) -> Self {
        let empty = ByteReader::new(Vec::new());
        Self {
            strings: Vec::new(),
            types: None,
            buffer,
            bytes: empty.clone(),
            ints: empty.clone(),
            doubles: empty,
            shared_pools: true,
            blocks: None,
        }
    }

    fn pool(&mut self, pool: Pool) -> &mut ByteReader {
        if self.shared_pools {
            return &mut self.buffer;
        }
        match pool {
            Pool::Bytes => &mut self.bytes,
            Pool::Ints => &mut self.ints,
            Pool::Doubles => &mut self.doubles,
        }
    }

    fn read_strings(&mut self, count: u32) -> Result<()> {
        for _ in 0..count {
            let s = self.buffer.read_cstring()?;
            self.strings.push(s);
        }
        Ok(())
    }

    fn set_types(&mut self, len: usize) -> Result<()> {
        let types = self.buffer.read_reader(len)?;
        self.types = (!types.is_empty()).then_some(types);
        Ok(())
    }

    fn finish(mut self) -> Result<KV3Document> {
        let root = self.parse_value(0)?;
        Ok(KV3Document::new(self.strings, root))
    }

    fn read_type(&mut self) -> Result<(KVType, FlagSet<KVFlag>)> {
        let stream = match &mut self.types {
            Some(types) => types,
            None => &mut self.buffer,
        };
        let offset = stream.tell();
        let mut raw = stream.read_u8()?;
        let mut flags = FlagSet::default();
        if raw & 0x80 != 0 {
            raw &= 0x7f;
            let bits = stream.read_u8()?;
            flags = FlagSet::<KVFlag>::new(bits).map_err(|_| {
                Error::unsupported(format!("kv3 flag bits {bits:#04x} at type offset {offset}"))
            })?;
        }
        let kind = KVType::from_u8(raw).ok_or_else(|| {
            Error::unsupported(format!("kv3 type tag {raw} at type offset {offset}"))
        })?;
        Ok((kind, flags))
    }

    fn read_string_id(&mut self) -> Result<StrId> {
        let offset = self.pool(Pool::Ints).tell();
        let id = self.pool(Pool::Ints).read_i32()?;
        if id != -1 && (id < 0 || id as usize >= self.strings.len()) {
            return Err(Error::assertion(
                offset,
                format!("string id {id} outside table of {}", self.strings.len()),
            ));
        }
        Ok(StrId(id))
    }

    fn parse_value(&mut self, depth: usize) -> Result<KV3Value> {
        if depth > MAX_DEPTH {
            return Err(Error::assertion(
                self.buffer.tell(),
                "kv3 nesting exceeds supported depth",
            ));
        }
        let (kind, _flags) = self.read_type()?;
        self.read_value(kind, depth)
    }

    fn read_value(&mut self, kind: KVType, depth: usize) -> Result<KV3Value> {
        Ok(match kind {
            KVType::Null => KV3Value::Null,
            KVType::Double => KV3Value::Double(self.pool(Pool::Doubles).read_f64()?),
            KVType::Boolean => KV3Value::Bool(self.pool(Pool::Bytes).read_u8()? == 1),
            KVType::BooleanTrue => KV3Value::Bool(true),
            KVType::BooleanFalse => KV3Value::Bool(false),
            KVType::Int64 => KV3Value::Int(self.pool(Pool::Doubles).read_i64()?),
            KVType::UInt64 => KV3Value::UInt(self.pool(Pool::Doubles).read_u64()?),
            KVType::DoubleZero => KV3Value::Double(0.0),
            KVType::DoubleOne => KV3Value::Double(1.0),
            KVType::Int64Zero => KV3Value::Int(0),
            KVType::Int64One => KV3Value::Int(1),
            KVType::Int32 => KV3Value::Int(self.pool(Pool::Ints).read_i32()? as i64),
            KVType::UInt32 => KV3Value::UInt(self.pool(Pool::Ints).read_u32()? as u64),
            KVType::String => match self.read_string_id()? {
                StrId::EMPTY => KV3Value::Null,
                id => KV3Value::String(id),
            },
            KVType::Array => {
                let count = self.pool(Pool::Ints).read_u32()?;
                let mut items = Vec::with_capacity(count.min(1024) as usize);
                for _ in 0..count {
                    items.push(self.parse_value(depth + 1)?);
                }
                KV3Value::Array(items)
            }
            KVType::Object => {
                let count = self.pool(Pool::Ints).read_u32()?;
                let mut fields = KV3Object::with_capacity(count.min(1024) as usize);
                for _ in 0..count {
                    let name = self.read_string_id()?;
                    let value = self.parse_value(depth + 1)?;
                    fields.insert(name, value);
                }
                KV3Value::Object(fields)
            }
            KVType::ArrayTyped => {
                let count = self.pool(Pool::Ints).read_u32()?;
                let (sub_kind, _flags) = self.read_type()?;
                if matches!(
                    sub_kind,
                    KVType::Double | KVType::DoubleZero | KVType::DoubleOne
                ) {
                    let mut values = Vec::with_capacity(count.min(4096) as usize);
                    for _ in 0..count {
                        if let KV3Value::Double(v) = self.read_value(sub_kind, depth + 1)? {
                            values.push(v);
                        }
                    }
                    KV3Value::TypedArray(KV3TypedArray::Doubles(values))
                } else {
                    let mut values = Vec::with_capacity(count.min(1024) as usize);
                    for _ in 0..count {
                        values.push(self.read_value(sub_kind, depth + 1)?);
                    }
                    KV3Value::TypedArray(KV3TypedArray::Values(values))
                }
            }
            KVType::BinaryBlob => match &mut self.blocks {
                Some(blocks) => KV3Value::Blob(blocks.next_blob()?),
                None => {
                    let size = self.pool(Pool::Ints).read_u32()?;
                    KV3Value::Blob(self.pool(Pool::Bytes).read(size as usize)?)
                }
            },
            KVType::StringMulti | KVType::Unk => {
                return Err(Error::unsupported(format!("kv3 value of type {kind:?}")))
            }
        })
    }
}

fn read_v1(reader: &mut ByteReader) -> Result<KV3Document> {
    let format: [u8; 16] = reader.read_array()?;
    if format != KV3_FORMAT_GENERIC {
        return Err(Error::unsupported(format!("kv3 v1 format {format:02x?}")));
    }

    let method = reader.read_u32()?;
    let blob_bytes = reader.read_u32()?;
    let int_count = reader.read_u32()?;
    let double_count = reader.read_u32()?;

    let buffer = match method {
        0 => {
            let len = reader.read_u32()? as usize;
            reader.read(len)?
        }
        1 => {
            let size = reader.read_u32()? as usize;
            let out = lz4::decompress(reader.remaining_slice(), size)?;
            reader.seek(0, Whence::End)?;
            out
        }
        m => return Err(Error::unsupported(format!("kv3 v1 compression method {m}"))),
    };

    let mut parser = Parser::with_pools(ByteReader::new(buffer), blob_bytes, int_count, double_count)?;
    let string_count = parser.ints.read_u32()?;
    parser.read_strings(string_count)?;

    let types_len = parser.buffer.remaining().checked_sub(4).ok_or_else(|| {
        Error::assertion(parser.buffer.tell(), "kv3 v1 stream too short for type table")
    })?;
    parser.set_types(types_len)?;
    parser.finish()
}

fn read_v2(reader: &mut ByteReader) -> Result<KV3Document> {
    // format GUID is not checked for v2
    reader.skip(16)?;

    let method = reader.read_u32()?;
    let dict_id = reader.read_u16()?;
    let frame_size = reader.read_u16()?;

    let blob_bytes = reader.read_u32()?;
    let int_count = reader.read_u32()?;
    let double_count = reader.read_u32()?;

    let strings_and_types_size = reader.read_u32()? as usize;
    let _b = reader.read_u16()?;
    let _c = reader.read_u16()?;

    let uncompressed_size = reader.read_u32()? as usize;
    let compressed_size = reader.read_u32()? as usize;
    let block_count = reader.read_u32()?;
    let block_total_size = reader.read_u32()? as usize;

    let unsupported = || {
        Error::unsupported(format!(
            "kv3 v2 method {method} with dictionary {dict_id} and frame size {frame_size}"
        ))
    };
    let buffer = match method {
        0 => {
            if dict_id != 0 || frame_size != 0 {
                return Err(unsupported());
            }
            reader.read(compressed_size)?
        }
        1 => {
            if dict_id != 0 || frame_size != 16384 {
                return Err(unsupported());
            }
            let data = reader.read(compressed_size)?;
            lz4::decompress(&data, uncompressed_size)?
        }
        2 => {
            let data = reader.read(compressed_size)?;
            zstd::decompress(&data, uncompressed_size + block_total_size)?
        }
        _ => return Err(unsupported()),
    };

    let mut parser = Parser::with_pools(ByteReader::new(buffer), blob_bytes, int_count, double_count)?;

    let string_start = parser.buffer.tell();
    let string_count = parser.ints.read_u32()?;
    parser.read_strings(string_count)?;
    let consumed = parser.buffer.tell() - string_start;
    let types_len = strings_and_types_size.checked_sub(consumed).ok_or_else(|| {
        Error::assertion(
            parser.buffer.tell(),
            format!("strings use {consumed} of {strings_and_types_size} declared bytes"),
        )
    })?;
    parser.set_types(types_len)?;

    let mut block_sizes = Vec::with_capacity(block_count.min(4096) as usize);
    for _ in 0..block_count {
        block_sizes.push(parser.buffer.read_u32()?);
    }

    let sentinel_offset = parser.buffer.tell();
    let sentinel = parser.buffer.read_u32()?;
    if sentinel != BLOCK_SENTINEL {
        return Err(Error::assertion(
            sentinel_offset,
            format!("expected block sentinel {BLOCK_SENTINEL:#010x}, found {sentinel:#010x}"),
        ));
    }

    if block_count > 0 {
        let mut block_data = Vec::with_capacity(block_total_size);
        match method {
            0 => {
                for &size in &block_sizes {
                    block_data.extend_from_slice(&reader.read(size as usize)?);
                }
            }
            1 => {
                let mut chain = lz4::ChainDecoder::new();
                for &size in &block_sizes {
                    let compressed = parser.buffer.read_u16()? as usize;
                    let data = reader.read(compressed)?;
                    block_data.extend_from_slice(&chain.decompress(&data, size as usize)?);
                }
            }
            _ => block_data = parser.buffer.read_to_end(),
        }
        parser.blocks = Some(BlockQueue {
            data: ByteReader::new(block_data),
            sizes: block_sizes,
            next: 0,
        });
    }

    parser.finish()
}

fn read_v3(reader: &mut ByteReader) -> Result<KV3Document> {
    let encoding: [u8; 16] = reader.read_array()?;
    let _format: [u8; 16] = reader.read_array()?;

    let buffer = match encoding {
        KV3_ENCODING_BINARY_BLOCK_COMPRESSED => block::decompress_from(reader)?,
        KV3_ENCODING_BINARY_BLOCK_LZ4 => {
            let size = reader.read_u32()? as usize;
            let out = lz4::decompress(reader.remaining_slice(), size)?;
            reader.seek(0, Whence::End)?;
            out
        }
        KV3_ENCODING_BINARY_UNCOMPRESSED => reader.read_to_end(),
        other => return Err(Error::unsupported(format!("kv3 encoding {other:02x?}"))),
    };

    let mut parser = Parser::shared(ByteReader::new(buffer));
    let string_count = parser.buffer.read_u32()?;
    parser.read_strings(string_count)?;
    parser.finish()
}
