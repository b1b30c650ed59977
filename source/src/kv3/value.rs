use std::fmt::{self, Write};

use ahash::AHashMap;
use flagset::flags;
use indexmap::IndexMap;
use num_derive::FromPrimitive;

/// On-disk type tag of a KV3 value. The top bit of the tag byte is stripped
/// before lookup; it announces a trailing [`KVFlag`] byte.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum KVType {
    StringMulti = 0,
    Null = 1,
    Boolean = 2,
    Int64 = 3,
    UInt64 = 4,
    Double = 5,
    String = 6,
    BinaryBlob = 7,
    Array = 8,
    Object = 9,
    ArrayTyped = 10,
    Int32 = 11,
    UInt32 = 12,
    BooleanTrue = 13,
    BooleanFalse = 14,
    Int64Zero = 15,
    Int64One = 16,
    DoubleZero = 17,
    DoubleOne = 18,
    Unk = 21,
}

flags! {
    pub enum KVFlag: u8 {
        Resource = 1,
        DeferredResource = 2,
        Unk = 16,
    }
}

/// Index into a document's string table. `-1` is the empty name.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrId(pub i32);

impl StrId {
    pub const EMPTY: StrId = StrId(-1);
}

pub type KV3Object = IndexMap<StrId, KV3Value>;

#[derive(Clone, Debug, PartialEq)]
pub enum KV3TypedArray {
    /// Packed storage for arrays whose element type is a double.
    Doubles(Vec<f64>),
    Values(Vec<KV3Value>),
}

impl KV3TypedArray {
    pub fn len(&self) -> usize {
        match self {
            Self::Doubles(v) => v.len(),
            Self::Values(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<KV3Value> {
        match self {
            Self::Doubles(v) => v.get(index).copied().map(KV3Value::Double),
            Self::Values(v) => v.get(index).cloned(),
        }
    }
}

#[derive(Clone, Debug)]
pub enum KV3Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    String(StrId),
    Blob(Vec<u8>),
    Array(Vec<KV3Value>),
    TypedArray(KV3TypedArray),
    Object(KV3Object),
}

// Object equality is order sensitive, unlike IndexMap's own PartialEq.
impl PartialEq for KV3Value {
    fn eq(&self, other: &Self) -> bool {
        use KV3Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (UInt(a), UInt(b)) => a == b,
            (Double(a), Double(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Blob(a), Blob(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (TypedArray(a), TypedArray(b)) => a == b,
            (Object(a), Object(b)) => a.len() == b.len() && a.iter().eq(b.iter()),
            _ => false,
        }
    }
}

impl KV3Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Int(v) => Some(v),
            Self::UInt(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::UInt(v) => Some(v),
            Self::Int(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Double(v) => Some(v),
            Self::Int(v) => Some(v as f64),
            Self::UInt(v) => Some(v as f64),
            _ => None,
        }
    }

    pub fn as_str_id(&self) -> Option<StrId> {
        match self {
            Self::String(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[KV3Value]> {
        match self {
            Self::Array(v) => Some(v),
            Self::TypedArray(KV3TypedArray::Values(v)) => Some(v),
            _ => None,
        }
    }

    pub fn as_doubles(&self) -> Option<&[f64]> {
        match self {
            Self::TypedArray(KV3TypedArray::Doubles(v)) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&KV3Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Element count of any array-like value.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Array(v) => Some(v.len()),
            Self::TypedArray(t) => Some(t.len()),
            Self::Object(o) => Some(o.len()),
            _ => None,
        }
    }
}

/// A decoded KV3 tree together with the string table its strings index into.
#[derive(Clone, Debug)]
pub struct KV3Document {
    strings: Vec<String>,
    ids: AHashMap<String, StrId>,
    root: KV3Value,
}

impl KV3Document {
    pub fn new(strings: Vec<String>, root: KV3Value) -> Self {
        let mut ids = AHashMap::with_capacity(strings.len());
        for (i, s) in strings.iter().enumerate() {
            ids.entry(s.clone()).or_insert(StrId(i as i32));
        }
        Self { strings, ids, root }
    }

    pub fn root(&self) -> &KV3Value {
        &self.root
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn string(&self, id: StrId) -> Option<&str> {
        if id == StrId::EMPTY {
            return Some("");
        }
        usize::try_from(id.0)
            .ok()
            .and_then(|i| self.strings.get(i))
            .map(String::as_str)
    }

    pub fn id_of(&self, name: &str) -> Option<StrId> {
        if name.is_empty() {
            return Some(self.ids.get(name).copied().unwrap_or(StrId::EMPTY));
        }
        self.ids.get(name).copied()
    }

    pub fn str_value<'a>(&'a self, value: &KV3Value) -> Option<&'a str> {
        self.string(value.as_str_id()?)
    }

    /// Field lookup by name on an object value.
    pub fn get<'v>(&self, object: &'v KV3Value, name: &str) -> Option<&'v KV3Value> {
        object.as_object()?.get(&self.id_of(name)?)
    }

    pub fn get_str<'a>(&'a self, object: &KV3Value, name: &str) -> Option<&'a str> {
        self.str_value(self.get(object, name)?)
    }

    /// Follow a chain of field names from the root.
    pub fn path(&self, names: &[&str]) -> Option<&KV3Value> {
        names
            .iter()
            .try_fold(&self.root, |value, name| self.get(value, name))
    }

    /// Names of an object's fields in stored order.
    pub fn keys<'a>(&'a self, object: &'a KV3Value) -> impl Iterator<Item = &'a str> + 'a {
        object
            .as_object()
            .into_iter()
            .flat_map(|o| o.keys())
            .map(|id| self.string(*id).unwrap_or("<bad string>"))
    }

    /// Text dump in a KV3-like notation, mostly for inspection.
    pub fn write_text(&self, out: &mut impl Write) -> fmt::Result {
        self.write_value(out, &self.root, 0)?;
        out.write_char('\n')
    }

    fn write_value(&self, out: &mut impl Write, value: &KV3Value, depth: usize) -> fmt::Result {
        let pad = "\t".repeat(depth + 1);
        match value {
            KV3Value::Null => out.write_str("null"),
            KV3Value::Bool(b) => write!(out, "{b}"),
            KV3Value::Int(v) => write!(out, "{v}"),
            KV3Value::UInt(v) => write!(out, "{v}"),
            KV3Value::Double(v) => write!(out, "{v:?}"),
            KV3Value::String(id) => write!(out, "{:?}", self.string(*id).unwrap_or_default()),
            KV3Value::Blob(b) => write!(out, "#[{} bytes]", b.len()),
            KV3Value::Array(items) => self.write_items(out, items.iter(), depth),
            KV3Value::TypedArray(KV3TypedArray::Values(items)) => {
                self.write_items(out, items.iter(), depth)
            }
            KV3Value::TypedArray(KV3TypedArray::Doubles(items)) => {
                let items: Vec<_> = items.iter().map(|v| KV3Value::Double(*v)).collect();
                self.write_items(out, items.iter(), depth)
            }
            KV3Value::Object(fields) => {
                out.write_str("{\n")?;
                for (key, field) in fields {
                    write!(out, "{pad}{} = ", self.string(*key).unwrap_or_default())?;
                    self.write_value(out, field, depth + 1)?;
                    out.write_char('\n')?;
                }
                write!(out, "{}}}", &pad[1..])
            }
        }
    }

    fn write_items<'v>(
        &self,
        out: &mut impl Write,
        items: impl Iterator<Item = &'v KV3Value>,
        depth: usize,
    ) -> fmt::Result {
        out.write_char('[')?;
        for (i, item) in items.enumerate() {
            if i > 0 {
                out.write_str(", ")?;
            }
            self.write_value(out, item, depth + 1)?;
        }
        out.write_char(']')
    }
}
