use std::{mem, sync::Arc};

use bytemuck::Pod;
use glam::{Vec3, Vec4};

use crate::error::{Error, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

/// Little-endian cursor over a shared, immutable byte buffer.
///
/// Cloning a reader or taking a [`ByteReader::slice`] never copies the
/// underlying bytes, so several cursors can walk different regions of one
/// file at the same time.
#[derive(Clone)]
pub struct ByteReader {
    data: Arc<[u8]>,
    start: usize,
    end: usize,
    pos: usize,
}

macro_rules! read_le {
    ($($name:ident => $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self) -> Result<$ty> {
                Ok(<$ty>::from_le_bytes(self.read_array()?))
            }
        )*
    };
}

impl ByteReader {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        let end = data.len();
        Self {
            data,
            start: 0,
            end,
            pos: 0,
        }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self::new(data)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.len() - self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.len()
    }

    /// Whole view of this reader, independent of the cursor.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    pub fn remaining_slice(&self) -> &[u8] {
        &self.data[self.start + self.pos..self.end]
    }

    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<usize> {
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => self.pos as i64,
            Whence::End => self.len() as i64,
        };
        let target = base + offset;
        if target < 0 || target as usize > self.len() {
            return Err(Error::OutOfBounds {
                offset: target.max(0) as usize,
                requested: 0,
                len: self.len(),
            });
        }
        self.pos = target as usize;
        Ok(self.pos)
    }

    pub fn seek_to(&mut self, pos: usize) -> Result<usize> {
        self.seek(pos as i64, Whence::Start)
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.ensure(count)?;
        self.pos += count;
        Ok(())
    }

    /// Advance the cursor to the next multiple of `alignment`.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let misalign = self.pos % alignment;
        if misalign != 0 {
            self.skip(alignment - misalign)?;
        }
        Ok(())
    }

    fn ensure(&self, count: usize) -> Result<()> {
        if count > self.remaining() {
            Err(Error::OutOfBounds {
                offset: self.pos,
                requested: count,
                len: self.len(),
            })
        } else {
            Ok(())
        }
    }

    fn take(&mut self, count: usize) -> Result<&[u8]> {
        self.ensure(count)?;
        let begin = self.start + self.pos;
        self.pos += count;
        Ok(&self.data[begin..begin + count])
    }

    pub fn peek(&self, count: usize) -> Result<&[u8]> {
        self.ensure(count)?;
        let begin = self.start + self.pos;
        Ok(&self.data[begin..begin + count])
    }

    pub fn read(&mut self, count: usize) -> Result<Vec<u8>> {
        Ok(self.take(count)?.to_vec())
    }

    pub fn read_to_end(&mut self) -> Vec<u8> {
        let rest = self.remaining_slice().to_vec();
        self.pos = self.len();
        rest
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    read_le! {
        read_u8 => u8,
        read_i8 => i8,
        read_u16 => u16,
        read_i16 => i16,
        read_u32 => u32,
        read_i32 => i32,
        read_u64 => u64,
        read_i64 => i64,
        read_f32 => f32,
        read_f64 => f64,
    }

    pub fn read_vec3(&mut self) -> Result<Vec3> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    pub fn read_vec4(&mut self) -> Result<Vec4> {
        Ok(Vec4::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    /// Read a `#[repr(C, packed)]` record. Layout padding must be spelled out as
    /// explicit fields in `T`.
    pub fn read_pod<T: Pod>(&mut self) -> Result<T> {
        Ok(bytemuck::pod_read_unaligned(self.take(mem::size_of::<T>())?))
    }

    pub fn read_pod_slice<T: Pod>(&mut self, count: usize) -> Result<Vec<T>> {
        let item_size = mem::size_of::<T>();
        let total = count.checked_mul(item_size).ok_or(Error::OutOfBounds {
            offset: self.pos,
            requested: usize::MAX,
            len: self.len(),
        })?;
        Ok(self
            .take(total)?
            .chunks_exact(item_size)
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    /// Fixed-width field, cut at the first NUL.
    pub fn read_fixed_string(&mut self, width: usize) -> Result<String> {
        let raw = self.take(width)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    /// NUL-terminated string; the terminator is consumed.
    pub fn read_cstring(&mut self) -> Result<String> {
        let rest = self.remaining_slice();
        let Some(end) = rest.iter().position(|&b| b == 0) else {
            return Err(Error::OutOfBounds {
                offset: self.pos,
                requested: rest.len() + 1,
                len: self.len(),
            });
        };
        let string = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += end + 1;
        Ok(string)
    }

    /// u32 byte length followed by the string bytes. A trailing NUL inside the
    /// counted bytes is dropped.
    pub fn read_length_prefixed_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        self.read_fixed_string(len)
    }

    /// Run `f` with the cursor at `pos`, then put the cursor back where it was,
    /// even if `f` fails.
    pub fn with_position<T>(
        &mut self,
        pos: usize,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let saved = self.pos;
        let result = self.seek_to(pos).and_then(|_| f(self));
        self.pos = saved;
        result
    }

    /// Run `f` from the current position and restore the cursor afterwards.
    pub fn peek_with<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let pos = self.pos;
        self.with_position(pos, f)
    }

    /// New reader over `[offset, offset + len)` of this view, sharing the buffer.
    pub fn slice(&self, offset: usize, len: usize) -> Result<ByteReader> {
        match offset.checked_add(len) {
            Some(stop) if stop <= self.len() => Ok(ByteReader {
                data: self.data.clone(),
                start: self.start + offset,
                end: self.start + stop,
                pos: 0,
            }),
            _ => Err(Error::OutOfBounds {
                offset,
                requested: len,
                len: self.len(),
            }),
        }
    }

    /// Consume `len` bytes and return them as a sub-reader without copying.
    pub fn read_reader(&mut self, len: usize) -> Result<ByteReader> {
        let sub = self.slice(self.pos, len)?;
        self.pos += len;
        Ok(sub)
    }
}

impl From<Vec<u8>> for ByteReader {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl From<&[u8]> for ByteReader {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}

impl std::fmt::Debug for ByteReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteReader")
            .field("len", &self.len())
            .field("pos", &self.pos)
            .finish()
    }
}

#[cfg(test)]
mod reader_tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[repr(C, packed)]
    #[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
    struct Pair {
        a: u16,
        _pad: [u8; 2],
        b: i32,
    }

    #[test]
    fn primitives_are_little_endian() {
        let mut r = ByteReader::new(vec![
            0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0xff, 0x00, 0x00, 0x80, 0x3f,
        ]);
        assert_eq!(r.read_u16().unwrap(), 0x1234);
        assert_eq!(r.read_u32().unwrap(), 0x12345678);
        assert_eq!(r.read_i8().unwrap(), -1);
        assert_eq!(r.read_f32().unwrap(), 1.0);
        assert!(r.is_at_end());
    }

    #[test]
    fn reading_past_end_fails_without_moving() {
        let mut r = ByteReader::new(vec![1, 2, 3]);
        r.skip(2).unwrap();
        match r.read_u32() {
            Err(Error::OutOfBounds {
                offset,
                requested,
                len,
            }) => {
                assert_eq!((offset, requested, len), (2, 4, 3));
            }
            other => panic!("expected out of bounds, got {other:?}"),
        }
        assert_eq!(r.tell(), 2);
        assert!(r.seek(4, Whence::Start).is_err());
        assert!(r.seek(-3, Whence::Current).is_err());
    }

    #[test]
    fn strings() {
        let mut data = b"abc\0\0\0hello\0".to_vec();
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(b"xyz");
        let mut r = ByteReader::new(data);
        assert_eq!(r.read_fixed_string(6).unwrap(), "abc");
        assert_eq!(r.read_cstring().unwrap(), "hello");
        assert_eq!(r.read_length_prefixed_string().unwrap(), "xyz");

        let mut unterminated = ByteReader::new(b"nope".to_vec());
        assert!(unterminated.read_cstring().is_err());
    }

    #[test]
    fn pod_reads_respect_explicit_padding() {
        let mut data = vec![7, 0, 0xaa, 0xbb];
        data.extend_from_slice(&(-2i32).to_le_bytes());
        data.extend_from_slice(&[9, 0, 0, 0]);
        data.extend_from_slice(&5i32.to_le_bytes());
        let mut r = ByteReader::new(data);
        let pairs: Vec<Pair> = r.read_pod_slice(2).unwrap();
        assert_eq!({ pairs[0].a }, 7);
        assert_eq!({ pairs[0].b }, -2);
        assert_eq!({ pairs[1].b }, 5);
    }

    #[test]
    fn align_and_scoped_position() {
        let mut r = ByteReader::new((0u8..16).collect::<Vec<_>>());
        r.skip(1).unwrap();
        r.align(4).unwrap();
        assert_eq!(r.tell(), 4);
        r.align(4).unwrap();
        assert_eq!(r.tell(), 4);

        let peeked = r.with_position(10, |r| r.read_u8()).unwrap();
        assert_eq!(peeked, 10);
        assert_eq!(r.tell(), 4);

        assert!(r.with_position(15, |r| r.read_u16()).is_err());
        assert_eq!(r.tell(), 4);
    }

    #[test]
    fn slices_share_the_buffer() {
        let mut r = ByteReader::new((0u8..8).collect::<Vec<_>>());
        let mut sub = r.slice(2, 4).unwrap();
        assert_eq!(sub.len(), 4);
        assert_eq!(sub.read(4).unwrap(), vec![2, 3, 4, 5]);
        assert!(sub.read_u8().is_err());
        assert!(r.slice(6, 3).is_err());

        r.skip(1).unwrap();
        let mut taken = r.read_reader(3).unwrap();
        assert_eq!(r.tell(), 4);
        assert_eq!(taken.read_to_end(), vec![1, 2, 3]);
    }
}
