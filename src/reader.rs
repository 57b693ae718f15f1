// Axel '0vercl0k' Souchet - October 2 2026
//! Bounds-checked little-endian reads over an immutable byte buffer.
//!
//! Every read validates `offset + width <= len` and reports a
//! [`ReadError::Truncated`] instead of panicking; offsets are always `u64` so
//! callers never have to juggle `usize` / `u64` conversions.
use std::mem;

use crate::error::ReadError;

/// A read-only view over the bytes of a dump.
#[derive(Debug, Clone, Copy)]
pub struct BinaryReader<'buf> {
    buf: &'buf [u8],
}

impl<'buf> BinaryReader<'buf> {
    #[must_use]
    pub fn new(buf: &'buf [u8]) -> Self {
        Self { buf }
    }

    /// Length of the underlying buffer.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Does `[offset, offset + width)` fit in the buffer?
    #[must_use]
    pub fn contains(&self, offset: u64, width: u64) -> bool {
        offset
            .checked_add(width)
            .is_some_and(|end| end <= self.len())
    }

    /// Get a slice of `width` bytes starting at `offset`.
    pub fn bytes(&self, offset: u64, width: u64) -> Result<&'buf [u8], ReadError> {
        let truncated = ReadError::Truncated {
            offset,
            width,
            len: self.len(),
        };
        let end = offset.checked_add(width).ok_or(truncated)?;
        if end > self.len() {
            return Err(truncated);
        }

        // Both fit in `usize` as they are bounded by the slice length.
        Ok(&self.buf[offset as usize..end as usize])
    }

    /// Get everything from `offset` to the end of the buffer, capped to `max`
    /// bytes.
    pub fn tail(&self, offset: u64, max: u64) -> Result<&'buf [u8], ReadError> {
        if offset > self.len() {
            return Err(ReadError::Truncated {
                offset,
                width: 0,
                len: self.len(),
            });
        }

        self.bytes(offset, max.min(self.len() - offset))
    }

    fn array<const N: usize>(&self, offset: u64) -> Result<[u8; N], ReadError> {
        let slice = self.bytes(offset, N as u64)?;
        let mut out = [0; N];
        out.copy_from_slice(slice);

        Ok(out)
    }

    pub fn read_u8(&self, offset: u64) -> Result<u8, ReadError> {
        Ok(self.array::<1>(offset)?[0])
    }

    pub fn read_u16(&self, offset: u64) -> Result<u16, ReadError> {
        self.array(offset).map(u16::from_le_bytes)
    }

    pub fn read_u32(&self, offset: u64) -> Result<u32, ReadError> {
        self.array(offset).map(u32::from_le_bytes)
    }

    pub fn read_u64(&self, offset: u64) -> Result<u64, ReadError> {
        self.array(offset).map(u64::from_le_bytes)
    }

    /// Read `N` consecutive `u64`s.
    pub fn read_u64s<const N: usize>(&self, offset: u64) -> Result<[u64; N], ReadError> {
        let mut out = [0; N];
        let mut cur = offset;
        for slot in &mut out {
            *slot = self.read_u64(cur)?;
            cur = cur
                .checked_add(mem::size_of::<u64>() as u64)
                .ok_or(ReadError::Overflow("u64 array"))?;
        }

        Ok(out)
    }

    /// Read a NUL-terminated string of at most `max` bytes. Running into the
    /// end of the buffer (or into `max`) before the terminator is not an
    /// error, the string is just cut there. Invalid UTF-8 is replaced.
    pub fn read_cstring(&self, offset: u64, max: u64) -> Result<String, ReadError> {
        let window = self.tail(offset, max)?;
        let end = memchr::memchr(0, window).unwrap_or(window.len());

        Ok(String::from_utf8_lossy(&window[..end]).into_owned())
    }

    /// Read `byte_len` bytes of UTF-16LE at `offset`. A trailing NUL is
    /// dropped.
    pub fn read_utf16(&self, offset: u64, byte_len: u64) -> Result<String, ReadError> {
        let raw = self.bytes(offset, byte_len & !1)?;
        let units = raw
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .take_while(|&c| c != 0);

        Ok(char::decode_utf16(units)
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect())
    }
}
