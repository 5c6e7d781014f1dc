//! Cursors for the three traversal passes.
//!
//! Every encoded value has a fixed part and a variable part. A struct's
//! fixed part is its fields' fixed parts back to back. A list's fixed part
//! is its element count, and its elements' fixed records sit at the start
//! of the variable region, followed by whatever those elements point at.
//!
//! [`WriteStream`] and [`ReadStream`] therefore track two offsets: `fixed`,
//! where the next fixed field goes, and `var`, where the next block of
//! variable content goes. [`MeasureStream`] only needs a running total.

use std::fmt;

use bytes::Bytes;

use crate::error::{CodecError, Result};

/// Which pass a stream is making over a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Measure,
    Write,
    Read,
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Measure => "measure",
            Self::Write => "write",
            Self::Read => "read",
        })
    }
}

/// Accumulates the encoded size of a value without writing anything.
#[derive(Debug, Default)]
pub struct MeasureStream {
    cursor: usize,
}

impl MeasureStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for `len` more bytes.
    pub fn add(&mut self, len: usize) {
        self.cursor = self.cursor.saturating_add(len);
    }

    /// Total bytes measured so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

/// Writes into a buffer that was sized by a prior measure pass.
#[derive(Debug)]
pub struct WriteStream {
    bytes: Vec<u8>,
    fixed: usize,
    var: usize,
}

impl WriteStream {
    /// Allocate a zeroed buffer of `len` bytes. Fixed fields start at 0,
    /// variable content starts at `var_start`.
    pub fn allocate(len: usize, var_start: usize) -> Result<Self> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|_| CodecError::Allocation { size: len })?;
        bytes.resize(len, 0);

        if var_start > len {
            return Err(CodecError::Truncated {
                mode: StreamMode::Write,
                offset: 0,
                needed: var_start,
                len,
            });
        }

        Ok(Self {
            bytes,
            fixed: 0,
            var: var_start,
        })
    }

    /// Copy `src` to the fixed cursor.
    pub fn put_fixed(&mut self, src: &[u8]) -> Result<()> {
        let at = self.fixed;
        self.range(at, src.len())?;
        self.bytes[at..at + src.len()].copy_from_slice(src);
        self.fixed = at + src.len();
        Ok(())
    }

    /// Copy `src` to the variable cursor.
    pub fn put_var(&mut self, src: &[u8]) -> Result<()> {
        let at = self.reserve_var(src.len())?;
        self.bytes[at..at + src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Claim `len` bytes of the variable region and return where they start.
    pub fn reserve_var(&mut self, len: usize) -> Result<usize> {
        let at = self.var;
        self.range(at, len)?;
        self.var = at + len;
        Ok(at)
    }

    /// Move the fixed cursor to `at`, returning the previous position.
    pub fn enter(&mut self, at: usize) -> usize {
        std::mem::replace(&mut self.fixed, at)
    }

    /// Restore the fixed cursor after a nested block ending at `expected_end`.
    pub fn leave(&mut self, saved: usize, expected_end: usize) -> Result<()> {
        if self.fixed != expected_end {
            return Err(CodecError::CursorMismatch {
                mode: StreamMode::Write,
                expected: expected_end,
                actual: self.fixed,
            });
        }
        self.fixed = saved;
        Ok(())
    }

    /// Check that both cursors landed where the layout puts them and hand
    /// back the encoded bytes.
    pub fn finish(self, fixed_end: usize) -> Result<Bytes> {
        if self.fixed != fixed_end {
            return Err(CodecError::CursorMismatch {
                mode: StreamMode::Write,
                expected: fixed_end,
                actual: self.fixed,
            });
        }
        if self.var != self.bytes.len() {
            return Err(CodecError::CursorMismatch {
                mode: StreamMode::Write,
                expected: self.bytes.len(),
                actual: self.var,
            });
        }
        Ok(Bytes::from(self.bytes))
    }

    fn range(&self, at: usize, needed: usize) -> Result<()> {
        match at.checked_add(needed) {
            Some(end) if end <= self.bytes.len() => Ok(()),
            _ => Err(CodecError::Truncated {
                mode: StreamMode::Write,
                offset: at,
                needed,
                len: self.bytes.len(),
            }),
        }
    }
}

/// Reads from a received buffer, bounds-checking every access.
///
/// Everything handed out borrows from the buffer, so decoded views live
/// exactly as long as the bytes they were decoded from.
#[derive(Debug)]
pub struct ReadStream<'a> {
    bytes: &'a [u8],
    fixed: usize,
    var: usize,
}

impl<'a> ReadStream<'a> {
    /// Start reading fixed fields at `fixed_start` and variable content at
    /// `var_start`.
    pub fn new(bytes: &'a [u8], fixed_start: usize, var_start: usize) -> Result<Self> {
        if fixed_start > var_start || var_start > bytes.len() {
            return Err(CodecError::Truncated {
                mode: StreamMode::Read,
                offset: fixed_start,
                needed: var_start.saturating_sub(fixed_start),
                len: bytes.len(),
            });
        }
        Ok(Self {
            bytes,
            fixed: fixed_start,
            var: var_start,
        })
    }

    /// Take `len` bytes at the fixed cursor.
    pub fn take_fixed(&mut self, len: usize) -> Result<&'a [u8]> {
        let at = self.fixed;
        let slice = self.slice(at, len)?;
        self.fixed = at + len;
        Ok(slice)
    }

    /// Take `len` bytes at the variable cursor.
    pub fn take_var(&mut self, len: usize) -> Result<&'a [u8]> {
        let at = self.reserve_var(len)?;
        self.slice(at, len)
    }

    /// Claim `len` bytes of the variable region and return where they start.
    pub fn reserve_var(&mut self, len: usize) -> Result<usize> {
        let at = self.var;
        self.slice(at, len)?;
        self.var = at + len;
        Ok(at)
    }

    /// Move the fixed cursor to `at`, returning the previous position.
    pub fn enter(&mut self, at: usize) -> usize {
        std::mem::replace(&mut self.fixed, at)
    }

    /// Restore the fixed cursor after a nested block ending at `expected_end`.
    pub fn leave(&mut self, saved: usize, expected_end: usize) -> Result<()> {
        if self.fixed != expected_end {
            return Err(CodecError::CursorMismatch {
                mode: StreamMode::Read,
                expected: expected_end,
                actual: self.fixed,
            });
        }
        self.fixed = saved;
        Ok(())
    }

    /// Bytes not yet claimed by the variable cursor.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.var
    }

    /// The whole buffer this stream reads from.
    pub fn buffer(&self) -> &'a [u8] {
        self.bytes
    }

    /// Current fixed cursor, for error reporting.
    pub fn fixed_cursor(&self) -> usize {
        self.fixed
    }

    /// Check that the whole buffer was consumed.
    pub fn finish(self, fixed_end: usize) -> Result<()> {
        if self.fixed != fixed_end {
            return Err(CodecError::CursorMismatch {
                mode: StreamMode::Read,
                expected: fixed_end,
                actual: self.fixed,
            });
        }
        if self.var != self.bytes.len() {
            return Err(CodecError::CursorMismatch {
                mode: StreamMode::Read,
                expected: self.bytes.len(),
                actual: self.var,
            });
        }
        Ok(())
    }

    fn slice(&self, at: usize, len: usize) -> Result<&'a [u8]> {
        at.checked_add(len)
            .and_then(|end| self.bytes.get(at..end))
            .ok_or(CodecError::Truncated {
                mode: StreamMode::Read,
                offset: at,
                needed: len,
                len: self.bytes.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_keeps_fixed_and_variable_regions_apart() {
        let mut stream = WriteStream::allocate(10, 4).unwrap();
        stream.put_var(b"abc").unwrap();
        stream.put_fixed(&3u32.to_le_bytes()).unwrap();
        stream.put_var(b"def").unwrap();

        let bytes = stream.finish(4).unwrap();
        assert_eq!(&bytes[..], b"\x03\x00\x00\x00abcdef");
    }

    #[test]
    fn allocation_failure_is_fatal() {
        let err = WriteStream::allocate(usize::MAX, 0).unwrap_err();
        assert!(matches!(err, CodecError::Allocation { size: usize::MAX }));
        assert!(err.is_fatal());
    }

    #[test]
    fn write_past_measured_size_is_truncated() {
        let mut stream = WriteStream::allocate(4, 4).unwrap();
        stream.put_fixed(&[1, 2, 3, 4]).unwrap();
        let err = stream.put_fixed(&[5]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Truncated {
                mode: StreamMode::Write,
                offset: 4,
                ..
            }
        ));
    }

    #[test]
    fn write_finish_reports_unwritten_bytes() {
        let mut stream = WriteStream::allocate(8, 4).unwrap();
        stream.put_fixed(&[0; 4]).unwrap();
        stream.put_var(&[0; 2]).unwrap();

        let err = stream.finish(4).unwrap_err();
        assert!(matches!(
            err,
            CodecError::CursorMismatch {
                mode: StreamMode::Write,
                expected: 8,
                actual: 6,
            }
        ));
    }

    #[test]
    fn nested_block_restores_fixed_cursor() {
        let mut stream = WriteStream::allocate(8, 4).unwrap();
        let at = stream.reserve_var(4).unwrap();
        let saved = stream.enter(at);
        stream.put_fixed(&[9; 4]).unwrap();
        stream.leave(saved, at + 4).unwrap();
        stream.put_fixed(&[1; 4]).unwrap();

        let bytes = stream.finish(4).unwrap();
        assert_eq!(&bytes[..], &[1, 1, 1, 1, 9, 9, 9, 9]);
    }

    #[test]
    fn read_is_bounds_checked() {
        let bytes = [1u8, 2, 3, 4, 5];
        let mut stream = ReadStream::new(&bytes, 0, 4).unwrap();
        assert_eq!(stream.take_fixed(4).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(stream.remaining(), 1);

        let err = stream.take_var(2).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Truncated {
                mode: StreamMode::Read,
                offset: 4,
                needed: 2,
                len: 5,
            }
        ));
    }

    #[test]
    fn read_rejects_fixed_region_longer_than_buffer() {
        let bytes = [0u8; 6];
        assert!(ReadStream::new(&bytes, 0, 8).is_err());
    }

    #[test]
    fn read_finish_rejects_trailing_bytes() {
        let bytes = [0u8; 6];
        let mut stream = ReadStream::new(&bytes, 0, 4).unwrap();
        stream.take_fixed(4).unwrap();
        assert!(stream.finish(4).is_err());
    }

    #[test]
    fn measure_saturates() {
        let mut measure = MeasureStream::new();
        measure.add(usize::MAX);
        measure.add(8);
        assert_eq!(measure.cursor(), usize::MAX);
    }
}
