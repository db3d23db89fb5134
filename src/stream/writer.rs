//! Bounded writer over a growable buffer
//!
//! Writing is unbounded unless a limit is active. Seeking backwards
//! overwrites, seeking past the end zero-fills.

use std::fmt;

use crate::error::{Error, Result};

/// Cursor over an owned buffer with an optional write bound
#[derive(Default)]
pub struct BoundedWriter {
    buffer: Vec<u8>,
    cursor: usize,
    /// Absolute position the cursor may not pass
    limit: Option<usize>,
}

impl BoundedWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current cursor position (bytes written)
    #[inline]
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Bytes left until the limit, if one is active
    pub fn remainder(&self) -> Option<usize> {
        self.limit.map(|limit| limit.saturating_sub(self.cursor))
    }

    /// Bytes written so far
    pub fn written(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    /// Write raw bytes at the cursor
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        if let Some(available) = self.remainder() {
            if data.len() > available {
                return Err(Error::EndOfBound {
                    needed: data.len(),
                    available,
                });
            }
        }

        let end = self.cursor + data.len();
        if self.cursor == self.buffer.len() {
            self.buffer.extend_from_slice(data);
        } else {
            if end > self.buffer.len() {
                self.buffer.resize(end, 0);
            }
            self.buffer[self.cursor..end].copy_from_slice(data);
        }
        self.cursor = end;
        Ok(())
    }

    /// Write a single byte
    #[inline]
    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write_bytes(&[byte])
    }

    /// Move the cursor to an absolute position
    pub fn seek(&mut self, position: usize) {
        if position > self.buffer.len() {
            self.buffer.resize(position, 0);
        }
        self.cursor = position;
    }

    /// Run `f` with writes capped at `len` bytes from the cursor
    pub fn with_limit<T>(&mut self, len: usize, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = self.limit;
        let requested = self.cursor.saturating_add(len);
        self.limit = Some(match saved {
            Some(limit) => limit.min(requested),
            None => requested,
        });
        let result = f(self);
        self.limit = saved;
        result
    }

    /// Run `f` at an absolute position, then restore the cursor
    pub fn with_offset<T>(
        &mut self,
        position: usize,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let saved_cursor = self.cursor;
        let saved_limit = self.limit;
        self.limit = None;
        self.seek(position);
        let result = f(self);
        self.cursor = saved_cursor;
        self.limit = saved_limit;
        result
    }

    /// Zero-fill up to the active limit
    pub fn pad_to_limit(&mut self) -> Result<()> {
        match self.remainder() {
            Some(0) | None => Ok(()),
            Some(padding) => self.write_bytes(&vec![0u8; padding]),
        }
    }
}

impl fmt::Debug for BoundedWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedWriter")
            .field("cursor", &self.cursor)
            .field("limit", &self.limit)
            .field("len", &self.buffer.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_rejects_overflow() {
        let mut writer = BoundedWriter::new();
        let err = writer.with_limit(2, |w| w.write_bytes(b"abc")).unwrap_err();
        assert!(matches!(err, Error::EndOfBound { needed: 3, available: 2 }));
        writer.write_bytes(b"abc").unwrap();
        assert_eq!(writer.written(), b"abc");
    }

    #[test]
    fn test_pad_to_limit() {
        let mut writer = BoundedWriter::new();
        writer
            .with_limit(4, |w| {
                w.write_byte(7)?;
                w.pad_to_limit()
            })
            .unwrap();
        writer.write_byte(1).unwrap();
        assert_eq!(writer.into_inner(), vec![7, 0, 0, 0, 1]);
    }

    #[test]
    fn test_offset_writes_in_place() {
        let mut writer = BoundedWriter::new();
        writer.write_bytes(&[1, 2, 3]).unwrap();
        writer.with_offset(1, |w| w.write_byte(9)).unwrap();
        writer.with_offset(5, |w| w.write_byte(5)).unwrap();
        writer.write_byte(4).unwrap();
        assert_eq!(writer.into_inner(), vec![1, 9, 3, 4, 0, 5]);
    }
}
