//! Bounded reader over a byte slice
//!
//! Reads never copy; limits narrow the readable window for the duration of
//! a closure and are restored when it returns.

use std::fmt;

use crate::error::{Error, Result};

/// Cursor over an immutable buffer with an optional read bound
pub struct BoundedReader<'a> {
    /// Immutable buffer to read from
    buffer: &'a [u8],
    /// Current byte position in buffer
    cursor: usize,
    /// Absolute position the cursor may not pass
    limit: Option<usize>,
}

impl<'a> BoundedReader<'a> {
    /// Create an unbounded reader at the start of the buffer
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            cursor: 0,
            limit: None,
        }
    }

    /// Get current cursor position (bytes read)
    #[inline]
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Total length of the underlying data
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Absolute end of the readable window
    #[inline]
    fn end(&self) -> usize {
        match self.limit {
            Some(limit) => limit.min(self.buffer.len()),
            None => self.buffer.len(),
        }
    }

    /// Bytes left until the bound, or until the end of data when unbounded
    #[inline]
    pub fn remainder(&self) -> usize {
        self.end().saturating_sub(self.cursor)
    }

    /// True while a limit is active
    pub fn is_bounded(&self) -> bool {
        self.limit.is_some()
    }

    /// Error for a read of `needed` bytes that does not fit
    fn exhausted(&self, needed: usize) -> Error {
        match self.limit {
            Some(limit) if limit < self.buffer.len() => Error::EndOfBound {
                needed,
                available: limit.saturating_sub(self.cursor),
            },
            _ => Error::EndOfStream {
                needed,
                available: self.buffer.len().saturating_sub(self.cursor),
            },
        }
    }

    /// Check that `len` bytes are readable from the cursor
    ///
    /// `EndOfStream` when `len` runs past the data, `EndOfBound` when it only
    /// runs past the current window.
    pub fn ensure(&self, len: usize) -> Result<()> {
        if self.remainder() >= len {
            return Ok(());
        }
        let available = self.buffer.len().saturating_sub(self.cursor);
        if len > available {
            return Err(Error::EndOfStream {
                needed: len,
                available,
            });
        }
        Err(Error::EndOfBound {
            needed: len,
            available: self.remainder(),
        })
    }

    /// Read raw bytes (zero-copy slice)
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remainder() < len {
            return Err(self.exhausted(len));
        }
        let slice = &self.buffer[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(slice)
    }

    /// Read a single byte
    #[inline]
    pub fn read_byte(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Read up to the next zero byte, consuming but not returning it
    ///
    /// Without a terminator the rest of the window is returned.
    pub fn read_until_zero(&mut self) -> Result<&'a [u8]> {
        let window = &self.buffer[self.cursor..self.end()];
        match window.iter().position(|&b| b == 0) {
            Some(index) => {
                self.cursor += index + 1;
                Ok(&window[..index])
            }
            None => {
                self.cursor += window.len();
                Ok(window)
            }
        }
    }

    /// Read everything left in the window
    pub fn read_remaining(&mut self) -> &'a [u8] {
        let end = self.end();
        let slice = &self.buffer[self.cursor..end];
        self.cursor = end;
        slice
    }

    /// Skip bytes
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }

    /// Move the cursor to an absolute position
    pub fn seek(&mut self, position: usize) -> Result<()> {
        if position > self.buffer.len() {
            return Err(Error::EndOfStream {
                needed: position,
                available: self.buffer.len(),
            });
        }
        self.cursor = position;
        Ok(())
    }

    /// Run `f` with the window narrowed to `len` bytes from the cursor
    ///
    /// Nested limits can only shrink the window.
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
        let result = self.seek(position).and_then(|_| f(self));
        self.cursor = saved_cursor;
        self.limit = saved_limit;
        result
    }

    /// Skip whatever the current limit left unread
    ///
    /// Fails with `EndOfStream` when the limit reaches past the data.
    pub fn skip_to_limit(&mut self) -> Result<()> {
        if let Some(limit) = self.limit {
            if limit > self.buffer.len() {
                return Err(Error::EndOfStream {
                    needed: limit - self.cursor,
                    available: self.buffer.len().saturating_sub(self.cursor),
                });
            }
            self.cursor = self.cursor.max(limit);
        }
        Ok(())
    }
}

impl fmt::Debug for BoundedReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedReader")
            .field("cursor", &self.cursor)
            .field("limit", &self.limit)
            .field("remainder", &self.remainder())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_reports_end_of_bound() {
        let data = [1u8, 2, 3, 4, 5];
        let mut reader = BoundedReader::new(&data);
        let err = reader
            .with_limit(2, |r| r.read_bytes(3).map(|b| b.to_vec()))
            .unwrap_err();
        assert!(matches!(err, Error::EndOfBound { needed: 3, available: 2 }));
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.remainder(), 5);
    }

    #[test]
    fn test_data_end_reports_end_of_stream() {
        let data = [1u8, 2];
        let mut reader = BoundedReader::new(&data);
        let err = reader.with_limit(10, |r| r.read_bytes(3).map(|_| ())).unwrap_err();
        assert!(matches!(err, Error::EndOfStream { needed: 3, available: 2 }));
    }

    #[test]
    fn test_ensure_tells_stream_from_bound() {
        let data = [0u8; 6];
        let mut reader = BoundedReader::new(&data);
        reader.skip(2).unwrap();
        assert!(reader.ensure(4).is_ok());

        let err = reader.ensure(10).unwrap_err();
        assert!(matches!(err, Error::EndOfStream { needed: 10, available: 4 }));

        let err = reader.with_limit(2, |r| r.ensure(3)).unwrap_err();
        assert!(matches!(err, Error::EndOfBound { needed: 3, available: 2 }));
    }

    #[test]
    fn test_nested_limits_only_shrink() {
        let data = [0u8; 10];
        let mut reader = BoundedReader::new(&data);
        reader
            .with_limit(4, |r| {
                r.with_limit(8, |inner| {
                    assert_eq!(inner.remainder(), 4);
                    Ok(())
                })?;
                r.with_limit(2, |inner| {
                    assert_eq!(inner.remainder(), 2);
                    Ok(())
                })
            })
            .unwrap();
    }

    #[test]
    fn test_read_until_zero_respects_window() {
        let data = b"ab\0cd";
        let mut reader = BoundedReader::new(data);
        assert_eq!(reader.read_until_zero().unwrap(), b"ab");
        assert_eq!(reader.position(), 3);

        let mut reader = BoundedReader::new(data);
        let head = reader.with_limit(1, |r| r.read_until_zero().map(|b| b.to_vec())).unwrap();
        assert_eq!(head, b"a");
        assert_eq!(reader.position(), 1);
    }

    #[test]
    fn test_offset_restores_cursor() {
        let data = [9u8, 8, 7, 6];
        let mut reader = BoundedReader::new(&data);
        reader.skip(1).unwrap();
        let byte = reader.with_offset(3, |r| r.read_byte()).unwrap();
        assert_eq!(byte, 6);
        assert_eq!(reader.position(), 1);
    }

    #[test]
    fn test_skip_to_limit() {
        let data = [0u8; 6];
        let mut reader = BoundedReader::new(&data);
        reader
            .with_limit(4, |r| {
                r.skip(1)?;
                r.skip_to_limit()
            })
            .unwrap();
        assert_eq!(reader.position(), 4);

        let err = reader.with_limit(5, |r| r.skip_to_limit()).unwrap_err();
        assert!(err.is_end_of_stream());
    }
}
