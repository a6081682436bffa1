use std::io;

use crate::file::{closed_handle, BinaryFile, IoState, SeekOrigin};

/// An in-memory file.
///
/// Behaves like a regular seekable file over a `Vec<u8>`: writes past the end extend it, and
/// seeking past the end is allowed (a later write zero-fills the gap). The capabilities reported
/// through [`BinaryFile`] are configurable, which makes it possible to model read-only,
/// write-only or non-seekable handles.
#[derive(Clone, Debug)]
pub struct MemoryFile {
    data: Vec<u8>,
    pos: usize,
    state: IoState,
    read_limit: Option<usize>,
    closed: bool,
}

impl Default for MemoryFile {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFile {
    /// Creates an empty, readable, writable, seekable file.
    pub fn new() -> Self {
        Self::with_state(Vec::new(), IoState::READ_WRITE)
    }

    /// Creates a readable, writable, seekable file holding `data`, positioned at the start.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::with_state(data.into(), IoState::READ_WRITE)
    }

    /// Creates a file with explicit capabilities.
    pub fn with_state(data: Vec<u8>, state: IoState) -> Self {
        Self {
            data,
            pos: 0,
            state,
            read_limit: None,
            closed: false,
        }
    }

    /// Caps the number of bytes a single `read` call returns. Used to simulate devices that
    /// return short reads.
    pub fn set_read_limit(&mut self, limit: Option<usize>) {
        self.read_limit = limit;
    }

    /// Truncates or zero-extends the contents. The position is left unchanged.
    pub fn set_len(&mut self, len: usize) {
        self.data.resize(len, 0);
    }

    /// Current length of the contents.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the file holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The contents of the file.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the file and returns its contents.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_open(&self) -> io::Result<()> {
        if self.closed {
            Err(closed_handle())
        } else {
            Ok(())
        }
    }
}

impl BinaryFile for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_open()?;
        if !self.state.can_read {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file is not open for reading",
            ));
        }
        let available = self.data.len().saturating_sub(self.pos);
        let mut n = buf.len().min(available);
        if let Some(limit) = self.read_limit {
            n = n.min(limit);
        }
        if n == 0 {
            return Ok(0);
        }
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.check_open()?;
        if !self.state.can_write {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file is not open for writing",
            ));
        }
        if self.state.can_append {
            self.pos = self.data.len();
        }
        let end = self.pos + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(())
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> io::Result<u64> {
        self.check_open()?;
        if !self.state.can_seek {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "file does not support seeking",
            ));
        }
        let base = match origin {
            SeekOrigin::Begin => 0,
            SeekOrigin::Current => self.pos as i64,
            SeekOrigin::End => self.data.len() as i64,
        };
        let target = base.checked_add(offset).filter(|&p| p >= 0).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot seek to a negative position",
            )
        })?;
        self.pos = target as usize;
        Ok(self.pos as u64)
    }

    fn tell(&mut self) -> io::Result<u64> {
        self.check_open()?;
        Ok(self.pos as u64)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_open()
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }

    fn can_read(&self) -> bool {
        self.state.can_read
    }

    fn can_write(&self) -> bool {
        self.state.can_write
    }

    fn can_seek(&self) -> bool {
        self.state.can_seek
    }

    fn can_append(&self) -> bool {
        self.state.can_append
    }
}
