//! The file-handle capability that readers and writers operate on.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Error, Result};

/// Specifies the position in a file to use for seeking.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SeekOrigin {
    /// The beginning of the file.
    Begin,
    /// The current position.
    Current,
    /// The end of the file.
    End,
}

impl SeekOrigin {
    /// Converts `offset`, relative to this origin, into a `SeekFrom`.
    pub fn to_seek_from(self, offset: i64) -> io::Result<SeekFrom> {
        match self {
            Self::Begin => u64::try_from(offset).map(SeekFrom::Start).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "cannot seek to a negative position",
                )
            }),
            Self::Current => Ok(SeekFrom::Current(offset)),
            Self::End => Ok(SeekFrom::End(offset)),
        }
    }
}

/// What a file handle can be used for.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct IoState {
    /// Reads are allowed
    pub can_read: bool,
    /// Writes are allowed
    pub can_write: bool,
    /// Writes always go to the end of the file
    pub can_append: bool,
    /// The position can be queried and changed
    pub can_seek: bool,
}

impl IoState {
    /// A readable, writable, seekable file.
    pub const READ_WRITE: Self = Self {
        can_read: true,
        can_write: true,
        can_append: false,
        can_seek: true,
    };
}

/// A blocking, byte-oriented file handle.
///
/// `read` may return fewer bytes than requested; a return value of 0 means no more data is
/// available at this call. `write` writes all of the given bytes or fails.
pub trait BinaryFile {
    /// Reads up to `buf.len()` bytes into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes all of `buf`.
    fn write(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Moves the position to `offset` relative to `origin` and returns the new position.
    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> io::Result<u64>;

    /// Returns the current position.
    fn tell(&mut self) -> io::Result<u64>;

    /// Pushes any buffered writes to the underlying device.
    fn flush(&mut self) -> io::Result<()>;

    /// Closes the handle. Closing an already-closed handle does nothing.
    fn close(&mut self) -> io::Result<()>;

    /// Whether the handle was opened for reading.
    fn can_read(&self) -> bool;

    /// Whether the handle was opened for writing.
    fn can_write(&self) -> bool;

    /// Whether the handle supports `seek` and `tell`.
    fn can_seek(&self) -> bool;

    /// Whether the handle was opened in append mode.
    fn can_append(&self) -> bool;
}

impl<T: BinaryFile + ?Sized> BinaryFile for &mut T {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }
    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        (**self).write(buf)
    }
    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> io::Result<u64> {
        (**self).seek(offset, origin)
    }
    fn tell(&mut self) -> io::Result<u64> {
        (**self).tell()
    }
    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
    fn can_read(&self) -> bool {
        (**self).can_read()
    }
    fn can_write(&self) -> bool {
        (**self).can_write()
    }
    fn can_seek(&self) -> bool {
        (**self).can_seek()
    }
    fn can_append(&self) -> bool {
        (**self).can_append()
    }
}

impl<T: BinaryFile + ?Sized> BinaryFile for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }
    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        (**self).write(buf)
    }
    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> io::Result<u64> {
        (**self).seek(offset, origin)
    }
    fn tell(&mut self) -> io::Result<u64> {
        (**self).tell()
    }
    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
    fn can_read(&self) -> bool {
        (**self).can_read()
    }
    fn can_write(&self) -> bool {
        (**self).can_write()
    }
    fn can_seek(&self) -> bool {
        (**self).can_seek()
    }
    fn can_append(&self) -> bool {
        (**self).can_append()
    }
}

pub(crate) fn closed_handle() -> io::Error {
    io::Error::other("bad file handle: the file is closed")
}

/// Write buffer size of a newly opened [`FileHandle`].
pub const DEFAULT_BUF_SIZE: usize = 4096;

/// A thin wrapper over `std::fs::File` that remembers how the file was opened.
///
/// Writes are collected in a buffer of [`DEFAULT_BUF_SIZE`] bytes, which is flushed before any
/// read, seek or position query, on `flush` and `close`, and when the handle is dropped.
#[derive(Debug)]
pub struct FileHandle {
    file: Option<File>,
    state: IoState,
    buf: Vec<u8>,
    buf_size: usize,
}

impl FileHandle {
    /// Opens `path` using an fopen-style `mode`: `r`, `r+`, `w`, `w+`, `a` or `a+`, optionally
    /// with a `b`, which is ignored since every file is binary here.
    pub fn open(path: impl AsRef<Path>, mode: &str) -> Result<Self> {
        let (options, state) = parse_mode(mode)?;
        let file = options.open(path)?;
        Ok(Self::from_std(file, state))
    }

    /// Wraps an open file. `state.can_seek` is ignored and queried from the file instead.
    pub fn from_std(mut file: File, state: IoState) -> Self {
        let can_seek = file.stream_position().is_ok();
        Self {
            file: Some(file),
            state: IoState { can_seek, ..state },
            buf: Vec::new(),
            buf_size: DEFAULT_BUF_SIZE,
        }
    }

    /// Opens the platform's discard device for writing.
    pub fn null_device() -> Result<Self> {
        let path = if cfg!(windows) { "NUL" } else { "/dev/null" };
        tracing::debug!(path, "opening null device");
        let file = OpenOptions::new().write(true).open(path)?;
        Ok(Self::from_std(
            file,
            IoState {
                can_write: true,
                ..IoState::default()
            },
        ))
    }

    /// The capabilities this handle was opened with.
    pub fn state(&self) -> IoState {
        self.state
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// Size of the write buffer. 0 means writes go straight to the file.
    pub fn buf_size(&self) -> usize {
        self.buf_size
    }

    /// Flushes pending writes and changes the size of the write buffer. A size of 0 disables
    /// buffering.
    pub fn set_buf_size(&mut self, size: usize) -> Result<()> {
        self.flush_buf()?;
        self.buf_size = size;
        self.buf = Vec::with_capacity(size);
        Ok(())
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file.as_mut().ok_or_else(closed_handle)
    }

    fn flush_buf(&mut self) -> io::Result<()> {
        let file = self.file.as_mut().ok_or_else(closed_handle)?;
        if self.buf.is_empty() {
            return Ok(());
        }
        let result = file.write_all(&self.buf);
        self.buf.clear();
        result
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if self.file.is_some() && !self.buf.is_empty() {
            if let Err(e) = self.flush_buf() {
                tracing::warn!(error = %e, "failed to flush buffered writes");
            }
        }
    }
}

fn parse_mode(mode: &str) -> Result<(OpenOptions, IoState)> {
    let flags: String = mode.chars().filter(|&c| c != 'b').collect();
    let mut options = OpenOptions::new();
    let mut state = IoState::default();
    match flags.as_str() {
        "r" => {
            options.read(true);
            state.can_read = true;
        }
        "r+" => {
            options.read(true).write(true);
            state.can_read = true;
            state.can_write = true;
        }
        "w" => {
            options.write(true).create(true).truncate(true);
            state.can_write = true;
        }
        "w+" => {
            options.read(true).write(true).create(true).truncate(true);
            state.can_read = true;
            state.can_write = true;
        }
        "a" => {
            options.append(true).create(true);
            state.can_write = true;
            state.can_append = true;
        }
        "a+" => {
            options.read(true).append(true).create(true);
            state.can_read = true;
            state.can_write = true;
            state.can_append = true;
        }
        _ => {
            return Err(Error::invalid_argument(
                "mode",
                format!("{mode:?} is not a valid file mode"),
            ))
        }
    }
    Ok((options, state))
}

impl BinaryFile for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.flush_buf()?;
        let file = self.file()?;
        // Keep reading until `buf` is full or the file is exhausted, like fread().
        let mut total = 0;
        while total < buf.len() {
            match file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file()?;
        if self.buf.len() + buf.len() > self.buf_size {
            self.flush_buf()?;
        }
        if buf.len() >= self.buf_size {
            return self.file()?.write_all(buf);
        }
        self.buf.extend_from_slice(buf);
        Ok(())
    }

    fn seek(&mut self, offset: i64, origin: SeekOrigin) -> io::Result<u64> {
        let pos = origin.to_seek_from(offset)?;
        self.flush_buf()?;
        self.file()?.seek(pos)
    }

    fn tell(&mut self) -> io::Result<u64> {
        self.flush_buf()?;
        self.file()?.stream_position()
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buf()?;
        self.file()?.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        if self.file.is_none() {
            return Ok(());
        }
        let flushed = self.flush_buf();
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        flushed
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
