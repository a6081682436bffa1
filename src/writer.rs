use std::future::Future;
use std::sync::Arc;

use crate::encoding::{Encoding, EncodingSource};
use crate::error::{check_range, Error, Result};
use crate::file::{BinaryFile, FileHandle, SeekOrigin};
use crate::varint;

/// How `write_string_mode` frames a string.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum StringMode {
    /// `[7-bit encoded byte length][bytes]`, readable with `BinaryReader::read_string`.
    #[default]
    LengthPrefixed,
    /// `[bytes][encoded NUL]`
    CStr,
    /// `[bytes]` only. The reader must know the byte length.
    Raw,
}

/// Something that can be closed, synchronously or from async code.
pub trait Close {
    /// Closes the object. Closing twice is not an error.
    fn close(&mut self) -> Result<()>;

    /// Async form of [`Close::close`].
    ///
    /// The provided implementation calls `self.close()`, so a type that only customizes `close`
    /// gets its own logic run from async callers too. The work itself is blocking.
    fn close_async(&mut self) -> impl Future<Output = Result<()>> {
        async move { self.close() }
    }
}

/// Encodes primitive values into a file, using the same rules as .NET's
/// `System.IO.BinaryWriter`.
///
/// Every `write_*` call goes straight to the file; the writer does no buffering of its own.
pub struct BinaryWriter<F: BinaryFile> {
    file: F,
    encoding: Arc<dyn Encoding>,
    leave_open: bool,
    closed: bool,
}

impl BinaryWriter<FileHandle> {
    /// Creates a writer over the platform's null device. Everything written is discarded.
    pub fn null() -> Result<Self> {
        Self::new(FileHandle::null_device()?)
    }
}

impl<F: BinaryFile> BinaryWriter<F> {
    /// Creates a UTF-8 writer that closes `file` when it is closed.
    pub fn new(file: F) -> Result<Self> {
        Self::with_options(file, EncodingSource::default(), false)
    }

    /// Creates a writer using `encoding`, which may be an encoding name or an
    /// `Arc<dyn Encoding>`. If `leave_open` is true, closing the writer only flushes `file`.
    pub fn with_options(
        file: F,
        encoding: impl Into<EncodingSource>,
        leave_open: bool,
    ) -> Result<Self> {
        if !file.can_write() {
            return Err(Error::NotWritable);
        }
        let encoding = encoding.into().resolve()?;
        tracing::debug!(
            encoding = encoding.name(),
            leave_open,
            "created binary writer"
        );
        Ok(Self {
            file,
            encoding,
            leave_open,
            closed: false,
        })
    }

    /// The encoding used for characters and strings.
    pub fn encoding(&self) -> &Arc<dyn Encoding> {
        &self.encoding
    }

    /// Flushes, then returns the underlying file.
    pub fn base_file(&mut self) -> Result<&mut F> {
        self.flush()?;
        Ok(&mut self.file)
    }

    /// Accesses the underlying file.
    pub fn inner_mut(&mut self) -> &mut F {
        &mut self.file
    }

    /// Extracts the underlying file.
    pub fn into_inner(self) -> F {
        self.file
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Closes the writer. The underlying file is closed, or only flushed if the writer was
    /// created with `leave_open`. Calling `close` again does nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        tracing::debug!(leave_open = self.leave_open, "closing binary writer");
        if self.leave_open {
            self.file.flush()?;
        } else {
            self.file.close()?;
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    /// Pushes any buffered data to the underlying device.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        Ok(self.file.flush()?)
    }

    /// Sets the position of the underlying file and returns the new position.
    pub fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.file.seek(offset, origin)?)
    }

    /// Returns the position of the underlying file.
    pub fn tell(&mut self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.file.tell()?)
    }

    /// Writes `bytes` to the output.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_open()?;
        Ok(self.file.write(bytes)?)
    }

    /// Writes `count` bytes of `bytes`, starting at `index`.
    pub fn write_bytes_ex(&mut self, bytes: &[u8], index: usize, count: usize) -> Result<()> {
        check_range(bytes.len(), index, count)?;
        self.write_bytes(&bytes[index..index + count])
    }

    /// Writes a small, fixed-size array of bytes.
    pub fn write_cbytes<const N: usize>(&mut self, value: [u8; N]) -> Result<()> {
        self.write_bytes(&value)
    }

    /// Writes a single `u8` value
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_cbytes([value])
    }

    /// Writes a single `i8` value
    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_cbytes([value as u8])
    }

    /// Writes a `bool` value. True is encoded as 1. False is encoded as 0.
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(value as u8)
    }

    /// Writes a single `u16` value
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_cbytes(value.to_le_bytes())
    }

    /// Writes a single `u32` value
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_cbytes(value.to_le_bytes())
    }

    /// Writes a single `u64` value
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_cbytes(value.to_le_bytes())
    }

    /// Writes a single `i16` value
    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        self.write_cbytes(value.to_le_bytes())
    }

    /// Writes a single `i32` value
    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_cbytes(value.to_le_bytes())
    }

    /// Writes a single `i64` value
    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_cbytes(value.to_le_bytes())
    }

    /// Writes an `f32` value. The value is encoded using its 4-byte little-endian in-memory
    /// representation.
    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.write_cbytes(value.to_le_bytes())
    }

    /// Writes an `f64` value. The value is encoded using its 8-byte little-endian in-memory
    /// representation.
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write_cbytes(value.to_le_bytes())
    }

    /// Encodes an `i32` value using a variable-length encoding.
    ///
    /// Although this function takes `i32` values, applications should avoid using this for
    /// negative values. This function can correctly encode negative values, but most "small"
    /// negative value (e.g. `-10`) will be encoded with the maximum number of bytes, which wastes
    /// space.
    pub fn write_7bit_encoded_i32(&mut self, value: i32) -> Result<()> {
        let mut buf = [0u8; varint::MAX_I32_LEN];
        let len = varint::encode_i32(value, &mut buf);
        self.write_bytes(&buf[..len])
    }

    /// Encodes an `i64` value using a variable-length encoding.
    ///
    /// The same caveat about negative values as [`Self::write_7bit_encoded_i32`] applies.
    pub fn write_7bit_encoded_i64(&mut self, value: i64) -> Result<()> {
        let mut buf = [0u8; varint::MAX_I64_LEN];
        let len = varint::encode_i64(value, &mut buf);
        self.write_bytes(&buf[..len])
    }

    /// Writes a character in the writer's encoding.
    ///
    /// Only characters that are a single UTF-16 code unit are accepted; others fail with
    /// [`Error::InvalidArgument`].
    pub fn write_char(&mut self, ch: char) -> Result<()> {
        if ch.len_utf16() != 1 {
            return Err(Error::invalid_argument(
                "ch",
                format!("{ch:?} is not a single UTF-16 code unit"),
            ));
        }
        self.ensure_open()?;
        let mut buf = [0u8; 4];
        let bytes = self.encoding.encode(ch.encode_utf8(&mut buf));
        self.write_bytes(&bytes)
    }

    /// Writes the character with UTF-16 code unit `unit`. Surrogate halves are rejected.
    pub fn write_char_code(&mut self, unit: u16) -> Result<()> {
        match char::from_u32(unit as u32) {
            Some(ch) => self.write_char(ch),
            None => Err(Error::invalid_argument(
                "unit",
                format!("surrogate {unit:#06x} is not allowed as a single character"),
            )),
        }
    }

    /// Writes a sequence of UTF-16 code units in the writer's encoding with a single write.
    ///
    /// Unlike [`write_char_code`](Self::write_char_code), unpaired surrogates are allowed here.
    /// Whether they survive depends on the encoding: the UTF-16 encodings write them as-is,
    /// UTF-8 writes U+FFFD.
    pub fn write_chars(&mut self, chars: &[u16]) -> Result<()> {
        self.ensure_open()?;
        let bytes = self.encoding.encode_units(chars);
        self.write_bytes(&bytes)
    }

    /// Writes `count` code units of `chars`, starting at `index`.
    pub fn write_chars_ex(&mut self, chars: &[u16], index: usize, count: usize) -> Result<()> {
        check_range(chars.len(), index, count)?;
        self.write_chars(&chars[index..index + count])
    }

    /// Writes a string in length-prefixed form: the byte length of the encoded string as a
    /// 7-bit encoded `i32`, followed by the encoded bytes.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        let len = self.encoding.byte_length(value);
        let len_i32 = i32::try_from(len).map_err(|_| {
            Error::invalid_argument(
                "value",
                format!("{len} bytes is too long for a length-prefixed string"),
            )
        })?;
        self.ensure_open()?;
        self.write_7bit_encoded_i32(len_i32)?;
        self.write_raw_string(value)
    }

    /// Writes the encoded string followed by an encoded NUL character.
    pub fn write_cstring(&mut self, value: &str) -> Result<()> {
        self.write_raw_string(value)?;
        let nul = self.encoding.encode("\0");
        self.write_bytes(&nul)
    }

    /// Writes the encoded string with no length prefix and no terminator.
    pub fn write_raw_string(&mut self, value: &str) -> Result<()> {
        self.ensure_open()?;
        let bytes = self.encoding.encode(value);
        self.write_bytes(&bytes)
    }

    /// Writes a string framed according to `mode`.
    pub fn write_string_mode(&mut self, value: &str, mode: StringMode) -> Result<()> {
        match mode {
            StringMode::LengthPrefixed => self.write_string(value),
            StringMode::CStr => self.write_cstring(value),
            StringMode::Raw => self.write_raw_string(value),
        }
    }
}

impl<F: BinaryFile> Close for BinaryWriter<F> {
    fn close(&mut self) -> Result<()> {
        BinaryWriter::close(self)
    }
}
