use std::sync::Arc;

use crate::chars::CharDecoder;
use crate::encoding::{Encoding, EncodingSource};
use crate::error::{check_range, Error, Result};
use crate::file::{BinaryFile, SeekOrigin};
use crate::varint;
use crate::writer::Close;

const PREFIXED_CHUNK: usize = 4096;

/// Reads primitive values from a file. The values are encoded using the rules defined by .NET's
/// `System.IO.BinaryWriter`.
///
/// Fixed-size numeric types are stored in their little-endian in-memory representation. Reads
/// of fixed-size values are not short-read tolerant: if the file ends before all of the bytes of
/// a value are available, the read fails with [`Error::ReadPastEnd`]. The byte and character
/// buffer reads (`read_bytes`, `read_chars` and friends) instead return however much was
/// available.
///
/// Character data is decoded with the reader's [`Encoding`] into UTF-16 code units. The decoder
/// is shared by all character and string reads, so a multi-byte character split across two
/// calls still decodes correctly.
///
/// `F` is usually either an owned file or `&mut` to one. Closing the reader closes the file
/// unless the reader was created with `leave_open` set.
pub struct BinaryReader<F: BinaryFile> {
    file: F,
    encoding: Arc<dyn Encoding>,
    chars: CharDecoder,
    leave_open: bool,
    closed: bool,
    can_seek: bool,
    /// Number of bytes consumed by the most recent `read_char_code` call.
    last_char_byte_count: usize,
}

impl<F: BinaryFile> BinaryReader<F> {
    /// Creates a UTF-8 reader that closes `file` when it is closed.
    pub fn new(file: F) -> Result<Self> {
        Self::with_options(file, EncodingSource::default(), false)
    }

    /// Creates a reader using `encoding`, which may be an encoding name or an
    /// `Arc<dyn Encoding>`. If `leave_open` is true, closing the reader leaves `file` open.
    pub fn with_options(
        file: F,
        encoding: impl Into<EncodingSource>,
        leave_open: bool,
    ) -> Result<Self> {
        if !file.can_read() {
            return Err(Error::NotReadable);
        }
        let encoding = encoding.into().resolve()?;
        let can_seek = file.can_seek();
        tracing::debug!(
            encoding = encoding.name(),
            leave_open,
            can_seek,
            "created binary reader"
        );
        Ok(Self {
            chars: CharDecoder::new(encoding.as_ref()),
            file,
            encoding,
            leave_open,
            closed: false,
            can_seek,
            last_char_byte_count: 0,
        })
    }

    /// The encoding used for characters and strings.
    pub fn encoding(&self) -> &Arc<dyn Encoding> {
        &self.encoding
    }

    /// The underlying file.
    pub fn base_file(&mut self) -> &mut F {
        &mut self.file
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

    /// Closes the reader, and the underlying file unless the reader was created with
    /// `leave_open`. Calling `close` again does nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        tracing::debug!(leave_open = self.leave_open, "closing binary reader");
        if !self.leave_open {
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

    /// Reads exactly `buf.len()` bytes, looping over short reads.
    fn read_exact_internal(&mut self, buf: &mut [u8]) -> Result<()> {
        self.ensure_open()?;
        let mut done = 0;
        while done < buf.len() {
            let n = self.file.read(&mut buf[done..])?;
            if n == 0 {
                return Err(Error::ReadPastEnd);
            }
            done += n;
        }
        Ok(())
    }

    /// Reads a small array of bytes, with a constant length.
    #[inline(always)]
    pub fn read_cbytes<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact_internal(&mut buf)?;
        Ok(buf)
    }

    /// Reads a single `u8` value.
    pub fn read_u8(&mut self) -> Result<u8> {
        let [b] = self.read_cbytes()?;
        Ok(b)
    }

    /// Reads a single `i8` value.
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Reads a `bool`. Any non-zero byte is `true`.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a `u16` in little-endian byte order.
    #[inline(always)]
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_cbytes()?))
    }

    /// Reads a `u32` in little-endian byte order.
    #[inline(always)]
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_cbytes()?))
    }

    /// Reads a `u64` in little-endian byte order.
    #[inline(always)]
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_cbytes()?))
    }

    /// Reads a `i16` in little-endian byte order.
    #[inline(always)]
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.read_cbytes()?))
    }

    /// Reads a `i32` in little-endian byte order.
    #[inline(always)]
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_cbytes()?))
    }

    /// Reads a `i64` in little-endian byte order.
    #[inline(always)]
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_cbytes()?))
    }

    /// Reads an `f32` from its 4-byte little-endian representation.
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_cbytes()?))
    }

    /// Reads an `f64` from its 8-byte little-endian representation.
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_cbytes()?))
    }

    /// Reads a variable-length integer and returns the value in `i32`.
    pub fn read_7bit_encoded_i32(&mut self) -> Result<i32> {
        self.ensure_open()?;
        varint::decode_i32(|| self.read_u8())
    }

    /// Reads a variable-length integer and returns the value in `i64`.
    pub fn read_7bit_encoded_i64(&mut self) -> Result<i64> {
        self.ensure_open()?;
        varint::decode_i64(|| self.read_u8())
    }

    /// Decodes a single character and returns it as a UTF-16 code unit, or `None` if the file
    /// has no more bytes.
    ///
    /// If the bytes read decode to more than one code unit (a character outside the Basic
    /// Multilingual Plane, or a surrogate pair), this fails with
    /// [`Error::SurrogateEncountered`] and, if the file can seek, moves the position back to
    /// where it was before the call.
    pub fn read_char_code(&mut self) -> Result<Option<u16>> {
        self.ensure_open()?;
        self.last_char_byte_count = 0;

        if let Some(unit) = self.chars.carry.pop_front() {
            return Ok(Some(unit));
        }

        let width = if self.chars.two_bytes_per_char { 2 } else { 1 };
        let mut units: Vec<u16> = Vec::with_capacity(2);
        loop {
            let mut num_bytes = 0;
            while num_bytes < width {
                let n = self
                    .file
                    .read(&mut self.chars.bytes[num_bytes..num_bytes + 1])?;
                if n == 0 {
                    break;
                }
                num_bytes += 1;
            }
            self.last_char_byte_count += num_bytes;
            if num_bytes == 0 {
                return Ok(None);
            }

            self.chars
                .decoder
                .write(&self.chars.bytes[..num_bytes], &mut units);
            match units.len() {
                0 => continue,
                1 => return Ok(Some(units[0])),
                _ => {
                    let consumed = self.last_char_byte_count;
                    self.last_char_byte_count = 0;
                    if self.can_seek {
                        tracing::trace!(consumed, "surrogate hit in single char read, rewinding");
                        self.file.seek(-(consumed as i64), SeekOrigin::Current)?;
                    }
                    return Err(Error::SurrogateEncountered);
                }
            }
        }
    }

    /// Reads a single character. Fails with [`Error::ReadPastEnd`] at the end of the file.
    pub fn read_char(&mut self) -> Result<u16> {
        self.read_char_code()?.ok_or(Error::ReadPastEnd)
    }

    /// Returns the next character without consuming it.
    ///
    /// Returns `None` at the end of the file, and always returns `None` if the file cannot seek.
    pub fn peek_char(&mut self) -> Result<Option<u16>> {
        self.ensure_open()?;
        if !self.can_seek {
            return Ok(None);
        }
        if let Some(&unit) = self.chars.carry.front() {
            return Ok(Some(unit));
        }

        // Reading may leave bytes in the decoder, e.g. half a character at the end of the
        // file. Those must not be seen twice.
        let saved = self.chars.decoder.pending().to_vec();
        let ch = self.read_char_code();
        let consumed = self.last_char_byte_count;
        if consumed != 0 {
            self.file.seek(-(consumed as i64), SeekOrigin::Current)?;
        }
        self.chars.restore_pending(&saved);
        ch
    }

    /// Reads a length-prefixed string.
    ///
    /// The prefix is a 7-bit encoded `i32` holding the length of the string in bytes, not
    /// characters. A negative length fails with [`Error::InvalidEncodedLength`].
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_string_len()?;
        if len == 0 {
            return Ok(String::new());
        }
        self.chars.decode_exact(&mut self.file, len)
    }

    /// Reads a string of `byte_len` bytes that has no length prefix.
    pub fn read_raw_string(&mut self, byte_len: usize) -> Result<String> {
        self.ensure_open()?;
        if byte_len == 0 {
            return Ok(String::new());
        }
        self.chars.decode_exact(&mut self.file, byte_len)
    }

    fn read_string_len(&mut self) -> Result<usize> {
        let len = self.read_7bit_encoded_i32()?;
        usize::try_from(len).map_err(|_| Error::InvalidEncodedLength(len))
    }

    /// Reads a length-prefixed string and returns its bytes without decoding them.
    pub fn read_prefixed_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_string_len()?;
        // The length comes from the file, so grow the buffer as bytes actually arrive.
        let mut bytes = Vec::with_capacity(len.min(PREFIXED_CHUNK));
        let mut chunk = [0u8; PREFIXED_CHUNK];
        while bytes.len() < len {
            let want = (len - bytes.len()).min(PREFIXED_CHUNK);
            let n = self.file.read(&mut chunk[..want])?;
            if n == 0 {
                return Err(Error::ReadPastEnd);
            }
            bytes.extend_from_slice(&chunk[..n]);
        }
        Ok(bytes)
    }

    /// Reads a length-prefixed string and returns its bytes as a `bstr::BString`, without
    /// decoding or validating them.
    #[cfg(feature = "bstr")]
    pub fn read_prefixed_bstring(&mut self) -> Result<bstr::BString> {
        Ok(bstr::BString::from(self.read_prefixed_bytes()?))
    }

    /// Reads up to `count` characters.
    ///
    /// The result is shorter than `count` if the end of the file is reached first.
    pub fn read_chars(&mut self, count: usize) -> Result<Vec<u16>> {
        self.ensure_open()?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut chars = vec![0u16; count];
        let n = self.chars.read_into(&mut self.file, &mut chars)?;
        chars.truncate(n);
        Ok(chars)
    }

    /// Reads characters until `buffer` is full or the file ends, and returns the number of
    /// characters stored.
    pub fn read_into_chars(&mut self, buffer: &mut [u16]) -> Result<usize> {
        self.ensure_open()?;
        self.chars.read_into(&mut self.file, buffer)
    }

    /// Reads up to `count` characters into `buffer`, starting at `index`, and returns the
    /// number of characters stored. Elements after the last one stored are left unchanged.
    pub fn read_into_chars_ex(
        &mut self,
        buffer: &mut [u16],
        index: usize,
        count: usize,
    ) -> Result<usize> {
        check_range(buffer.len(), index, count)?;
        self.read_into_chars(&mut buffer[index..index + count])
    }

    /// Reads up to `count` bytes. The result is shorter than `count` if the end of the file is
    /// reached first.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let mut bytes = vec![0u8; count];
        let mut num_read = 0;
        while num_read < count {
            let n = self.file.read(&mut bytes[num_read..])?;
            if n == 0 {
                break;
            }
            num_read += n;
        }
        bytes.truncate(num_read);
        Ok(bytes)
    }

    /// Reads into `buffer` with a single read of the underlying file and returns the number of
    /// bytes read, which may be less than `buffer.len()`.
    pub fn read_into_buffer(&mut self, buffer: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.file.read(buffer)?)
    }

    /// Reads up to `count` bytes into `buffer`, starting at `index`, with a single read of the
    /// underlying file.
    pub fn read_into_buffer_ex(
        &mut self,
        buffer: &mut [u8],
        index: usize,
        count: usize,
    ) -> Result<usize> {
        check_range(buffer.len(), index, count)?;
        self.read_into_buffer(&mut buffer[index..index + count])
    }
}

impl<F: BinaryFile> Close for BinaryReader<F> {
    fn close(&mut self) -> Result<()> {
        BinaryReader::close(self)
    }
}
