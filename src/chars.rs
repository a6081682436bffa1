//! Reads character data from a file in bounded chunks.

use std::collections::VecDeque;

use crate::encoding::{Decoder, Encoding};
use crate::error::{Error, Result};
use crate::file::BinaryFile;

/// Upper bound on the bytes read from the file for one decode step.
pub(crate) const MAX_CHAR_BYTES: usize = 128;

/// A decoder plus the scratch space needed to feed it from a file.
///
/// The decoder keeps partial multi-byte sequences between calls, so every character read made
/// through one reader shares this state.
pub(crate) struct CharDecoder {
    pub(crate) decoder: Box<dyn Decoder>,
    pub(crate) two_bytes_per_char: bool,
    pub(crate) bytes: [u8; MAX_CHAR_BYTES],
    units: Vec<u16>,
    /// Code units the decoder produced beyond what the caller's buffer could hold.
    pub(crate) carry: VecDeque<u16>,
}

impl CharDecoder {
    pub(crate) fn new(encoding: &dyn Encoding) -> Self {
        Self {
            decoder: encoding.new_decoder(),
            two_bytes_per_char: encoding.is_fixed_two_byte(),
            bytes: [0; MAX_CHAR_BYTES],
            units: Vec::with_capacity(MAX_CHAR_BYTES),
            carry: VecDeque::new(),
        }
    }

    /// Fills `dest` with code units decoded from `file` and returns how many were stored.
    ///
    /// Returns fewer than `dest.len()` only when the file has no more bytes. Positions past the
    /// returned count are not touched.
    pub(crate) fn read_into<F: BinaryFile + ?Sized>(
        &mut self,
        file: &mut F,
        dest: &mut [u16],
    ) -> Result<usize> {
        let mut filled = 0;
        while filled < dest.len() {
            let Some(unit) = self.carry.pop_front() else {
                break;
            };
            dest[filled] = unit;
            filled += 1;
        }

        while filled < dest.len() {
            let remaining = dest.len() - filled;

            // Read as few bytes as possible. Assume one byte can complete a character, unless
            // the encoding always uses two.
            let mut num_bytes = if self.two_bytes_per_char {
                remaining.saturating_mul(2)
            } else {
                remaining
            };

            // The decoder needs fewer fresh bytes if it is holding part of a character already.
            if num_bytes > 1 && self.decoder.has_pending_state() {
                num_bytes -= 1;
                if self.two_bytes_per_char && num_bytes > 2 {
                    num_bytes -= 2;
                }
            }
            num_bytes = num_bytes.min(MAX_CHAR_BYTES);

            let n = file.read(&mut self.bytes[..num_bytes])?;
            if n == 0 {
                break;
            }

            self.units.clear();
            self.decoder.write(&self.bytes[..n], &mut self.units);

            let take = self.units.len().min(remaining);
            dest[filled..filled + take].copy_from_slice(&self.units[..take]);
            self.carry.extend(&self.units[take..]);
            filled += take;
        }

        Ok(filled)
    }

    /// Puts the decoder back into the state it had when its pending bytes were `saved`.
    pub(crate) fn restore_pending(&mut self, saved: &[u8]) {
        self.decoder.reset();
        self.units.clear();
        self.decoder.write(saved, &mut self.units);
        self.units.clear();
    }

    /// Reads exactly `byte_len` bytes from `file` and decodes them.
    ///
    /// Fails with [`Error::ReadPastEnd`] if the file runs out first.
    pub(crate) fn decode_exact<F: BinaryFile + ?Sized>(
        &mut self,
        file: &mut F,
        byte_len: usize,
    ) -> Result<String> {
        let mut out: Vec<u16> = Vec::new();
        let mut consumed = 0;
        while consumed < byte_len {
            let want = (byte_len - consumed).min(MAX_CHAR_BYTES);
            let n = file.read(&mut self.bytes[..want])?;
            if n == 0 {
                return Err(Error::ReadPastEnd);
            }
            self.decoder.write(&self.bytes[..n], &mut out);
            consumed += n;
        }
        Ok(String::from_utf16_lossy(&out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{Utf16Le, Utf8};
    use crate::memory::MemoryFile;

    #[test]
    fn short_reads_across_surrogate_pair() {
        let text = "hello world \u{1f603}!";
        let expected: Vec<u16> = text.encode_utf16().collect();

        for limit in 1..8 {
            let mut file = MemoryFile::from_bytes(Utf16Le.encode(text));
            file.set_read_limit(Some(limit));
            let mut chars = CharDecoder::new(&Utf16Le);
            let mut dest = vec![0u16; expected.len()];
            assert_eq!(chars.read_into(&mut file, &mut dest).unwrap(), expected.len());
            assert_eq!(dest, expected, "limit = {limit}");
            assert_eq!(file.tell().unwrap(), file.len() as u64);
        }
    }

    #[test]
    fn does_not_over_read() {
        let mut bytes = "abc".as_bytes().to_vec();
        bytes.extend_from_slice(&[0xaa, 0xbb]);
        let mut file = MemoryFile::from_bytes(bytes);
        let mut chars = CharDecoder::new(&Utf8);
        let mut dest = [0u16; 3];
        assert_eq!(chars.read_into(&mut file, &mut dest).unwrap(), 3);
        assert_eq!(file.tell().unwrap(), 3);
    }

    #[test]
    fn overflow_is_carried() {
        // One slot left, but the next character is a surrogate pair.
        let mut file = MemoryFile::from_bytes(Utf8.encode("a\u{1f603}b"));
        let mut chars = CharDecoder::new(&Utf8);
        let mut dest = [0u16; 2];
        assert_eq!(chars.read_into(&mut file, &mut dest).unwrap(), 2);
        assert_eq!(dest, [b'a' as u16, 0xd83d]);

        let mut rest = [0u16; 2];
        assert_eq!(chars.read_into(&mut file, &mut rest).unwrap(), 2);
        assert_eq!(rest, [0xde03, b'b' as u16]);
    }

    #[test]
    fn decode_exact_runs_out() {
        let mut file = MemoryFile::from_bytes(b"abc".to_vec());
        let mut chars = CharDecoder::new(&Utf8);
        assert!(matches!(
            chars.decode_exact(&mut file, 4),
            Err(Error::ReadPastEnd)
        ));
    }
}
