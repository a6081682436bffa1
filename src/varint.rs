//! The 7-bit variable-length integer format used for string length prefixes and compact integers.
//!
//! Each byte carries 7 bits of the value, least-significant group first. Bit 7 is set on every
//! byte except the last. Negative values are encoded through their two's-complement bit pattern,
//! so they always take the maximum number of bytes.

use crate::error::{Error, Result};

const MORE: u8 = 0x80;
const MASK: u8 = 0x7f;

/// Maximum encoded size of an `i32`.
pub const MAX_I32_LEN: usize = 5;

/// Maximum encoded size of an `i64`.
pub const MAX_I64_LEN: usize = 10;

/// Encodes `value` into `buf` and returns the number of bytes used.
pub fn encode_i32(value: i32, buf: &mut [u8; MAX_I32_LEN]) -> usize {
    let mut n = value as u32;
    let mut len = 0;
    while n > MASK as u32 {
        buf[len] = (n as u8 & MASK) | MORE;
        n >>= 7;
        len += 1;
    }
    buf[len] = n as u8;
    len + 1
}

/// Encodes `value` into `buf` and returns the number of bytes used.
pub fn encode_i64(value: i64, buf: &mut [u8; MAX_I64_LEN]) -> usize {
    let mut n = value as u64;
    let mut len = 0;
    while n > MASK as u64 {
        buf[len] = (n as u8 & MASK) | MORE;
        n >>= 7;
        len += 1;
    }
    buf[len] = n as u8;
    len + 1
}

/// Decodes an `i32`, pulling one byte at a time from `next_byte`.
///
/// Stops consuming as soon as a byte without the continuation bit is seen. Overlong encodings
/// (trailing groups that are all zero) are accepted, as .NET accepts them. The fifth byte may
/// only carry the 4 bits that remain after 28 have been read; anything more fails with
/// [`Error::BadVarintFormat`].
pub fn decode_i32(mut next_byte: impl FnMut() -> Result<u8>) -> Result<i32> {
    const BYTES_WITHOUT_OVERFLOW: u32 = 4;

    let mut n: u32 = 0;
    for i in 0..BYTES_WITHOUT_OVERFLOW {
        let b = next_byte()?;
        n |= ((b & MASK) as u32) << (i * 7);
        if b & MORE == 0 {
            return Ok(n as i32);
        }
    }

    let b = next_byte()?;
    if b > 0b1111 {
        return Err(Error::BadVarintFormat);
    }
    n |= (b as u32) << (BYTES_WITHOUT_OVERFLOW * 7);
    Ok(n as i32)
}

/// Decodes an `i64`, pulling one byte at a time from `next_byte`.
///
/// Same rules as [`decode_i32`], with nine full groups and a tenth byte limited to a single bit.
pub fn decode_i64(mut next_byte: impl FnMut() -> Result<u8>) -> Result<i64> {
    const BYTES_WITHOUT_OVERFLOW: u32 = 9;

    let mut n: u64 = 0;
    for i in 0..BYTES_WITHOUT_OVERFLOW {
        let b = next_byte()?;
        n |= ((b & MASK) as u64) << (i * 7);
        if b & MORE == 0 {
            return Ok(n as i64);
        }
    }

    let b = next_byte()?;
    if b > 0b1 {
        return Err(Error::BadVarintFormat);
    }
    n |= (b as u64) << (BYTES_WITHOUT_OVERFLOW * 7);
    Ok(n as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode32(bytes: &[u8]) -> Result<i32> {
        let mut it = bytes.iter().copied();
        decode_i32(|| it.next().ok_or(Error::ReadPastEnd))
    }

    fn decode64(bytes: &[u8]) -> Result<i64> {
        let mut it = bytes.iter().copied();
        decode_i64(|| it.next().ok_or(Error::ReadPastEnd))
    }

    #[test]
    fn overlong_is_accepted() {
        assert_eq!(decode32(&[0x9f, 0x00]).unwrap(), 0x1f);
        assert_eq!(decode64(&[0x9f, 0x00]).unwrap(), 0x1f);
        assert_eq!(decode32(&[0x81, 0x80, 0x80, 0x80, 0x00]).unwrap(), 1);
    }

    #[test]
    fn fifth_byte_overflow() {
        assert!(matches!(
            decode32(&[0x80, 0x80, 0x80, 0x80, 0x10]),
            Err(Error::BadVarintFormat)
        ));
        assert!(matches!(
            decode32(&[0x80, 0x80, 0x80, 0x80, 0x80]),
            Err(Error::BadVarintFormat)
        ));
    }

    #[test]
    fn tenth_byte_overflow() {
        let mut bytes = [0x80u8; 10];
        bytes[9] = 0x02;
        assert!(matches!(decode64(&bytes), Err(Error::BadVarintFormat)));
        assert!(matches!(decode64(&[0x80; 10]), Err(Error::BadVarintFormat)));
    }

    #[test]
    fn starved_input() {
        assert!(matches!(decode32(&[0x80, 0x80]), Err(Error::ReadPastEnd)));
        assert!(matches!(decode64(&[]), Err(Error::ReadPastEnd)));
    }

    #[test]
    fn stops_at_terminal_byte() {
        let bytes = [0x05, 0xff];
        let mut it = bytes.iter().copied();
        assert_eq!(decode_i32(|| it.next().ok_or(Error::ReadPastEnd)).unwrap(), 5);
        assert_eq!(it.next(), Some(0xff));
    }

    #[test]
    fn encoded_lengths() {
        let mut buf32 = [0; MAX_I32_LEN];
        assert_eq!(encode_i32(0, &mut buf32), 1);
        assert_eq!(encode_i32(0x7f, &mut buf32), 1);
        assert_eq!(encode_i32(0x80, &mut buf32), 2);
        assert_eq!(encode_i32(i32::MAX, &mut buf32), 5);
        assert_eq!(encode_i32(-1, &mut buf32), 5);

        let mut buf64 = [0; MAX_I64_LEN];
        assert_eq!(encode_i64(i64::MAX, &mut buf64), 9);
        assert_eq!(encode_i64(i64::MIN, &mut buf64), 10);
    }
}
