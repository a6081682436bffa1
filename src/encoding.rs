//! Character encodings.
//!
//! Readers decode into UTF-16 code units rather than `char`, because a lone surrogate half is a
//! perfectly valid thing to find in a file written by .NET and must survive a round trip through
//! `read_chars`.
//!
//! The Unicode encodings and the two trivial single-byte ones are implemented here directly.
//! Every other name is looked up as a WHATWG label and backed by `encoding_rs`.

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::sync::Arc;

use encoding_rs::{CoderResult, EncoderResult};
use zerocopy::byteorder::{ByteOrder, BE, LE, U16, U32};
use zerocopy::{FromBytes, IntoBytes};

use crate::error::{Error, Result};

const REPLACEMENT: u16 = 0xfffd;

/// A character encoding: converts strings to bytes, and creates decoders for the reverse.
pub trait Encoding: Send + Sync + fmt::Debug {
    /// Canonical name of the encoding.
    fn name(&self) -> &str;

    /// Creates a new incremental decoder with no pending state.
    fn new_decoder(&self) -> Box<dyn Decoder>;

    /// Encodes `s`. Characters the encoding cannot represent are replaced.
    fn encode(&self, s: &str) -> Vec<u8>;

    /// Encodes a sequence of UTF-16 code units, which may contain unpaired surrogates.
    ///
    /// The default converts the units to a string first, so unpaired surrogates become U+FFFD.
    /// Encodings that can represent them override this.
    fn encode_units(&self, units: &[u16]) -> Vec<u8> {
        self.encode(&String::from_utf16_lossy(units))
    }

    /// Number of bytes `encode(s)` would produce.
    fn byte_length(&self, s: &str) -> usize {
        self.encode(s).len()
    }

    /// Returns true if every character takes exactly two bytes.
    fn is_fixed_two_byte(&self) -> bool {
        false
    }
}

/// An incremental decoder.
///
/// Bytes that end in the middle of a character are held back and combined with the bytes given
/// to the next `write` call.
pub trait Decoder: Send {
    /// Decodes as many complete characters as possible from the pending bytes followed by
    /// `bytes`, appends them to `out` as UTF-16 code units, and returns how many units were
    /// appended.
    fn write(&mut self, bytes: &[u8], out: &mut Vec<u16>) -> usize;

    /// Flushes any pending bytes, replacing incomplete sequences, and returns how many units were
    /// appended to `out`.
    fn end(&mut self, out: &mut Vec<u16>) -> usize;

    /// Bytes held back from previous `write` calls.
    fn pending(&self) -> &[u8];

    /// Discards pending bytes without decoding them.
    fn reset(&mut self);

    /// Returns true if a previous `write` left a partial character behind.
    fn has_pending_state(&self) -> bool {
        !self.pending().is_empty()
    }
}

/// Selects the encoding for a reader or writer: either a well-known name or a custom
/// implementation.
#[derive(Clone, Debug)]
pub enum EncodingSource {
    /// An encoding name, such as `"utf8"` or `"utf16le"`.
    Named(String),
    /// A caller-supplied encoding.
    Custom(Arc<dyn Encoding>),
}

impl EncodingSource {
    /// Resolves this source to an encoding.
    pub fn resolve(self) -> Result<Arc<dyn Encoding>> {
        match self {
            Self::Named(name) => encoding_for_name(&name),
            Self::Custom(encoding) => Ok(encoding),
        }
    }
}

impl Default for EncodingSource {
    fn default() -> Self {
        Self::Custom(Arc::new(Utf8))
    }
}

impl From<&str> for EncodingSource {
    fn from(name: &str) -> Self {
        Self::Named(name.to_owned())
    }
}

impl From<String> for EncodingSource {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<Arc<dyn Encoding>> for EncodingSource {
    fn from(encoding: Arc<dyn Encoding>) -> Self {
        Self::Custom(encoding)
    }
}

/// Looks up an encoding by name. Names are case-insensitive.
///
/// Besides the names of the built-in encodings, any WHATWG label (`"windows-1252"`,
/// `"shift_jis"`, `"koi8-r"`, ...) is accepted, as are the `winNNNN` spellings of the Windows
/// code pages.
pub fn encoding_for_name(name: &str) -> Result<Arc<dyn Encoding>> {
    let label = name.trim().to_ascii_lowercase();
    let encoding: Arc<dyn Encoding> = match label.as_str() {
        "utf8" | "utf-8" => Arc::new(Utf8),
        "utf16le" | "utf-16le" | "utf16" | "utf-16" | "ucs2" | "ucs-2" => Arc::new(Utf16Le),
        "utf16be" | "utf-16be" => Arc::new(Utf16Be),
        "utf32le" | "utf-32le" | "utf32" | "utf-32" | "ucs4" | "ucs-4" => Arc::new(Utf32Le),
        "utf32be" | "utf-32be" => Arc::new(Utf32Be),
        "latin1" | "binary" | "iso-8859-1" | "iso8859-1" => Arc::new(Latin1),
        "ascii" | "us-ascii" => Arc::new(Ascii),
        _ => return lookup_label(&label).ok_or_else(|| Error::UnknownEncoding(name.to_owned())),
    };
    Ok(encoding)
}

fn lookup_label(label: &str) -> Option<Arc<dyn Encoding>> {
    let found = encoding_rs::Encoding::for_label(label.as_bytes()).or_else(|| {
        let page = label.strip_prefix("win")?;
        if page.is_empty() || !page.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        encoding_rs::Encoding::for_label(format!("windows-{page}").as_bytes())
    })?;

    // A few WHATWG labels name encodings that are implemented here directly.
    let encoding: Arc<dyn Encoding> = if found == encoding_rs::UTF_8 {
        Arc::new(Utf8)
    } else if found == encoding_rs::UTF_16LE {
        Arc::new(Utf16Le)
    } else if found == encoding_rs::UTF_16BE {
        Arc::new(Utf16Be)
    } else if found == encoding_rs::REPLACEMENT {
        return None;
    } else {
        Arc::new(CodePage(found))
    };
    Some(encoding)
}

/// UTF-8
#[derive(Copy, Clone, Debug, Default)]
pub struct Utf8;

impl Encoding for Utf8 {
    fn name(&self) -> &str {
        "utf8"
    }

    fn new_decoder(&self) -> Box<dyn Decoder> {
        Box::<Utf8Decoder>::default()
    }

    fn encode(&self, s: &str) -> Vec<u8> {
        s.as_bytes().to_vec()
    }

    fn byte_length(&self, s: &str) -> usize {
        s.len()
    }
}

#[derive(Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Decoder for Utf8Decoder {
    fn write(&mut self, bytes: &[u8], out: &mut Vec<u16>) -> usize {
        let start = out.len();
        let mut data = mem::take(&mut self.pending);
        data.extend_from_slice(bytes);

        let mut rest = data.as_slice();
        while !rest.is_empty() {
            match core::str::from_utf8(rest) {
                Ok(s) => {
                    out.extend(s.encode_utf16());
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.extend(String::from_utf8_lossy(valid).encode_utf16());
                    match e.error_len() {
                        Some(bad) => {
                            out.push(REPLACEMENT);
                            rest = &after[bad..];
                        }
                        None => {
                            // Incomplete sequence at the end; wait for more bytes.
                            self.pending.extend_from_slice(after);
                            break;
                        }
                    }
                }
            }
        }
        out.len() - start
    }

    fn end(&mut self, out: &mut Vec<u16>) -> usize {
        if self.pending.is_empty() {
            return 0;
        }
        self.pending.clear();
        out.push(REPLACEMENT);
        1
    }

    fn pending(&self) -> &[u8] {
        &self.pending
    }

    fn reset(&mut self) {
        self.pending.clear();
    }
}

/// UTF-16, little-endian
#[derive(Copy, Clone, Debug, Default)]
pub struct Utf16Le;

impl Encoding for Utf16Le {
    fn name(&self) -> &str {
        "utf16le"
    }

    fn new_decoder(&self) -> Box<dyn Decoder> {
        Box::new(Utf16Decoder::<LE>::new())
    }

    fn encode(&self, s: &str) -> Vec<u8> {
        encode_utf16::<LE>(s.encode_utf16())
    }

    fn encode_units(&self, units: &[u16]) -> Vec<u8> {
        encode_utf16::<LE>(units.iter().copied())
    }

    fn byte_length(&self, s: &str) -> usize {
        s.encode_utf16().count() * 2
    }

    fn is_fixed_two_byte(&self) -> bool {
        true
    }
}

/// UTF-16, big-endian
#[derive(Copy, Clone, Debug, Default)]
pub struct Utf16Be;

impl Encoding for Utf16Be {
    fn name(&self) -> &str {
        "utf16be"
    }

    fn new_decoder(&self) -> Box<dyn Decoder> {
        Box::new(Utf16Decoder::<BE>::new())
    }

    fn encode(&self, s: &str) -> Vec<u8> {
        encode_utf16::<BE>(s.encode_utf16())
    }

    fn encode_units(&self, units: &[u16]) -> Vec<u8> {
        encode_utf16::<BE>(units.iter().copied())
    }

    fn byte_length(&self, s: &str) -> usize {
        s.encode_utf16().count() * 2
    }

    fn is_fixed_two_byte(&self) -> bool {
        true
    }
}

fn encode_utf16<O: ByteOrder>(units: impl Iterator<Item = u16>) -> Vec<u8> {
    let wide: Vec<U16<O>> = units.map(U16::new).collect();
    wide.as_bytes().to_vec()
}

/// Converts whole code units. `bytes.len()` must be even.
fn decode_utf16<O: ByteOrder>(bytes: &[u8]) -> Vec<u16> {
    let Ok(wchars) = <[U16<O>]>::ref_from_bytes(bytes) else {
        return Vec::new();
    };
    wchars.iter().map(|c| c.get()).collect()
}

fn is_high_surrogate(unit: u16) -> bool {
    (0xd800..=0xdbff).contains(&unit)
}

/// Holds at most a trailing high surrogate (2 bytes) followed by an odd byte.
struct Utf16Decoder<O> {
    pending: Vec<u8>,
    order: PhantomData<O>,
}

impl<O> Utf16Decoder<O> {
    fn new() -> Self {
        Self {
            pending: Vec::new(),
            order: PhantomData,
        }
    }
}

impl<O: ByteOrder + Send> Decoder for Utf16Decoder<O> {
    fn write(&mut self, bytes: &[u8], out: &mut Vec<u16>) -> usize {
        let mut data = mem::take(&mut self.pending);
        data.extend_from_slice(bytes);

        let whole = data.len() & !1;
        let mut units = decode_utf16::<O>(&data[..whole]);

        // A high surrogate at the end may still be completed by the next call.
        let mut keep_from = whole;
        if units.last().is_some_and(|&u| is_high_surrogate(u)) {
            units.pop();
            keep_from -= 2;
        }
        self.pending.extend_from_slice(&data[keep_from..]);

        out.extend_from_slice(&units);
        units.len()
    }

    fn end(&mut self, out: &mut Vec<u16>) -> usize {
        let start = out.len();
        let whole = self.pending.len() & !1;
        out.extend(decode_utf16::<O>(&self.pending[..whole]));
        if self.pending.len() % 2 == 1 {
            out.push(REPLACEMENT);
        }
        self.pending.clear();
        out.len() - start
    }

    fn pending(&self) -> &[u8] {
        &self.pending
    }

    fn reset(&mut self) {
        self.pending.clear();
    }
}

/// UTF-32, little-endian
#[derive(Copy, Clone, Debug, Default)]
pub struct Utf32Le;

impl Encoding for Utf32Le {
    fn name(&self) -> &str {
        "utf32le"
    }

    fn new_decoder(&self) -> Box<dyn Decoder> {
        Box::new(Utf32Decoder::<LE>::new())
    }

    fn encode(&self, s: &str) -> Vec<u8> {
        encode_utf32::<LE>(s)
    }

    fn byte_length(&self, s: &str) -> usize {
        s.chars().count() * 4
    }
}

/// UTF-32, big-endian
#[derive(Copy, Clone, Debug, Default)]
pub struct Utf32Be;

impl Encoding for Utf32Be {
    fn name(&self) -> &str {
        "utf32be"
    }

    fn new_decoder(&self) -> Box<dyn Decoder> {
        Box::new(Utf32Decoder::<BE>::new())
    }

    fn encode(&self, s: &str) -> Vec<u8> {
        encode_utf32::<BE>(s)
    }

    fn byte_length(&self, s: &str) -> usize {
        s.chars().count() * 4
    }
}

fn encode_utf32<O: ByteOrder>(s: &str) -> Vec<u8> {
    let wide: Vec<U32<O>> = s.chars().map(|c| U32::new(c as u32)).collect();
    wide.as_bytes().to_vec()
}

struct Utf32Decoder<O> {
    pending: Vec<u8>,
    order: PhantomData<O>,
}

impl<O> Utf32Decoder<O> {
    fn new() -> Self {
        Self {
            pending: Vec::new(),
            order: PhantomData,
        }
    }
}

impl<O: ByteOrder + Send> Decoder for Utf32Decoder<O> {
    fn write(&mut self, bytes: &[u8], out: &mut Vec<u16>) -> usize {
        let start = out.len();
        let mut data = mem::take(&mut self.pending);
        data.extend_from_slice(bytes);

        let whole = data.len() & !3;
        if let Ok(points) = <[U32<O>]>::ref_from_bytes(&data[..whole]) {
            let mut buf = [0u16; 2];
            for point in points {
                match char::from_u32(point.get()) {
                    Some(c) => out.extend_from_slice(c.encode_utf16(&mut buf)),
                    None => out.push(REPLACEMENT),
                }
            }
        }
        self.pending.extend_from_slice(&data[whole..]);
        out.len() - start
    }

    fn end(&mut self, out: &mut Vec<u16>) -> usize {
        if self.pending.is_empty() {
            return 0;
        }
        self.pending.clear();
        out.push(REPLACEMENT);
        1
    }

    fn pending(&self) -> &[u8] {
        &self.pending
    }

    fn reset(&mut self) {
        self.pending.clear();
    }
}

/// ISO-8859-1. Every byte is one character.
#[derive(Copy, Clone, Debug, Default)]
pub struct Latin1;

impl Encoding for Latin1 {
    fn name(&self) -> &str {
        "latin1"
    }

    fn new_decoder(&self) -> Box<dyn Decoder> {
        Box::new(SingleByteDecoder { max: 0xff })
    }

    fn encode(&self, s: &str) -> Vec<u8> {
        encode_single_byte(s.encode_utf16(), 0xff)
    }

    fn encode_units(&self, units: &[u16]) -> Vec<u8> {
        encode_single_byte(units.iter().copied(), 0xff)
    }

    fn byte_length(&self, s: &str) -> usize {
        s.encode_utf16().count()
    }
}

/// 7-bit ASCII
#[derive(Copy, Clone, Debug, Default)]
pub struct Ascii;

impl Encoding for Ascii {
    fn name(&self) -> &str {
        "ascii"
    }

    fn new_decoder(&self) -> Box<dyn Decoder> {
        Box::new(SingleByteDecoder { max: 0x7f })
    }

    fn encode(&self, s: &str) -> Vec<u8> {
        encode_single_byte(s.encode_utf16(), 0x7f)
    }

    fn encode_units(&self, units: &[u16]) -> Vec<u8> {
        encode_single_byte(units.iter().copied(), 0x7f)
    }

    fn byte_length(&self, s: &str) -> usize {
        s.encode_utf16().count()
    }
}

/// One byte per UTF-16 code unit, so both halves of a surrogate pair become `?`.
fn encode_single_byte(units: impl Iterator<Item = u16>, max: u16) -> Vec<u8> {
    units
        .map(|u| if u <= max { u as u8 } else { b'?' })
        .collect()
}

struct SingleByteDecoder {
    max: u8,
}

impl Decoder for SingleByteDecoder {
    fn write(&mut self, bytes: &[u8], out: &mut Vec<u16>) -> usize {
        out.extend(
            bytes
                .iter()
                .map(|&b| if b <= self.max { b as u16 } else { REPLACEMENT }),
        );
        bytes.len()
    }

    fn end(&mut self, _out: &mut Vec<u16>) -> usize {
        0
    }

    fn pending(&self) -> &[u8] {
        &[]
    }

    fn reset(&mut self) {}
}

/// A legacy code page or multi-byte encoding, backed by `encoding_rs`.
///
/// Unmappable characters are encoded as `?`.
#[derive(Copy, Clone, Debug)]
pub struct CodePage(&'static encoding_rs::Encoding);

impl CodePage {
    /// Looks up a WHATWG label. Returns `None` for unknown labels and for the Unicode encodings,
    /// which have their own types.
    pub fn for_label(label: &str) -> Option<Self> {
        let encoding = encoding_rs::Encoding::for_label(label.as_bytes())?;
        if encoding == encoding_rs::UTF_8
            || encoding == encoding_rs::UTF_16LE
            || encoding == encoding_rs::UTF_16BE
            || encoding == encoding_rs::REPLACEMENT
        {
            return None;
        }
        Some(Self(encoding))
    }
}

impl Encoding for CodePage {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn new_decoder(&self) -> Box<dyn Decoder> {
        Box::new(CodePageDecoder {
            encoding: self.0,
            decoder: self.0.new_decoder_without_bom_handling(),
            pending: Vec::new(),
        })
    }

    fn encode(&self, s: &str) -> Vec<u8> {
        let mut encoder = self.0.new_encoder();
        let mut out = Vec::new();
        let mut rest = s;
        loop {
            reserve_for(&encoder, &mut out, rest.len());
            let (result, read) =
                encoder.encode_from_utf8_to_vec_without_replacement(rest, &mut out, false);
            rest = &rest[read..];
            match result {
                EncoderResult::InputEmpty => break,
                EncoderResult::OutputFull => {}
                EncoderResult::Unmappable(_) => {
                    reserve_for(&encoder, &mut out, 1);
                    let _ =
                        encoder.encode_from_utf8_to_vec_without_replacement("?", &mut out, false);
                }
            }
        }
        // Stateful encodings (ISO-2022-JP) switch back to ASCII here.
        reserve_for(&encoder, &mut out, 0);
        let _ = encoder.encode_from_utf8_to_vec_without_replacement("", &mut out, true);
        out
    }
}

fn reserve_for(encoder: &encoding_rs::Encoder, out: &mut Vec<u8>, len: usize) {
    let needed = encoder
        .max_buffer_length_from_utf8_without_replacement(len)
        .unwrap_or_else(|| len.saturating_mul(4).saturating_add(16));
    out.reserve(needed);
}

/// `encoding_rs` decoders buffer partial sequences internally. The bytes fed since the last
/// complete character are mirrored in `pending` so callers can see them.
struct CodePageDecoder {
    encoding: &'static encoding_rs::Encoding,
    decoder: encoding_rs::Decoder,
    pending: Vec<u8>,
}

impl CodePageDecoder {
    fn decode_into(&mut self, input: &[u8], out: &mut Vec<u16>, last: bool) {
        let mut units = [0u16; 16];
        let mut input = input;
        loop {
            let (result, read, written, _) = self.decoder.decode_to_utf16(input, &mut units, last);
            out.extend_from_slice(&units[..written]);
            input = &input[read..];
            if matches!(result, CoderResult::InputEmpty) {
                break;
            }
        }
    }
}

impl Decoder for CodePageDecoder {
    fn write(&mut self, bytes: &[u8], out: &mut Vec<u16>) -> usize {
        let start = out.len();
        for &b in bytes {
            let before = out.len();
            self.decode_into(&[b], out, false);
            if out.len() == before {
                self.pending.push(b);
            } else {
                self.pending.clear();
            }
        }
        out.len() - start
    }

    fn end(&mut self, out: &mut Vec<u16>) -> usize {
        let start = out.len();
        self.decode_into(&[], out, true);
        self.reset();
        out.len() - start
    }

    fn pending(&self) -> &[u8] {
        &self.pending
    }

    fn reset(&mut self) {
        self.decoder = self.encoding.new_decoder_without_bom_handling();
        self.pending.clear();
    }
}
