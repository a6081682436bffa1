//! Reads and writes primitive values to files using the same encoding rules as .NET's
//! `System.IO.BinaryReader` and `System.IO.BinaryWriter`.
//!
//! * Fixed-width integers and floats are little-endian, at their natural width.
//! * Compact integers and string length prefixes use the 7-bit variable-length format
//!   (see [`varint`]).
//! * Strings are `[7-bit encoded byte length][encoded bytes]`; C strings and raw strings are
//!   also supported by the writer.
//!
//! The codec works over any [`BinaryFile`]: an OS file ([`FileHandle`]), an in-memory file
//! ([`MemoryFile`]), or your own implementation. Characters are encoded with a pluggable
//! [`Encoding`]; UTF-8, UTF-16LE, Latin-1 and ASCII are built in.
//!
//! # References
//! * <https://learn.microsoft.com/en-us/dotnet/api/system.io.binarywriter.write?view=net-9.0>
//! * <https://learn.microsoft.com/en-us/dotnet/api/system.io.binaryreader?view=net-9.0>

#![forbid(unsafe_code)]
#![forbid(unused_must_use)]
#![warn(missing_docs)]

mod chars;
pub mod encoding;
mod error;
mod file;
mod memory;
mod reader;
pub mod varint;
mod writer;


pub use encoding::{Decoder, Encoding, EncodingSource};
pub use error::{Error, Result};
pub use file::{BinaryFile, FileHandle, IoState, SeekOrigin, DEFAULT_BUF_SIZE};
pub use memory::MemoryFile;
pub use reader::BinaryReader;
pub use writer::{BinaryWriter, Close, StringMode};
