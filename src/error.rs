use std::io;

/// Result type for reader and writer operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors reported by `BinaryReader`, `BinaryWriter` and the file types in this crate.
///
/// None of these are retried internally. A reader or writer stays usable after any error except
/// the ones caused by using it after `close()`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The file handle given to a `BinaryReader` cannot be read from.
    #[error("file is not readable")]
    NotReadable,

    /// The file handle given to a `BinaryWriter` cannot be written to.
    #[error("file is not writable")]
    NotWritable,

    /// The reader or writer has been closed.
    #[error("the reader or writer is closed")]
    Closed,

    /// A fixed-width or length-delimited read reached the end of the file before it had all of
    /// the bytes it needed.
    #[error("read beyond end of file")]
    ReadPastEnd,

    /// A length-prefixed string declared a negative byte length.
    #[error("invalid encoded string length: {0}")]
    InvalidEncodedLength(i32),

    /// A 7-bit encoded integer has bits set beyond the width of the target type.
    #[error("bad 7-bit encoded integer format")]
    BadVarintFormat,

    /// Decoding a single character produced more than one UTF-16 code unit.
    #[error("a surrogate code unit was hit while reading a single character")]
    SurrogateEncountered,

    /// A call argument is out of range or otherwise malformed. Reported before any I/O happens.
    #[error("invalid argument `{param}`: {message}")]
    InvalidArgument {
        /// Name of the offending parameter
        param: &'static str,
        /// What is wrong with it
        message: String,
    },

    /// The requested character encoding is not known.
    #[error("unknown character encoding: {0:?}")]
    UnknownEncoding(String),

    /// An error from the underlying file, passed through unchanged.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn invalid_argument(param: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            param,
            message: message.into(),
        }
    }

    /// Returns true if this error means the data ran out before a value was complete.
    pub const fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::ReadPastEnd)
    }

    /// Returns true if the operation was rejected because the reader or writer was closed.
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Checks that `index..index + count` lies within a buffer of length `len`.
pub(crate) fn check_range(len: usize, index: usize, count: usize) -> Result<()> {
    if index > len {
        return Err(Error::invalid_argument(
            "index",
            format!("index {index} is past the end of a buffer of length {len}"),
        ));
    }
    if len - index < count {
        return Err(Error::invalid_argument(
            "count",
            format!("{count} elements at index {index} overrun a buffer of length {len}"),
        ));
    }
    Ok(())
}
