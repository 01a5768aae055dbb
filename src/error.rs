use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Decode and encode failures.
///
/// All variants abort the current field or message parse; malformed input is
/// a hard stop, not a transient condition. Reads or writes past a
/// caller-provided buffer are contract violations and panic instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The remaining data is not long enough for the expected read.
    #[error("unexpected end of input")]
    EndOfInput,
    /// A varint's continuation bits never terminate within the maximum
    /// allowed byte count, or high-order bits beyond the value's width are
    /// set.
    #[error("malformed varint")]
    MalformedVarint,
    /// A boolean field's varint is neither 0 nor 1.
    #[error("invalid value {0} for boolean, valid encodings are 0 and 1")]
    InvalidBoolean(u32),
    /// A field header, skip or collection operation was given a wire type it
    /// does not know how to handle.
    #[error("unknown wire type {0}")]
    UnknownWireType(i32),
    /// A string field holds bytes that are not valid UTF-8.
    #[error("string data is not valid UTF-8")]
    InvalidUtf8,
    /// The stream reader was used after [`close`](crate::StreamReader::close).
    #[error("reader used after close")]
    Closed,
    /// The underlying stream failed for a reason other than a clean EOF.
    #[error("stream i/o error: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::EndOfInput
        } else {
            Error::Io(err)
        }
    }
}
