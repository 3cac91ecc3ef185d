use std::io;
use thiserror::Error;

/// Errors surfaced by extraction, image decoding and the registry.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Format mismatch: {0}")]
    FormatMismatch(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Read of {len} bytes at offset {offset} is outside window [{base}, {end})")]
    OutOfBounds {
        offset: u64,
        len: usize,
        base: u64,
        end: u64,
    },

    #[error("Short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    #[error("Malformed container: {0}")]
    MalformedContainer(String),

    #[error("Unknown format id {0:#06x}")]
    UnknownFormat(u32),

    #[error("Cannot decode metadata blob: {0}")]
    BlobDecode(String),
}

/// Coarse classification of [`Error`], matching the catalog's error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    FormatMismatch,
    Io,
    MalformedContainer,
    UnknownFormat,
    BlobDecode,
}

impl Error {
    pub fn mismatch(msg: impl Into<String>) -> Self {
        Error::FormatMismatch(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedContainer(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::FormatMismatch(_) => ErrorKind::FormatMismatch,
            Error::Io(_) | Error::OutOfBounds { .. } | Error::ShortRead { .. } => ErrorKind::Io,
            Error::MalformedContainer(_) => ErrorKind::MalformedContainer,
            Error::UnknownFormat(_) => ErrorKind::UnknownFormat,
            Error::BlobDecode(_) => ErrorKind::BlobDecode,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::BlobDecode(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => Error::Io(e),
            other => Error::FormatMismatch(other.to_string()),
        }
    }
}

// Lets window-backed readers implement `std::io::Read`.
impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::OutOfBounds { .. } | Error::ShortRead { .. } => {
                io::Error::new(io::ErrorKind::UnexpectedEof, err)
            }
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_errors_classify_as_io() {
        let err = Error::ShortRead {
            offset: 4,
            expected: 8,
            actual: 2,
        };
        assert_eq!(err.kind(), ErrorKind::Io);

        let err = Error::OutOfBounds {
            offset: 0,
            len: 1,
            base: 16,
            end: 32,
        };
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_io_error_round_trip_keeps_kind() {
        let original = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        let err: Error = original.into();
        let back: io::Error = err.into();
        assert_eq!(back.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_unknown_format_display() {
        assert_eq!(
            Error::UnknownFormat(0x1234).to_string(),
            "Unknown format id 0x1234"
        );
    }
}
