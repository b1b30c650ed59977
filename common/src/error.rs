use std::io;

use thiserror::Error;

/// Everything that can go wrong while decoding an asset.
///
/// Apart from [`Error::Io`], every variant means the input itself was bad or
/// unsupported, so batch callers can skip the asset and carry on.
#[derive(Error, Debug)]
pub enum Error {
    #[error("read of {requested} bytes at offset {offset} runs past the end of a {len} byte buffer")]
    OutOfBounds {
        offset: usize,
        requested: usize,
        len: usize,
    },

    #[error("{codec} stream rejected: {reason}")]
    Decompression { codec: &'static str, reason: String },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("corrupt data at offset {offset}: {message}")]
    Assertion { offset: usize, message: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub fn decompression(codec: &'static str, reason: impl Into<String>) -> Self {
        Self::Decompression {
            codec,
            reason: reason.into(),
        }
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::UnsupportedFormat(what.into())
    }

    pub fn assertion(offset: usize, message: impl Into<String>) -> Self {
        Self::Assertion {
            offset,
            message: message.into(),
        }
    }

    /// True when the failure came from the bytes being decoded rather than the host.
    pub fn is_corrupt_input(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
