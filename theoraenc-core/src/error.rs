//! Error types shared by the theoraenc crates.
//!
//! Codec crates define their own error enums and convert into [`Error`] at
//! crate boundaries.

use thiserror::Error;

/// Main error type for the core primitives.
#[derive(Error, Debug)]
pub enum Error {
    /// Codec errors (encoding).
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Bitstream reading/writing errors.
    #[error("Bitstream error: {0}")]
    Bitstream(#[from] BitstreamError),

    /// Invalid parameter provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Unsupported feature or format.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// End of stream reached.
    #[error("End of stream")]
    EndOfStream,

    /// Buffer too small for operation.
    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },
}

/// Codec errors.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Encoder configuration error.
    #[error("Encoder configuration error: {0}")]
    EncoderConfig(String),

    /// Encoder used in a state that does not allow the operation.
    #[error("Invalid encoder state: {0}")]
    InvalidState(String),

    /// Frame dimensions do not match the configured geometry.
    #[error("Frame dimensions {width}x{height} do not match {expected_width}x{expected_height}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    /// Generic codec error message.
    #[error("{0}")]
    Other(String),
}

impl From<String> for CodecError {
    fn from(s: String) -> Self {
        CodecError::Other(s)
    }
}

impl From<&str> for CodecError {
    fn from(s: &str) -> Self {
        CodecError::Other(s.to_string())
    }
}

/// Bitstream errors.
#[derive(Error, Debug)]
pub enum BitstreamError {
    /// Unexpected end of bitstream.
    #[error("Unexpected end of bitstream")]
    UnexpectedEnd,

    /// Field width outside what the reader/writer supports.
    #[error("Invalid field width: {0} bits")]
    InvalidWidth(u8),

    /// Value does not fit in the requested number of bits.
    #[error("Value {value} does not fit in {bits} bits")]
    ValueOverflow { value: u64, bits: u8 },

    /// Invalid syntax element value.
    #[error("Invalid syntax element: {element} = {value}")]
    InvalidSyntax { element: String, value: i64 },

    /// Generic bitstream error message.
    #[error("{0}")]
    Other(String),
}

impl From<String> for BitstreamError {
    fn from(s: String) -> Self {
        BitstreamError::Other(s)
    }
}

impl From<&str> for BitstreamError {
    fn from(s: &str) -> Self {
        BitstreamError::Other(s.to_string())
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid parameter error.
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Check if this is an end-of-stream error.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::EndOfStream)
    }

    /// Check if this error is recoverable (the caller may keep using the encoder).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Codec(CodecError::DimensionMismatch { .. })
                | Error::Codec(CodecError::InvalidState(_))
                | Error::InvalidParameter(_)
                | Error::Unsupported(_)
        )
    }
}
