//! Error types for the Theora encoder.

use thiserror::Error;

/// Errors that can occur while configuring or driving a Theora encoder.
#[derive(Error, Debug)]
pub enum TheoraError {
    /// Only 4:2:0 input is accepted.
    #[error("Unsupported pixel format: {0:?}")]
    UnsupportedPixelFormat(crate::PixelFormat),

    /// Inconsistent or out-of-range configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation not allowed in the current session state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Pushed image does not match the configured frame size.
    #[error("Dimension mismatch: got {width}x{height}, expected {expected_width}x{expected_height}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    /// Setup tables may not change once the setup header was emitted.
    #[error("Quantization tables are locked after the setup header")]
    LockedAfterHeaders,

    /// Control request id is not known to the encoder.
    #[error("Unsupported control request: {0}")]
    UnsupportedControl(u32),

    /// Control payload or value rejected.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal encoding failure.
    #[error("Encode error: {0}")]
    Encode(String),

    /// I/O error while serializing headers.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the core primitives.
    #[error(transparent)]
    Core(#[from] theoraenc_core::Error),
}

impl TheoraError {
    /// Errors raised at session construction; no session exists afterwards.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            TheoraError::UnsupportedPixelFormat(_) | TheoraError::InvalidConfig(_)
        )
    }

    /// Errors after which the session can still be used.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            TheoraError::InvalidState(_)
            | TheoraError::DimensionMismatch { .. }
            | TheoraError::LockedAfterHeaders
            | TheoraError::UnsupportedControl(_)
            | TheoraError::InvalidArgument(_) => true,
            TheoraError::Core(err) => err.is_recoverable(),
            _ => false,
        }
    }
}

impl From<TheoraError> for theoraenc_core::Error {
    fn from(err: TheoraError) -> Self {
        use theoraenc_core::error::CodecError;
        match err {
            TheoraError::Core(inner) => inner,
            TheoraError::DimensionMismatch {
                width,
                height,
                expected_width,
                expected_height,
            } => theoraenc_core::Error::Codec(CodecError::DimensionMismatch {
                width,
                height,
                expected_width,
                expected_height,
            }),
            TheoraError::InvalidState(msg) => {
                theoraenc_core::Error::Codec(CodecError::InvalidState(msg))
            }
            TheoraError::UnsupportedPixelFormat(_) | TheoraError::InvalidConfig(_) => {
                theoraenc_core::Error::Codec(CodecError::EncoderConfig(err.to_string()))
            }
            other => theoraenc_core::Error::Codec(CodecError::Other(other.to_string())),
        }
    }
}

/// Result type for Theora operations.
pub type Result<T> = std::result::Result<T, TheoraError>;
