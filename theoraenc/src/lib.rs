//! Theora video encoder core.
//!
//! Theora is an open, royalty-free video codec developed by the Xiph.Org Foundation.
//! It is based on the VP3 codec and is commonly carried in the Ogg container.
//!
//! This crate implements the encoding side:
//!
//! - Rate control with a per-frame-type power-law model and a leaky bucket
//! - The keyframe/delta-frame decision, including priming passes and the
//!   forced keyframe restart
//! - Identification, comment and setup header packets
//! - Data packets with granule positions
//!
//! Mode analysis and coefficient coding sit behind the [`FrameCoder`] trait;
//! [`BlockCoder`] is the built-in implementation.
//!
//! # Example
//!
//! ```no_run
//! use theoraenc::{EncoderConfig, TheoraEncoder, CommentHeader};
//! use theoraenc_core::YuvImage;
//!
//! let config = EncoderConfig::new(320, 240).with_quality(40);
//! let mut encoder = TheoraEncoder::new(config)?;
//!
//! let ident = encoder.ident_header()?;
//! let comment = encoder.comment_header(&CommentHeader::default())?;
//! let setup = encoder.setup_header()?;
//!
//! let y = vec![128u8; 320 * 240];
//! let uv = vec![128u8; 160 * 120];
//! encoder.push_frame(&YuvImage::new_420(320, 240, &y, &uv, &uv))?;
//! if let Some(packet) = encoder.packet_out(true)? {
//!     println!("frame packet: {} bytes, granule {}", packet.size(), packet.granule_pos);
//! }
//! # Ok::<(), theoraenc::TheoraError>(())
//! ```

#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]

pub mod coder;
pub mod compressor;
pub mod config;
pub mod control;
pub mod error;
pub mod fixed;
pub mod granule;
pub mod headers;
pub mod huffman;
pub mod quant;
pub mod rate;
pub mod recon;
pub mod session;
pub mod transform;

pub use coder::{BlockCoder, CodingMode, FrameCoder, FrameParams, FrameRefs, ModeDecision};
pub use config::EncoderConfig;
pub use control::{Control, ControlPayload, ControlResponse, SpeedLevel};
pub use error::{Result, TheoraError};
pub use headers::{CommentHeader, IdentHeader};
pub use quant::QuantInfo;
pub use rate::RateState;
pub use session::TheoraEncoder;

/// Bitstream major version written to the identification header.
pub const THEORA_VERSION_MAJOR: u8 = 3;
/// Bitstream minor version.
pub const THEORA_VERSION_MINOR: u8 = 2;
/// Bitstream revision; 1 marks streams from the 3.2.1 format.
pub const THEORA_VERSION_SUBMINOR: u8 = 1;

/// Block size for DCT.
pub const BLOCK_SIZE: usize = 8;

/// Macroblock size in luma pixels.
pub const MACROBLOCK_SIZE: u32 = 16;

/// Largest allowed keyframe interval; keeps granule offsets in range.
pub const MAX_KEYFRAME_INTERVAL: u32 = 32768;

/// Theora pixel format tag, as stored in the identification header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// YCbCr 4:2:0.
    #[default]
    Yuv420 = 0,
    /// Reserved value.
    Reserved = 1,
    /// YCbCr 4:2:2.
    Yuv422 = 2,
    /// YCbCr 4:4:4.
    Yuv444 = 3,
}

impl PixelFormat {
    /// Get chroma subsampling factors (horizontal, vertical).
    pub fn chroma_subsampling(&self) -> (u32, u32) {
        match self {
            Self::Yuv420 | Self::Reserved => (2, 2),
            Self::Yuv422 => (2, 1),
            Self::Yuv444 => (1, 1),
        }
    }
}

impl TryFrom<u8> for PixelFormat {
    type Error = TheoraError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Yuv420),
            1 => Ok(Self::Reserved),
            2 => Ok(Self::Yuv422),
            3 => Ok(Self::Yuv444),
            _ => Err(TheoraError::InvalidArgument(format!(
                "Invalid pixel format: {}",
                value
            ))),
        }
    }
}

/// Theora color space tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    /// Unspecified.
    #[default]
    Unspecified = 0,
    /// ITU-R Rec. 470M (NTSC).
    ItuRec470M = 1,
    /// ITU-R Rec. 470BG (PAL).
    ItuRec470BG = 2,
}

impl TryFrom<u8> for ColorSpace {
    type Error = TheoraError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Unspecified),
            1 => Ok(Self::ItuRec470M),
            2 => Ok(Self::ItuRec470BG),
            _ => Err(TheoraError::InvalidArgument(format!(
                "Invalid color space: {}",
                value
            ))),
        }
    }
}

/// Frame type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameType {
    /// Intra frame (keyframe).
    #[default]
    Key,
    /// Frame predicted from earlier reconstructions.
    Delta,
}

impl FrameType {
    /// Index into per-frame-type tables (0 = key, 1 = delta).
    pub const fn index(self) -> usize {
        match self {
            FrameType::Key => 0,
            FrameType::Delta => 1,
        }
    }

    /// The other frame type.
    pub const fn other(self) -> FrameType {
        match self {
            FrameType::Key => FrameType::Delta,
            FrameType::Delta => FrameType::Key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format() {
        assert_eq!(PixelFormat::Yuv420.chroma_subsampling(), (2, 2));
        assert_eq!(PixelFormat::Yuv422.chroma_subsampling(), (2, 1));
        assert_eq!(PixelFormat::Yuv444.chroma_subsampling(), (1, 1));
    }

    #[test]
    fn test_pixel_format_from_u8() {
        assert_eq!(PixelFormat::try_from(0u8).unwrap(), PixelFormat::Yuv420);
        assert_eq!(PixelFormat::try_from(2u8).unwrap(), PixelFormat::Yuv422);
        assert_eq!(PixelFormat::try_from(3u8).unwrap(), PixelFormat::Yuv444);
        assert!(PixelFormat::try_from(4u8).is_err());
    }

    #[test]
    fn test_color_space_from_u8() {
        assert_eq!(ColorSpace::try_from(0u8).unwrap(), ColorSpace::Unspecified);
        assert_eq!(ColorSpace::try_from(1u8).unwrap(), ColorSpace::ItuRec470M);
        assert_eq!(ColorSpace::try_from(2u8).unwrap(), ColorSpace::ItuRec470BG);
        assert!(ColorSpace::try_from(3u8).is_err());
    }

    #[test]
    fn test_frame_type_index() {
        assert_eq!(FrameType::Key.index(), 0);
        assert_eq!(FrameType::Delta.index(), 1);
        assert_eq!(FrameType::Key.other(), FrameType::Delta);
    }
}
