//! # theoraenc core
//!
//! Core types shared by the theoraenc encoder crates:
//! - Error handling types
//! - MSB-first bitstream reading/writing
//! - Planar frame buffers and borrowed input images
//! - Packets with Ogg-style metadata
//! - Rationals for frame rates and aspect ratios

pub mod bitstream;
pub mod error;
pub mod frame;
pub mod packet;
pub mod rational;

pub use bitstream::{BitReader, BitWriter};
pub use error::{BitstreamError, CodecError, Error, Result};
pub use frame::{FrameBuffer, PixelFormat, YuvImage};
pub use packet::{OwnedPacket, Packet, PacketFlags};
pub use rational::Rational;
