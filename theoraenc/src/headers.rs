//! Stream header packets.
//!
//! A Theora stream opens with three header packets, each starting with a
//! type byte and the `theora` signature:
//!
//! - identification (0x80): picture geometry, frame rate and coding options
//! - comment (0x81): vendor string and user comments
//! - setup (0x82): quantization parameters and Huffman tables

use crate::config::EncoderConfig;
use crate::error::{Result, TheoraError};
use crate::huffman::HuffmanSet;
use crate::quant::QuantInfo;
use crate::{
    ColorSpace, PixelFormat, THEORA_VERSION_MAJOR, THEORA_VERSION_MINOR, THEORA_VERSION_SUBMINOR,
};
use byteorder::{LittleEndian, WriteBytesExt};
use theoraenc_core::{BitReader, BitWriter, Rational};

/// Identification header type byte.
pub const IDENT_PACKET_TYPE: u8 = 0x80;
/// Comment header type byte.
pub const COMMENT_PACKET_TYPE: u8 = 0x81;
/// Setup header type byte.
pub const SETUP_PACKET_TYPE: u8 = 0x82;

/// Signature following every header type byte.
pub const SIGNATURE: &[u8; 6] = b"theora";

/// Identification header size in bytes.
pub const IDENT_HEADER_SIZE: usize = 42;

fn write_preamble(writer: &mut BitWriter, packet_type: u8) -> Result<()> {
    writer.write_bits(packet_type as u32, 8)?;
    writer.write_bytes(SIGNATURE)?;
    Ok(())
}

/// Decoded identification header.
///
/// `offset_y` is measured from the top, as in [`EncoderConfig`]; the packet
/// stores it from the bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentHeader {
    /// Version triple.
    pub version: (u8, u8, u8),
    /// Encoded width.
    pub width: u32,
    /// Encoded height.
    pub height: u32,
    /// Display width.
    pub frame_width: u32,
    /// Display height.
    pub frame_height: u32,
    /// Display X offset.
    pub offset_x: u32,
    /// Display Y offset, from the top.
    pub offset_y: u32,
    /// Frame rate.
    pub fps: Rational,
    /// Pixel aspect ratio.
    pub aspect: Rational,
    /// Color space.
    pub colorspace: ColorSpace,
    /// Target bitrate.
    pub target_bitrate: u32,
    /// Quality.
    pub quality: u32,
    /// Granule shift.
    pub keyframe_granule_shift: u32,
    /// Pixel format.
    pub pixel_format: PixelFormat,
}

impl IdentHeader {
    /// Header fields for a normalized configuration.
    pub fn from_config(config: &EncoderConfig) -> Self {
        Self {
            version: (THEORA_VERSION_MAJOR, THEORA_VERSION_MINOR, THEORA_VERSION_SUBMINOR),
            width: config.width,
            height: config.height,
            frame_width: config.frame_width,
            frame_height: config.frame_height,
            offset_x: config.offset_x,
            offset_y: config.offset_y,
            fps: config.fps,
            aspect: config.aspect,
            colorspace: config.colorspace,
            target_bitrate: config.target_bitrate,
            quality: config.quality,
            keyframe_granule_shift: config.granule_shift(),
            pixel_format: config.pixel_format,
        }
    }

    /// Serialize the header.
    pub fn write(&self) -> Result<Vec<u8>> {
        let bottom_offset = self
            .height
            .checked_sub(self.frame_height + self.offset_y)
            .ok_or_else(|| TheoraError::InvalidConfig("display window exceeds frame".into()))?;

        let mut writer = BitWriter::with_capacity(IDENT_HEADER_SIZE);
        write_preamble(&mut writer, IDENT_PACKET_TYPE)?;
        writer.write_bits(self.version.0 as u32, 8)?;
        writer.write_bits(self.version.1 as u32, 8)?;
        writer.write_bits(self.version.2 as u32, 8)?;
        writer.write_bits(self.width >> 4, 16)?;
        writer.write_bits(self.height >> 4, 16)?;
        writer.write_bits(self.frame_width, 24)?;
        writer.write_bits(self.frame_height, 24)?;
        writer.write_bits(self.offset_x, 8)?;
        writer.write_bits(bottom_offset, 8)?;
        writer.write_bits(self.fps.num, 32)?;
        writer.write_bits(self.fps.den, 32)?;
        writer.write_bits(self.aspect.num, 24)?;
        writer.write_bits(self.aspect.den, 24)?;
        writer.write_bits(self.colorspace as u32, 8)?;
        writer.write_bits(self.target_bitrate, 24)?;
        writer.write_bits(self.quality, 6)?;
        writer.write_bits(self.keyframe_granule_shift, 5)?;
        writer.write_bits(self.pixel_format as u32, 2)?;
        writer.write_bits(0, 3)?;
        Ok(writer.into_data())
    }

    /// Parse an identification header packet.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = BitReader::new(data);
        if reader.read_u8()? != IDENT_PACKET_TYPE {
            return Err(TheoraError::InvalidArgument("not an identification header".into()));
        }
        let mut signature = [0u8; 6];
        for byte in &mut signature {
            *byte = reader.read_u8()?;
        }
        if &signature != SIGNATURE {
            return Err(TheoraError::InvalidArgument("missing theora signature".into()));
        }

        let version = (reader.read_u8()?, reader.read_u8()?, reader.read_u8()?);
        let width = reader.read_bits(16)? << 4;
        let height = reader.read_bits(16)? << 4;
        let frame_width = reader.read_bits(24)?;
        let frame_height = reader.read_bits(24)?;
        let offset_x = reader.read_bits(8)?;
        let bottom_offset = reader.read_bits(8)?;
        let fps = Rational::new(reader.read_bits(32)?, reader.read_bits(32)?);
        let aspect = Rational::new(reader.read_bits(24)?, reader.read_bits(24)?);
        let colorspace = ColorSpace::try_from(reader.read_u8()?)?;
        let target_bitrate = reader.read_bits(24)?;
        let quality = reader.read_bits(6)?;
        let keyframe_granule_shift = reader.read_bits(5)?;
        let pixel_format = PixelFormat::try_from(reader.read_bits(2)? as u8)?;
        if reader.read_bits(3)? != 0 {
            return Err(TheoraError::InvalidArgument("reserved bits set".into()));
        }

        let offset_y = height
            .checked_sub(frame_height + bottom_offset)
            .ok_or_else(|| TheoraError::InvalidArgument("display window exceeds frame".into()))?;

        Ok(Self {
            version,
            width,
            height,
            frame_width,
            frame_height,
            offset_x,
            offset_y,
            fps,
            aspect,
            colorspace,
            target_bitrate,
            quality,
            keyframe_granule_shift,
            pixel_format,
        })
    }
}

/// Comment header contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentHeader {
    /// Vendor string.
    pub vendor: String,
    /// User comments; `None` entries are written as empty.
    pub comments: Vec<Option<Vec<u8>>>,
}

impl Default for CommentHeader {
    fn default() -> Self {
        Self::new(concat!("theoraenc ", env!("CARGO_PKG_VERSION")))
    }
}

impl CommentHeader {
    /// Create an empty comment set with the given vendor string.
    pub fn new(vendor: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            comments: Vec::new(),
        }
    }

    /// Append a free-form comment.
    pub fn add(&mut self, comment: impl AsRef<[u8]>) {
        self.comments.push(Some(comment.as_ref().to_vec()));
    }

    /// Append a `TAG=value` comment.
    pub fn add_tag(&mut self, tag: &str, value: &str) {
        self.add(format!("{tag}={value}"));
    }

    /// Values of all comments whose tag matches, ignoring case.
    pub fn query<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.comments.iter().flatten().filter_map(move |comment| {
            let split = comment.iter().position(|&b| b == b'=')?;
            comment[..split]
                .eq_ignore_ascii_case(tag.as_bytes())
                .then(|| &comment[split + 1..])
        })
    }

    /// Serialize the header.
    pub fn write(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(
            7 + 8 + self.vendor.len() + self.comments.iter().flatten().map(|c| c.len() + 4).sum::<usize>(),
        );
        out.push(COMMENT_PACKET_TYPE);
        out.extend_from_slice(SIGNATURE);
        out.write_u32::<LittleEndian>(length_u32(self.vendor.len())?)?;
        out.extend_from_slice(self.vendor.as_bytes());
        out.write_u32::<LittleEndian>(length_u32(self.comments.len())?)?;
        for comment in &self.comments {
            match comment {
                Some(bytes) => {
                    out.write_u32::<LittleEndian>(length_u32(bytes.len())?)?;
                    out.extend_from_slice(bytes);
                }
                None => out.write_u32::<LittleEndian>(0)?,
            }
        }
        Ok(out)
    }
}

fn length_u32(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| TheoraError::InvalidArgument(format!("comment length {len} too large")))
}

/// Serialize the setup header.
pub fn setup_packet(info: &QuantInfo, huffman: &HuffmanSet) -> Result<Vec<u8>> {
    let mut writer = BitWriter::with_capacity(4096);
    write_preamble(&mut writer, SETUP_PACKET_TYPE)?;
    info.pack(&mut writer)?;
    huffman.write(&mut writer)?;
    writer.align_to_byte()?;
    Ok(writer.into_data())
}
