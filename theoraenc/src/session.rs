//! The encoder session.

use crate::coder::{BlockCoder, FrameCoder};
use crate::compressor::{Compressor, FrameCounters, FrameStore};
use crate::config::EncoderConfig;
use crate::control::{Control, ControlResponse, SpeedLevel};
use crate::error::{Result, TheoraError};
use crate::granule;
use crate::headers::{self, CommentHeader, IdentHeader};
use crate::huffman::HuffmanSet;
use crate::quant::{QuantInfo, QuantTables};
use crate::rate::RateState;
use crate::{FrameType, PixelFormat};
use std::fmt;
use theoraenc_core::{BitWriter, FrameBuffer, Packet, PacketFlags, YuvImage};
use tracing::{debug, trace};

/// Theora encoder session.
///
/// Owns the configuration, rate state, quantizer tables and reference
/// frames of one stream. Frames go in with [`push_frame`](Self::push_frame)
/// and come out, one packet each, through [`packet_out`](Self::packet_out).
pub struct TheoraEncoder {
    config: EncoderConfig,
    quant_info: QuantInfo,
    tables: QuantTables,
    huffman: HuffmanSet,
    /// Absent in constant-quality mode.
    rate: Option<RateState>,
    frames: FrameStore,
    coder: Box<dyn FrameCoder>,
    writer: BitWriter,
    counters: FrameCounters,
    speed: SpeedLevel,
    headers_written: bool,
    packet_ready: bool,
    /// Set once the end-of-stream packet was handed out.
    done: bool,
}

impl TheoraEncoder {
    /// Create a session using the built-in [`BlockCoder`].
    pub fn new(config: EncoderConfig) -> Result<Self> {
        let coder = BlockCoder::new(config.width, config.height);
        Self::with_coder(config, Box::new(coder))
    }

    /// Create a session with a custom mode analysis and data coder.
    pub fn with_coder(mut config: EncoderConfig, coder: Box<dyn FrameCoder>) -> Result<Self> {
        if config.pixel_format != PixelFormat::Yuv420 {
            return Err(TheoraError::UnsupportedPixelFormat(config.pixel_format));
        }
        config.normalize();
        config.validate()?;

        let quant_info = QuantInfo::vp31();
        let tables = QuantTables::new(&quant_info)?;
        let huffman = HuffmanSet::vp3_default()?;
        let rate = config.is_rate_targeted().then(|| RateState::new(&config));
        let speed = if config.quick {
            SpeedLevel::Quick
        } else {
            SpeedLevel::Full
        };

        debug!(
            width = config.width,
            height = config.height,
            quality = config.quality,
            bitrate = config.target_bitrate,
            keyframe_force = config.keyframe_frequency_force,
            "encoder session created"
        );

        Ok(Self {
            frames: FrameStore::new(config.width, config.height),
            writer: BitWriter::with_capacity((config.npixels() as usize * 3) >> 1),
            counters: FrameCounters::new(config.quality as usize),
            config,
            quant_info,
            tables,
            huffman,
            rate,
            coder,
            speed,
            headers_written: false,
            packet_ready: false,
            done: false,
        })
    }

    /// The normalized configuration.
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Compress one frame.
    ///
    /// The image must have the encoded frame size. Its rows are stored
    /// bottom-up internally. A frame rejected for its geometry leaves any
    /// pending packet in place; a frame that fails during compression drops
    /// it and leaves the frame counters and rate state untouched.
    #[tracing::instrument(level = "trace", skip_all, fields(frame = self.counters.current_frame))]
    pub fn push_frame(&mut self, image: &YuvImage<'_>) -> Result<()> {
        if self.done {
            return Err(TheoraError::InvalidState(
                "end of stream already emitted".into(),
            ));
        }
        let (width, height) = (self.config.width, self.config.height);
        if image.y_width != width
            || image.y_height != height
            || image.uv_width != width / 2
            || image.uv_height != height / 2
        {
            return Err(TheoraError::DimensionMismatch {
                width: image.y_width,
                height: image.y_height,
                expected_width: width,
                expected_height: height,
            });
        }
        image.check_planes()?;
        self.packet_ready = false;
        copy_flipped(image, &mut self.frames.input)?;

        // A failed frame leaves counters and rate state as they were
        let counters = self.counters.clone();
        let rate = self.rate.clone();
        let result = Compressor {
            config: &self.config,
            tables: &self.tables,
            rate: self.rate.as_mut(),
            frames: &mut self.frames,
            coder: &mut *self.coder,
            writer: &mut self.writer,
            counters: &mut self.counters,
            speed: self.speed,
        }
        .compress();
        let frame_type = match result {
            Ok(frame_type) => frame_type,
            Err(err) => {
                debug!(error = %err, "frame compression failed");
                self.counters = counters;
                self.rate = rate;
                self.writer.reset();
                return Err(err);
            }
        };

        self.packet_ready = true;
        trace!(?frame_type, bytes = self.writer.bytes_written(), "packet ready");
        Ok(())
    }

    /// Take the packet of the last compressed frame.
    ///
    /// Returns `Ok(None)` when no packet is pending. `last` marks the packet
    /// as the end of the stream; any call after that fails.
    pub fn packet_out(&mut self, last: bool) -> Result<Option<Packet<'_>>> {
        if self.done {
            return Err(TheoraError::InvalidState(
                "end of stream already emitted".into(),
            ));
        }
        if !self.packet_ready || self.writer.bytes_written() == 0 {
            return Ok(None);
        }
        self.packet_ready = false;
        self.done = last;

        let mut flags = PacketFlags::empty();
        if self.counters.frame_type == FrameType::Key {
            flags |= PacketFlags::KEYFRAME;
        }
        if last {
            flags |= PacketFlags::END_OF_STREAM;
        }
        debug!(
            packet_no = self.counters.current_frame,
            granule_pos = self.counters.granule_pos,
            bytes = self.writer.bytes_written(),
            last,
            "data packet"
        );
        Ok(Some(
            Packet::from_slice(self.writer.data())
                .with_packet_no(self.counters.current_frame)
                .with_granule_pos(self.counters.granule_pos)
                .with_flags(flags),
        ))
    }

    /// Build the identification header packet.
    pub fn ident_header(&self) -> Result<Packet<'static>> {
        let data = IdentHeader::from_config(&self.config).write()?;
        Ok(header_packet(data, PacketFlags::BEGIN_OF_STREAM))
    }

    /// Build the comment header packet.
    pub fn comment_header(&self, comments: &CommentHeader) -> Result<Packet<'static>> {
        Ok(header_packet(comments.write()?, PacketFlags::empty()))
    }

    /// Build the setup header packet.
    ///
    /// Quantization parameters are locked from here on.
    pub fn setup_header(&mut self) -> Result<Packet<'static>> {
        let data = headers::setup_packet(&self.quant_info, &self.huffman)?;
        self.headers_written = true;
        Ok(header_packet(data, PacketFlags::empty()))
    }

    /// Apply a control request.
    pub fn control(&mut self, control: Control) -> Result<ControlResponse> {
        if control.changes_setup() && self.headers_written {
            return Err(TheoraError::LockedAfterHeaders);
        }
        match control {
            Control::SetQuantParams(info) => {
                let info = info.map_or_else(QuantInfo::vp31, |info| *info);
                self.set_quant_info(info)?;
            }
            Control::SetVp3Compatible => self.set_quant_info(QuantInfo::vp31())?,
            Control::GetSpeedLevelMax => return Ok(ControlResponse::SpeedLevelMax(SpeedLevel::MAX)),
            Control::SetSpeedLevel(level) => {
                debug!(?level, "speed level changed");
                self.speed = level;
            }
        }
        Ok(ControlResponse::Done)
    }

    fn set_quant_info(&mut self, info: QuantInfo) -> Result<()> {
        self.tables = QuantTables::new(&info)?;
        self.quant_info = info;
        debug!("quantization parameters replaced");
        Ok(())
    }

    /// Absolute frame number of a granule position from this stream.
    pub fn granule_frame(&self, granule_pos: i64) -> i64 {
        granule::granule_frame(granule_pos, self.config.granule_shift())
    }

    /// Presentation time in seconds of a granule position from this stream.
    pub fn granule_time(&self, granule_pos: i64) -> f64 {
        granule::granule_time(granule_pos, self.config.granule_shift(), self.config.fps)
    }

    /// Frame counter; 1 before the first frame.
    pub fn current_frame(&self) -> i64 {
        self.counters.current_frame
    }

    /// Frames since the last keyframe, 0 on a keyframe; `None` before the
    /// first frame.
    pub fn frames_since_keyframe(&self) -> Option<i64> {
        (self.counters.last_key_frame > 0).then(|| self.counters.last_key_frame - 1)
    }

    /// Type of the last compressed frame.
    pub fn last_frame_type(&self) -> FrameType {
        self.counters.frame_type
    }

    /// Quality index of the last compressed frame.
    pub fn base_qi(&self) -> usize {
        self.counters.base_qi
    }

    /// Rate model state; `None` in constant-quality mode.
    pub fn rate_state(&self) -> Option<&RateState> {
        self.rate.as_ref()
    }

    /// Current speed level.
    pub fn speed_level(&self) -> SpeedLevel {
        self.speed
    }

    /// Whether the setup header has been built.
    pub fn headers_written(&self) -> bool {
        self.headers_written
    }

    /// Active quantization parameters.
    pub fn quant_info(&self) -> &QuantInfo {
        &self.quant_info
    }
}

impl fmt::Debug for TheoraEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TheoraEncoder")
            .field("config", &self.config)
            .field("counters", &self.counters)
            .field("rate", &self.rate)
            .field("speed", &self.speed)
            .field("headers_written", &self.headers_written)
            .field("packet_ready", &self.packet_ready)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

fn header_packet(data: Vec<u8>, flags: PacketFlags) -> Packet<'static> {
    Packet::new(data)
        .with_packet_no(0)
        .with_granule_pos(0)
        .with_flags(flags | PacketFlags::HEADER)
}

/// Copy all planes into `dst`, last row first.
fn copy_flipped(image: &YuvImage<'_>, dst: &mut FrameBuffer) -> Result<()> {
    for pli in 0..3 {
        let (src, width, height, src_stride) = image.plane(pli);
        let dst_stride = dst.stride(pli);
        let plane = dst
            .plane_mut(pli)
            .ok_or_else(|| TheoraError::Encode(format!("missing plane {pli}")))?;
        let (width, height) = (width as usize, height as usize);
        for row in 0..height {
            let from = row * src_stride;
            let to = (height - 1 - row) * dst_stride;
            plane[to..to + width].copy_from_slice(&src[from..from + width]);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(width: u32, height: u32) -> (Vec<u8>, Vec<u8>) {
        (
            vec![128u8; (width * height) as usize],
            vec![128u8; (width * height / 4) as usize],
        )
    }

    #[test]
    fn test_rejects_other_pixel_formats() {
        let config = EncoderConfig::new(64, 64).with_pixel_format(PixelFormat::Yuv444);
        let err = TheoraEncoder::new(config).unwrap_err();
        assert!(matches!(err, TheoraError::UnsupportedPixelFormat(PixelFormat::Yuv444)));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let config = EncoderConfig::new(64, 64).with_offset(8, 0);
        assert!(matches!(
            TheoraEncoder::new(config),
            Err(TheoraError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_copy_flips_rows() {
        let y: Vec<u8> = (0..16 * 16).map(|i| (i / 16) as u8).collect();
        let uv: Vec<u8> = (0..8 * 8).map(|i| (i / 8) as u8).collect();
        let image = YuvImage::new_420(16, 16, &y, &uv, &uv);
        let mut frame = FrameBuffer::new(16, 16, theoraenc_core::PixelFormat::Yuv420p);
        copy_flipped(&image, &mut frame).unwrap();
        let stride = frame.stride(0);
        assert_eq!(frame.plane(0).unwrap()[0], 15);
        assert_eq!(frame.plane(0).unwrap()[15 * stride], 0);
        assert_eq!(frame.plane(1).unwrap()[0], 7);
    }

    #[test]
    fn test_packet_out_before_frames() {
        let mut encoder = TheoraEncoder::new(EncoderConfig::new(32, 32)).unwrap();
        assert!(encoder.packet_out(false).unwrap().is_none());
        assert_eq!(encoder.frames_since_keyframe(), None);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut encoder = TheoraEncoder::new(EncoderConfig::new(32, 32)).unwrap();
        let (y, uv) = gray(48, 32);
        let err = encoder
            .push_frame(&YuvImage::new_420(48, 32, &y, &uv, &uv))
            .unwrap_err();
        assert!(matches!(
            err,
            TheoraError::DimensionMismatch {
                width: 48,
                expected_width: 32,
                ..
            }
        ));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_speed_level_control() {
        let mut encoder = TheoraEncoder::new(EncoderConfig::new(32, 32)).unwrap();
        assert_eq!(
            encoder.control(Control::GetSpeedLevelMax).unwrap(),
            ControlResponse::SpeedLevelMax(2)
        );
        encoder.control(Control::SetSpeedLevel(SpeedLevel::NoMotion)).unwrap();
        assert_eq!(encoder.speed_level(), SpeedLevel::NoMotion);
        // Speed changes stay allowed after the headers
        encoder.setup_header().unwrap();
        encoder.control(Control::SetSpeedLevel(SpeedLevel::Full)).unwrap();
        assert!(matches!(
            encoder.control(Control::SetVp3Compatible),
            Err(TheoraError::LockedAfterHeaders)
        ));
    }

    #[test]
    fn test_set_quant_params_validates() {
        let mut encoder = TheoraEncoder::new(EncoderConfig::new(32, 32)).unwrap();
        let mut info = QuantInfo::vp31();
        info.base_matrices.clear();
        assert!(matches!(
            encoder.control(Control::SetQuantParams(Some(Box::new(info)))),
            Err(TheoraError::InvalidArgument(_))
        ));

        let mut info = QuantInfo::vp31();
        info.loop_filter_limits[10] = 200;
        assert!(matches!(
            encoder.control(Control::SetQuantParams(Some(Box::new(info)))),
            Err(TheoraError::InvalidArgument(_))
        ));
        assert_eq!(encoder.quant_info(), &QuantInfo::vp31());

        let mut info = QuantInfo::vp31();
        info.dc_scale[0] = 300;
        encoder
            .control(Control::SetQuantParams(Some(Box::new(info.clone()))))
            .unwrap();
        assert_eq!(encoder.quant_info(), &info);
        encoder.control(Control::SetQuantParams(None)).unwrap();
        assert_eq!(encoder.quant_info(), &QuantInfo::vp31());
    }
}
