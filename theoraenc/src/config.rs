//! Encoder configuration.

use crate::error::{Result, TheoraError};
use crate::fixed::ilog;
use crate::{ColorSpace, PixelFormat, MACROBLOCK_SIZE, MAX_KEYFRAME_INTERVAL};
use theoraenc_core::Rational;

/// Largest bitrate representable in the identification header.
pub const MAX_TARGET_BITRATE: u32 = (1 << 24) - 1;

/// Highest quality index.
pub const MAX_QUALITY: u32 = 63;

/// Theora encoder configuration.
///
/// `width`/`height` are the encoded frame size and must be multiples of 16.
/// The display window (`frame_width` x `frame_height` at `offset_x`,
/// `offset_y`) must fit inside it. `offset_y` is measured from the top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Encoded frame width (multiple of 16).
    pub width: u32,
    /// Encoded frame height (multiple of 16).
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
    /// Color space tag.
    pub colorspace: ColorSpace,
    /// Pixel format tag.
    pub pixel_format: PixelFormat,
    /// Target bitrate in bits per second (0 = constant quality).
    pub target_bitrate: u32,
    /// Base quality index (0-63).
    pub quality: u32,
    /// Nominal keyframe interval.
    pub keyframe_frequency: u32,
    /// Hard keyframe interval.
    pub keyframe_frequency_force: u32,
    /// Minimum distance between automatically inserted keyframes.
    pub keyframe_mindistance: u32,
    /// Allow mode analysis to insert keyframes.
    pub keyframe_auto: bool,
    /// Faster, lower quality mode decisions.
    pub quick: bool,
}

impl EncoderConfig {
    /// Create a configuration for a `width` x `height` picture.
    ///
    /// The encoded size is rounded up to whole macroblocks. A size that
    /// cannot be rounded becomes 0 and is rejected by [`validate`](Self::validate).
    pub fn new(width: u32, height: u32) -> Self {
        let round = |size: u32| {
            size.checked_add(MACROBLOCK_SIZE - 1)
                .map_or(0, |s| s & !(MACROBLOCK_SIZE - 1))
        };
        let encoded_width = round(width);
        let encoded_height = round(height);

        Self {
            width: encoded_width,
            height: encoded_height,
            frame_width: width,
            frame_height: height,
            offset_x: 0,
            offset_y: 0,
            fps: Rational::new(30, 1),
            aspect: Rational::new(1, 1),
            colorspace: ColorSpace::Unspecified,
            pixel_format: PixelFormat::Yuv420,
            target_bitrate: 0,
            quality: 48,
            keyframe_frequency: 64,
            keyframe_frequency_force: 64,
            keyframe_mindistance: 8,
            keyframe_auto: true,
            quick: false,
        }
    }

    /// Override the encoded frame size.
    pub fn with_encoded_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the display offsets (top-origin).
    pub fn with_offset(mut self, x: u32, y: u32) -> Self {
        self.offset_x = x;
        self.offset_y = y;
        self
    }

    /// Set frame rate.
    pub fn with_frame_rate(mut self, num: u32, den: u32) -> Self {
        self.fps = Rational::new(num, den);
        self
    }

    /// Set pixel aspect ratio.
    pub fn with_aspect_ratio(mut self, num: u32, den: u32) -> Self {
        self.aspect = Rational::new(num, den);
        self
    }

    /// Set color space.
    pub fn with_colorspace(mut self, colorspace: ColorSpace) -> Self {
        self.colorspace = colorspace;
        self
    }

    /// Set pixel format.
    pub fn with_pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }

    /// Set target bitrate (0 selects constant-quality mode).
    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.target_bitrate = bitrate;
        self
    }

    /// Set quality (0-63).
    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = quality;
        self
    }

    /// Set both the nominal and the hard keyframe interval.
    pub fn with_keyframe_interval(mut self, interval: u32) -> Self {
        self.keyframe_frequency = interval;
        self.keyframe_frequency_force = interval;
        self
    }

    /// Set the hard keyframe interval only.
    pub fn with_keyframe_force(mut self, interval: u32) -> Self {
        self.keyframe_frequency_force = interval;
        self
    }

    /// Set the minimum keyframe distance.
    pub fn with_keyframe_mindistance(mut self, distance: u32) -> Self {
        self.keyframe_mindistance = distance;
        self
    }

    /// Enable or disable automatic keyframe insertion.
    pub fn with_auto_keyframes(mut self, enable: bool) -> Self {
        self.keyframe_auto = enable;
        self
    }

    /// Enable or disable quick mode decisions.
    pub fn with_quick(mut self, quick: bool) -> Self {
        self.quick = quick;
        self
    }

    /// Clamp fields to the ranges the bitstream can carry.
    pub fn normalize(&mut self) {
        self.quality = self.quality.min(MAX_QUALITY);
        self.target_bitrate = self.target_bitrate.min(MAX_TARGET_BITRATE);
        self.fps = self.fps.at_least_one();

        if !self.keyframe_auto {
            self.keyframe_frequency_force = self.keyframe_frequency;
        }
        self.keyframe_frequency_force = self.keyframe_frequency_force.clamp(1, MAX_KEYFRAME_INTERVAL);
        self.keyframe_mindistance = self
            .keyframe_mindistance
            .min(MAX_KEYFRAME_INTERVAL)
            .min(self.keyframe_frequency_force);
    }

    /// Validate the geometry.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(TheoraError::InvalidConfig(format!(
                "Invalid dimensions: {}x{}",
                self.width, self.height
            )));
        }
        if self.width % MACROBLOCK_SIZE != 0 || self.height % MACROBLOCK_SIZE != 0 {
            return Err(TheoraError::InvalidConfig(format!(
                "Encoded size {}x{} is not a multiple of {}",
                self.width, self.height, MACROBLOCK_SIZE
            )));
        }
        if self.width >> 4 > 0xFFFF || self.height >> 4 > 0xFFFF {
            return Err(TheoraError::InvalidConfig("Encoded size too large".into()));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(TheoraError::InvalidConfig("Empty display window".into()));
        }
        if self.offset_x > 255 || self.offset_y > 255 {
            return Err(TheoraError::InvalidConfig(format!(
                "Display offset ({}, {}) exceeds 255",
                self.offset_x, self.offset_y
            )));
        }
        if self.frame_width.saturating_add(self.offset_x) > self.width
            || self.frame_height.saturating_add(self.offset_y) > self.height
        {
            return Err(TheoraError::InvalidConfig(format!(
                "Display window {}x{}+{}+{} exceeds encoded size {}x{}",
                self.frame_width,
                self.frame_height,
                self.offset_x,
                self.offset_y,
                self.width,
                self.height
            )));
        }
        // Stored bottom-origin in the identification header
        if self.height - self.frame_height - self.offset_y > 255 {
            return Err(TheoraError::InvalidConfig(
                "Bottom display offset exceeds 255".into(),
            ));
        }
        if self.aspect.num > 0xFFFFFF || self.aspect.den > 0xFFFFFF {
            return Err(TheoraError::InvalidConfig("Aspect ratio exceeds 24 bits".into()));
        }
        Ok(())
    }

    /// Whether bitrate targeting is on.
    pub fn is_rate_targeted(&self) -> bool {
        self.target_bitrate > 0
    }

    /// Number of bits used for the delta offset in granule positions.
    pub fn granule_shift(&self) -> u32 {
        ilog(self.keyframe_frequency_force.saturating_sub(1))
    }

    /// Encoded luma pixel count.
    pub fn npixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Number of macroblocks in the encoded frame.
    pub fn num_macroblocks(&self) -> usize {
        (self.width / MACROBLOCK_SIZE) as usize * (self.height / MACROBLOCK_SIZE) as usize
    }

    /// Get plane dimensions.
    pub fn plane_dimensions(&self, plane: usize) -> (u32, u32) {
        if plane == 0 {
            (self.width, self.height)
        } else {
            let (h_sub, v_sub) = self.pixel_format.chroma_subsampling();
            (self.width / h_sub, self.height / v_sub)
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self::new(640, 480)
    }
}
