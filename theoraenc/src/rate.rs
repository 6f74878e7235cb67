//! Rate control.
//!
//! Bits per frame are modeled per frame type as a power law of the average
//! quantizer:
//!
//! ```text
//! bits = scale * npixels / 256 * (qavg / 32)^(-exp / 64)
//! ```
//!
//! A leaky bucket of `buf_delay` frames tracks how far the stream is from its
//! bit budget. Before each frame the model is solved for the rate that brings
//! the bucket back to its target fullness by the next keyframe (or the end of
//! the buffer window), and the closest quantizer is picked.

use crate::config::EncoderConfig;
use crate::quant::{QuantTables, NQIS};
use crate::FrameType;
use tracing::{debug, trace};

/// Relative weight of a frame of each type when distributing bits.
const KEY_RATIO: [f64; 2] = [0.53125, 1.0];

/// Maximum Newton iterations in the rate solver.
const MAX_SOLVER_ITERATIONS: usize = 10;

/// Smoothing weight (out of 256) kept from the previous scale estimate.
const RATE_SMOOTHING: [i64; 2] = [128, 128];

const MIN_BITS_PER_FRAME: i64 = 32;
const MAX_BITS_PER_FRAME: i64 = 1 << 54;

/// Everything the rate model reads from the session.
#[derive(Debug, Clone, Copy)]
pub struct RateContext<'a> {
    /// Expanded quantizer tables.
    pub tables: &'a QuantTables,
    /// Encoded luma pixel count.
    pub npixels: u64,
    /// Configured quality; the lowest qi the solver may pick.
    pub quality: usize,
    /// Quality index of the previous frame.
    pub base_qi: usize,
    /// Hard keyframe interval.
    pub keyframe_force: u32,
    /// Frames coded since the last keyframe, counting the keyframe as 1.
    pub last_key_frame: i64,
}

/// Leaky-bucket state and per-frame-type model coefficients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateState {
    /// Bit budget per frame.
    pub bits_per_frame: i64,
    /// Buffer depth in frames.
    pub buf_delay: i64,
    /// Buffer capacity in bits.
    pub max: i64,
    /// Current buffer level in bits.
    pub fullness: i64,
    /// Desired buffer level in bits.
    pub target: i64,
    /// Model exponents, indexed by frame type.
    pub exp: [i32; 2],
    /// Model scales, indexed by frame type.
    pub scale: [u32; 2],
}

impl RateState {
    /// Derive the initial state from a normalized configuration.
    pub fn new(config: &EncoderConfig) -> Self {
        let fps_num = config.fps.num.max(1) as i64;
        let fps_den = config.fps.den.max(1) as i64;
        let bits_per_frame = ((config.target_bitrate as i64 * fps_den + (fps_num >> 1)) / fps_num)
            .clamp(MIN_BITS_PER_FRAME, MAX_BITS_PER_FRAME);

        let buf_delay = (config.keyframe_frequency_force as i64).clamp(12, 256);
        let max = bits_per_frame * buf_delay;
        // 75% full leaves room to over- or under-shoot on the next keyframe
        let target = ((max + 1) >> 1) + ((max + 2) >> 2);

        let npixels = config.npixels() as i64;
        let ibpp = (npixels + (bits_per_frame >> 1)) / bits_per_frame;
        let (exp, scale) = if ibpp < 10 {
            ([48, 77], [2199, 2500])
        } else if ibpp < 20 {
            ([51, 90], [1781, 1700])
        } else {
            ([54, 102], [870, 1300])
        };

        debug!(bits_per_frame, buf_delay, max, ibpp, "rate control initialized");

        Self {
            bits_per_frame,
            buf_delay,
            max,
            fullness: target,
            target,
            exp,
            scale,
        }
    }

    /// Choose the quality index for the next frame of `frame_type`.
    ///
    /// `trial` skips the limit on quality swings, for the priming passes at
    /// the start of a stream.
    pub fn select_qi(&self, frame_type: FrameType, trial: bool, ctx: &RateContext<'_>) -> usize {
        let qti = frame_type.index();
        let kff = ctx.keyframe_force.max(1) as i64;

        // Hit the fullness target before the last keyframe in the buffer
        // window (after the current frame) or at its end, whichever is first.
        let next_key_frame = match frame_type {
            FrameType::Key => 0,
            FrameType::Delta => (kff - ctx.last_key_frame).max(0),
        };
        let mut nframes = [0i64; 2];
        nframes[0] = (self.buf_delay - next_key_frame.min(self.buf_delay) + kff - 1) / kff;
        let buf_delay = if nframes[0] + qti as i64 > 1 {
            let delay = next_key_frame + (nframes[0] - 1) * kff;
            nframes[0] -= 1;
            delay
        } else {
            self.buf_delay
        };
        nframes[1] = buf_delay - nframes[0];

        let rate_total = self
            .fullness
            .saturating_sub(self.target)
            .saturating_add(buf_delay.saturating_mul(self.bits_per_frame));
        if rate_total <= 0 || buf_delay <= 0 {
            debug!(rate_total, quality = ctx.quality, "bit budget exhausted");
            return ctx.quality;
        }

        let npixels = ctx.npixels.max(1) as f64;
        let rate_total_f = rate_total as f64;
        let own = qti;
        let other = 1 - qti;
        let scale_own = self.scale[own].max(1) as f64;
        let scale_other = self.scale[other] as f64;
        let exp_ratio = self.exp[other] as f64 / self.exp[own].max(1) as f64;
        let own_weight = nframes[own] as f64 * KEY_RATIO[own];
        let other_weight = nframes[other] as f64 * KEY_RATIO[other] * scale_other / 256.0 * npixels;

        // Newton's method on the total bits spent over the window
        let mut curr = rate_total_f / buf_delay as f64;
        for iteration in 0..MAX_SOLVER_ITERATIONS {
            let prevr = curr;
            let rpow = (prevr * 256.0 / (npixels * scale_own)).powf(exp_ratio);
            let rdiff = own_weight * prevr + other_weight * rpow - rate_total_f;
            let rderiv = own_weight + other_weight * rpow * (exp_ratio / prevr);
            curr = prevr - rdiff / rderiv;
            trace!(iteration, prevr, curr, "rate solver step");
            if !curr.is_finite() || curr <= 0.0 {
                curr = prevr;
                break;
            }
            if KEY_RATIO[own] * curr > rate_total_f || (prevr - curr).abs() < 1.0 {
                break;
            }
        }

        let mut qtarget = (32.0
            * (KEY_RATIO[own] * curr * 256.0 / (npixels * scale_own))
                .powf(-64.0 / self.exp[own].max(1) as f64)
            + 0.5) as i64;

        // Limit quality swings outside of the priming passes
        if !trial {
            let base = ctx.tables.qavg(frame_type, ctx.base_qi) as i64;
            let qmin = (base * 13) >> 4;
            let qmax = (base * 5) >> 2;
            qtarget = qtarget.clamp(qmin, qmax);
        }

        // No ordering is assumed; ties go to the index closest to base_qi
        let quality = ctx.quality.min(NQIS - 1);
        let distance = |qi: usize| (qi as i64 - ctx.base_qi as i64).abs();
        let mut best_qi = quality;
        let mut best_qdiff = (ctx.tables.qavg(frame_type, best_qi) as i64 - qtarget).abs();
        for qi in quality + 1..NQIS {
            let qdiff = (ctx.tables.qavg(frame_type, qi) as i64 - qtarget).abs();
            if qdiff < best_qdiff || (qdiff == best_qdiff && distance(qi) < distance(best_qi)) {
                best_qi = qi;
                best_qdiff = qdiff;
            }
        }

        debug!(
            ?frame_type,
            trial,
            rate_total,
            target_rate = curr,
            qtarget,
            qi = best_qi,
            "selected quantizer"
        );
        best_qi
    }

    /// Fold the cost of a coded frame back into the model.
    ///
    /// A trial pass replaces the scale outright and leaves the bucket alone.
    pub fn update(
        &mut self,
        frame_type: FrameType,
        qi: usize,
        bits: i64,
        trial: bool,
        ctx: &RateContext<'_>,
    ) {
        let qti = frame_type.index();
        let npixels = ctx.npixels.max(1) as f64;
        let qavg = ctx.tables.qavg(frame_type, qi) as f64;
        let estimate = (256.0 * bits as f64
            / (npixels * (qavg / 32.0).powf(self.exp[qti] as f64 / -64.0))
            + 0.5)
            .clamp(1.0, u32::MAX as f64) as i64;

        if trial {
            self.scale[qti] = estimate as u32;
        } else {
            let old = self.scale[qti] as i64;
            let blended = estimate + (((old - estimate) * RATE_SMOOTHING[qti]) >> 8);
            self.scale[qti] = blended.clamp(1, u32::MAX as i64) as u32;
            // The bucket may overshoot, but only within [-max, 2 * max]
            self.fullness = self
                .fullness
                .saturating_add(self.bits_per_frame.saturating_sub(bits))
                .clamp(-self.max, self.max.saturating_mul(2));
        }

        debug!(
            ?frame_type,
            qi,
            bits,
            trial,
            scale = self.scale[qti],
            fullness = self.fullness,
            "rate state updated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quant::QuantInfo;

    fn tables() -> QuantTables {
        QuantTables::new(&QuantInfo::vp31()).unwrap()
    }

    fn config(bitrate: u32) -> EncoderConfig {
        let mut config = EncoderConfig::new(176, 144)
            .with_frame_rate(25, 1)
            .with_keyframe_interval(64)
            .with_bitrate(bitrate)
            .with_quality(16);
        config.normalize();
        config
    }

    fn ctx<'a>(tables: &'a QuantTables, config: &EncoderConfig, base_qi: usize, lkf: i64) -> RateContext<'a> {
        RateContext {
            tables,
            npixels: config.npixels(),
            quality: config.quality as usize,
            base_qi,
            keyframe_force: config.keyframe_frequency_force,
            last_key_frame: lkf,
        }
    }

    #[test]
    fn test_initial_state() {
        let state = RateState::new(&config(400_000));
        assert_eq!(state.bits_per_frame, 16_000);
        assert_eq!(state.buf_delay, 64);
        assert_eq!(state.max, 1_024_000);
        assert_eq!(state.fullness, 768_000);
        assert_eq!(state.target, state.fullness);
        assert_eq!(state.exp, [48, 77]);
        assert_eq!(state.scale, [2199, 2500]);
    }

    #[test]
    fn test_bits_per_frame_clamped() {
        let state = RateState::new(&config(1));
        assert_eq!(state.bits_per_frame, 32);

        let mut fast = config(1 << 23);
        fast.fps = theoraenc_core::Rational::new(1, u32::MAX);
        let state = RateState::new(&fast);
        assert!(state.bits_per_frame <= 1 << 54);
    }

    #[test]
    fn test_buffer_delay_clamped() {
        let mut short = config(100_000);
        short.keyframe_frequency_force = 4;
        assert_eq!(RateState::new(&short).buf_delay, 12);

        let mut long = config(100_000);
        long.keyframe_frequency_force = 1000;
        assert_eq!(RateState::new(&long).buf_delay, 256);
    }

    #[test]
    fn test_seed_tiers() {
        // ~50 bits per pixel: low-rate tier
        assert_eq!(RateState::new(&config(12_000)).exp, [54, 102]);
        // ~15 bits per pixel: middle tier
        assert_eq!(RateState::new(&config(40_000)).exp, [51, 90]);
    }

    #[test]
    fn test_exhausted_budget_returns_quality() {
        let tables = tables();
        let config = config(200_000);
        let mut state = RateState::new(&config);
        state.fullness = -(state.max * 10);
        let qi = state.select_qi(FrameType::Delta, false, &ctx(&tables, &config, 40, 3));
        assert_eq!(qi, 16);
    }

    #[test]
    fn test_select_qi_in_range() {
        let tables = tables();
        let config = config(200_000);
        let state = RateState::new(&config);
        for frame_type in [FrameType::Key, FrameType::Delta] {
            for trial in [true, false] {
                let qi = state.select_qi(frame_type, trial, &ctx(&tables, &config, 30, 5));
                assert!((16..64).contains(&qi), "{frame_type:?} trial={trial}: {qi}");
            }
        }
    }

    #[test]
    fn test_more_bits_means_finer_quantizer() {
        let tables = tables();
        let config = config(200_000);
        let mut state = RateState::new(&config);
        let starved = {
            state.fullness = state.target - state.max / 2;
            state.select_qi(FrameType::Delta, true, &ctx(&tables, &config, 30, 5))
        };
        let rich = {
            state.fullness = state.target + state.max;
            state.select_qi(FrameType::Delta, true, &ctx(&tables, &config, 30, 5))
        };
        assert!(rich >= starved, "rich {rich} < starved {starved}");
    }

    #[test]
    fn test_swing_limit() {
        let tables = tables();
        let config = config(200_000);
        let mut state = RateState::new(&config);
        state.fullness = state.target + state.max * 4;
        let base_qi = 20;
        let qi = state.select_qi(FrameType::Delta, false, &ctx(&tables, &config, base_qi, 5));
        let qmin = (tables.qavg(FrameType::Delta, base_qi) * 13) >> 4;
        assert!(tables.qavg(FrameType::Delta, qi) + 16 >= qmin);
    }

    #[test]
    fn test_solver_survives_extreme_scales() {
        let tables = tables();
        let config = config(200_000);
        let mut state = RateState::new(&config);
        state.scale = [u32::MAX, 1];
        let qi = state.select_qi(FrameType::Key, true, &ctx(&tables, &config, 30, -1));
        assert!(qi < 64);
        state.scale = [1, u32::MAX];
        let qi = state.select_qi(FrameType::Delta, false, &ctx(&tables, &config, 30, 2));
        assert!(qi < 64);
    }

    #[test]
    fn test_trial_update_overwrites_scale() {
        let tables = tables();
        let config = config(200_000);
        let mut state = RateState::new(&config);
        let fullness = state.fullness;
        state.update(FrameType::Key, 30, 50_000, true, &ctx(&tables, &config, 30, 1));
        assert_eq!(state.fullness, fullness);
        let qavg = tables.qavg(FrameType::Key, 30) as f64;
        let expected = 256.0 * 50_000.0 / (25344.0 * (qavg / 32.0).powf(-48.0 / 64.0));
        assert!((state.scale[0] as f64 - expected).abs() <= 1.0);
    }

    #[test]
    fn test_update_blends_and_drains() {
        let tables = tables();
        let config = config(200_000);
        let mut state = RateState::new(&config);
        let before = state.scale[1] as i64;
        let fullness = state.fullness;

        let mut trial = state.clone();
        trial.update(FrameType::Delta, 30, 4_000, true, &ctx(&tables, &config, 30, 2));
        let estimate = trial.scale[1] as i64;

        state.update(FrameType::Delta, 30, 4_000, false, &ctx(&tables, &config, 30, 2));
        assert_eq!(state.scale[1] as i64, estimate + (((before - estimate) * 128) >> 8));
        assert_eq!(state.fullness, fullness + state.bits_per_frame - 4_000);
    }

    #[test]
    fn test_bucket_bounded_at_extreme_rates() {
        let tables = tables();
        let mut config = EncoderConfig::new(16, 16)
            .with_frame_rate(1, u32::MAX)
            .with_bitrate((1 << 24) - 1)
            .with_keyframe_interval(256);
        config.normalize();
        let mut state = RateState::new(&config);
        assert_eq!(state.bits_per_frame, 1 << 54);

        for frame in 2..1000i64 {
            let ctx = ctx(&tables, &config, 40, frame);
            let qi = state.select_qi(FrameType::Delta, false, &ctx);
            assert!(qi < 64);
            state.update(FrameType::Delta, qi, 64, false, &ctx);
            assert!(state.fullness <= state.max.saturating_mul(2));
        }
        assert_eq!(state.fullness, state.max.saturating_mul(2));

        for frame in 0..10i64 {
            state.update(FrameType::Delta, 40, i64::MAX, false, &ctx(&tables, &config, 40, frame));
        }
        assert_eq!(state.fullness, -state.max);
    }
}
