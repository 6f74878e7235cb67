//! Frame type decision and compression passes.
//!
//! Each input frame runs through a small state machine. A frame starts as a
//! keyframe (at stream start or when the hard interval is reached) or as a
//! delta frame. The first keyframe and the first delta frame of a stream are
//! coded twice: the first pass only seeds the rate model. A delta frame
//! whose mode analysis asks for a keyframe restarts as one, and nothing of
//! the delta pass survives in the output.

use crate::coder::{FrameCoder, FrameParams, FrameRefs, ModeDecision};
use crate::config::EncoderConfig;
use crate::control::SpeedLevel;
use crate::error::{Result, TheoraError};
use crate::fixed;
use crate::granule;
use crate::quant::QuantTables;
use crate::rate::{RateContext, RateState};
use crate::FrameType;
use std::mem;
use theoraenc_core::{BitWriter, FrameBuffer, PixelFormat};
use tracing::{debug, trace};

/// Upper bound on passes over one frame.
const MAX_PASSES: usize = 3;

/// Input and reconstruction buffers.
#[derive(Debug, Clone)]
pub struct FrameStore {
    /// Copy of the frame being coded.
    pub input: FrameBuffer,
    /// Reconstruction being written.
    pub recon: FrameBuffer,
    /// Reconstruction of the previous frame.
    pub last: FrameBuffer,
    /// Reconstruction of the last keyframe.
    pub golden: FrameBuffer,
}

impl FrameStore {
    /// Allocate buffers for a `width` x `height` 4:2:0 frame.
    pub fn new(width: u32, height: u32) -> Self {
        let frame = || {
            let mut buffer = FrameBuffer::new(width, height, PixelFormat::Yuv420p);
            buffer.fill(128);
            buffer
        };
        Self {
            input: frame(),
            recon: frame(),
            last: frame(),
            golden: frame(),
        }
    }

    /// Make the fresh reconstruction the reference for the next frame.
    pub fn advance(&mut self, frame_type: FrameType) -> Result<()> {
        mem::swap(&mut self.recon, &mut self.last);
        if frame_type == FrameType::Key {
            self.golden.copy_from(&self.last)?;
        }
        Ok(())
    }
}

/// Frame counters shared by the compressor and the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameCounters {
    /// Frame counter, starting at 1 and advanced after each coded frame.
    pub current_frame: i64,
    /// Frames since the last keyframe, counting the keyframe as 1; -1 at
    /// stream start.
    pub last_key_frame: i64,
    /// Quality index of the last coded frame.
    pub base_qi: usize,
    /// Type of the last coded frame.
    pub frame_type: FrameType,
    /// Whether a delta frame has been coded yet.
    pub delta_primed: bool,
    /// Granule position of the last coded frame.
    pub granule_pos: i64,
}

impl FrameCounters {
    /// Counters for a fresh stream.
    pub fn new(quality: usize) -> Self {
        Self {
            current_frame: 1,
            last_key_frame: -1,
            base_qi: quality,
            frame_type: FrameType::Key,
            delta_primed: false,
            granule_pos: -1,
        }
    }
}

/// Compression state of the frame in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Code a scheduled keyframe. `priming` marks the discarded first pass
    /// of the stream.
    SelectKey { priming: bool },
    /// Code a delta frame. `recode` marks the second pass of the first one.
    SelectDelta { recode: bool },
    /// Code the frame again as a keyframe.
    KeyRestart,
}

enum DeltaOutcome {
    Done,
    Primed,
    Veto,
}

/// Borrowed session state for compressing one frame.
pub struct Compressor<'a> {
    /// Normalized configuration.
    pub config: &'a EncoderConfig,
    /// Quantizer tables.
    pub tables: &'a QuantTables,
    /// Rate model, absent in constant-quality mode.
    pub rate: Option<&'a mut RateState>,
    /// Frame buffers.
    pub frames: &'a mut FrameStore,
    /// Mode analysis and data coding.
    pub coder: &'a mut dyn FrameCoder,
    /// Packet payload sink.
    pub writer: &'a mut BitWriter,
    /// Frame counters.
    pub counters: &'a mut FrameCounters,
    /// Speed level.
    pub speed: SpeedLevel,
}

impl<'a> Compressor<'a> {
    /// The state a new frame starts in.
    pub fn initial_state(&self) -> FrameState {
        let lkf = self.counters.last_key_frame;
        if lkf == -1 || lkf >= self.config.keyframe_frequency_force as i64 {
            FrameState::SelectKey {
                priming: self.counters.current_frame == 1,
            }
        } else {
            FrameState::SelectDelta { recode: false }
        }
    }

    /// Compress the frame in `frames.input` and advance the counters.
    pub fn compress(&mut self) -> Result<FrameType> {
        let mut state = self.initial_state();
        for _ in 0..MAX_PASSES {
            trace!(?state, current_frame = self.counters.current_frame, "compression pass");
            state = match state {
                FrameState::SelectKey { priming } => {
                    self.key_pass(false)?;
                    if !priming {
                        return self.finish(FrameType::Key);
                    }
                    FrameState::KeyRestart
                }
                FrameState::KeyRestart => {
                    self.key_pass(true)?;
                    return self.finish(FrameType::Key);
                }
                FrameState::SelectDelta { recode } => match self.delta_pass(recode)? {
                    DeltaOutcome::Done => return self.finish(FrameType::Delta),
                    DeltaOutcome::Primed => FrameState::SelectDelta { recode: true },
                    DeltaOutcome::Veto => {
                        debug!(
                            current_frame = self.counters.current_frame,
                            "mode analysis forced a keyframe"
                        );
                        FrameState::KeyRestart
                    }
                },
            };
        }
        Err(TheoraError::Encode(format!(
            "frame {} did not settle after {} passes",
            self.counters.current_frame, MAX_PASSES
        )))
    }

    fn rate_context(&self) -> RateContext<'a> {
        RateContext {
            tables: self.tables,
            npixels: self.config.npixels(),
            quality: self.config.quality as usize,
            base_qi: self.counters.base_qi,
            keyframe_force: self.config.keyframe_frequency_force,
            last_key_frame: self.counters.last_key_frame,
        }
    }

    /// Pick the quantizer for a pass; constant-quality mode keeps the
    /// configured one.
    fn select(&mut self, frame_type: FrameType, trial: bool) {
        let ctx = self.rate_context();
        if let Some(rate) = self.rate.as_deref() {
            self.counters.base_qi = rate.select_qi(frame_type, trial, &ctx);
        }
    }

    fn update(&mut self, frame_type: FrameType, trial: bool) {
        let bits = (self.writer.bytes_written() as i64) << 3;
        let ctx = self.rate_context();
        if let Some(rate) = self.rate.as_deref_mut() {
            rate.update(frame_type, ctx.base_qi, bits, trial, &ctx);
        }
    }

    /// Reset the sink and write the frame header.
    fn start_frame(&mut self, frame_type: FrameType) -> Result<()> {
        self.writer.reset();
        self.counters.frame_type = frame_type;
        write_frame_header(self.writer, frame_type, self.counters.base_qi)
    }

    fn params(&self, frame_type: FrameType) -> FrameParams<'a> {
        FrameParams {
            frame_type,
            qi: self.counters.base_qi,
            lambda: fixed::lambda(self.tables.qavg(frame_type, self.counters.base_qi)),
            tables: self.tables,
            last_key_frame: self.counters.last_key_frame,
            keyframe_mindistance: self.config.keyframe_mindistance,
            motion_compensation: self.speed.motion_compensation(),
            quick: self.speed.quick() || self.config.quick,
        }
    }

    fn analyse(&mut self, params: &FrameParams<'_>, recode: bool) -> Result<ModeDecision> {
        let FrameStore {
            input,
            last,
            golden,
            ..
        } = &*self.frames;
        let refs = FrameRefs {
            input,
            last,
            golden,
        };
        self.coder.pick_modes(&refs, params, recode)
    }

    fn encode(&mut self, params: &FrameParams<'_>) -> Result<()> {
        let FrameStore {
            input,
            recon,
            last,
            golden,
        } = &mut *self.frames;
        let refs = FrameRefs {
            input,
            last,
            golden,
        };
        self.coder.encode_data(&refs, params, recon, self.writer)
    }

    fn key_pass(&mut self, recode: bool) -> Result<()> {
        self.select(FrameType::Key, self.counters.current_frame == 1);
        self.start_frame(FrameType::Key)?;
        let params = self.params(FrameType::Key);
        // Keyframes have nothing to veto
        self.analyse(&params, recode)?;
        self.encode(&params)?;
        self.counters.last_key_frame = 1;
        if !recode {
            self.update(FrameType::Key, true);
        }
        Ok(())
    }

    fn delta_pass(&mut self, recode: bool) -> Result<DeltaOutcome> {
        self.select(FrameType::Delta, false);
        self.start_frame(FrameType::Delta)?;
        let params = self.params(FrameType::Delta);

        let decision = self.analyse(&params, recode)?;
        if decision == ModeDecision::ForceKeyFrame && self.config.keyframe_auto {
            return Ok(DeltaOutcome::Veto);
        }

        if !self.counters.delta_primed && !recode {
            self.encode(&params)?;
            self.update(FrameType::Delta, true);
            return Ok(DeltaOutcome::Primed);
        }

        self.counters.last_key_frame += 1;
        let params = FrameParams {
            last_key_frame: self.counters.last_key_frame,
            ..params
        };
        self.encode(&params)?;
        Ok(DeltaOutcome::Done)
    }

    /// Book-keeping after the final pass.
    fn finish(&mut self, frame_type: FrameType) -> Result<FrameType> {
        self.update(frame_type, false);
        self.frames.advance(frame_type)?;
        if frame_type == FrameType::Delta {
            self.counters.delta_primed = true;
        }
        self.counters.current_frame += 1;
        self.counters.granule_pos = granule::compute(
            self.counters.current_frame,
            self.counters.last_key_frame,
            self.config.granule_shift(),
        );
        debug!(
            ?frame_type,
            qi = self.counters.base_qi,
            bytes = self.writer.bytes_written(),
            granule_pos = self.counters.granule_pos,
            "frame compressed"
        );
        Ok(frame_type)
    }
}

/// Write the frame header that opens every data packet.
pub fn write_frame_header(writer: &mut BitWriter, frame_type: FrameType, qi: usize) -> Result<()> {
    // Data packet marker
    writer.write_bit(false)?;
    writer.write_bit(frame_type == FrameType::Delta)?;
    writer.write_bits(qi as u32, 6)?;
    // Single qi per frame
    writer.write_bit(false)?;
    if frame_type == FrameType::Key {
        writer.write_bits(0, 3)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quant::QuantInfo;
    use theoraenc_core::BitReader;

    #[test]
    fn test_key_header_layout() {
        let mut writer = BitWriter::new();
        write_frame_header(&mut writer, FrameType::Key, 45).unwrap();
        assert_eq!(writer.position(), 12);
        let mut reader = BitReader::new(writer.data());
        assert!(!reader.read_bit().unwrap());
        assert!(!reader.read_bit().unwrap());
        assert_eq!(reader.read_bits(6).unwrap(), 45);
        assert_eq!(reader.read_bits(4).unwrap(), 0);
    }

    #[test]
    fn test_delta_header_layout() {
        let mut writer = BitWriter::new();
        write_frame_header(&mut writer, FrameType::Delta, 63).unwrap();
        assert_eq!(writer.position(), 9);
        assert_eq!(writer.data()[0], 0b0111_1111);
        assert_eq!(writer.data()[1], 0);
    }

    #[test]
    fn test_frame_store_advance() {
        let mut store = FrameStore::new(32, 32);
        store.recon.fill(7);
        store.last.fill(9);
        store.advance(FrameType::Delta).unwrap();
        assert_eq!(store.last.plane(0).unwrap()[0], 7);
        assert_eq!(store.recon.plane(0).unwrap()[0], 9);
        assert_eq!(store.golden.plane(0).unwrap()[0], 128);

        store.recon.fill(3);
        store.advance(FrameType::Key).unwrap();
        assert_eq!(store.golden.plane(2).unwrap()[0], 3);
    }

    struct CountingCoder {
        picks: Vec<(FrameType, bool)>,
        encodes: usize,
    }

    impl FrameCoder for CountingCoder {
        fn pick_modes(
            &mut self,
            _refs: &FrameRefs<'_>,
            params: &FrameParams<'_>,
            recode: bool,
        ) -> Result<ModeDecision> {
            self.picks.push((params.frame_type, recode));
            Ok(ModeDecision::Continue)
        }

        fn encode_data(
            &mut self,
            _refs: &FrameRefs<'_>,
            _params: &FrameParams<'_>,
            _recon: &mut FrameBuffer,
            writer: &mut BitWriter,
        ) -> Result<()> {
            self.encodes += 1;
            writer.write_bits(0xAB, 8)?;
            Ok(())
        }
    }

    #[test]
    fn test_pass_sequence() {
        let mut config = EncoderConfig::new(32, 32).with_keyframe_interval(4);
        config.normalize();
        let tables = QuantTables::new(&QuantInfo::vp31()).unwrap();
        let mut frames = FrameStore::new(32, 32);
        let mut coder = CountingCoder { picks: Vec::new(), encodes: 0 };
        let mut writer = BitWriter::new();
        let mut counters = FrameCounters::new(config.quality as usize);

        let mut types = Vec::new();
        for _ in 0..6 {
            let mut compressor = Compressor {
                config: &config,
                tables: &tables,
                rate: None,
                frames: &mut frames,
                coder: &mut coder,
                writer: &mut writer,
                counters: &mut counters,
                speed: SpeedLevel::Full,
            };
            types.push(compressor.compress().unwrap());
        }

        use FrameType::{Delta, Key};
        assert_eq!(types, vec![Key, Delta, Delta, Delta, Key, Delta]);
        assert_eq!(
            &coder.picks[..4],
            &[(Key, false), (Key, true), (Delta, false), (Delta, true)]
        );
        // Two priming passes on top of six frames
        assert_eq!(coder.encodes, 8);
        assert_eq!(counters.current_frame, 7);
        assert_eq!(counters.last_key_frame, 2);
        assert_eq!(counters.granule_pos, granule::compute(7, 2, 2));
    }
}
