//! Mode analysis and frame data coding.
//!
//! [`FrameCoder`] is the seam between the frame compressor and the pixel
//! work: the compressor decides frame type and quantizer, writes the frame
//! header, then asks the coder to analyse the frame and to emit its data.
//! [`BlockCoder`] is the built-in coder: per-macroblock intra/inter/golden
//! decisions with a small full-pel motion search, DCT residual coding and
//! reconstruction into the next reference frame.

use crate::error::{Result, TheoraError};
use crate::quant::QuantTables;
use crate::recon::{
    frag_copy_list, frag_recon_inter, frag_recon_inter2, frag_recon_intra, loop_filter_plane,
    Residue,
};
use crate::transform::{dequantize, forward_dct, inverse_dct, quantize, ZIGZAG};
use crate::{FrameType, BLOCK_SIZE};
use theoraenc_core::{BitWriter, FrameBuffer};
use tracing::trace;

/// Cost added to intra macroblocks before comparing them with inter ones.
pub const INTRA_BIAS: u32 = 512;

const FULL_SEARCH_RANGE: i32 = 7;
const QUICK_SEARCH_RANGE: i32 = 3;

/// Largest coded coefficient magnitude.
const MAX_COEFF: i32 = 255;

/// Coding mode for macroblocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodingMode {
    /// Intra-coded.
    #[default]
    Intra = 0,
    /// Inter from the last frame, no motion.
    InterNoMv = 1,
    /// Inter from the last frame with a motion vector.
    InterMv = 2,
    /// Inter from the golden frame, no motion.
    Golden = 3,
}

impl CodingMode {
    /// Rough cost of signalling the mode, in bits.
    fn signal_bits(self) -> i64 {
        match self {
            CodingMode::InterMv => 12,
            _ => 2,
        }
    }
}

/// Motion vector in full luma pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionVector {
    /// X component.
    pub x: i16,
    /// Y component.
    pub y: i16,
}

impl MotionVector {
    /// Create zero motion vector.
    pub fn zero() -> Self {
        Self { x: 0, y: 0 }
    }

    /// Create new motion vector.
    pub fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}

/// Outcome of mode analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeDecision {
    /// Code the frame as planned.
    Continue,
    /// The delta frame should be recoded as a keyframe.
    ForceKeyFrame,
}

/// Frames visible to the coder.
#[derive(Debug, Clone, Copy)]
pub struct FrameRefs<'a> {
    /// The frame being coded.
    pub input: &'a FrameBuffer,
    /// Reconstruction of the previous frame.
    pub last: &'a FrameBuffer,
    /// Reconstruction of the most recent keyframe.
    pub golden: &'a FrameBuffer,
}

/// Per-frame coding parameters chosen by the compressor.
#[derive(Debug, Clone, Copy)]
pub struct FrameParams<'a> {
    /// Frame type being coded.
    pub frame_type: FrameType,
    /// Quality index.
    pub qi: usize,
    /// Rate-distortion multiplier.
    pub lambda: i32,
    /// Quantizer tables.
    pub tables: &'a QuantTables,
    /// Frames since the last keyframe, counting the keyframe as 1.
    pub last_key_frame: i64,
    /// Minimum distance before mode analysis may ask for a keyframe.
    pub keyframe_mindistance: u32,
    /// Whether motion search is enabled.
    pub motion_compensation: bool,
    /// Whether to favour speed over quality.
    pub quick: bool,
}

/// Mode analysis and data coding for one frame.
pub trait FrameCoder: Send {
    /// Choose block modes. `recode` is set when the same input frame is
    /// analysed again after an earlier pass.
    fn pick_modes(
        &mut self,
        refs: &FrameRefs<'_>,
        params: &FrameParams<'_>,
        recode: bool,
    ) -> Result<ModeDecision>;

    /// Emit the frame data after the header and reconstruct into `recon`.
    fn encode_data(
        &mut self,
        refs: &FrameRefs<'_>,
        params: &FrameParams<'_>,
        recon: &mut FrameBuffer,
        writer: &mut BitWriter,
    ) -> Result<()>;
}

/// Built-in macroblock coder for 4:2:0 frames.
#[derive(Debug, Clone)]
pub struct BlockCoder {
    mb_cols: usize,
    mb_rows: usize,
    modes: Vec<CodingMode>,
    mvs: Vec<MotionVector>,
}

impl BlockCoder {
    /// Create a coder for an encoded frame of `width` x `height`.
    pub fn new(width: u32, height: u32) -> Self {
        let mb_cols = (width / 16) as usize;
        let mb_rows = (height / 16) as usize;
        Self {
            mb_cols,
            mb_rows,
            modes: vec![CodingMode::Intra; mb_cols * mb_rows],
            mvs: vec![MotionVector::zero(); mb_cols * mb_rows],
        }
    }

    /// Modes chosen by the last analysis, in macroblock raster order.
    pub fn modes(&self) -> &[CodingMode] {
        &self.modes
    }

    fn check_geometry(&self, frame: &FrameBuffer) -> Result<()> {
        if (frame.width / 16) as usize != self.mb_cols || (frame.height / 16) as usize != self.mb_rows {
            return Err(TheoraError::Encode(format!(
                "coder built for {}x{} macroblocks, frame is {}x{}",
                self.mb_cols, self.mb_rows, frame.width, frame.height
            )));
        }
        Ok(())
    }

    /// Best full-pel vector against `reference` within `range`, excluding zero.
    fn search(
        &self,
        src: &[u8],
        reference: &[u8],
        stride: usize,
        (width, height): (u32, u32),
        (mbx, mby): (usize, usize),
        range: i32,
        mv_penalty: i64,
    ) -> Option<(MotionVector, i64)> {
        let off = mby * 16 * stride + mbx * 16;
        let x0 = (mbx * 16) as i32;
        let y0 = (mby * 16) as i32;
        let mut best: Option<(MotionVector, i64)> = None;
        for dy in -range..=range {
            for dx in -range..=range {
                if dx == 0 && dy == 0 {
                    continue;
                }
                if x0 + dx < 0 || y0 + dy < 0 || x0 + dx + 16 > width as i32 || y0 + dy + 16 > height as i32 {
                    continue;
                }
                let ref_off = ((y0 + dy) as usize) * stride + (x0 + dx) as usize;
                let cost = sad_16x16(src, off, reference, ref_off, stride) as i64 + mv_penalty;
                if best.map_or(true, |(_, c)| cost < c) {
                    best = Some((MotionVector::new(dx as i16, dy as i16), cost));
                }
            }
        }
        best
    }

    fn write_modes(&self, writer: &mut BitWriter) -> Result<()> {
        for (mode, mv) in self.modes.iter().zip(&self.mvs) {
            writer.write_bits(*mode as u32, 2)?;
            if *mode == CodingMode::InterMv {
                writer.write_signed_bits(mv.x as i32, 5)?;
                writer.write_signed_bits(mv.y as i32, 5)?;
            }
        }
        Ok(())
    }
}

impl FrameCoder for BlockCoder {
    fn pick_modes(
        &mut self,
        refs: &FrameRefs<'_>,
        params: &FrameParams<'_>,
        recode: bool,
    ) -> Result<ModeDecision> {
        self.check_geometry(refs.input)?;

        if params.frame_type == FrameType::Key {
            self.modes.fill(CodingMode::Intra);
            self.mvs.fill(MotionVector::zero());
            return Ok(ModeDecision::Continue);
        }

        let src = plane(refs.input, 0)?;
        let last = plane(refs.last, 0)?;
        let golden = plane(refs.golden, 0)?;
        let stride = refs.input.stride(0);
        let dims = refs.input.plane_dimensions(0);
        let lambda = params.lambda as i64;
        let penalty = |mode: CodingMode| (lambda * mode.signal_bits()) >> 6;
        let range = if params.quick { QUICK_SEARCH_RANGE } else { FULL_SEARCH_RANGE };

        let mut intra_mbs = 0usize;
        for mby in 0..self.mb_rows {
            for mbx in 0..self.mb_cols {
                let mbi = mby * self.mb_cols + mbx;
                let off = mby * 16 * stride + mbx * 16;

                let still_sad = sad_16x16(src, off, last, off, stride);
                let mut best_mode = CodingMode::InterNoMv;
                let mut best_mv = MotionVector::zero();
                let mut best_cost = still_sad as i64 + penalty(CodingMode::InterNoMv);

                let golden_cost =
                    sad_16x16(src, off, golden, off, stride) as i64 + penalty(CodingMode::Golden);
                if golden_cost < best_cost {
                    best_mode = CodingMode::Golden;
                    best_cost = golden_cost;
                }

                // No vector beats an exact match
                if params.motion_compensation && still_sad > 0 {
                    // A recode pass re-evaluates the vector found earlier
                    let candidate = if recode && self.mvs[mbi] != MotionVector::zero() {
                        let mv = self.mvs[mbi];
                        let ref_off = (off as isize
                            + mv.y as isize * stride as isize
                            + mv.x as isize) as usize;
                        Some((mv, sad_16x16(src, off, last, ref_off, stride) as i64 + penalty(CodingMode::InterMv)))
                    } else if recode {
                        None
                    } else {
                        self.search(src, last, stride, dims, (mbx, mby), range, penalty(CodingMode::InterMv))
                    };
                    if let Some((mv, cost)) = candidate {
                        if cost < best_cost {
                            best_mode = CodingMode::InterMv;
                            best_mv = mv;
                            best_cost = cost;
                        }
                    }
                }

                let intra_cost = intra_cost_16x16(src, off, stride) as i64 + INTRA_BIAS as i64;
                if intra_cost < best_cost {
                    best_mode = CodingMode::Intra;
                    best_mv = MotionVector::zero();
                    intra_mbs += 1;
                }

                self.modes[mbi] = best_mode;
                self.mvs[mbi] = best_mv;
            }
        }

        let nmbs = self.modes.len();
        trace!(intra_mbs, nmbs, recode, "mode analysis");
        if intra_mbs * 4 > nmbs * 3 && params.last_key_frame >= params.keyframe_mindistance as i64 {
            return Ok(ModeDecision::ForceKeyFrame);
        }
        Ok(ModeDecision::Continue)
    }

    fn encode_data(
        &mut self,
        refs: &FrameRefs<'_>,
        params: &FrameParams<'_>,
        recon: &mut FrameBuffer,
        writer: &mut BitWriter,
    ) -> Result<()> {
        self.check_geometry(refs.input)?;
        self.check_geometry(recon)?;
        let is_key = params.frame_type == FrameType::Key;
        if !is_key {
            self.write_modes(writer)?;
        }

        for pli in 0..3 {
            let src = plane(refs.input, pli)?;
            let last = plane(refs.last, pli)?;
            let golden = plane(refs.golden, pli)?;
            let stride = refs.input.stride(pli);
            let (width, height) = refs.input.plane_dimensions(pli);
            let nhfrags = width as usize / BLOCK_SIZE;
            let nvfrags = height as usize / BLOCK_SIZE;

            let dst = recon
                .plane_mut(pli)
                .ok_or_else(|| TheoraError::Encode(format!("missing plane {pli}")))?;
            let mut coded = vec![false; nhfrags * nvfrags];
            let mut copies = Vec::new();
            let mut dc_pred = 0i32;

            for fy in 0..nvfrags {
                for fx in 0..nhfrags {
                    let fragi = fy * nhfrags + fx;
                    let mbi = if pli == 0 {
                        (fy / 2) * self.mb_cols + fx / 2
                    } else {
                        fy * self.mb_cols + fx
                    };
                    let mode = if is_key { CodingMode::Intra } else { self.modes[mbi] };
                    let off = fy * BLOCK_SIZE * stride + fx * BLOCK_SIZE;
                    let reference = if mode == CodingMode::Golden { golden } else { last };
                    let (off1, off2) = if mode == CodingMode::InterMv {
                        mv_offsets(off, stride, self.mvs[mbi], pli != 0)
                    } else {
                        (off, off)
                    };

                    let mut block = [0i16; 64];
                    for y in 0..BLOCK_SIZE {
                        for x in 0..BLOCK_SIZE {
                            let pred = match mode {
                                CodingMode::Intra => 128,
                                _ => {
                                    let a = reference[off1 + y * stride + x] as i16;
                                    let b = reference[off2 + y * stride + x] as i16;
                                    (a + b) >> 1
                                }
                            };
                            block[y * BLOCK_SIZE + x] = src[off + y * stride + x] as i16 - pred;
                        }
                    }

                    let frame_type = if mode == CodingMode::Intra { FrameType::Key } else { FrameType::Delta };
                    let matrix = params.tables.matrix(frame_type, pli, params.qi);
                    let mut coeffs = [0i32; 64];
                    forward_dct(&block, &mut coeffs);
                    quantize(&mut coeffs, matrix);
                    coeffs[0] = dc_pred + (coeffs[0] - dc_pred).clamp(-MAX_COEFF, MAX_COEFF);
                    for c in coeffs[1..].iter_mut() {
                        *c = (*c).clamp(-MAX_COEFF, MAX_COEFF);
                    }

                    if mode != CodingMode::Intra {
                        let is_coded = coeffs.iter().any(|&c| c != 0);
                        writer.write_bit(is_coded)?;
                        if !is_coded {
                            if mode == CodingMode::InterNoMv {
                                copies.push(off);
                            } else {
                                recon_inter(dst, off, reference, off1, off2, stride, &[0; 64]);
                            }
                            continue;
                        }
                    }

                    encode_block_coeffs(writer, &coeffs, &mut dc_pred)?;
                    coded[fragi] = true;

                    dequantize(&mut coeffs, matrix);
                    let mut residue: Residue = [0; 64];
                    inverse_dct(&coeffs, &mut residue);
                    if mode == CodingMode::Intra {
                        frag_recon_intra(dst, off, stride, &residue);
                    } else {
                        recon_inter(dst, off, reference, off1, off2, stride, &residue);
                    }
                }
            }

            frag_copy_list(dst, last, &copies, stride);
            loop_filter_plane(
                dst,
                stride,
                nhfrags,
                nvfrags,
                &coded,
                params.tables.loop_filter_limit(params.qi),
            );
        }
        Ok(())
    }
}

fn plane(frame: &FrameBuffer, index: usize) -> Result<&[u8]> {
    frame
        .plane(index)
        .ok_or_else(|| TheoraError::Encode(format!("missing plane {index}")))
}

fn recon_inter(
    dst: &mut [u8],
    off: usize,
    reference: &[u8],
    off1: usize,
    off2: usize,
    stride: usize,
    residue: &Residue,
) {
    if off1 == off2 {
        frag_recon_inter(dst, off, reference, off1, stride, residue);
    } else {
        frag_recon_inter2(dst, off, reference, off1, off2, stride, residue);
    }
}

/// Predictor offsets for a fragment; chroma vectors are halved and odd
/// components average the two neighbouring positions.
fn mv_offsets(off: usize, stride: usize, mv: MotionVector, chroma: bool) -> (usize, usize) {
    let (mx, my) = (mv.x as isize, mv.y as isize);
    let stride = stride as isize;
    let base = off as isize;
    if !chroma {
        let o = (base + my * stride + mx) as usize;
        return (o, o);
    }
    let (fx, fy) = (mx >> 1, my >> 1);
    let (cx, cy) = (fx + (mx & 1), fy + (my & 1));
    (
        (base + fy * stride + fx) as usize,
        (base + cy * stride + cx) as usize,
    )
}

fn sad_16x16(a: &[u8], a_off: usize, b: &[u8], b_off: usize, stride: usize) -> u32 {
    let mut sad = 0u32;
    for y in 0..16 {
        let ra = &a[a_off + y * stride..a_off + y * stride + 16];
        let rb = &b[b_off + y * stride..b_off + y * stride + 16];
        sad += ra
            .iter()
            .zip(rb)
            .map(|(&p, &q)| (p as i32 - q as i32).unsigned_abs())
            .sum::<u32>();
    }
    sad
}

/// Sum of absolute deviations from the block mean.
fn intra_cost_16x16(a: &[u8], off: usize, stride: usize) -> u32 {
    let mut sum = 0u32;
    for y in 0..16 {
        sum += a[off + y * stride..off + y * stride + 16].iter().map(|&p| p as u32).sum::<u32>();
    }
    let mean = ((sum + 128) >> 8) as i32;
    let mut cost = 0u32;
    for y in 0..16 {
        cost += a[off + y * stride..off + y * stride + 16]
            .iter()
            .map(|&p| (p as i32 - mean).unsigned_abs())
            .sum::<u32>();
    }
    cost
}

/// Encode block coefficients: DC as a difference from the previous coded
/// block, AC as zero runs and literals in zigzag order, then end-of-block.
fn encode_block_coeffs(writer: &mut BitWriter, coeffs: &[i32; 64], dc_pred: &mut i32) -> Result<()> {
    let dc_diff = coeffs[0] - *dc_pred;
    *dc_pred = coeffs[0];
    writer.write_bit(dc_diff < 0)?;
    writer.write_bits(dc_diff.unsigned_abs(), 8)?;

    let last_nonzero = (1..64).rev().find(|&i| coeffs[ZIGZAG[i]] != 0).unwrap_or(0);

    let mut i = 1;
    while i <= last_nonzero {
        let coeff = coeffs[ZIGZAG[i]];
        if coeff == 0 {
            let mut run = 0;
            while i + run <= last_nonzero && coeffs[ZIGZAG[i + run]] == 0 {
                run += 1;
            }
            let run = run.min(14);
            writer.write_bits(run as u32, 4)?;
            i += run;
        } else {
            writer.write_bits(0, 4)?;
            writer.write_bit(coeff < 0)?;
            writer.write_bits(coeff.unsigned_abs(), 8)?;
            i += 1;
        }
    }

    // End of block
    writer.write_bits(15, 4)?;
    Ok(())
}
