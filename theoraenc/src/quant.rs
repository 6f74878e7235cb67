//! Quantization parameters.
//!
//! [`QuantInfo`] is the set of scale tables, base matrices and quality-index
//! ranges sent in the setup header. [`QuantTables`] expands it into the
//! per-qi dequantization matrices and the average quantizer table that the
//! rate model works with.

use crate::error::{Result, TheoraError};
use crate::fixed::ilog;
use crate::FrameType;
use theoraenc_core::BitWriter;

/// Number of quality indices.
pub const NQIS: usize = 64;

/// Piecewise-linear interpolation ranges between base matrices for one
/// frame type and plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantRanges {
    /// Width of each range in qi steps; sums to 63.
    pub sizes: Vec<u8>,
    /// Base matrix at each range endpoint (`sizes.len() + 1` entries).
    pub base_matrices: Vec<usize>,
}

impl QuantRanges {
    /// A single range interpolating from matrix `from` at qi 0 to `to` at qi 63.
    pub fn single(from: usize, to: usize) -> Self {
        Self {
            sizes: vec![63],
            base_matrices: vec![from, to],
        }
    }
}

/// Quantization parameters carried in the setup header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantInfo {
    /// DC scale per qi.
    pub dc_scale: [u16; NQIS],
    /// AC scale per qi.
    pub ac_scale: [u16; NQIS],
    /// Loop filter limit per qi.
    pub loop_filter_limits: [u8; NQIS],
    /// Base matrices in natural (row-major) order.
    pub base_matrices: Vec<[u8; 64]>,
    /// Ranges indexed by `[frame_type][plane]`.
    pub qi_ranges: [[QuantRanges; 3]; 2],
}

/// VP3.1 DC scale factors.
pub const VP31_DC_SCALE: [u16; NQIS] = [
    220, 200, 190, 180, 170, 170, 160, 160, 150, 150, 140, 140, 130, 130, 120, 120, 110, 110, 100,
    100, 90, 90, 90, 80, 80, 80, 70, 70, 70, 60, 60, 60, 60, 50, 50, 50, 50, 40, 40, 40, 40, 40,
    30, 30, 30, 30, 30, 30, 30, 20, 20, 20, 20, 20, 20, 20, 20, 10, 10, 10, 10, 10, 10, 10,
];

/// VP3.1 AC scale factors.
pub const VP31_AC_SCALE: [u16; NQIS] = [
    500, 450, 400, 370, 340, 310, 285, 265, 245, 225, 210, 195, 185, 180, 170, 160, 150, 145, 135,
    130, 125, 115, 110, 107, 100, 96, 93, 89, 85, 82, 75, 74, 70, 68, 64, 60, 57, 56, 52, 50, 49,
    45, 44, 43, 40, 38, 37, 35, 33, 32, 30, 29, 28, 25, 24, 22, 21, 19, 18, 17, 15, 13, 12, 10,
];

/// VP3.1 loop filter limits.
pub const VP31_LOOP_FILTER_LIMITS: [u8; NQIS] = [
    30, 25, 20, 20, 15, 15, 14, 14, 13, 13, 12, 12, 11, 11, 10, 10, 9, 9, 8, 8, 7, 7, 7, 7, 6, 6,
    6, 6, 5, 5, 5, 5, 4, 4, 4, 4, 3, 3, 3, 3, 2, 2, 2, 2, 2, 2, 2, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0,
];

/// Base matrix for intra luma blocks.
pub const BASE_MATRIX_INTRA_Y: [u8; 64] = [
    16, 11, 10, 16, 24, 40, 51, 61, 12, 12, 14, 19, 26, 58, 60, 55, 14, 13, 16, 24, 40, 57, 69, 56,
    14, 17, 22, 29, 51, 87, 80, 62, 18, 22, 37, 58, 68, 109, 103, 77, 24, 35, 55, 64, 81, 104, 113,
    92, 49, 64, 78, 87, 103, 121, 120, 101, 72, 92, 95, 98, 112, 100, 103, 99,
];

/// Base matrix for intra chroma blocks.
pub const BASE_MATRIX_INTRA_C: [u8; 64] = [
    17, 18, 24, 47, 99, 99, 99, 99, 18, 21, 26, 66, 99, 99, 99, 99, 24, 26, 56, 99, 99, 99, 99, 99,
    47, 66, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99,
];

/// Base matrix for inter blocks.
pub const BASE_MATRIX_INTER: [u8; 64] = [
    16, 16, 16, 20, 24, 28, 32, 40, 16, 16, 20, 24, 28, 32, 40, 48, 16, 20, 24, 28, 32, 40, 48, 64,
    20, 24, 28, 32, 40, 48, 64, 64, 24, 28, 32, 40, 48, 64, 64, 64, 28, 32, 40, 48, 64, 64, 64, 96,
    32, 40, 48, 64, 64, 64, 96, 128, 40, 48, 64, 64, 64, 96, 128, 128,
];

impl QuantInfo {
    /// The VP3.1-compatible parameter set.
    pub fn vp31() -> Self {
        Self {
            dc_scale: VP31_DC_SCALE,
            ac_scale: VP31_AC_SCALE,
            loop_filter_limits: VP31_LOOP_FILTER_LIMITS,
            base_matrices: vec![BASE_MATRIX_INTRA_Y, BASE_MATRIX_INTRA_C, BASE_MATRIX_INTER],
            qi_ranges: [
                [
                    QuantRanges::single(0, 0),
                    QuantRanges::single(1, 1),
                    QuantRanges::single(1, 1),
                ],
                [
                    QuantRanges::single(2, 2),
                    QuantRanges::single(2, 2),
                    QuantRanges::single(2, 2),
                ],
            ],
        }
    }

    /// Check the parameter set can be packed and expanded.
    pub fn validate(&self) -> Result<()> {
        let nbms = self.base_matrices.len();
        if nbms == 0 || nbms > 384 {
            return Err(TheoraError::InvalidArgument(format!(
                "{nbms} base matrices (expected 1..=384)"
            )));
        }
        // Limits are packed with a 3-bit width, so 7 bits at most
        if let Some(qi) = self.loop_filter_limits.iter().position(|&l| l >= 1 << 7) {
            return Err(TheoraError::InvalidArgument(format!(
                "loop filter limit {} at qi {qi} exceeds 7 bits",
                self.loop_filter_limits[qi]
            )));
        }
        if self.ac_scale.iter().any(|&s| s >= 1 << 15) || self.dc_scale.iter().any(|&s| s >= 1 << 15)
        {
            return Err(TheoraError::InvalidArgument("scale exceeds 15 bits".into()));
        }
        for (qti, planes) in self.qi_ranges.iter().enumerate() {
            for (pli, ranges) in planes.iter().enumerate() {
                if ranges.base_matrices.len() != ranges.sizes.len() + 1 {
                    return Err(TheoraError::InvalidArgument(format!(
                        "ranges [{qti}][{pli}]: {} sizes need {} base matrices",
                        ranges.sizes.len(),
                        ranges.sizes.len() + 1
                    )));
                }
                if ranges.sizes.iter().any(|&s| s == 0) {
                    return Err(TheoraError::InvalidArgument(format!(
                        "ranges [{qti}][{pli}]: empty range"
                    )));
                }
                let total: u32 = ranges.sizes.iter().map(|&s| s as u32).sum();
                if total != 63 {
                    return Err(TheoraError::InvalidArgument(format!(
                        "ranges [{qti}][{pli}] cover {total} qi steps, not 63"
                    )));
                }
                if let Some(&bmi) = ranges.base_matrices.iter().find(|&&bmi| bmi >= nbms) {
                    return Err(TheoraError::InvalidArgument(format!(
                        "ranges [{qti}][{pli}] reference base matrix {bmi} of {nbms}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Write the parameter set in setup-header order.
    pub fn pack(&self, writer: &mut BitWriter) -> Result<()> {
        let max_lflim = self.loop_filter_limits.iter().copied().max().unwrap_or(0);
        let nbits = ilog(max_lflim as u32) as u8;
        writer.write_bits(nbits as u32, 3)?;
        for &limit in &self.loop_filter_limits {
            writer.write_bits(limit as u32, nbits)?;
        }

        for scale in [&self.ac_scale, &self.dc_scale] {
            let max = scale.iter().copied().max().unwrap_or(0);
            let nbits = ilog(max as u32).max(1) as u8;
            writer.write_bits(nbits as u32 - 1, 4)?;
            for &value in scale.iter() {
                writer.write_bits(value as u32, nbits)?;
            }
        }

        let nbms = self.base_matrices.len();
        writer.write_bits(nbms as u32 - 1, 9)?;
        for matrix in &self.base_matrices {
            for &value in matrix {
                writer.write_bits(value as u32, 8)?;
            }
        }

        let bmi_bits = ilog(nbms as u32 - 1) as u8;
        for qti in 0..2 {
            for pli in 0..3 {
                let ranges = &self.qi_ranges[qti][pli];
                if qti > 0 || pli > 0 {
                    if qti > 0 && *ranges == self.qi_ranges[qti - 1][pli] {
                        // Copy of the other frame type's ranges
                        writer.write_bit(false)?;
                        writer.write_bit(true)?;
                        continue;
                    }
                    let (prev_qti, prev_pli) = if pli == 0 { (qti - 1, 2) } else { (qti, pli - 1) };
                    if *ranges == self.qi_ranges[prev_qti][prev_pli] {
                        // Copy of the previous plane in coding order
                        writer.write_bit(false)?;
                        if qti > 0 {
                            writer.write_bit(false)?;
                        }
                        continue;
                    }
                    writer.write_bit(true)?;
                }

                let mut qi = 0u32;
                writer.write_bits(ranges.base_matrices[0] as u32, bmi_bits)?;
                for (size, &bmi) in ranges.sizes.iter().zip(&ranges.base_matrices[1..]) {
                    writer.write_bits(*size as u32 - 1, ilog(62 - qi) as u8)?;
                    qi += *size as u32;
                    writer.write_bits(bmi as u32, bmi_bits)?;
                }
            }
        }
        Ok(())
    }
}

impl Default for QuantInfo {
    fn default() -> Self {
        Self::vp31()
    }
}

/// Expanded dequantization matrices and per-qi quantizer averages.
#[derive(Debug, Clone)]
pub struct QuantTables {
    dequant: Vec<[u16; 64]>,
    qavg: [[u32; NQIS]; 2],
    loop_filter_limits: [u8; NQIS],
}

impl QuantTables {
    /// Expand a validated parameter set.
    pub fn new(info: &QuantInfo) -> Result<Self> {
        info.validate()?;

        let mut dequant = vec![[0u16; 64]; 2 * 3 * NQIS];
        for qti in 0..2 {
            for pli in 0..3 {
                let ranges = &info.qi_ranges[qti][pli];
                let mut qi_start = 0usize;
                for (qri, &size) in ranges.sizes.iter().enumerate() {
                    let size = size as usize;
                    let from = &info.base_matrices[ranges.base_matrices[qri]];
                    let to = &info.base_matrices[ranges.base_matrices[qri + 1]];
                    let qi_end = qi_start + size;
                    let last = if qri + 1 == ranges.sizes.len() { qi_end } else { qi_end - 1 };
                    for qi in qi_start..=last {
                        let matrix = &mut dequant[(qti * 3 + pli) * NQIS + qi];
                        for ci in 0..64 {
                            let bm = (2 * (qi_end - qi) * from[ci] as usize
                                + 2 * (qi - qi_start) * to[ci] as usize
                                + size)
                                / (2 * size);
                            let (scale, qmin) = if ci == 0 {
                                (info.dc_scale[qi] as usize, if qti == 0 { 16 } else { 32 })
                            } else {
                                (info.ac_scale[qi] as usize, if qti == 0 { 8 } else { 16 })
                            };
                            matrix[ci] = ((scale * bm / 100) * 4).clamp(qmin, 4096) as u16;
                        }
                    }
                    qi_start = qi_end;
                }
            }
        }

        let mut qavg = [[0u32; NQIS]; 2];
        for qti in 0..2 {
            for qi in 0..NQIS {
                let sum: u32 = dequant[qti * 3 * NQIS + qi].iter().map(|&q| q as u32).sum();
                qavg[qti][qi] = (sum + 32) >> 6;
            }
        }

        Ok(Self {
            dequant,
            qavg,
            loop_filter_limits: info.loop_filter_limits,
        })
    }

    /// Dequantization matrix for a frame type, plane and quality index.
    pub fn matrix(&self, frame_type: FrameType, plane: usize, qi: usize) -> &[u16; 64] {
        &self.dequant[(frame_type.index() * 3 + plane.min(2)) * NQIS + qi.min(NQIS - 1)]
    }

    /// Average luma quantizer for a frame type and quality index.
    pub fn qavg(&self, frame_type: FrameType, qi: usize) -> u32 {
        self.qavg[frame_type.index()][qi.min(NQIS - 1)]
    }

    /// Loop filter limit for a quality index.
    pub fn loop_filter_limit(&self, qi: usize) -> u8 {
        self.loop_filter_limits[qi.min(NQIS - 1)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use theoraenc_core::BitReader;

    #[test]
    fn test_vp31_is_valid() {
        assert!(QuantInfo::vp31().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let mut info = QuantInfo::vp31();
        info.qi_ranges[0][0].sizes = vec![60];
        assert!(info.validate().is_err());

        let mut info = QuantInfo::vp31();
        info.qi_ranges[1][2].base_matrices = vec![2, 7];
        assert!(info.validate().is_err());

        let mut info = QuantInfo::vp31();
        info.base_matrices.clear();
        assert!(QuantTables::new(&info).is_err());
    }

    #[test]
    fn test_validate_rejects_wide_loop_filter_limits() {
        let mut info = QuantInfo::vp31();
        info.loop_filter_limits[0] = 127;
        assert!(info.validate().is_ok());
        let mut writer = BitWriter::new();
        info.pack(&mut writer).unwrap();
        let data = writer.data().to_vec();
        assert_eq!(BitReader::new(&data).read_bits(3).unwrap(), 7);

        info.loop_filter_limits[0] = 200;
        assert!(matches!(info.validate(), Err(TheoraError::InvalidArgument(_))));
        assert!(QuantTables::new(&info).is_err());
    }

    #[test]
    fn test_dequant_values() {
        let tables = QuantTables::new(&QuantInfo::vp31()).unwrap();
        // qi 0, intra luma DC: 220 * 16 / 100 * 4
        assert_eq!(tables.matrix(FrameType::Key, 0, 0)[0], 140);
        // qi 63, inter DC is held at the minimum
        assert_eq!(tables.matrix(FrameType::Delta, 0, 63)[0], 32);
        // AC clamps to the maximum
        assert!(tables.matrix(FrameType::Key, 1, 0).iter().all(|&q| q <= 4096));
    }

    #[test]
    fn test_qavg_decreases_with_qi() {
        let tables = QuantTables::new(&QuantInfo::vp31()).unwrap();
        for frame_type in [FrameType::Key, FrameType::Delta] {
            for qi in 1..NQIS {
                assert!(tables.qavg(frame_type, qi) <= tables.qavg(frame_type, qi - 1));
            }
            assert!(tables.qavg(frame_type, 0) > tables.qavg(frame_type, 63));
        }
    }

    #[test]
    fn test_pack_layout() {
        let info = QuantInfo::vp31();
        let mut writer = BitWriter::new();
        info.pack(&mut writer).unwrap();
        writer.align_to_byte().unwrap();

        let mut reader = BitReader::new(writer.data());
        let lf_bits = reader.read_bits(3).unwrap() as u8;
        assert_eq!(lf_bits, 5);
        for &limit in &VP31_LOOP_FILTER_LIMITS {
            assert_eq!(reader.read_bits(lf_bits).unwrap(), limit as u32);
        }
        let ac_bits = reader.read_bits(4).unwrap() as u8 + 1;
        assert_eq!(ac_bits, 9);
        reader.skip(64 * ac_bits as usize).unwrap();
        let dc_bits = reader.read_bits(4).unwrap() as u8 + 1;
        assert_eq!(dc_bits, 8);
        reader.skip(64 * dc_bits as usize).unwrap();
        assert_eq!(reader.read_bits(9).unwrap(), 2);
        assert_eq!(reader.read_bits(8).unwrap(), 16);
        reader.skip(3 * 64 * 8 - 8).unwrap();

        // [0][0]: bmi 0, size 63, bmi 0
        assert_eq!(reader.read_bits(2).unwrap(), 0);
        assert_eq!(reader.read_bits(6).unwrap(), 62);
        assert_eq!(reader.read_bits(2).unwrap(), 0);
        // [0][1]: new ranges
        assert!(reader.read_bit().unwrap());
        assert_eq!(reader.read_bits(2).unwrap(), 1);
        assert_eq!(reader.read_bits(6).unwrap(), 62);
        assert_eq!(reader.read_bits(2).unwrap(), 1);
        // [0][2]: copy of previous plane
        assert!(!reader.read_bit().unwrap());
        // [1][0]: new, [1][1] and [1][2]: copies of the previous plane
        assert!(reader.read_bit().unwrap());
        reader.skip(10).unwrap();
        assert_eq!(reader.read_bits(2).unwrap(), 0b00);
        assert_eq!(reader.read_bits(2).unwrap(), 0b00);
    }
}
