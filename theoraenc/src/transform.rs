//! 8x8 DCT, zigzag order and coefficient quantization.

use crate::BLOCK_SIZE;
use std::sync::OnceLock;

/// Zigzag scan order for 8x8 blocks.
pub const ZIGZAG: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27, 20,
    13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58, 59,
    52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// Orthonormal DCT-II basis, `basis[u][x]`.
fn basis() -> &'static [[f32; BLOCK_SIZE]; BLOCK_SIZE] {
    static BASIS: OnceLock<[[f32; BLOCK_SIZE]; BLOCK_SIZE]> = OnceLock::new();
    BASIS.get_or_init(|| {
        let n = BLOCK_SIZE as f32;
        let mut table = [[0.0f32; BLOCK_SIZE]; BLOCK_SIZE];
        for (u, row) in table.iter_mut().enumerate() {
            let cu = if u == 0 { 1.0 / 2.0_f32.sqrt() } else { 1.0 };
            for (x, value) in row.iter_mut().enumerate() {
                *value = cu
                    * (std::f32::consts::PI * (2.0 * x as f32 + 1.0) * u as f32 / (2.0 * n)).cos()
                    * (2.0 / n).sqrt();
            }
        }
        table
    })
}

/// Forward 8x8 DCT.
pub fn forward_dct(input: &[i16; 64], output: &mut [i32; 64]) {
    let basis = basis();
    let mut temp = [0.0f32; 64];

    // Row DCT
    for y in 0..8 {
        for u in 0..8 {
            let mut sum = 0.0f32;
            for x in 0..8 {
                sum += input[y * 8 + x] as f32 * basis[u][x];
            }
            temp[y * 8 + u] = sum;
        }
    }

    // Column DCT
    for x in 0..8 {
        for v in 0..8 {
            let mut sum = 0.0f32;
            for y in 0..8 {
                sum += temp[y * 8 + x] * basis[v][y];
            }
            output[v * 8 + x] = sum.round() as i32;
        }
    }
}

/// Inverse 8x8 DCT.
pub fn inverse_dct(input: &[i32; 64], output: &mut [i16; 64]) {
    let basis = basis();
    let mut temp = [0.0f32; 64];

    // Row IDCT
    for y in 0..8 {
        for x in 0..8 {
            let mut sum = 0.0f32;
            for u in 0..8 {
                sum += input[y * 8 + u] as f32 * basis[u][x];
            }
            temp[y * 8 + x] = sum;
        }
    }

    // Column IDCT
    for x in 0..8 {
        for y in 0..8 {
            let mut sum = 0.0f32;
            for v in 0..8 {
                sum += temp[v * 8 + x] * basis[v][y];
            }
            output[y * 8 + x] = sum.round().clamp(-32768.0, 32767.0) as i16;
        }
    }
}

/// Step size for a dequantization value.
///
/// Dequantization values carry a factor of 4 relative to the orthonormal
/// transform used here.
#[inline]
pub fn quant_step(q: u16) -> i32 {
    ((q >> 2) as i32).max(1)
}

/// Quantize coefficients in place, rounding to nearest.
pub fn quantize(coeffs: &mut [i32; 64], matrix: &[u16; 64]) {
    for (coeff, &q) in coeffs.iter_mut().zip(matrix.iter()) {
        let step = quant_step(q);
        let magnitude = (coeff.abs() + step / 2) / step;
        *coeff = if *coeff < 0 { -magnitude } else { magnitude };
    }
}

/// Scale quantized coefficients back up.
pub fn dequantize(coeffs: &mut [i32; 64], matrix: &[u16; 64]) {
    for (coeff, &q) in coeffs.iter_mut().zip(matrix.iter()) {
        *coeff *= quant_step(q);
    }
}
