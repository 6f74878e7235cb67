//! Fixed-point logarithm and exponential helpers.
//!
//! These give bit-identical results on every platform and are used for the
//! mode-decision lambda and for integer bit-width calculations.

/// Number of bits needed to represent `v` (0 for 0).
pub fn ilog(v: u32) -> u32 {
    u32::BITS - v.leading_zeros()
}

/// Base-2 logarithm of `val` with `frac_bits` fractional bits.
///
/// Computed by repeated squaring of a 16-bit normalized mantissa.
pub fn log2frac(val: u32, frac_bits: u32) -> i32 {
    let mut l = ilog(val) as i32;
    let mut val = val as u64;
    if l > 16 {
        val >>= l - 16;
    } else {
        val <<= 16 - l;
    }
    l -= 1;
    for _ in 0..frac_bits {
        val = (val * val) >> 15;
        let b = (val >> 16) as i32;
        l = (l << 1) | b;
        val >>= b;
    }
    l
}

/// 2 raised to a Q12 exponent, saturating to the `u16` range.
pub fn exp2(log: i32) -> u16 {
    let ipart = log >> 12;
    if ipart > 15 {
        return 0xFFFF;
    }
    if ipart < 0 {
        return 0;
    }
    let mut fpart = ((log - (ipart << 12)) as u32) << 3;
    // 3rd order polynomial in Q15: (((3ln2-2)f + 3-4ln2)f + ln2)f + 1
    fpart = ((fpart * (((fpart * (((fpart * 2603) >> 15) + 7452)) >> 15) + 22713)) >> 15) + 32768;
    if ipart < 15 {
        fpart += 1 << (14 - ipart);
    }
    (fpart >> (15 - ipart)) as u16
}

/// Lagrangian multiplier for a quantizer average: `1.125 * (qavg / 8)^1.5`.
pub fn lambda(qavg: u32) -> i32 {
    let l = log2frac(qavg, 12) - (3 << 12);
    let l = exp2(l + (l >> 1)) as i32;
    l + (l >> 3)
}
