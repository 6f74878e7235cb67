//! Granule position arithmetic.
//!
//! A granule position packs the frame number of the last keyframe in the
//! high bits and the number of frames since it in the low `shift` bits.

use theoraenc_core::Rational;

/// Granule position for the frame just coded.
///
/// `current_frame` is the frame counter after the frame was counted, and
/// `last_key_frame` counts the keyframe itself as 1.
pub fn compute(current_frame: i64, last_key_frame: i64, shift: u32) -> i64 {
    ((current_frame - last_key_frame) << shift) + last_key_frame - 1
}

/// Split a granule position into keyframe index and offset.
pub fn split(granule_pos: i64, shift: u32) -> (i64, i64) {
    let iframe = granule_pos >> shift;
    (iframe, granule_pos - (iframe << shift))
}

/// Absolute frame number of a granule position, or -1 if it is negative.
pub fn granule_frame(granule_pos: i64, shift: u32) -> i64 {
    if granule_pos < 0 {
        return -1;
    }
    let (iframe, pframe) = split(granule_pos, shift);
    iframe + pframe
}

/// Presentation time in seconds, or -1 if the position is negative.
pub fn granule_time(granule_pos: i64, shift: u32, fps: Rational) -> f64 {
    if granule_pos < 0 {
        return -1.0;
    }
    let fps = fps.at_least_one();
    granule_frame(granule_pos, shift) as f64 * fps.den as f64 / fps.num as f64
}
