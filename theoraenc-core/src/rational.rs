//! Rational number type for frame rates and aspect ratios.

use std::cmp::Ordering;
use std::fmt;

/// A rational number represented as a numerator and denominator.
///
/// Theora stores frame rates and pixel aspect ratios as unsigned rationals,
/// so both parts are `u32` here.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    /// Numerator
    pub num: u32,
    /// Denominator
    pub den: u32,
}

impl Rational {
    /// Create a new rational number.
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Return a copy with both parts raised to at least one.
    pub fn at_least_one(&self) -> Self {
        Self {
            num: self.num.max(1),
            den: self.den.max(1),
        }
    }

    /// Convert to f64.
    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rational({}/{})", self.num, self.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.num as u64 * other.den as u64;
        let rhs = other.num as u64 * self.den as u64;
        lhs.cmp(&rhs)
    }
}

impl From<(u32, u32)> for Rational {
    fn from((num, den): (u32, u32)) -> Self {
        Self::new(num, den)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_at_least_one() {
        assert_eq!(Rational::new(0, 0).at_least_one(), Rational::new(1, 1));
        assert_eq!(Rational::new(0, 5).at_least_one(), Rational::new(1, 5));
    }

    #[test]
    fn test_rational_to_f64() {
        let r = Rational::new(1, 4);
        assert!((r.to_f64() - 0.25).abs() < 1e-10);
    }

    #[test]
    fn test_rational_ord() {
        assert!(Rational::new(30000, 1001) < Rational::new(30, 1));
        assert_eq!(Rational::new(25, 1).to_string(), "25");
        assert_eq!(Rational::new(30000, 1001).to_string(), "30000/1001");
    }
}
