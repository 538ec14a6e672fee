//! Numeric constants inside symbolic expressions.
//!
//! Constants are exact rationals whenever possible so that canonical forms
//! compare structurally (`2*x` built two different ways is the same tree),
//! with a floating-point fallback for overflow and non-integral input.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Greatest common divisor of the magnitudes. Callers pass at least one
/// positive argument, so the result fits back into `i64`.
fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a as i64
}

/// A numeric constant: exact rational or float.
///
/// Invariant for `Rational(n, d)`: `d > 0` and `gcd(n, d) == 1`.
/// Integral floats are always stored as rationals, so a given value has a
/// single representation and `Eq`, `Ord` and `Hash` agree with each other.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Rational(i64, i64),
    Float(f64),
}

impl Number {
    pub fn int(n: i64) -> Self {
        Number::Rational(n, 1)
    }

    pub fn zero() -> Self {
        Number::int(0)
    }

    pub fn one() -> Self {
        Number::int(1)
    }

    /// Reduced rational; a zero denominator yields a signed infinity.
    pub fn rational(num: i64, den: i64) -> Self {
        if den == 0 {
            return Number::Float(if num >= 0 {
                f64::INFINITY
            } else {
                f64::NEG_INFINITY
            });
        }
        let (num, den) = if den < 0 {
            match (num.checked_neg(), den.checked_neg()) {
                (Some(n), Some(d)) => (n, d),
                _ => return Number::from_f64(num as f64 / den as f64),
            }
        } else {
            (num, den)
        };
        let g = gcd(num, den).max(1);
        Number::Rational(num / g, den / g)
    }

    /// Integral values become exact rationals, everything else stays float.
    pub fn from_f64(f: f64) -> Self {
        if f.is_finite() && f.fract() == 0.0 && f.abs() < (1i64 << 53) as f64 {
            Number::int(f as i64)
        } else if f == 0.0 {
            Number::zero()
        } else {
            Number::Float(f)
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Number::Rational(n, d) => *n as f64 / *d as f64,
            Number::Float(f) => *f,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Number::Rational(n, _) => *n == 0,
            Number::Float(f) => *f == 0.0,
        }
    }

    pub fn is_one(&self) -> bool {
        matches!(self, Number::Rational(1, 1))
    }

    pub fn is_negative(&self) -> bool {
        match self {
            Number::Rational(n, _) => *n < 0,
            Number::Float(f) => *f < 0.0,
        }
    }

    /// The value as an `i64` when it is an exact integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Number::Rational(n, 1) => Some(*n),
            _ => None,
        }
    }

    pub fn abs(&self) -> Self {
        match self {
            Number::Rational(n, d) => match n.checked_abs() {
                Some(n) => Number::Rational(n, *d),
                None => Number::Float((*n as f64).abs() / *d as f64),
            },
            Number::Float(f) => Number::Float(f.abs()),
        }
    }

    fn pow_int(&self, exp: i64) -> Self {
        if exp == 0 {
            return Number::one();
        }
        if exp < 0 {
            return match exp.checked_neg() {
                Some(e) => Number::one() / self.pow_int(e),
                None => Number::from_f64(self.to_f64().powf(exp as f64)),
            };
        }
        match self {
            Number::Rational(n, d) => {
                let e = match u32::try_from(exp) {
                    Ok(e) => e,
                    Err(_) => return Number::Float(self.to_f64().powf(exp as f64)),
                };
                match (n.checked_pow(e), d.checked_pow(e)) {
                    (Some(nn), Some(dd)) => Number::rational(nn, dd),
                    _ => Number::Float(self.to_f64().powf(exp as f64)),
                }
            }
            Number::Float(f) => Number::from_f64(f.powf(exp as f64)),
        }
    }

    /// `self ** exp`; exact for integer exponents, float otherwise.
    pub fn pow(&self, exp: &Number) -> Self {
        match exp.as_integer() {
            Some(e) => self.pow_int(e),
            None => Number::from_f64(self.to_f64().powf(exp.to_f64())),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Number::Rational(..) => 0,
            Number::Float(_) => 1,
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Rational(n1, d1), Number::Rational(n2, d2)) => n1 == n2 && d1 == d2,
            (Number::Float(a), Number::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for Number {}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_f64()
            .total_cmp(&other.to_f64())
            .then_with(|| self.kind_rank().cmp(&other.kind_rank()))
            .then_with(|| match (self, other) {
                (Number::Rational(n1, d1), Number::Rational(n2, d2)) => (n1, d1).cmp(&(n2, d2)),
                (Number::Float(a), Number::Float(b)) => a.to_bits().cmp(&b.to_bits()),
                _ => Ordering::Equal,
            })
    }
}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Number::Rational(n, d) => {
                state.write_u8(0);
                n.hash(state);
                d.hash(state);
            }
            Number::Float(f) => {
                state.write_u8(1);
                f.to_bits().hash(state);
            }
        }
    }
}

impl From<i64> for Number {
    fn from(n: i64) -> Self {
        Number::int(n)
    }
}

impl From<f64> for Number {
    fn from(f: f64) -> Self {
        Number::from_f64(f)
    }
}

impl Neg for Number {
    type Output = Number;

    fn neg(self) -> Self::Output {
        match self {
            Number::Rational(n, d) => match n.checked_neg() {
                Some(n) => Number::Rational(n, d),
                None => Number::Float(-(n as f64) / d as f64),
            },
            Number::Float(f) => Number::from_f64(-f),
        }
    }
}

impl Add for Number {
    type Output = Number;

    fn add(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Number::Rational(n1, d1), Number::Rational(n2, d2)) => {
                let num = n1
                    .checked_mul(d2)
                    .zip(n2.checked_mul(d1))
                    .and_then(|(a, b)| a.checked_add(b));
                match (num, d1.checked_mul(d2)) {
                    (Some(num), Some(den)) => Number::rational(num, den),
                    _ => Number::from_f64(self.to_f64() + rhs.to_f64()),
                }
            }
            (a, b) => Number::from_f64(a.to_f64() + b.to_f64()),
        }
    }
}

impl Sub for Number {
    type Output = Number;

    fn sub(self, rhs: Self) -> Self::Output {
        self + (-rhs)
    }
}

impl Mul for Number {
    type Output = Number;

    fn mul(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Number::Rational(n1, d1), Number::Rational(n2, d2)) => {
                // Cross-reduce first to keep the products small.
                let g1 = gcd(n1, d2).max(1);
                let g2 = gcd(n2, d1).max(1);
                let (n1, d2) = (n1 / g1, d2 / g1);
                let (n2, d1) = (n2 / g2, d1 / g2);
                match (n1.checked_mul(n2), d1.checked_mul(d2)) {
                    (Some(num), Some(den)) => Number::rational(num, den),
                    _ => Number::from_f64(self.to_f64() * rhs.to_f64()),
                }
            }
            (a, b) => Number::from_f64(a.to_f64() * b.to_f64()),
        }
    }
}

impl Div for Number {
    type Output = Number;

    fn div(self, rhs: Self) -> Self::Output {
        match rhs {
            Number::Rational(n, d) if n != 0 => self * Number::rational(d, n),
            _ => Number::from_f64(self.to_f64() / rhs.to_f64()),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Rational(n, 1) => write!(f, "{}", n),
            Number::Rational(n, d) => write!(f, "{}/{}", n, d),
            Number::Float(v) => write!(f, "{}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_arithmetic() {
        let a = Number::rational(1, 2);
        let b = Number::rational(1, 3);

        assert_eq!(a + b, Number::rational(5, 6));
        assert_eq!(a * b, Number::rational(1, 6));
        assert_eq!(a / b, Number::rational(3, 2));
        assert_eq!(a - a, Number::zero());
    }

    #[test]
    fn test_integral_floats_are_exact() {
        assert_eq!(Number::from_f64(3.0), Number::int(3));
        assert_eq!(Number::from_f64(-0.0), Number::zero());
        assert!(matches!(Number::from_f64(0.25), Number::Float(_)));
    }

    #[test]
    fn test_power() {
        let a = Number::rational(2, 3);
        assert_eq!(a.pow(&Number::int(2)), Number::rational(4, 9));
        assert_eq!(a.pow(&Number::int(-1)), Number::rational(3, 2));
        assert_eq!(Number::int(4).pow(&Number::rational(1, 2)), Number::int(2));
    }

    #[test]
    fn test_ordering_is_numeric() {
        let mut v = vec![Number::int(3), Number::rational(1, 2), Number::int(-1)];
        v.sort();
        assert_eq!(v, vec![Number::int(-1), Number::rational(1, 2), Number::int(3)]);
    }

    #[test]
    fn test_extreme_integers_fall_back_to_float() {
        let min = Number::int(i64::MIN);
        assert_eq!(min * Number::int(-1), Number::Float(-(i64::MIN as f64)));
        assert_eq!(-min, Number::Float(-(i64::MIN as f64)));
        assert!(matches!(min.abs(), Number::Float(_)));
        assert_eq!(
            Number::rational(1, i64::MIN),
            Number::from_f64(1.0 / i64::MIN as f64)
        );
        assert_eq!(Number::rational(i64::MIN, 2), Number::int(i64::MIN / 2));
    }
}
