//! Scalar-or-vector operands for arithmetic modules.
//!
//! Every binary operator shares one broadcasting table:
//!
//! | left   | right  | result                                   |
//! |--------|--------|------------------------------------------|
//! | scalar | scalar | scalar                                   |
//! | scalar | vector | vector, scalar applied to every element  |
//! | vector | scalar | vector, scalar applied to every element  |
//! | vector | vector | vector of `min(len(a), len(b))` elements |
//!
//! The vector/vector case silently drops the tail of the longer operand.

/// A single value or a run of values.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSource {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl ValueSource {
    pub fn is_scalar(&self) -> bool {
        matches!(self, ValueSource::Scalar(_))
    }

    /// Element count (`1` for scalars).
    pub fn len(&self) -> usize {
        match self {
            ValueSource::Scalar(_) => 1,
            ValueSource::Vector(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into the values that would be written to a buffer.
    pub fn into_vec(self) -> Vec<f64> {
        match self {
            ValueSource::Scalar(v) => vec![v],
            ValueSource::Vector(v) => v,
        }
    }

    /// Apply `f` to every element, keeping the shape.
    pub fn map(self, f: impl Fn(f64) -> f64) -> ValueSource {
        match self {
            ValueSource::Scalar(v) => ValueSource::Scalar(f(v)),
            ValueSource::Vector(mut v) => {
                v.iter_mut().for_each(|x| *x = f(*x));
                ValueSource::Vector(v)
            }
        }
    }

    /// Combine with `other` using the broadcasting table.
    pub fn zip_with(&self, other: &ValueSource, f: impl Fn(f64, f64) -> f64) -> ValueSource {
        match (self, other) {
            (ValueSource::Scalar(a), ValueSource::Scalar(b)) => ValueSource::Scalar(f(*a, *b)),
            (ValueSource::Scalar(a), ValueSource::Vector(b)) => {
                ValueSource::Vector(b.iter().map(|&y| f(*a, y)).collect())
            }
            (ValueSource::Vector(a), ValueSource::Scalar(b)) => {
                ValueSource::Vector(a.iter().map(|&x| f(x, *b)).collect())
            }
            (ValueSource::Vector(a), ValueSource::Vector(b)) => {
                ValueSource::Vector(a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect())
            }
        }
    }

    pub fn apply(&self, op: BinaryOp, other: &ValueSource) -> ValueSource {
        self.zip_with(other, |a, b| op.eval(a, b))
    }
}

impl From<f64> for ValueSource {
    fn from(v: f64) -> Self {
        ValueSource::Scalar(v)
    }
}

impl From<Vec<f64>> for ValueSource {
    fn from(v: Vec<f64>) -> Self {
        ValueSource::Vector(v)
    }
}

/// Pairwise operators available to arithmetic modules and formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Atan2,
    Gcd,
    Lcm,
    Min,
    Max,
}

impl BinaryOp {
    #[inline]
    pub fn eval(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Rem => a % b,
            BinaryOp::Pow => a.powf(b),
            BinaryOp::Atan2 => a.atan2(b),
            BinaryOp::Gcd => gcd(a, b),
            BinaryOp::Lcm => lcm(a, b),
            BinaryOp::Min => nan_aware(a, b, f64::min),
            BinaryOp::Max => nan_aware(a, b, f64::max),
        }
    }
}

fn nan_aware(a: f64, b: f64, f: fn(f64, f64) -> f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        f(a, b)
    }
}

/// Truncate toward zero and take the magnitude, or `None` if the value
/// has no `u64` counterpart.
fn to_magnitude(v: f64) -> Option<u64> {
    if !v.is_finite() {
        return None;
    }
    let t = v.trunc().abs();
    if t >= 18_446_744_073_709_551_616.0 {
        return None;
    }
    Some(t as u64)
}

/// Binary (Stein) GCD.
fn gcd_u64(mut u: u64, mut v: u64) -> u64 {
    if u == 0 {
        return v;
    }
    if v == 0 {
        return u;
    }
    let shift = (u | v).trailing_zeros();
    u >>= u.trailing_zeros();
    loop {
        v >>= v.trailing_zeros();
        if u > v {
            std::mem::swap(&mut u, &mut v);
        }
        v -= u;
        if v == 0 {
            return u << shift;
        }
    }
}

/// Greatest common divisor of the truncated magnitudes. NaN for
/// non-finite or out-of-range operands.
pub fn gcd(a: f64, b: f64) -> f64 {
    match (to_magnitude(a), to_magnitude(b)) {
        (Some(u), Some(v)) => gcd_u64(u, v) as f64,
        _ => f64::NAN,
    }
}

/// Least common multiple of the truncated magnitudes. NaN when an operand
/// is non-finite or the product overflows.
pub fn lcm(a: f64, b: f64) -> f64 {
    match (to_magnitude(a), to_magnitude(b)) {
        (Some(0), Some(_)) | (Some(_), Some(0)) => 0.0,
        (Some(u), Some(v)) => (u / gcd_u64(u, v))
            .checked_mul(v)
            .map(|m| m as f64)
            .unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

pub fn add(a: ValueSource, b: ValueSource) -> ValueSource {
    a.apply(BinaryOp::Add, &b)
}

pub fn subtract(a: ValueSource, b: ValueSource) -> ValueSource {
    a.apply(BinaryOp::Sub, &b)
}

pub fn multiply(a: ValueSource, b: ValueSource) -> ValueSource {
    a.apply(BinaryOp::Mul, &b)
}

pub fn divide(a: ValueSource, b: ValueSource) -> ValueSource {
    a.apply(BinaryOp::Div, &b)
}

pub fn power(a: ValueSource, b: ValueSource) -> ValueSource {
    a.apply(BinaryOp::Pow, &b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_scalar_broadcast() {
        let result = multiply(ValueSource::Vector(vec![2.0, 3.0, 4.0]), ValueSource::Scalar(2.0));
        assert_eq!(result, ValueSource::Vector(vec![4.0, 6.0, 8.0]));

        let result = subtract(ValueSource::Scalar(10.0), ValueSource::Vector(vec![1.0, 2.0]));
        assert_eq!(result, ValueSource::Vector(vec![9.0, 8.0]));
    }

    #[test]
    fn test_shorter_vector_wins() {
        let result = multiply(
            ValueSource::Vector(vec![1.0, 2.0, 3.0]),
            ValueSource::Vector(vec![10.0, 20.0]),
        );
        assert_eq!(result, ValueSource::Vector(vec![10.0, 40.0]));
    }

    #[test]
    fn test_scalar_scalar_stays_scalar() {
        assert_eq!(
            add(ValueSource::Scalar(1.0), ValueSource::Scalar(2.5)),
            ValueSource::Scalar(3.5)
        );
    }

    #[test]
    fn test_empty_vector_gives_empty_result() {
        let result = power(ValueSource::Vector(vec![]), ValueSource::Scalar(2.0));
        assert!(result.is_empty());
    }

    #[test]
    fn test_ieee_passthrough() {
        let result = divide(ValueSource::Scalar(1.0), ValueSource::Scalar(0.0));
        assert_eq!(result, ValueSource::Scalar(f64::INFINITY));
        assert!(BinaryOp::Add.eval(f64::NAN, 1.0).is_nan());
        assert!(BinaryOp::Min.eval(f64::NAN, 1.0).is_nan());
        assert_eq!(BinaryOp::Max.eval(-1.0, 4.0), 4.0);
        assert_eq!(BinaryOp::Rem.eval(-7.0, 3.0), -1.0);
    }

    #[test]
    fn test_gcd_lcm() {
        assert_eq!(gcd(12.0, 18.0), 6.0);
        assert_eq!(gcd(12.9, 18.2), 6.0);
        assert_eq!(gcd(-12.0, 18.0), 6.0);
        assert_eq!(gcd(0.0, 5.0), 5.0);
        assert_eq!(lcm(4.0, 6.0), 12.0);
        assert_eq!(lcm(0.0, 6.0), 0.0);
        assert!(gcd(f64::NAN, 2.0).is_nan());
        assert!(lcm(f64::INFINITY, 2.0).is_nan());
        assert!(gcd(1e30, 2.0).is_nan());
        assert!(lcm(4_294_967_311.0, 4_294_967_357.0).is_nan());
    }

    proptest! {
        #[test]
        fn gcd_divides_both(a in 1u32..1_000_000, b in 1u32..1_000_000) {
            let g = gcd(a as f64, b as f64) as u64;
            prop_assert!(g > 0);
            prop_assert_eq!(a as u64 % g, 0);
            prop_assert_eq!(b as u64 % g, 0);
            let l = lcm(a as f64, b as f64) as u64;
            prop_assert_eq!(g * l, a as u64 * b as u64);
        }

        #[test]
        fn vector_result_length_is_min(a in prop::collection::vec(-1e6f64..1e6, 0..50),
                                       b in prop::collection::vec(-1e6f64..1e6, 0..50)) {
            let result = add(ValueSource::Vector(a.clone()), ValueSource::Vector(b.clone()));
            prop_assert_eq!(result.len(), a.len().min(b.len()));
        }
    }
}
