//! Exact conversion of floating point values into rationals and scaled integers.
//!
//! Every linear constraint in this crate is built from integer coefficients. Floating point values
//! coming from traces, slopes, and tolerances are first converted into rationals through their
//! shortest decimal representation, which means that `2.3` becomes `23/10` rather than the binary
//! fraction closest to it. A group of values is then scaled by the least common multiple of their
//! denominators so that the whole group is expressed over the integers.
//!
//! # Examples
//!
//! ```rust
//! use num_bigint::BigInt;
//! use pwl_synth::rational::float2int;
//!
//! let (integers, scale) = float2int(&[1.5, -1.5, 2.3]).unwrap();
//!
//! assert_eq!(integers, vec![BigInt::from(15), BigInt::from(-15), BigInt::from(23)]);
//! assert_eq!(scale, BigInt::from(10));
//! ```

use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, ToPrimitive, Zero};
use thiserror::Error;

/// Number of decimal digits kept when a slope is turned into a flow.
pub const FLOW_DIGITS: i32 = 8;

/// Error categories that can be produced while converting a float into a rational.
///
/// This enum is marked as `non_exhaustive`, so match the `ErrorKind` variants you expect and use
/// `_` for all the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    #[error("value is not finite")]
    NonFinite,

    #[error("value does not survive the round trip")]
    Inexact,
}

/// The error type for converting floating point values into exact rationals.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("Error converting {value} into a rational: {kind}")]
pub struct ConversionError {
    kind: ErrorKind,
    value: f64,
}

impl ConversionError {
    /// Create an error for a NaN or infinite value
    pub fn non_finite(value: f64) -> Self {
        Self {
            kind: ErrorKind::NonFinite,
            value,
        }
    }

    /// Create an error for a value whose rational form does not convert back into the same float
    pub fn inexact(value: f64) -> Self {
        Self {
            kind: ErrorKind::Inexact,
            value,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Convert a float into the rational described by its shortest decimal representation.
///
/// The conversion is validated by converting the rational back into a float, which must be equal
/// to the input.
///
/// # Example
///
/// ```rust
/// use num_bigint::BigInt;
/// use num_rational::BigRational;
/// use pwl_synth::rational::to_rational;
///
/// let value = to_rational(2.3).unwrap();
/// assert_eq!(value, BigRational::new(BigInt::from(23), BigInt::from(10)));
/// ```
pub fn to_rational(value: f64) -> Result<BigRational, ConversionError> {
    if !value.is_finite() {
        return Err(ConversionError::non_finite(value));
    }

    // Display for f64 prints the shortest representation that round-trips and never uses an
    // exponent, so the string is always `-?digits(.digits)?`.
    let repr = value.to_string();
    let (negative, digits) = match repr.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, repr.as_str()),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    let magnitude = decimal_to_rational(whole, fraction).ok_or_else(|| ConversionError::inexact(value))?;
    let rational = if negative { -magnitude } else { magnitude };

    match rational.to_f64() {
        Some(recovered) if recovered == value => Ok(rational),
        _ => Err(ConversionError::inexact(value)),
    }
}

/// Exact value of the unsigned decimal literal `whole.fraction`.
///
/// Both parts must only contain ASCII digits and `whole` must not be empty.
pub fn decimal_to_rational(whole: &str, fraction: &str) -> Option<BigRational> {
    let numerator: BigInt = format!("{whole}{fraction}").parse().ok()?;
    let exponent = u32::try_from(fraction.len()).ok()?;
    let denominator = BigInt::from(10u32).pow(exponent);

    Some(BigRational::new(numerator, denominator))
}

/// Least common multiple of a set of integers, `1` for an empty set.
pub fn lcm<'a, I>(values: I) -> BigInt
where
    I: IntoIterator<Item = &'a BigInt>,
{
    values
        .into_iter()
        .filter(|value| !value.is_zero())
        .fold(BigInt::one(), |acc, value| acc.lcm(value))
}

/// Scale a group of floats onto the integers.
///
/// Returns the scaled numerators together with the common denominator that was used. Dividing
/// each integer by the denominator recovers the rational value of the corresponding float.
pub fn float2int(values: &[f64]) -> Result<(Vec<BigInt>, BigInt), ConversionError> {
    let rationals = values
        .iter()
        .map(|value| to_rational(*value))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(scale_rationals(&rationals))
}

/// Scale a group of rationals onto the integers by the least common multiple of their
/// denominators, returning the scaled numerators and that multiple.
pub fn scale_rationals(rationals: &[BigRational]) -> (Vec<BigInt>, BigInt) {
    let scale = lcm(rationals.iter().map(|rational| rational.denom()));
    let integers = rationals
        .iter()
        .map(|rational| rational.numer() * (&scale / rational.denom()))
        .collect();

    (integers, scale)
}

/// Round a float to a fixed number of decimal digits, mapping negative zero onto zero.
pub fn round_to_digits(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    let rounded = (value * factor).round() / factor;

    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}
