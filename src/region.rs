//! Closed convex regions over the `(t, x1, ..., xk)` space.
//!
//! The reachability computations in this crate only need a small algebra of convex sets:
//! intersection, closed convex hull, Minkowski sum with a single ray, cylindrification along a
//! coordinate, containment, and an emptiness test. That algebra is captured by the
//! [`ConvexRegion`] trait, which has two implementations:
//!
//!   1. [`Polyhedron`] - an exact representation that keeps both the constraint and the generator
//!      description of the set, converting between them with the double description method
//!   2. [`IntervalBox`] - a cheaper representation that over-approximates every result by its
//!      bounding box
//!
//! Regions are built from [`LinearConstraint`] values, which hold integer coefficients. The
//! constructors of `LinearConstraint` accept floats and scale them onto the integers using
//! [`float2int`](crate::rational::float2int), so no floating point value is ever used directly
//! as a coefficient.
//!
//! # Examples
//!
//! ```rust
//! use pwl_synth::region::{ConvexRegion, LinearConstraint, Polyhedron};
//!
//! // 0 <= x <= 5 over the (t, x) plane
//! let lower = LinearConstraint::greater_eq(&[0.0, 1.0], 0.0).unwrap();
//! let upper = LinearConstraint::less_eq(&[0.0, 1.0], 5.0).unwrap();
//! let band = Polyhedron::from_constraints(2, [lower, upper]);
//!
//! assert!(!band.is_empty());
//! assert!(Polyhedron::universe(2).contains(&band));
//! ```

use std::fmt::{Debug, Display, Formatter};

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, Zero};

use crate::rational::{float2int, scale_rationals, ConversionError};

mod double_description;
mod interval_box;
mod polyhedron;

pub use interval_box::IntervalBox;
pub use polyhedron::Polyhedron;

/// Index of the time coordinate in every region.
pub const TIME: usize = 0;

/// Relation between the left-hand side of a constraint and its bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Comparison {
    LessEq,
    GreaterEq,
    Equal,
}

impl Display for Comparison {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LessEq => write!(f, "<="),
            Self::GreaterEq => write!(f, ">="),
            Self::Equal => write!(f, "=="),
        }
    }
}

/// Representation of the closed linear constraint `a · x (<=|>=|==) b` with integer coefficients.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LinearConstraint {
    coefficients: Vec<BigInt>,
    comparison: Comparison,
    bound: BigInt,
}

impl LinearConstraint {
    /// Create a constraint from floating point coefficients and bound.
    ///
    /// The coefficients and bound are scaled together by the least common multiple of their
    /// decimal denominators.
    pub fn new(coefficients: &[f64], comparison: Comparison, bound: f64) -> Result<Self, ConversionError> {
        let mut values = coefficients.to_vec();
        values.push(bound);

        let (mut integers, _) = float2int(&values)?;
        let bound = integers.pop().unwrap_or_else(BigInt::zero);

        Ok(Self::from_integers(integers, comparison, bound))
    }

    pub fn less_eq(coefficients: &[f64], bound: f64) -> Result<Self, ConversionError> {
        Self::new(coefficients, Comparison::LessEq, bound)
    }

    pub fn greater_eq(coefficients: &[f64], bound: f64) -> Result<Self, ConversionError> {
        Self::new(coefficients, Comparison::GreaterEq, bound)
    }

    pub fn equal(coefficients: &[f64], bound: f64) -> Result<Self, ConversionError> {
        Self::new(coefficients, Comparison::Equal, bound)
    }

    /// Create a constraint from exact rational coefficients and bound, scaled together by the least
    /// common multiple of their denominators.
    pub fn from_rationals(coefficients: &[BigRational], comparison: Comparison, bound: &BigRational) -> Self {
        let mut values = coefficients.to_vec();
        values.push(bound.clone());

        let (mut integers, _) = scale_rationals(&values);
        let bound = integers.pop().unwrap_or_else(BigInt::zero);

        Self::from_integers(integers, comparison, bound)
    }

    /// Create a constraint from integer coefficients without any scaling.
    pub fn from_integers(coefficients: Vec<BigInt>, comparison: Comparison, bound: BigInt) -> Self {
        Self {
            coefficients,
            comparison,
            bound,
        }
    }

    /// Constraint pinning a single coordinate to a value, `x_i == value`.
    pub fn pin(dim: usize, coordinate: usize, value: f64) -> Result<Self, ConversionError> {
        let mut coefficients = vec![0.0; dim];
        coefficients[coordinate] = 1.0;

        Self::equal(&coefficients, value)
    }

    pub fn dim(&self) -> usize {
        self.coefficients.len()
    }

    pub fn coefficients(&self) -> &[BigInt] {
        &self.coefficients
    }

    pub fn comparison(&self) -> Comparison {
        self.comparison
    }

    pub fn bound(&self) -> &BigInt {
        &self.bound
    }

    /// Render the constraint using the given names for each coordinate.
    ///
    /// Coordinates without a name are rendered as `x{index}`.
    pub fn render(&self, names: &[&str]) -> String {
        let mut rendered = String::new();

        for (index, coefficient) in self.coefficients.iter().enumerate() {
            if coefficient.is_zero() {
                continue;
            }

            let name = names.get(index).map(|name| name.to_string()).unwrap_or_else(|| format!("x{index}"));
            let magnitude = coefficient.abs();
            let term = if magnitude == BigInt::from(1) {
                name
            } else {
                format!("{magnitude}*{name}")
            };

            match (rendered.is_empty(), coefficient.is_negative()) {
                (true, true) => rendered.push_str(&format!("-{term}")),
                (true, false) => rendered.push_str(&term),
                (false, true) => rendered.push_str(&format!(" - {term}")),
                (false, false) => rendered.push_str(&format!(" + {term}")),
            }
        }

        if rendered.is_empty() {
            rendered.push('0');
        }

        format!("{} {} {}", rendered, self.comparison, self.bound)
    }
}

impl Display for LinearConstraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render(&[]))
    }
}

/// A closed convex subset of `R^dim`.
///
/// Implementations must be exact or over-approximating: every operation returns a superset of the
/// mathematically exact result, and an exact implementation returns the result itself. Operations
/// with an empty operand follow the usual set semantics, so the hull of a region with the empty
/// set is the region itself.
pub trait ConvexRegion: Clone + Debug {
    /// The whole space
    fn universe(dim: usize) -> Self;

    /// The empty set
    fn empty(dim: usize) -> Self;

    /// The set of points satisfying every constraint
    fn from_constraints<I>(dim: usize, constraints: I) -> Self
    where
        I: IntoIterator<Item = LinearConstraint>;

    fn dim(&self) -> usize;

    fn is_empty(&self) -> bool;

    fn is_universe(&self) -> bool;

    fn intersection(&self, other: &Self) -> Self;

    /// Closed convex hull of the union of both regions
    fn hull(&self, other: &Self) -> Self;

    /// Minkowski sum of the region with the half-line spanned by `direction`
    fn add_ray(&self, direction: &[BigInt]) -> Self;

    /// Remove every restriction on a single coordinate
    fn unconstrain(&self, coordinate: usize) -> Self;

    /// Returns true if every point of `other` belongs to this region
    fn contains(&self, other: &Self) -> bool;

    /// Constraint description of the region
    ///
    /// An empty region is described by a single unsatisfiable constraint.
    fn constraints(&self) -> Vec<LinearConstraint>;

    /// Keep the listed coordinates and unconstrain all the others
    fn projection(&self, keep: &[usize]) -> Self {
        (0..self.dim())
            .filter(|coordinate| !keep.contains(coordinate))
            .fold(self.clone(), |region, coordinate| region.unconstrain(coordinate))
    }

    /// Unconstrain the time coordinate
    fn without_time(&self) -> Self {
        self.unconstrain(TIME)
    }

    /// Returns true if both regions contain exactly the same points
    fn same_set(&self, other: &Self) -> bool {
        self.contains(other) && other.contains(self)
    }

    /// Render the constraint description using coordinate names
    fn render(&self, names: &[&str]) -> String {
        if self.is_universe() {
            return String::from("true");
        }

        let constraints = self
            .constraints()
            .iter()
            .map(|constraint| constraint.render(names))
            .collect::<Vec<_>>();

        constraints.join(" && ")
    }
}

/// The constraint `0 <= -1`, used to describe empty regions.
pub(crate) fn contradiction(dim: usize) -> LinearConstraint {
    LinearConstraint::from_integers(vec![BigInt::zero(); dim], Comparison::LessEq, BigInt::from(-1))
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use num_bigint::BigInt;

    use super::{Comparison, LinearConstraint};

    #[test]
    fn constraint_scaling() -> Result<(), Box<dyn Error>> {
        let constraint = LinearConstraint::less_eq(&[1.5, -0.25], 2.3)?;
        let expected = [BigInt::from(30), BigInt::from(-5)];

        assert_eq!(constraint.coefficients(), &expected);
        assert_eq!(constraint.bound(), &BigInt::from(46));
        assert_eq!(constraint.comparison(), Comparison::LessEq);

        Ok(())
    }

    #[test]
    fn constraint_to_string() -> Result<(), Box<dyn Error>> {
        let constraint = LinearConstraint::greater_eq(&[-1.0, 1.0, 0.0, 2.0], -1.0)?;

        assert_eq!(constraint.render(&["t", "x", "y", "z"]), "-t + x + 2*z >= -1");
        assert_eq!(constraint.to_string(), "-x0 + x1 + 2*x3 >= -1");

        Ok(())
    }
}
