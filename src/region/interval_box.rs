use std::cmp::Ordering;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, Zero};

use super::polyhedron::Polyhedron;
use super::{contradiction, Comparison, ConvexRegion, LinearConstraint};

/// Closed interval with optional bounds, `None` standing for an infinite bound.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interval {
    lower: Option<BigRational>,
    upper: Option<BigRational>,
}

impl Interval {
    const UNBOUNDED: Interval = Interval {
        lower: None,
        upper: None,
    };

    pub fn lower(&self) -> Option<&BigRational> {
        self.lower.as_ref()
    }

    pub fn upper(&self) -> Option<&BigRational> {
        self.upper.as_ref()
    }

    fn contains(&self, other: &Interval) -> bool {
        let lower = match (&self.lower, &other.lower) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(mine), Some(theirs)) => mine <= theirs,
        };

        let upper = match (&self.upper, &other.upper) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(mine), Some(theirs)) => mine >= theirs,
        };

        lower && upper
    }
}

fn pick(left: &Option<BigRational>, right: &Option<BigRational>, keep: Ordering) -> Option<BigRational> {
    match (left, right) {
        (Some(l), Some(r)) => Some(if l.cmp(r) == keep { l.clone() } else { r.clone() }),
        (Some(bound), None) | (None, Some(bound)) => Some(bound.clone()),
        (None, None) => None,
    }
}

/// Axis-aligned box over-approximation of a convex region.
///
/// Every operation returns the bounding box of the exact result, which makes this backend cheaper
/// than [`Polyhedron`] at the cost of precision. Because all results are supersets of the exact
/// ones, a reach computation that succeeds with polyhedra also succeeds with boxes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntervalBox {
    dim: usize,
    intervals: Option<Vec<Interval>>,
}

impl IntervalBox {
    /// Bounding box of an exact polyhedron.
    pub fn bounding(polyhedron: &Polyhedron) -> Self {
        let dim = polyhedron.dim();

        if polyhedron.is_empty() {
            return Self::empty(dim);
        }

        let intervals = (0..dim)
            .map(|coordinate| {
                let free = polyhedron.lines().any(|line| !line[coordinate].is_zero());
                let falling = polyhedron.rays().any(|ray| ray[coordinate].is_negative());
                let rising = polyhedron.rays().any(|ray| ray[coordinate].is_positive());

                let values = polyhedron
                    .points()
                    .map(|(point, denominator)| BigRational::new(point[coordinate].clone(), denominator.clone()))
                    .collect::<Vec<_>>();

                Interval {
                    lower: if free || falling { None } else { values.iter().min().cloned() },
                    upper: if free || rising { None } else { values.iter().max().cloned() },
                }
            })
            .collect();

        Self {
            dim,
            intervals: Some(intervals),
        }
    }

    pub fn intervals(&self) -> Option<&[Interval]> {
        self.intervals.as_deref()
    }

    fn map_intervals<F>(&self, f: F) -> Self
    where
        F: Fn(usize, &Interval) -> Interval,
    {
        let intervals = self.intervals.as_ref().map(|intervals| {
            intervals
                .iter()
                .enumerate()
                .map(|(coordinate, interval)| f(coordinate, interval))
                .collect()
        });

        Self { dim: self.dim, intervals }
    }
}

impl From<&Polyhedron> for IntervalBox {
    fn from(polyhedron: &Polyhedron) -> Self {
        Self::bounding(polyhedron)
    }
}

impl ConvexRegion for IntervalBox {
    fn universe(dim: usize) -> Self {
        Self {
            dim,
            intervals: Some(vec![Interval::UNBOUNDED; dim]),
        }
    }

    fn empty(dim: usize) -> Self {
        Self { dim, intervals: None }
    }

    fn from_constraints<I>(dim: usize, constraints: I) -> Self
    where
        I: IntoIterator<Item = LinearConstraint>,
    {
        Self::bounding(&Polyhedron::from_constraints(dim, constraints))
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn is_empty(&self) -> bool {
        self.intervals.is_none()
    }

    fn is_universe(&self) -> bool {
        match &self.intervals {
            Some(intervals) => intervals.iter().all(|interval| interval == &Interval::UNBOUNDED),
            None => false,
        }
    }

    fn intersection(&self, other: &Self) -> Self {
        let (mine, theirs) = match (&self.intervals, &other.intervals) {
            (Some(mine), Some(theirs)) => (mine, theirs),
            _ => return Self::empty(self.dim),
        };

        let mut intervals = Vec::with_capacity(self.dim);

        for (left, right) in mine.iter().zip(theirs) {
            let lower = pick(&left.lower, &right.lower, Ordering::Greater);
            let upper = pick(&left.upper, &right.upper, Ordering::Less);

            if let (Some(l), Some(u)) = (&lower, &upper) {
                if l > u {
                    return Self::empty(self.dim);
                }
            }

            intervals.push(Interval { lower, upper });
        }

        Self {
            dim: self.dim,
            intervals: Some(intervals),
        }
    }

    fn hull(&self, other: &Self) -> Self {
        let (mine, theirs) = match (&self.intervals, &other.intervals) {
            (Some(mine), Some(theirs)) => (mine, theirs),
            (None, _) => return other.clone(),
            (_, None) => return self.clone(),
        };

        let intervals = mine
            .iter()
            .zip(theirs)
            .map(|(left, right)| Interval {
                lower: left.lower.as_ref().and(right.lower.as_ref()).and_then(|_| {
                    pick(&left.lower, &right.lower, Ordering::Less)
                }),
                upper: left.upper.as_ref().and(right.upper.as_ref()).and_then(|_| {
                    pick(&left.upper, &right.upper, Ordering::Greater)
                }),
            })
            .collect();

        Self {
            dim: self.dim,
            intervals: Some(intervals),
        }
    }

    fn add_ray(&self, direction: &[BigInt]) -> Self {
        self.map_intervals(|coordinate, interval| {
            let component = &direction[coordinate];
            Interval {
                lower: if component.is_negative() { None } else { interval.lower.clone() },
                upper: if component.is_positive() { None } else { interval.upper.clone() },
            }
        })
    }

    fn unconstrain(&self, coordinate: usize) -> Self {
        self.map_intervals(|index, interval| {
            if index == coordinate {
                Interval::UNBOUNDED
            } else {
                interval.clone()
            }
        })
    }

    fn contains(&self, other: &Self) -> bool {
        match (&self.intervals, &other.intervals) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(mine), Some(theirs)) => mine.iter().zip(theirs).all(|(m, t)| m.contains(t)),
        }
    }

    fn constraints(&self) -> Vec<LinearConstraint> {
        let intervals = match &self.intervals {
            Some(intervals) => intervals,
            None => return vec![contradiction(self.dim)],
        };

        let bound = |coordinate: usize, value: &BigRational, comparison| {
            let mut coefficients = vec![BigInt::zero(); self.dim];
            coefficients[coordinate] = value.denom().clone();
            LinearConstraint::from_integers(coefficients, comparison, value.numer().clone())
        };

        let mut constraints = Vec::new();

        for (coordinate, interval) in intervals.iter().enumerate() {
            match (&interval.lower, &interval.upper) {
                (Some(l), Some(u)) if l == u => constraints.push(bound(coordinate, l, Comparison::Equal)),
                (lower, upper) => {
                    if let Some(l) = lower {
                        constraints.push(bound(coordinate, l, Comparison::GreaterEq));
                    }
                    if let Some(u) = upper {
                        constraints.push(bound(coordinate, u, Comparison::LessEq));
                    }
                }
            }
        }

        constraints
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use num_bigint::BigInt;
    use num_rational::BigRational;

    use super::IntervalBox;
    use crate::region::{ConvexRegion, LinearConstraint, Polyhedron};

    type TestResult = Result<(), Box<dyn Error>>;

    fn rational(numerator: i64, denominator: i64) -> BigRational {
        BigRational::new(BigInt::from(numerator), BigInt::from(denominator))
    }

    #[test]
    fn bounding_box_of_a_triangle() -> TestResult {
        // t >= 0, x >= 0, t + 2x <= 1
        let triangle = Polyhedron::from_constraints(
            2,
            [
                LinearConstraint::greater_eq(&[1.0, 0.0], 0.0)?,
                LinearConstraint::greater_eq(&[0.0, 1.0], 0.0)?,
                LinearConstraint::less_eq(&[1.0, 2.0], 1.0)?,
            ],
        );

        let bounds = IntervalBox::bounding(&triangle);
        let intervals = bounds.intervals().ok_or("box should not be empty")?;

        assert_eq!(intervals[0].lower(), Some(&rational(0, 1)));
        assert_eq!(intervals[0].upper(), Some(&rational(1, 1)));
        assert_eq!(intervals[1].upper(), Some(&rational(1, 2)));
        assert!(bounds.contains(&IntervalBox::from(&triangle)));

        Ok(())
    }

    #[test]
    fn rays_open_bounds() -> TestResult {
        let segment = IntervalBox::from_constraints(
            2,
            [LinearConstraint::pin(2, 0, 0.0)?, LinearConstraint::pin(2, 1, 1.0)?],
        );

        let swept = segment.add_ray(&[BigInt::from(1), BigInt::from(-1)]);
        let intervals = swept.intervals().ok_or("box should not be empty")?;

        assert_eq!(intervals[0].lower(), Some(&rational(0, 1)));
        assert_eq!(intervals[0].upper(), None);
        assert_eq!(intervals[1].lower(), None);
        assert_eq!(intervals[1].upper(), Some(&rational(1, 1)));

        Ok(())
    }

    #[test]
    fn hull_and_intersection() -> TestResult {
        let left = IntervalBox::from_constraints(
            1,
            [LinearConstraint::greater_eq(&[1.0], 0.0)?, LinearConstraint::less_eq(&[1.0], 1.0)?],
        );
        let right = IntervalBox::from_constraints(
            1,
            [LinearConstraint::greater_eq(&[1.0], 2.0)?, LinearConstraint::less_eq(&[1.0], 3.0)?],
        );

        assert!(left.intersection(&right).is_empty());
        assert_eq!(left.hull(&right).constraints().len(), 2);
        assert_eq!(left.hull(&IntervalBox::empty(1)), left);
        assert!(left.unconstrain(0).is_universe());

        Ok(())
    }
}
