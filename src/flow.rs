//! Constant-slope flows and the reachability operators built on them.
//!
//! Every region handled here lives in the `(t, x1, ..., xk)` space, with time as coordinate
//! [`TIME`]. A [`Flow`] moves a state along the direction `(1, x1', ..., xk')`, so flowing a region
//! forward in time is the Minkowski sum of the region with the ray spanned by that direction.
//!
//! The operators compose into the reach computation that decides if a trace can be followed by a
//! sequence of modes:
//!
//!   1. [`initial_region`] pins the first tube piece to the first timestamp
//!   2. [`reach_ab`] moves the reach set across one breakpoint, splitting on the side of the
//!      breakpoint where the switch happens
//!   3. [`reach_last_a`] pins the final reach set to the last timestamp
//!
//! # Examples
//!
//! ```rust
//! use pwl_synth::flow::{post, Flow};
//! use pwl_synth::region::{ConvexRegion, LinearConstraint, Polyhedron};
//!
//! // The origin flowing with slope 2 reaches the point (1, 2)
//! let origin = Polyhedron::from_constraints(
//!     2,
//!     [LinearConstraint::pin(2, 0, 0.0).unwrap(), LinearConstraint::pin(2, 1, 0.0).unwrap()],
//! );
//! let later = Polyhedron::from_constraints(2, [LinearConstraint::pin(2, 0, 1.0).unwrap()]);
//! let flow = Flow::new(vec![2.0]).unwrap();
//!
//! let reached = post(&origin, &later, &flow);
//! let expected = Polyhedron::from_constraints(
//!     2,
//!     [LinearConstraint::pin(2, 0, 1.0).unwrap(), LinearConstraint::pin(2, 1, 2.0).unwrap()],
//! );
//!
//! assert!(reached.same_set(&expected));
//! ```

use std::fmt::{Display, Formatter};

use nonempty::NonEmpty;
use num_bigint::BigInt;
use tracing::trace;

use crate::rational::{float2int, round_to_digits, ConversionError, FLOW_DIGITS};
use crate::region::{ConvexRegion, LinearConstraint, TIME};
use crate::trace::PwlFunction;

/// Constant derivative of every variable, rounded to [`FLOW_DIGITS`] decimal digits.
#[derive(Clone, Debug, PartialEq)]
pub struct Flow {
    derivatives: Vec<f64>,
    forward: Vec<BigInt>,
}

impl Flow {
    /// Create a flow from one derivative per variable.
    ///
    /// The derivatives are rounded before the integer direction `(1, x1', ..., xk')` is computed,
    /// so two flows built from slopes that only differ past the rounding digit are equal.
    pub fn new(derivatives: Vec<f64>) -> Result<Self, ConversionError> {
        if let Some(value) = derivatives.iter().find(|value| !value.is_finite()) {
            return Err(ConversionError::non_finite(*value));
        }

        let derivatives = derivatives
            .into_iter()
            .map(|value| round_to_digits(value, FLOW_DIGITS))
            .collect::<Vec<_>>();

        let mut direction = Vec::with_capacity(derivatives.len() + 1);
        direction.push(1.0);
        direction.extend_from_slice(&derivatives);

        let (forward, _) = float2int(&direction)?;

        Ok(Self { derivatives, forward })
    }

    pub fn derivatives(&self) -> &[f64] {
        &self.derivatives
    }

    /// Number of variables
    pub fn dim(&self) -> usize {
        self.derivatives.len()
    }

    /// Integer direction moving forward in time
    pub fn forward_ray(&self) -> &[BigInt] {
        &self.forward
    }

    /// Integer direction moving backward in time
    pub fn backward_ray(&self) -> Vec<BigInt> {
        self.forward.iter().map(|value| -value).collect()
    }

    /// Per-variable absolute difference with a slope
    pub fn deviations(&self, slope: &[f64]) -> Vec<f64> {
        self.derivatives
            .iter()
            .zip(slope)
            .map(|(derivative, value)| (derivative - value).abs())
            .collect()
    }

    /// Infinity-norm distance to a slope
    pub fn distance(&self, slope: &[f64]) -> f64 {
        self.deviations(slope).into_iter().fold(0.0, f64::max)
    }

    /// Render the flow as one `x' = value` entry per variable.
    pub fn render(&self, names: &[&str]) -> String {
        let entries = self
            .derivatives
            .iter()
            .enumerate()
            .map(|(index, derivative)| {
                let name = names.get(index).map(|name| name.to_string()).unwrap_or_else(|| format!("x{}", index + 1));
                format!("{name}' = {derivative}")
            })
            .collect::<Vec<_>>();

        entries.join(", ")
    }
}

impl Display for Flow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render(&[]))
    }
}

/// Pair of regions whose hull over-approximates the states at one breakpoint.
///
/// `a` holds the states where the switch happened before the breakpoint and `b` the states where it
/// happens after. The first and last breakpoints only use `a`.
#[derive(Clone, Debug, PartialEq)]
pub struct ReachPair<R> {
    pub a: R,
    pub b: R,
}

impl<R> ReachPair<R>
where
    R: ConvexRegion,
{
    pub fn single(region: R) -> Self {
        let b = R::empty(region.dim());
        Self { a: region, b }
    }

    pub fn hull(&self) -> R {
        self.a.hull(&self.b)
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty() && self.b.is_empty()
    }
}

/// States of `target` reachable from `region` by flowing forward in time.
pub fn post<R: ConvexRegion>(region: &R, target: &R, flow: &Flow) -> R {
    if region.is_empty() || target.is_empty() {
        return R::empty(region.dim());
    }

    region.add_ray(flow.forward_ray()).intersection(target)
}

/// States of `target` reachable from `region` by flowing backward in time.
pub fn pre<R: ConvexRegion>(region: &R, target: &R, flow: &Flow) -> R {
    if region.is_empty() || target.is_empty() {
        return R::empty(region.dim());
    }

    region.add_ray(&flow.backward_ray()).intersection(target)
}

/// Move a reach set across the breakpoint shared by two consecutive tube pieces.
///
/// `current` is the flow of the mode active on `current_piece` and `next` the flow of the mode
/// active on `next_piece`. The switch between both modes must happen inside `guard`, either before
/// the breakpoint (within `current_piece`) or after it (within `next_piece`).
pub fn reach_ab<R: ConvexRegion>(
    pair: &ReachPair<R>,
    current: &Flow,
    next: &Flow,
    current_piece: &R,
    next_piece: &R,
    guard: &R,
) -> ReachPair<R> {
    let dim = current_piece.dim();
    let start = pair.hull();
    let overlap = current_piece.intersection(next_piece);

    let (before, after) = if guard.is_universe() {
        (current_piece.clone(), next_piece.clone())
    } else {
        (guard.intersection(current_piece), guard.intersection(next_piece))
    };

    let a = if before.is_empty() {
        R::empty(dim)
    } else {
        pre(&overlap, &post(&start, &before, current), next)
    };

    let b = if after.is_empty() {
        R::empty(dim)
    } else {
        post(&pre(&overlap, &start, current), &after, current)
    };

    ReachPair { a, b }
}

/// Pin the reach set of the last breakpoint to the final timestamp.
pub fn reach_last_a<R: ConvexRegion>(
    pair: &ReachPair<R>,
    flow: &Flow,
    piece: &R,
    end_time: f64,
    invariant: &R,
) -> Result<ReachPair<R>, ConversionError> {
    let pinned = pin_time(piece, end_time)?;
    let target = if invariant.is_universe() {
        pinned
    } else {
        pinned.intersection(invariant)
    };

    let region = if target.is_empty() {
        R::empty(piece.dim())
    } else {
        post(&pair.hull(), &target, flow)
    };

    Ok(ReachPair::single(region))
}

/// Reach set of the first breakpoint, the first tube piece at the first timestamp.
pub fn initial_region<R: ConvexRegion>(piece: &R, start_time: f64, invariant: &R) -> Result<ReachPair<R>, ConversionError> {
    let pinned = pin_time(piece, start_time)?;

    Ok(ReachPair::single(pinned.intersection(invariant)))
}

fn pin_time<R: ConvexRegion>(region: &R, time: f64) -> Result<R, ConversionError> {
    let dim = region.dim();
    let pin = R::from_constraints(dim, [LinearConstraint::pin(dim, TIME, time)?]);

    Ok(region.intersection(&pin))
}

/// Band of width `2 * delta` around every piece of a piecewise-linear function.
#[derive(Clone, Debug)]
pub struct Tube<R> {
    pieces: NonEmpty<R>,
}

impl<R> Tube<R> {
    pub fn piece(&self, index: usize) -> Option<&R> {
        self.pieces.get(index)
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    /// Always false, a tube has at least one piece
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn first(&self) -> &R {
        self.pieces.first()
    }

    pub fn last(&self) -> &R {
        self.pieces.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> + '_ {
        self.pieces.iter()
    }
}

fn tube_piece<R: ConvexRegion>(pwl: &PwlFunction, flow: &Flow, index: usize, delta: f64) -> Result<R, ConversionError> {
    let dim = pwl.dim() + 1;
    let (start, end, state) = match (pwl.time(index), pwl.time(index + 1), pwl.state(index)) {
        (Some(start), Some(end), Some(state)) => (start, end, state),
        _ => return Ok(R::empty(dim)),
    };

    let mut time = vec![0.0; dim];
    time[TIME] = 1.0;

    let mut constraints = vec![
        LinearConstraint::greater_eq(&time, start)?,
        LinearConstraint::less_eq(&time, end)?,
    ];

    for (variable, (slope, value)) in flow.derivatives().iter().zip(state).enumerate() {
        let offset = value - slope * start;

        let mut upper = vec![0.0; dim];
        upper[TIME] = *slope;
        upper[variable + 1] = -1.0;

        let lower = upper.iter().map(|coefficient| -coefficient).collect::<Vec<_>>();

        constraints.push(LinearConstraint::less_eq(&upper, delta - offset)?);
        constraints.push(LinearConstraint::less_eq(&lower, delta + offset)?);
    }

    Ok(R::from_constraints(dim, constraints))
}

/// Build the tube of half-width `delta` around a piecewise-linear function.
///
/// Piece `i` is the set of `(t, x)` with `t_i <= t <= t_{i+1}` and
/// `|x_j - (x_ij + a_j * (t - t_i))| <= delta` for every variable, where `a` is the rounded slope
/// of the piece.
pub fn tube<R: ConvexRegion>(pwl: &PwlFunction, delta: f64) -> Result<Tube<R>, ConversionError> {
    let flows = pwl.slopes()?;
    let regions = flows
        .iter()
        .enumerate()
        .map(|(index, flow)| tube_piece(pwl, flow, index, delta))
        .collect::<Result<Vec<R>, _>>()?;

    let pieces = NonEmpty::from_vec(regions).unwrap_or_else(|| NonEmpty::new(R::empty(pwl.dim() + 1)));

    Ok(Tube { pieces })
}

/// Constraints applied when moving the reach set onto one breakpoint.
#[derive(Debug)]
pub(crate) enum Step<'a, R> {
    /// First breakpoint, restricted by the invariant of the first mode
    Start { invariant: &'a R },

    /// Inner breakpoint, switching between two modes through a guard
    Switch { from: &'a Flow, to: &'a Flow, guard: &'a R },

    /// Last breakpoint, restricted by the invariant of the last mode
    Finish { flow: &'a Flow, invariant: &'a R },
}

/// Compute the reach pair of breakpoint `index` from the pair of the previous breakpoint.
pub(crate) fn advance<R: ConvexRegion>(
    pwl: &PwlFunction,
    tube: &Tube<R>,
    index: usize,
    previous: Option<&ReachPair<R>>,
    step: Step<'_, R>,
) -> Result<ReachPair<R>, ConversionError> {
    let dim = pwl.dim() + 1;
    let empty = || ReachPair::single(R::empty(dim));

    let pair = match step {
        Step::Start { invariant } => initial_region(tube.first(), pwl.start_time(), invariant)?,
        Step::Switch { from, to, guard } => match (previous, index.checked_sub(1).and_then(|i| tube.piece(i)), tube.piece(index)) {
            (Some(previous), Some(current_piece), Some(next_piece)) => {
                reach_ab(previous, from, to, current_piece, next_piece, guard)
            }
            _ => empty(),
        },
        Step::Finish { flow, invariant } => match previous {
            Some(previous) => reach_last_a(previous, flow, tube.last(), pwl.end_time(), invariant)?,
            None => empty(),
        },
    };

    trace!(index, empty = pair.is_empty(), "reach step");

    Ok(pair)
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use num_bigint::BigInt;

    use super::{advance, post, pre, reach_ab, tube, Flow, ReachPair, Step};
    use crate::region::{ConvexRegion, IntervalBox, LinearConstraint, Polyhedron};
    use crate::trace::PwlFunction;

    type TestResult = Result<(), Box<dyn Error>>;

    fn point(t: f64, x: f64) -> Result<Polyhedron, Box<dyn Error>> {
        Ok(Polyhedron::from_constraints(
            2,
            [LinearConstraint::pin(2, 0, t)?, LinearConstraint::pin(2, 1, x)?],
        ))
    }

    fn walk<R: ConvexRegion>(pwl: &PwlFunction, flows: &[Flow], delta: f64) -> Result<Vec<ReachPair<R>>, Box<dyn Error>> {
        let tube = tube::<R>(pwl, delta)?;
        let universe = R::universe(pwl.dim() + 1);
        let mut pairs: Vec<ReachPair<R>> = Vec::new();

        for index in 0..=pwl.pieces() {
            let step = if index == 0 {
                Step::Start { invariant: &universe }
            } else if index == pwl.pieces() {
                Step::Finish {
                    flow: &flows[index - 1],
                    invariant: &universe,
                }
            } else {
                Step::Switch {
                    from: &flows[index - 1],
                    to: &flows[index],
                    guard: &universe,
                }
            };

            let pair = advance(pwl, &tube, index, pairs.last(), step)?;
            pairs.push(pair);
        }

        Ok(pairs)
    }

    #[test]
    fn flow_direction() -> TestResult {
        let flow = Flow::new(vec![1.5, -0.25])?;
        let expected = [BigInt::from(4), BigInt::from(6), BigInt::from(-1)];

        assert_eq!(flow.forward_ray(), &expected);
        assert_eq!(flow.backward_ray(), vec![BigInt::from(-4), BigInt::from(-6), BigInt::from(1)]);
        assert_eq!(flow.to_string(), "x1' = 1.5, x2' = -0.25");

        Ok(())
    }

    #[test]
    fn flow_rounding() -> TestResult {
        let left = Flow::new(vec![1.0 / 3.0])?;
        let right = Flow::new(vec![0.333333334])?;

        assert_eq!(left, right);
        assert!(Flow::new(vec![f64::NAN]).is_err());

        Ok(())
    }

    #[test]
    fn post_and_pre() -> TestResult {
        let flow = Flow::new(vec![-1.0])?;
        let origin = point(0.0, 0.0)?;
        let band = Polyhedron::from_constraints(
            2,
            [
                LinearConstraint::greater_eq(&[1.0, 0.0], -2.0)?,
                LinearConstraint::less_eq(&[1.0, 0.0], 2.0)?,
            ],
        );

        let forward = post(&origin, &band, &flow);
        let backward = pre(&origin, &band, &flow);

        assert!(forward.contains(&point(2.0, -2.0)?));
        assert!(!forward.contains(&point(-1.0, 1.0)?));
        assert!(backward.contains(&point(-1.0, 1.0)?));
        assert!(post(&Polyhedron::empty(2), &band, &flow).is_empty());

        Ok(())
    }

    #[test]
    fn tube_piece_constraints() -> TestResult {
        let pwl = PwlFunction::scalar(&[(0.0, 0.0), (1.0, 1.0), (2.0, 0.0), (3.0, 1.0)])?;
        let tube = tube::<Polyhedron>(&pwl, 0.1)?;
        let expected = Polyhedron::from_constraints(
            2,
            [
                LinearConstraint::greater_eq(&[1.0, 0.0], 0.0)?,
                LinearConstraint::less_eq(&[1.0, 0.0], 1.0)?,
                LinearConstraint::greater_eq(&[-10.0, 10.0], -1.0)?,
                LinearConstraint::greater_eq(&[10.0, -10.0], -1.0)?,
            ],
        );

        assert_eq!(tube.len(), 3);
        assert!(tube.first().same_set(&expected));
        assert!(tube.piece(1).ok_or("second piece")?.contains(&point(1.5, 0.55)?));
        assert!(!tube.piece(1).ok_or("second piece")?.contains(&point(1.5, 0.7)?));

        Ok(())
    }

    #[test]
    fn matching_flows_reach_the_end() -> TestResult {
        let pwl = PwlFunction::scalar(&[(0.0, 0.0), (1.0, 1.0), (2.0, 1.0)])?;
        let flows = [Flow::new(vec![1.0])?, Flow::new(vec![0.0])?];
        let pairs = walk::<Polyhedron>(&pwl, &flows, 0.1)?;

        assert_eq!(pairs.len(), 3);
        assert!(pairs.iter().all(|pair| !pair.is_empty()));
        assert!(pairs[2].hull().contains(&point(2.0, 1.0)?));

        Ok(())
    }

    #[test]
    fn wrong_flow_leaves_the_tube() -> TestResult {
        let pwl = PwlFunction::scalar(&[(0.0, 0.0), (1.0, 1.0), (2.0, 1.0)])?;
        let flows = [Flow::new(vec![1.0])?, Flow::new(vec![1.0])?];
        let pairs = walk::<Polyhedron>(&pwl, &flows, 0.1)?;

        assert!(pairs[2].is_empty());

        Ok(())
    }

    #[test]
    fn guard_outside_both_pieces() -> TestResult {
        let pwl = PwlFunction::scalar(&[(0.0, 0.0), (1.0, 1.0), (2.0, 1.0)])?;
        let tube = tube::<Polyhedron>(&pwl, 0.1)?;
        let start = ReachPair::single(point(0.0, 0.0)?);
        let guard = Polyhedron::from_constraints(2, [LinearConstraint::greater_eq(&[0.0, 1.0], 5.0)?]);
        let flow = Flow::new(vec![1.0])?;

        let pair = reach_ab(
            &start,
            &flow,
            &flow,
            tube.first(),
            tube.piece(1).ok_or("second piece")?,
            &guard,
        );

        assert!(pair.is_empty());

        Ok(())
    }

    #[test]
    fn boxes_accept_what_polyhedra_accept() -> TestResult {
        let pwl = PwlFunction::scalar(&[(0.0, 0.0), (1.0, 2.0), (3.0, 1.0)])?;
        let flows = [Flow::new(vec![2.0])?, Flow::new(vec![-0.5])?];

        let exact = walk::<Polyhedron>(&pwl, &flows, 0.2)?;
        let boxes = walk::<IntervalBox>(&pwl, &flows, 0.2)?;

        for (exact, approximate) in exact.iter().zip(&boxes) {
            assert!(exact.is_empty() || !approximate.is_empty());
        }

        Ok(())
    }
}
