//! Seeding an automaton from a single piecewise-linear function.

use crate::flow::Flow;
use crate::rational::ConversionError;
use crate::region::{ConvexRegion, LinearConstraint};
use crate::trace::PwlFunction;

use super::{Automaton, AutomatonError};

/// Box of half-width `delta` around the values of a breakpoint, with time unconstrained.
fn bloat<R: ConvexRegion>(state: &[f64], delta: f64) -> Result<R, ConversionError> {
    let dim = state.len() + 1;
    let mut constraints = Vec::with_capacity(2 * state.len());

    for (variable, value) in state.iter().enumerate() {
        let mut coefficients = vec![0.0; dim];
        coefficients[variable + 1] = 1.0;

        constraints.push(LinearConstraint::greater_eq(&coefficients, value - delta)?);
        constraints.push(LinearConstraint::less_eq(&coefficients, value + delta)?);
    }

    Ok(R::from_constraints(dim, constraints))
}

/// Pieces sharing one location, with the running mean of their slopes.
struct SlopeClass {
    centre: Vec<f64>,
    members: usize,
    name: String,
}

impl SlopeClass {
    fn distance(&self, slope: &[f64]) -> f64 {
        self.centre
            .iter()
            .zip(slope)
            .map(|(centre, value)| (centre - value).abs())
            .fold(0.0, f64::max)
    }

    fn absorb(&mut self, slope: &[f64]) {
        self.members += 1;
        let weight = self.members as f64;

        for (centre, value) in self.centre.iter_mut().zip(slope) {
            *centre += (value - *centre) / weight;
        }
    }
}

/// Infer an initial automaton from a piecewise-linear function.
///
/// Pieces with identical rounded slopes form one location, named `loc{k}` after the first piece
/// `k` with that slope. The invariant of a location is the hull of the endpoints of its pieces,
/// bloated by `delta_fh`. A transition links two distinct locations when a piece of the first ends
/// where a piece of the second starts, and its guard is the hull of the bloated shared breakpoints.
///
/// When `first_piece_only` is set only the first piece is used, which produces a single location
/// and leaves the rest of the function to adaptation.
///
/// # Example
///
/// ```rust
/// use pwl_synth::automaton::infer_from_pwl;
/// use pwl_synth::region::Polyhedron;
/// use pwl_synth::trace::PwlFunction;
///
/// let pwl = PwlFunction::scalar(&[(0.0, 0.0), (1.0, 1.0), (2.0, 0.0), (3.0, 1.0)]).unwrap();
/// let automaton = infer_from_pwl::<Polyhedron>(&pwl, &["x"], 0.2, 0.1, false).unwrap();
///
/// assert_eq!(automaton.len(), 2);
/// assert!(automaton.has_transition("loc0", "loc1"));
/// assert!(automaton.has_transition("loc1", "loc0"));
/// ```
pub fn infer_from_pwl<R: ConvexRegion>(
    pwl: &PwlFunction,
    variables: &[&str],
    delta_ha: f64,
    delta_fh: f64,
    first_piece_only: bool,
) -> Result<Automaton<R>, AutomatonError> {
    let pieces = if first_piece_only { 1 } else { pwl.pieces() };
    infer(pwl, variables, delta_ha, delta_fh, pieces, 0.0)
}

/// Infer an initial automaton, grouping pieces whose slopes are within `bandwidth` of each other.
///
/// Pieces are visited in order and join the first group whose mean slope is within `bandwidth` of
/// their own slope in the infinity norm, otherwise they start a new group. The flow of a location
/// is the rounded mean slope of its group. A zero bandwidth gives the same automaton as
/// [`infer_from_pwl`].
///
/// # Example
///
/// ```rust
/// use pwl_synth::automaton::infer_clustered;
/// use pwl_synth::flow::Flow;
/// use pwl_synth::region::Polyhedron;
/// use pwl_synth::trace::PwlFunction;
///
/// let pwl = PwlFunction::scalar(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.1), (3.0, 2.1)]).unwrap();
/// let automaton = infer_clustered::<Polyhedron>(&pwl, &["x"], 0.4, 0.2, 0.2).unwrap();
///
/// assert_eq!(automaton.len(), 2);
/// assert_eq!(automaton.location("loc0").unwrap().flow(), &Flow::new(vec![1.05]).unwrap());
/// ```
pub fn infer_clustered<R: ConvexRegion>(
    pwl: &PwlFunction,
    variables: &[&str],
    delta_ha: f64,
    delta_fh: f64,
    bandwidth: f64,
) -> Result<Automaton<R>, AutomatonError> {
    infer(pwl, variables, delta_ha, delta_fh, pwl.pieces(), bandwidth)
}

fn infer<R: ConvexRegion>(
    pwl: &PwlFunction,
    variables: &[&str],
    delta_ha: f64,
    delta_fh: f64,
    pieces: usize,
    bandwidth: f64,
) -> Result<Automaton<R>, AutomatonError> {
    let mut automaton = Automaton::new(variables.iter().copied(), delta_ha);
    let dim = automaton.dim();

    if pwl.dim() + 1 != dim {
        return Err(AutomatonError::DimensionMismatch {
            name: String::from("trace"),
            expected: dim,
            found: pwl.dim() + 1,
        });
    }

    let flows = pwl.slopes()?;
    let mut classes: Vec<SlopeClass> = Vec::new();
    let mut assignment: Vec<usize> = Vec::with_capacity(pieces);

    for (piece, flow) in flows.iter().take(pieces).enumerate() {
        let slope = flow.derivatives();
        let class = match classes.iter().position(|class| class.distance(slope) <= bandwidth) {
            Some(class) => {
                classes[class].absorb(slope);
                class
            }
            None => {
                classes.push(SlopeClass {
                    centre: slope.to_vec(),
                    members: 1,
                    name: format!("loc{piece}"),
                });
                classes.len() - 1
            }
        };

        assignment.push(class);
    }

    for class in &classes {
        automaton.add_location(class.name.clone(), Flow::new(class.centre.clone())?, R::empty(dim))?;
    }

    let mut bloated: Vec<R> = Vec::with_capacity(pieces + 1);
    for state in pwl.states().take(pieces + 1) {
        bloated.push(bloat(state, delta_fh)?);
    }

    for (piece, class) in assignment.iter().enumerate() {
        let name = &classes[*class].name;
        automaton.widen_invariant(name, &bloated[piece])?;
        automaton.widen_invariant(name, &bloated[piece + 1])?;
    }

    for (piece, window) in assignment.windows(2).enumerate() {
        if window[0] == window[1] {
            continue;
        }

        let from = &classes[window[0]].name;
        let to = &classes[window[1]].name;
        automaton.widen_guard(from, to, &bloated[piece + 1])?;
    }

    Ok(automaton)
}
