//! Widening the constraints of an automaton along a path.
//!
//! Relaxation keeps the structure of the automaton: it looks for a path that accepts the function
//! once every invariant and guard is lifted, then grows the real invariants and guards along that
//! path until they cover the reach sets computed without them.

use std::ops::Range;

use tracing::debug;

use crate::automaton::{Automaton, AutomatonError};
use crate::flow::{Flow, ReachPair, Tube};
use crate::membership::{check_dimensions, path_membership, MembershipError};
use crate::region::ConvexRegion;
use crate::search::candidate_paths;
use crate::trace::PwlFunction;

fn ensure_location<R, F>(target: &mut Automaton<R>, name: &str, flow_of: &F) -> Result<(), AutomatonError>
where
    R: ConvexRegion,
    F: Fn(&str) -> Option<Flow>,
{
    if target.contains_location(name) {
        return Ok(());
    }

    let flow = flow_of(name).ok_or_else(|| AutomatonError::UnknownLocation(name.to_string()))?;
    let dim = target.dim();

    target.add_location(name, flow, R::empty(dim))
}

/// Grow the invariants and guards used by the pieces in `pieces` so that they cover `reach`.
///
/// For every piece `m` the invariant of `path[m]` is hulled with the reach sets of breakpoints `m`
/// and `m + 1`. For `m >= 1` the guard of the transition from `path[m - 1]` is hulled with the
/// reach set of breakpoint `m`, adding the transition if needed, and the invariant of `path[m]` is
/// hulled with the resulting guard. Locations missing from `target` are created with the flow
/// returned by `flow_of`.
pub(crate) fn widen_path<R, F>(
    target: &mut Automaton<R>,
    path: &[String],
    reach: &[ReachPair<R>],
    pieces: Range<usize>,
    flow_of: F,
) -> Result<(), AutomatonError>
where
    R: ConvexRegion,
    F: Fn(&str) -> Option<Flow>,
{
    for piece in pieces {
        let (location, left) = match (path.get(piece), reach.get(piece)) {
            (Some(location), Some(pair)) => (location, pair.hull()),
            _ => break,
        };

        ensure_location(target, location, &flow_of)?;
        target.widen_invariant(location, &left)?;

        if let Some(right) = reach.get(piece + 1) {
            target.widen_invariant(location, &right.hull())?;
        }

        if piece == 0 {
            continue;
        }

        let previous = &path[piece - 1];
        ensure_location(target, previous, &flow_of)?;
        target.widen_guard(previous, location, &left)?;

        if let Some(guard) = target.guard(previous, location).cloned() {
            target.widen_invariant(location, &guard)?;
        }
    }

    Ok(())
}

/// Widen the automaton along the first path that accepts the function with every constraint lifted.
///
/// Returns `None` when no candidate path accepts the function even without constraints, in which
/// case new structure is needed to admit it.
pub fn relax_ha<R: ConvexRegion>(
    automaton: &Automaton<R>,
    pwl: &PwlFunction,
    tube: &Tube<R>,
    max_path_length: usize,
) -> Result<Option<Automaton<R>>, MembershipError> {
    check_dimensions(automaton, pwl)?;

    let relaxed = automaton.relaxed();

    for path in candidate_paths(automaton, &pwl.raw_slopes(), max_path_length) {
        let report = path_membership(&relaxed, &path, pwl, tube)?;

        if !report.accepted() {
            continue;
        }

        let mut result = automaton.clone();
        widen_path(&mut result, &report.path, &report.reach, 0..pwl.pieces(), |_| None)?;

        debug!(path = ?report.path, "relaxation succeeded");
        return Ok(Some(result));
    }

    debug!("no relaxation admits the function");
    Ok(None)
}
