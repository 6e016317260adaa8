//! Searching an automaton for sequences of locations that could follow a trace.
//!
//! A path assigns one location to every piece of a piecewise-linear function, and consecutive
//! locations of a path must be connected by a transition. Two searches produce paths:
//!
//!   1. [`heuristic_dfs`] - a depth-first search that tries locations whose flow is closest to the
//!      slope of each piece first
//!   2. [`unroll`] - an exhaustive enumeration of every walk with the right number of transitions
//!
//! [`candidate_paths`] chains both into the sequence of paths tried by membership and relaxation.

use either::Either;
use ordered_float::OrderedFloat;
use tracing::debug;

use crate::automaton::{Automaton, Walks};
use crate::region::ConvexRegion;

/// Result of the heuristic search.
///
/// When `complete` is false no path with one location per piece could be found, and `locations`
/// holds the longest prefix visited by the search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeuristicPath {
    pub locations: Vec<String>,
    pub complete: bool,
}

/// Locations ordered by the per-variable distance between their flow and `slope`.
///
/// Distances are compared lexicographically and the sort is stable, so locations at the same
/// distance keep their insertion order.
fn ranked<'a, R, I>(automaton: &'a Automaton<R>, candidates: I, slope: &[f64]) -> Vec<&'a str>
where
    R: ConvexRegion,
    I: IntoIterator<Item = &'a str>,
{
    let mut scored = candidates
        .into_iter()
        .filter_map(|name| {
            let location = automaton.location(name)?;
            let key = location
                .flow()
                .deviations(slope)
                .into_iter()
                .map(OrderedFloat)
                .collect::<Vec<_>>();

            Some((key, name))
        })
        .collect::<Vec<_>>();

    scored.sort_by(|left, right| left.0.cmp(&right.0));
    scored.into_iter().map(|(_, name)| name).collect()
}

/// Greedy depth-first search for a path following the given slopes.
///
/// At every piece the locations connected to the previous one are tried in order of closeness of
/// their flow to the slope of the piece. A location is never followed by itself.
///
/// # Example
///
/// ```rust
/// use pwl_synth::automaton::Automaton;
/// use pwl_synth::flow::Flow;
/// use pwl_synth::region::{ConvexRegion, Polyhedron};
/// use pwl_synth::search::heuristic_dfs;
///
/// let mut automaton = Automaton::<Polyhedron>::new(["x"], 1.0);
/// automaton.add_location("up", Flow::new(vec![1.0]).unwrap(), Polyhedron::universe(2)).unwrap();
/// automaton.add_location("down", Flow::new(vec![-1.0]).unwrap(), Polyhedron::universe(2)).unwrap();
/// automaton.add_transition("up", "down", Polyhedron::universe(2)).unwrap();
///
/// let path = heuristic_dfs(&automaton, &[vec![0.9], vec![-1.2]]);
///
/// assert!(path.complete);
/// assert_eq!(path.locations, vec!["up", "down"]);
/// ```
pub fn heuristic_dfs<R: ConvexRegion>(automaton: &Automaton<R>, slopes: &[Vec<f64>]) -> HeuristicPath {
    if slopes.is_empty() {
        return HeuristicPath {
            locations: Vec::new(),
            complete: true,
        };
    }

    let all = automaton.locations().map(|location| location.name());
    let mut stack = ranked(automaton, all, &slopes[0])
        .into_iter()
        .rev()
        .map(|name| (0, name))
        .collect::<Vec<_>>();

    let mut path: Vec<&str> = Vec::with_capacity(slopes.len());
    let mut longest: Vec<&str> = Vec::new();

    while let Some((depth, name)) = stack.pop() {
        path.truncate(depth);
        path.push(name);

        if path.len() > longest.len() {
            longest = path.clone();
        }

        if path.len() == slopes.len() {
            return HeuristicPath {
                locations: path.into_iter().map(String::from).collect(),
                complete: true,
            };
        }

        let successors = automaton.successors(name).filter(|successor| *successor != name);
        let candidates = ranked(automaton, successors, &slopes[depth + 1]);

        stack.extend(candidates.into_iter().rev().map(|candidate| (depth + 1, candidate)));
    }

    HeuristicPath {
        locations: longest.into_iter().map(String::from).collect(),
        complete: false,
    }
}

/// Every walk through the automaton with exactly `edges` transitions.
pub fn unroll<R: ConvexRegion>(automaton: &Automaton<R>, edges: usize) -> Walks<'_, R> {
    automaton.walks(edges)
}

/// Paths tried when checking a function with `slopes.len()` pieces against an automaton.
///
/// The heuristic path comes first when it is complete. It is followed by every other walk of the
/// right length, unless the function has more than `max_path_length` pieces, in which case the
/// exhaustive enumeration is skipped.
pub fn candidate_paths<'a, R: ConvexRegion>(
    automaton: &'a Automaton<R>,
    slopes: &[Vec<f64>],
    max_path_length: usize,
) -> impl Iterator<Item = Vec<String>> + 'a {
    let pieces = slopes.len();
    let heuristic = heuristic_dfs(automaton, slopes);
    let first = if heuristic.complete {
        Some(heuristic.locations)
    } else {
        debug!(prefix = heuristic.locations.len(), pieces, "heuristic search found no full path");
        None
    };

    let walks = if pieces > 0 && pieces <= max_path_length {
        Either::Left(unroll(automaton, pieces - 1))
    } else {
        debug!(pieces, max_path_length, "skipping exhaustive path enumeration");
        Either::Right(std::iter::empty::<Vec<String>>())
    };

    let skip = first.clone();

    first
        .into_iter()
        .chain(walks.filter(move |walk| Some(walk) != skip.as_ref()))
}
