//! Deciding if a piecewise-linear function is a member of an automaton.
//!
//! A function is a member when some path through the automaton, one location per piece, has a
//! non-empty reach set at every breakpoint. [`path_membership`] checks a single path and reports
//! where it fails, which is the information relaxation and adaptation work from.

use thiserror::Error;
use tracing::debug;

use crate::automaton::{Automaton, AutomatonError};
use crate::flow::{advance, ReachPair, Step, Tube};
use crate::rational::ConversionError;
use crate::region::ConvexRegion;
use crate::search::candidate_paths;
use crate::trace::PwlFunction;

#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum MembershipError {
    #[error("Path has {found} locations but the function has {expected} pieces")]
    PathLength { expected: usize, found: usize },

    #[error("Function has {found} variables but the automaton has {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error(transparent)]
    Automaton(#[from] AutomatonError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// Outcome of checking one path.
#[derive(Clone, Debug)]
pub struct MembershipReport<R> {
    /// Location of every piece
    pub path: Vec<String>,

    /// Reach pairs of every breakpoint up to and including the failing one
    pub reach: Vec<ReachPair<R>>,

    /// First breakpoint with an empty reach set
    pub failure: Option<usize>,
}

impl<R> MembershipReport<R> {
    pub fn accepted(&self) -> bool {
        self.failure.is_none()
    }
}

pub(crate) fn check_dimensions<R: ConvexRegion>(automaton: &Automaton<R>, pwl: &PwlFunction) -> Result<(), MembershipError> {
    if automaton.variables().len() != pwl.dim() {
        return Err(MembershipError::DimensionMismatch {
            expected: automaton.variables().len(),
            found: pwl.dim(),
        });
    }

    Ok(())
}

/// Compute the reach sets of a function along one path of the automaton.
///
/// The path must hold one location per piece of the function. Invariants restrict the first and
/// last breakpoints and guards restrict every switch. A missing transition between two consecutive
/// locations fails the path at the breakpoint where the switch would happen.
pub fn path_membership<R, S>(
    automaton: &Automaton<R>,
    path: &[S],
    pwl: &PwlFunction,
    tube: &Tube<R>,
) -> Result<MembershipReport<R>, MembershipError>
where
    R: ConvexRegion,
    S: AsRef<str>,
{
    check_dimensions(automaton, pwl)?;

    let pieces = pwl.pieces();
    if path.len() != pieces {
        return Err(MembershipError::PathLength {
            expected: pieces,
            found: path.len(),
        });
    }

    let locations = path
        .iter()
        .map(|name| {
            automaton
                .location(name.as_ref())
                .ok_or_else(|| AutomatonError::UnknownLocation(name.as_ref().to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut report = MembershipReport {
        path: path.iter().map(|name| name.as_ref().to_string()).collect(),
        reach: Vec::with_capacity(pieces + 1),
        failure: None,
    };

    for index in 0..=pieces {
        let pair = if index == 0 {
            let step = Step::Start {
                invariant: locations[0].invariant(),
            };
            advance(pwl, tube, index, None, step)?
        } else if index == pieces {
            let last = locations[pieces - 1];
            let step = Step::Finish {
                flow: last.flow(),
                invariant: last.invariant(),
            };
            advance(pwl, tube, index, report.reach.last(), step)?
        } else {
            let (from, to) = (locations[index - 1], locations[index]);

            match automaton.guard(from.name(), to.name()) {
                Some(guard) => {
                    let step = Step::Switch {
                        from: from.flow(),
                        to: to.flow(),
                        guard,
                    };
                    advance(pwl, tube, index, report.reach.last(), step)?
                }
                None => ReachPair::single(R::empty(automaton.dim())),
            }
        };

        let empty = pair.is_empty();
        report.reach.push(pair);

        if empty {
            report.failure = Some(index);
            break;
        }
    }

    Ok(report)
}

/// Find the first candidate path along which the function is a member of the automaton.
///
/// Candidates are the heuristic path followed by every walk of the right length when the function
/// has at most `max_path_length` pieces.
pub fn membership<R: ConvexRegion>(
    automaton: &Automaton<R>,
    pwl: &PwlFunction,
    tube: &Tube<R>,
    max_path_length: usize,
) -> Result<Option<MembershipReport<R>>, MembershipError> {
    check_dimensions(automaton, pwl)?;

    for path in candidate_paths(automaton, &pwl.raw_slopes(), max_path_length) {
        let report = path_membership(automaton, &path, pwl, tube)?;

        if report.accepted() {
            return Ok(Some(report));
        }

        debug!(path = ?report.path, failure = ?report.failure, "path rejected");
    }

    Ok(None)
}
