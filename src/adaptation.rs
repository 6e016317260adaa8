//! Repairing an automaton so that it admits a new function.
//!
//! Adaptation walks the function breakpoint by breakpoint along a path of the automaton. When the
//! reach set of breakpoint `i` becomes empty the walk is repaired by changing the location of one
//! piece, starting with the failing piece and cascading towards the first one:
//!
//!   1. keep the location and lift only the invariant or guard checked at breakpoint `i`
//!   2. substitute an existing location whose flow is close enough to the slope of the piece
//!   3. use a location whose flow is exactly the slope of the piece, creating it if needed
//!
//! The first strategy keeps every other constraint of the automaton in force, except those of
//! transitions and locations the repaired path does not have yet. The other two fit the invariants
//! and guards of the whole repaired segment from the reach sets, since the segment now runs through
//! different locations.
//!
//! Each level of the cascade is a [`RepairFrame`] owning the reach sets it computed. The first
//! level that produces non-empty reach sets up to breakpoint `i` wins, its reach sets replace the
//! previous ones, and the walk resumes after `i`. A level where every strategy fails keeps the
//! exact-slope location for its piece, so the level below retries with exact flows on every piece
//! above it. With exact flows on every piece and no constraints, the first breakpoint always admits
//! the centre of the tube, which bounds the cascade.
//!
//! The repaired path is finally merged into a copy of the original automaton, widening or adding
//! only the locations and transitions the path uses.

use std::ops::RangeInclusive;

use thiserror::Error;
use tracing::debug;

use crate::automaton::{Automaton, AutomatonError};
use crate::flow::{advance, Flow, ReachPair, Step, Tube};
use crate::membership::{check_dimensions, membership, MembershipError};
use crate::rational::ConversionError;
use crate::region::ConvexRegion;
use crate::relaxation::widen_path;
use crate::search::heuristic_dfs;
use crate::trace::PwlFunction;

#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum AdaptationError {
    #[error("No repair admits the function at breakpoint {index}")]
    RepairExhausted { index: usize },

    #[error(transparent)]
    Membership(#[from] MembershipError),

    #[error(transparent)]
    Automaton(#[from] AutomatonError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// Result of adapting an automaton to a function.
#[derive(Clone, Debug)]
pub struct Adaptation<R> {
    /// The repaired automaton
    pub automaton: Automaton<R>,

    /// Location of every piece of the function
    pub path: Vec<String>,

    /// Locations added to the automaton, in creation order
    pub created: Vec<String>,

    /// Reach pairs of every breakpoint along `path`
    pub reach: Vec<ReachPair<R>>,
}

/// Way of reassigning the location of one piece.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Strategy {
    /// Keep the current location, lifting the constraint of the failing breakpoint
    Relax,

    /// Use an existing location with a similar flow
    Substitute(String),

    /// Use the location whose flow is exactly the slope of the piece
    Create(String),
}

impl Strategy {
    fn location<'a>(&'a self, current: Option<&'a str>) -> Option<&'a str> {
        match self {
            Self::Relax => current,
            Self::Substitute(name) | Self::Create(name) => Some(name),
        }
    }

    /// Breakpoints whose constraints are lifted when repairing `level..=failure`.
    fn lifted(&self, level: usize, failure: usize) -> RangeInclusive<usize> {
        match self {
            Self::Relax => failure..=failure,
            Self::Substitute(_) | Self::Create(_) => level..=failure,
        }
    }
}

/// Constraints used when computing the reach pair of one breakpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Constraints {
    /// Those of the scratch automaton, missing structure rejects everything
    Enforced,

    /// Those of the scratch automaton, missing structure accepts everything
    Fitted,

    /// None
    Lifted,
}

/// One level of the repair cascade.
#[derive(Clone, Debug)]
struct RepairFrame<R> {
    /// Index of the breakpoint whose location assignment is repaired
    level: usize,

    /// Strategies to try, in order
    strategies: Vec<Strategy>,

    /// Reach pairs from `level` to the failing breakpoint, set once a strategy succeeds
    reach: Vec<ReachPair<R>>,
}

struct Session<'a, R> {
    pwl: &'a PwlFunction,
    tube: &'a Tube<R>,
    trace: usize,
    pieces: usize,
    slopes: Vec<Vec<f64>>,
    flows: Vec<Flow>,
    scratch: Automaton<R>,
    fresh: Vec<(String, Flow)>,
    path: Vec<Option<String>>,
    history: Vec<ReachPair<R>>,
}

impl<'a, R> Session<'a, R>
where
    R: ConvexRegion,
{
    fn flow_of(&self, name: &str) -> Option<Flow> {
        self.scratch
            .location(name)
            .map(|location| location.flow().clone())
            .or_else(|| lookup(&self.fresh, name))
    }

    fn empty(&self) -> ReachPair<R> {
        ReachPair::single(R::empty(self.scratch.dim()))
    }

    /// Reach pair of `breakpoint` along `path`.
    fn step(
        &self,
        path: &[Option<String>],
        breakpoint: usize,
        previous: Option<&ReachPair<R>>,
        constraints: Constraints,
    ) -> Result<ReachPair<R>, ConversionError> {
        let universe = R::universe(self.scratch.dim());

        let invariant = |name: &Option<String>| -> Option<R> {
            let name = name.as_deref()?;

            match (constraints, self.scratch.location(name)) {
                (Constraints::Lifted, _) | (Constraints::Fitted, None) => Some(universe.clone()),
                (_, Some(location)) => Some(location.invariant().clone()),
                (Constraints::Enforced, None) => None,
            }
        };

        if breakpoint == 0 {
            return match invariant(&path[0]) {
                Some(invariant) => advance(self.pwl, self.tube, 0, None, Step::Start { invariant: &invariant }),
                None => Ok(self.empty()),
            };
        }

        if breakpoint == self.pieces {
            let last = &path[self.pieces - 1];
            let flow = last.as_deref().and_then(|name| self.flow_of(name));

            return match (flow, invariant(last)) {
                (Some(flow), Some(invariant)) => advance(
                    self.pwl,
                    self.tube,
                    breakpoint,
                    previous,
                    Step::Finish {
                        flow: &flow,
                        invariant: &invariant,
                    },
                ),
                _ => Ok(self.empty()),
            };
        }

        let (from, to) = match (&path[breakpoint - 1], &path[breakpoint]) {
            (Some(from), Some(to)) => (from.as_str(), to.as_str()),
            _ => return Ok(self.empty()),
        };

        let guard = match constraints {
            Constraints::Lifted => Some(universe.clone()),
            Constraints::Fitted => Some(self.scratch.guard(from, to).cloned().unwrap_or_else(|| universe.clone())),
            Constraints::Enforced => self.scratch.guard(from, to).cloned(),
        };

        match (self.flow_of(from), self.flow_of(to), guard) {
            (Some(current), Some(next), Some(guard)) => advance(
                self.pwl,
                self.tube,
                breakpoint,
                previous,
                Step::Switch {
                    from: &current,
                    to: &next,
                    guard: &guard,
                },
            ),
            _ => Ok(self.empty()),
        }
    }

    /// Existing location whose flow lies within `delta / duration` of the slope of `piece` in every
    /// variable, closest in the infinity norm.
    fn similar_location(&self, piece: usize) -> Option<String> {
        let slope = &self.slopes[piece];
        let window = self.scratch.delta() / self.pwl.duration(piece)?;
        let current = self.path[piece].as_deref();

        self.scratch
            .locations()
            .filter(|location| Some(location.name()) != current)
            .filter(|location| location.flow().deviations(slope).iter().all(|deviation| *deviation <= window))
            .fold(None, |best: Option<(f64, &str)>, location| {
                let distance = location.flow().distance(slope);
                match best {
                    Some((closest, _)) if closest <= distance => best,
                    _ => Some((distance, location.name())),
                }
            })
            .map(|(_, name)| name.to_string())
    }

    /// Location whose flow is exactly the rounded slope of `piece`, allocating a fresh name when no
    /// such location exists yet.
    fn exact_location(&mut self, piece: usize) -> String {
        let flow = &self.flows[piece];

        if let Some(existing) = self.scratch.find_flow(flow) {
            return existing.to_string();
        }

        if let Some((existing, _)) = self.fresh.iter().find(|(_, candidate)| candidate == flow) {
            return existing.clone();
        }

        let base = format!("loc{}_{}", piece, self.trace);
        let taken = |name: &str| self.scratch.contains_location(name) || lookup(&self.fresh, name).is_some();

        let mut name = base.clone();
        let mut counter = 0;
        while taken(&name) {
            counter += 1;
            name = format!("{base}_{counter}");
        }

        let flow = flow.clone();
        self.fresh.push((name.clone(), flow));
        name
    }

    fn open_frame(&mut self, level: usize) -> (RepairFrame<R>, Option<String>) {
        let mut strategies = Vec::new();
        let current = self.path.get(level).cloned().flatten();

        if level == self.pieces || current.is_some() {
            strategies.push(Strategy::Relax);
        }

        if level == self.pieces {
            let frame = RepairFrame {
                level,
                strategies,
                reach: Vec::new(),
            };
            return (frame, None);
        }

        let substitute = self.similar_location(level);
        if let Some(substitute) = &substitute {
            strategies.push(Strategy::Substitute(substitute.clone()));
        }

        let exact = self.exact_location(level);
        if current.as_ref() != Some(&exact) && substitute.as_ref() != Some(&exact) {
            strategies.push(Strategy::Create(exact.clone()));
        }

        let frame = RepairFrame {
            level,
            strategies,
            reach: Vec::new(),
        };

        (frame, Some(exact))
    }

    /// Recompute the reach pairs of breakpoints `level..=failure` with `location` assigned to piece
    /// `level`, ignoring the constraints of the `lifted` breakpoints.
    fn attempt(
        &self,
        level: usize,
        failure: usize,
        location: Option<&str>,
        lifted: RangeInclusive<usize>,
    ) -> Result<Option<(Vec<Option<String>>, Vec<ReachPair<R>>)>, ConversionError> {
        let mut trial = self.path.clone();
        if level < self.pieces {
            trial[level] = location.map(String::from);
        }

        let mut pairs: Vec<ReachPair<R>> = Vec::with_capacity(failure + 1 - level);

        for breakpoint in level..=failure {
            let previous = match pairs.last() {
                Some(pair) => Some(pair),
                None if breakpoint > 0 => self.history.get(breakpoint - 1),
                None => None,
            };

            let constraints = if lifted.contains(&breakpoint) {
                Constraints::Lifted
            } else {
                Constraints::Fitted
            };

            let pair = self.step(&trial, breakpoint, previous, constraints)?;
            if pair.is_empty() {
                return Ok(None);
            }

            pairs.push(pair);
        }

        Ok(Some((trial, pairs)))
    }

    fn resolved_path(&self, len: usize) -> Result<Vec<String>, AutomatonError> {
        self.path
            .iter()
            .take(len)
            .enumerate()
            .map(|(piece, name)| {
                name.clone()
                    .ok_or_else(|| AutomatonError::UnknownLocation(format!("<unresolved piece {piece}>")))
            })
            .collect()
    }

    fn pieces_touched(&self, level: usize, failure: usize) -> RangeInclusive<usize> {
        let last = self.pieces - 1;
        level.min(last)..=failure.min(last)
    }

    /// Repair the walk after the reach set of `failure` came out empty.
    fn repair(&mut self, failure: usize) -> Result<(), AdaptationError> {
        let mut frames: Vec<RepairFrame<R>> = Vec::new();
        let mut level = failure;

        loop {
            let (mut frame, exact) = self.open_frame(level);
            let current = self.path.get(level).cloned().flatten();
            let strategies = frame.strategies.clone();

            for strategy in &strategies {
                debug!(level, failure, ?strategy, "trying repair");

                let location = strategy.location(current.as_deref());
                let lifted = strategy.lifted(level, failure);
                let (trial, pairs) = match self.attempt(level, failure, location, lifted)? {
                    Some(found) => found,
                    None => continue,
                };

                debug!(level = frame.level, failure, depth = frames.len(), ?strategy, "repair succeeded");

                self.path = trial;
                frame.reach = pairs;
                self.history.truncate(level);
                self.history.extend(frame.reach.iter().cloned());

                let touched = self.pieces_touched(level, failure);
                let path = self.resolved_path(touched.end() + 1)?;
                let fresh = &self.fresh;
                widen_path(
                    &mut self.scratch,
                    &path,
                    &self.history,
                    *touched.start()..touched.end() + 1,
                    |name| lookup(fresh, name),
                )?;

                return Ok(());
            }

            if let Some(exact) = exact {
                self.path[level] = Some(exact);
            }

            frames.push(frame);

            if level == 0 {
                debug!(failure, depth = frames.len(), "repair cascade exhausted");
                return Err(AdaptationError::RepairExhausted { index: failure });
            }

            level -= 1;
        }
    }

    fn walk(&mut self) -> Result<(), AdaptationError> {
        let mut breakpoint = 0;

        while breakpoint <= self.pieces {
            let previous = breakpoint.checked_sub(1).and_then(|index| self.history.get(index));
            let pair = self.step(&self.path, breakpoint, previous, Constraints::Enforced)?;

            if pair.is_empty() {
                debug!(breakpoint, "empty reach set, repairing");
                self.repair(breakpoint)?;
            } else {
                self.history.push(pair);
            }

            breakpoint += 1;
        }

        Ok(())
    }
}

fn lookup(fresh: &[(String, Flow)], name: &str) -> Option<Flow> {
    fresh
        .iter()
        .find(|(candidate, _)| candidate == name)
        .map(|(_, flow)| flow.clone())
}

/// Adapt an automaton so that it admits a piecewise-linear function.
///
/// `trace` is the index of the function in its dataset and is used to name created locations
/// `loc{piece}_{trace}`. The automaton is returned unchanged when the function is already a member.
pub fn adapt<R: ConvexRegion>(
    automaton: &Automaton<R>,
    pwl: &PwlFunction,
    tube: &Tube<R>,
    trace: usize,
    max_path_length: usize,
) -> Result<Adaptation<R>, AdaptationError> {
    automaton.validate()?;
    check_dimensions(automaton, pwl)?;

    if let Some(report) = membership(automaton, pwl, tube, max_path_length)? {
        return Ok(Adaptation {
            automaton: automaton.clone(),
            path: report.path,
            created: Vec::new(),
            reach: report.reach,
        });
    }

    let pieces = pwl.pieces();
    let slopes = pwl.raw_slopes();
    let heuristic = heuristic_dfs(automaton, &slopes);

    let mut path = heuristic.locations.into_iter().map(Some).collect::<Vec<_>>();
    path.resize(pieces, None);

    let mut session = Session {
        pwl,
        tube,
        trace,
        pieces,
        flows: pwl.slopes()?,
        slopes,
        scratch: automaton.clone(),
        fresh: Vec::new(),
        path,
        history: Vec::with_capacity(pieces + 1),
    };

    session.walk()?;

    let path = session.resolved_path(pieces)?;
    let mut result = automaton.clone();
    let scratch = &session.scratch;
    let fresh = &session.fresh;

    widen_path(&mut result, &path, &session.history, 0..pieces, |name| {
        scratch
            .location(name)
            .map(|location| location.flow().clone())
            .or_else(|| lookup(fresh, name))
    })?;

    let mut created: Vec<String> = Vec::new();
    for name in &path {
        if !automaton.contains_location(name) && !created.contains(name) {
            created.push(name.clone());
        }
    }

    debug!(?path, ?created, "adaptation finished");

    Ok(Adaptation {
        automaton: result,
        path,
        created,
        reach: session.history,
    })
}
