//! Hybrid automata with constant-slope dynamics.
//!
//! An [`Automaton`] is a directed graph whose nodes are [`Location`]s (modes) and whose edges carry
//! the guard of the transition between two modes. Every location has a [`Flow`] and an invariant,
//! and the automaton carries the tolerance `delta` used when checking traces against it.
//!
//! Invariants and guards are stored with the time coordinate unconstrained. They only ever grow:
//! the widening operations replace a region by its hull with another region. A location is only
//! removed when [`Automaton::fold_duplicate_flows`] folds it into an earlier location with the same
//! flow.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use thiserror::Error;

use crate::flow::Flow;
use crate::rational::ConversionError;
use crate::region::ConvexRegion;

pub mod inference;

pub use inference::{infer_clustered, infer_from_pwl};

/// The error type for structural violations of an automaton.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum AutomatonError {
    #[error("Unknown location {0}")]
    UnknownLocation(String),

    #[error("Unknown transition from {from} to {to}")]
    UnknownTransition { from: String, to: String },

    #[error("Location {0} already exists")]
    DuplicateLocation(String),

    #[error("Transition from {from} to {to} already exists")]
    DuplicateTransition { from: String, to: String },

    #[error("Location {name} has dimension {found}, expected {expected}")]
    DimensionMismatch { name: String, expected: usize, found: usize },

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// Discrete mode of an automaton.
#[derive(Clone, Debug)]
pub struct Location<R> {
    name: String,
    flow: Flow,
    invariant: R,
}

impl<R> Location<R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    pub fn invariant(&self) -> &R {
        &self.invariant
    }
}

#[derive(Clone, Debug)]
pub struct Automaton<R> {
    variables: Vec<String>,
    delta: f64,
    locations: Vec<Location<R>>,
    indices: HashMap<String, usize>,
    graph: DiGraphMap<usize, R>,
}

impl<R> Automaton<R>
where
    R: ConvexRegion,
{
    /// Create an automaton without locations over the given variables.
    ///
    /// # Example
    ///
    /// ```rust
    /// use pwl_synth::automaton::Automaton;
    /// use pwl_synth::region::Polyhedron;
    ///
    /// let automaton = Automaton::<Polyhedron>::new(["x", "y"], 0.5);
    /// assert_eq!(automaton.dim(), 3);
    /// ```
    pub fn new<I, S>(variables: I, delta: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            variables: variables.into_iter().map(Into::into).collect(),
            delta,
            locations: Vec::new(),
            indices: HashMap::new(),
            graph: DiGraphMap::new(),
        }
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Names of every coordinate of a region, starting with time
    pub fn coordinate_names(&self) -> Vec<&str> {
        std::iter::once("t")
            .chain(self.variables.iter().map(String::as_str))
            .collect()
    }

    /// Dimension of the regions of this automaton, one more than the number of variables
    pub fn dim(&self) -> usize {
        self.variables.len() + 1
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn set_delta(&mut self, delta: f64) {
        self.delta = delta;
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    fn index(&self, name: &str) -> Result<usize, AutomatonError> {
        self.indices
            .get(name)
            .copied()
            .ok_or_else(|| AutomatonError::UnknownLocation(name.to_string()))
    }

    fn check_dim(&self, name: &str, found: usize) -> Result<(), AutomatonError> {
        if found != self.dim() {
            return Err(AutomatonError::DimensionMismatch {
                name: name.to_string(),
                expected: self.dim(),
                found,
            });
        }

        Ok(())
    }

    /// Add a location, storing its invariant with time unconstrained.
    pub fn add_location<S>(&mut self, name: S, flow: Flow, invariant: R) -> Result<(), AutomatonError>
    where
        S: Into<String>,
    {
        let name = name.into();

        if self.indices.contains_key(&name) {
            return Err(AutomatonError::DuplicateLocation(name));
        }

        self.check_dim(&name, flow.dim() + 1)?;
        self.check_dim(&name, invariant.dim())?;

        let index = self.locations.len();
        self.graph.add_node(index);
        self.indices.insert(name.clone(), index);
        self.locations.push(Location {
            name,
            flow,
            invariant: invariant.without_time(),
        });

        Ok(())
    }

    /// Add a transition, storing its guard with time unconstrained.
    pub fn add_transition(&mut self, from: &str, to: &str, guard: R) -> Result<(), AutomatonError> {
        let source = self.index(from)?;
        let target = self.index(to)?;

        if self.graph.contains_edge(source, target) {
            return Err(AutomatonError::DuplicateTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        self.check_dim(from, guard.dim())?;
        self.graph.add_edge(source, target, guard.without_time());

        Ok(())
    }

    pub fn location(&self, name: &str) -> Option<&Location<R>> {
        self.indices.get(name).map(|index| &self.locations[*index])
    }

    pub fn contains_location(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    /// Locations in insertion order
    pub fn locations(&self) -> std::slice::Iter<'_, Location<R>> {
        self.locations.iter()
    }

    pub fn guard(&self, from: &str, to: &str) -> Option<&R> {
        let source = self.indices.get(from)?;
        let target = self.indices.get(to)?;

        self.graph.edge_weight(*source, *target)
    }

    pub fn has_transition(&self, from: &str, to: &str) -> bool {
        self.guard(from, to).is_some()
    }

    /// Every transition as `(from, to, guard)`, in insertion order
    pub fn transitions(&self) -> impl Iterator<Item = (&str, &str, &R)> + '_ {
        self.graph.all_edges().map(move |(source, target, guard)| {
            (
                self.locations[source].name.as_str(),
                self.locations[target].name.as_str(),
                guard,
            )
        })
    }

    pub fn transition_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Targets of the transitions leaving a location, in transition insertion order
    pub fn successors<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        let index = self.indices.get(name).copied();

        index
            .into_iter()
            .flat_map(move |index| self.graph.neighbors_directed(index, Direction::Outgoing))
            .map(move |target| self.locations[target].name.as_str())
    }

    /// First location, in insertion order, whose flow is exactly `flow`
    pub fn find_flow(&self, flow: &Flow) -> Option<&str> {
        self.locations
            .iter()
            .find(|location| &location.flow == flow)
            .map(|location| location.name.as_str())
    }

    /// Replace the invariant of a location by its hull with `region`.
    pub fn widen_invariant(&mut self, name: &str, region: &R) -> Result<(), AutomatonError> {
        let index = self.index(name)?;
        self.check_dim(name, region.dim())?;

        let location = &mut self.locations[index];
        location.invariant = location.invariant.hull(&region.without_time());

        Ok(())
    }

    /// Replace the guard of a transition by its hull with `region`, adding the transition if it
    /// does not exist.
    pub fn widen_guard(&mut self, from: &str, to: &str, region: &R) -> Result<(), AutomatonError> {
        let source = self.index(from)?;
        let target = self.index(to)?;
        self.check_dim(from, region.dim())?;

        let region = region.without_time();

        match self.graph.edge_weight_mut(source, target) {
            Some(guard) => *guard = guard.hull(&region),
            None => {
                self.graph.add_edge(source, target, region);
            }
        }

        Ok(())
    }

    /// Copy of the automaton where every invariant and guard is the whole space.
    pub fn relaxed(&self) -> Self {
        let mut relaxed = self.clone();
        let dim = self.dim();

        for location in relaxed.locations.iter_mut() {
            location.invariant = R::universe(dim);
        }

        for (_, _, guard) in relaxed.graph.all_edges_mut() {
            *guard = R::universe(dim);
        }

        relaxed
    }

    /// Name derived from `base` that no location uses yet.
    ///
    /// `base` itself is returned when it is free, otherwise the first free `base_n` with `n >= 1`.
    pub fn fresh_name(&self, base: &str) -> String {
        if !self.contains_location(base) {
            return base.to_string();
        }

        (1..)
            .map(|counter: usize| format!("{base}_{counter}"))
            .find(|name| !self.contains_location(name))
            .unwrap_or_else(|| base.to_string())
    }

    /// Check that every location and transition matches the dimension of the automaton.
    pub fn validate(&self) -> Result<(), AutomatonError> {
        for location in &self.locations {
            self.check_dim(&location.name, location.flow.dim() + 1)?;
            self.check_dim(&location.name, location.invariant.dim())?;
        }

        for (from, _, guard) in self.transitions() {
            self.check_dim(from, guard.dim())?;
        }

        Ok(())
    }

    /// Fold the locations and transitions of `other` into this automaton.
    ///
    /// A location of `other` whose flow is identical to the flow of an existing location is folded
    /// into it and their invariants are hulled. Any other location is added under a fresh `Q{k}`
    /// name. Transitions follow the renaming and guards are hulled when both automata have the same
    /// transition. Transitions that become self loops through folding are dropped.
    pub fn merge(&mut self, other: &Self) -> Result<(), AutomatonError> {
        let mut renaming: HashMap<&str, String> = HashMap::new();

        for location in other.locations() {
            let target = match self.find_flow(&location.flow) {
                Some(existing) => existing.to_string(),
                None => {
                    let name = self.fresh_name(&format!("Q{}", self.len()));
                    self.add_location(name.clone(), location.flow.clone(), R::empty(self.dim()))?;
                    name
                }
            };

            self.widen_invariant(&target, &location.invariant)?;
            renaming.insert(location.name(), target);
        }

        for (from, to, guard) in other.transitions() {
            let source = renaming.get(from).ok_or_else(|| AutomatonError::UnknownLocation(from.to_string()))?;
            let target = renaming.get(to).ok_or_else(|| AutomatonError::UnknownLocation(to.to_string()))?;

            if source == target && from != to {
                continue;
            }

            self.widen_guard(source, target, guard)?;
        }

        Ok(())
    }
}

impl<R> Automaton<R>
where
    R: ConvexRegion,
{
    /// Fold every location into the first location, in insertion order, that has the same flow.
    ///
    /// The invariant of the kept location becomes the hull of the folded invariants, transitions
    /// are redirected with their guards hulled, and transitions between two folded locations become
    /// self loops. Returns the names of the removed locations.
    pub fn fold_duplicate_flows(&mut self) -> Result<Vec<String>, AutomatonError> {
        let mut folded = Automaton::new(self.variables.iter().cloned(), self.delta);
        let mut renaming: HashMap<&str, String> = HashMap::new();
        let mut removed = Vec::new();

        for location in &self.locations {
            let target = match folded.find_flow(&location.flow) {
                Some(existing) => existing.to_string(),
                None => {
                    folded.add_location(location.name.clone(), location.flow.clone(), R::empty(self.dim()))?;
                    location.name.clone()
                }
            };

            if target != location.name {
                removed.push(location.name.clone());
            }

            folded.widen_invariant(&target, &location.invariant)?;
            renaming.insert(location.name(), target);
        }

        if removed.is_empty() {
            return Ok(removed);
        }

        for (from, to, guard) in self.transitions() {
            let source = renaming.get(from).ok_or_else(|| AutomatonError::UnknownLocation(from.to_string()))?;
            let target = renaming.get(to).ok_or_else(|| AutomatonError::UnknownLocation(to.to_string()))?;

            folded.widen_guard(source, target, guard)?;
        }

        *self = folded;

        Ok(removed)
    }
}

impl<R> PartialEq for Automaton<R>
where
    R: ConvexRegion,
{
    /// Two automata are equal when they have the same variables, tolerance, locations and
    /// transitions, with invariants and guards compared as sets.
    fn eq(&self, other: &Self) -> bool {
        if self.variables != other.variables
            || self.delta != other.delta
            || self.len() != other.len()
            || self.transition_count() != other.transition_count()
        {
            return false;
        }

        let same_locations = self.locations.iter().all(|location| match other.location(&location.name) {
            Some(theirs) => location.flow == theirs.flow && location.invariant.same_set(&theirs.invariant),
            None => false,
        });

        same_locations
            && self.transitions().all(|(from, to, guard)| match other.guard(from, to) {
                Some(theirs) => guard.same_set(theirs),
                None => false,
            })
    }
}

impl<R> Display for Automaton<R>
where
    R: ConvexRegion,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names = self.coordinate_names();
        let variables = self.variables.join(", ");

        writeln!(f, "variables: {variables}")?;
        writeln!(f, "delta: {}", self.delta)?;

        for location in &self.locations {
            writeln!(
                f,
                "location {} {{ flow: {}; invariant: {} }}",
                location.name,
                location.flow.render(&self.variables.iter().map(String::as_str).collect::<Vec<_>>()),
                location.invariant.render(&names)
            )?;
        }

        for (from, to, guard) in self.transitions() {
            writeln!(f, "transition {} -> {} {{ guard: {} }}", from, to, guard.render(&names))?;
        }

        Ok(())
    }
}

/// Every walk through an automaton made of a fixed number of transitions.
///
/// Walks are produced lazily in depth-first order, starting from every location in insertion order
/// and following transitions in insertion order.
pub struct Walks<'a, R> {
    automaton: &'a Automaton<R>,
    edges: usize,
    stack: Vec<Vec<usize>>,
}

impl<'a, R> Iterator for Walks<'a, R>
where
    R: ConvexRegion,
{
    type Item = Vec<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(walk) = self.stack.pop() {
            if walk.len() == self.edges + 1 {
                let names = walk
                    .iter()
                    .map(|index| self.automaton.locations[*index].name.clone())
                    .collect();

                return Some(names);
            }

            let last = *walk.last()?;
            let successors = self
                .automaton
                .graph
                .neighbors_directed(last, Direction::Outgoing)
                .collect::<Vec<_>>();

            for successor in successors.into_iter().rev() {
                let mut extended = walk.clone();
                extended.push(successor);
                self.stack.push(extended);
            }
        }

        None
    }
}

impl<R> Automaton<R>
where
    R: ConvexRegion,
{
    /// Enumerate every walk with exactly `edges` transitions.
    pub fn walks(&self, edges: usize) -> Walks<'_, R> {
        Walks {
            automaton: self,
            edges,
            stack: (0..self.locations.len()).rev().map(|index| vec![index]).collect(),
        }
    }
}
