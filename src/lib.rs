#![deny(clippy::all)]

//! Identification of hybrid automata with constant-derivative dynamics from piecewise-linear
//! traces.
//!
//! An [`Automaton`] is checked against each [`PwlFunction`] of a dataset. Functions that are
//! already admitted leave it unchanged, otherwise the automaton is relaxed along an existing path
//! or adapted with new locations until the function is admitted. [`Synthesizer`] folds a whole
//! dataset this way.
//!
//! # Examples
//!
//! ```rust
//! use pwl_synth::{PwlFunction, SynthesisConfig, Synthesizer, TraceOrder};
//! use pwl_synth::region::Polyhedron;
//!
//! let traces = vec![
//!     PwlFunction::scalar(&[(0.0, 0.0), (1.0, 1.0), (2.0, 1.0)]).unwrap(),
//!     PwlFunction::scalar(&[(0.0, 1.0), (1.0, 1.0), (3.0, -1.0)]).unwrap(),
//! ];
//!
//! let synthesizer = Synthesizer::new(SynthesisConfig::new(0.5)).unwrap();
//! let automaton = synthesizer
//!     .synthesize::<Polyhedron>(&["x"], &traces, &TraceOrder::Sequential)
//!     .unwrap();
//!
//! assert_eq!(automaton.len(), 3);
//! ```

pub mod adaptation;
pub mod automaton;
pub mod config;
pub mod driver;
pub mod flow;
pub mod membership;
#[cfg(feature = "parser")]
pub mod parser;
pub mod rational;
pub mod region;
pub mod relaxation;
pub mod search;
pub mod trace;

pub use crate::adaptation::adapt;
pub use crate::automaton::{infer_clustered, infer_from_pwl, Automaton, Location};
pub use crate::config::SynthesisConfig;
pub use crate::driver::{StepOutcome, Synthesizer, TraceOrder};
pub use crate::flow::{tube, Flow, ReachPair, Tube};
pub use crate::membership::{membership, path_membership};
pub use crate::relaxation::relax_ha;
pub use crate::search::{heuristic_dfs, unroll};
pub use crate::trace::PwlFunction;
