//! Folding a dataset of functions into one automaton.
//!
//! Every function goes through the same pipeline: if it is a member of the automaton nothing
//! changes, otherwise the constraints of an existing path are relaxed, and when no path can be
//! relaxed the automaton is adapted with new locations. Locations sharing a flow are then folded
//! together. Each step works on the automaton produced
//! by the previous one, so the result depends on the order in which the functions are processed.
//! That order is always given explicitly as a [`TraceOrder`].

use thiserror::Error;
use tracing::{debug, info};

use crate::adaptation::{adapt, AdaptationError};
use crate::automaton::{infer_clustered, Automaton, AutomatonError};
use crate::config::{ConfigError, SynthesisConfig};
use crate::flow::tube;
use crate::membership::{membership, MembershipError};
use crate::rational::ConversionError;
use crate::region::ConvexRegion;
use crate::relaxation::relax_ha;
use crate::trace::{PwlExtractor, PwlFunction, RamerDouglasPeucker, TraceError};

#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum SynthesisError {
    #[error("Trace order {order:?} is not a permutation of {len} traces")]
    InvalidOrder { order: Vec<usize>, len: usize },

    #[error("No traces to synthesize from")]
    NoTraces,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error(transparent)]
    Automaton(#[from] AutomatonError),

    #[error(transparent)]
    Membership(#[from] MembershipError),

    #[error(transparent)]
    Adaptation(#[from] AdaptationError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// Order in which the functions of a dataset are folded into the automaton.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TraceOrder {
    /// First to last
    #[default]
    Sequential,

    /// Last to first
    Reversed,

    /// The given permutation of the dataset indices
    Explicit(Vec<usize>),
}

impl TraceOrder {
    /// Dataset indices in processing order for a dataset of `len` functions.
    pub fn indices(&self, len: usize) -> Result<Vec<usize>, SynthesisError> {
        match self {
            Self::Sequential => Ok((0..len).collect()),
            Self::Reversed => Ok((0..len).rev().collect()),
            Self::Explicit(order) => {
                let mut seen = vec![false; len];

                for index in order {
                    match seen.get_mut(*index) {
                        Some(flag) if !*flag => *flag = true,
                        _ => {
                            return Err(SynthesisError::InvalidOrder {
                                order: order.clone(),
                                len,
                            })
                        }
                    }
                }

                if order.len() != len {
                    return Err(SynthesisError::InvalidOrder {
                        order: order.clone(),
                        len,
                    });
                }

                Ok(order.clone())
            }
        }
    }
}

/// What processing one function did to the automaton.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The function was already a member
    Member,

    /// The constraints along an existing path were widened
    Relaxed,

    /// New locations or transitions were needed
    Adapted { created: Vec<String> },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Synthesizer {
    config: SynthesisConfig,
}

impl Synthesizer {
    /// Create a synthesizer, checking that the tolerances of the configuration decompose.
    pub fn new(config: SynthesisConfig) -> Result<Self, SynthesisError> {
        config.delta_fh()?;
        config.clustering_bandwidth()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Extractor approximating signals within the configured `pwl_epsilon`.
    pub fn extractor(&self) -> RamerDouglasPeucker {
        RamerDouglasPeucker {
            epsilon: self.config.pwl_epsilon(),
        }
    }

    /// Process one function, returning the updated automaton.
    ///
    /// `trace` is the index of the function in its dataset and only affects the names of created
    /// locations. Whatever the outcome, locations with identical flows are folded together before
    /// the automaton is returned.
    pub fn process<R: ConvexRegion>(
        &self,
        mut automaton: Automaton<R>,
        pwl: &PwlFunction,
        trace: usize,
    ) -> Result<(Automaton<R>, StepOutcome), SynthesisError> {
        let delta_fh = self.config.delta_fh()?;
        let max_path_length = self.config.max_path_length;

        automaton.set_delta(self.config.delta_ha);
        automaton.validate()?;

        let tube = tube::<R>(pwl, delta_fh)?;

        let (mut automaton, outcome) = if membership(&automaton, pwl, &tube, max_path_length)?.is_some() {
            (automaton, StepOutcome::Member)
        } else if let Some(relaxed) = relax_ha(&automaton, pwl, &tube, max_path_length)? {
            (relaxed, StepOutcome::Relaxed)
        } else {
            let adaptation = adapt(&automaton, pwl, &tube, trace, max_path_length)?;
            let outcome = StepOutcome::Adapted {
                created: adaptation.created,
            };

            (adaptation.automaton, outcome)
        };

        let folded = automaton.fold_duplicate_flows()?;
        if !folded.is_empty() {
            debug!(trace, ?folded, "folded locations with identical flows");
        }

        Ok((automaton, outcome))
    }

    /// Fold a dataset of piecewise-linear functions into an automaton.
    pub fn run<R: ConvexRegion>(
        &self,
        automaton: Automaton<R>,
        traces: &[PwlFunction],
        order: &TraceOrder,
    ) -> Result<Automaton<R>, SynthesisError> {
        let mut automaton = automaton;

        for index in order.indices(traces.len())? {
            let (updated, outcome) = self.process(automaton, &traces[index], index)?;

            info!(
                trace = index,
                ?outcome,
                locations = updated.len(),
                transitions = updated.transition_count(),
                "processed trace"
            );

            automaton = updated;
        }

        Ok(automaton)
    }

    /// Approximate raw signals with `extractor`, then fold them into an automaton.
    pub fn run_signals<R, E>(
        &self,
        automaton: Automaton<R>,
        signals: &[PwlFunction],
        order: &TraceOrder,
        extractor: &E,
    ) -> Result<Automaton<R>, SynthesisError>
    where
        R: ConvexRegion,
        E: PwlExtractor,
        SynthesisError: From<E::Error>,
    {
        let traces = signals
            .iter()
            .map(|signal| extractor.extract(signal))
            .collect::<Result<Vec<_>, _>>()?;

        self.run(automaton, &traces, order)
    }

    /// Seed an automaton from the first function in `order`, grouping its slopes with the configured
    /// `clustering_bandwidth`, then fold the whole dataset into it.
    pub fn synthesize<R: ConvexRegion>(
        &self,
        variables: &[&str],
        traces: &[PwlFunction],
        order: &TraceOrder,
    ) -> Result<Automaton<R>, SynthesisError> {
        let indices = order.indices(traces.len())?;
        let first = indices.first().ok_or(SynthesisError::NoTraces)?;

        let seed = infer_clustered(
            &traces[*first],
            variables,
            self.config.delta_ha,
            self.config.delta_fh()?,
            self.config.clustering_bandwidth()?,
        )?;

        self.run(seed, traces, &TraceOrder::Explicit(indices))
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::{StepOutcome, SynthesisError, Synthesizer, TraceOrder};
    use crate::automaton::Automaton;
    use crate::config::SynthesisConfig;
    use crate::flow::{tube, Flow};
    use crate::membership::membership;
    use crate::region::{ConvexRegion, LinearConstraint, Polyhedron};
    use crate::trace::PwlFunction;

    type TestResult = Result<(), Box<dyn Error>>;

    fn band(low: f64, high: f64) -> Result<Polyhedron, Box<dyn Error>> {
        Ok(Polyhedron::from_constraints(
            2,
            [
                LinearConstraint::greater_eq(&[0.0, 1.0], low)?,
                LinearConstraint::less_eq(&[0.0, 1.0], high)?,
            ],
        ))
    }

    #[test]
    fn trace_orders() -> TestResult {
        assert_eq!(TraceOrder::Sequential.indices(3)?, vec![0, 1, 2]);
        assert_eq!(TraceOrder::Reversed.indices(3)?, vec![2, 1, 0]);
        assert_eq!(TraceOrder::Explicit(vec![1, 2, 0]).indices(3)?, vec![1, 2, 0]);

        assert!(matches!(
            TraceOrder::Explicit(vec![0, 0, 1]).indices(3),
            Err(SynthesisError::InvalidOrder { len: 3, .. })
        ));
        assert!(TraceOrder::Explicit(vec![0, 1]).indices(3).is_err());
        assert!(TraceOrder::Explicit(vec![0, 1, 3]).indices(3).is_err());

        Ok(())
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let config = SynthesisConfig {
            pwl_epsilon: Some(2.0),
            ..SynthesisConfig::default()
        };

        assert!(matches!(Synthesizer::new(config), Err(SynthesisError::Config(_))));

        let config = SynthesisConfig {
            clustering_bandwidth: Some(f64::NAN),
            ..SynthesisConfig::default()
        };

        assert!(matches!(Synthesizer::new(config), Err(SynthesisError::Config(_))));
    }

    #[test]
    fn outcomes_follow_the_pipeline() -> TestResult {
        let synthesizer = Synthesizer::new(SynthesisConfig::new(0.2))?;
        let automaton = Automaton::<Polyhedron>::new(["x"], 0.2);
        let pwl = PwlFunction::scalar(&[(0.0, 0.0), (1.0, 1.0), (2.0, 1.0)])?;

        let (automaton, outcome) = synthesizer.process(automaton, &pwl, 0)?;
        assert_eq!(
            outcome,
            StepOutcome::Adapted {
                created: vec!["loc0_0".to_string(), "loc1_0".to_string()]
            }
        );

        let (automaton, outcome) = synthesizer.process(automaton, &pwl, 1)?;
        assert_eq!(outcome, StepOutcome::Member);

        let shifted = PwlFunction::scalar(&[(0.0, 0.5), (1.0, 1.5), (2.0, 1.5)])?;
        let (automaton, outcome) = synthesizer.process(automaton, &shifted, 2)?;
        assert_eq!(outcome, StepOutcome::Relaxed);

        let tube = tube(&shifted, 0.1)?;
        assert!(membership(&automaton, &shifted, &tube, 8)?.is_some());

        Ok(())
    }

    #[test]
    fn identical_flows_end_up_in_one_location() -> TestResult {
        let mut automaton = Automaton::new(["x"], 0.2);
        automaton.add_location("up", Flow::new(vec![1.0])?, band(-10.0, 10.0)?)?;
        automaton.add_location("down", Flow::new(vec![-1.0])?, band(-10.0, 10.0)?)?;
        automaton.add_location("again", Flow::new(vec![1.0])?, band(20.0, 30.0)?)?;
        automaton.add_transition("up", "down", band(-10.0, 10.0)?)?;
        automaton.add_transition("down", "again", band(-10.0, 10.0)?)?;

        let synthesizer = Synthesizer::new(SynthesisConfig::new(0.2))?;
        let pwl = PwlFunction::scalar(&[(0.0, 0.0), (1.0, 1.0), (2.0, 0.0)])?;
        let (automaton, outcome) = synthesizer.process(automaton, &pwl, 0)?;

        assert_eq!(outcome, StepOutcome::Member);
        assert_eq!(automaton.len(), 2);
        assert!(!automaton.contains_location("again"));
        assert!(automaton.has_transition("down", "up"));

        let rising = Flow::new(vec![1.0])?;
        assert_eq!(automaton.locations().filter(|location| location.flow() == &rising).count(), 1);

        let up = automaton.location("up").ok_or("location up")?.invariant();
        assert!(up.contains(&band(20.0, 30.0)?));

        let tube = tube(&pwl, 0.1)?;
        assert!(membership(&automaton, &pwl, &tube, 8)?.is_some());

        Ok(())
    }

    #[test]
    fn synthesis_seeds_from_the_first_trace() -> TestResult {
        let synthesizer = Synthesizer::new(SynthesisConfig::new(0.5))?;
        let traces = vec![
            PwlFunction::scalar(&[(0.0, 0.0), (1.0, 1.0), (2.0, 1.0)])?,
            PwlFunction::scalar(&[(0.0, 1.0), (1.0, 1.0), (2.0, 0.0)])?,
        ];

        let automaton = synthesizer.synthesize::<Polyhedron>(&["x"], &traces, &TraceOrder::Sequential)?;

        assert!(automaton.contains_location("loc0"));
        assert!(automaton.contains_location("loc1"));

        for trace in &traces {
            let tube = tube(trace, 0.25)?;
            assert!(membership(&automaton, trace, &tube, 8)?.is_some());
        }

        assert!(matches!(
            synthesizer.synthesize::<Polyhedron>(&["x"], &[], &TraceOrder::Sequential),
            Err(SynthesisError::NoTraces)
        ));

        Ok(())
    }

    #[test]
    fn signals_are_simplified_first() -> TestResult {
        let synthesizer = Synthesizer::new(SynthesisConfig::new(0.4))?;
        let signal = PwlFunction::scalar(&[(0.0, 0.0), (0.5, 0.55), (1.0, 1.0), (1.5, 1.05), (2.0, 1.0)])?;

        let automaton = synthesizer.run_signals(
            Automaton::<Polyhedron>::new(["x"], 0.4),
            &[signal],
            &TraceOrder::Sequential,
            &synthesizer.extractor(),
        )?;

        assert_eq!(automaton.len(), 2);

        Ok(())
    }
}
