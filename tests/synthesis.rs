use std::error::Error;

use num_bigint::BigInt;
use pwl_synth::adaptation::adapt;
use pwl_synth::automaton::Automaton;
use pwl_synth::config::SynthesisConfig;
use pwl_synth::driver::{StepOutcome, Synthesizer, TraceOrder};
use pwl_synth::flow::{tube, Flow};
use pwl_synth::membership::membership;
use pwl_synth::rational::float2int;
use pwl_synth::region::{ConvexRegion, IntervalBox, LinearConstraint, Polyhedron};
use pwl_synth::relaxation::relax_ha;
use pwl_synth::trace::PwlFunction;
use tracing_subscriber::EnvFilter;

type TestResult = Result<(), Box<dyn Error>>;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn band<R: ConvexRegion>(low: f64, high: f64) -> Result<R, Box<dyn Error>> {
    Ok(R::from_constraints(
        2,
        [
            LinearConstraint::greater_eq(&[0.0, 1.0], low)?,
            LinearConstraint::less_eq(&[0.0, 1.0], high)?,
        ],
    ))
}

fn at_least<R: ConvexRegion>(low: f64) -> Result<R, Box<dyn Error>> {
    Ok(R::from_constraints(2, [LinearConstraint::greater_eq(&[0.0, 1.0], low)?]))
}

fn up_and_down<R: ConvexRegion>(delta: f64) -> Result<Automaton<R>, Box<dyn Error>> {
    let mut automaton = Automaton::new(["x"], delta);
    automaton.add_location("up", Flow::new(vec![1.0])?, band(-10.0, 10.0)?)?;
    automaton.add_location("down", Flow::new(vec![-1.0])?, band(-10.0, 10.0)?)?;
    automaton.add_transition("up", "down", band(-10.0, 10.0)?)?;
    automaton.add_transition("down", "up", band(-10.0, 10.0)?)?;

    Ok(automaton)
}

fn peak<R: ConvexRegion>(delta: f64) -> Result<Automaton<R>, Box<dyn Error>> {
    let mut automaton = Automaton::new(["x"], delta);
    automaton.add_location("rise", Flow::new(vec![1.0])?, band(0.0, 1.0)?)?;
    automaton.add_location("fall", Flow::new(vec![-1.0])?, band(0.0, 1.0)?)?;
    automaton.add_location("rest", Flow::new(vec![0.0])?, band(-0.1, 0.1)?)?;
    automaton.add_transition("rise", "fall", band(0.9, 1.0)?)?;
    automaton.add_transition("fall", "rest", band(-0.1, 0.1)?)?;

    Ok(automaton)
}

#[test]
fn zigzag_needs_a_flat_location() -> TestResult {
    let automaton = up_and_down::<Polyhedron>(0.25)?;
    let pwl = PwlFunction::scalar(&[(0.0, 0.0), (5.0, 5.0), (10.0, 5.0)])?;
    let tube = tube(&pwl, 0.25)?;

    assert!(membership(&automaton, &pwl, &tube, 8)?.is_none());
    assert!(relax_ha(&automaton, &pwl, &tube, 8)?.is_none());

    let adaptation = adapt(&automaton, &pwl, &tube, 0, 8)?;
    let flat = Flow::new(vec![0.0])?;

    assert_eq!(adaptation.created.len(), 1);
    assert_eq!(adaptation.automaton.find_flow(&flat), Some(adaptation.created[0].as_str()));
    assert!(membership(&adaptation.automaton, &pwl, &tube, 8)?.is_some());

    Ok(())
}

#[test]
fn peak_is_admitted_by_relaxation() -> TestResult {
    let automaton = peak::<Polyhedron>(3.0)?;
    let pwl = PwlFunction::scalar(&[(0.0, 0.0), (1.0, 3.0), (2.0, 0.0), (3.0, 0.0)])?;
    let tube = tube(&pwl, 1.5)?;

    assert!(membership(&automaton, &pwl, &tube, 8)?.is_none());

    let relaxed = relax_ha(&automaton, &pwl, &tube, 8)?.ok_or("relaxation should succeed")?;

    assert_eq!(relaxed.len(), automaton.len());
    assert_eq!(relaxed.transition_count(), automaton.transition_count());
    assert!(membership(&relaxed, &pwl, &tube, 8)?.is_some());

    for location in automaton.locations() {
        let widened = relaxed.location(location.name()).ok_or("locations are kept")?;
        assert_eq!(widened.flow(), location.flow());
    }

    let guard = relaxed.guard("rise", "fall").ok_or("transition rise -> fall")?;
    assert!(guard.contains(&band(0.9, 2.0)?));

    Ok(())
}

#[test]
fn steep_drop_needs_a_third_location() -> TestResult {
    let mut automaton = Automaton::<Polyhedron>::new(["x"], 0.2);
    automaton.add_location("rise", Flow::new(vec![1.0])?, at_least(0.0)?)?;
    automaton.add_location("hold", Flow::new(vec![0.0])?, at_least(0.0)?)?;
    automaton.add_transition("rise", "hold", at_least(0.0)?)?;

    let pwl = PwlFunction::scalar(&[(0.0, 0.0), (1.0, -5.0), (2.0, -5.0)])?;
    let tube = tube(&pwl, 0.1)?;

    assert!(membership(&automaton, &pwl, &tube, 8)?.is_none());
    assert!(relax_ha(&automaton, &pwl, &tube, 8)?.is_none());

    let adaptation = adapt(&automaton, &pwl, &tube, 0, 8)?;

    assert_eq!(adaptation.automaton.len(), 3);
    assert_eq!(adaptation.path, vec!["loc0_0", "hold"]);
    assert!(membership(&adaptation.automaton, &pwl, &tube, 8)?.is_some());

    Ok(())
}

#[test]
fn common_denominator() -> TestResult {
    let (integers, denominator) = float2int(&[1.5, -1.5, 2.3])?;

    assert_eq!(integers, vec![BigInt::from(15), BigInt::from(-15), BigInt::from(23)]);
    assert_eq!(denominator, BigInt::from(10));

    Ok(())
}

fn dataset() -> Result<Vec<PwlFunction>, Box<dyn Error>> {
    Ok(vec![
        PwlFunction::scalar(&[(0.0, 0.0), (1.0, 1.0), (2.0, 1.0), (3.0, 0.0)])?,
        PwlFunction::scalar(&[(0.0, 1.0), (2.0, 1.0), (3.0, 3.0)])?,
        PwlFunction::scalar(&[(0.0, 0.5), (1.0, 1.5), (2.0, 1.5)])?,
        PwlFunction::scalar(&[(0.0, 2.0), (1.0, 0.0), (2.0, 0.0), (3.0, 1.0)])?,
    ])
}

#[test]
fn runs_are_deterministic() -> TestResult {
    init_logging();

    let synthesizer = Synthesizer::new(SynthesisConfig::new(0.4))?;
    let traces = dataset()?;
    let seed = up_and_down::<Polyhedron>(0.4)?;

    let first = synthesizer.run(seed.clone(), &traces, &TraceOrder::Sequential)?;
    let second = synthesizer.run(seed, &traces, &TraceOrder::Sequential)?;

    assert_eq!(first.to_string(), second.to_string());

    Ok(())
}

#[test]
fn one_piece_relaxation() -> TestResult {
    let mut automaton = Automaton::<Polyhedron>::new(["x"], 0.2);
    automaton.add_location("fall", Flow::new(vec![-1.0])?, band(-0.5, 1.0)?)?;

    let synthesizer = Synthesizer::new(SynthesisConfig::new(0.2))?;
    let pwl = PwlFunction::scalar(&[(0.0, 0.0), (2.0, -2.0)])?;
    let (relaxed, outcome) = synthesizer.process(automaton.clone(), &pwl, 0)?;

    assert_eq!(outcome, StepOutcome::Relaxed);
    assert_eq!(relaxed.len(), 1);

    let invariant = relaxed.location("fall").ok_or("location fall")?.invariant();
    assert!(invariant.contains(&band(-2.0, 0.0)?));

    Ok(())
}

#[test]
fn members_are_idempotent() -> TestResult {
    let automaton = up_and_down::<Polyhedron>(0.2)?;
    let pwl = PwlFunction::scalar(&[(0.0, 0.0), (2.0, 2.0), (3.0, 1.0)])?;
    let tube = tube(&pwl, 0.1)?;

    assert!(membership(&automaton, &pwl, &tube, 8)?.is_some());

    let adaptation = adapt(&automaton, &pwl, &tube, 0, 8)?;

    assert!(adaptation.created.is_empty());
    assert_eq!(adaptation.automaton.to_string(), automaton.to_string());

    Ok(())
}

#[test]
fn constraints_only_grow() -> TestResult {
    let synthesizer = Synthesizer::new(SynthesisConfig::new(0.4))?;
    let seed = peak::<Polyhedron>(0.4)?;
    let result = synthesizer.run(seed.clone(), &dataset()?, &TraceOrder::Sequential)?;

    for location in seed.locations() {
        let grown = result.location(location.name()).ok_or("locations are never removed")?;

        assert_eq!(grown.flow(), location.flow());
        assert!(grown.invariant().contains(location.invariant()));
    }

    for (from, to, guard) in seed.transitions() {
        let grown = result.guard(from, to).ok_or("transitions are never removed")?;
        assert!(grown.contains(guard));
    }

    Ok(())
}

#[test]
fn order_changes_the_result_but_not_soundness() -> TestResult {
    init_logging();

    let synthesizer = Synthesizer::new(SynthesisConfig::new(0.4))?;
    let traces = dataset()?;
    let seed = Automaton::<Polyhedron>::new(["x"], 0.4);

    let forward = synthesizer.run(seed.clone(), &traces, &TraceOrder::Sequential)?;
    let explicit = synthesizer.run(seed.clone(), &traces, &TraceOrder::Explicit(vec![0, 1, 2, 3]))?;
    let backward = synthesizer.run(seed, &traces, &TraceOrder::Reversed)?;

    assert_eq!(forward.to_string(), explicit.to_string());
    assert_ne!(forward.to_string(), backward.to_string());

    for automaton in [&forward, &backward] {
        for trace in &traces {
            let tube = tube(trace, 0.2)?;
            assert!(membership(automaton, trace, &tube, 8)?.is_some());
        }
    }

    Ok(())
}

#[test]
fn boxes_accept_what_polyhedra_accept() -> TestResult {
    let traces = dataset()?;

    let exact = up_and_down::<Polyhedron>(0.4)?;
    let boxed = up_and_down::<IntervalBox>(0.4)?;

    for trace in &traces {
        let exact_tube = tube::<Polyhedron>(trace, 0.2)?;
        let boxed_tube = tube::<IntervalBox>(trace, 0.2)?;

        if membership(&exact, trace, &exact_tube, 8)?.is_some() {
            assert!(membership(&boxed, trace, &boxed_tube, 8)?.is_some());
        }
    }

    let synthesizer = Synthesizer::new(SynthesisConfig::new(0.4))?;
    let boxed = synthesizer.run(boxed, &traces, &TraceOrder::Sequential)?;

    for trace in &traces {
        let boxed_tube = tube::<IntervalBox>(trace, 0.2)?;
        assert!(membership(&boxed, trace, &boxed_tube, 8)?.is_some());
    }

    Ok(())
}
