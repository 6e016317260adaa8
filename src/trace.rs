//! Piecewise-linear functions of time.
//!
//! A [`PwlFunction`] is an ordered sequence of breakpoints `(t_i, x_i)` where every `x_i` is a
//! vector with one value per variable. Consecutive breakpoints are joined by straight pieces, so
//! a function with `n` breakpoints has `n - 1` pieces, each with a constant slope
//! `(x_{i+1} - x_i) / (t_{i+1} - t_i)`.
//!
//! Breakpoint times must be finite and strictly increasing, and every breakpoint must have the
//! same number of values. These conditions are checked once on construction so that the
//! reachability code never has to deal with a malformed trace.
//!
//! # Examples
//!
//! ```rust
//! use pwl_synth::trace::PwlFunction;
//!
//! let f = PwlFunction::scalar(&[(0.0, 0.0), (5.0, 5.0), (10.0, 5.0)]).unwrap();
//!
//! assert_eq!(f.len(), 3);
//! assert_eq!(f.pieces(), 2);
//! assert_eq!(f.times().collect::<Vec<_>>(), vec![0.0, 5.0, 10.0]);
//! ```

use ordered_float::NotNan;
use thiserror::Error;

use crate::flow::Flow;
use crate::rational::ConversionError;

pub mod extraction;

pub use extraction::{Polyline, PwlExtractor, RamerDouglasPeucker};

/// Error produced when constructing a [`PwlFunction`] from invalid breakpoints.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum TraceError {
    #[error("A piecewise-linear function needs at least two breakpoints, found {0}")]
    TooShort(usize),

    #[error("Breakpoints need at least one variable")]
    NoVariables,

    #[error("Time {time} at breakpoint {index} is not finite")]
    NonFiniteTime { index: usize, time: f64 },

    #[error("Time must be strictly increasing: breakpoint {index} at time {time} follows time {previous}")]
    NonIncreasing { index: usize, time: f64, previous: f64 },

    #[error("Breakpoint {index} has {found} values, expected {expected}")]
    DimensionMismatch { index: usize, expected: usize, found: usize },

    #[error("Breakpoint {index} contains a non-finite value")]
    NonFiniteValue { index: usize },

    #[error("Approximation error must be finite and non-negative, found {0}")]
    InvalidEpsilon(f64),
}

/// Piecewise-linear function represented by its breakpoints.
#[derive(Clone, Debug, PartialEq)]
pub struct PwlFunction {
    times: Vec<NotNan<f64>>,
    states: Vec<Vec<f64>>,
}

impl PwlFunction {
    /// Create a function from `(time, values)` breakpoints.
    ///
    /// # Example
    ///
    /// ```rust
    /// use pwl_synth::trace::PwlFunction;
    ///
    /// let f = PwlFunction::new([(0.0, vec![0.0, 1.0]), (1.0, vec![2.0, 1.0])]).unwrap();
    /// assert_eq!(f.dim(), 2);
    /// ```
    pub fn new<I, S>(breakpoints: I) -> Result<Self, TraceError>
    where
        I: IntoIterator<Item = (f64, S)>,
        S: Into<Vec<f64>>,
    {
        let mut times: Vec<NotNan<f64>> = Vec::new();
        let mut states: Vec<Vec<f64>> = Vec::new();

        for (index, (time, state)) in breakpoints.into_iter().enumerate() {
            let state = state.into();
            let time = NotNan::new(time)
                .ok()
                .filter(|time| time.is_finite())
                .ok_or(TraceError::NonFiniteTime { index, time })?;

            if let Some(previous) = times.last() {
                if time <= *previous {
                    return Err(TraceError::NonIncreasing {
                        index,
                        time: time.into_inner(),
                        previous: previous.into_inner(),
                    });
                }
            }

            if let Some(first) = states.first() {
                if first.len() != state.len() {
                    return Err(TraceError::DimensionMismatch {
                        index,
                        expected: first.len(),
                        found: state.len(),
                    });
                }
            } else if state.is_empty() {
                return Err(TraceError::NoVariables);
            }

            if state.iter().any(|value| !value.is_finite()) {
                return Err(TraceError::NonFiniteValue { index });
            }

            times.push(time);
            states.push(state);
        }

        if times.len() < 2 {
            return Err(TraceError::TooShort(times.len()));
        }

        Ok(Self { times, states })
    }

    /// Create a function of a single variable.
    pub fn scalar(breakpoints: &[(f64, f64)]) -> Result<Self, TraceError> {
        Self::new(breakpoints.iter().map(|(time, value)| (*time, vec![*value])))
    }

    /// Number of breakpoints
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Always false, a function has at least two breakpoints
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Number of linear pieces, one less than the number of breakpoints
    pub fn pieces(&self) -> usize {
        self.times.len() - 1
    }

    /// Number of variables
    pub fn dim(&self) -> usize {
        self.states[0].len()
    }

    pub fn time(&self, index: usize) -> Option<f64> {
        self.times.get(index).map(|time| time.into_inner())
    }

    pub fn state(&self, index: usize) -> Option<&[f64]> {
        self.states.get(index).map(Vec::as_slice)
    }

    pub fn start_time(&self) -> f64 {
        self.times[0].into_inner()
    }

    pub fn end_time(&self) -> f64 {
        self.times[self.times.len() - 1].into_inner()
    }

    /// Duration of a piece
    pub fn duration(&self, piece: usize) -> Option<f64> {
        let start = self.times.get(piece)?;
        let end = self.times.get(piece + 1)?;

        Some(end.into_inner() - start.into_inner())
    }

    /// Exact empirical slope of a piece, without any rounding
    pub fn slope(&self, piece: usize) -> Option<Vec<f64>> {
        let duration = self.duration(piece)?;
        let start = &self.states[piece];
        let end = &self.states[piece + 1];

        Some(start.iter().zip(end).map(|(s, e)| (e - s) / duration).collect())
    }

    /// Exact empirical slopes of every piece
    pub fn raw_slopes(&self) -> Vec<Vec<f64>> {
        (0..self.pieces()).filter_map(|piece| self.slope(piece)).collect()
    }

    /// Slopes of every piece as flows
    pub fn slopes(&self) -> Result<Vec<Flow>, ConversionError> {
        (0..self.pieces())
            .filter_map(|piece| self.slope(piece))
            .map(Flow::new)
            .collect()
    }

    /// Value of the function at a time inside its domain
    pub fn at_time(&self, time: f64) -> Option<Vec<f64>> {
        let piece = self.times.windows(2).position(|window| window[0].into_inner() <= time && time <= window[1].into_inner())?;
        let start = self.times[piece].into_inner();
        let slope = self.slope(piece)?;

        Some(
            self.states[piece]
                .iter()
                .zip(slope)
                .map(|(value, rate)| value + rate * (time - start))
                .collect(),
        )
    }

    /// Sub-function made of the breakpoints at the given indices
    pub(crate) fn select(&self, indices: &[usize]) -> Result<Self, TraceError> {
        Self::new(
            indices
                .iter()
                .filter_map(|index| Some((self.time(*index)?, self.state(*index)?.to_vec()))),
        )
    }
}

pub struct Times<'a> {
    times: std::slice::Iter<'a, NotNan<f64>>,
}

impl<'a> Iterator for Times<'a> {
    type Item = f64;

    fn next(&mut self) -> Option<Self::Item> {
        self.times.next().map(|time| time.into_inner())
    }
}

impl PwlFunction {
    pub fn times(&self) -> Times<'_> {
        Times {
            times: self.times.iter(),
        }
    }
}

pub struct States<'a> {
    states: std::slice::Iter<'a, Vec<f64>>,
}

impl<'a> Iterator for States<'a> {
    type Item = &'a [f64];

    fn next(&mut self) -> Option<Self::Item> {
        self.states.next().map(Vec::as_slice)
    }
}

impl PwlFunction {
    pub fn states(&self) -> States<'_> {
        States {
            states: self.states.iter(),
        }
    }
}

pub struct Iter<'a> {
    times: Times<'a>,
    states: States<'a>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (f64, &'a [f64]);

    fn next(&mut self) -> Option<Self::Item> {
        Some((self.times.next()?, self.states.next()?))
    }
}

impl<'a> IntoIterator for &'a PwlFunction {
    type Item = (f64, &'a [f64]);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        Iter {
            times: self.times(),
            states: self.states(),
        }
    }
}

impl PwlFunction {
    pub fn iter(&self) -> Iter<'_> {
        self.into_iter()
    }
}
