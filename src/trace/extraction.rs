//! Turning sampled signals into piecewise-linear functions.

use super::{PwlFunction, TraceError};

/// Approximate a sampled signal by a piecewise-linear function.
///
/// The samples of the signal are given as the breakpoints of a [`PwlFunction`]. Implementations
/// return a function whose breakpoints are a subset of the samples.
pub trait PwlExtractor {
    /// The type of error that can be generated during extraction
    type Error;

    /// Compute the piecewise-linear approximation of a signal
    fn extract(&self, signal: &PwlFunction) -> Result<PwlFunction, Self::Error>;
}

/// Extractor that keeps every sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Polyline;

impl PwlExtractor for Polyline {
    type Error = TraceError;

    fn extract(&self, signal: &PwlFunction) -> Result<PwlFunction, Self::Error> {
        Ok(signal.clone())
    }
}

/// Ramer-Douglas-Peucker simplification using the vertical infinity-norm distance.
///
/// Every dropped sample lies within `epsilon` of the kept polyline in every variable, measured at
/// the time of the sample.
///
/// # Example
///
/// ```rust
/// use pwl_synth::trace::{PwlExtractor, PwlFunction, RamerDouglasPeucker};
///
/// let signal = PwlFunction::scalar(&[(0.0, 0.0), (1.0, 1.05), (2.0, 2.0), (3.0, 0.0)]).unwrap();
/// let simplified = RamerDouglasPeucker { epsilon: 0.1 }.extract(&signal).unwrap();
///
/// assert_eq!(simplified.times().collect::<Vec<_>>(), vec![0.0, 2.0, 3.0]);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RamerDouglasPeucker {
    pub epsilon: f64,
}

/// Largest vertical distance between the samples strictly inside `first..last` and the segment
/// joining both ends, with the index of the sample where it occurs.
fn farthest(signal: &PwlFunction, first: usize, last: usize) -> Option<(usize, f64)> {
    let start_time = signal.time(first)?;
    let end_time = signal.time(last)?;
    let start = signal.state(first)?;
    let end = signal.state(last)?;

    let mut result: Option<(usize, f64)> = None;

    for index in first + 1..last {
        let fraction = (signal.time(index)? - start_time) / (end_time - start_time);
        let state = signal.state(index)?;

        let distance = state
            .iter()
            .zip(start.iter().zip(end))
            .map(|(value, (low, high))| (value - (low + fraction * (high - low))).abs())
            .fold(0.0, f64::max);

        if result.map_or(true, |(_, largest)| distance > largest) {
            result = Some((index, distance));
        }
    }

    result
}

impl PwlExtractor for RamerDouglasPeucker {
    type Error = TraceError;

    fn extract(&self, signal: &PwlFunction) -> Result<PwlFunction, Self::Error> {
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(TraceError::InvalidEpsilon(self.epsilon));
        }

        let mut kept = vec![0, signal.len() - 1];
        let mut segments = vec![(0, signal.len() - 1)];

        while let Some((first, last)) = segments.pop() {
            if let Some((index, distance)) = farthest(signal, first, last) {
                if distance > self.epsilon {
                    kept.push(index);
                    segments.push((first, index));
                    segments.push((index, last));
                }
            }
        }

        kept.sort_unstable();
        signal.select(&kept)
    }
}
