//! Tolerances and search budgets used during synthesis.
//!
//! The total tolerance `delta_ha` of an automaton is split between the error of the piecewise-linear
//! approximation of a signal (`pwl_epsilon`) and the width of the tube around that approximation
//! (`delta_fh`), so that `delta_ha = delta_fh + pwl_epsilon`.
//!
//! # Examples
//!
//! ```rust
//! use pwl_synth::config::SynthesisConfig;
//!
//! let config = SynthesisConfig::default();
//!
//! assert_eq!(config.delta_ha, 1.0);
//! assert_eq!(config.delta_fh().unwrap(), 0.5);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerances below this value are treated as zero.
const ZERO_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Tolerance {name} must be non-negative, found {value}")]
    Negative { name: &'static str, value: f64 },

    #[error("Tolerance {name} is zero")]
    Zero { name: &'static str },

    #[error("Tolerance {name} is not finite")]
    NonFinite { name: &'static str },
}

fn check_finite(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::NonFinite { name })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Total tolerance between an automaton and the signals it admits
    pub delta_ha: f64,

    /// Error of the piecewise-linear approximation, `delta_ha / 2` when unset
    pub pwl_epsilon: Option<f64>,

    /// Accept a zero tube width
    pub allow_zero_delta_fh: bool,

    /// Largest number of pieces for which every path of the automaton is enumerated
    pub max_path_length: usize,

    /// Largest slope difference of pieces sharing a location of the seed automaton, only identical
    /// slopes are grouped when unset
    pub clustering_bandwidth: Option<f64>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            delta_ha: 1.0,
            pwl_epsilon: None,
            allow_zero_delta_fh: false,
            max_path_length: 8,
            clustering_bandwidth: None,
        }
    }
}

impl SynthesisConfig {
    pub fn new(delta_ha: f64) -> Self {
        Self {
            delta_ha,
            ..Self::default()
        }
    }

    pub fn pwl_epsilon(&self) -> f64 {
        self.pwl_epsilon.unwrap_or(self.delta_ha / 2.0)
    }

    /// Bandwidth used to group the slopes of the seed automaton, zero when unset.
    pub fn clustering_bandwidth(&self) -> Result<f64, ConfigError> {
        let bandwidth = check_finite("clustering_bandwidth", self.clustering_bandwidth.unwrap_or(0.0))?;

        if bandwidth < 0.0 {
            return Err(ConfigError::Negative {
                name: "clustering_bandwidth",
                value: bandwidth,
            });
        }

        Ok(bandwidth)
    }

    /// Width of the tube around a piecewise-linear function, `delta_ha - pwl_epsilon`.
    pub fn delta_fh(&self) -> Result<f64, ConfigError> {
        let delta_ha = check_finite("delta_ha", self.delta_ha)?;
        let pwl_epsilon = check_finite("pwl_epsilon", self.pwl_epsilon())?;

        if pwl_epsilon < 0.0 {
            return Err(ConfigError::Negative {
                name: "pwl_epsilon",
                value: pwl_epsilon,
            });
        }

        let delta_fh = delta_ha - pwl_epsilon;

        if delta_fh < -ZERO_TOLERANCE {
            return Err(ConfigError::Negative {
                name: "delta_fh",
                value: delta_fh,
            });
        }

        if delta_fh.abs() <= ZERO_TOLERANCE {
            if self.allow_zero_delta_fh {
                return Ok(0.0);
            }

            return Err(ConfigError::Zero { name: "delta_fh" });
        }

        Ok(delta_fh)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use approx::assert_relative_eq;

    use super::{ConfigError, SynthesisConfig};

    #[test]
    fn decomposition() -> Result<(), Box<dyn Error>> {
        let config = SynthesisConfig {
            delta_ha: 0.5,
            pwl_epsilon: Some(0.2),
            ..SynthesisConfig::default()
        };

        assert_relative_eq!(config.delta_fh()?, 0.3);
        assert_relative_eq!(SynthesisConfig::new(0.25).delta_fh()?, 0.125);

        Ok(())
    }

    #[test]
    fn invalid_decompositions() {
        let negative = SynthesisConfig {
            delta_ha: 0.5,
            pwl_epsilon: Some(1.0),
            ..SynthesisConfig::default()
        };
        assert!(matches!(
            negative.delta_fh(),
            Err(ConfigError::Negative { name: "delta_fh", .. })
        ));

        let zero = SynthesisConfig {
            pwl_epsilon: Some(1.0),
            ..SynthesisConfig::default()
        };
        assert_eq!(zero.delta_fh(), Err(ConfigError::Zero { name: "delta_fh" }));

        let allowed = SynthesisConfig {
            allow_zero_delta_fh: true,
            ..zero
        };
        assert_eq!(allowed.delta_fh(), Ok(0.0));

        let infinite = SynthesisConfig::new(f64::INFINITY);
        assert_eq!(infinite.delta_fh(), Err(ConfigError::NonFinite { name: "delta_ha" }));

        let bandwidth = SynthesisConfig {
            clustering_bandwidth: Some(-0.1),
            ..SynthesisConfig::default()
        };
        assert!(matches!(
            bandwidth.clustering_bandwidth(),
            Err(ConfigError::Negative {
                name: "clustering_bandwidth",
                ..
            })
        ));
    }

    #[test]
    fn missing_fields_take_defaults() -> Result<(), Box<dyn Error>> {
        let config: SynthesisConfig = serde_json::from_str(r#"{ "delta_ha": 0.4 }"#)?;

        assert_eq!(config.max_path_length, 8);
        assert_eq!(config.pwl_epsilon, None);
        assert_eq!(config.clustering_bandwidth()?, 0.0);
        assert_relative_eq!(config.pwl_epsilon(), 0.2);

        let encoded = serde_json::to_string(&config)?;
        assert_eq!(serde_json::from_str::<SynthesisConfig>(&encoded)?, config);

        Ok(())
    }
}
