//! Parameter metadata for the tolerance-driven detectors
//!
//! Each detector that implements [`ParameterizedDetector`] publishes its
//! tunable fields, so callers can build it from a name/value map and sweep a
//! grid over its tolerances.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use ta_confluence::prelude::*;
//!
//! for param in DoubleTopBottomDetector::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let mut params = HashMap::new();
//! params.insert("tolerance", 0.02);
//! let detector = DoubleTopBottomDetector::with_params(&params).unwrap();
//! assert_eq!(detector.tolerance.get(), 0.02);
//! ```

use std::collections::HashMap;

use crate::{AnalysisError, Period, Ratio, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Fraction in 0.0..=1.0
  Ratio,
  /// Positive integer
  Period,
  /// Unconstrained finite number (multiples, slopes, confidences)
  Value,
}

/// Metadata for a single detector parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Field name, e.g. "shoulder_tolerance"
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  pub const fn value(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Value, default, range, description }
  }

  /// Every value from `min` to `max` in `step` increments
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    if !(step > 0.0) {
      return vec![min];
    }
    let count = ((max - min) / step + 1e-9).floor() as usize;
    (0..=count).map(|i| min + i as f64 * step).collect()
  }

  /// Check a value against the range and the parameter type
  pub fn validate(&self, value: f64) -> Result<()> {
    if !value.is_finite() {
      return Err(AnalysisError::InvalidValue("parameter must be finite"));
    }
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(AnalysisError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio => Ratio::new(value).map(|_| ()),
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(AnalysisError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
      ParamType::Value => Ok(()),
    }
  }
}

// ============================================================
// PARAMETERIZED DETECTOR TRAIT
// ============================================================

/// Detector constructible from a parameter map
pub trait ParameterizedDetector: Sized {
  /// Metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Build from a map; missing parameters take their defaults.
  /// The result's configuration is validated.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

  /// Detector name, as reported by `PatternDetector::name`
  fn detector_name() -> &'static str;

  /// Every combination of the parameters' grids, as maps for `with_params`
  fn param_grid() -> Vec<HashMap<&'static str, f64>> {
    Self::param_meta().iter().fold(vec![HashMap::new()], |acc, meta| {
      let grid = meta.generate_grid();
      acc
        .into_iter()
        .flat_map(|base| {
          grid.iter().map(move |&v| {
            let mut next = base.clone();
            next.insert(meta.name, v);
            next
          })
        })
        .collect()
    })
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

/// Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if value < 1.0 || value.fract() != 0.0 {
    return Err(AnalysisError::InvalidValue("Period must be a positive integer"));
  }
  Period::new(value as usize)
}

/// Finite number from params with default fallback
pub fn get_value(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<f64> {
  let value = params.get(key).copied().unwrap_or(default);
  if !value.is_finite() {
    return Err(AnalysisError::InvalidValue("parameter must be finite"));
  }
  Ok(value)
}

// ============================================================
// TESTS
// ============================================================
