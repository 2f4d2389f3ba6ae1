//! Cross-timeframe confluence.
//!
//! Each timeframe's bias is the net direction of its patterns (bullish count
//! minus bearish count). Two timeframes agreeing lift every pattern; two
//! disagreeing lower them; a missing bias leaves them alone.

use serde::{Deserialize, Serialize};

use crate::scoring::{ConfidenceStage, ConfluenceAdjustment};
use crate::{AnalysisError, Direction, PatternMatch, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceResult {
    pub has_confluence: bool,
    /// Shared bias when the timeframes agree
    pub direction: Option<Direction>,
    /// Delta applied to every pattern of both timeframes
    pub confidence_boost: f64,
}

impl ConfluenceResult {
    fn neutral() -> Self {
        Self {
            has_confluence: false,
            direction: None,
            confidence_boost: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfluenceAggregator {
    pub agreement_boost: f64,
    /// Applied as a negative delta
    pub disagreement_penalty: f64,
}

impl Default for ConfluenceAggregator {
    fn default() -> Self {
        Self {
            agreement_boost: 2.0,
            disagreement_penalty: 1.0,
        }
    }
}

/// Net direction of a pattern list; a tie or an empty list has none
pub fn bias(patterns: &[PatternMatch]) -> Option<Direction> {
    let net: i64 = patterns
        .iter()
        .map(|m| if m.direction.is_bullish() { 1 } else { -1 })
        .sum();
    match net.signum() {
        1 => Some(Direction::Bullish),
        -1 => Some(Direction::Bearish),
        _ => None,
    }
}

impl ConfluenceAggregator {
    pub fn new(agreement_boost: f64, disagreement_penalty: f64) -> Result<Self> {
        let aggregator = Self {
            agreement_boost,
            disagreement_penalty,
        };
        aggregator.validate_config()?;
        Ok(aggregator)
    }

    pub fn validate_config(&self) -> Result<()> {
        for (field, value) in [
            ("agreement_boost", self.agreement_boost),
            ("disagreement_penalty", self.disagreement_penalty),
        ] {
            if !(0.0..=10.0).contains(&value) {
                return Err(AnalysisError::OutOfRange {
                    field,
                    value,
                    min: 0.0,
                    max: 10.0,
                });
            }
        }
        Ok(())
    }

    pub fn evaluate(&self, primary: &[PatternMatch], secondary: &[PatternMatch]) -> ConfluenceResult {
        match (bias(primary), bias(secondary)) {
            (Some(a), Some(b)) if a == b => ConfluenceResult {
                has_confluence: true,
                direction: Some(a),
                confidence_boost: self.agreement_boost,
            },
            (Some(_), Some(_)) => ConfluenceResult {
                has_confluence: false,
                direction: None,
                confidence_boost: -self.disagreement_penalty,
            },
            _ => ConfluenceResult::neutral(),
        }
    }

    /// Shift every pattern by the result's boost, re-clamped
    pub fn apply(&self, patterns: Vec<PatternMatch>, result: &ConfluenceResult) -> Vec<PatternMatch> {
        if result.confidence_boost == 0.0 {
            return patterns;
        }
        let stage = ConfluenceAdjustment::new(result.confidence_boost);
        patterns.into_iter().map(|m| stage.apply(m)).collect()
    }
}
