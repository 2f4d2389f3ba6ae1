//! Confidence adjustment pipeline.
//!
//! A detector emits a base confidence; the stages below adjust it in a fixed
//! order (volume → structure → confluence). Each stage is a pure
//! `PatternMatch -> PatternMatch` transform and re-clamps to [0, 10].

use crate::detectors::helpers::{mean_volume, trailing_avg_volume};
use crate::structure::MarketStructure;
use crate::{PatternMatch, OHLCV};

/// One step of the confidence pipeline
pub trait ConfidenceStage {
    fn apply(&self, m: PatternMatch) -> PatternMatch;
}

/// Ordered list of stages
#[derive(Default)]
pub struct ConfidencePipeline<'a> {
    stages: Vec<Box<dyn ConfidenceStage + 'a>>,
}

impl<'a> ConfidencePipeline<'a> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    #[must_use]
    pub fn stage(mut self, stage: impl ConfidenceStage + 'a) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn run(&self, m: PatternMatch) -> PatternMatch {
        self.stages.iter().fold(m, |m, stage| stage.apply(m))
    }
}

/// Bonus when volume over the pattern's span beats the trailing average
/// before it by `multiple`.
#[derive(Debug, Clone, Copy)]
pub struct VolumeConfirmation<'a, T> {
    bars: &'a [T],
    pub multiple: f64,
    pub bonus: f64,
    pub period: usize,
}

impl<'a, T: OHLCV> VolumeConfirmation<'a, T> {
    pub const DEFAULT_MULTIPLE: f64 = 1.5;
    pub const DEFAULT_BONUS: f64 = 1.0;
    pub const DEFAULT_PERIOD: usize = 20;

    pub fn new(bars: &'a [T]) -> Self {
        Self {
            bars,
            multiple: Self::DEFAULT_MULTIPLE,
            bonus: Self::DEFAULT_BONUS,
            period: Self::DEFAULT_PERIOD,
        }
    }

    #[must_use]
    pub fn with_multiple(mut self, multiple: f64) -> Self {
        self.multiple = multiple;
        self
    }

    /// True when formation volume clears the trailing average
    pub fn is_confirmed(&self, start: usize, end: usize) -> bool {
        if start == 0 || end >= self.bars.len() || start > end {
            return false;
        }
        let trailing = trailing_avg_volume(self.bars, start, self.period);
        let formation = mean_volume(&self.bars[start..=end]);
        trailing > 0.0 && formation > trailing * self.multiple
    }
}

impl<T: OHLCV> ConfidenceStage for VolumeConfirmation<'_, T> {
    fn apply(&self, mut m: PatternMatch) -> PatternMatch {
        if self.is_confirmed(m.start_index, m.end_index) {
            m.confidence = m.confidence.adjust(self.bonus);
        }
        m
    }
}

/// Trend alignment adjustment; see [`MarketStructure::alignment_delta`]
#[derive(Debug, Clone, Copy)]
pub struct StructureAlignment<'a> {
    structure: &'a MarketStructure,
}

impl<'a> StructureAlignment<'a> {
    pub fn new(structure: &'a MarketStructure) -> Self {
        Self { structure }
    }
}

impl ConfidenceStage for StructureAlignment<'_> {
    fn apply(&self, mut m: PatternMatch) -> PatternMatch {
        let delta = self.structure.alignment_delta(m.direction);
        m.confidence = m.confidence.adjust(delta);
        m
    }
}

/// Flat cross-timeframe boost or penalty
#[derive(Debug, Clone, Copy)]
pub struct ConfluenceAdjustment {
    pub delta: f64,
}

impl ConfluenceAdjustment {
    pub fn new(delta: f64) -> Self {
        Self { delta }
    }
}

impl ConfidenceStage for ConfluenceAdjustment {
    fn apply(&self, mut m: PatternMatch) -> PatternMatch {
        m.confidence = m.confidence.adjust(self.delta);
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::TrendKind;
    use crate::{Candle, Direction, PatternKind};

    fn pattern(direction: Direction, confidence: f64, start: usize, end: usize) -> PatternMatch {
        PatternMatch::new(PatternKind::DoubleBottom, direction, confidence, start, end)
    }

    fn bars_with_volume(volumes: &[f64]) -> Vec<Candle> {
        volumes
            .iter()
            .enumerate()
            .map(|(i, &v)| Candle::new(i as i64, 10.0, 11.0, 9.0, 10.5, v))
            .collect()
    }

    #[test]
    fn test_volume_bonus_applies_when_confirmed() {
        let mut volumes = vec![100.0; 30];
        for v in &mut volumes[25..30] {
            *v = 200.0;
        }
        let bars = bars_with_volume(&volumes);
        let stage = VolumeConfirmation::new(&bars);

        let boosted = stage.apply(pattern(Direction::Bullish, 7.0, 25, 29));
        assert_eq!(boosted.confidence.get(), 8.0);

        let flat = stage.apply(pattern(Direction::Bullish, 7.0, 10, 20));
        assert_eq!(flat.confidence.get(), 7.0);
    }

    #[test]
    fn test_structure_alignment_stage() {
        let structure = MarketStructure {
            trend: TrendKind::Downtrend,
            strength: 10.0,
            ..Default::default()
        };
        let stage = StructureAlignment::new(&structure);
        assert_eq!(
            stage.apply(pattern(Direction::Bearish, 7.0, 0, 1)).confidence.get(),
            9.0
        );
        assert_eq!(
            stage.apply(pattern(Direction::Bullish, 7.0, 0, 1)).confidence.get(),
            5.0
        );
    }

    #[test]
    fn test_pipeline_clamps_after_each_stage() {
        // +3 clamps to 10, then -1 lands on 9 rather than 10.5 - 1
        let pipeline = ConfidencePipeline::new()
            .stage(ConfluenceAdjustment::new(3.0))
            .stage(ConfluenceAdjustment::new(-1.0));
        assert_eq!(pipeline.len(), 2);
        let m = pipeline.run(pattern(Direction::Bullish, 7.5, 0, 1));
        assert_eq!(m.confidence.get(), 9.0);
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        let pipeline = ConfidencePipeline::new();
        assert!(pipeline.is_empty());
        let m = pattern(Direction::Bearish, 6.25, 3, 4);
        assert_eq!(pipeline.run(m.clone()), m);
    }
}
