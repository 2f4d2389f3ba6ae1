//! Market structure: trend classification from swing sequences.
//!
//! The last three swing highs and three swing lows give four consecutive
//! comparisons. Higher highs and higher lows count towards the up score, lower
//! highs and lower lows towards the down score. Three out of four classifies
//! the trend; anything less is ranging.

use serde::{Deserialize, Serialize};

use crate::swing::{only, SwingExtractor, SwingKind, SwingPoint};
use crate::{Direction, Period, Result, OHLCV};

/// Consistent comparisons needed to call a trend
const TREND_THRESHOLD: usize = 3;
/// Three highs and three lows give two comparisons each
const MAX_SCORE: usize = 4;
const WINDOW: usize = 3;

/// Penalty for a pattern pointing against the trend
pub const COUNTER_TREND_PENALTY: f64 = -2.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendKind {
    Uptrend,
    Downtrend,
    #[default]
    Ranging,
}

impl TrendKind {
    #[inline]
    pub fn direction(self) -> Option<Direction> {
        match self {
            TrendKind::Uptrend => Some(Direction::Bullish),
            TrendKind::Downtrend => Some(Direction::Bearish),
            TrendKind::Ranging => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketStructure {
    pub trend: TrendKind,
    /// 0..=10
    pub strength: f64,
    pub swing_points: Vec<SwingPoint>,
    /// Index of the latest swing that broke the trend's sequence
    pub last_structure_break: Option<usize>,
}

impl MarketStructure {
    #[inline]
    pub fn direction(&self) -> Option<Direction> {
        self.trend.direction()
    }

    /// Confidence delta for a pattern pointing in `direction`:
    /// `1 + strength/10` with the trend, a flat penalty against it, and
    /// nothing while ranging.
    pub fn alignment_delta(&self, direction: Direction) -> f64 {
        match self.direction() {
            None => 0.0,
            Some(trend) if trend == direction => 1.0 + self.strength / 10.0,
            Some(_) => COUNTER_TREND_PENALTY,
        }
    }
}

/// Classifies trend and strength from swing points
#[derive(Debug, Clone)]
pub struct StructureAnalyzer {
    pub lookback: Period,
}

impl Default for StructureAnalyzer {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(SwingExtractor::MEDIUM_LOOKBACK),
        }
    }
}

impl StructureAnalyzer {
    pub fn with_lookback(lookback: usize) -> Result<Self> {
        Ok(Self {
            lookback: Period::new(lookback)?,
        })
    }

    pub fn analyze<T: OHLCV>(&self, bars: &[T]) -> MarketStructure {
        let swings = SwingExtractor::new(self.lookback).extract(bars);
        self.classify(swings)
    }

    /// Classify an ordered swing list
    pub fn classify(&self, swings: Vec<SwingPoint>) -> MarketStructure {
        let highs = only(&swings, SwingKind::High);
        let lows = only(&swings, SwingKind::Low);
        let recent_highs = &highs[highs.len().saturating_sub(WINDOW)..];
        let recent_lows = &lows[lows.len().saturating_sub(WINDOW)..];

        let (hh, lh) = count_steps(recent_highs);
        let (hl, ll) = count_steps(recent_lows);
        let up = hh + hl;
        let down = lh + ll;

        let (trend, score) = if up >= TREND_THRESHOLD {
            (TrendKind::Uptrend, up)
        } else if down >= TREND_THRESHOLD {
            (TrendKind::Downtrend, down)
        } else {
            (TrendKind::Ranging, up.max(down))
        };

        let last_structure_break = last_break(&swings, trend);

        MarketStructure {
            trend,
            strength: score as f64 / MAX_SCORE as f64 * 10.0,
            swing_points: swings,
            last_structure_break,
        }
    }
}

/// (rising steps, falling steps) between consecutive points
fn count_steps(points: &[SwingPoint]) -> (usize, usize) {
    points.windows(2).fold((0, 0), |(up, down), w| {
        if w[1].price > w[0].price {
            (up + 1, down)
        } else if w[1].price < w[0].price {
            (up, down + 1)
        } else {
            (up, down)
        }
    })
}

fn last_break(swings: &[SwingPoint], trend: TrendKind) -> Option<usize> {
    let mut prev_high: Option<f64> = None;
    let mut prev_low: Option<f64> = None;
    let mut last = None;

    for s in swings {
        let prev = match s.kind {
            SwingKind::High => &mut prev_high,
            SwingKind::Low => &mut prev_low,
        };
        if let Some(p) = *prev {
            let violated = match trend {
                TrendKind::Uptrend => s.price < p,
                TrendKind::Downtrend => s.price > p,
                TrendKind::Ranging => false,
            };
            if violated {
                last = Some(s.index);
            }
        }
        *prev = Some(s.price);
    }

    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Candle;

    fn swing(kind: SwingKind, price: f64, index: usize) -> SwingPoint {
        SwingPoint {
            kind,
            price,
            index,
            timestamp: None,
        }
    }

    fn wave(n: usize, slope: f64, amp: impl Fn(usize) -> f64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let p = 100.0 + slope * i as f64
                    + amp(i) * (i as f64 * std::f64::consts::TAU / 30.0).sin();
                Candle::new(i as i64, p, p + 0.5, p - 0.5, p, 1000.0)
            })
            .collect()
    }

    #[test]
    fn test_uptrend() {
        let s = StructureAnalyzer::default().analyze(&wave(200, 0.2, |_| 5.0));
        assert_eq!(s.trend, TrendKind::Uptrend);
        assert_eq!(s.strength, 10.0);
        assert_eq!(s.last_structure_break, None);
    }

    #[test]
    fn test_downtrend() {
        let s = StructureAnalyzer::default().analyze(&wave(200, -0.2, |_| 5.0));
        assert_eq!(s.trend, TrendKind::Downtrend);
        assert_eq!(s.strength, 10.0);
    }

    #[test]
    fn test_broadening_range() {
        let s = StructureAnalyzer::default().analyze(&wave(200, 0.0, |i| 5.0 + 0.05 * i as f64));
        assert_eq!(s.trend, TrendKind::Ranging);
        assert_eq!(s.strength, 5.0);
        assert_eq!(s.last_structure_break, None);
    }

    #[test]
    fn test_too_few_swings_is_ranging() {
        let s = StructureAnalyzer::default().analyze(&wave(15, 0.2, |_| 5.0));
        assert_eq!(s.trend, TrendKind::Ranging);
        assert_eq!(s.strength, 0.0);
    }

    #[test]
    fn test_structure_break_is_latest_violation() {
        let swings = vec![
            swing(SwingKind::Low, 90.0, 5),
            swing(SwingKind::High, 100.0, 10),
            swing(SwingKind::Low, 88.0, 15), // lower low
            swing(SwingKind::High, 105.0, 20),
            swing(SwingKind::Low, 92.0, 25),
            swing(SwingKind::High, 110.0, 30),
            swing(SwingKind::Low, 95.0, 35),
        ];
        let s = StructureAnalyzer::default().classify(swings);
        // highs 100 < 105 < 110, lows 88 < 92 < 95
        assert_eq!(s.trend, TrendKind::Uptrend);
        assert_eq!(s.last_structure_break, Some(15));
    }

    #[test]
    fn test_alignment_delta() {
        let up = MarketStructure {
            trend: TrendKind::Uptrend,
            strength: 7.5,
            ..Default::default()
        };
        assert_eq!(up.alignment_delta(Direction::Bullish), 1.75);
        assert_eq!(up.alignment_delta(Direction::Bearish), -2.0);
        assert_eq!(MarketStructure::default().alignment_delta(Direction::Bullish), 0.0);
    }
}
