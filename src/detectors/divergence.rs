//! Regular RSI divergence.
//!
//! Bullish: the two latest price swing lows make a lower low while the RSI
//! swing lows nearest to them make a higher low. Bearish mirrors it on highs.

use std::collections::HashMap;

use crate::detectors::helpers::{check_confidence, is_recent};
use crate::indicators::wilder_rsi;
use crate::params::{get_period, get_ratio, get_value, ParamMeta, ParameterizedDetector};
use crate::swing::{only, SwingExtractor, SwingKind, SwingPoint};
use crate::{
    AnalysisError, Direction, MarketContext, PatternDetector, PatternKind, PatternMatch, Period,
    Ratio, Result, OHLCV,
};

const OVERSOLD: f64 = 30.0;
const DEEP_OVERSOLD: f64 = 25.0;
const OVERBOUGHT: f64 = 70.0;
const DEEP_OVERBOUGHT: f64 = 75.0;

#[derive(Debug, Clone)]
pub struct RsiDivergenceDetector {
    pub rsi_period: Period,
    /// Swing lookback on price
    pub price_lookback: Period,
    /// Swing lookback on the RSI series
    pub rsi_lookback: Period,
    /// Max bars between a price swing and its RSI swing
    pub match_window: Period,
    pub recent_fraction: Ratio,
    pub base_confidence: f64,
}

impl Default for RsiDivergenceDetector {
    fn default() -> Self {
        Self {
            rsi_period: Period::new_const(14),
            price_lookback: Period::new_const(SwingExtractor::LONG_LOOKBACK),
            rsi_lookback: Period::new_const(SwingExtractor::MEDIUM_LOOKBACK),
            match_window: Period::new_const(10),
            recent_fraction: Ratio::new_const(0.3),
            base_confidence: 8.0,
        }
    }
}

/// One matched divergence: two price swings and their RSI counterparts
#[derive(Debug, Clone, Copy, PartialEq)]
struct Divergence {
    direction: Direction,
    price: [SwingPoint; 2],
    rsi: [SwingPoint; 2],
}

impl RsiDivergenceDetector {
    /// RSI swing of `kind` nearest to `index`, within the match window
    fn nearest(&self, rsi_swings: &[SwingPoint], index: usize) -> Option<SwingPoint> {
        let window = self.match_window.get();
        rsi_swings
            .iter()
            .filter(|s| s.index.abs_diff(index) <= window)
            .min_by_key(|s| s.index.abs_diff(index))
            .copied()
    }

    fn find(
        &self,
        len: usize,
        price_swings: &[SwingPoint],
        rsi_swings: &[SwingPoint],
        direction: Direction,
    ) -> Option<Divergence> {
        let kind = match direction {
            Direction::Bullish => SwingKind::Low,
            Direction::Bearish => SwingKind::High,
        };
        let prices = only(price_swings, kind);
        let [p1, p2] = prices.get(prices.len().checked_sub(2)?..)? else {
            return None;
        };
        let frac = self.recent_fraction.get();
        if !(is_recent(p1.index, len, frac) && is_recent(p2.index, len, frac)) {
            return None;
        }

        let oscillator = only(rsi_swings, kind);
        let r1 = self.nearest(&oscillator, p1.index)?;
        let r2 = self.nearest(&oscillator, p2.index)?;
        if r1.index >= r2.index {
            return None;
        }

        // Price extends while momentum does not
        let s = direction.sign();
        let price_extends = s * (p1.price - p2.price) > 0.0;
        let momentum_holds = s * (r2.price - r1.price) > 0.0;
        (price_extends && momentum_holds).then_some(Divergence {
            direction,
            price: [*p1, *p2],
            rsi: [r1, r2],
        })
    }

    fn confidence(&self, direction: Direction, current_rsi: Option<f64>) -> f64 {
        let bonus = match (direction, current_rsi) {
            (Direction::Bullish, Some(r)) if r < DEEP_OVERSOLD => 1.0,
            (Direction::Bullish, Some(r)) if r < OVERSOLD => 0.5,
            (Direction::Bearish, Some(r)) if r > DEEP_OVERBOUGHT => 1.0,
            (Direction::Bearish, Some(r)) if r > OVERBOUGHT => 0.5,
            _ => 0.0,
        };
        self.base_confidence + bonus
    }

    /// Detect against a precomputed RSI series aligned with `bars`.
    /// Warmup entries should be NaN.
    pub fn detect_with_rsi<T: OHLCV>(&self, bars: &[T], rsi: &[f64]) -> Option<PatternMatch> {
        let len = bars.len();
        if len < PatternDetector::min_bars(self) || rsi.len() != len {
            return None;
        }
        let price_swings = SwingExtractor::new(self.price_lookback).extract(bars);
        let rsi_swings = SwingExtractor::new(self.rsi_lookback).extract_series(rsi, rsi);

        let bullish = self.find(len, &price_swings, &rsi_swings, Direction::Bullish);
        let bearish = self.find(len, &price_swings, &rsi_swings, Direction::Bearish);
        let div = match (bullish, bearish) {
            (Some(b), Some(s)) => {
                if s.price[1].index > b.price[1].index {
                    s
                } else {
                    b
                }
            }
            (b, s) => b.or(s)?,
        };

        let current = rsi.iter().rev().copied().find(|v| v.is_finite());
        let [p1, p2] = div.price;
        tracing::trace!(
            direction = %div.direction,
            first = p1.index,
            second = p2.index,
            rsi_first = div.rsi[0].price,
            rsi_second = div.rsi[1].price,
            "rsi divergence"
        );

        // Target: the opposite extreme between the two swings
        let between = &bars[p1.index..=p2.index];
        let target = match div.direction {
            Direction::Bullish => between.iter().map(|b| b.high()).fold(f64::NEG_INFINITY, f64::max),
            Direction::Bearish => between.iter().map(|b| b.low()).fold(f64::INFINITY, f64::min),
        };
        let (first, second) = match div.direction {
            Direction::Bullish => ("first_low", "second_low"),
            Direction::Bearish => ("first_high", "second_high"),
        };

        Some(
            PatternMatch::new(
                PatternKind::RsiDivergence,
                div.direction,
                self.confidence(div.direction, current),
                p1.index,
                p2.index,
            )
            .with_key_point(first, p1.price, p1.index)
            .with_key_point(second, p2.price, p2.index)
            .with_entry(bars[len - 1].close())
            .with_invalidation(p2.price)
            .with_targets([target]),
        )
    }
}

impl PatternDetector for RsiDivergenceDetector {
    fn name(&self) -> &'static str {
        "rsi-divergence"
    }

    fn min_bars(&self) -> usize {
        (2 * self.price_lookback.get() + 1).max(self.rsi_period.get() + 2 * self.rsi_lookback.get() + 1)
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &MarketContext) -> Option<PatternMatch> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close()).collect();
        let rsi: Vec<f64> = wilder_rsi(&closes, self.rsi_period.get())
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        self.detect_with_rsi(bars, &rsi)
    }

    fn validate_config(&self) -> Result<()> {
        if self.rsi_period.get() < 2 {
            return Err(AnalysisError::InvalidConfig(
                "rsi_period must be at least 2".to_string(),
            ));
        }
        check_confidence("base_confidence", self.base_confidence)
    }
}

const RSI_DIVERGENCE_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("rsi_period", 14.0, (7.0, 21.0, 7.0), "RSI period"),
    ParamMeta::period("price_lookback", 20.0, (10.0, 30.0, 5.0), "Swing lookback on price"),
    ParamMeta::period("rsi_lookback", 10.0, (5.0, 15.0, 5.0), "Swing lookback on RSI"),
    ParamMeta::period("match_window", 10.0, (5.0, 15.0, 5.0), "Max bars between price and RSI swings"),
    ParamMeta::ratio("recent_fraction", 0.3, (0.2, 0.4, 0.1), "Staleness window"),
    ParamMeta::value("base_confidence", 8.0, (7.0, 8.5, 0.5), "Confidence before the RSI extreme bonus"),
];

impl ParameterizedDetector for RsiDivergenceDetector {
    fn param_meta() -> &'static [ParamMeta] {
        RSI_DIVERGENCE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let d = Self {
            rsi_period: get_period(params, "rsi_period", 14)?,
            price_lookback: get_period(params, "price_lookback", SwingExtractor::LONG_LOOKBACK)?,
            rsi_lookback: get_period(params, "rsi_lookback", SwingExtractor::MEDIUM_LOOKBACK)?,
            match_window: get_period(params, "match_window", 10)?,
            recent_fraction: get_ratio(params, "recent_fraction", 0.3)?,
            base_confidence: get_value(params, "base_confidence", 8.0)?,
        };
        d.validate_config()?;
        Ok(d)
    }

    fn detector_name() -> &'static str {
        "rsi-divergence"
    }
}

impl_with_defaults!(RsiDivergenceDetector);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Candle;

    /// Linear path through `(index, price)` pivots, candle `p ± 0.5`
    fn zigzag(pivots: &[(usize, f64)]) -> Vec<Candle> {
        let mut bars = Vec::new();
        for w in pivots.windows(2) {
            let ((i0, p0), (i1, p1)) = (w[0], w[1]);
            for i in i0..i1 {
                let p = p0 + (p1 - p0) * (i - i0) as f64 / (i1 - i0) as f64;
                bars.push(Candle::new(i as i64, p, p + 0.5, p - 0.5, p, 1000.0));
            }
        }
        let (i, p) = pivots[pivots.len() - 1];
        bars.push(Candle::new(i as i64, p, p + 0.5, p - 0.5, p, 1000.0));
        bars
    }

    fn bullish_setup() -> (Vec<Candle>, Vec<f64>) {
        let bars = zigzag(&[(0, 120.0), (145, 100.0), (160, 110.0), (175, 95.0), (199, 105.0)]);
        let mut rsi = vec![50.0; bars.len()];
        rsi[146] = 25.0;
        rsi[176] = 30.0;
        (bars, rsi)
    }

    #[test]
    fn test_bullish_divergence() {
        let (bars, rsi) = bullish_setup();
        assert_eq!(bars.len(), 200);
        let m = RsiDivergenceDetector::default()
            .detect_with_rsi(&bars, &rsi)
            .unwrap();
        assert_eq!(m.kind, PatternKind::RsiDivergence);
        assert_eq!(m.direction, Direction::Bullish);
        assert_eq!(m.confidence.get(), 8.0);
        assert_eq!(m.key_point("first_low").unwrap().index, 145);
        assert_eq!(m.key_point("second_low").unwrap().index, 175);
        assert_eq!(m.invalidation, Some(94.5));
        assert_eq!(m.targets, vec![110.5]);
        assert!(m.is_temporally_ordered());
    }

    #[test]
    fn test_oversold_rsi_lifts_confidence() {
        let (bars, mut rsi) = bullish_setup();
        rsi[199] = 28.0;
        let d = RsiDivergenceDetector::default();
        assert_eq!(d.detect_with_rsi(&bars, &rsi).unwrap().confidence.get(), 8.5);
        rsi[199] = 20.0;
        assert_eq!(d.detect_with_rsi(&bars, &rsi).unwrap().confidence.get(), 9.0);
    }

    #[test]
    fn test_confirming_momentum_is_not_divergence() {
        let (bars, mut rsi) = bullish_setup();
        // RSI also makes a lower low
        rsi[176] = 20.0;
        assert!(RsiDivergenceDetector::default()
            .detect_with_rsi(&bars, &rsi)
            .is_none());
    }

    #[test]
    fn test_bearish_mirror() {
        let (bars, rsi) = bullish_setup();
        let bars: Vec<Candle> = bars
            .into_iter()
            .map(|c| {
                let p = 200.0 - c.close;
                Candle::new(c.timestamp, p, p + 0.5, p - 0.5, p, c.volume)
            })
            .collect();
        let rsi: Vec<f64> = rsi.iter().map(|r| 100.0 - r).collect();
        let m = RsiDivergenceDetector::default()
            .detect_with_rsi(&bars, &rsi)
            .unwrap();
        assert_eq!(m.direction, Direction::Bearish);
        assert_eq!(m.key_point("second_high").unwrap().price, 105.5);
    }

    #[test]
    fn test_stale_swings_rejected() {
        // Same shape, padded with 150 flat bars so both lows fall out of the last 30%
        let (mut bars, mut rsi) = bullish_setup();
        for i in 200..350 {
            bars.push(Candle::new(i as i64, 105.0, 105.5, 104.5, 105.0, 1000.0));
            rsi.push(50.0);
        }
        assert!(RsiDivergenceDetector::default()
            .detect_with_rsi(&bars, &rsi)
            .is_none());
    }

    #[test]
    fn test_misaligned_rsi_ignored() {
        let (bars, rsi) = bullish_setup();
        assert!(RsiDivergenceDetector::default()
            .detect_with_rsi(&bars, &rsi[1..])
            .is_none());
    }

    #[test]
    fn test_short_series() {
        let (bars, _) = bullish_setup();
        assert!(RsiDivergenceDetector::default()
            .detect(&bars[..30], &MarketContext::default())
            .is_none());
    }
}
