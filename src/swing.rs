//! Swing point extraction
//!
//! A bar at index `i` is a swing high when its high is strictly greater than
//! every other high in `[i - L, i + L]`; swing lows mirror this on lows. Only
//! indices with a full window on both sides (`L <= i < n - L`) qualify, so a
//! series shorter than `2L + 1` yields no swings at all.

use serde::{Deserialize, Serialize};

use crate::{Period, Result, OHLCV};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingKind {
    High,
    Low,
}

/// Local extremum of a price (or oscillator) series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub kind: SwingKind,
    pub price: f64,
    /// Position in the source series
    pub index: usize,
    pub timestamp: Option<i64>,
}

impl SwingPoint {
    #[inline]
    pub fn is_high(&self) -> bool {
        self.kind == SwingKind::High
    }

    #[inline]
    pub fn is_low(&self) -> bool {
        self.kind == SwingKind::Low
    }
}

/// Symmetric-window swing detector
#[derive(Debug, Clone, Copy)]
pub struct SwingExtractor {
    lookback: Period,
}

impl Default for SwingExtractor {
    fn default() -> Self {
        Self::new(Period::new_const(Self::SHORT_LOOKBACK))
    }
}

impl SwingExtractor {
    /// Lookback used by chart and harmonic patterns
    pub const SHORT_LOOKBACK: usize = 5;
    /// Lookback used by market structure and RSI swings
    pub const MEDIUM_LOOKBACK: usize = 10;
    /// Lookback used by divergence price swings
    pub const LONG_LOOKBACK: usize = 20;

    pub fn new(lookback: Period) -> Self {
        Self { lookback }
    }

    pub fn with_lookback(lookback: usize) -> Result<Self> {
        Ok(Self::new(Period::new(lookback)?))
    }

    #[inline]
    pub fn lookback(&self) -> usize {
        self.lookback.get()
    }

    /// Smallest series that can contain a swing
    #[inline]
    pub fn min_bars(&self) -> usize {
        2 * self.lookback() + 1
    }

    /// Swing highs and lows of a candle series, ordered by index.
    /// A bar that is both (an outside bar) yields the high first.
    pub fn extract<T: OHLCV>(&self, bars: &[T]) -> Vec<SwingPoint> {
        let highs: Vec<f64> = bars.iter().map(|b| b.high()).collect();
        let lows: Vec<f64> = bars.iter().map(|b| b.low()).collect();
        let mut swings = self.extract_series(&highs, &lows);
        for s in &mut swings {
            s.timestamp = bars[s.index].timestamp();
        }
        swings
    }

    /// Same rule over raw value series. For a single series (e.g. RSI) pass
    /// it as both `highs` and `lows`.
    pub fn extract_series(&self, highs: &[f64], lows: &[f64]) -> Vec<SwingPoint> {
        let n = highs.len().min(lows.len());
        let l = self.lookback();
        let mut swings = Vec::new();

        if n < self.min_bars() {
            return swings;
        }

        for i in l..n - l {
            if is_extreme(highs, i, l, |candidate, other| candidate > other) {
                swings.push(SwingPoint {
                    kind: SwingKind::High,
                    price: highs[i],
                    index: i,
                    timestamp: None,
                });
            }
            if is_extreme(lows, i, l, |candidate, other| candidate < other) {
                swings.push(SwingPoint {
                    kind: SwingKind::Low,
                    price: lows[i],
                    index: i,
                    timestamp: None,
                });
            }
        }

        swings
    }

    /// Only swing highs
    pub fn swing_highs<T: OHLCV>(&self, bars: &[T]) -> Vec<SwingPoint> {
        only(&self.extract(bars), SwingKind::High)
    }

    /// Only swing lows
    pub fn swing_lows<T: OHLCV>(&self, bars: &[T]) -> Vec<SwingPoint> {
        only(&self.extract(bars), SwingKind::Low)
    }
}

/// `values[i]` beats every neighbour in the window. NaN never qualifies,
/// since every comparison against it is false.
#[inline]
fn is_extreme(values: &[f64], i: usize, l: usize, beats: impl Fn(f64, f64) -> bool) -> bool {
    let candidate = values[i];
    (i - l..=i + l)
        .filter(|&j| j != i)
        .all(|j| beats(candidate, values[j]))
}

/// Filter swings by kind, preserving order
pub fn only(swings: &[SwingPoint], kind: SwingKind) -> Vec<SwingPoint> {
    swings.iter().copied().filter(|s| s.kind == kind).collect()
}

/// First swing of `kind` strictly after `index`
pub fn next_after(swings: &[SwingPoint], index: usize, kind: SwingKind) -> Option<SwingPoint> {
    swings
        .iter()
        .find(|s| s.index > index && s.kind == kind)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Candle;

    fn series(prices: &[f64]) -> Vec<Candle> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &p)| Candle::new(i as i64 * 1000, p, p + 1.0, p - 1.0, p, 100.0))
            .collect()
    }

    #[test]
    fn test_short_input_is_empty() {
        let ex = SwingExtractor::with_lookback(5).unwrap();
        let bars = series(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 5.0, 4.0, 3.0, 2.0]);
        assert_eq!(bars.len(), 10);
        assert!(ex.extract(&bars).is_empty());
    }

    #[test]
    fn test_single_peak_and_trough() {
        let ex = SwingExtractor::with_lookback(2).unwrap();
        let bars = series(&[10.0, 11.0, 15.0, 11.0, 10.0, 8.0, 5.0, 8.0, 9.0]);
        let swings = ex.extract(&bars);

        assert_eq!(swings.len(), 2);
        assert_eq!(swings[0].kind, SwingKind::High);
        assert_eq!(swings[0].index, 2);
        assert_eq!(swings[0].price, 16.0);
        assert_eq!(swings[0].timestamp, Some(2000));
        assert_eq!(swings[1].kind, SwingKind::Low);
        assert_eq!(swings[1].index, 6);
        assert_eq!(swings[1].price, 4.0);
    }

    #[test]
    fn test_equal_highs_are_not_swings() {
        let ex = SwingExtractor::with_lookback(1).unwrap();
        let bars = series(&[1.0, 5.0, 5.0, 1.0]);
        assert!(ex.swing_highs(&bars).is_empty());
    }

    #[test]
    fn test_nan_never_swings() {
        let ex = SwingExtractor::with_lookback(1).unwrap();
        let values = [f64::NAN, 5.0, 1.0, f64::NAN, 3.0];
        let swings = ex.extract_series(&values, &values);
        // index 1: neighbour NaN makes the strict comparison false
        assert!(swings.iter().all(|s| !s.price.is_nan()));
        assert!(swings.iter().all(|s| s.index != 1));
    }

    #[test]
    fn test_zero_lookback_rejected() {
        assert!(SwingExtractor::with_lookback(0).is_err());
    }

    #[test]
    fn test_next_after() {
        let ex = SwingExtractor::with_lookback(2).unwrap();
        let bars = series(&[10.0, 11.0, 15.0, 11.0, 10.0, 8.0, 5.0, 8.0, 9.0]);
        let swings = ex.extract(&bars);
        let low = next_after(&swings, 2, SwingKind::Low).unwrap();
        assert_eq!(low.index, 6);
        assert!(next_after(&swings, 6, SwingKind::High).is_none());
    }
}
