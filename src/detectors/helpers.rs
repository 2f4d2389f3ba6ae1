//! Common helper functions shared across detector modules.
//!
//! Candle-shape thresholds compare against trailing averages and fall back
//! to fixed body/range ratios when the average is not meaningful.

use crate::{AnalysisError, Confidence, OHLCVExt, Result, OHLCV};

// ============================================================
// CANDLE THRESHOLDS
// ============================================================

/// Body is short: body < avg_body * SHORT_FACTOR
pub const BODY_SHORT_FACTOR: f64 = 1.0;
/// Body is long: body > avg_body * LONG_FACTOR
pub const BODY_LONG_FACTOR: f64 = 1.0;
/// Trailing window for candle averages
pub const CANDLE_AVG_PERIOD: usize = 10;

// Fixed ratio rules (fraction of the bar's range)
pub const BODY_SHORT_RATIO: f64 = 0.35;
pub const BODY_LONG_RATIO: f64 = 0.6;
pub const SHADOW_VERYSHORT_RATIO: f64 = 0.1;
/// Hammer-family wick must be at least this many bodies long
pub const WICK_BODY_MULTIPLE: f64 = 2.0;

// ============================================================
// CANDLE SHAPE
// ============================================================

/// Check if body is short relative to the trailing average body
#[inline]
pub fn is_body_short(body: f64, avg_body: f64, range: f64, factor: f64) -> bool {
    if avg_body > 0.0 {
        body < avg_body * factor
    } else {
        range > 0.0 && body / range <= BODY_SHORT_RATIO
    }
}

/// Check if body is long relative to the trailing average body
#[inline]
pub fn is_body_long(body: f64, avg_body: f64, range: f64, factor: f64) -> bool {
    if avg_body > 0.0 {
        body > avg_body * factor
    } else {
        range > 0.0 && body / range >= BODY_LONG_RATIO
    }
}

/// Long body at `at`, against the trailing average once a full window of
/// history exists and against the fixed ratio before that.
#[inline]
pub fn is_long_body_at<T: OHLCV>(bars: &[T], at: usize, factor: f64) -> bool {
    let bar = &bars[at];
    let avg = if at >= CANDLE_AVG_PERIOD {
        trailing_avg_body(bars, at, CANDLE_AVG_PERIOD)
    } else {
        0.0
    };
    is_body_long(bar.body(), avg, bar.range(), factor)
}

/// Short body at `at`; see [`is_long_body_at`]
#[inline]
pub fn is_short_body_at<T: OHLCV>(bars: &[T], at: usize, factor: f64) -> bool {
    let bar = &bars[at];
    let avg = if at >= CANDLE_AVG_PERIOD {
        trailing_avg_body(bars, at, CANDLE_AVG_PERIOD)
    } else {
        0.0
    };
    is_body_short(bar.body(), avg, bar.range(), factor)
}

/// Small body with one long wick and almost no opposite wick.
/// `long_wick` and `short_wick` come from the same bar.
#[inline]
pub fn is_pin_bar<T: OHLCV>(bar: &T, long_wick: f64, short_wick: f64) -> bool {
    let range = bar.range();
    if range <= f64::EPSILON {
        return false;
    }
    let body = bar.body();
    body / range <= BODY_SHORT_RATIO
        && long_wick >= body * WICK_BODY_MULTIPLE
        && long_wick > 0.0
        && short_wick / range <= SHADOW_VERYSHORT_RATIO
}

/// Compute trailing average body at a specific bar index (bar excluded).
#[inline]
pub fn trailing_avg_body<T: OHLCV>(bars: &[T], at: usize, period: usize) -> f64 {
    if at == 0 {
        return OHLCVExt::body(&bars[0]);
    }
    let s = at.saturating_sub(period);
    let slice = &bars[s..at];
    let sum: f64 = slice.iter().map(|b| OHLCVExt::body(b)).sum();
    sum / slice.len() as f64
}

/// Close at `at - 1` below the close `lookback` bars earlier
#[inline]
pub fn in_decline<T: OHLCV>(bars: &[T], at: usize, lookback: usize) -> bool {
    at > lookback && bars[at - 1].close() < bars[at - 1 - lookback].close()
}

/// Close at `at - 1` above the close `lookback` bars earlier
#[inline]
pub fn in_advance<T: OHLCV>(bars: &[T], at: usize, lookback: usize) -> bool {
    at > lookback && bars[at - 1].close() > bars[at - 1 - lookback].close()
}

// ============================================================
// VOLUME
// ============================================================

/// Average volume of `period` bars before `at` (bar excluded).
#[inline]
pub fn trailing_avg_volume<T: OHLCV>(bars: &[T], at: usize, period: usize) -> f64 {
    if at == 0 {
        return bars.first().map(|b| b.volume()).unwrap_or(0.0);
    }
    let s = at.saturating_sub(period);
    mean_volume(&bars[s..at])
}

#[inline]
pub fn mean_volume<T: OHLCV>(bars: &[T]) -> f64 {
    if bars.is_empty() {
        return 0.0;
    }
    bars.iter().map(|b| b.volume()).sum::<f64>() / bars.len() as f64
}

// ============================================================
// RECENCY AND RATIOS
// ============================================================

/// First index of the most recent `fraction` of a series of `len` bars
#[inline]
pub fn recent_start(len: usize, fraction: f64) -> usize {
    let span = (len as f64 * fraction).round() as usize;
    len.saturating_sub(span)
}

/// Staleness guard: `index` lies in the most recent `fraction` of the series
#[inline]
pub fn is_recent(index: usize, len: usize, fraction: f64) -> bool {
    index < len && index >= recent_start(len, fraction)
}

/// `actual` within a relative `tolerance` of `target`
#[inline]
pub fn ratio_matches(actual: f64, target: f64, tolerance: f64) -> bool {
    target != 0.0 && ((actual - target) / target).abs() <= tolerance
}

#[inline]
pub fn in_range(value: f64, (lo, hi): (f64, f64)) -> bool {
    value >= lo && value <= hi
}

/// |a - b| relative to the larger magnitude
#[inline]
pub fn relative_diff(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale <= f64::EPSILON {
        0.0
    } else {
        (a - b).abs() / scale
    }
}

/// Configured confidence must lie on the 0..=10 scale
pub fn check_confidence(field: &'static str, value: f64) -> Result<()> {
    if !(Confidence::MIN..=Confidence::MAX).contains(&value) {
        return Err(AnalysisError::OutOfRange {
            field,
            value,
            min: Confidence::MIN,
            max: Confidence::MAX,
        });
    }
    Ok(())
}

// ============================================================
// TRENDLINES
// ============================================================

/// Least-squares line over (index, price) points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub slope: f64,
    pub intercept: f64,
}

impl Line {
    #[inline]
    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Fit a line; needs two points with distinct x
pub fn fit_line(points: &[(f64, f64)]) -> Option<Line> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for &(x, y) in points {
        sxy += (x - mean_x) * (y - mean_y);
        sxx += (x - mean_x) * (x - mean_x);
    }
    if sxx <= f64::EPSILON {
        return None;
    }
    let slope = sxy / sxx;
    Some(Line {
        slope,
        intercept: mean_y - slope * mean_x,
    })
}
