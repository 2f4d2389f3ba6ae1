//! Classical chart patterns built on short-lookback swing points.
//!
//! All three detectors read the swings from [`MarketContext`] and scan from
//! the most recent candidate backwards, reporting the first one that passes.
//! The last defining swing must sit in the most recent 30% of the series.

use std::collections::HashMap;

use crate::detectors::helpers::{check_confidence, fit_line, is_recent, relative_diff, Line};
use crate::params::{get_period, get_ratio, get_value, ParamMeta, ParameterizedDetector};
use crate::scoring::{ConfidenceStage, VolumeConfirmation};
use crate::swing::{only, SwingKind, SwingPoint};
use crate::{
    AnalysisError, Direction, MarketContext, PatternDetector, PatternKind, PatternMatch, Ratio,
    Result, OHLCV,
};

/// Default staleness window for chart patterns
pub const CHART_RECENT_FRACTION: f64 = 0.3;

/// Lowest low (or highest high when `highest`) strictly between two indices
fn extreme_between<T: OHLCV>(bars: &[T], from: usize, to: usize, highest: bool) -> Option<(usize, f64)> {
    let inner = from + 1..to;
    if inner.is_empty() {
        return None;
    }
    let mut best: Option<(usize, f64)> = None;
    for i in inner {
        let v = if highest { bars[i].high() } else { bars[i].low() };
        let better = match best {
            None => true,
            Some((_, b)) => (highest && v > b) || (!highest && v < b),
        };
        if better {
            best = Some((i, v));
        }
    }
    best
}

// ============================================================
// HEAD AND SHOULDERS
// ============================================================

/// Head-and-shoulders over three swing highs, inverse over three swing lows
#[derive(Debug, Clone)]
pub struct HeadAndShouldersDetector {
    /// Head must exceed both shoulders by this fraction
    pub head_margin: Ratio,
    /// Max relative difference between shoulder prices
    pub shoulder_tolerance: Ratio,
    /// Allowed right/left spacing ratio
    pub spacing_range: (f64, f64),
    pub recent_fraction: Ratio,
    pub confidence: f64,
}

impl Default for HeadAndShouldersDetector {
    fn default() -> Self {
        Self {
            head_margin: Ratio::new_const(0.02),
            shoulder_tolerance: Ratio::new_const(0.05),
            spacing_range: (0.5, 2.0),
            recent_fraction: Ratio::new_const(CHART_RECENT_FRACTION),
            confidence: 8.0,
        }
    }
}

impl HeadAndShouldersDetector {
    fn shape_matches(&self, ls: &SwingPoint, head: &SwingPoint, rs: &SwingPoint, top: bool) -> bool {
        let m = self.head_margin.get();
        let head_clears = if top {
            head.price >= ls.price * (1.0 + m) && head.price >= rs.price * (1.0 + m)
        } else {
            head.price <= ls.price * (1.0 - m) && head.price <= rs.price * (1.0 - m)
        };
        if !head_clears {
            return false;
        }
        if relative_diff(ls.price, rs.price) > self.shoulder_tolerance.get() {
            return false;
        }
        let left = (head.index - ls.index) as f64;
        let right = (rs.index - head.index) as f64;
        let spacing = right / left;
        spacing >= self.spacing_range.0 && spacing <= self.spacing_range.1
    }

    fn scan<T: OHLCV>(&self, bars: &[T], swings: &[SwingPoint], top: bool) -> Option<PatternMatch> {
        let kind = if top { SwingKind::High } else { SwingKind::Low };
        let points = only(swings, kind);

        for w in points.windows(3).rev() {
            let (ls, head, rs) = (&w[0], &w[1], &w[2]);
            if !is_recent(rs.index, bars.len(), self.recent_fraction.get()) {
                break;
            }
            if !self.shape_matches(ls, head, rs, top) {
                continue;
            }
            // Neckline troughs (peaks for the inverse) between the shoulders and head
            let Some((lt_idx, lt)) = extreme_between(bars, ls.index, head.index, !top) else {
                continue;
            };
            let Some((rt_idx, rt)) = extreme_between(bars, head.index, rs.index, !top) else {
                continue;
            };
            let neckline = (lt + rt) / 2.0;
            let height = head.price - neckline;

            let (pattern, direction) = if top {
                (PatternKind::HeadAndShoulders, Direction::Bearish)
            } else {
                (PatternKind::InverseHeadAndShoulders, Direction::Bullish)
            };

            let m = PatternMatch::new(pattern, direction, self.confidence, ls.index, rs.index)
                .with_key_point("left_shoulder", ls.price, ls.index)
                .with_key_point("left_neck", lt, lt_idx)
                .with_key_point("head", head.price, head.index)
                .with_key_point("right_neck", rt, rt_idx)
                .with_key_point("right_shoulder", rs.price, rs.index)
                .with_entry(neckline)
                .with_invalidation(head.price)
                .with_targets([neckline - height]);
            return Some(m);
        }
        None
    }
}

impl PatternDetector for HeadAndShouldersDetector {
    fn name(&self) -> &'static str {
        "head-and-shoulders"
    }

    fn min_bars(&self) -> usize {
        30
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let top = self.scan(bars, &ctx.swings, true);
        let bottom = self.scan(bars, &ctx.swings, false);
        let best = match (top, bottom) {
            (Some(a), Some(b)) => Some(if b.end_index > a.end_index { b } else { a }),
            (a, b) => a.or(b),
        }?;
        Some(VolumeConfirmation::new(bars).apply(best))
    }

    fn validate_config(&self) -> Result<()> {
        let (lo, hi) = self.spacing_range;
        if !(lo > 0.0 && lo <= hi && hi.is_finite()) {
            return Err(AnalysisError::InvalidConfig(format!(
                "spacing_range ({lo}, {hi}) must satisfy 0 < min <= max"
            )));
        }
        check_confidence("confidence", self.confidence)
    }
}

// ============================================================
// DOUBLE TOP / BOTTOM
// ============================================================

/// Two similar swing extremes with a retracement of minimum depth between
#[derive(Debug, Clone)]
pub struct DoubleTopBottomDetector {
    /// Max relative difference between the two extremes
    pub tolerance: Ratio,
    /// Min retracement between them, relative to their mean
    pub min_depth: Ratio,
    pub recent_fraction: Ratio,
    pub confidence: f64,
}

impl Default for DoubleTopBottomDetector {
    fn default() -> Self {
        Self {
            tolerance: Ratio::new_const(0.03),
            min_depth: Ratio::new_const(0.03),
            recent_fraction: Ratio::new_const(CHART_RECENT_FRACTION),
            confidence: 7.0,
        }
    }
}

impl DoubleTopBottomDetector {
    fn scan<T: OHLCV>(&self, bars: &[T], swings: &[SwingPoint], top: bool) -> Option<PatternMatch> {
        let kind = if top { SwingKind::High } else { SwingKind::Low };
        let points = only(swings, kind);

        for w in points.windows(2).rev() {
            let (first, second) = (&w[0], &w[1]);
            if !is_recent(second.index, bars.len(), self.recent_fraction.get()) {
                break;
            }
            if relative_diff(first.price, second.price) > self.tolerance.get() {
                continue;
            }
            let Some((mid_idx, mid)) = extreme_between(bars, first.index, second.index, !top)
            else {
                continue;
            };
            let level = (first.price + second.price) / 2.0;
            let height = level - mid;
            if height.abs() / level < self.min_depth.get() {
                continue;
            }

            let (pattern, direction, invalidation) = if top {
                (
                    PatternKind::DoubleTop,
                    Direction::Bearish,
                    first.price.max(second.price),
                )
            } else {
                (
                    PatternKind::DoubleBottom,
                    Direction::Bullish,
                    first.price.min(second.price),
                )
            };

            let m = PatternMatch::new(pattern, direction, self.confidence, first.index, second.index)
                .with_key_point("first", first.price, first.index)
                .with_key_point("middle", mid, mid_idx)
                .with_key_point("second", second.price, second.index)
                .with_entry(mid)
                .with_invalidation(invalidation)
                .with_targets([mid - height]);
            return Some(m);
        }
        None
    }
}

impl PatternDetector for DoubleTopBottomDetector {
    fn name(&self) -> &'static str {
        "double-top-bottom"
    }

    fn min_bars(&self) -> usize {
        20
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let top = self.scan(bars, &ctx.swings, true);
        let bottom = self.scan(bars, &ctx.swings, false);
        let best = match (top, bottom) {
            (Some(a), Some(b)) => Some(if b.end_index > a.end_index { b } else { a }),
            (a, b) => a.or(b),
        }?;
        Some(VolumeConfirmation::new(bars).apply(best))
    }

    fn validate_config(&self) -> Result<()> {
        if self.tolerance.get() <= 0.0 {
            return Err(AnalysisError::InvalidConfig(
                "double top tolerance must be positive".to_string(),
            ));
        }
        check_confidence("confidence", self.confidence)
    }
}

// ============================================================
// TRIANGLE
// ============================================================

/// Converging regression lines over the latest swing highs and lows.
///
/// Ascending (flat top, rising lows) is bullish, descending (falling highs,
/// flat bottom) bearish. A symmetrical triangle takes the trend direction,
/// or the side of the midline the last close sits on while ranging.
#[derive(Debug, Clone)]
pub struct TriangleDetector {
    /// Swings per side fed to each regression
    pub points: usize,
    /// Slope per bar, relative to price, below which a line counts as flat
    pub flat_slope: f64,
    pub recent_fraction: Ratio,
    pub confidence: f64,
}

impl Default for TriangleDetector {
    fn default() -> Self {
        Self {
            points: 3,
            flat_slope: 0.0005,
            recent_fraction: Ratio::new_const(CHART_RECENT_FRACTION),
            confidence: 6.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slope {
    Rising,
    Flat,
    Falling,
}

impl TriangleDetector {
    fn classify(&self, line: &Line, price: f64) -> Slope {
        let rel = line.slope / price;
        if rel.abs() < self.flat_slope {
            Slope::Flat
        } else if rel > 0.0 {
            Slope::Rising
        } else {
            Slope::Falling
        }
    }
}

impl PatternDetector for TriangleDetector {
    fn name(&self) -> &'static str {
        "triangle"
    }

    fn min_bars(&self) -> usize {
        30
    }

    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let highs = only(&ctx.swings, SwingKind::High);
        let lows = only(&ctx.swings, SwingKind::Low);
        let highs = &highs[highs.len().saturating_sub(self.points)..];
        let lows = &lows[lows.len().saturating_sub(self.points)..];
        if highs.len() < 2 || lows.len() < 2 {
            return None;
        }

        let last_swing = highs
            .iter()
            .chain(lows)
            .map(|s| s.index)
            .max()?;
        if !is_recent(last_swing, bars.len(), self.recent_fraction.get()) {
            return None;
        }

        let to_xy = |s: &SwingPoint| (s.index as f64, s.price);
        let upper = fit_line(&highs.iter().map(to_xy).collect::<Vec<_>>())?;
        let lower = fit_line(&lows.iter().map(to_xy).collect::<Vec<_>>())?;

        let start = highs[0].index.min(lows[0].index);
        let end = bars.len() - 1;
        let (x0, x1) = (start as f64, end as f64);
        let width_start = upper.at(x0) - lower.at(x0);
        let width_end = upper.at(x1) - lower.at(x1);
        if !(width_start > 0.0 && width_end > 0.0 && width_end < width_start) {
            return None;
        }

        let price = bars[end].close();
        let direction = match (self.classify(&upper, price), self.classify(&lower, price)) {
            (Slope::Flat, Slope::Rising) => Direction::Bullish,
            (Slope::Falling, Slope::Flat) => Direction::Bearish,
            (Slope::Falling, Slope::Rising) => match ctx.structure.direction() {
                Some(d) => d,
                None if price >= (upper.at(x1) + lower.at(x1)) / 2.0 => Direction::Bullish,
                None => Direction::Bearish,
            },
            _ => return None,
        };

        let mut points: Vec<(&'static str, &SwingPoint)> = highs
            .iter()
            .map(|s| ("high", s))
            .chain(lows.iter().map(|s| ("low", s)))
            .collect();
        points.sort_by_key(|(_, s)| s.index);
        points.dedup_by_key(|(_, s)| s.index);

        let (invalidation, target) = match direction {
            Direction::Bullish => (lower.at(x1), upper.at(x1) + width_start),
            Direction::Bearish => (upper.at(x1), lower.at(x1) - width_start),
        };

        let mut m = PatternMatch::new(PatternKind::Triangle, direction, self.confidence, start, end);
        for (label, s) in points {
            m = m.with_key_point(label, s.price, s.index);
        }
        let m = m
            .with_entry(price)
            .with_invalidation(invalidation)
            .with_targets([target]);
        Some(VolumeConfirmation::new(bars).apply(m))
    }

    fn validate_config(&self) -> Result<()> {
        if self.points < 2 {
            return Err(AnalysisError::InvalidConfig(
                "triangle needs at least 2 swings per side".to_string(),
            ));
        }
        if !(self.flat_slope > 0.0 && self.flat_slope.is_finite()) {
            return Err(AnalysisError::OutOfRange {
                field: "flat_slope",
                value: self.flat_slope,
                min: 0.0,
                max: f64::INFINITY,
            });
        }
        check_confidence("confidence", self.confidence)
    }
}

// ============================================================
// PARAMETERS
// ============================================================

const HEAD_AND_SHOULDERS_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("head_margin", 0.02, (0.01, 0.05, 0.01), "Head excess over both shoulders"),
    ParamMeta::ratio("shoulder_tolerance", 0.05, (0.02, 0.08, 0.01), "Max shoulder price difference"),
    ParamMeta::value("spacing_min", 0.5, (0.3, 0.7, 0.1), "Min right/left shoulder spacing ratio"),
    ParamMeta::value("spacing_max", 2.0, (1.5, 3.0, 0.5), "Max right/left shoulder spacing ratio"),
    ParamMeta::ratio("recent_fraction", CHART_RECENT_FRACTION, (0.2, 0.4, 0.1), "Staleness window"),
    ParamMeta::value("confidence", 8.0, (6.0, 9.0, 0.5), "Base confidence"),
];

impl ParameterizedDetector for HeadAndShouldersDetector {
    fn param_meta() -> &'static [ParamMeta] {
        HEAD_AND_SHOULDERS_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let d = Self {
            head_margin: get_ratio(params, "head_margin", 0.02)?,
            shoulder_tolerance: get_ratio(params, "shoulder_tolerance", 0.05)?,
            spacing_range: (
                get_value(params, "spacing_min", 0.5)?,
                get_value(params, "spacing_max", 2.0)?,
            ),
            recent_fraction: get_ratio(params, "recent_fraction", CHART_RECENT_FRACTION)?,
            confidence: get_value(params, "confidence", 8.0)?,
        };
        d.validate_config()?;
        Ok(d)
    }

    fn detector_name() -> &'static str {
        "head-and-shoulders"
    }
}

const DOUBLE_TOP_BOTTOM_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("tolerance", 0.03, (0.01, 0.05, 0.01), "Max difference between the extremes"),
    ParamMeta::ratio("min_depth", 0.03, (0.02, 0.06, 0.01), "Min retracement between the extremes"),
    ParamMeta::ratio("recent_fraction", CHART_RECENT_FRACTION, (0.2, 0.4, 0.1), "Staleness window"),
    ParamMeta::value("confidence", 7.0, (6.0, 8.0, 0.5), "Base confidence"),
];

impl ParameterizedDetector for DoubleTopBottomDetector {
    fn param_meta() -> &'static [ParamMeta] {
        DOUBLE_TOP_BOTTOM_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let d = Self {
            tolerance: get_ratio(params, "tolerance", 0.03)?,
            min_depth: get_ratio(params, "min_depth", 0.03)?,
            recent_fraction: get_ratio(params, "recent_fraction", CHART_RECENT_FRACTION)?,
            confidence: get_value(params, "confidence", 7.0)?,
        };
        d.validate_config()?;
        Ok(d)
    }

    fn detector_name() -> &'static str {
        "double-top-bottom"
    }
}

const TRIANGLE_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("points", 3.0, (2.0, 5.0, 1.0), "Swings per side in each trendline fit"),
    ParamMeta::value("flat_slope", 0.0005, (0.0002, 0.001, 0.0002), "Relative slope per bar counted as flat"),
    ParamMeta::ratio("recent_fraction", CHART_RECENT_FRACTION, (0.2, 0.4, 0.1), "Staleness window"),
    ParamMeta::value("confidence", 6.5, (5.5, 7.5, 0.5), "Base confidence"),
];

impl ParameterizedDetector for TriangleDetector {
    fn param_meta() -> &'static [ParamMeta] {
        TRIANGLE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let d = Self {
            points: get_period(params, "points", 3)?.get(),
            flat_slope: get_value(params, "flat_slope", 0.0005)?,
            recent_fraction: get_ratio(params, "recent_fraction", CHART_RECENT_FRACTION)?,
            confidence: get_value(params, "confidence", 6.5)?,
        };
        d.validate_config()?;
        Ok(d)
    }

    fn detector_name() -> &'static str {
        "triangle"
    }
}

impl_with_defaults!(HeadAndShouldersDetector, DoubleTopBottomDetector, TriangleDetector);
