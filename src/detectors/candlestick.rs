//! Candlestick formations on the last one to three candles.
//!
//! Each detector only looks at the tail of the series, so a hit is always
//! current. Shapes are fixed body/wick ratio rules; the two- and three-bar
//! formations also compare bodies against the trailing average body. Every
//! formation is a reversal and needs the opposite move into its first candle.

use std::collections::HashMap;

use crate::detectors::helpers::{
    self, check_confidence, in_advance, in_decline, is_long_body_at, is_pin_bar, is_short_body_at,
};
use crate::params::{get_period, get_value, ParamMeta, ParameterizedDetector};
use crate::scoring::{ConfidenceStage, VolumeConfirmation};
use crate::{
    CandleKind, Direction, MarketContext, OHLCVExt, PatternDetector, PatternKind, PatternMatch,
    Period, Result, OHLCV,
};

/// Bars of prior move required before a reversal candle
const TREND_LOOKBACK: usize = 5;

/// Build the match for a formation spanning `start..=end` and run the
/// volume bonus over it.
fn finish<T: OHLCV>(
    bars: &[T],
    kind: CandleKind,
    confidence: f64,
    start: usize,
    end: usize,
) -> PatternMatch {
    let direction = kind.direction();
    let (at, extreme, label) = match direction {
        Direction::Bullish => {
            let (at, low) = (start..=end)
                .map(|i| (i, bars[i].low()))
                .fold((start, f64::INFINITY), |acc, x| if x.1 < acc.1 { x } else { acc });
            (at, low, "low")
        }
        Direction::Bearish => {
            let (at, high) = (start..=end)
                .map(|i| (i, bars[i].high()))
                .fold((start, f64::NEG_INFINITY), |acc, x| if x.1 > acc.1 { x } else { acc });
            (at, high, "high")
        }
    };
    let close = bars[end].close();

    let mut m = PatternMatch::new(
        PatternKind::Candlestick(kind),
        direction,
        confidence,
        start,
        end,
    )
    .with_key_point(label, extreme, at)
    .with_entry(close)
    .with_invalidation(extreme);
    if at < end {
        m = m.with_key_point("close", close, end);
    }

    VolumeConfirmation::new(bars).apply(m)
}

// ============================================================
// SINGLE BAR
// ============================================================

/// Hammer: small body near the high, long lower wick, after a decline
#[derive(Debug, Clone)]
pub struct HammerDetector {
    pub trend_lookback: Period,
    pub confidence: f64,
}

impl Default for HammerDetector {
    fn default() -> Self {
        Self {
            trend_lookback: Period::new_const(TREND_LOOKBACK),
            confidence: 6.0,
        }
    }
}

impl PatternDetector for HammerDetector {
    fn name(&self) -> &'static str {
        CandleKind::Hammer.pattern_name()
    }

    fn min_bars(&self) -> usize {
        self.trend_lookback.get() + 1
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &MarketContext) -> Option<PatternMatch> {
        let i = bars.len().checked_sub(1)?;
        let bar = &bars[i];
        if !is_pin_bar(bar, bar.lower_shadow(), bar.upper_shadow()) {
            return None;
        }
        if !in_decline(bars, i, self.trend_lookback.get()) {
            return None;
        }
        Some(finish(bars, CandleKind::Hammer, self.confidence, i, i))
    }
}

/// Shooting star: small body near the low, long upper wick, after an advance
#[derive(Debug, Clone)]
pub struct ShootingStarDetector {
    pub trend_lookback: Period,
    pub confidence: f64,
}

impl Default for ShootingStarDetector {
    fn default() -> Self {
        Self {
            trend_lookback: Period::new_const(TREND_LOOKBACK),
            confidence: 6.0,
        }
    }
}

impl PatternDetector for ShootingStarDetector {
    fn name(&self) -> &'static str {
        CandleKind::ShootingStar.pattern_name()
    }

    fn min_bars(&self) -> usize {
        self.trend_lookback.get() + 1
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &MarketContext) -> Option<PatternMatch> {
        let i = bars.len().checked_sub(1)?;
        let bar = &bars[i];
        if !is_pin_bar(bar, bar.upper_shadow(), bar.lower_shadow()) {
            return None;
        }
        if !in_advance(bars, i, self.trend_lookback.get()) {
            return None;
        }
        Some(finish(bars, CandleKind::ShootingStar, self.confidence, i, i))
    }
}

// ============================================================
// TWO BAR
// ============================================================

/// Engulfing: the last body swallows the previous, opposite-colored body.
/// Reports bullish or bearish depending on the last candle's color, and only
/// against the prior move.
#[derive(Debug, Clone)]
pub struct EngulfingDetector {
    pub trend_lookback: Period,
    /// Both ends strictly engulfed
    pub strict_confidence: f64,
    /// One end equal
    pub loose_confidence: f64,
}

impl Default for EngulfingDetector {
    fn default() -> Self {
        Self {
            trend_lookback: Period::new_const(TREND_LOOKBACK),
            strict_confidence: 7.0,
            loose_confidence: 6.5,
        }
    }
}

impl PatternDetector for EngulfingDetector {
    fn name(&self) -> &'static str {
        "candlestick-engulfing"
    }

    fn min_bars(&self) -> usize {
        self.trend_lookback.get() + 3
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &MarketContext) -> Option<PatternMatch> {
        let i = bars.len().checked_sub(1)?;
        if i < 1 {
            return None;
        }
        let prev = &bars[i - 1];
        let curr = &bars[i];
        let lookback = self.trend_lookback.get();

        let kind = if curr.is_bullish() && prev.is_bearish() {
            if !in_decline(bars, i - 1, lookback) {
                return None;
            }
            // At most one end may be equal
            let engulfs = (curr.close() >= prev.open() && curr.open() < prev.close())
                || (curr.close() > prev.open() && curr.open() <= prev.close());
            engulfs.then_some(CandleKind::BullishEngulfing)?
        } else if curr.is_bearish() && prev.is_bullish() {
            if !in_advance(bars, i - 1, lookback) {
                return None;
            }
            let engulfs = (curr.open() >= prev.close() && curr.close() < prev.open())
                || (curr.open() > prev.close() && curr.close() <= prev.open());
            engulfs.then_some(CandleKind::BearishEngulfing)?
        } else {
            return None;
        };

        let strict = curr.open() != prev.close() && curr.close() != prev.open();
        let confidence = if strict {
            self.strict_confidence
        } else {
            self.loose_confidence
        };
        Some(finish(bars, kind, confidence, i - 1, i))
    }
}

/// Piercing line: long black candle, then a white candle opening below its
/// low and closing above its body midpoint but below its open. Needs a decline
/// into the black candle.
#[derive(Debug, Clone)]
pub struct PiercingDetector {
    pub trend_lookback: Period,
    pub body_long_factor: f64,
    pub confidence: f64,
}

impl Default for PiercingDetector {
    fn default() -> Self {
        Self {
            trend_lookback: Period::new_const(TREND_LOOKBACK),
            body_long_factor: helpers::BODY_LONG_FACTOR,
            confidence: 6.5,
        }
    }
}

impl PatternDetector for PiercingDetector {
    fn name(&self) -> &'static str {
        CandleKind::Piercing.pattern_name()
    }

    fn min_bars(&self) -> usize {
        self.trend_lookback.get() + 3
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &MarketContext) -> Option<PatternMatch> {
        let i = bars.len().checked_sub(1)?;
        if i < 1 {
            return None;
        }
        let prev = &bars[i - 1];
        let curr = &bars[i];

        if !(prev.is_bearish() && curr.is_bullish()) {
            return None;
        }
        if !in_decline(bars, i - 1, self.trend_lookback.get()) {
            return None;
        }
        if !is_long_body_at(bars, i - 1, self.body_long_factor)
            || !is_long_body_at(bars, i, self.body_long_factor)
        {
            return None;
        }
        if curr.open() >= prev.low() {
            return None;
        }
        if curr.close() <= prev.body_mid() || curr.close() >= prev.open() {
            return None;
        }
        Some(finish(bars, CandleKind::Piercing, self.confidence, i - 1, i))
    }
}

/// Dark cloud cover: long white candle, then a black candle opening above its
/// high and closing below its body midpoint but above its open. Needs an
/// advance into the white candle.
#[derive(Debug, Clone)]
pub struct DarkCloudCoverDetector {
    pub trend_lookback: Period,
    pub body_long_factor: f64,
    pub confidence: f64,
}

impl Default for DarkCloudCoverDetector {
    fn default() -> Self {
        Self {
            trend_lookback: Period::new_const(TREND_LOOKBACK),
            body_long_factor: helpers::BODY_LONG_FACTOR,
            confidence: 6.5,
        }
    }
}

impl PatternDetector for DarkCloudCoverDetector {
    fn name(&self) -> &'static str {
        CandleKind::DarkCloudCover.pattern_name()
    }

    fn min_bars(&self) -> usize {
        self.trend_lookback.get() + 3
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &MarketContext) -> Option<PatternMatch> {
        let i = bars.len().checked_sub(1)?;
        if i < 1 {
            return None;
        }
        let prev = &bars[i - 1];
        let curr = &bars[i];

        if !(prev.is_bullish() && curr.is_bearish()) {
            return None;
        }
        if !in_advance(bars, i - 1, self.trend_lookback.get()) {
            return None;
        }
        if !is_long_body_at(bars, i - 1, self.body_long_factor)
            || !is_long_body_at(bars, i, self.body_long_factor)
        {
            return None;
        }
        if curr.open() <= prev.high() {
            return None;
        }
        if curr.close() >= prev.body_mid() || curr.close() <= prev.open() {
            return None;
        }
        Some(finish(bars, CandleKind::DarkCloudCover, self.confidence, i - 1, i))
    }
}

// ============================================================
// THREE BAR
// ============================================================

/// Shared star check; `direction` is the reversal direction.
fn star<T: OHLCV>(
    bars: &[T],
    direction: Direction,
    trend_lookback: usize,
    long_factor: f64,
    short_factor: f64,
) -> bool {
    let Some(i) = bars.len().checked_sub(1) else {
        return false;
    };
    if i < 2 {
        return false;
    }
    let (first, second, third) = (&bars[i - 2], &bars[i - 1], &bars[i]);

    let prior_move = match direction {
        Direction::Bullish => in_decline(bars, i - 2, trend_lookback),
        Direction::Bearish => in_advance(bars, i - 2, trend_lookback),
    };
    if !prior_move {
        return false;
    }

    if !is_long_body_at(bars, i - 2, long_factor) {
        return false;
    }
    if !is_short_body_at(bars, i - 1, short_factor) {
        return false;
    }

    let second_top = second.open().max(second.close());
    let second_bottom = second.open().min(second.close());
    match direction {
        Direction::Bullish => {
            first.is_bearish()
                && second_top < first.close()
                && third.is_bullish()
                && third.close() > first.body_mid()
        }
        Direction::Bearish => {
            first.is_bullish()
                && second_bottom > first.close()
                && third.is_bearish()
                && third.close() < first.body_mid()
        }
    }
}

/// Morning star: long black candle, small body gapping below it, then a
/// white candle closing into the first body.
#[derive(Debug, Clone)]
pub struct MorningStarDetector {
    pub trend_lookback: Period,
    pub body_long_factor: f64,
    pub body_short_factor: f64,
    pub confidence: f64,
}

impl Default for MorningStarDetector {
    fn default() -> Self {
        Self {
            trend_lookback: Period::new_const(TREND_LOOKBACK),
            body_long_factor: helpers::BODY_LONG_FACTOR,
            body_short_factor: helpers::BODY_SHORT_FACTOR,
            confidence: 7.0,
        }
    }
}

impl PatternDetector for MorningStarDetector {
    fn name(&self) -> &'static str {
        CandleKind::MorningStar.pattern_name()
    }

    fn min_bars(&self) -> usize {
        self.trend_lookback.get() + 4
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &MarketContext) -> Option<PatternMatch> {
        if !star(
            bars,
            Direction::Bullish,
            self.trend_lookback.get(),
            self.body_long_factor,
            self.body_short_factor,
        ) {
            return None;
        }
        let i = bars.len() - 1;
        Some(finish(bars, CandleKind::MorningStar, self.confidence, i - 2, i))
    }
}

/// Evening star: mirror of the morning star at a top
#[derive(Debug, Clone)]
pub struct EveningStarDetector {
    pub trend_lookback: Period,
    pub body_long_factor: f64,
    pub body_short_factor: f64,
    pub confidence: f64,
}

impl Default for EveningStarDetector {
    fn default() -> Self {
        Self {
            trend_lookback: Period::new_const(TREND_LOOKBACK),
            body_long_factor: helpers::BODY_LONG_FACTOR,
            body_short_factor: helpers::BODY_SHORT_FACTOR,
            confidence: 7.0,
        }
    }
}

impl PatternDetector for EveningStarDetector {
    fn name(&self) -> &'static str {
        CandleKind::EveningStar.pattern_name()
    }

    fn min_bars(&self) -> usize {
        self.trend_lookback.get() + 4
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &MarketContext) -> Option<PatternMatch> {
        if !star(
            bars,
            Direction::Bearish,
            self.trend_lookback.get(),
            self.body_long_factor,
            self.body_short_factor,
        ) {
            return None;
        }
        let i = bars.len() - 1;
        Some(finish(bars, CandleKind::EveningStar, self.confidence, i - 2, i))
    }
}

// ============================================================
// PARAMETERS
// ============================================================

const PIN_BAR_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("trend_lookback", 5.0, (3.0, 10.0, 1.0), "Bars of prior move"),
    ParamMeta::value("confidence", 6.0, (5.0, 7.0, 0.5), "Base confidence"),
];

impl ParameterizedDetector for HammerDetector {
    fn param_meta() -> &'static [ParamMeta] {
        PIN_BAR_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let confidence = get_value(params, "confidence", 6.0)?;
        check_confidence("confidence", confidence)?;
        Ok(Self {
            trend_lookback: get_period(params, "trend_lookback", TREND_LOOKBACK)?,
            confidence,
        })
    }

    fn detector_name() -> &'static str {
        CandleKind::Hammer.pattern_name()
    }
}

impl ParameterizedDetector for ShootingStarDetector {
    fn param_meta() -> &'static [ParamMeta] {
        PIN_BAR_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let confidence = get_value(params, "confidence", 6.0)?;
        check_confidence("confidence", confidence)?;
        Ok(Self {
            trend_lookback: get_period(params, "trend_lookback", TREND_LOOKBACK)?,
            confidence,
        })
    }

    fn detector_name() -> &'static str {
        CandleKind::ShootingStar.pattern_name()
    }
}

impl_with_defaults!(
    HammerDetector,
    ShootingStarDetector,
    EngulfingDetector,
    PiercingDetector,
    DarkCloudCoverDetector,
    MorningStarDetector,
    EveningStarDetector,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Candle;

    fn c(o: f64, h: f64, l: f64, cl: f64) -> Candle {
        Candle::new(0, o, h, l, cl, 1000.0)
    }

    /// Stamp increasing timestamps
    fn series(mut bars: Vec<Candle>) -> Vec<Candle> {
        for (i, b) in bars.iter_mut().enumerate() {
            b.timestamp = i as i64;
        }
        bars
    }

    fn decline() -> Vec<Candle> {
        (0..6)
            .map(|i| {
                let p = 110.0 - 2.0 * i as f64;
                c(p + 0.5, p + 0.8, p - 0.3, p)
            })
            .collect()
    }

    fn advance() -> Vec<Candle> {
        (0..6)
            .map(|i| {
                let p = 90.0 + 2.0 * i as f64;
                c(p - 0.5, p + 0.3, p - 0.8, p)
            })
            .collect()
    }

    #[test]
    fn test_hammer_after_decline() {
        let mut bars = decline();
        bars.push(c(100.0, 100.1, 98.0, 100.05));
        let bars = series(bars);

        let m = HammerDetector::default()
            .detect(&bars, &MarketContext::default())
            .unwrap();
        assert_eq!(m.kind, PatternKind::Candlestick(CandleKind::Hammer));
        assert_eq!(m.direction, Direction::Bullish);
        assert_eq!(m.confidence.get(), 6.0);
        assert_eq!((m.start_index, m.end_index), (6, 6));
        assert_eq!(m.invalidation, Some(98.0));
    }

    #[test]
    fn test_hammer_needs_decline() {
        let mut bars = advance();
        bars.push(c(100.0, 100.1, 98.0, 100.05));
        let bars = series(bars);
        assert!(HammerDetector::default()
            .detect(&bars, &MarketContext::default())
            .is_none());
    }

    #[test]
    fn test_shooting_star_after_advance() {
        let mut bars = advance();
        bars.push(c(100.0, 102.0, 99.9, 99.95));
        let bars = series(bars);

        let m = ShootingStarDetector::default()
            .detect(&bars, &MarketContext::default())
            .unwrap();
        assert_eq!(m.direction, Direction::Bearish);
        assert_eq!(m.invalidation, Some(102.0));
    }

    /// Append `tail` to `prefix` and stamp timestamps
    fn after(mut prefix: Vec<Candle>, tail: &[Candle]) -> Vec<Candle> {
        prefix.extend_from_slice(tail);
        series(prefix)
    }

    #[test]
    fn test_bullish_engulfing() {
        let bars = after(
            decline(),
            &[c(100.0, 100.2, 98.8, 99.0), c(98.8, 100.6, 98.7, 100.5)],
        );
        let m = EngulfingDetector::default()
            .detect(&bars, &MarketContext::default())
            .unwrap();
        assert_eq!(m.kind, PatternKind::Candlestick(CandleKind::BullishEngulfing));
        assert_eq!(m.confidence.get(), 7.0);
        assert_eq!(m.start_index, 6);
    }

    #[test]
    fn test_bearish_engulfing_one_end_equal() {
        let bars = after(
            advance(),
            &[c(99.0, 100.2, 98.8, 100.0), c(100.0, 100.1, 98.5, 98.6)],
        );
        let m = EngulfingDetector::default()
            .detect(&bars, &MarketContext::default())
            .unwrap();
        assert_eq!(m.kind, PatternKind::Candlestick(CandleKind::BearishEngulfing));
        assert_eq!(m.confidence.get(), 6.5);
    }

    #[test]
    fn test_bearish_engulfing_at_fresh_low_rejected() {
        // Same two candles as above, but arriving after a decline
        let bars = after(
            decline(),
            &[c(99.0, 100.2, 98.8, 100.0), c(100.0, 100.1, 98.5, 98.6)],
        );
        assert!(EngulfingDetector::default()
            .detect(&bars, &MarketContext::default())
            .is_none());
    }

    #[test]
    fn test_bullish_engulfing_at_fresh_high_rejected() {
        let bars = after(
            advance(),
            &[c(100.0, 100.2, 98.8, 99.0), c(98.8, 100.6, 98.7, 100.5)],
        );
        assert!(EngulfingDetector::default()
            .detect(&bars, &MarketContext::default())
            .is_none());
    }

    #[test]
    fn test_engulfing_without_history() {
        let bars = series(vec![c(100.0, 100.2, 98.8, 99.0), c(98.8, 100.6, 98.7, 100.5)]);
        let detector = EngulfingDetector::default();
        assert_eq!(detector.min_bars(), 8);
        assert!(detector.detect(&bars, &MarketContext::default()).is_none());
    }

    #[test]
    fn test_same_color_is_not_engulfing() {
        let bars = after(
            decline(),
            &[c(99.0, 100.2, 98.8, 100.0), c(98.5, 101.0, 98.4, 100.9)],
        );
        assert!(EngulfingDetector::default()
            .detect(&bars, &MarketContext::default())
            .is_none());
    }

    #[test]
    fn test_piercing_line() {
        let bars = after(
            decline(),
            &[c(110.0, 110.5, 99.5, 100.0), c(99.0, 107.5, 98.8, 107.0)],
        );
        let m = PiercingDetector::default()
            .detect(&bars, &MarketContext::default())
            .unwrap();
        assert_eq!(m.direction, Direction::Bullish);
        assert_eq!(m.invalidation, Some(98.8));
        assert_eq!((m.start_index, m.end_index), (6, 7));
    }

    #[test]
    fn test_piercing_rejects_shallow_close() {
        // Closes below the first body's midpoint (105)
        let bars = after(
            decline(),
            &[c(110.0, 110.5, 99.5, 100.0), c(99.0, 104.5, 98.8, 104.0)],
        );
        assert!(PiercingDetector::default()
            .detect(&bars, &MarketContext::default())
            .is_none());
    }

    #[test]
    fn test_piercing_needs_decline() {
        let bars = after(
            advance(),
            &[c(110.0, 110.5, 99.5, 100.0), c(99.0, 107.5, 98.8, 107.0)],
        );
        assert!(PiercingDetector::default()
            .detect(&bars, &MarketContext::default())
            .is_none());
    }

    #[test]
    fn test_dark_cloud_cover() {
        let bars = after(
            advance(),
            &[c(100.0, 110.5, 99.5, 110.0), c(111.0, 111.2, 102.5, 103.0)],
        );
        let m = DarkCloudCoverDetector::default()
            .detect(&bars, &MarketContext::default())
            .unwrap();
        assert_eq!(m.direction, Direction::Bearish);
        assert_eq!(m.key_point("high").map(|k| k.price), Some(111.2));
    }

    #[test]
    fn test_dark_cloud_needs_long_black_body() {
        // Body 6.5 on a 15.5 range
        let bars = after(
            advance(),
            &[c(100.0, 110.5, 99.5, 110.0), c(111.0, 116.0, 100.5, 104.5)],
        );
        assert!(DarkCloudCoverDetector::default()
            .detect(&bars, &MarketContext::default())
            .is_none());
    }

    #[test]
    fn test_dark_cloud_needs_advance() {
        let bars = after(
            decline(),
            &[c(100.0, 110.5, 99.5, 110.0), c(111.0, 111.2, 102.5, 103.0)],
        );
        assert!(DarkCloudCoverDetector::default()
            .detect(&bars, &MarketContext::default())
            .is_none());
    }

    #[test]
    fn test_morning_star() {
        let bars = after(
            decline(),
            &[
                c(110.0, 110.5, 99.5, 100.0),
                c(98.5, 99.0, 97.5, 98.0),
                c(99.0, 107.5, 98.8, 107.0),
            ],
        );
        let m = MorningStarDetector::default()
            .detect(&bars, &MarketContext::default())
            .unwrap();
        assert_eq!((m.start_index, m.end_index), (6, 8));
        assert_eq!(m.confidence.get(), 7.0);
        assert!(m.is_temporally_ordered());
    }

    #[test]
    fn test_morning_star_needs_decline() {
        let bars = after(
            advance(),
            &[
                c(110.0, 110.5, 99.5, 100.0),
                c(98.5, 99.0, 97.5, 98.0),
                c(99.0, 107.5, 98.8, 107.0),
            ],
        );
        assert!(MorningStarDetector::default()
            .detect(&bars, &MarketContext::default())
            .is_none());
    }

    #[test]
    fn test_evening_star() {
        let bars = after(
            advance(),
            &[
                c(100.0, 110.5, 99.5, 110.0),
                c(111.5, 112.5, 111.0, 112.0),
                c(111.0, 111.2, 102.5, 103.0),
            ],
        );
        let m = EveningStarDetector::default()
            .detect(&bars, &MarketContext::default())
            .unwrap();
        assert_eq!(m.direction, Direction::Bearish);
        assert!(MorningStarDetector::default()
            .detect(&bars, &MarketContext::default())
            .is_none());
    }

    #[test]
    fn test_volume_bonus_on_heavy_candle() {
        let mut bars = decline();
        let mut hammer = c(100.0, 100.1, 98.0, 100.05);
        hammer.volume = 5000.0;
        bars.push(hammer);
        let bars = series(bars);
        let m = HammerDetector::default()
            .detect(&bars, &MarketContext::default())
            .unwrap();
        assert_eq!(m.confidence.get(), 7.0);
    }
}
