//! Fibonacci-ratio XABCD patterns (Gartley, Butterfly).
//!
//! Bullish patterns start from a swing low X, bearish ones from a swing high.
//! A, B and C are the alternating swings that follow; D is the latest swing of
//! X's kind and must sit in the final 20% of the series. Every leg ratio has to
//! match: there is no partial credit.

use crate::detectors::helpers::{in_range, is_recent, ratio_matches};
use crate::swing::{next_after, only, SwingKind, SwingPoint};
use crate::{
    AnalysisError, Direction, MarketContext, PatternDetector, PatternKind, PatternMatch, Ratio,
    Result, OHLCV,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarmonicVariant {
    Gartley,
    Butterfly,
}

/// Where D must land relative to the XA leg
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum XdRule {
    /// |A - D| / |XA| matches the target within the tolerance
    Retracement(f64),
    /// |A - D| / |XA| falls in the range (D beyond X)
    Extension(f64, f64),
}

/// The four ratios of an XABCD candidate, all as positive magnitudes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegRatios {
    /// AB / XA
    pub b: f64,
    /// BC / AB
    pub c: f64,
    /// CD / BC
    pub cd: f64,
    /// AD / XA
    pub xd: f64,
}

impl LegRatios {
    /// Ratios for five prices; `None` when a leg is degenerate or points the
    /// wrong way for the direction.
    pub fn from_prices(direction: Direction, x: f64, a: f64, b: f64, c: f64, d: f64) -> Option<Self> {
        let s = direction.sign();
        let xa = s * (a - x);
        let ab = s * (a - b);
        let bc = s * (c - b);
        let cd = s * (c - d);
        let ad = s * (a - d);
        if xa <= 0.0 || ab <= 0.0 || bc <= 0.0 || cd <= 0.0 || ad <= 0.0 {
            return None;
        }
        Some(Self {
            b: ab / xa,
            c: bc / ab,
            cd: cd / bc,
            xd: ad / xa,
        })
    }
}

#[derive(Debug, Clone)]
pub struct HarmonicDetector {
    pub variant: HarmonicVariant,
    /// Target B retracement of XA
    pub b_target: f64,
    /// Relative tolerance for target ratios
    pub tolerance: Ratio,
    pub c_range: (f64, f64),
    /// CD / BC bounds; `None` leaves the leg to the XD rule
    pub cd_range: Option<(f64, f64)>,
    pub xd: XdRule,
    pub recent_fraction: Ratio,
    pub confidence: f64,
    /// Invalidation distance beyond D, as a fraction of D
    pub invalidation_pct: Ratio,
}

impl HarmonicDetector {
    pub fn gartley() -> Self {
        Self {
            variant: HarmonicVariant::Gartley,
            b_target: 0.618,
            tolerance: Ratio::new_const(0.08),
            c_range: (0.382, 0.886),
            cd_range: Some((1.27, 1.618)),
            xd: XdRule::Retracement(0.786),
            recent_fraction: Ratio::new_const(0.2),
            confidence: 9.0,
            invalidation_pct: Ratio::new_const(0.02),
        }
    }

    /// D beyond X by 1.27 to 1.618 of XA. CD/BC is not bounded.
    pub fn butterfly() -> Self {
        Self {
            variant: HarmonicVariant::Butterfly,
            b_target: 0.786,
            tolerance: Ratio::new_const(0.08),
            c_range: (0.382, 0.886),
            cd_range: None,
            xd: XdRule::Extension(1.27, 1.618),
            recent_fraction: Ratio::new_const(0.2),
            confidence: 8.5,
            invalidation_pct: Ratio::new_const(0.03),
        }
    }

    pub fn kind(&self) -> PatternKind {
        match self.variant {
            HarmonicVariant::Gartley => PatternKind::HarmonicGartley,
            HarmonicVariant::Butterfly => PatternKind::HarmonicButterfly,
        }
    }

    /// All ratio checks at once
    pub fn accepts(&self, r: &LegRatios) -> bool {
        let tol = self.tolerance.get();
        let xd_ok = match self.xd {
            XdRule::Retracement(target) => ratio_matches(r.xd, target, tol),
            XdRule::Extension(lo, hi) => in_range(r.xd, (lo, hi)),
        };
        ratio_matches(r.b, self.b_target, tol)
            && in_range(r.c, self.c_range)
            && self.cd_range.map_or(true, |range| in_range(r.cd, range))
            && xd_ok
    }

    fn scan(&self, swings: &[SwingPoint], len: usize, direction: Direction) -> Option<PatternMatch> {
        let (outer, inner) = match direction {
            Direction::Bullish => (SwingKind::Low, SwingKind::High),
            Direction::Bearish => (SwingKind::High, SwingKind::Low),
        };
        let anchors = only(swings, outer);
        let d = *anchors.last()?;
        if !is_recent(d.index, len, self.recent_fraction.get()) {
            return None;
        }

        // Most recent X first
        for x in anchors.iter().rev().filter(|x| x.index < d.index) {
            let Some(a) = next_after(swings, x.index, inner) else {
                continue;
            };
            let Some(b) = next_after(swings, a.index, outer) else {
                continue;
            };
            let Some(c) = next_after(swings, b.index, inner) else {
                continue;
            };
            if c.index >= d.index {
                continue;
            }
            let Some(ratios) =
                LegRatios::from_prices(direction, x.price, a.price, b.price, c.price, d.price)
            else {
                continue;
            };
            if !self.accepts(&ratios) {
                continue;
            }
            return Some(self.build(direction, x, &a, &b, &c, &d));
        }
        None
    }

    fn build(
        &self,
        direction: Direction,
        x: &SwingPoint,
        a: &SwingPoint,
        b: &SwingPoint,
        c: &SwingPoint,
        d: &SwingPoint,
    ) -> PatternMatch {
        let ad = a.price - d.price;
        let pct = self.invalidation_pct.get();
        let invalidation = match direction {
            Direction::Bullish => d.price * (1.0 - pct),
            Direction::Bearish => d.price * (1.0 + pct),
        };

        PatternMatch::new(self.kind(), direction, self.confidence, x.index, d.index)
            .with_key_point("X", x.price, x.index)
            .with_key_point("A", a.price, a.index)
            .with_key_point("B", b.price, b.index)
            .with_key_point("C", c.price, c.index)
            .with_key_point("D", d.price, d.index)
            .with_entry(d.price)
            .with_invalidation(invalidation)
            .with_targets([d.price + 0.382 * ad, d.price + 0.618 * ad])
    }
}

impl PatternDetector for HarmonicDetector {
    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    fn min_bars(&self) -> usize {
        30
    }

    /// The more recent D wins when both directions match
    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch> {
        let bull = self.scan(&ctx.swings, bars.len(), Direction::Bullish);
        let bear = self.scan(&ctx.swings, bars.len(), Direction::Bearish);
        match (bull, bear) {
            (Some(a), Some(b)) => Some(if b.end_index > a.end_index { b } else { a }),
            (a, b) => a.or(b),
        }
    }

    fn validate_config(&self) -> Result<()> {
        let ranges = [("c_range", Some(self.c_range)), ("cd_range", self.cd_range)];
        for (name, (lo, hi)) in ranges.into_iter().filter_map(|(n, r)| Some((n, r?))) {
            if !(lo > 0.0 && lo <= hi) {
                return Err(AnalysisError::InvalidConfig(format!(
                    "{name} ({lo}, {hi}) must satisfy 0 < min <= max"
                )));
            }
        }
        if let XdRule::Extension(lo, hi) = self.xd {
            if !(lo >= 1.0 && lo <= hi) {
                return Err(AnalysisError::InvalidConfig(format!(
                    "xd extension ({lo}, {hi}) must start at or beyond X"
                )));
            }
        }
        if self.b_target <= 0.0 || self.b_target >= 1.0 {
            return Err(AnalysisError::OutOfRange {
                field: "b_target",
                value: self.b_target,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swing::SwingExtractor;
    use crate::Candle;

    fn zigzag(pivots: &[(usize, f64)]) -> Vec<Candle> {
        let mut bars = Vec::new();
        for w in pivots.windows(2) {
            let ((i0, p0), (i1, p1)) = (w[0], w[1]);
            for i in i0..i1 {
                let p = p0 + (p1 - p0) * (i - i0) as f64 / (i1 - i0) as f64;
                bars.push(Candle::new(i as i64, p, p, p, p, 1000.0));
            }
        }
        let (i, p) = pivots[pivots.len() - 1];
        bars.push(Candle::new(i as i64, p, p, p, p, 1000.0));
        bars
    }

    fn context(bars: &[Candle]) -> MarketContext {
        MarketContext {
            swings: SwingExtractor::default().extract(bars),
            ..Default::default()
        }
    }

    fn gartley_pivots() -> Vec<(usize, f64)> {
        // X=100, A=120, B=0.618, C=0.618 of AB, D=0.786 of XA
        vec![
            (0, 110.0),
            (30, 100.0),
            (45, 120.0),
            (55, 107.64),
            (65, 115.2752),
            (85, 104.28),
            (99, 110.0),
        ]
    }

    #[test]
    fn test_bullish_gartley() {
        let bars = zigzag(&gartley_pivots());
        let m = HarmonicDetector::gartley()
            .detect(&bars, &context(&bars))
            .unwrap();

        assert_eq!(m.kind, PatternKind::HarmonicGartley);
        assert_eq!(m.direction, Direction::Bullish);
        assert_eq!(m.confidence.get(), 9.0);
        assert!(m.is_temporally_ordered());
        let labels: Vec<&str> = m.key_points.iter().map(|k| k.label.as_str()).collect();
        assert_eq!(labels, ["X", "A", "B", "C", "D"]);
        assert_eq!(m.entry, Some(104.28));
        assert!((m.invalidation.unwrap() - 104.28 * 0.98).abs() < 1e-9);
        assert!(m.targets[0] > 104.28 && m.targets[1] > m.targets[0]);
    }

    #[test]
    fn test_bearish_gartley() {
        let pivots: Vec<(usize, f64)> = gartley_pivots()
            .into_iter()
            .map(|(i, p)| (i, 220.0 - p))
            .collect();
        let bars = zigzag(&pivots);
        let m = HarmonicDetector::gartley()
            .detect(&bars, &context(&bars))
            .unwrap();
        assert_eq!(m.direction, Direction::Bearish);
        assert!(m.invalidation.unwrap() > m.entry.unwrap());
        assert!(m.targets.iter().all(|t| *t < m.entry.unwrap()));
    }

    #[test]
    fn test_bullish_butterfly() {
        // B=0.786, C=0.5 of AB, D extends 1.27 of XA below A
        let bars = zigzag(&[
            (0, 110.0),
            (30, 100.0),
            (45, 120.0),
            (55, 104.28),
            (65, 112.14),
            (85, 94.0),
            (99, 100.0),
        ]);
        let m = HarmonicDetector::butterfly()
            .detect(&bars, &context(&bars))
            .unwrap();
        assert_eq!(m.kind, PatternKind::HarmonicButterfly);
        assert_eq!(m.confidence.get(), 8.5);
        assert!((m.invalidation.unwrap() - 94.0 * 0.97).abs() < 1e-9);
        assert!(HarmonicDetector::gartley()
            .detect(&bars, &context(&bars))
            .is_none());
    }

    #[test]
    fn test_cd_extension_outside_range_rejected() {
        let gartley = HarmonicDetector::gartley();
        let exact = LegRatios {
            b: 0.618,
            c: 0.618,
            cd: 1.44,
            xd: 0.786,
        };
        assert!(gartley.accepts(&exact));
        assert!(!gartley.accepts(&LegRatios { cd: 2.0, ..exact }));
    }

    #[test]
    fn test_butterfly_ignores_cd_leg() {
        // B=0.786, C≈0.382, D=1.6 of XA beyond A: CD/BC ≈ 3.7
        let ratios =
            LegRatios::from_prices(Direction::Bullish, 100.0, 120.0, 104.28, 110.29, 88.0).unwrap();
        assert!(ratios.cd > 3.5);
        assert!((ratios.xd - 1.6).abs() < 1e-9);
        assert!(HarmonicDetector::butterfly().accepts(&ratios));
        assert!(!HarmonicDetector::gartley().accepts(&ratios));
    }

    #[test]
    fn test_stale_d_rejected() {
        let mut pivots = gartley_pivots();
        pivots.pop();
        pivots.push((150, 110.0));
        let bars = zigzag(&pivots);
        assert!(HarmonicDetector::gartley()
            .detect(&bars, &context(&bars))
            .is_none());
    }

    #[test]
    fn test_wrong_way_legs_are_degenerate() {
        assert!(LegRatios::from_prices(Direction::Bullish, 120.0, 100.0, 110.0, 105.0, 101.0).is_none());
    }

    #[test]
    fn test_config_validation() {
        assert!(HarmonicDetector::gartley().validate_config().is_ok());
        assert!(HarmonicDetector::butterfly().validate_config().is_ok());
        let bad = HarmonicDetector {
            cd_range: Some((2.0, 1.0)),
            ..HarmonicDetector::gartley()
        };
        assert!(bad.validate_config().is_err());
    }
}
