//! Wyckoff accumulation and distribution.
//!
//! Accumulation events, in order: selling climax, automatic rally, secondary
//! test and an optional spring. Distribution mirrors them: buying climax,
//! automatic reaction, secondary test and an optional upthrust.

use std::collections::HashMap;

use crate::detectors::helpers::{check_confidence, recent_start, trailing_avg_volume};
use crate::params::{get_period, get_ratio, get_value, ParamMeta, ParameterizedDetector};
use crate::{
    AnalysisError, Direction, MarketContext, PatternDetector, PatternKind, PatternMatch, Period,
    Ratio, Result, OHLCV,
};

/// Indices of the events found for one climax
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WyckoffEvents {
    /// Bullish for accumulation, bearish for distribution
    pub direction: Direction,
    pub climax: usize,
    /// Automatic rally (accumulation) or reaction (distribution)
    pub rally: usize,
    pub secondary_test: usize,
    /// Spring (accumulation) or upthrust (distribution)
    pub spring: Option<usize>,
}

impl WyckoffEvents {
    pub fn phases_found(&self) -> usize {
        3 + usize::from(self.spring.is_some())
    }

    #[inline]
    fn last_index(&self) -> usize {
        self.spring.unwrap_or(self.secondary_test)
    }
}

#[derive(Debug, Clone)]
pub struct WyckoffDetector {
    /// Climax volume must exceed this multiple of the trailing average
    pub climax_volume_multiple: f64,
    pub volume_period: Period,
    /// Bars of prior trend before the climax
    pub trend_lookback: Period,
    /// Forward window for the remaining events
    pub window: Period,
    /// Secondary test distance from the climax extreme
    pub test_tolerance: Ratio,
    /// Secondary test volume relative to the climax
    pub test_volume_ratio: Ratio,
    pub recent_fraction: Ratio,
    pub base_confidence: f64,
    pub full_confidence: f64,
}

impl Default for WyckoffDetector {
    fn default() -> Self {
        Self {
            climax_volume_multiple: 2.0,
            volume_period: Period::new_const(20),
            trend_lookback: Period::new_const(10),
            window: Period::new_const(20),
            test_tolerance: Ratio::new_const(0.03),
            test_volume_ratio: Ratio::new_const(0.7),
            recent_fraction: Ratio::new_const(0.3),
            base_confidence: 7.5,
            full_confidence: 9.0,
        }
    }
}

impl WyckoffDetector {
    /// Highest-volume qualifying climax in the recent window; later wins ties
    fn find_climax<T: OHLCV>(&self, bars: &[T], direction: Direction) -> Option<usize> {
        let lookback = self.trend_lookback.get();
        let first = recent_start(bars.len(), self.recent_fraction.get()).max(lookback);

        let mut best: Option<usize> = None;
        for i in first..bars.len() {
            let trailing = trailing_avg_volume(bars, i, self.volume_period.get());
            if !(trailing > 0.0 && bars[i].volume() > trailing * self.climax_volume_multiple) {
                continue;
            }
            let (then, now) = (bars[i - lookback].close(), bars[i].close());
            let trending = match direction {
                Direction::Bullish => then > now,
                Direction::Bearish => then < now,
            };
            if !trending {
                continue;
            }
            if best.map_or(true, |b| bars[i].volume() >= bars[b].volume()) {
                best = Some(i);
            }
        }
        best
    }

    /// Locate the event sequence for `direction`, or `None` when fewer than
    /// three events are present.
    pub fn detect_phases<T: OHLCV>(&self, bars: &[T], direction: Direction) -> Option<WyckoffEvents> {
        let sc = self.find_climax(bars, direction)?;
        let end = (sc + self.window.get()).min(bars.len() - 1);
        if end <= sc {
            return None;
        }
        let climax = &bars[sc];
        let accumulation = direction.is_bullish();

        // Rally / reaction: most extreme price in the window
        let mut rally = sc + 1;
        for i in sc + 1..=end {
            let better = if accumulation {
                bars[i].high() > bars[rally].high()
            } else {
                bars[i].low() < bars[rally].low()
            };
            if better {
                rally = i;
            }
        }
        let rallied = if accumulation {
            bars[rally].high() > climax.close()
        } else {
            bars[rally].low() < climax.close()
        };
        if !rallied {
            return None;
        }

        // Secondary test: first revisit of the climax extreme on lighter volume
        let extreme = if accumulation { climax.low() } else { climax.high() };
        let max_volume = climax.volume() * self.test_volume_ratio.get();
        let secondary_test = (rally + 1..=end).find(|&i| {
            let touch = if accumulation { bars[i].low() } else { bars[i].high() };
            (touch - extreme).abs() / extreme <= self.test_tolerance.get()
                && bars[i].volume() <= max_volume
        })?;

        // Spring / upthrust: pierce the climax/test boundary, reclaim it next bar
        let st = &bars[secondary_test];
        let boundary = if accumulation {
            extreme.min(st.low())
        } else {
            extreme.max(st.high())
        };
        let spring = (secondary_test + 1..end.min(bars.len() - 1)).find(|&i| {
            let next = bars[i + 1].close();
            if accumulation {
                bars[i].low() < boundary && next > boundary
            } else {
                bars[i].high() > boundary && next < boundary
            }
        });

        Some(WyckoffEvents {
            direction,
            climax: sc,
            rally,
            secondary_test,
            spring,
        })
    }

    fn build<T: OHLCV>(&self, bars: &[T], ev: &WyckoffEvents) -> PatternMatch {
        let accumulation = ev.direction.is_bullish();
        let (kind, labels) = if accumulation {
            (
                PatternKind::WyckoffAccumulation,
                ["selling_climax", "automatic_rally", "secondary_test", "spring"],
            )
        } else {
            (
                PatternKind::WyckoffDistribution,
                ["buying_climax", "automatic_reaction", "secondary_test", "upthrust"],
            )
        };
        let extreme = |i: usize| if accumulation { bars[i].low() } else { bars[i].high() };
        let opposite = |i: usize| if accumulation { bars[i].high() } else { bars[i].low() };

        let confidence = if ev.spring.is_some() {
            self.full_confidence
        } else {
            self.base_confidence
        };

        let mut m = PatternMatch::new(kind, ev.direction, confidence, ev.climax, ev.last_index())
            .with_key_point(labels[0], extreme(ev.climax), ev.climax)
            .with_key_point(labels[1], opposite(ev.rally), ev.rally)
            .with_key_point(labels[2], extreme(ev.secondary_test), ev.secondary_test);
        if let Some(s) = ev.spring {
            m = m.with_key_point(labels[3], extreme(s), s);
        }

        let boundary = if accumulation {
            extreme(ev.climax).min(extreme(ev.secondary_test))
        } else {
            extreme(ev.climax).max(extreme(ev.secondary_test))
        };
        let last_close = bars[bars.len() - 1].close();
        m.with_entry(last_close)
            .with_invalidation(boundary)
            .with_targets([opposite(ev.rally)])
    }
}

impl PatternDetector for WyckoffDetector {
    fn name(&self) -> &'static str {
        "wyckoff"
    }

    fn min_bars(&self) -> usize {
        self.volume_period.get().max(self.trend_lookback.get()) + 3
    }

    fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &MarketContext) -> Option<PatternMatch> {
        if bars.len() < PatternDetector::min_bars(self) {
            return None;
        }
        let acc = self.detect_phases(bars, Direction::Bullish);
        let dist = self.detect_phases(bars, Direction::Bearish);
        let ev = match (acc, dist) {
            (Some(a), Some(d)) => {
                if d.climax > a.climax {
                    d
                } else {
                    a
                }
            }
            (a, d) => a.or(d)?,
        };
        tracing::trace!(
            direction = %ev.direction,
            climax = ev.climax,
            phases = ev.phases_found(),
            "wyckoff events"
        );
        Some(self.build(bars, &ev))
    }

    fn validate_config(&self) -> Result<()> {
        if !(self.climax_volume_multiple > 1.0 && self.climax_volume_multiple.is_finite()) {
            return Err(AnalysisError::OutOfRange {
                field: "climax_volume_multiple",
                value: self.climax_volume_multiple,
                min: 1.0,
                max: f64::INFINITY,
            });
        }
        if self.base_confidence > self.full_confidence {
            return Err(AnalysisError::InvalidConfig(
                "base_confidence must not exceed full_confidence".to_string(),
            ));
        }
        check_confidence("base_confidence", self.base_confidence)?;
        check_confidence("full_confidence", self.full_confidence)
    }
}

const WYCKOFF_PARAMS: &[ParamMeta] = &[
    ParamMeta::value("climax_volume_multiple", 2.0, (1.5, 3.0, 0.25), "Climax volume over trailing average"),
    ParamMeta::period("volume_period", 20.0, (10.0, 30.0, 5.0), "Trailing volume window"),
    ParamMeta::period("trend_lookback", 10.0, (5.0, 20.0, 5.0), "Prior trend before the climax"),
    ParamMeta::period("window", 20.0, (10.0, 40.0, 5.0), "Forward window for the remaining events"),
    ParamMeta::ratio("test_tolerance", 0.03, (0.01, 0.05, 0.01), "Secondary test distance from the climax"),
    ParamMeta::ratio("test_volume_ratio", 0.7, (0.5, 0.9, 0.1), "Secondary test volume vs climax"),
    ParamMeta::ratio("recent_fraction", 0.3, (0.2, 0.4, 0.1), "Staleness window for the climax"),
    ParamMeta::value("base_confidence", 7.5, (6.5, 8.5, 0.5), "Confidence with three events"),
    ParamMeta::value("full_confidence", 9.0, (8.5, 9.5, 0.5), "Confidence with a spring/upthrust"),
];

impl ParameterizedDetector for WyckoffDetector {
    fn param_meta() -> &'static [ParamMeta] {
        WYCKOFF_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let d = Self {
            climax_volume_multiple: get_value(params, "climax_volume_multiple", 2.0)?,
            volume_period: get_period(params, "volume_period", 20)?,
            trend_lookback: get_period(params, "trend_lookback", 10)?,
            window: get_period(params, "window", 20)?,
            test_tolerance: get_ratio(params, "test_tolerance", 0.03)?,
            test_volume_ratio: get_ratio(params, "test_volume_ratio", 0.7)?,
            recent_fraction: get_ratio(params, "recent_fraction", 0.3)?,
            base_confidence: get_value(params, "base_confidence", 7.5)?,
            full_confidence: get_value(params, "full_confidence", 9.0)?,
        };
        d.validate_config()?;
        Ok(d)
    }

    fn detector_name() -> &'static str {
        "wyckoff"
    }
}

impl_with_defaults!(WyckoffDetector);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Candle;

    /// Flat-ish base, a 10-bar decline into a climax at `sc`, then a rally.
    /// `tail` overrides (index, low, volume) after the rally.
    fn accumulation(n: usize, sc: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let (p, vol) = if i + 10 < sc {
                    (100.0, 1000.0)
                } else if i < sc {
                    (100.0 - (i + 10 - sc) as f64, 1000.0)
                } else if i == sc {
                    (90.0, 3000.0)
                } else if i <= sc + 5 {
                    (90.0 + 2.0 * (i - sc) as f64, 1000.0)
                } else if i < sc + 12 {
                    (100.0 - (i - sc - 5) as f64, 1000.0)
                } else if i == sc + 12 {
                    (91.5, 1500.0)
                } else {
                    (95.0, 1000.0)
                };
                Candle::new(i as i64, p, p + 0.5, p - 0.5, p, vol)
            })
            .collect()
    }

    #[test]
    fn test_three_phase_accumulation() {
        let bars = accumulation(100, 80);
        let d = WyckoffDetector::default();
        let ev = d.detect_phases(&bars, Direction::Bullish).unwrap();
        assert_eq!(ev.climax, 80);
        assert_eq!(ev.rally, 85);
        assert_eq!(ev.secondary_test, 92);
        assert_eq!(ev.spring, None);
        assert_eq!(ev.phases_found(), 3);

        let m = d.detect(&bars, &MarketContext::default()).unwrap();
        assert_eq!(m.kind, PatternKind::WyckoffAccumulation);
        assert_eq!(m.direction, Direction::Bullish);
        assert_eq!(m.confidence.get(), 7.5);
        assert!(m.is_temporally_ordered());
    }

    #[test]
    fn test_spring_lifts_confidence() {
        let mut bars = accumulation(100, 80);
        // Dip under the climax low, reclaim on the next bar
        bars[95] = Candle::new(95, 90.0, 90.5, 88.5, 89.0, 1000.0);
        bars[96] = Candle::new(96, 91.0, 92.5, 90.5, 92.0, 1000.0);
        let d = WyckoffDetector::default();
        let ev = d.detect_phases(&bars, Direction::Bullish).unwrap();
        assert_eq!(ev.spring, Some(95));
        assert_eq!(ev.phases_found(), 4);
        let m = d.detect(&bars, &MarketContext::default()).unwrap();
        assert_eq!(m.confidence.get(), 9.0);
        assert!(m.key_point("spring").is_some());
    }

    #[test]
    fn test_heavy_retest_is_not_secondary_test() {
        let mut bars = accumulation(100, 80);
        bars[92].volume = 2500.0;
        assert!(WyckoffDetector::default()
            .detect(&bars, &MarketContext::default())
            .is_none());
    }

    #[test]
    fn test_stale_climax_rejected() {
        // Climax at 40 of 100 lies outside the last 30%
        let bars = accumulation(100, 40);
        assert!(WyckoffDetector::default()
            .detect(&bars, &MarketContext::default())
            .is_none());
    }

    #[test]
    fn test_distribution_mirror() {
        let bars: Vec<Candle> = accumulation(100, 80)
            .into_iter()
            .map(|c| {
                let p = 200.0 - c.close;
                Candle::new(c.timestamp, p, p + 0.5, p - 0.5, p, c.volume)
            })
            .collect();
        let m = WyckoffDetector::default()
            .detect(&bars, &MarketContext::default())
            .unwrap();
        assert_eq!(m.kind, PatternKind::WyckoffDistribution);
        assert_eq!(m.direction, Direction::Bearish);
        assert_eq!(m.key_point("buying_climax").unwrap().index, 80);
    }
}
