//! Support and resistance levels.
//!
//! Four sources feed one clustering pass: swing points, a volume profile,
//! round numbers near the price and the 50/200 SMAs. Levels within
//! `cluster_tolerance` of each other on the same side merge into one.

use serde::{Deserialize, Serialize};

use crate::indicators::sma;
use crate::swing::{SwingExtractor, SwingKind};
use crate::{AnalysisError, Period, Ratio, Result, OHLCV};

/// Default threshold for [`Proximity::is_near`], in percent
pub const DEFAULT_PROXIMITY_PERCENT: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelSide {
    Support,
    Resistance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelStrength {
    Weak,
    Medium,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LevelSource {
    Swing,
    VolumeProfile,
    Psychological,
    MovingAverage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub side: LevelSide,
    pub strength: LevelStrength,
    pub source: LevelSource,
    /// Members merged into this level
    pub test_count: usize,
}

/// Distance from a price to a level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Proximity {
    pub distance_percent: f64,
    pub is_near: bool,
}

impl Level {
    fn new(price: f64, side: LevelSide, strength: LevelStrength, source: LevelSource) -> Self {
        Self {
            price,
            side,
            strength,
            source,
            test_count: 1,
        }
    }

    /// `|level - price| / price * 100`, near when below `threshold_percent`
    pub fn proximity(&self, price: f64, threshold_percent: f64) -> Proximity {
        if !(price > 0.0) {
            return Proximity {
                distance_percent: f64::INFINITY,
                is_near: false,
            };
        }
        let distance_percent = (self.price - price).abs() / price * 100.0;
        Proximity {
            distance_percent,
            is_near: distance_percent < threshold_percent,
        }
    }
}

#[inline]
fn side_of(level: f64, price: f64) -> LevelSide {
    if level < price {
        LevelSide::Support
    } else {
        LevelSide::Resistance
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelDetector {
    pub swing_lookback: Period,
    /// Band around a swing level that counts as a touch
    pub touch_tolerance: Ratio,
    pub profile_bins: Period,
    /// Share of profile bins, by volume, that become levels
    pub profile_top_fraction: Ratio,
    pub psychological_limit: Period,
    pub cluster_tolerance: Ratio,
    pub max_per_side: Period,
}

impl Default for LevelDetector {
    fn default() -> Self {
        Self {
            swing_lookback: Period::new_const(SwingExtractor::SHORT_LOOKBACK),
            touch_tolerance: Ratio::new_const(0.01),
            profile_bins: Period::new_const(50),
            profile_top_fraction: Ratio::new_const(0.2),
            psychological_limit: Period::new_const(10),
            cluster_tolerance: Ratio::new_const(0.02),
            max_per_side: Period::new_const(5),
        }
    }
}

impl LevelDetector {
    /// Clustered levels, supports then resistances, each ascending by price.
    pub fn detect<T: OHLCV>(&self, bars: &[T]) -> Vec<Level> {
        let Some(last) = bars.last() else {
            return Vec::new();
        };
        let price = last.close();

        let mut raw = self.swing_levels(bars);
        raw.extend(self.volume_profile_levels(bars, price));
        raw.extend(self.psychological_levels(price));
        raw.extend(moving_average_levels(bars, price));

        let mut out = Vec::new();
        for side in [LevelSide::Support, LevelSide::Resistance] {
            let members: Vec<Level> = raw.iter().filter(|l| l.side == side).cloned().collect();
            let mut clusters = cluster(members, self.cluster_tolerance.get());
            clusters.sort_by(|a, b| b.test_count.cmp(&a.test_count));
            clusters.truncate(self.max_per_side.get());
            clusters.sort_by(|a, b| a.price.total_cmp(&b.price));
            out.extend(clusters);
        }

        tracing::trace!(raw = raw.len(), kept = out.len(), "levels clustered");
        out
    }

    /// Swing highs as resistance, swing lows as support
    pub fn swing_levels<T: OHLCV>(&self, bars: &[T]) -> Vec<Level> {
        let tol = self.touch_tolerance.get();
        SwingExtractor::new(self.swing_lookback)
            .extract(bars)
            .into_iter()
            .map(|s| {
                let (lo, hi) = (s.price * (1.0 - tol), s.price * (1.0 + tol));
                let touches = bars.iter().filter(|b| b.low() <= hi && b.high() >= lo).count();
                let strength = match touches {
                    5.. => LevelStrength::Strong,
                    3..=4 => LevelStrength::Medium,
                    _ => LevelStrength::Weak,
                };
                let side = match s.kind {
                    SwingKind::High => LevelSide::Resistance,
                    SwingKind::Low => LevelSide::Support,
                };
                Level::new(s.price, side, strength, LevelSource::Swing)
            })
            .collect()
    }

    /// High-volume bins of an equal-width profile over the observed range.
    /// Each candle's volume lands in the bin of its mid price.
    pub fn volume_profile_levels<T: OHLCV>(&self, bars: &[T], price: f64) -> Vec<Level> {
        let lo = bars.iter().map(|b| b.low()).fold(f64::INFINITY, f64::min);
        let hi = bars.iter().map(|b| b.high()).fold(f64::NEG_INFINITY, f64::max);
        let range = hi - lo;
        if !(range > 0.0 && range.is_finite()) {
            return Vec::new();
        }

        let n = self.profile_bins.get();
        let width = range / n as f64;
        let mut volume = vec![0.0; n];
        for b in bars {
            let mid = (b.high() + b.low()) / 2.0;
            let bin = (((mid - lo) / width).floor() as usize).min(n - 1);
            volume[bin] += b.volume();
        }

        let max = volume.iter().copied().fold(0.0, f64::max);
        if max <= 0.0 {
            return Vec::new();
        }

        let keep = ((n as f64 * self.profile_top_fraction.get()).round() as usize).max(1);
        let mut ranked: Vec<usize> = (0..n).filter(|&i| volume[i] > 0.0).collect();
        ranked.sort_by(|&a, &b| volume[b].total_cmp(&volume[a]));
        ranked.truncate(keep);

        ranked
            .into_iter()
            .map(|i| {
                let center = lo + (i as f64 + 0.5) * width;
                let share = volume[i] / max;
                let strength = if share >= 0.8 {
                    LevelStrength::Strong
                } else if share >= 0.5 {
                    LevelStrength::Medium
                } else {
                    LevelStrength::Weak
                };
                Level::new(center, side_of(center, price), strength, LevelSource::VolumeProfile)
            })
            .collect()
    }

    /// Round numbers around `price` at 1, 0.5, 0.2 and 0.1 of its order of
    /// magnitude, nearest first.
    pub fn psychological_levels(&self, price: f64) -> Vec<Level> {
        if !(price > 0.0 && price.is_finite()) {
            return Vec::new();
        }
        let magnitude = 10f64.powi(price.log10().floor() as i32);
        let steps = [
            (1.0, LevelStrength::Strong),
            (0.5, LevelStrength::Medium),
            (0.2, LevelStrength::Weak),
            (0.1, LevelStrength::Weak),
        ];

        let mut levels: Vec<Level> = Vec::new();
        for (factor, strength) in steps {
            let step = magnitude * factor;
            let base = (price / step).floor();
            for k in [-1.0, 0.0, 1.0, 2.0] {
                let candidate = (base + k) * step;
                // A coarser step already produced this number
                let seen = levels
                    .iter()
                    .any(|l| (l.price - candidate).abs() <= step * 1e-9);
                if candidate > 0.0 && !seen {
                    levels.push(Level::new(
                        candidate,
                        side_of(candidate, price),
                        strength,
                        LevelSource::Psychological,
                    ));
                }
            }
        }

        levels.sort_by(|a, b| (a.price - price).abs().total_cmp(&(b.price - price).abs()));
        levels.truncate(self.psychological_limit.get());
        levels
    }

    pub fn validate_config(&self) -> Result<()> {
        if self.profile_top_fraction.get() <= 0.0 {
            return Err(AnalysisError::InvalidConfig(
                "profile_top_fraction must be positive".to_string(),
            ));
        }
        if self.cluster_tolerance.get() <= 0.0 {
            return Err(AnalysisError::InvalidConfig(
                "cluster_tolerance must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// SMA-50 (medium) and SMA-200 (strong) at the last bar
fn moving_average_levels<T: OHLCV>(bars: &[T], price: f64) -> Vec<Level> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close()).collect();
    [(50, LevelStrength::Medium), (200, LevelStrength::Strong)]
        .into_iter()
        .filter_map(|(period, strength)| {
            let value = sma(&closes, period).last().copied().flatten()?;
            Some(Level::new(
                value,
                side_of(value, price),
                strength,
                LevelSource::MovingAverage,
            ))
        })
        .collect()
}

/// Merge same-side levels lying within `tolerance` of their predecessor.
///
/// The cluster takes the mean price, the first member's strength and
/// source, and its size as `test_count`.
pub fn cluster(mut levels: Vec<Level>, tolerance: f64) -> Vec<Level> {
    levels.sort_by(|a, b| a.price.total_cmp(&b.price));
    let mut out: Vec<Level> = Vec::new();
    let mut members: Vec<Level> = Vec::new();

    let flush = |members: &mut Vec<Level>, out: &mut Vec<Level>| {
        if let Some(first) = members.first() {
            let mean = members.iter().map(|l| l.price).sum::<f64>() / members.len() as f64;
            out.push(Level {
                price: mean,
                test_count: members.len(),
                ..first.clone()
            });
        }
        members.clear();
    };

    for level in levels {
        let joins = members
            .last()
            .is_some_and(|prev| (level.price - prev.price) / prev.price <= tolerance);
        if !joins {
            flush(&mut members, &mut out);
        }
        members.push(level);
    }
    flush(&mut members, &mut out);
    out
}
