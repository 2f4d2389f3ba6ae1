//! # ta-confluence
//!
//! Confidence-scored technical analysis over OHLCV candles: swing points,
//! support/resistance levels, chart and candlestick patterns, harmonic (XABCD)
//! patterns, Wyckoff phases and RSI divergences, reconciled across timeframes.
//!
//! ## Quick Start
//!
//! ```rust
//! use ta_confluence::prelude::*;
//!
//! let candles: Vec<Candle> = (0..120)
//!     .map(|i| {
//!         let p = 100.0 + (i as f64 * 0.3).sin() * 5.0;
//!         Candle::new(i as i64 * 60_000, p, p + 1.0, p - 1.0, p + 0.2, 1_000.0)
//!     })
//!     .collect();
//!
//! let analyzer = AnalyzerBuilder::new()
//!     .with_all_defaults()
//!     .timeframe("1D")
//!     .build()
//!     .unwrap();
//!
//! let analysis = analyzer.analyze(&candles).unwrap();
//! for m in &analysis.patterns {
//!     assert!((0.0..=10.0).contains(&m.confidence.get()));
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod confluence;
pub mod detectors;
pub mod indicators;
pub mod levels;
pub mod params;
pub mod scoring;
pub mod structure;
pub mod swing;

use confluence::{ConfluenceAggregator, ConfluenceResult};
use indicators::IndicatorSnapshot;
use levels::{Level, LevelDetector, Proximity};
use structure::{MarketStructure, StructureAnalyzer};
use swing::{SwingExtractor, SwingPoint};

pub mod prelude {
    pub use crate::{
        analyze_parallel,
        analyze_with_confluence,
        // Confluence
        confluence::{ConfluenceAggregator, ConfluenceResult},
        // Detectors
        detectors::*,
        // Indicators
        indicators::{IndicatorSignal, IndicatorSnapshot, SignalAction, SignalSummary},
        // Levels
        levels::{Level, LevelDetector, LevelSide, LevelSource, LevelStrength, Proximity},
        // Parameters
        params::{get_period, get_ratio, get_value, ParamMeta, ParamType, ParameterizedDetector},
        // Scoring
        scoring::{
            ConfidencePipeline, ConfidenceStage, ConfluenceAdjustment, StructureAlignment,
            VolumeConfirmation,
        },
        // Structure
        structure::{MarketStructure, StructureAnalyzer, TrendKind},
        // Swings
        swing::{SwingExtractor, SwingKind, SwingPoint},
        Analysis,
        AnalysisError,
        AnalysisFailure,
        AnalysisResult,
        Analyzer,
        AnalyzerBuilder,
        AnalyzerConfig,
        BuiltinDetector,
        Candle,
        CandleKind,
        Confidence,
        ContextProvider,
        DefaultAnalyzer,
        DefaultContextProvider,
        Direction,
        DynPatternDetector,
        KeyPoint,
        MarketContext,
        MultiTimeframeAnalysis,
        OHLCVExt,
        PatternDetector,
        PatternKind,
        PatternMatch,
        Period,
        Ratio,
        Result,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors surfaced to the caller.
///
/// Missing data and failed pattern checks are not errors: detectors return
/// `None` for those. Only malformed input or configuration ends up here.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid candle at index {index}: {reason}")]
    InvalidCandle { index: usize, reason: &'static str },

    #[error("Timestamps must strictly increase: index {index} has {current} after {previous}")]
    NonMonotonicTimestamp {
        index: usize,
        previous: i64,
        current: i64,
    },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(AnalysisError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(AnalysisError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(AnalysisError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

/// Pattern confidence on a 0..=10 scale.
///
/// Every arithmetic adjustment goes through [`Confidence::adjust`], which
/// re-clamps, so a stored confidence can never leave the valid range.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct Confidence(f64);

impl Confidence {
    pub const MIN: f64 = 0.0;
    pub const MAX: f64 = 10.0;

    /// Clamp `value` into [0, 10]. NaN collapses to 0.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self(Self::MIN);
        }
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    /// Strict constructor: rejects values outside [0, 10]
    pub fn try_new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(AnalysisError::InvalidValue(
                "Confidence cannot be NaN or infinite",
            ));
        }
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(AnalysisError::OutOfRange {
                field: "Confidence",
                value,
                min: Self::MIN,
                max: Self::MAX,
            });
        }
        Ok(Self(value))
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }

    /// Add `delta` and clamp back into range
    #[inline]
    #[must_use]
    pub fn adjust(self, delta: f64) -> Self {
        Self::new(self.0 + delta)
    }
}

impl Serialize for Confidence {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Confidence {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Confidence::try_new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    /// Bar open time in milliseconds, when the source carries one
    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Blanket impl for references to dyn OHLCV
impl OHLCV for &dyn OHLCV {
    fn open(&self) -> f64 {
        (*self).open()
    }

    fn high(&self) -> f64 {
        (*self).high()
    }

    fn low(&self) -> f64 {
        (*self).low()
    }

    fn close(&self) -> f64 {
        (*self).close()
    }

    fn volume(&self) -> f64 {
        (*self).volume()
    }

    fn timestamp(&self) -> Option<i64> {
        (*self).timestamp()
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn upper_shadow(&self) -> f64 {
        self.high() - self.open().max(self.close())
    }

    #[inline]
    fn lower_shadow(&self) -> f64 {
        self.open().min(self.close()) - self.low()
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// Midpoint of the real body
    #[inline]
    fn body_mid(&self) -> f64 {
        (self.open() + self.close()) / 2.0
    }

    /// (high + low + close) / 3
    #[inline]
    fn typical_price(&self) -> f64 {
        (self.high() + self.low() + self.close()) / 3.0
    }

    /// Body as ratio of range. Returns None if range ≈ 0
    #[inline]
    fn body_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.body() / range)
    }

    /// Validate a single bar. The index in the error is filled in by the caller.
    fn validate(&self) -> Result<()> {
        let prices = [self.open(), self.high(), self.low(), self.close()];
        if prices.iter().any(|p| p.is_nan()) || self.volume().is_nan() {
            return Err(AnalysisError::InvalidCandle {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if prices.iter().any(|p| p.is_infinite()) || self.volume().is_infinite() {
            return Err(AnalysisError::InvalidCandle {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if prices.iter().any(|p| *p < 0.0) {
            return Err(AnalysisError::InvalidCandle {
                index: 0,
                reason: "negative price",
            });
        }
        if self.volume() < 0.0 {
            return Err(AnalysisError::InvalidCandle {
                index: 0,
                reason: "negative volume",
            });
        }
        if self.high() < self.low() {
            return Err(AnalysisError::InvalidCandle {
                index: 0,
                reason: "high < low",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// Validate a whole series: per-bar checks plus strictly increasing timestamps
/// wherever both neighbours carry one.
pub fn validate_series<T: OHLCV>(bars: &[T]) -> Result<()> {
    let mut previous: Option<i64> = None;
    for (i, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| match e {
            AnalysisError::InvalidCandle { reason, .. } => {
                AnalysisError::InvalidCandle { index: i, reason }
            }
            other => other,
        })?;
        if let Some(current) = bar.timestamp() {
            if let Some(prev) = previous {
                if current <= prev {
                    return Err(AnalysisError::NonMonotonicTimestamp {
                        index: i,
                        previous: prev,
                        current,
                    });
                }
            }
            previous = Some(current);
        }
    }
    Ok(())
}

/// Plain candle record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time in milliseconds
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for Candle {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

// ============================================================
// PATTERN MATCH
// ============================================================

/// Direction/bias of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Direction::Bullish => Direction::Bearish,
            Direction::Bearish => Direction::Bullish,
        }
    }

    /// +1 for bullish, -1 for bearish. Used to mirror price arithmetic.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Direction::Bullish => 1.0,
            Direction::Bearish => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Bullish => "bullish",
            Direction::Bearish => "bearish",
        })
    }
}

/// Candlestick formations matched on the last 1-3 bars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandleKind {
    Hammer,
    ShootingStar,
    BullishEngulfing,
    BearishEngulfing,
    Piercing,
    DarkCloudCover,
    MorningStar,
    EveningStar,
}

impl CandleKind {
    pub const ALL: [CandleKind; 8] = [
        CandleKind::Hammer,
        CandleKind::ShootingStar,
        CandleKind::BullishEngulfing,
        CandleKind::BearishEngulfing,
        CandleKind::Piercing,
        CandleKind::DarkCloudCover,
        CandleKind::MorningStar,
        CandleKind::EveningStar,
    ];

    pub fn direction(self) -> Direction {
        match self {
            CandleKind::Hammer
            | CandleKind::BullishEngulfing
            | CandleKind::Piercing
            | CandleKind::MorningStar => Direction::Bullish,
            CandleKind::ShootingStar
            | CandleKind::BearishEngulfing
            | CandleKind::DarkCloudCover
            | CandleKind::EveningStar => Direction::Bearish,
        }
    }

    /// Full pattern name, `candlestick-{name}`
    pub fn pattern_name(self) -> &'static str {
        match self {
            CandleKind::Hammer => "candlestick-hammer",
            CandleKind::ShootingStar => "candlestick-shooting-star",
            CandleKind::BullishEngulfing => "candlestick-bullish-engulfing",
            CandleKind::BearishEngulfing => "candlestick-bearish-engulfing",
            CandleKind::Piercing => "candlestick-piercing",
            CandleKind::DarkCloudCover => "candlestick-dark-cloud-cover",
            CandleKind::MorningStar => "candlestick-morning-star",
            CandleKind::EveningStar => "candlestick-evening-star",
        }
    }
}

/// Every pattern family the engine can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    HeadAndShoulders,
    InverseHeadAndShoulders,
    DoubleTop,
    DoubleBottom,
    Triangle,
    Candlestick(CandleKind),
    HarmonicGartley,
    HarmonicButterfly,
    WyckoffAccumulation,
    WyckoffDistribution,
    RsiDivergence,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::HeadAndShoulders => "head-and-shoulders",
            PatternKind::InverseHeadAndShoulders => "inverse-head-and-shoulders",
            PatternKind::DoubleTop => "double-top",
            PatternKind::DoubleBottom => "double-bottom",
            PatternKind::Triangle => "triangle",
            PatternKind::Candlestick(kind) => kind.pattern_name(),
            PatternKind::HarmonicGartley => "harmonic-gartley",
            PatternKind::HarmonicButterfly => "harmonic-butterfly",
            PatternKind::WyckoffAccumulation => "wyckoff-accumulation",
            PatternKind::WyckoffDistribution => "wyckoff-distribution",
            PatternKind::RsiDivergence => "rsi-divergence",
        }
    }

    /// Returns the typical/expected direction of this pattern.
    ///
    /// - `Some(Direction::Bullish)` - pattern only ever signals bullish moves
    /// - `Some(Direction::Bearish)` - pattern only ever signals bearish moves
    /// - `None` - pattern is bidirectional; the match carries the direction
    pub fn typical_direction(&self) -> Option<Direction> {
        match self {
            PatternKind::InverseHeadAndShoulders
            | PatternKind::DoubleBottom
            | PatternKind::WyckoffAccumulation => Some(Direction::Bullish),
            PatternKind::HeadAndShoulders
            | PatternKind::DoubleTop
            | PatternKind::WyckoffDistribution => Some(Direction::Bearish),
            PatternKind::Candlestick(kind) => Some(kind.direction()),
            PatternKind::Triangle
            | PatternKind::HarmonicGartley
            | PatternKind::HarmonicButterfly
            | PatternKind::RsiDivergence => None,
        }
    }

    /// Returns true if this pattern can signal both bullish and bearish moves
    pub fn is_bidirectional(&self) -> bool {
        self.typical_direction().is_none()
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternKind {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s {
            "head-and-shoulders" => PatternKind::HeadAndShoulders,
            "inverse-head-and-shoulders" => PatternKind::InverseHeadAndShoulders,
            "double-top" => PatternKind::DoubleTop,
            "double-bottom" => PatternKind::DoubleBottom,
            "triangle" => PatternKind::Triangle,
            "harmonic-gartley" => PatternKind::HarmonicGartley,
            "harmonic-butterfly" => PatternKind::HarmonicButterfly,
            "wyckoff-accumulation" => PatternKind::WyckoffAccumulation,
            "wyckoff-distribution" => PatternKind::WyckoffDistribution,
            "rsi-divergence" => PatternKind::RsiDivergence,
            other => {
                return CandleKind::ALL
                    .iter()
                    .find(|k| k.pattern_name() == other)
                    .map(|k| PatternKind::Candlestick(*k))
                    .ok_or_else(|| {
                        AnalysisError::InvalidConfig(format!("unknown pattern kind: {other}"))
                    });
            }
        };
        Ok(kind)
    }
}

impl Serialize for PatternKind {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PatternKind {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Named price/index pair that defines a pattern (e.g. "X", "head", "climax")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPoint {
    pub label: String,
    pub price: f64,
    pub index: usize,
}

/// Result of pattern detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub kind: PatternKind,
    pub direction: Direction,
    pub confidence: Confidence,
    /// Defining points in temporal order
    pub key_points: Vec<KeyPoint>,
    pub entry: Option<f64>,
    /// Price beyond which the pattern's thesis is false
    pub invalidation: Option<f64>,
    pub targets: Vec<f64>,
    pub start_index: usize,
    pub end_index: usize,
    /// Timeframe label, stamped by the analyzer
    pub timeframe: String,
}

impl PatternMatch {
    pub fn new(
        kind: PatternKind,
        direction: Direction,
        confidence: f64,
        start_index: usize,
        end_index: usize,
    ) -> Self {
        Self {
            kind,
            direction,
            confidence: Confidence::new(confidence),
            key_points: Vec::new(),
            entry: None,
            invalidation: None,
            targets: Vec::new(),
            start_index,
            end_index,
            timeframe: String::new(),
        }
    }

    #[must_use]
    pub fn with_key_point(mut self, label: &str, price: f64, index: usize) -> Self {
        self.key_points.push(KeyPoint {
            label: label.to_string(),
            price,
            index,
        });
        self
    }

    #[must_use]
    pub fn with_entry(mut self, entry: f64) -> Self {
        self.entry = Some(entry);
        self
    }

    #[must_use]
    pub fn with_invalidation(mut self, level: f64) -> Self {
        self.invalidation = Some(level);
        self
    }

    #[must_use]
    pub fn with_targets(mut self, targets: impl IntoIterator<Item = f64>) -> Self {
        self.targets.extend(targets);
        self
    }

    pub fn key_point(&self, label: &str) -> Option<&KeyPoint> {
        self.key_points.iter().find(|p| p.label == label)
    }

    /// True when key-point indices strictly increase
    pub fn is_temporally_ordered(&self) -> bool {
        self.key_points.windows(2).all(|w| w[0].index < w[1].index)
    }
}

// ============================================================
// MARKET CONTEXT
// ============================================================

/// Per-run context shared by every detector: short-lookback swings, the
/// structure classification and the trailing volume at the last bar.
#[derive(Debug, Clone, Default)]
pub struct MarketContext {
    pub swings: Vec<SwingPoint>,
    pub structure: MarketStructure,
    pub avg_volume: f64,
}

/// Provider of market context - computed once per analysis run
pub trait ContextProvider: Send + Sync {
    fn compute<T: OHLCV>(&self, bars: &[T]) -> MarketContext;
}

/// Default context provider
#[derive(Debug, Clone)]
pub struct DefaultContextProvider {
    /// Lookback for pattern swings
    pub swing_lookback: Period,
    pub structure: StructureAnalyzer,
    pub volume_period: Period,
}

impl Default for DefaultContextProvider {
    fn default() -> Self {
        Self {
            swing_lookback: Period::new_const(SwingExtractor::SHORT_LOOKBACK),
            structure: StructureAnalyzer::default(),
            volume_period: Period::new_const(20),
        }
    }
}

impl ContextProvider for DefaultContextProvider {
    fn compute<T: OHLCV>(&self, bars: &[T]) -> MarketContext {
        let swings = SwingExtractor::new(self.swing_lookback).extract(bars);
        let structure = self.structure.analyze(bars);
        let avg_volume = match bars.len() {
            0 => 0.0,
            len => detectors::helpers::trailing_avg_volume(
                bars,
                len - 1,
                self.volume_period.get(),
            ),
        };

        MarketContext {
            swings,
            structure,
            avg_volume,
        }
    }
}

// ============================================================
// PATTERN DETECTOR TRAITS
// ============================================================

/// Generic pattern detector trait - for concrete types.
///
/// A detector looks at the whole series (ending at the latest bar) and reports
/// the most recent qualifying formation, or `None`.
pub trait PatternDetector: Send + Sync {
    fn name(&self) -> &'static str;
    fn min_bars(&self) -> usize;
    fn detect<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Option<PatternMatch>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

/// Object-safe pattern detector trait - for custom detectors
pub trait DynPatternDetector: Send + Sync {
    fn name(&self) -> &'static str;
    fn min_bars(&self) -> usize;
    fn detect(&self, bars: &[&dyn OHLCV], ctx: &MarketContext) -> Option<PatternMatch>;
    fn validate_config(&self) -> Result<()>;
}

impl<D: PatternDetector> DynPatternDetector for D {
    fn name(&self) -> &'static str {
        PatternDetector::name(self)
    }

    fn min_bars(&self) -> usize {
        PatternDetector::min_bars(self)
    }

    fn detect(&self, bars: &[&dyn OHLCV], ctx: &MarketContext) -> Option<PatternMatch> {
        PatternDetector::detect(self, bars, ctx)
    }

    fn validate_config(&self) -> Result<()> {
        PatternDetector::validate_config(self)
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

use detectors::*;

/// Macro to generate BuiltinDetector enum without boilerplate
macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors - fast path via enum dispatch
        #[derive(Debug, Clone)]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            #[inline]
            pub fn detect<T: OHLCV>(
                &self,
                bars: &[T],
                ctx: &MarketContext,
            ) -> Option<PatternMatch> {
                match self {
                    $(Self::$variant(d) => PatternDetector::detect(d, bars, ctx)),*
                }
            }

            #[inline]
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant(d) => PatternDetector::name(d)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternDetector::min_bars(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => PatternDetector::validate_config(d)),*
                }
            }
        }
    };
}

define_builtin_detectors! {
    // Chart
    HeadAndShoulders(HeadAndShouldersDetector),
    DoubleTopBottom(DoubleTopBottomDetector),
    Triangle(TriangleDetector),

    // Candlestick
    Hammer(HammerDetector),
    ShootingStar(ShootingStarDetector),
    Engulfing(EngulfingDetector),
    Piercing(PiercingDetector),
    DarkCloudCover(DarkCloudCoverDetector),
    MorningStar(MorningStarDetector),
    EveningStar(EveningStarDetector),

    // Harmonic
    Harmonic(HarmonicDetector),

    // Volume / momentum
    Wyckoff(WyckoffDetector),
    RsiDivergence(RsiDivergenceDetector),
}

// ============================================================
// ANALYZER
// ============================================================

/// Analyzer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Label stamped on every match, e.g. "1D" or "1W"
    pub timeframe: String,
    pub min_confidence: Option<f64>,
    pub validate_data: bool,
    pub pattern_filter: Option<Vec<PatternKind>>,
    /// Apply the market-structure confidence adjustment
    pub align_with_structure: bool,
    /// Threshold for [`Analysis::levels_near`], in percent
    pub proximity_percent: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            timeframe: "1D".to_string(),
            min_confidence: None,
            validate_data: true,
            pattern_filter: None,
            align_with_structure: true,
            proximity_percent: levels::DEFAULT_PROXIMITY_PERCENT,
        }
    }
}

impl AnalyzerConfig {
    fn validate(&self) -> Result<()> {
        if self.timeframe.trim().is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "timeframe label must not be empty".to_string(),
            ));
        }
        if let Some(min) = self.min_confidence {
            Confidence::try_new(min)?;
        }
        if !(self.proximity_percent > 0.0 && self.proximity_percent.is_finite()) {
            return Err(AnalysisError::OutOfRange {
                field: "proximity_percent",
                value: self.proximity_percent,
                min: 0.0,
                max: f64::INFINITY,
            });
        }
        Ok(())
    }
}

/// Everything one detection run produces for one candle series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub timeframe: String,
    pub patterns: Vec<PatternMatch>,
    pub levels: Vec<Level>,
    pub structure: MarketStructure,
    pub indicators: Option<IndicatorSnapshot>,
    /// Close of the latest candle, if any
    pub last_price: Option<f64>,
    pub proximity_percent: f64,
}

impl Analysis {
    /// Levels within `proximity_percent` of the latest close, nearest first
    pub fn levels_near(&self) -> Vec<(&Level, Proximity)> {
        let Some(price) = self.last_price else {
            return Vec::new();
        };
        let mut near: Vec<(&Level, Proximity)> = self
            .levels
            .iter()
            .map(|l| (l, l.proximity(price, self.proximity_percent)))
            .filter(|(_, p)| p.is_near)
            .collect();
        near.sort_by(|a, b| a.1.distance_percent.total_cmp(&b.1.distance_percent));
        near
    }

    pub fn patterns_of(&self, kind: PatternKind) -> impl Iterator<Item = &PatternMatch> {
        self.patterns.iter().filter(move |m| m.kind == kind)
    }
}

/// Main analysis engine
pub struct Analyzer<C: ContextProvider = DefaultContextProvider> {
    builtin: Vec<BuiltinDetector>,
    custom: Vec<Box<dyn DynPatternDetector>>,
    levels: Option<LevelDetector>,
    indicators: bool,
    context_provider: C,
    config: AnalyzerConfig,
}

impl<C: ContextProvider> Analyzer<C> {
    pub fn new(context_provider: C) -> Self {
        Self {
            builtin: Vec::new(),
            custom: Vec::new(),
            levels: None,
            indicators: false,
            context_provider,
            config: AnalyzerConfig::default(),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn timeframe(&self) -> &str {
        &self.config.timeframe
    }

    /// Compute the shared context for a series.
    #[inline]
    pub fn compute_context<T: OHLCV>(&self, bars: &[T]) -> MarketContext {
        self.context_provider.compute(bars)
    }

    /// Run pattern detectors against a precomputed context.
    pub fn detect_patterns<T: OHLCV>(&self, bars: &[T], ctx: &MarketContext) -> Vec<PatternMatch> {
        let mut results = Vec::new();

        // Fast path: builtin detectors (enum dispatch, no vtable)
        for detector in &self.builtin {
            if bars.len() >= detector.min_bars() {
                if let Some(m) = detector.detect(bars, ctx) {
                    tracing::trace!(detector = detector.name(), kind = %m.kind, "pattern matched");
                    results.push(m);
                }
            }
        }

        // Slow path: custom detectors (vtable)
        if !self.custom.is_empty() {
            let bar_refs: Vec<&dyn OHLCV> = bars.iter().map(|b| b as &dyn OHLCV).collect();
            for detector in &self.custom {
                if bars.len() >= detector.min_bars() {
                    if let Some(m) = detector.detect(&bar_refs, ctx) {
                        tracing::trace!(detector = detector.name(), kind = %m.kind, "pattern matched");
                        results.push(m);
                    }
                }
            }
        }

        let mut pipeline = scoring::ConfidencePipeline::new();
        if self.config.align_with_structure {
            pipeline = pipeline.stage(scoring::StructureAlignment::new(&ctx.structure));
        }

        let mut results: Vec<PatternMatch> = results
            .into_iter()
            .map(|mut m| {
                m.timeframe.clone_from(&self.config.timeframe);
                pipeline.run(m)
            })
            .filter(|m| self.should_include(m))
            .collect();

        results.sort_by(|a, b| {
            a.end_index
                .cmp(&b.end_index)
                .then_with(|| a.kind.as_str().cmp(b.kind.as_str()))
        });
        results
    }

    /// Full analysis of one series.
    pub fn analyze<T: OHLCV>(&self, bars: &[T]) -> Result<Analysis> {
        if self.config.validate_data {
            if let Err(e) = validate_series(bars) {
                tracing::warn!(error = %e, timeframe = %self.config.timeframe, "rejected candle series");
                return Err(e);
            }
        }

        let ctx = self.compute_context(bars);
        let patterns = self.detect_patterns(bars, &ctx);
        let levels = self
            .levels
            .as_ref()
            .map(|d| d.detect(bars))
            .unwrap_or_default();
        let indicators = if self.indicators {
            IndicatorSnapshot::compute(bars)
        } else {
            None
        };

        tracing::debug!(
            timeframe = %self.config.timeframe,
            bars = bars.len(),
            patterns = patterns.len(),
            levels = levels.len(),
            trend = ?ctx.structure.trend,
            "analysis complete"
        );

        Ok(Analysis {
            timeframe: self.config.timeframe.clone(),
            patterns,
            levels,
            structure: ctx.structure,
            indicators,
            last_price: bars.last().map(|b| b.close()),
            proximity_percent: self.config.proximity_percent,
        })
    }

    fn should_include(&self, m: &PatternMatch) -> bool {
        if let Some(min) = self.config.min_confidence {
            if m.confidence.get() < min {
                return false;
            }
        }
        if let Some(ref filter) = self.config.pattern_filter {
            if !filter.contains(&m.kind) {
                return false;
            }
        }
        true
    }

    fn validate(&self) -> Result<()> {
        self.config.validate()?;
        for d in &self.builtin {
            d.validate_config()?;
        }
        for d in &self.custom {
            d.validate_config()?;
        }
        if let Some(levels) = &self.levels {
            levels.validate_config()?;
        }
        Ok(())
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating Analyzer instances
pub struct AnalyzerBuilder<C: ContextProvider = DefaultContextProvider> {
    context_provider: C,
    builtin: Vec<BuiltinDetector>,
    custom: Vec<Box<dyn DynPatternDetector>>,
    levels: Option<LevelDetector>,
    indicators: bool,
    config: AnalyzerConfig,
}

impl Default for AnalyzerBuilder<DefaultContextProvider> {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyzerBuilder<DefaultContextProvider> {
    pub fn new() -> Self {
        Self {
            context_provider: DefaultContextProvider::default(),
            builtin: Vec::new(),
            custom: Vec::new(),
            levels: None,
            indicators: false,
            config: AnalyzerConfig::default(),
        }
    }
}

/// Generate an array of `BuiltinDetector` variants using `Default::default()` for each inner type.
macro_rules! builtin_defaults {
  ($($variant:ident),* $(,)?) => {
    [$(BuiltinDetector::$variant(Default::default())),*]
  };
}

impl<C: ContextProvider> AnalyzerBuilder<C> {
    /// Change context provider
    pub fn context_provider<C2: ContextProvider>(self, provider: C2) -> AnalyzerBuilder<C2> {
        AnalyzerBuilder {
            context_provider: provider,
            builtin: self.builtin,
            custom: self.custom,
            levels: self.levels,
            indicators: self.indicators,
            config: self.config,
        }
    }

    /// Every builtin detector, support/resistance levels and the indicator snapshot
    pub fn with_all_defaults(self) -> Self {
        self.with_chart_defaults()
            .with_candlestick_defaults()
            .with_harmonic_defaults()
            .with_wyckoff_defaults()
            .with_divergence_defaults()
            .with_levels(LevelDetector::default())
            .with_indicators()
    }

    /// Head-and-shoulders, double top/bottom, triangle (3)
    pub fn with_chart_defaults(mut self) -> Self {
        self.builtin
            .extend(builtin_defaults![HeadAndShoulders, DoubleTopBottom, Triangle]);
        self
    }

    /// Candlestick formations on the last 1-3 bars (7)
    pub fn with_candlestick_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            Hammer,
            ShootingStar,
            Engulfing,
            Piercing,
            DarkCloudCover,
            MorningStar,
            EveningStar,
        ]);
        self
    }

    /// Gartley and Butterfly (2)
    pub fn with_harmonic_defaults(mut self) -> Self {
        self.builtin.extend([
            BuiltinDetector::Harmonic(HarmonicDetector::gartley()),
            BuiltinDetector::Harmonic(HarmonicDetector::butterfly()),
        ]);
        self
    }

    pub fn with_wyckoff_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![Wyckoff]);
        self
    }

    pub fn with_divergence_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![RsiDivergence]);
        self
    }

    /// Enable support/resistance detection
    pub fn with_levels(mut self, detector: LevelDetector) -> Self {
        self.levels = Some(detector);
        self
    }

    /// Enable the indicator snapshot
    pub fn with_indicators(mut self) -> Self {
        self.indicators = true;
        self
    }

    /// Add a builtin detector
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, detector: BuiltinDetector) -> Self {
        self.builtin.push(detector);
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, detector: BuiltinDetector) -> Result<Self> {
        detector.validate_config()?;
        self.builtin.push(detector);
        Ok(self)
    }

    /// Add a custom detector (slow path)
    pub fn add_custom<D: DynPatternDetector + 'static>(mut self, detector: D) -> Self {
        self.custom.push(Box::new(detector));
        self
    }

    /// Replace the whole configuration, e.g. one deserialized from a file
    pub fn config(mut self, config: AnalyzerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn timeframe(mut self, label: impl Into<String>) -> Self {
        self.config.timeframe = label.into();
        self
    }

    /// Set minimum confidence filter
    pub fn min_confidence(mut self, confidence: f64) -> Self {
        self.config.min_confidence = Some(confidence);
        self
    }

    /// Enable/disable data validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    /// Enable/disable the market-structure adjustment
    pub fn align_with_structure(mut self, enable: bool) -> Self {
        self.config.align_with_structure = enable;
        self
    }

    pub fn proximity_percent(mut self, percent: f64) -> Self {
        self.config.proximity_percent = percent;
        self
    }

    /// Filter to specific patterns only
    pub fn only_patterns(mut self, kinds: impl IntoIterator<Item = PatternKind>) -> Self {
        self.config.pattern_filter = Some(kinds.into_iter().collect());
        self
    }

    /// Build the analyzer
    pub fn build(self) -> Result<Analyzer<C>> {
        let analyzer = Analyzer {
            builtin: self.builtin,
            custom: self.custom,
            levels: self.levels,
            indicators: self.indicators,
            context_provider: self.context_provider,
            config: self.config,
        };
        analyzer.validate()?;
        Ok(analyzer)
    }
}

// ============================================================
// PARALLEL ANALYSIS
// ============================================================

use rayon::prelude::*;

/// Result of analysing a single instrument
#[derive(Debug)]
pub struct AnalysisResult {
    pub symbol: String,
    pub analysis: Analysis,
}

/// Error from analysing a single instrument
#[derive(Debug)]
pub struct AnalysisFailure {
    pub symbol: String,
    pub error: AnalysisError,
}

/// Parallel analysis of multiple instruments
pub fn analyze_parallel<'a, T, I, C>(
    analyzer: &Analyzer<C>,
    instruments: I,
) -> (Vec<AnalysisResult>, Vec<AnalysisFailure>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
    C: ContextProvider + Sync,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            analyzer
                .analyze(bars)
                .map(|analysis| AnalysisResult {
                    symbol: symbol.to_string(),
                    analysis,
                })
                .map_err(|error| AnalysisFailure {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

/// Two timeframes of one instrument with the confluence adjustment applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiTimeframeAnalysis {
    pub primary: Analysis,
    pub secondary: Analysis,
    pub confluence: ConfluenceResult,
}

/// Analyse two timeframes of the same instrument concurrently, then adjust
/// both pattern lists by their directional agreement.
pub fn analyze_with_confluence<T, U, C1, C2>(
    primary: (&Analyzer<C1>, &[T]),
    secondary: (&Analyzer<C2>, &[U]),
    aggregator: &ConfluenceAggregator,
) -> Result<MultiTimeframeAnalysis>
where
    T: OHLCV + Sync,
    U: OHLCV + Sync,
    C1: ContextProvider + Sync,
    C2: ContextProvider + Sync,
{
    let (first, second) = rayon::join(
        || primary.0.analyze(primary.1),
        || secondary.0.analyze(secondary.1),
    );
    let (mut first, mut second) = (first?, second?);

    let confluence = aggregator.evaluate(&first.patterns, &second.patterns);
    first.patterns = aggregator.apply(first.patterns, &confluence);
    second.patterns = aggregator.apply(second.patterns, &confluence);

    tracing::debug!(
        primary = %first.timeframe,
        secondary = %second.timeframe,
        has_confluence = confluence.has_confluence,
        boost = confluence.confidence_boost,
        "confluence evaluated"
    );

    Ok(MultiTimeframeAnalysis {
        primary: first,
        secondary: second,
        confluence,
    })
}

// ============================================================
// TYPE ALIASES
// ============================================================

/// Default analyzer with DefaultContextProvider
pub type DefaultAnalyzer = Analyzer<DefaultContextProvider>;

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(t: i64, o: f64, h: f64, l: f64, c: f64) -> Candle {
        Candle::new(t, o, h, l, c, 1000.0)
    }

    fn make_wave(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let p = 100.0 + (i as f64 * 0.25).sin() * 8.0;
                bar(i as i64, p, p + 1.0, p - 1.0, p + 0.3)
            })
            .collect()
    }

    #[test]
    fn test_ratio_validation() {
        assert!(Ratio::new(0.0).is_ok());
        assert!(Ratio::new(1.0).is_ok());
        assert!(Ratio::new(-0.1).is_err());
        assert!(Ratio::new(1.1).is_err());
        assert!(Ratio::new(f64::NAN).is_err());
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new(1).is_ok());
        assert!(Period::new(0).is_err());
    }

    #[test]
    fn test_confidence_clamps() {
        assert_eq!(Confidence::new(12.0).get(), 10.0);
        assert_eq!(Confidence::new(-3.0).get(), 0.0);
        assert_eq!(Confidence::new(f64::NAN).get(), 0.0);
        assert_eq!(Confidence::new(9.5).adjust(2.0).get(), 10.0);
        assert_eq!(Confidence::new(1.0).adjust(-2.0).get(), 0.0);
        assert!(Confidence::try_new(10.5).is_err());
        assert!(Confidence::try_new(7.5).is_ok());
    }

    #[test]
    fn test_ohlcv_ext() {
        let b = bar(0, 100.0, 110.0, 90.0, 105.0);
        assert_eq!(b.body(), 5.0);
        assert_eq!(b.range(), 20.0);
        assert!(b.is_bullish());
        assert!((b.body_ratio().unwrap() - 0.25).abs() < 0.001);
        assert!((b.typical_price() - 101.666_666).abs() < 1e-3);
    }

    #[test]
    fn test_validate_series_rejects_bad_input() {
        let ok = make_wave(10);
        assert!(validate_series(&ok).is_ok());

        let mut negative = make_wave(10);
        negative[3].low = -1.0;
        assert!(matches!(
            validate_series(&negative),
            Err(AnalysisError::InvalidCandle { index: 3, .. })
        ));

        let mut neg_volume = make_wave(10);
        neg_volume[4].volume = -5.0;
        assert!(matches!(
            validate_series(&neg_volume),
            Err(AnalysisError::InvalidCandle { index: 4, reason: "negative volume" })
        ));

        let mut unordered = make_wave(10);
        unordered[6].timestamp = unordered[5].timestamp;
        assert!(matches!(
            validate_series(&unordered),
            Err(AnalysisError::NonMonotonicTimestamp { index: 6, .. })
        ));
    }

    #[test]
    fn test_pattern_kind_names_round_trip() {
        let kinds = [
            PatternKind::HeadAndShoulders,
            PatternKind::Candlestick(CandleKind::MorningStar),
            PatternKind::HarmonicButterfly,
            PatternKind::RsiDivergence,
        ];
        for kind in kinds {
            assert_eq!(kind.as_str().parse::<PatternKind>().unwrap(), kind);
        }
        assert!("cup-and-handle".parse::<PatternKind>().is_err());
        assert_eq!(
            PatternKind::Candlestick(CandleKind::Hammer).as_str(),
            "candlestick-hammer"
        );
    }

    #[test]
    fn test_typical_direction() {
        assert_eq!(
            PatternKind::DoubleBottom.typical_direction(),
            Some(Direction::Bullish)
        );
        assert_eq!(
            PatternKind::WyckoffDistribution.typical_direction(),
            Some(Direction::Bearish)
        );
        assert!(PatternKind::HarmonicGartley.is_bidirectional());
    }

    #[test]
    fn test_analyzer_builder() {
        let analyzer = AnalyzerBuilder::new().with_all_defaults().build();
        assert!(analyzer.is_ok());
        assert_eq!(analyzer.unwrap().builtin.len(), 14);
    }

    #[test]
    fn test_builder_rejects_bad_config() {
        assert!(AnalyzerBuilder::new().timeframe("").build().is_err());
        assert!(AnalyzerBuilder::new().min_confidence(11.0).build().is_err());
        assert!(AnalyzerBuilder::new().proximity_percent(0.0).build().is_err());
    }

    #[test]
    fn test_empty_analysis() {
        let analyzer = AnalyzerBuilder::new().with_all_defaults().build().unwrap();
        let bars: Vec<Candle> = vec![];
        let analysis = analyzer.analyze(&bars).unwrap();
        assert!(analysis.patterns.is_empty());
        assert!(analysis.levels.is_empty());
        assert!(analysis.indicators.is_none());
        assert!(analysis.last_price.is_none());
    }

    #[test]
    fn test_analysis_stamps_timeframe() {
        let analyzer = AnalyzerBuilder::new()
            .with_all_defaults()
            .timeframe("4H")
            .build()
            .unwrap();
        let analysis = analyzer.analyze(&make_wave(260)).unwrap();
        assert_eq!(analysis.timeframe, "4H");
        for m in &analysis.patterns {
            assert_eq!(m.timeframe, "4H");
            assert!((0.0..=10.0).contains(&m.confidence.get()));
        }
    }

    #[test]
    fn test_min_confidence_filter() {
        let analyzer = AnalyzerBuilder::new()
            .with_all_defaults()
            .min_confidence(10.0)
            .align_with_structure(false)
            .build()
            .unwrap();
        let analysis = analyzer.analyze(&make_wave(200)).unwrap();
        assert!(analysis.patterns.iter().all(|m| m.confidence.get() >= 10.0));
    }

    #[test]
    fn test_pattern_filter() {
        let analyzer = AnalyzerBuilder::new()
            .with_all_defaults()
            .only_patterns([PatternKind::WyckoffAccumulation])
            .build()
            .unwrap();
        let analysis = analyzer.analyze(&make_wave(200)).unwrap();
        assert!(analysis
            .patterns
            .iter()
            .all(|m| m.kind == PatternKind::WyckoffAccumulation));
    }

    #[test]
    fn test_invalid_data_is_surfaced() {
        let analyzer = AnalyzerBuilder::new().with_all_defaults().build().unwrap();
        let mut bars = make_wave(50);
        bars[10].high = bars[10].low - 1.0;
        assert!(analyzer.analyze(&bars).is_err());

        let lenient = AnalyzerBuilder::new()
            .with_all_defaults()
            .validate_data(false)
            .build()
            .unwrap();
        assert!(lenient.analyze(&bars).is_ok());
    }

    struct AlwaysBullish;

    impl PatternDetector for AlwaysBullish {
        fn name(&self) -> &'static str {
            "always-bullish"
        }

        fn min_bars(&self) -> usize {
            1
        }

        fn detect<T: OHLCV>(&self, bars: &[T], _ctx: &MarketContext) -> Option<PatternMatch> {
            let last = bars.len().checked_sub(1)?;
            Some(PatternMatch::new(
                PatternKind::Candlestick(CandleKind::Hammer),
                Direction::Bullish,
                6.0,
                last,
                last,
            ))
        }
    }

    #[test]
    fn test_custom_detector() {
        let analyzer = AnalyzerBuilder::new()
            .add_custom(AlwaysBullish)
            .align_with_structure(false)
            .build()
            .unwrap();
        let analysis = analyzer.analyze(&make_wave(5)).unwrap();
        assert_eq!(analysis.patterns.len(), 1);
        assert_eq!(analysis.patterns[0].confidence.get(), 6.0);
        assert_eq!(analysis.patterns[0].timeframe, "1D");
    }

    #[test]
    fn test_parallel_analysis() {
        let analyzer = AnalyzerBuilder::new().with_all_defaults().build().unwrap();
        let good = make_wave(120);
        let mut bad = make_wave(120);
        bad[3].volume = -1.0;

        let instruments: Vec<(&str, &[Candle])> = vec![("BTCUSDT", &good), ("ETHUSDT", &bad)];
        let (results, errors) = analyze_parallel(&analyzer, instruments);
        assert_eq!(results.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].symbol, "ETHUSDT");
    }

    #[test]
    fn test_analyze_with_confluence_runs_both() {
        let daily = AnalyzerBuilder::new()
            .add_custom(AlwaysBullish)
            .align_with_structure(false)
            .timeframe("1D")
            .build()
            .unwrap();
        let weekly = AnalyzerBuilder::new()
            .add_custom(AlwaysBullish)
            .align_with_structure(false)
            .timeframe("1W")
            .build()
            .unwrap();
        let bars = make_wave(30);

        let result = analyze_with_confluence(
            (&daily, &bars),
            (&weekly, &bars),
            &ConfluenceAggregator::default(),
        )
        .unwrap();

        assert!(result.confluence.has_confluence);
        assert_eq!(result.primary.patterns[0].confidence.get(), 8.0);
        assert_eq!(result.secondary.patterns[0].timeframe, "1W");
    }

    #[test]
    fn test_config_from_json() {
        let config: AnalyzerConfig =
            serde_json::from_str(r#"{"timeframe":"1W","min_confidence":6.5}"#).unwrap();
        assert_eq!(config.timeframe, "1W");
        assert_eq!(config.min_confidence, Some(6.5));
        assert!(config.validate_data);
        assert!(config.align_with_structure);
    }
}
