//! Classic indicators and the latest-bar indicator snapshot.
//!
//! Series functions return one entry per input value, `None` during warmup.

use serde::{Deserialize, Serialize};

use crate::{OHLCVExt, OHLCV};

/// Fewest candles for which a snapshot is produced
pub const MIN_SNAPSHOT_BARS: usize = 30;

// ============================================================
// SERIES
// ============================================================

/// Simple moving average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = Some(sum / period as f64);
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = Some(sum / period as f64);
    }
    out
}

/// Exponential moving average, `alpha = 2 / (period + 1)`, seeded with the
/// first value.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut acc: Option<f64> = None;
    for &v in values {
        let next = match acc {
            None => v,
            Some(prev) => alpha * v + (1.0 - alpha) * prev,
        };
        acc = Some(next);
        out.push(acc);
    }
    out
}

/// RSI with Wilder's smoothing.
///
/// The first average gain/loss is the plain mean of the first `period`
/// changes; after that `avg = (avg * (period - 1) + x) / period`. The first
/// value lands at index `period`. Zero average loss gives 100.
pub fn wilder_rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let change = |i: usize| closes[i] - closes[i - 1];
    let (mut gain, mut loss) = (1..=period).fold((0.0, 0.0), |(g, l), i| {
        let d = change(i);
        (g + d.max(0.0), l + (-d).max(0.0))
    });
    gain /= period as f64;
    loss /= period as f64;
    out[period] = Some(rsi_value(gain, loss));

    let p = period as f64;
    for i in period + 1..closes.len() {
        let d = change(i);
        gain = (gain * (p - 1.0) + d.max(0.0)) / p;
        loss = (loss * (p - 1.0) + (-d).max(0.0)) / p;
        out[i] = Some(rsi_value(gain, loss));
    }
    out
}

#[inline]
fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdPoint {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// MACD line, signal line and histogram from EMAs
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Vec<Option<MacdPoint>> {
    let fast = ema(closes, fast);
    let slow = ema(closes, slow);
    let line: Vec<f64> = fast
        .iter()
        .zip(&slow)
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => f - s,
            _ => f64::NAN,
        })
        .collect();
    let sig = ema(&line, signal);

    line.iter()
        .zip(sig)
        .map(|(&m, s)| {
            let s = s?;
            (m.is_finite() && s.is_finite()).then_some(MacdPoint {
                macd: m,
                signal: s,
                histogram: m - s,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger bands: SMA ± `width` sample standard deviations
pub fn bollinger(closes: &[f64], period: usize, width: f64) -> Vec<Option<Bands>> {
    let mid = sma(closes, period);
    mid.iter()
        .enumerate()
        .map(|(i, m)| {
            let m = (*m)?;
            if period < 2 {
                return Some(Bands {
                    upper: m,
                    middle: m,
                    lower: m,
                });
            }
            let window = &closes[i + 1 - period..=i];
            let var = window.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (period - 1) as f64;
            let sd = var.sqrt();
            Some(Bands {
                upper: m + width * sd,
                middle: m,
                lower: m - width * sd,
            })
        })
        .collect()
}

/// Average true range as a simple mean of the true range
pub fn atr<T: OHLCV>(bars: &[T], period: usize) -> Vec<Option<f64>> {
    let tr: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, b)| {
            let hl = b.high() - b.low();
            match i.checked_sub(1) {
                None => hl,
                Some(p) => {
                    let pc = bars[p].close();
                    hl.max((b.high() - pc).abs()).max((b.low() - pc).abs())
                }
            }
        })
        .collect();
    sma(&tr, period)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StochasticPoint {
    pub k: Option<f64>,
    pub d: Option<f64>,
}

/// Stochastic %K over `k_period`, %D as the `d_period` mean of %K.
/// A flat window leaves %K undefined.
pub fn stochastic<T: OHLCV>(bars: &[T], k_period: usize, d_period: usize) -> Vec<StochasticPoint> {
    let k: Vec<Option<f64>> = (0..bars.len())
        .map(|i| {
            let (hh, ll) = window_extremes(bars, i, k_period)?;
            let range = hh - ll;
            (range > 0.0).then(|| 100.0 * (bars[i].close() - ll) / range)
        })
        .collect();

    (0..bars.len())
        .map(|i| {
            let d = if d_period > 0 && i + 1 >= d_period {
                let window = &k[i + 1 - d_period..=i];
                window
                    .iter()
                    .copied()
                    .sum::<Option<f64>>()
                    .map(|s| s / d_period as f64)
            } else {
                None
            };
            StochasticPoint { k: k[i], d }
        })
        .collect()
}

/// Highest high and lowest low of the `period` bars ending at `i`
fn window_extremes<T: OHLCV>(bars: &[T], i: usize, period: usize) -> Option<(f64, f64)> {
    if period == 0 || i + 1 < period {
        return None;
    }
    let window = &bars[i + 1 - period..=i];
    let hh = window.iter().map(|b| b.high()).fold(f64::NEG_INFINITY, f64::max);
    let ll = window.iter().map(|b| b.low()).fold(f64::INFINITY, f64::min);
    Some((hh, ll))
}

/// Williams %R in `[-100, 0]`; a flat window leaves it undefined
pub fn williams_r<T: OHLCV>(bars: &[T], period: usize) -> Vec<Option<f64>> {
    (0..bars.len())
        .map(|i| {
            let (hh, ll) = window_extremes(bars, i, period)?;
            let range = hh - ll;
            (range > 0.0).then(|| -100.0 * (hh - bars[i].close()) / range)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdxPoint {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

/// Average directional index with Wilder smoothing.
///
/// TR, +DM and -DM are seeded with their sum over the first `period` moves,
/// then `s = s - s / period + x`. ADX is the mean of the first `period` DX
/// values, Wilder-smoothed after that, so the first point lands at index
/// `2 * period - 1`.
pub fn adx<T: OHLCV>(bars: &[T], period: usize) -> Vec<Option<AdxPoint>> {
    let n = bars.len();
    let mut out = vec![None; n];
    if period == 0 || n < 2 * period {
        return out;
    }

    let mut tr = vec![0.0; n];
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let (prev, bar) = (&bars[i - 1], &bars[i]);
        let pc = prev.close();
        tr[i] = bar.range().max((bar.high() - pc).abs()).max((bar.low() - pc).abs());
        let up = bar.high() - prev.high();
        let down = prev.low() - bar.low();
        if up > down && up > 0.0 {
            plus_dm[i] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[i] = down;
        }
    }

    let p = period as f64;
    let (mut s_tr, mut s_plus, mut s_minus) = (1..=period).fold((0.0, 0.0, 0.0), |(t, a, b), i| {
        (t + tr[i], a + plus_dm[i], b + minus_dm[i])
    });
    let mut acc = 0.0;
    for i in period..n {
        if i > period {
            s_tr = s_tr - s_tr / p + tr[i];
            s_plus = s_plus - s_plus / p + plus_dm[i];
            s_minus = s_minus - s_minus / p + minus_dm[i];
        }
        let (plus_di, minus_di) = if s_tr > 0.0 {
            (100.0 * s_plus / s_tr, 100.0 * s_minus / s_tr)
        } else {
            (0.0, 0.0)
        };
        let di_sum = plus_di + minus_di;
        let dx = if di_sum > 0.0 {
            100.0 * (plus_di - minus_di).abs() / di_sum
        } else {
            0.0
        };

        let value = match i.cmp(&(2 * period - 1)) {
            std::cmp::Ordering::Less => {
                acc += dx;
                continue;
            }
            std::cmp::Ordering::Equal => (acc + dx) / p,
            std::cmp::Ordering::Greater => (acc * (p - 1.0) + dx) / p,
        };
        acc = value;
        out[i] = Some(AdxPoint {
            adx: value,
            plus_di,
            minus_di,
        });
    }
    out
}

/// On-balance volume, starting from 0 at the first bar
pub fn obv<T: OHLCV>(bars: &[T]) -> Vec<f64> {
    let mut total = 0.0;
    bars.iter()
        .enumerate()
        .map(|(i, b)| {
            if let Some(prev) = i.checked_sub(1).map(|p| bars[p].close()) {
                if b.close() > prev {
                    total += b.volume();
                } else if b.close() < prev {
                    total -= b.volume();
                }
            }
            total
        })
        .collect()
}

/// Commodity channel index over the typical price. Zero mean deviation
/// reads as 0.
pub fn cci<T: OHLCV>(bars: &[T], period: usize) -> Vec<Option<f64>> {
    let tp: Vec<f64> = bars.iter().map(|b| b.typical_price()).collect();
    sma(&tp, period)
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let m = (*m)?;
            let window = &tp[i + 1 - period..=i];
            let dev = window.iter().map(|v| (v - m).abs()).sum::<f64>() / period as f64;
            Some(if dev > 0.0 { (tp[i] - m) / (0.015 * dev) } else { 0.0 })
        })
        .collect()
}

/// Money flow index: RSI-style ratio of rising to falling typical-price
/// flow over the last `period` changes
pub fn mfi<T: OHLCV>(bars: &[T], period: usize) -> Vec<Option<f64>> {
    let n = bars.len();
    let mut out = vec![None; n];
    if period == 0 || n <= period {
        return out;
    }
    let tp: Vec<f64> = bars.iter().map(|b| b.typical_price()).collect();
    for i in period..n {
        let (mut pos, mut neg) = (0.0, 0.0);
        for j in i + 1 - period..=i {
            let flow = tp[j] * bars[j].volume();
            if tp[j] > tp[j - 1] {
                pos += flow;
            } else if tp[j] < tp[j - 1] {
                neg += flow;
            }
        }
        out[i] = Some(rsi_value(pos, neg));
    }
    out
}

/// Parabolic stop-and-reverse with acceleration `step`, capped at `max`.
/// The first bar has no stop.
pub fn parabolic_sar<T: OHLCV>(bars: &[T], step: f64, max: f64) -> Vec<Option<f64>> {
    let mut out = vec![None; bars.len()];
    if bars.len() < 2 {
        return out;
    }
    let mut rising = bars[1].high() > bars[0].high();
    let mut af = step;
    let (mut sar, mut ep) = if rising {
        (bars[0].low(), bars[0].high())
    } else {
        (bars[0].high(), bars[0].low())
    };

    for i in 1..bars.len() {
        let (high, low) = (bars[i].high(), bars[i].low());
        let mut next = sar + af * (ep - sar);
        if rising {
            next = next.min(bars[i - 1].low());
            if i >= 2 {
                next = next.min(bars[i - 2].low());
            }
            if low < next {
                rising = false;
                next = ep;
                ep = low;
                af = step;
            } else if high > ep {
                ep = high;
                af = (af + step).min(max);
            }
        } else {
            next = next.max(bars[i - 1].high());
            if i >= 2 {
                next = next.max(bars[i - 2].high());
            }
            if high > next {
                rising = true;
                next = ep;
                ep = high;
                af = step;
            } else if low < ep {
                ep = low;
                af = (af + step).min(max);
            }
        }
        sar = next;
        out[i] = Some(sar);
    }
    out
}

// ============================================================
// SNAPSHOT
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BandPosition {
    Lower,
    Middle,
    Upper,
    Unknown,
}

impl BandPosition {
    /// Lower fifth, upper fifth, or in between
    pub fn classify(price: f64, bands: &Bands) -> Self {
        let width = bands.upper - bands.lower;
        if width <= 0.0 {
            return BandPosition::Unknown;
        }
        let pos = (price - bands.lower) / width;
        if pos < 0.2 {
            BandPosition::Lower
        } else if pos > 0.8 {
            BandPosition::Upper
        } else {
            BandPosition::Middle
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StochasticZone {
    Oversold,
    Neutral,
    Overbought,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Volatility {
    Low,
    Medium,
    High,
}

impl Volatility {
    /// ATR above 5% of price is high, above 2% medium
    pub fn classify(atr: f64, price: f64) -> Self {
        if atr > price * 0.05 {
            Volatility::High
        } else if atr > price * 0.02 {
            Volatility::Medium
        } else {
            Volatility::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdxStrength {
    Strong,
    Weak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndicatorSignal {
    RsiOversold,
    RsiOverbought,
    MacdBullish,
    MacdBearish,
    BbOversold,
    BbOverbought,
    TrendBullish,
    TrendBearish,
    /// ADX above 25
    StrongTrend,
    /// ADX below 20
    WeakTrend,
}

impl IndicatorSignal {
    pub fn is_bullish(self) -> bool {
        matches!(
            self,
            IndicatorSignal::RsiOversold
                | IndicatorSignal::MacdBullish
                | IndicatorSignal::BbOversold
                | IndicatorSignal::TrendBullish
        )
    }

    /// Trend-strength signals vote for neither side
    pub fn is_bearish(self) -> bool {
        matches!(
            self,
            IndicatorSignal::RsiOverbought
                | IndicatorSignal::MacdBearish
                | IndicatorSignal::BbOverbought
                | IndicatorSignal::TrendBearish
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalSummary {
    pub action: SignalAction,
    /// Signals on the winning side
    pub strength: usize,
    /// 0..=1
    pub confidence: f64,
}

impl SignalSummary {
    /// Majority vote; 0.2 per agreeing signal, capped at 0.8. A tie holds at 0.5.
    pub fn from_signals(signals: &[IndicatorSignal]) -> Self {
        let bullish = signals.iter().filter(|s| s.is_bullish()).count();
        let bearish = signals.iter().filter(|s| s.is_bearish()).count();
        let (action, count) = match bullish.cmp(&bearish) {
            std::cmp::Ordering::Greater => (SignalAction::Buy, bullish),
            std::cmp::Ordering::Less => (SignalAction::Sell, bearish),
            std::cmp::Ordering::Equal => {
                return Self {
                    action: SignalAction::Hold,
                    strength: bullish,
                    confidence: 0.5,
                }
            }
        };
        Self {
            action,
            strength: count,
            confidence: (count as f64 * 0.2).min(0.8),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerSnapshot {
    pub bands: Bands,
    pub position: BandPosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StochasticSnapshot {
    pub k: f64,
    pub d: f64,
    pub zone: StochasticZone,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdxSnapshot {
    pub value: f64,
    pub plus_di: f64,
    pub minus_di: f64,
    pub strength: AdxStrength,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtrSnapshot {
    pub value: f64,
    pub volatility: Volatility,
}

/// Latest values of the standard indicator set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub rsi_7: Option<f64>,
    pub rsi_14: Option<f64>,
    pub rsi_21: Option<f64>,
    pub macd: Option<MacdPoint>,
    pub bollinger: Option<BollingerSnapshot>,
    pub stochastic: StochasticSnapshot,
    pub atr: AtrSnapshot,
    pub adx: Option<AdxSnapshot>,
    pub obv: f64,
    pub williams_r: Option<f64>,
    pub cci: Option<f64>,
    pub mfi: Option<f64>,
    pub parabolic_sar: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub ema_12: Option<f64>,
    pub ema_26: Option<f64>,
    pub signals: Vec<IndicatorSignal>,
    pub summary: SignalSummary,
}

fn last<T: Copy>(series: &[Option<T>]) -> Option<T> {
    series.last().copied().flatten()
}

impl IndicatorSnapshot {
    /// `None` below [`MIN_SNAPSHOT_BARS`] candles
    pub fn compute<T: OHLCV>(bars: &[T]) -> Option<Self> {
        if bars.len() < MIN_SNAPSHOT_BARS {
            return None;
        }
        let closes: Vec<f64> = bars.iter().map(|b| b.close()).collect();
        let price = *closes.last()?;

        let rsi_14 = last(&wilder_rsi(&closes, 14));
        let macd = last(&macd(&closes, 12, 26, 9));
        let bands = last(&bollinger(&closes, 20, 2.0));
        let sma_20 = last(&sma(&closes, 20));
        let sma_50 = last(&sma(&closes, 50));

        // Undefined stochastic reads as neutral 50, undefined ATR as 0
        let stoch = stochastic(bars, 14, 3).last().copied();
        let k = stoch.and_then(|s| s.k).unwrap_or(50.0);
        let d = stoch.and_then(|s| s.d).unwrap_or(50.0);
        let zone = if k < 20.0 {
            StochasticZone::Oversold
        } else if k > 80.0 {
            StochasticZone::Overbought
        } else {
            StochasticZone::Neutral
        };
        let atr_value = last(&atr(bars, 14)).unwrap_or(0.0);
        let adx = last(&adx(bars, 14)).map(|p| AdxSnapshot {
            value: p.adx,
            plus_di: p.plus_di,
            minus_di: p.minus_di,
            strength: if p.adx > 25.0 {
                AdxStrength::Strong
            } else {
                AdxStrength::Weak
            },
        });

        let mut signals = Vec::new();
        if let Some(rsi) = rsi_14 {
            if rsi < 30.0 {
                signals.push(IndicatorSignal::RsiOversold);
            } else if rsi > 70.0 {
                signals.push(IndicatorSignal::RsiOverbought);
            }
        }
        if let Some(m) = macd {
            signals.push(if m.macd > m.signal {
                IndicatorSignal::MacdBullish
            } else {
                IndicatorSignal::MacdBearish
            });
        }
        if let Some(a) = adx {
            if a.value > 25.0 {
                signals.push(IndicatorSignal::StrongTrend);
            } else if a.value < 20.0 {
                signals.push(IndicatorSignal::WeakTrend);
            }
        }
        if let Some(b) = bands {
            if price < b.lower {
                signals.push(IndicatorSignal::BbOversold);
            } else if price > b.upper {
                signals.push(IndicatorSignal::BbOverbought);
            }
        }
        if let (Some(fast), Some(slow)) = (sma_20, sma_50) {
            signals.push(if fast > slow {
                IndicatorSignal::TrendBullish
            } else {
                IndicatorSignal::TrendBearish
            });
        }

        Some(Self {
            rsi_7: last(&wilder_rsi(&closes, 7)),
            rsi_14,
            rsi_21: last(&wilder_rsi(&closes, 21)),
            macd,
            bollinger: bands.map(|b| BollingerSnapshot {
                bands: b,
                position: BandPosition::classify(price, &b),
            }),
            stochastic: StochasticSnapshot { k, d, zone },
            atr: AtrSnapshot {
                value: atr_value,
                volatility: Volatility::classify(atr_value, price),
            },
            adx,
            obv: obv(bars).last().copied().unwrap_or(0.0),
            williams_r: last(&williams_r(bars, 14)),
            cci: last(&cci(bars, 14)),
            mfi: last(&mfi(bars, 14)),
            parabolic_sar: last(&parabolic_sar(bars, 0.02, 0.2)),
            sma_20,
            sma_50,
            ema_12: last(&ema(&closes, 12)),
            ema_26: last(&ema(&closes, 26)),
            summary: SignalSummary::from_signals(&signals),
            signals,
        })
    }
}
