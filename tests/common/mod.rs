//! Shared candle fixtures for the integration tests

#![allow(dead_code)]

use ta_confluence::prelude::*;

/// Linear path through `(index, price)` pivots, each candle `p ± spread`
pub fn zigzag(pivots: &[(usize, f64)], spread: f64) -> Vec<Candle> {
    let mut bars = Vec::new();
    for w in pivots.windows(2) {
        let ((i0, p0), (i1, p1)) = (w[0], w[1]);
        for i in i0..i1 {
            let p = p0 + (p1 - p0) * (i - i0) as f64 / (i1 - i0) as f64;
            bars.push(Candle::new(i as i64 * 60_000, p, p + spread, p - spread, p, 1000.0));
        }
    }
    let (i, p) = pivots[pivots.len() - 1];
    bars.push(Candle::new(i as i64 * 60_000, p, p + spread, p - spread, p, 1000.0));
    bars
}

/// Gartley legs: B at 0.618 of XA, C at 0.618 of AB, D at 0.786 of XA
pub fn gartley_pivots() -> Vec<(usize, f64)> {
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

/// Rise to 130, a long slide to 100 at 145, a rally to 110, a shorter drop
/// to 95 at 175, then a final leg ending at `last` on bar 199.
///
/// The long slide drains RSI(14) to about 0.3 at the first low; the rally
/// keeps it near 17 at the second, so price makes a lower low on a higher
/// RSI low.
pub fn divergence_pivots(last: f64) -> Vec<(usize, f64)> {
    vec![(0, 100.0), (60, 130.0), (145, 100.0), (160, 110.0), (175, 95.0), (199, last)]
}

/// Flat base, a 10-bar decline into a high-volume climax at `sc`, a rally
/// peaking five bars later, then a light-volume retest at `sc + 12`.
pub fn accumulation(n: usize, sc: usize) -> Vec<Candle> {
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
            Candle::new(i as i64 * 60_000, p, p + 0.5, p - 0.5, p, vol)
        })
        .collect()
}

/// Smooth oscillation around 100
pub fn wave(n: usize) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let p = 100.0 + (i as f64 * 0.25).sin() * 8.0;
            Candle::new(i as i64 * 60_000, p, p + 1.0, p - 1.0, p + 0.3, 1000.0)
        })
        .collect()
}

/// Bar type owned by the caller, read through the `OHLCV` trait
#[derive(Debug, Clone, Copy)]
pub struct TestBar {
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    pub v: f64,
}

impl OHLCV for TestBar {
    fn open(&self) -> f64 {
        self.o
    }

    fn high(&self) -> f64 {
        self.h
    }

    fn low(&self) -> f64 {
        self.l
    }

    fn close(&self) -> f64 {
        self.c
    }

    fn volume(&self) -> f64 {
        self.v
    }
}

impl From<&Candle> for TestBar {
    fn from(c: &Candle) -> Self {
        Self {
            o: c.open,
            h: c.high,
            l: c.low,
            c: c.close,
            v: c.volume,
        }
    }
}
