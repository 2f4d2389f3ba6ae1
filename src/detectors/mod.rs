//! Pattern detectors
//!
//! # Families
//!
//! - **Chart (3)**: Head and Shoulders (and inverse), Double Top/Bottom, Triangle
//! - **Candlestick (7)**: Hammer, Shooting Star, Engulfing, Piercing, Dark Cloud
//!   Cover, Morning/Evening Star
//! - **Harmonic (2)**: Gartley, Butterfly
//! - **Wyckoff (1)**: Accumulation/Distribution events
//! - **Divergence (1)**: Regular RSI divergence

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod candlestick;
pub mod chart;
pub mod divergence;
pub mod harmonic;
pub mod wyckoff;

// Re-export all detectors for convenience
pub use candlestick::*;
pub use chart::*;
pub use divergence::*;
pub use harmonic::*;
pub use wyckoff::*;
