//! Settle detection.
//!
//! This module provides:
//! - `tracker`: per-path countdowns that turn write bursts into one settle signal
//! - `ticker`: the periodic driver that advances those countdowns

pub mod ticker;
pub mod tracker;

pub use ticker::{Ticker, DEFAULT_TICK_INTERVAL};
pub use tracker::{SettleTracker, DEFAULT_SETTLE_TICKS};
