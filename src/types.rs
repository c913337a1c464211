//! Core types for tickstore

use crate::period::PeriodDuration;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Timestamp in 100-nanosecond ticks since 0001-01-01T00:00:00 UTC
pub type Tick = i64;

/// Ticks per millisecond
pub const TICKS_PER_MILLISECOND: i64 = 10_000;

/// Ticks per second
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Ticks per minute
pub const TICKS_PER_MINUTE: i64 = 60 * TICKS_PER_SECOND;

/// Ticks per hour
pub const TICKS_PER_HOUR: i64 = 60 * TICKS_PER_MINUTE;

/// Ticks per day
pub const TICKS_PER_DAY: i64 = 24 * TICKS_PER_HOUR;

/// Ticks between 0001-01-01T00:00:00 UTC and the Unix epoch
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Convert an instant to its tick count
pub fn to_ticks(at: DateTime<Utc>) -> Tick {
    UNIX_EPOCH_TICKS + at.timestamp() * TICKS_PER_SECOND + (at.timestamp_subsec_nanos() as i64) / 100
}

/// Convert a tick count back to an instant
///
/// Returns `None` for tick values outside the representable calendar range.
pub fn from_ticks(ticks: Tick) -> Option<DateTime<Utc>> {
    let unix = ticks - UNIX_EPOCH_TICKS;
    let secs = unix.div_euclid(TICKS_PER_SECOND);
    let nanos = (unix.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}

/// A single raw sample: an instant plus one value per axis
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// When the sample was taken
    pub at: DateTime<Utc>,
    /// One value per series axis
    pub values: Vec<f64>,
}

impl Point {
    /// Create a new point
    pub fn new(at: DateTime<Utc>, values: Vec<f64>) -> Self {
        Self { at, values }
    }

    /// The first axis value
    pub fn value(&self) -> f64 {
        self.values[0]
    }
}

/// Aggregate over one axis of a rollup bucket
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RangeValue {
    /// Number of raw samples in the bucket
    pub volume: f64,
    /// Highest sample value
    pub high: f64,
    /// Lowest sample value
    pub low: f64,
    /// First sample value
    pub open: f64,
    /// Last sample value
    pub close: f64,
    /// Sum of sample values
    pub sum: f64,
}

impl RangeValue {
    /// Fold one raw sample into the aggregate
    pub fn observe(&mut self, value: f64) {
        if self.volume == 0.0 {
            self.open = value;
            self.high = value;
            self.low = value;
            self.sum = value;
        } else {
            self.high = self.high.max(value);
            self.low = self.low.min(value);
            self.sum += value;
        }
        self.close = value;
        self.volume += 1.0;
    }
}

/// A rollup bucket covering the half-open window `[start_at, start_at + duration)`
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    /// Window start (always period-aligned)
    pub start_at: DateTime<Utc>,
    /// Window length
    pub duration: PeriodDuration,
    /// One aggregate per series axis
    pub values: Vec<RangeValue>,
}

impl Range {
    /// Create an empty bucket for the given window and arity
    pub fn new(start_at: DateTime<Utc>, duration: PeriodDuration, arity: usize) -> Self {
        Self {
            start_at,
            duration,
            values: vec![RangeValue::default(); arity],
        }
    }

    /// The first axis aggregate
    pub fn value(&self) -> &RangeValue {
        &self.values[0]
    }
}

/// Raw point range query
#[derive(Debug, Clone)]
pub struct TimeSeriesQuery {
    /// Series key
    pub key: String,
    /// Range start (inclusive)
    pub start: DateTime<Utc>,
    /// Range end (inclusive)
    pub end: DateTime<Utc>,
}

/// Rollup range query
#[derive(Debug, Clone)]
pub struct TimeSeriesRollupQuery {
    /// Series key
    pub key: String,
    /// Range start (inclusive, must be period-aligned)
    pub start: DateTime<Utc>,
    /// Range end (exclusive, must be period-aligned)
    pub end: DateTime<Utc>,
    /// Rollup granularity
    pub duration: PeriodDuration,
}

/// Cooperative cancellation for streaming queries
///
/// Cloning hands out another handle to the same token.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a fresh, unsignaled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to all holders
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Check whether cancellation was signaled
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Clock capability injected into the store so tests can pin time
pub trait Clock: Send + Sync {
    /// The current instant
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
