//! Time provider abstraction
//!
//! Time-based policies (`TimeWindow`, `RateLimit`) read the current time through a
//! [`Clock`] so that tests can drive them with a controllable clock instead of
//! the system time.
//!
//! # Example
//!
//! ```
//! use vouch::{Clock, SystemClock};
//!
//! let clock = SystemClock;
//! let secs = clock.now_secs();
//! let rfc3339 = clock.now_rfc3339();
//! assert!(secs > 0);
//! assert!(rfc3339.contains('T'));
//! ```

use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(any(test, feature = "testing"))]
use std::sync::atomic::{AtomicU64, Ordering};

/// A time provider for policy evaluation.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current time as milliseconds since Unix epoch.
    fn now_millis(&self) -> u64;

    /// Current time as whole seconds since Unix epoch.
    ///
    /// Policy bounds and rate-limit windows are expressed in seconds.
    fn now_secs(&self) -> u64 {
        self.now_millis() / 1000
    }

    /// Returns the current time as an RFC3339-formatted string.
    fn now_rfc3339(&self) -> String {
        format_timestamp(self.now_secs())
    }
}

/// Render a Unix timestamp in seconds as RFC3339, for log and error output.
pub fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| format!("@{secs}"))
}

/// Production clock using real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually driven test clock.
///
/// Unlike the system clock, time only moves when the test says so, which keeps
/// window boundaries of rate and time policies exact.
///
/// # Example
///
/// ```
/// use vouch::{Clock, FixedClock};
///
/// let clock = FixedClock::from_secs(1_000);
/// assert_eq!(clock.now_secs(), 1_000);
/// clock.advance_secs(60);
/// assert_eq!(clock.now_secs(), 1_060);
/// ```
#[cfg(any(test, feature = "testing"))]
#[derive(Debug)]
pub struct FixedClock {
    millis: AtomicU64,
}

#[cfg(any(test, feature = "testing"))]
impl FixedClock {
    /// Create a new fixed clock with the given initial time in milliseconds.
    pub fn new(millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(millis),
        }
    }

    /// Create a new fixed clock at the given Unix time in seconds.
    pub fn from_secs(secs: u64) -> Self {
        Self::new(secs * 1000)
    }

    /// Advance the clock by the given number of milliseconds.
    pub fn advance(&self, ms: u64) {
        self.millis.fetch_add(ms, Ordering::SeqCst);
    }

    /// Advance the clock by whole seconds.
    pub fn advance_secs(&self, secs: u64) {
        self.advance(secs * 1000);
    }

    /// Set the clock to a specific time in milliseconds.
    pub fn set(&self, ms: u64) {
        self.millis.store(ms, Ordering::SeqCst);
    }

    /// Set the clock to a specific Unix time in seconds.
    pub fn set_secs(&self, secs: u64) {
        self.set(secs * 1000);
    }
}

#[cfg(any(test, feature = "testing"))]
impl Clock for FixedClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "testing"))]
impl Default for FixedClock {
    fn default() -> Self {
        // 2024-01-01 00:00:00 UTC
        Self::new(1704067200000)
    }
}
