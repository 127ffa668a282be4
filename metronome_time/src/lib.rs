//! Wall-clock abstraction used for cache expiry and time bounds.
//!
//! Components never call [`Utc::now`] directly, they hold an `Arc<dyn TimeProvider>` so that
//! tests can drive expiry with a [`MockProvider`].
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr,
    clippy::future_not_send
)]

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use std::time::Duration;

/// A UTC timestamp returned by a [`TimeProvider`]
///
/// Purposefully does not provide [`std::convert::From`] implementations, as it is intended to be
/// an opaque type returned by a `TimeProvider`. The constructors are for tests and for converting
/// UNIX seconds received from the backend.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct Time(DateTime<Utc>);

impl std::fmt::Debug for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl Time {
    /// The UNIX epoch, the earliest time any metric can be reported for
    pub const EPOCH: Self = Self(DateTime::<Utc>::UNIX_EPOCH);

    /// Makes a new `Time` from the number of non-leap seconds since the UNIX epoch
    ///
    /// Returns `None` if out of range
    pub fn from_timestamp(secs: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp(secs, 0).map(Self)
    }

    /// Returns the number of seconds since the UNIX epoch
    pub fn timestamp(&self) -> i64 {
        self.0.timestamp()
    }

    /// Returns the duration since the provided time or None if it would be negative
    pub fn checked_duration_since(&self, other: Self) -> Option<Duration> {
        self.0.signed_duration_since(other.0).to_std().ok()
    }

    /// Adds given [`Duration`] to the current date and time.
    ///
    /// Returns `None` if it would result in overflow
    pub fn checked_add(&self, duration: Duration) -> Option<Self> {
        let duration = TimeDelta::from_std(duration).ok()?;
        Some(Self(self.0.checked_add_signed(duration)?))
    }
}

pub trait TimeProvider: std::fmt::Debug + Send + Sync + 'static {
    /// Returns the current `Time`. No guarantees are made about monotonicity
    fn now(&self) -> Time;
}

/// A [`TimeProvider`] that uses [`Utc::now`] as a clock source
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProvider {}

impl SystemProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimeProvider for SystemProvider {
    fn now(&self) -> Time {
        Time(Utc::now())
    }
}

/// A [`TimeProvider`] that returns a fixed `Time` that can be set by [`MockProvider::set`]
#[derive(Debug)]
pub struct MockProvider {
    now: RwLock<Time>,
}

impl MockProvider {
    pub fn new(start: Time) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn set(&self, time: Time) {
        *self.now.write() = time
    }

    /// Advance the clock by `duration`, saturating at the current time on overflow
    pub fn inc(&self, duration: Duration) -> Time {
        let mut now = self.now.write();
        if let Some(next) = now.checked_add(duration) {
            *now = next;
        }
        *now
    }
}

impl TimeProvider for MockProvider {
    fn now(&self) -> Time {
        *self.now.read()
    }
}
