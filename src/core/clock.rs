use std::time::{Duration, SystemTime};

pub const MILLIS_PER_SECOND: i64 = 1000;

/// Source of wall-clock time, in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn current_time_millis(&self) -> i64;

    fn current_time_secs(&self) -> i64 {
        self.current_time_millis() / MILLIS_PER_SECOND
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn current_time_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_millis() as i64
    }
}

/// A clock pinned to a single instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub i64);

impl FixedClock {
    pub fn from_secs(secs: i64) -> Self {
        Self(secs * MILLIS_PER_SECOND)
    }
}

impl Clock for FixedClock {
    fn current_time_millis(&self) -> i64 {
        self.0
    }
}

/// Converts a relative `expires_in` (seconds) to an absolute expiry in milliseconds.
pub fn expiry_from_now(clock: &dyn Clock, expires_in_secs: i64) -> i64 {
    clock
        .current_time_millis()
        .saturating_add(expires_in_secs.saturating_mul(MILLIS_PER_SECOND))
}
