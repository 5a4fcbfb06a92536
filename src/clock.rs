use chrono::{DateTime, Utc};

/// Time source for `created_at` / `last_activity` / message timestamps.
///
/// Injected into the store so tests can freeze or step time; message ordering
/// never depends on the clock being strictly increasing (the store clamps
/// timestamps to be monotonically non-decreasing per group).
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
