//! Poll cadence and view liveness.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};

pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Fixed-period ticker. The first tick fires immediately; a tick that overruns
/// delays the next one instead of bursting to catch up.
pub fn cadence(period: Duration) -> Interval {
    let mut t = interval(period.max(MIN_POLL_INTERVAL));
    t.set_missed_tick_behavior(MissedTickBehavior::Delay);
    t
}

/// Shared flag cleared when a view is torn down. In-flight work checks it
/// before applying fetched results.
pub struct Liveness {
    alive: Arc<AtomicBool>,
}

impl Clone for Liveness {
    fn clone(&self) -> Self { Liveness { alive: self.alive.clone() } }
}

impl Default for Liveness {
    fn default() -> Self { Self::new() }
}

impl Liveness {
    pub fn new() -> Self {
        Liveness { alive: Arc::new(AtomicBool::new(true)) }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::Release);
    }
}
