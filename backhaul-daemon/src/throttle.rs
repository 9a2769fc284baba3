//! Leading-edge throttle with drop semantics.
//!
//! The first request in a window is admitted; every further request inside
//! the window is dropped — not queued, not deferred. This is deliberately
//! not a debounce: admission never waits for quiescence, and a dropped
//! burst's last request is not replayed.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

pub struct Throttle {
    window: Duration,
    last_admitted: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_admitted: Mutex::new(None),
        }
    }

    /// Admit a request if the window since the last admission has elapsed.
    ///
    /// Takes the clock as an argument so tests can drive it deterministically;
    /// runtime callers pass `Instant::now()`. Safe to call from any task —
    /// the lock is held only for the compare-and-store.
    pub fn try_admit(&self, now: Instant) -> bool {
        let mut last = match self.last_admitted.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match *last {
            Some(admitted_at) if now.duration_since(admitted_at) < self.window => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
