//! Tick-driven periodic timer.
//!
//! The protocol never reads a clock. The embedding game loop passes the
//! elapsed time into `tick` calls and timers accumulate it.

use std::time::Duration;

/// Accumulating timer that fires once per `period`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Timer {
    period: Duration,
    elapsed: Duration,
    running: bool,
}

impl Timer {
    /// Create a stopped timer with the given period.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            elapsed: Duration::ZERO,
            running: false,
        }
    }

    /// Start (or restart) the timer from zero.
    pub fn start(&mut self) {
        self.elapsed = Duration::ZERO;
        self.running = true;
    }

    /// Stop the timer. A stopped timer never fires.
    pub fn stop(&mut self) {
        self.running = false;
        self.elapsed = Duration::ZERO;
    }

    /// Whether the timer is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The configured period.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Advance by `delta`. Returns `true` if the period elapsed, in which
    /// case the timer restarts.
    ///
    /// A long stall fires once, not once per missed period.
    pub fn advance(&mut self, delta: Duration) -> bool {
        if !self.running {
            return false;
        }
        self.elapsed += delta;
        if self.elapsed >= self.period {
            self.elapsed = Duration::ZERO;
            true
        } else {
            false
        }
    }
}
