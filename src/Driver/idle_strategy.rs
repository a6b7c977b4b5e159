//! Pluggable back-off strategies for what an [`Agent`](super::agent::Agent)
//! does between `do_work` calls that found nothing to do. Busy-spinning
//! gives the lowest latency at the cost of a full core; backoff trades
//! latency for not pegging the CPU when idle.
//!
//! The parked phase of [`BackoffIdleStrategy`] reuses `Core::futex`'s
//! `futex_wait`/`futex_wait_timeout` primitives.

use std::sync::atomic::AtomicU32;
use std::time::Duration;

use crate::Core::futex::futex_wait_timeout;

pub trait IdleStrategy: Send {
    /// Called once per duty cycle with how much work was just done.
    /// `0` means the agent found nothing to do.
    fn idle(&mut self, work_count: usize);

    fn reset(&mut self) {}
}

/// Never yields the CPU. Appropriate only when an agent has a core to
/// itself and latency matters more than anything else.
#[derive(Default)]
pub struct BusySpinIdleStrategy;

impl IdleStrategy for BusySpinIdleStrategy {
    fn idle(&mut self, work_count: usize) {
        if work_count == 0 {
            std::hint::spin_loop();
        }
    }
}

/// Yields the thread to the scheduler on every idle cycle. A middle
/// ground: still responsive, shares the core with other work.
#[derive(Default)]
pub struct YieldingIdleStrategy;

impl IdleStrategy for YieldingIdleStrategy {
    fn idle(&mut self, work_count: usize) {
        if work_count == 0 {
            std::thread::yield_now();
        }
    }
}

/// Spins, then yields, then parks on a futex with an increasing timeout,
/// resetting back to spinning the moment any work is found. The
/// production default: cheap when busy, doesn't burn a core when idle.
pub struct BackoffIdleStrategy {
    spin_limit: u32,
    yield_limit: u32,
    max_park: Duration,
    consecutive_idle: u32,
    park_gate: AtomicU32,
}

impl Default for BackoffIdleStrategy {
    fn default() -> Self {
        Self::new(100, 100, Duration::from_millis(1))
    }
}

impl BackoffIdleStrategy {
    pub fn new(spin_limit: u32, yield_limit: u32, max_park: Duration) -> Self {
        Self {
            spin_limit,
            yield_limit,
            max_park,
            consecutive_idle: 0,
            park_gate: AtomicU32::new(0),
        }
    }
}

impl IdleStrategy for BackoffIdleStrategy {
    fn idle(&mut self, work_count: usize) {
        if work_count > 0 {
            self.reset();
            return;
        }

        self.consecutive_idle += 1;
        if self.consecutive_idle <= self.spin_limit {
            std::hint::spin_loop();
        } else if self.consecutive_idle <= self.spin_limit + self.yield_limit {
            std::thread::yield_now();
        } else {
            futex_wait_timeout(&self.park_gate, 0, self.max_park);
        }
    }

    fn reset(&mut self) {
        self.consecutive_idle = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_spin_never_panics_and_accepts_both_zero_and_nonzero() {
        let mut s = BusySpinIdleStrategy;
        s.idle(0);
        s.idle(5);
    }

    #[test]
    fn backoff_resets_consecutive_idle_on_work() {
        let mut s = BackoffIdleStrategy::new(2, 2, Duration::from_millis(1));
        s.idle(0);
        s.idle(0);
        s.idle(1);
        assert_eq!(s.consecutive_idle, 0);
    }

    #[test]
    fn backoff_progresses_through_spin_yield_and_park_phases() {
        let mut s = BackoffIdleStrategy::new(1, 1, Duration::from_millis(1));
        s.idle(0); // spin
        s.idle(0); // yield
        s.idle(0); // park, exercises futex_wait_timeout's non-blocking-forever path
        assert_eq!(s.consecutive_idle, 3);
    }
}
