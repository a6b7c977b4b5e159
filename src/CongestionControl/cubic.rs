//! A CUBIC-like congestion window, for multicast-min and other streams
//! where an adaptive receiver window pays for itself: grow the window
//! along a cubic curve from the last congestion event, and on loss drop
//! to `beta` of the window size at that event.
//!
//! The `C`/`BETA` constants match the values commonly used for TCP CUBIC
//! congestion windows.

use crate::CongestionControl::CongestionControl;

const CUBIC_C: f64 = 0.4;
const BETA: f64 = 0.7;

pub struct CubicCongestionControl {
    min_window: i32,
    max_window: i32,
    window_length: f64,
    w_max: f64,
    k: f64,
    last_congestion_ns: i64,
}

impl CubicCongestionControl {
    pub fn new(initial_window: i32, min_window: i32, max_window: i32) -> Self {
        let initial = initial_window as f64;
        Self {
            min_window,
            max_window,
            window_length: initial,
            w_max: initial,
            k: 0.0,
            last_congestion_ns: 0,
        }
    }

    fn recompute_k(&mut self) {
        let target = (self.w_max * (1.0 - BETA)) / CUBIC_C;
        self.k = target.max(0.0).cbrt();
    }
}

impl CongestionControl for CubicCongestionControl {
    fn window_length(&self) -> i32 {
        self.window_length.round().clamp(self.min_window as f64, self.max_window as f64) as i32
    }

    fn on_rttm(&mut self, _rtt_ns: i64, _now_ns: i64) {}

    fn on_loss(&mut self, now_ns: i64) {
        self.w_max = self.window_length;
        self.window_length = (self.window_length * BETA).max(self.min_window as f64);
        self.last_congestion_ns = now_ns;
        self.recompute_k();
    }

    fn on_idle(&mut self, now_ns: i64) {
        let elapsed_s = (now_ns - self.last_congestion_ns).max(0) as f64 / 1_000_000_000.0;
        let t = elapsed_s - self.k;
        let grown = CUBIC_C * t.powi(3) + self.w_max;
        self.window_length = grown.clamp(self.min_window as f64, self.max_window as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_shrinks_to_beta_fraction_on_loss() {
        let mut cc = CubicCongestionControl::new(100_000, 1_000, 1_000_000);
        cc.on_loss(0);
        assert_eq!(cc.window_length(), (100_000.0 * BETA).round() as i32);
    }

    #[test]
    fn window_grows_back_towards_w_max_over_time() {
        let mut cc = CubicCongestionControl::new(100_000, 1_000, 1_000_000);
        cc.on_loss(0);
        let just_after_loss = cc.window_length();
        cc.on_idle(2 * 1_000_000_000);
        assert!(cc.window_length() >= just_after_loss);
    }

    #[test]
    fn window_never_exceeds_configured_maximum() {
        let mut cc = CubicCongestionControl::new(100_000, 1_000, 150_000);
        cc.on_idle(1_000_000_000_000);
        assert!(cc.window_length() <= 150_000);
    }
}
