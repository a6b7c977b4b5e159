//! The default congestion control strategy: a fixed window, sized once at
//! construction from the stream's configured initial window, never
//! adapted. Matches unicast streams over a well-provisioned network where
//! adaptive congestion control buys nothing but complexity.

use crate::CongestionControl::CongestionControl;

pub struct StaticWindowCongestionControl {
    window_length: i32,
}

impl StaticWindowCongestionControl {
    pub fn new(window_length: i32) -> Self {
        Self { window_length }
    }
}

impl CongestionControl for StaticWindowCongestionControl {
    fn window_length(&self) -> i32 {
        self.window_length
    }

    fn on_rttm(&mut self, _rtt_ns: i64, _now_ns: i64) {}

    fn on_loss(&mut self, _now_ns: i64) {}

    fn on_idle(&mut self, _now_ns: i64) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_never_changes() {
        let mut cc = StaticWindowCongestionControl::new(65536);
        cc.on_rttm(1_000_000, 0);
        cc.on_loss(0);
        cc.on_idle(1_000_000);
        assert_eq!(cc.window_length(), 65536);
    }
}
