//! Single-receiver flow control: the position limit simply tracks that
//! one receiver's reported consumption position plus its advertised
//! window.

use crate::FlowControl::{FlowControl, StatusMessage};
use crate::LogBuffer::position::compute_position;

pub struct UnicastFlowControl {
    last_limit: i64,
    trigger_setup: bool,
}

impl Default for UnicastFlowControl {
    fn default() -> Self {
        Self {
            last_limit: i64::MAX,
            trigger_setup: false,
        }
    }
}

impl UnicastFlowControl {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlowControl for UnicastFlowControl {
    fn on_status_message(
        &mut self,
        message: &StatusMessage,
        position_bits_to_shift: i32,
        initial_term_id: i32,
        sender_position: i64,
        term_window_length: i64,
        _now_ns: i64,
    ) -> i64 {
        let consumption_position = compute_position(
            message.consumption_term_id,
            message.consumption_term_offset,
            position_bits_to_shift,
            initial_term_id,
        );
        let receiver_limit = consumption_position + message.receiver_window as i64;
        let limit = receiver_limit.min(sender_position + term_window_length);
        if message.trigger_setup {
            self.trigger_setup = true;
        }
        self.last_limit = limit;
        limit
    }

    fn on_idle(&mut self, _now_ns: i64, current_limit: i64) -> i64 {
        current_limit
    }

    fn should_trigger_setup(&mut self) -> bool {
        std::mem::replace(&mut self.trigger_setup, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_tracks_the_single_receivers_window() {
        let mut fc = UnicastFlowControl::new();
        let sm = StatusMessage {
            receiver_id: 1,
            consumption_term_id: 0,
            consumption_term_offset: 4096,
            receiver_window: 65536,
            trigger_setup: false,
        };
        let limit = fc.on_status_message(&sm, 16, 0, 0, i64::MAX, 0);
        assert_eq!(limit, 4096 + 65536);
    }

    #[test]
    fn limit_is_clamped_to_the_term_window_ahead_of_the_sender() {
        let mut fc = UnicastFlowControl::new();
        let sm = StatusMessage {
            receiver_id: 1,
            consumption_term_id: 0,
            consumption_term_offset: 0,
            receiver_window: 65536,
            trigger_setup: false,
        };
        let limit = fc.on_status_message(&sm, 16, 0, 1000, 4096, 0);
        assert_eq!(limit, 1000 + 4096);
    }

    #[test]
    fn trigger_setup_flag_is_consumed_once() {
        let mut fc = UnicastFlowControl::new();
        let sm = StatusMessage {
            receiver_id: 1,
            consumption_term_id: 0,
            consumption_term_offset: 0,
            receiver_window: 1024,
            trigger_setup: true,
        };
        fc.on_status_message(&sm, 16, 0, 0, i64::MAX, 0);
        assert!(fc.should_trigger_setup());
        assert!(!fc.should_trigger_setup());
    }
}
