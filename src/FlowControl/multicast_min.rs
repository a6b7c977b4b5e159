//! Multicast flow control: the position limit is the minimum across every
//! live receiver's reported position plus window, so the sender never
//! outruns the slowest member of the group. A receiver not heard from
//! within `receiver_timeout_ns` is dropped from the group and stops
//! holding the limit back.
//!
//! Tracks live receivers in a `Mutex`-guarded linear table of fixed-size
//! entries, the same shape `Core::counters` uses for its own table.

use std::collections::HashMap;

use crate::FlowControl::{FlowControl, StatusMessage};
use crate::LogBuffer::position::compute_position;

const DEFAULT_RECEIVER_TIMEOUT_NS: i64 = 5_000_000_000;

struct Receiver {
    position: i64,
    last_heard_ns: i64,
}

pub struct MulticastMinFlowControl {
    receivers: HashMap<i64, Receiver>,
    receiver_timeout_ns: i64,
    trigger_setup: bool,
}

impl MulticastMinFlowControl {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_RECEIVER_TIMEOUT_NS)
    }

    pub fn with_timeout(receiver_timeout_ns: i64) -> Self {
        Self {
            receivers: HashMap::new(),
            receiver_timeout_ns,
            trigger_setup: false,
        }
    }

    fn min_position(&self, fallback: i64) -> i64 {
        self.receivers
            .values()
            .map(|r| r.position)
            .min()
            .unwrap_or(fallback)
    }
}

impl Default for MulticastMinFlowControl {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowControl for MulticastMinFlowControl {
    fn on_status_message(
        &mut self,
        message: &StatusMessage,
        position_bits_to_shift: i32,
        initial_term_id: i32,
        sender_position: i64,
        term_window_length: i64,
        now_ns: i64,
    ) -> i64 {
        let consumption_position = compute_position(
            message.consumption_term_id,
            message.consumption_term_offset,
            position_bits_to_shift,
            initial_term_id,
        );
        let window_limit = consumption_position + message.receiver_window as i64;

        self.receivers.insert(
            message.receiver_id,
            Receiver {
                position: window_limit,
                last_heard_ns: now_ns,
            },
        );

        if message.trigger_setup {
            self.trigger_setup = true;
        }

        self.min_position(window_limit).min(sender_position + term_window_length)
    }

    fn on_idle(&mut self, now_ns: i64, current_limit: i64) -> i64 {
        self.receivers
            .retain(|_, r| now_ns - r.last_heard_ns <= self.receiver_timeout_ns);
        self.min_position(current_limit)
    }

    fn should_trigger_setup(&mut self) -> bool {
        std::mem::replace(&mut self.trigger_setup, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sm(receiver_id: i64, term_offset: i32, window: i32) -> StatusMessage {
        StatusMessage {
            receiver_id,
            consumption_term_id: 0,
            consumption_term_offset: term_offset,
            receiver_window: window,
            trigger_setup: false,
        }
    }

    #[test]
    fn limit_tracks_the_slowest_receiver() {
        let mut fc = MulticastMinFlowControl::new();
        let fast_limit = fc.on_status_message(&sm(1, 8192, 65536), 16, 0, 0, i64::MAX, 0);
        assert_eq!(fast_limit, 8192 + 65536);

        let group_limit = fc.on_status_message(&sm(2, 1024, 65536), 16, 0, 0, i64::MAX, 0);
        assert_eq!(group_limit, 1024 + 65536);

        // The fast receiver reporting again does not move the limit past
        // the still-slow one.
        let still_limited = fc.on_status_message(&sm(1, 16384, 65536), 16, 0, 0, i64::MAX, 100);
        assert_eq!(still_limited, 1024 + 65536);
    }

    #[test]
    fn limit_is_clamped_to_the_term_window_ahead_of_the_sender() {
        let mut fc = MulticastMinFlowControl::new();
        let limit = fc.on_status_message(&sm(1, 8192, 65536), 16, 0, 2000, 4096, 0);
        assert_eq!(limit, 2000 + 4096);
    }

    #[test]
    fn timed_out_receiver_stops_holding_back_the_group() {
        let mut fc = MulticastMinFlowControl::with_timeout(1_000);
        fc.on_status_message(&sm(1, 0, 1024), 16, 0, 0, i64::MAX, 0);
        fc.on_status_message(&sm(2, 9000, 1024), 16, 0, 0, i64::MAX, 0);

        let limit_while_both_alive = fc.on_idle(500, i64::MAX);
        assert_eq!(limit_while_both_alive, 0 + 1024);

        let limit_after_timeout = fc.on_idle(2_000, i64::MAX);
        assert_eq!(limit_after_timeout, 9000 + 1024);
    }
}
