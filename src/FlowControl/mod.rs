//! Sender-side flow control: how far a publication is allowed to advance
//! given what its receivers have acknowledged via status messages.
//! Unicast tracks exactly one receiver; multicast tracks the whole group
//! and advances only as fast as the slowest live member.
//!
//! Unicast and multicast share one trait object seam, the same style
//! `Core::SharedMemory::SharedMemoryBackend` uses to swap backends.

mod multicast_min;
mod unicast;

pub use multicast_min::MulticastMinFlowControl;
pub use unicast::UnicastFlowControl;

/// A receiver's status message, as needed by flow control decisions.
#[derive(Debug, Clone, Copy)]
pub struct StatusMessage {
    pub receiver_id: i64,
    pub consumption_term_id: i32,
    pub consumption_term_offset: i32,
    pub receiver_window: i32,
    pub trigger_setup: bool,
}

pub trait FlowControl: Send {
    /// Fold in a status message from a receiver, returning the new
    /// sender position limit (the position the sender is now allowed to
    /// advance up to). The result is always clamped to
    /// `sender_position + term_window_length`, so a receiver's advertised
    /// window can never push the limit further ahead than the term buffer
    /// itself can hold.
    fn on_status_message(
        &mut self,
        message: &StatusMessage,
        position_bits_to_shift: i32,
        initial_term_id: i32,
        sender_position: i64,
        term_window_length: i64,
        now_ns: i64,
    ) -> i64;

    /// Periodic tick so flow control can evict receivers that have not
    /// been heard from within the group's timeout. Returns the (possibly
    /// unchanged) position limit.
    fn on_idle(&mut self, now_ns: i64, current_limit: i64) -> i64;

    /// Whether a receiver's status message asked for an immediate SETUP
    /// retransmission (it has not yet seen stream geometry).
    fn should_trigger_setup(&mut self) -> bool;

    /// The initial position limit a freshly-created publication should
    /// start with, before any status message has been received.
    fn initial_position_limit(&self, snd_pos: i64, term_window_length: i64) -> i64 {
        snd_pos + term_window_length
    }
}
