//! Receiver-side congestion control: how large a receiver's advertised
//! window (the `receiver_window` field of a status message) should be.
//! Unlike flow control, which is the sender folding receiver feedback in,
//! congestion control is the receiver deciding what to advertise in the
//! first place.

mod cubic;
mod static_window;

pub use cubic::CubicCongestionControl;
pub use static_window::StaticWindowCongestionControl;

pub trait CongestionControl: Send {
    /// Current window length to advertise, in bytes.
    fn window_length(&self) -> i32;

    /// A round-trip-time measurement arrived (from an RTTM frame
    /// exchange). `rtt_ns` is the measured round trip.
    fn on_rttm(&mut self, rtt_ns: i64, now_ns: i64);

    /// A loss was detected (a NAK was sent). Congestion-reactive
    /// implementations shrink their window here.
    fn on_loss(&mut self, now_ns: i64);

    /// Periodic tick, called once per receiver agent duty cycle, so
    /// time-based window growth can proceed even without new RTT samples.
    fn on_idle(&mut self, now_ns: i64);
}
