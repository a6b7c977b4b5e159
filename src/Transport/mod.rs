//! UDP transport: channel URIs, socket setup, the epoll-based poller the
//! sender and receiver agents drive their duty cycle from, channel
//! endpoints, per-destination tracking for multi-destination unicast, and
//! the data packet dispatcher that demultiplexes inbound frames to
//! images.
//!
//! Socket setup and polling go straight to `socket2` and raw `epoll`
//! rather than through an async runtime.

pub mod destination_tracker;
pub mod dispatcher;
pub mod receive_channel_endpoint;
pub mod send_channel_endpoint;
pub mod transport_poller;
pub mod udp_channel;
pub mod udp_transport;
pub mod wire;

pub use udp_channel::UdpChannel;
pub use udp_transport::UdpTransport;
