//! The three cooperating agents -- conductor, sender, receiver -- and the
//! shared, registration-id-indexed state they coordinate through instead
//! of passing complex objects across thread boundaries.

pub mod agent;
pub mod cnc;
pub mod commands;
pub mod conductor;
pub mod directory;
pub mod idle_strategy;
pub mod proxies;
pub mod receiver;
pub mod runner;
pub mod sender;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::CongestionControl::CongestionControl;
use crate::Core::counters::Counter;
use crate::FlowControl::FlowControl;
use crate::LogBuffer::LogBuffers;
use crate::LossDetection::{LossDetector, RetransmitHandler};
use crate::Registry::{Registry, RegistrationIdGenerator};
use crate::Transport::destination_tracker::DestinationTracker;
use crate::Transport::udp_channel::UdpChannel;

/// Everything the conductor has created on behalf of a client's publish
/// call. Sender-agent-owned fields (flow control, retransmit handler)
/// are guarded individually since only the sender thread touches them,
/// but the registry itself may be read by the conductor (for stats) and
/// written by the sender (for eviction on client timeout).
pub struct NetworkPublication {
    pub client_id: i64,
    pub session_id: i32,
    pub stream_id: i32,
    pub channel: UdpChannel,
    pub log_buffers: Arc<LogBuffers>,
    pub position_limit_counter: Counter,
    pub destinations: Mutex<DestinationTracker>,
    pub flow_control: Mutex<Box<dyn FlowControl>>,
    pub retransmit_handler: Mutex<RetransmitHandler>,
    pub snd_pos: AtomicI64,
    pub last_activity_ns: AtomicI64,
}

/// A subscription's standing interest in a channel/stream, independent
/// of whether any publisher has shown up yet. Once the receiver agent
/// sees the first frame for a new session on this interest, it creates
/// a [`PublicationImage`] and registers it in the shared image table.
pub struct SubscriptionInterest {
    pub client_id: i64,
    pub stream_id: i32,
    pub channel: UdpChannel,
}

/// The receiver-agent-owned state for one inbound stream from one
/// publisher.
pub struct PublicationImage {
    pub subscriber_registration_id: i64,
    pub session_id: i32,
    pub stream_id: i32,
    pub source: SocketAddr,
    pub log_buffers: Arc<LogBuffers>,
    pub congestion_control: Mutex<Box<dyn CongestionControl>>,
    pub loss_detector: Mutex<LossDetector>,
    pub initial_term_id: i32,
    pub position_bits_to_shift: i32,
    pub rcv_hwm: AtomicI64,
    pub last_activity_ns: AtomicI64,
    /// When the last status message was sent for this image; `0` until
    /// the first one goes out, which is also how the receiver agent
    /// knows to set `trigger_setup` on that first status message.
    pub last_sm_ns: AtomicI64,
    pub receiver_id: i64,
    pub session_counter: AtomicI32,
}

impl PublicationImage {
    pub fn touch(&self, now_ns: i64) {
        self.last_activity_ns.store(now_ns, Ordering::Relaxed);
    }
}

impl NetworkPublication {
    pub fn touch(&self, now_ns: i64) {
        self.last_activity_ns.store(now_ns, Ordering::Relaxed);
    }
}

/// The tables every agent shares, indexed by registration id for
/// publications/subscriptions/images and by raw `(session_id,
/// stream_id)` lookups are layered on top inside the sender/receiver
/// that actually need them.
#[derive(Default)]
pub struct SharedState {
    pub publications: Registry<Arc<NetworkPublication>>,
    pub subscriptions: Registry<Arc<SubscriptionInterest>>,
    pub images: Registry<Arc<PublicationImage>>,
    /// Shared across every table above: registration ids are globally
    /// unique, not merely unique within one table, so a client can never
    /// confuse a publication id with an image id.
    pub registration_ids: RegistrationIdGenerator,
}

/// Current wall-clock time in nanoseconds, the clock every agent's duty
/// cycle and every timeout computation in this driver is expressed
/// against.
pub fn now_ns() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}
