//! Lock-free structures that are the driver's only permitted inter-thread
//! and inter-process communication primitives: the SPSC/MPSC ring buffers
//! used for the client command ring and the agent proxy queues, and the
//! broadcast transmitter used for the events-to-clients ring.

pub mod broadcast;
pub mod ring_buffer;

pub use broadcast::{BroadcastReceiver, BroadcastTransmitter};
pub use ring_buffer::{ManyToOneRingBuffer, OneToOneRingBuffer, RingBuffer};
