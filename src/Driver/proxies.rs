//! Thin wrappers that turn "send this command/event" into the right ring
//! buffer or broadcast transmitter call. The conductor notifies the
//! sender/receiver agents of new work by registration id over
//! one-to-one ring buffers (the actual publication/image objects live in
//! the shared `Registry`, so only the id needs to cross); the conductor
//! notifies clients of completed operations and stream events over the
//! broadcast transmitter, since many clients may be listening.

use crate::Concurrent::{OneToOneRingBuffer, RingBuffer};
use crate::Concurrent::BroadcastTransmitter;
use crate::Driver::commands::{
    AvailableImageEvent, ErrorEvent, OperationSuccessEvent, PublicationReadyEvent, SubscriptionReadyEvent,
    UnavailableImageEvent, ON_AVAILABLE_IMAGE, ON_ERROR, ON_OPERATION_SUCCESS, ON_PUBLICATION_READY,
    ON_SUBSCRIPTION_READY, ON_UNAVAILABLE_IMAGE,
};
use crate::Registry::RegistrationId;

pub const NEW_NETWORK_PUBLICATION: i32 = 1;
pub const REMOVE_NETWORK_PUBLICATION: i32 = 2;
pub const NEW_RECEIVE_CHANNEL: i32 = 3;
pub const REMOVE_RECEIVE_CHANNEL: i32 = 4;

pub const IMAGE_AVAILABLE: i32 = 1;
pub const IMAGE_UNAVAILABLE: i32 = 2;

/// Conductor's handle for telling the sender agent about new or removed
/// network publications.
pub struct SenderProxy<'a> {
    command_ring: &'a OneToOneRingBuffer,
}

impl<'a> SenderProxy<'a> {
    pub fn new(command_ring: &'a OneToOneRingBuffer) -> Self {
        Self { command_ring }
    }

    pub fn new_network_publication(&self, registration_id: RegistrationId) -> bool {
        self.command_ring
            .write(NEW_NETWORK_PUBLICATION, &registration_id.value().to_le_bytes())
    }

    pub fn remove_network_publication(&self, registration_id: RegistrationId) -> bool {
        self.command_ring
            .write(REMOVE_NETWORK_PUBLICATION, &registration_id.value().to_le_bytes())
    }
}

/// Conductor's handle for telling the receiver agent about new or
/// removed receive channels (subscriptions).
pub struct ReceiverProxy<'a> {
    command_ring: &'a OneToOneRingBuffer,
}

impl<'a> ReceiverProxy<'a> {
    pub fn new(command_ring: &'a OneToOneRingBuffer) -> Self {
        Self { command_ring }
    }

    pub fn new_receive_channel(&self, registration_id: RegistrationId) -> bool {
        self.command_ring
            .write(NEW_RECEIVE_CHANNEL, &registration_id.value().to_le_bytes())
    }

    pub fn remove_receive_channel(&self, registration_id: RegistrationId) -> bool {
        self.command_ring
            .write(REMOVE_RECEIVE_CHANNEL, &registration_id.value().to_le_bytes())
    }
}

/// Receiver's handle for telling the conductor about images it has
/// created or torn down, so the conductor -- the only agent that talks to
/// clients -- can broadcast the corresponding event and, for teardown,
/// start the log buffer's linger-then-delete timer.
pub struct ReceiverEventsProxy<'a> {
    event_ring: &'a OneToOneRingBuffer,
}

impl<'a> ReceiverEventsProxy<'a> {
    pub fn new(event_ring: &'a OneToOneRingBuffer) -> Self {
        Self { event_ring }
    }

    pub fn image_available(&self, registration_id: RegistrationId) -> bool {
        self.event_ring.write(IMAGE_AVAILABLE, &registration_id.value().to_le_bytes())
    }

    pub fn image_unavailable(&self, registration_id: RegistrationId) -> bool {
        self.event_ring.write(IMAGE_UNAVAILABLE, &registration_id.value().to_le_bytes())
    }
}

/// Conductor's handle for broadcasting responses and stream events to
/// every attached client.
pub struct ClientProxy<'a> {
    event_broadcast: &'a BroadcastTransmitter,
}

impl<'a> ClientProxy<'a> {
    pub fn new(event_broadcast: &'a BroadcastTransmitter) -> Self {
        Self { event_broadcast }
    }

    pub fn on_publication_ready(&self, event: &PublicationReadyEvent) {
        self.event_broadcast.transmit(ON_PUBLICATION_READY, &event.encode());
    }

    pub fn on_subscription_ready(&self, event: &SubscriptionReadyEvent) {
        self.event_broadcast.transmit(ON_SUBSCRIPTION_READY, &event.encode());
    }

    pub fn on_operation_success(&self, event: &OperationSuccessEvent) {
        self.event_broadcast.transmit(ON_OPERATION_SUCCESS, &event.encode());
    }

    pub fn on_error(&self, event: &ErrorEvent) {
        self.event_broadcast.transmit(ON_ERROR, &event.encode());
    }

    pub fn on_available_image(&self, event: &AvailableImageEvent) {
        self.event_broadcast.transmit(ON_AVAILABLE_IMAGE, &event.encode());
    }

    pub fn on_unavailable_image(&self, event: &UnavailableImageEvent) {
        self.event_broadcast.transmit(ON_UNAVAILABLE_IMAGE, &event.encode());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(capacity: usize) -> (Vec<u8>, OneToOneRingBuffer) {
        let mut mem = vec![0u8; OneToOneRingBuffer::buffer_length(capacity)];
        let rb = unsafe { OneToOneRingBuffer::new(mem.as_mut_ptr(), capacity) };
        (mem, rb)
    }

    #[test]
    fn sender_proxy_enqueues_a_command_the_ring_can_read_back() {
        let (_mem, rb) = ring(256);
        let proxy = SenderProxy::new(&rb);
        let generator = crate::Registry::RegistrationIdGenerator::default();
        let id = generator.next();
        assert!(proxy.new_network_publication(id));

        let mut seen = None;
        rb.read(|msg_type, payload| {
            seen = Some((msg_type, i64::from_le_bytes(payload.try_into().unwrap())));
        }, 1);
        assert_eq!(seen, Some((NEW_NETWORK_PUBLICATION, id.value())));
    }
}
