//! The only agent that talks to clients. Owns the to-driver command ring
//! and the to-clients event broadcast, creates and tears down
//! publications and subscriptions on a client's behalf, and is the sole
//! writer of [`AvailableImageEvent`]/[`UnavailableImageEvent`] -- the
//! sender and receiver agents do their own network I/O but defer every
//! client-visible decision back here.
//!
//! Every client-visible decision funnels through this one agent, the same
//! single-writer discipline the counters manager uses for its own
//! `Mutex`-guarded allocation path, just scaled up to a whole agent instead
//! of one table.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicI64;
use std::sync::Arc;

use crate::config::{FlowControlStrategy, MediaDriverConfig};
use crate::Driver::agent::Agent;
use crate::Driver::commands::{
    AddPublicationCommand, AddSubscriptionCommand, AvailableImageEvent, ClientKeepaliveCommand, ErrorEvent,
    OperationSuccessEvent, PublicationReadyEvent, RemovePublicationCommand, RemoveSubscriptionCommand,
    SubscriptionReadyEvent, UnavailableImageEvent, ADD_PUBLICATION, ADD_SUBSCRIPTION, CLIENT_KEEPALIVE,
    REMOVE_PUBLICATION, REMOVE_SUBSCRIPTION,
};
use crate::Driver::directory::DriverDirectory;
use crate::Driver::now_ns;
use crate::Driver::proxies::{ClientProxy, ReceiverProxy, SenderProxy, IMAGE_AVAILABLE, IMAGE_UNAVAILABLE};
use crate::Driver::{NetworkPublication, SharedState, SubscriptionInterest};
use crate::FlowControl::{FlowControl, MulticastMinFlowControl, UnicastFlowControl};
use crate::LogBuffer::descriptor::unpack_term_offset;
use crate::LogBuffer::frame_descriptor::{FrameType, FrameWriter, UNFRAGMENTED};
use crate::LogBuffer::position::{compute_term_id, compute_term_offset, index_by_term, position_bits_to_shift};
use crate::LogBuffer::term_scanner::scan_for_availability;
use crate::LogBuffer::term_unblocker::unblock;
use crate::LogBuffer::LogBuffers;
use crate::LossDetection::RetransmitHandler;
use crate::Registry::RegistrationId;
use crate::Transport::destination_tracker::DestinationTracker;
use crate::Transport::udp_channel::UdpChannel;

const ERROR_INVALID_CHANNEL_URI: i32 = 1;
const ERROR_UNKNOWN_REGISTRATION: i32 = 2;
const ERROR_RESOURCE_EXHAUSTED: i32 = 3;
const ERROR_IO: i32 = 4;

const DEFAULT_PAGE_SIZE: i32 = 4096;

/// How many commands/events the conductor will drain from a single ring
/// in one `do_work` call before yielding back to the idle strategy.
const COMMANDS_PER_WORK_CYCLE: usize = 64;

pub struct DriverConductor {
    directory: Arc<DriverDirectory>,
    config: MediaDriverConfig,
    state: Arc<SharedState>,
    /// Last time each client was heard from, by client id. Conductor-local:
    /// no other agent reads or writes this.
    clients: HashMap<i64, i64>,
    /// Log buffer files waiting out their linger period before deletion.
    pending_deletes: Vec<(i64, PathBuf)>,
    /// Per-publication `(stuck_term_offset, first_observed_ns)`, tracked so
    /// the unblocker only fires once a publication has truly stopped
    /// advancing, not on every tick it happens to be behind its limit.
    stalled: HashMap<RegistrationId, (i32, i64)>,
}

impl DriverConductor {
    pub fn new(directory: Arc<DriverDirectory>, config: MediaDriverConfig, state: Arc<SharedState>) -> Self {
        Self {
            directory,
            config,
            state,
            clients: HashMap::new(),
            pending_deletes: Vec::new(),
            stalled: HashMap::new(),
        }
    }

    fn client_proxy(&self) -> ClientProxy<'_> {
        ClientProxy::new(self.directory.to_clients_events())
    }

    fn touch_client(&mut self, client_id: i64) {
        self.clients.insert(client_id, now_ns());
    }

    fn send_error(&self, correlation_id: i64, error_code: i32, message: &str) {
        self.directory.record_error(error_code, "conductor", message);
        self.client_proxy().on_error(&ErrorEvent { correlation_id, error_code, message: message.to_string() });
    }

    fn dispatch_command(&mut self, msg_type: i32, payload: &[u8]) {
        match msg_type {
            ADD_PUBLICATION => match AddPublicationCommand::decode(payload) {
                Some(cmd) => self.handle_add_publication(cmd),
                None => tracing::warn!("malformed ADD_PUBLICATION payload"),
            },
            REMOVE_PUBLICATION => match RemovePublicationCommand::decode(payload) {
                Some(cmd) => self.handle_remove_publication(cmd),
                None => tracing::warn!("malformed REMOVE_PUBLICATION payload"),
            },
            ADD_SUBSCRIPTION => match AddSubscriptionCommand::decode(payload) {
                Some(cmd) => self.handle_add_subscription(cmd),
                None => tracing::warn!("malformed ADD_SUBSCRIPTION payload"),
            },
            REMOVE_SUBSCRIPTION => match RemoveSubscriptionCommand::decode(payload) {
                Some(cmd) => self.handle_remove_subscription(cmd),
                None => tracing::warn!("malformed REMOVE_SUBSCRIPTION payload"),
            },
            CLIENT_KEEPALIVE => match ClientKeepaliveCommand::decode(payload) {
                Some(cmd) => self.touch_client(cmd.client_id),
                None => tracing::warn!("malformed CLIENT_KEEPALIVE payload"),
            },
            other => tracing::warn!(msg_type = other, "unknown client command"),
        }
    }

    fn handle_add_publication(&mut self, cmd: AddPublicationCommand) {
        let channel = match UdpChannel::parse(&cmd.channel) {
            Ok(channel) => channel,
            Err(err) => {
                return self.send_error(cmd.correlation_id, ERROR_INVALID_CHANNEL_URI, &err.to_string());
            }
        };

        let registration_id = self.state.registration_ids.next();
        let session_id = fastrand::i32(..);
        let initial_term_id = fastrand::i32(..);
        let log_path = self.config.logbuffer_path(registration_id.value());

        let log_buffers = match LogBuffers::create(&log_path, self.config.term_length as usize) {
            Ok(log_buffers) => Arc::new(log_buffers),
            Err(err) => {
                return self.send_error(cmd.correlation_id, ERROR_IO, &err.to_string());
            }
        };

        let metadata = log_buffers.metadata();
        metadata.set_initial_term_id(initial_term_id);
        metadata.set_active_term_count_ordered(0);
        metadata.set_mtu_length(self.config.mtu_length);
        metadata.set_page_size(DEFAULT_PAGE_SIZE);
        metadata.set_correlation_id(registration_id.value());
        metadata.set_connected(true);
        FrameWriter::new(metadata.default_frame_header_mut()).set_header(
            FrameType::Data,
            UNFRAGMENTED,
            0,
            session_id,
            cmd.stream_id,
            initial_term_id,
            0,
        );

        let position_limit_counter =
            match self.directory.counters().allocate(1, "pub-pos-limit", &registration_id.value().to_le_bytes()) {
                Some(counter) => counter,
                None => {
                    return self.send_error(cmd.correlation_id, ERROR_RESOURCE_EXHAUSTED, "counters table is full");
                }
            };
        let position_limit_counter_id = position_limit_counter.id();

        let flow_control: Box<dyn FlowControl> = match self.config.flow_control_strategy {
            FlowControlStrategy::UnicastMax => Box::new(UnicastFlowControl::new()),
            FlowControlStrategy::MulticastMin | FlowControlStrategy::MulticastMinGroup => {
                Box::new(MulticastMinFlowControl::new())
            }
        };

        let endpoint = channel.endpoint;
        let publication = Arc::new(NetworkPublication {
            client_id: cmd.client_id,
            session_id,
            stream_id: cmd.stream_id,
            channel,
            log_buffers,
            position_limit_counter,
            destinations: parking_lot::Mutex::new(DestinationTracker::new(endpoint)),
            flow_control: parking_lot::Mutex::new(flow_control),
            retransmit_handler: parking_lot::Mutex::new(RetransmitHandler::new(
                self.config.retransmit_unicast_delay_ns(),
                self.config.retransmit_unicast_linger_ns(),
                self.config.retransmit_max_concurrent,
            )),
            snd_pos: AtomicI64::new(0),
            last_activity_ns: AtomicI64::new(now_ns()),
        });

        self.state.publications.insert(registration_id, publication);
        self.touch_client(cmd.client_id);

        SenderProxy::new(self.directory.sender_commands()).new_network_publication(registration_id);

        self.client_proxy().on_publication_ready(&PublicationReadyEvent {
            correlation_id: cmd.correlation_id,
            registration_id: registration_id.value(),
            session_id,
            stream_id: cmd.stream_id,
            position_limit_counter_id,
            log_file_path: log_path.display().to_string(),
        });
    }

    fn handle_remove_publication(&mut self, cmd: RemovePublicationCommand) {
        let id = RegistrationId::from_raw(cmd.registration_id);
        match self.state.publications.remove(id) {
            Some(publication) => {
                SenderProxy::new(self.directory.sender_commands()).remove_network_publication(id);
                self.directory.counters().free(publication.position_limit_counter);
                self.schedule_linger_delete(self.config.logbuffer_path(id.value()));
                self.client_proxy().on_operation_success(&OperationSuccessEvent { correlation_id: cmd.correlation_id });
            }
            None => self.send_error(
                cmd.correlation_id,
                ERROR_UNKNOWN_REGISTRATION,
                &format!("unknown publication registration id {id}"),
            ),
        }
    }

    fn handle_add_subscription(&mut self, cmd: AddSubscriptionCommand) {
        let channel = match UdpChannel::parse(&cmd.channel) {
            Ok(channel) => channel,
            Err(err) => {
                return self.send_error(cmd.correlation_id, ERROR_INVALID_CHANNEL_URI, &err.to_string());
            }
        };

        let registration_id = self.state.registration_ids.next();
        let interest = Arc::new(SubscriptionInterest { client_id: cmd.client_id, stream_id: cmd.stream_id, channel });
        self.state.subscriptions.insert(registration_id, interest);
        self.touch_client(cmd.client_id);

        ReceiverProxy::new(self.directory.receiver_commands()).new_receive_channel(registration_id);

        self.client_proxy().on_subscription_ready(&SubscriptionReadyEvent {
            correlation_id: cmd.correlation_id,
            registration_id: registration_id.value(),
        });
    }

    fn handle_remove_subscription(&mut self, cmd: RemoveSubscriptionCommand) {
        let id = RegistrationId::from_raw(cmd.registration_id);
        match self.state.subscriptions.remove(id) {
            Some(_) => {
                ReceiverProxy::new(self.directory.receiver_commands()).remove_receive_channel(id);
                self.drop_images_for_subscriber(id.value());
                self.client_proxy().on_operation_success(&OperationSuccessEvent { correlation_id: cmd.correlation_id });
            }
            None => self.send_error(
                cmd.correlation_id,
                ERROR_UNKNOWN_REGISTRATION,
                &format!("unknown subscription registration id {id}"),
            ),
        }
    }

    fn drop_images_for_subscriber(&self, subscriber_registration_id: i64) {
        let dead: Vec<RegistrationId> = self
            .state
            .images
            .ids()
            .into_iter()
            .filter(|id| {
                self.state
                    .images
                    .with(*id, |image| image.subscriber_registration_id == subscriber_registration_id)
                    .unwrap_or(false)
            })
            .collect();

        for id in dead {
            if let Some(image) = self.state.images.remove(id) {
                self.client_proxy().on_unavailable_image(&UnavailableImageEvent {
                    stream_id: image.stream_id,
                    session_id: image.session_id,
                    subscriber_registration_id: image.subscriber_registration_id,
                });
            }
        }
    }

    /// Drain image-lifecycle notifications the receiver agent posted since
    /// the conductor last looked, and turn each into the client-visible
    /// event. The receiver has already inserted an available image into
    /// the shared registry by the time it posts [`IMAGE_AVAILABLE`]; for
    /// [`IMAGE_UNAVAILABLE`] the conductor itself removes the registry
    /// entry, since the event carries only the id.
    fn drain_receiver_events(&self) {
        use crate::Concurrent::RingBuffer;

        let mut events: Vec<(i32, i64)> = Vec::new();
        self.directory.receiver_events().read(
            |msg_type, payload| {
                if let Ok(bytes) = payload.try_into() {
                    events.push((msg_type, i64::from_le_bytes(bytes)));
                }
            },
            COMMANDS_PER_WORK_CYCLE,
        );

        for (msg_type, registration_id) in events {
            let id = RegistrationId::from_raw(registration_id);
            match msg_type {
                IMAGE_AVAILABLE => self.announce_image_available(id),
                IMAGE_UNAVAILABLE => self.announce_image_unavailable(id),
                other => tracing::warn!(msg_type = other, "unknown receiver event"),
            }
        }
    }

    fn announce_image_available(&self, id: RegistrationId) {
        let event = self.state.images.with(id, |image| AvailableImageEvent {
            stream_id: image.stream_id,
            session_id: image.session_id,
            subscriber_registration_id: image.subscriber_registration_id,
            source_identity: image.source.to_string(),
            log_file_path: self.config.logbuffer_path(id.value()).display().to_string(),
        });
        if let Some(event) = event {
            self.client_proxy().on_available_image(&event);
        }
    }

    fn announce_image_unavailable(&self, id: RegistrationId) {
        if let Some(image) = self.state.images.remove(id) {
            self.client_proxy().on_unavailable_image(&UnavailableImageEvent {
                stream_id: image.stream_id,
                session_id: image.session_id,
                subscriber_registration_id: image.subscriber_registration_id,
            });
        }
    }

    fn schedule_linger_delete(&mut self, path: PathBuf) {
        self.pending_deletes.push((now_ns() + self.config.publication_linger_ns(), path));
    }

    fn process_linger_deletes(&mut self, now: i64) {
        let mut remaining = Vec::with_capacity(self.pending_deletes.len());
        for (at, path) in self.pending_deletes.drain(..) {
            if at <= now {
                if let Err(err) = std::fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %err, "failed to remove lingering log buffer");
                }
            } else {
                remaining.push((at, path));
            }
        }
        self.pending_deletes = remaining;
    }

    fn expire_timed_out_clients(&mut self, now: i64) {
        let timeout_ns = self.config.client_liveness_timeout_ns();
        let dead: Vec<i64> = self
            .clients
            .iter()
            .filter(|(_, &last_seen)| now - last_seen > timeout_ns)
            .map(|(&client_id, _)| client_id)
            .collect();

        for client_id in dead {
            self.clients.remove(&client_id);
            self.evict_client(client_id);
        }
    }

    fn evict_client(&mut self, client_id: i64) {
        let dead_publications: Vec<RegistrationId> = self
            .state
            .publications
            .ids()
            .into_iter()
            .filter(|id| self.state.publications.with(*id, |p| p.client_id == client_id).unwrap_or(false))
            .collect();
        for id in dead_publications {
            if self.state.publications.remove(id).is_some() {
                SenderProxy::new(self.directory.sender_commands()).remove_network_publication(id);
                self.schedule_linger_delete(self.config.logbuffer_path(id.value()));
            }
        }

        let dead_subscriptions: Vec<RegistrationId> = self
            .state
            .subscriptions
            .ids()
            .into_iter()
            .filter(|id| self.state.subscriptions.with(*id, |s| s.client_id == client_id).unwrap_or(false))
            .collect();
        for id in dead_subscriptions {
            if self.state.subscriptions.remove(id).is_some() {
                ReceiverProxy::new(self.directory.receiver_commands()).remove_receive_channel(id);
                self.drop_images_for_subscriber(id.value());
            }
        }

        tracing::info!(client_id, "evicted client after liveness timeout");
    }

    /// Patch a publication's term buffer if its send position has been
    /// stuck at the same offset long enough that the producer behind it
    /// has almost certainly died mid-claim rather than merely being slow.
    fn check_stalled_publications(&mut self, now: i64) {
        let ids = self.state.publications.ids();
        let mut still_stalled = HashMap::new();

        for id in ids {
            let Some(publication) = self.state.publications.with(id, |p| Arc::clone(p)) else { continue };
            let metadata = publication.log_buffers.metadata();
            let term_length = metadata.term_length();
            let shift = position_bits_to_shift(term_length);
            let initial_term_id = metadata.initial_term_id();
            let snd_pos = publication.snd_pos.load(std::sync::atomic::Ordering::Acquire);
            let term_offset = compute_term_offset(snd_pos, shift);
            let term_id = compute_term_id(snd_pos, shift, initial_term_id);
            let index = index_by_term(initial_term_id, term_id);

            // A producer claims space by advancing the raw tail before it
            // commits the frame there. If the tail hasn't moved past the
            // sender's current position, there's no outstanding claim to
            // patch -- the publication is simply idle, not stalled.
            let claimed_offset = unpack_term_offset(metadata.raw_tail_volatile(index));
            if claimed_offset <= term_offset {
                continue;
            }

            let term_buffer = publication.log_buffers.term(index);
            if scan_for_availability(term_buffer, term_offset, term_length - term_offset) > 0 {
                continue;
            }

            let first_seen = match self.stalled.get(&id) {
                Some(&(offset, first_seen)) if offset == term_offset => first_seen,
                _ => now,
            };

            if now - first_seen > self.config.publication_unblock_timeout_ns() {
                let term_buffer = publication.log_buffers.term_mut(index);
                let status = unblock(term_buffer, term_offset, term_length, term_id, publication.session_id, publication.stream_id);
                tracing::warn!(registration_id = %id, term_offset, status = ?status, "unblocked stalled publication");
            } else {
                still_stalled.insert(id, (term_offset, first_seen));
            }
        }

        self.stalled = still_stalled;
    }
}

impl Agent for DriverConductor {
    fn role_name(&self) -> &'static str {
        "conductor"
    }

    fn on_start(&mut self) {
        tracing::info!("conductor starting");
    }

    fn do_work(&mut self) -> std::io::Result<usize> {
        use crate::Concurrent::RingBuffer;

        let mut commands: Vec<(i32, Vec<u8>)> = Vec::new();
        self.directory.to_driver_commands().read(
            |msg_type, payload| commands.push((msg_type, payload.to_vec())),
            COMMANDS_PER_WORK_CYCLE,
        );
        let work = commands.len();
        for (msg_type, payload) in commands {
            self.dispatch_command(msg_type, &payload);
        }

        self.drain_receiver_events();

        let now = now_ns();
        self.process_linger_deletes(now);
        self.expire_timed_out_clients(now);
        self.check_stalled_publications(now);

        Ok(work)
    }

    fn on_close(&mut self) {
        tracing::info!("conductor stopping");
    }
}
