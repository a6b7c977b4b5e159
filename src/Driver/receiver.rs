//! Drives every subscription's inbound side: demultiplexes datagrams on
//! each receive channel endpoint by `(session_id, stream_id)`, creates a
//! [`PublicationImage`] the first time a new session is heard from,
//! copies DATA frames into its term buffer, and answers back with NAKs
//! (on a detected gap) and periodic status messages. Image teardown on
//! an explicit `REMOVE_SUBSCRIPTION` is handled entirely by the
//! conductor; this agent only evicts images that have gone quiet.
//!
//! Built on the same `Agent` duty-cycle shape as `sender.rs`, with
//! per-channel buffers in place of a shared scratch buffer since frames
//! are demultiplexed through a dispatcher callback
//! rather than read directly off the socket.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::CongestionControl::{CongestionControl, CubicCongestionControl, StaticWindowCongestionControl};
use crate::Driver::agent::Agent;
use crate::Driver::directory::DriverDirectory;
use crate::Driver::now_ns;
use crate::Driver::proxies::{ReceiverEventsProxy, NEW_RECEIVE_CHANNEL, REMOVE_RECEIVE_CHANNEL};
use crate::Driver::{PublicationImage, SharedState, SubscriptionInterest};
use crate::LogBuffer::frame_descriptor::{FrameType, FrameView, HEADER_LENGTH};
use crate::LogBuffer::position::{compute_term_id, compute_term_offset, index_by_term, position_bits_to_shift};
use crate::LogBuffer::term_gap_scanner::scan_for_gap;
use crate::LogBuffer::term_rebuilder::insert_frame;
use crate::LogBuffer::term_scanner::scan_for_availability;
use crate::LogBuffer::LogBuffers;
use crate::LossDetection::LossDetector;
use crate::Registry::RegistrationId;
use crate::Transport::dispatcher::FrameHandler;
use crate::Transport::receive_channel_endpoint::ReceiveChannelEndpoint;
use crate::Transport::wire::{NakFrame, SetupFrame, StatusMessageFrame};
use crate::config::{CongestionControlStrategy, MediaDriverConfig};

const COMMANDS_PER_WORK_CYCLE: usize = 64;
const SCRATCH_BUFFER_LEN: usize = 2048;
const DEFAULT_PAGE_SIZE: i32 = 4096;

/// A SETUP frame disagreeing with an already-created image's stream
/// geometry is a protocol error, not a resend to fold in.
const ERROR_SETUP_INITIAL_TERM_ID_MISMATCH: i32 = 10;

struct ReceiverChannel {
    endpoint: ReceiveChannelEndpoint,
    subscription: Arc<SubscriptionInterest>,
    inbound: Arc<Mutex<Vec<(Vec<u8>, SocketAddr)>>>,
    images: HashMap<(i32, i32), RegistrationId>,
    scratch: Vec<u8>,
}

pub struct ReceiverAgent {
    directory: Arc<DriverDirectory>,
    config: MediaDriverConfig,
    state: Arc<SharedState>,
    channels: HashMap<RegistrationId, ReceiverChannel>,
}

impl ReceiverAgent {
    pub fn new(directory: Arc<DriverDirectory>, config: MediaDriverConfig, state: Arc<SharedState>) -> Self {
        Self { directory, config, state, channels: HashMap::new() }
    }

    fn dispatch_command(&mut self, msg_type: i32, registration_id: i64) {
        let id = RegistrationId::from_raw(registration_id);
        match msg_type {
            NEW_RECEIVE_CHANNEL => self.handle_new_receive_channel(id),
            REMOVE_RECEIVE_CHANNEL => {
                self.channels.remove(&id);
            }
            other => tracing::warn!(msg_type = other, "unknown receiver command"),
        }
    }

    fn handle_new_receive_channel(&mut self, id: RegistrationId) {
        let Some(subscription) = self.state.subscriptions.with(id, |s| Arc::clone(s)) else {
            tracing::warn!(registration_id = %id, "receiver got NEW_RECEIVE_CHANNEL for unknown registration");
            return;
        };

        let rcvbuf = self.config.socket_rcvbuf;
        let sndbuf = self.config.socket_sndbuf;
        let mut endpoint = match ReceiveChannelEndpoint::new(&subscription.channel, rcvbuf, sndbuf) {
            Ok(endpoint) => endpoint,
            Err(err) => {
                tracing::warn!(registration_id = %id, error = %err, "failed to bind receive channel endpoint");
                return;
            }
        };

        let inbound = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&inbound);
        let handler: FrameHandler = Box::new(move |frame, from| {
            sink.lock().push((frame.to_vec(), from));
        });
        endpoint.dispatcher_mut().set_unknown_session_handler(handler);

        self.channels.insert(
            id,
            ReceiverChannel {
                endpoint,
                subscription,
                inbound,
                images: HashMap::new(),
                scratch: vec![0u8; SCRATCH_BUFFER_LEN],
            },
        );
    }
}

/// Create a new image for a session this subscription has not seen
/// before, register it in the shared table, and tell the conductor it's
/// available.
fn create_image(
    directory: &DriverDirectory,
    config: &MediaDriverConfig,
    state: &SharedState,
    subscriber_registration_id: i64,
    session_id: i32,
    stream_id: i32,
    source: SocketAddr,
    initial_term_id: i32,
) -> Option<(RegistrationId, Arc<PublicationImage>)> {
    let registration_id = state.registration_ids.next();
    let log_path = config.logbuffer_path(registration_id.value());

    let log_buffers = match LogBuffers::create(&log_path, config.term_length as usize) {
        Ok(log_buffers) => Arc::new(log_buffers),
        Err(err) => {
            tracing::warn!(error = %err, "failed to create log buffer for new image");
            return None;
        }
    };

    let metadata = log_buffers.metadata();
    metadata.set_initial_term_id(initial_term_id);
    metadata.set_active_term_count_ordered(0);
    metadata.set_mtu_length(config.mtu_length);
    metadata.set_page_size(DEFAULT_PAGE_SIZE);
    metadata.set_correlation_id(registration_id.value());
    metadata.set_connected(true);

    let congestion_control: Box<dyn CongestionControl> = match config.congestion_control_strategy {
        CongestionControlStrategy::Static => Box::new(StaticWindowCongestionControl::new(config.initial_window_length)),
        CongestionControlStrategy::Cubic => Box::new(CubicCongestionControl::new(
            config.initial_window_length,
            config.initial_window_length / 4,
            config.initial_window_length * 4,
        )),
    };

    let image = Arc::new(PublicationImage {
        subscriber_registration_id,
        session_id,
        stream_id,
        source,
        log_buffers,
        congestion_control: Mutex::new(congestion_control),
        loss_detector: Mutex::new(LossDetector::with_group_size(
            config.nak_unicast_delay_ns(),
            config.nak_multicast_max_backoff_ns(),
            config.nak_multicast_group_size,
        )),
        initial_term_id,
        position_bits_to_shift: position_bits_to_shift(config.term_length),
        rcv_hwm: AtomicI64::new(0),
        last_activity_ns: AtomicI64::new(now_ns()),
        last_sm_ns: AtomicI64::new(0),
        receiver_id: registration_id.value(),
        session_counter: AtomicI32::new(0),
    });

    state.images.insert(registration_id, Arc::clone(&image));
    ReceiverEventsProxy::new(directory.receiver_events()).image_available(registration_id);

    Some((registration_id, image))
}

/// Drain whatever frames the dispatcher has buffered for this channel
/// since the last duty cycle, creating images for new sessions and
/// writing DATA frames into the right image's term buffer.
fn process_channel(
    directory: &DriverDirectory,
    config: &MediaDriverConfig,
    state: &SharedState,
    channel: &mut ReceiverChannel,
    subscriber_registration_id: i64,
    now: i64,
) -> usize {
    let frames: Vec<(Vec<u8>, SocketAddr)> = channel.inbound.lock().drain(..).collect();
    let mut work = 0;

    for (bytes, from) in frames {
        if bytes.len() < HEADER_LENGTH as usize {
            continue;
        }
        let view = FrameView::new(&bytes);
        let frame_type = view.frame_type();
        if !matches!(frame_type, Some(FrameType::Data) | Some(FrameType::Setup)) {
            continue;
        }

        if view.stream_id() != channel.subscription.stream_id {
            continue;
        }

        let key = (view.session_id(), view.stream_id());
        let image = match channel.images.get(&key).copied() {
            Some(id) => {
                let image = state.images.with(id, |img| Arc::clone(img));
                if let (Some(img), Some(FrameType::Setup)) = (&image, frame_type) {
                    if let Some(setup) = SetupFrame::decode(&bytes) {
                        if setup.initial_term_id != img.initial_term_id {
                            tracing::warn!(
                                session_id = view.session_id(),
                                stream_id = view.stream_id(),
                                existing_initial_term_id = img.initial_term_id,
                                setup_initial_term_id = setup.initial_term_id,
                                "rejecting SETUP with mismatched initial_term_id for an existing image"
                            );
                            directory.record_error(
                                ERROR_SETUP_INITIAL_TERM_ID_MISMATCH,
                                "receiver.rs",
                                "SETUP initial_term_id does not match the existing image's",
                            );
                            continue;
                        }
                    }
                }
                image
            }
            None => {
                let initial_term_id = match frame_type {
                    Some(FrameType::Setup) => {
                        SetupFrame::decode(&bytes).map(|s| s.initial_term_id).unwrap_or_else(|| view.term_id())
                    }
                    _ => view.term_id(),
                };
                create_image(
                    directory,
                    config,
                    state,
                    subscriber_registration_id,
                    view.session_id(),
                    view.stream_id(),
                    from,
                    initial_term_id,
                )
                .map(|(id, image)| {
                    channel.images.insert(key, id);
                    image
                })
            }
        };

        let Some(image) = image else { continue };
        work += 1;
        image.touch(now);

        if frame_type == Some(FrameType::Data) {
            let index = index_by_term(image.initial_term_id, view.term_id());
            let term_buffer = image.log_buffers.term_mut(index);
            if insert_frame(term_buffer, view.term_offset(), &bytes) {
                image.session_counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    work
}

/// Advance an image's high-water mark as far as contiguous, fully
/// committed frames allow.
fn update_hwm(image: &PublicationImage) {
    let term_length = image.log_buffers.term_length() as i32;
    loop {
        let pos = image.rcv_hwm.load(Ordering::Acquire);
        let term_id = compute_term_id(pos, image.position_bits_to_shift, image.initial_term_id);
        let term_offset = compute_term_offset(pos, image.position_bits_to_shift);
        let index = index_by_term(image.initial_term_id, term_id);
        let term_buffer = image.log_buffers.term(index);

        let available = scan_for_availability(term_buffer, term_offset, term_length - term_offset);
        if available <= 0 {
            break;
        }
        image.rcv_hwm.fetch_add(available as i64, Ordering::AcqRel);
    }
}

/// One image's maintenance tick: advance its high-water mark, NAK a
/// detected gap, and send a periodic status message. Returns `false` if
/// the image has been quiet long enough that it should be evicted.
fn maintain_image(endpoint: &ReceiveChannelEndpoint, config: &MediaDriverConfig, image: &PublicationImage, now: i64) -> bool {
    if now - image.last_activity_ns.load(Ordering::Relaxed) > config.image_liveness_timeout_ns() {
        return false;
    }

    update_hwm(image);

    let term_length = image.log_buffers.term_length() as i32;
    let pos = image.rcv_hwm.load(Ordering::Acquire);
    let term_id = compute_term_id(pos, image.position_bits_to_shift, image.initial_term_id);
    let term_offset = compute_term_offset(pos, image.position_bits_to_shift);
    let index = index_by_term(image.initial_term_id, term_id);
    let term_buffer = image.log_buffers.term(index);
    let gap = scan_for_gap(term_buffer, term_offset, term_length);

    let nak = {
        let mut detector = image.loss_detector.lock();
        detector.on_gap(term_id, gap, now);
        detector.should_nak(now)
    };
    if let Some(nak) = nak {
        let frame =
            NakFrame { session_id: image.session_id, stream_id: image.stream_id, term_id: nak.term_id, term_offset: nak.term_offset, length: nak.length };
        if let Err(err) = endpoint.send_to(&frame.encode(), image.source) {
            tracing::warn!(error = %err, "failed to send nak");
        }
    }

    image.congestion_control.lock().on_idle(now);

    let last_sm = image.last_sm_ns.load(Ordering::Relaxed);
    if now - last_sm >= config.status_message_timeout_ns() {
        let trigger_setup = last_sm == 0;
        let receiver_window = image.congestion_control.lock().window_length();
        let sm = StatusMessageFrame {
            session_id: image.session_id,
            stream_id: image.stream_id,
            consumption_term_id: term_id,
            consumption_term_offset: term_offset,
            receiver_window,
            receiver_id: image.receiver_id,
            trigger_setup,
        };
        match endpoint.send_to(&sm.encode(), image.source) {
            Ok(_) => image.last_sm_ns.store(now, Ordering::Relaxed),
            Err(err) => tracing::warn!(error = %err, "failed to send status message"),
        }
    }

    true
}

impl Agent for ReceiverAgent {
    fn role_name(&self) -> &'static str {
        "receiver"
    }

    fn on_start(&mut self) {
        tracing::info!("receiver starting");
    }

    fn do_work(&mut self) -> std::io::Result<usize> {
        use crate::Concurrent::RingBuffer;

        let mut commands: Vec<(i32, i64)> = Vec::new();
        self.directory.receiver_commands().read(
            |msg_type, payload| {
                if let Ok(bytes) = payload.try_into() {
                    commands.push((msg_type, i64::from_le_bytes(bytes)));
                }
            },
            COMMANDS_PER_WORK_CYCLE,
        );
        let mut work = commands.len();
        for (msg_type, registration_id) in commands {
            self.dispatch_command(msg_type, registration_id);
        }

        let now = now_ns();
        let ids: Vec<RegistrationId> = self.channels.keys().copied().collect();
        for id in ids {
            let Some(channel) = self.channels.get_mut(&id) else { continue };

            if let Err(err) = channel.endpoint.poll(&mut channel.scratch) {
                tracing::warn!(error = %err, "receive channel poll failed");
            }

            work += process_channel(&self.directory, &self.config, &self.state, channel, id.value(), now);

            let keys: Vec<(i32, i32)> = channel.images.keys().copied().collect();
            for key in keys {
                let image_id = channel.images[&key];
                let Some(image) = self.state.images.with(image_id, |img| Arc::clone(img)) else {
                    channel.images.remove(&key);
                    continue;
                };

                if !maintain_image(&channel.endpoint, &self.config, &image, now) {
                    channel.images.remove(&key);
                    ReceiverEventsProxy::new(self.directory.receiver_events()).image_unavailable(image_id);
                }
            }
        }

        Ok(work)
    }

    fn on_close(&mut self) {
        tracing::info!("receiver stopping");
    }
}
