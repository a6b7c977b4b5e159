//! Drives every live [`NetworkPublication`](super::NetworkPublication)'s
//! outbound side: copies newly-committed term-buffer frames onto the
//! wire up to the current flow-control limit, answers NAKs with
//! retransmissions (subject to linger suppression), and reacts to status
//! messages by updating the publication's position limit and, on a
//! receiver's first status message, sending a SETUP frame.
//!
//! One duty cycle per agent thread, generalised from one queue to one
//! entry per live publication.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::Core::bit_util::align;
use crate::Driver::agent::Agent;
use crate::Driver::directory::DriverDirectory;
use crate::Driver::now_ns;
use crate::Driver::proxies::{NEW_NETWORK_PUBLICATION, REMOVE_NETWORK_PUBLICATION};
use crate::Driver::{NetworkPublication, SharedState};
use crate::FlowControl::StatusMessage;
use crate::LogBuffer::frame_descriptor::{FrameType, FrameView, FRAME_ALIGNMENT, HEADER_LENGTH};
use crate::LogBuffer::position::{compute_term_id, compute_term_offset, index_by_term, position_bits_to_shift};
use crate::LogBuffer::term_scanner::scan_for_availability;
use crate::Registry::RegistrationId;
use crate::Transport::send_channel_endpoint::SendChannelEndpoint;
use crate::Transport::wire::{NakFrame, SetupFrame, StatusMessageFrame};
use crate::config::MediaDriverConfig;

const COMMANDS_PER_WORK_CYCLE: usize = 64;
const SCRATCH_BUFFER_LEN: usize = 2048;

pub struct SenderAgent {
    directory: Arc<DriverDirectory>,
    config: MediaDriverConfig,
    state: Arc<SharedState>,
    endpoints: HashMap<RegistrationId, SendChannelEndpoint>,
    scratch: Vec<u8>,
}

impl SenderAgent {
    pub fn new(directory: Arc<DriverDirectory>, config: MediaDriverConfig, state: Arc<SharedState>) -> Self {
        Self { directory, config, state, endpoints: HashMap::new(), scratch: vec![0u8; SCRATCH_BUFFER_LEN] }
    }

    fn dispatch_command(&mut self, msg_type: i32, registration_id: i64) {
        let id = RegistrationId::from_raw(registration_id);
        match msg_type {
            NEW_NETWORK_PUBLICATION => self.handle_new_publication(id),
            REMOVE_NETWORK_PUBLICATION => {
                self.endpoints.remove(&id);
            }
            other => tracing::warn!(msg_type = other, "unknown sender command"),
        }
    }

    fn handle_new_publication(&mut self, id: RegistrationId) {
        let Some(publication) = self.state.publications.with(id, |p| Arc::clone(p)) else {
            tracing::warn!(registration_id = %id, "sender got NEW_NETWORK_PUBLICATION for unknown registration");
            return;
        };

        match SendChannelEndpoint::new(&publication.channel, self.config.socket_rcvbuf, self.config.socket_sndbuf) {
            Ok(endpoint) => {
                self.endpoints.insert(id, endpoint);
            }
            Err(err) => {
                tracing::warn!(registration_id = %id, error = %err, "failed to bind send channel endpoint");
            }
        }
    }
}

fn send_available(endpoint: &SendChannelEndpoint, publication: &NetworkPublication) -> usize {
    let metadata = publication.log_buffers.metadata();
    let term_length = metadata.term_length();
    if term_length <= 0 {
        return 0;
    }
    let shift = position_bits_to_shift(term_length);
    let initial_term_id = metadata.initial_term_id();

    let snd_pos = publication.snd_pos.load(Ordering::Acquire);
    let limit = publication.position_limit_counter.load();
    if snd_pos >= limit {
        return 0;
    }

    let term_id = compute_term_id(snd_pos, shift, initial_term_id);
    let term_offset = compute_term_offset(snd_pos, shift);
    let index = index_by_term(initial_term_id, term_id);

    let remaining_in_term = (term_length - term_offset) as i64;
    let window = (limit - snd_pos).min(remaining_in_term).min(metadata.mtu_length() as i64);
    if window <= 0 {
        return 0;
    }

    let term_buffer = publication.log_buffers.term(index);
    let available = scan_for_availability(term_buffer, term_offset, window as i32);
    if available <= 0 {
        return 0;
    }

    let frame = &term_buffer[term_offset as usize..(term_offset + available) as usize];
    match endpoint.send(frame) {
        Ok(_) => {
            publication.snd_pos.fetch_add(available as i64, Ordering::AcqRel);
            publication.touch(now_ns());
            1
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to send data frame");
            0
        }
    }
}

fn send_setup_frame(endpoint: &SendChannelEndpoint, publication: &NetworkPublication) {
    let metadata = publication.log_buffers.metadata();
    let initial_term_id = metadata.initial_term_id();
    let shift = position_bits_to_shift(metadata.term_length());
    let snd_pos = publication.snd_pos.load(Ordering::Acquire);

    let setup = SetupFrame {
        session_id: publication.session_id,
        stream_id: publication.stream_id,
        active_term_id: compute_term_id(snd_pos, shift, initial_term_id),
        term_offset: compute_term_offset(snd_pos, shift),
        initial_term_id,
        term_length: metadata.term_length(),
        mtu_length: metadata.mtu_length(),
        ttl: publication.channel.default_ttl() as i32,
    };

    if let Err(err) = endpoint.send(&setup.encode()) {
        tracing::warn!(error = %err, "failed to send setup frame");
    }
}

fn handle_status_message(endpoint: &SendChannelEndpoint, publication: &NetworkPublication, sm: &StatusMessageFrame, now: i64) {
    let metadata = publication.log_buffers.metadata();
    let shift = position_bits_to_shift(metadata.term_length());
    let initial_term_id = metadata.initial_term_id();

    let message = StatusMessage {
        receiver_id: sm.receiver_id,
        consumption_term_id: sm.consumption_term_id,
        consumption_term_offset: sm.consumption_term_offset,
        receiver_window: sm.receiver_window,
        trigger_setup: sm.trigger_setup,
    };

    let sender_position = publication.snd_pos.load(Ordering::Acquire);
    let term_window_length = metadata.term_length() as i64;

    let trigger_setup = {
        let mut flow_control = publication.flow_control.lock();
        let limit =
            flow_control.on_status_message(&message, shift, initial_term_id, sender_position, term_window_length, now);
        publication.position_limit_counter.set(limit);
        flow_control.should_trigger_setup()
    };

    if trigger_setup {
        send_setup_frame(endpoint, publication);
    }
}

fn handle_nak(publication: &NetworkPublication, nak: &NakFrame, now: i64) {
    publication.retransmit_handler.lock().on_nak(nak.term_id, nak.term_offset, nak.length, now);
}

/// Re-scan and retransmit every range whose delay has just elapsed,
/// pruning lingered-out entries from the retransmit handler's table.
fn service_retransmits(endpoint: &SendChannelEndpoint, publication: &NetworkPublication, now: i64) -> usize {
    let due = publication.retransmit_handler.lock().poll_due(now);
    if due.is_empty() {
        return 0;
    }

    let metadata = publication.log_buffers.metadata();
    let initial_term_id = metadata.initial_term_id();

    let mut work = 0;
    for (term_id, term_offset, length) in due {
        let index = index_by_term(initial_term_id, term_id);
        let term_buffer = publication.log_buffers.term(index);

        let start = term_offset as usize;
        let aligned_len = align(length, FRAME_ALIGNMENT) as usize;
        let end = (start + aligned_len).min(term_buffer.len());
        if end <= start {
            continue;
        }

        match endpoint.send(&term_buffer[start..end]) {
            Ok(_) => work += 1,
            Err(err) => tracing::warn!(error = %err, "failed to retransmit nak'd range"),
        }
    }
    work
}

/// Drain whatever control frames (status messages, NAKs) have arrived on
/// this publication's socket since the last duty cycle.
fn poll_control(endpoint: &SendChannelEndpoint, publication: &NetworkPublication, scratch: &mut [u8], now: i64) -> usize {
    let mut work = 0;
    loop {
        match endpoint.recv_from(scratch) {
            Ok(Some((len, _from))) => {
                work += 1;
                if len < HEADER_LENGTH as usize {
                    continue;
                }
                let frame = &scratch[..len];
                match FrameView::new(frame).frame_type() {
                    Some(FrameType::StatusMessage) => {
                        if let Some(sm) = StatusMessageFrame::decode(frame) {
                            handle_status_message(endpoint, publication, &sm, now);
                        }
                    }
                    Some(FrameType::Nak) => {
                        if let Some(nak) = NakFrame::decode(frame) {
                            handle_nak(publication, &nak, now);
                        }
                    }
                    _ => {}
                }
            }
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "send channel recv failed");
                break;
            }
        }
    }
    work
}

fn tick_idle(publication: &NetworkPublication, now: i64) {
    let mut flow_control = publication.flow_control.lock();
    let current = publication.position_limit_counter.load();
    let updated = flow_control.on_idle(now, current);
    publication.position_limit_counter.set(updated);
}

impl Agent for SenderAgent {
    fn role_name(&self) -> &'static str {
        "sender"
    }

    fn on_start(&mut self) {
        tracing::info!("sender starting");
    }

    fn do_work(&mut self) -> std::io::Result<usize> {
        use crate::Concurrent::RingBuffer;

        let mut commands: Vec<(i32, i64)> = Vec::new();
        self.directory.sender_commands().read(
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
        let ids: Vec<RegistrationId> = self.endpoints.keys().copied().collect();
        for id in ids {
            let Some(publication) = self.state.publications.with(id, |p| Arc::clone(p)) else {
                self.endpoints.remove(&id);
                continue;
            };
            let Some(endpoint) = self.endpoints.get(&id) else { continue };

            work += poll_control(endpoint, &publication, &mut self.scratch, now);
            work += send_available(endpoint, &publication);
            work += service_retransmits(endpoint, &publication, now);
            tick_idle(&publication, now);
        }

        Ok(work)
    }

    fn on_close(&mut self) {
        tracing::info!("sender stopping");
    }
}
