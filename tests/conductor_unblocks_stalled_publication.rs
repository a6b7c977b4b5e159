//! A producer that claims term space (advances the raw tail) and then
//! disappears before committing the frame leaves a permanent hole no
//! consumer can scan past. The conductor's periodic stall check should
//! patch it with a padding frame once the claim has sat uncommitted past
//! the unblock timeout -- and should leave an untouched, never-written
//! publication alone.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serial_test::serial;

use mediadriver::Concurrent::RingBuffer;
use mediadriver::Driver::agent::Agent;
use mediadriver::Driver::commands::{AddPublicationCommand, ADD_PUBLICATION};
use mediadriver::Driver::conductor::DriverConductor;
use mediadriver::Driver::directory::DriverDirectory;
use mediadriver::Driver::SharedState;
use mediadriver::LogBuffer::descriptor::pack_tail;
use mediadriver::LogBuffer::frame_descriptor::{FrameType, FrameView};
use mediadriver::Registry::RegistrationId;
use mediadriver::config::MediaDriverConfig;

fn test_config(dir: &std::path::Path) -> MediaDriverConfig {
    let mut config = MediaDriverConfig::parse_from(["mediadriverd"]);
    config.driver_directory = dir.to_path_buf();
    config.to_driver_buffer_length = 4096;
    config.to_clients_buffer_length = 4096;
    config.counters_capacity = 8;
    config.error_log_capacity = 8;
    config.term_length = 64 * 1024;
    config
}

fn add_publication(
    directory: &DriverDirectory,
    conductor: &mut DriverConductor,
    state: &SharedState,
    port: u16,
) -> RegistrationId {
    let add = AddPublicationCommand {
        correlation_id: 1,
        client_id: 1,
        stream_id: 1,
        channel: format!("udp://127.0.0.1:{port}"),
    };
    assert!(directory.to_driver_commands().write(ADD_PUBLICATION, &add.encode()));
    conductor.do_work().unwrap();
    state.publications.ids()[0]
}

// Real wall-clock dependent (the unblock timeout is 2s of real time), so
// serialised to avoid contending with other timing-sensitive tests.
#[test]
#[serial]
fn claimed_but_uncommitted_slot_is_eventually_patched() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let directory = Arc::new(DriverDirectory::create(&config).unwrap());
    let state = Arc::new(SharedState::default());
    let mut conductor = DriverConductor::new(Arc::clone(&directory), config.clone(), Arc::clone(&state));

    let registration_id = add_publication(&directory, &mut conductor, &state, 41401);
    let (initial_term_id, term_length) = state
        .publications
        .with(registration_id, |p| {
            let md = p.log_buffers.metadata();
            (md.initial_term_id(), md.term_length())
        })
        .unwrap();

    // Simulate a client-side producer that claimed the first 64 bytes of
    // term 0 (advanced the raw tail) and died before committing a frame
    // header there.
    state
        .publications
        .with(registration_id, |p| {
            p.log_buffers.metadata().set_raw_tail_ordered(0, pack_tail(initial_term_id, 64))
        })
        .unwrap();

    conductor.do_work().unwrap(); // records the stall

    let still_uncommitted = state
        .publications
        .with(registration_id, |p| FrameView::new(p.log_buffers.term(0)).frame_length() != 0)
        .unwrap();
    assert!(!still_uncommitted, "frame must not be patched before the unblock timeout elapses");

    std::thread::sleep(Duration::from_millis(2_200));
    conductor.do_work().unwrap(); // timeout elapsed, should patch now

    // Nothing past offset 64 was ever committed either, so the unblocker's
    // forward scan runs to the end of the term and pads the whole span in
    // one frame rather than just the 64-byte claimed slot.
    let view_is_padding = state
        .publications
        .with(registration_id, |p| {
            let view = FrameView::new(p.log_buffers.term(0));
            view.frame_length() == term_length - 64 && view.frame_type() == Some(FrameType::Pad)
        })
        .unwrap();
    assert!(view_is_padding, "stalled claim should have been patched with a padding frame to end of term");
}

#[test]
fn never_written_publication_is_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let directory = Arc::new(DriverDirectory::create(&config).unwrap());
    let state = Arc::new(SharedState::default());
    let mut conductor = DriverConductor::new(Arc::clone(&directory), config.clone(), Arc::clone(&state));

    let registration_id = add_publication(&directory, &mut conductor, &state, 41402);

    for _ in 0..5 {
        conductor.do_work().unwrap();
    }

    let frame_length = state
        .publications
        .with(registration_id, |p| FrameView::new(p.log_buffers.term(0)).frame_length())
        .unwrap();
    assert_eq!(frame_length, 0, "an idle publication with no outstanding claim must not be padded");
}
