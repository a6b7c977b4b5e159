//! A NAK arriving on a publication's send socket for a committed range of
//! its term buffer is answered with a retransmission of exactly that
//! range -- the path a receiver relies on to repair a single dropped
//! datagram without the sender resending everything after it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;

use mediadriver::Concurrent::RingBuffer;
use mediadriver::Driver::agent::Agent;
use mediadriver::Driver::commands::{AddPublicationCommand, ADD_PUBLICATION};
use mediadriver::Driver::conductor::DriverConductor;
use mediadriver::Driver::directory::DriverDirectory;
use mediadriver::Driver::sender::SenderAgent;
use mediadriver::Driver::SharedState;
use mediadriver::LogBuffer::frame_descriptor::{FrameType, FrameWriter, UNFRAGMENTED};
use mediadriver::Transport::wire::NakFrame;
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

#[test]
fn nak_is_answered_with_a_retransmission_of_the_requested_range() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let directory = Arc::new(DriverDirectory::create(&config).unwrap());
    let state = Arc::new(SharedState::default());

    let mut conductor = DriverConductor::new(Arc::clone(&directory), config.clone(), Arc::clone(&state));
    let add = AddPublicationCommand {
        correlation_id: 1,
        client_id: 1,
        stream_id: 9,
        channel: "udp://127.0.0.1:41701".to_string(),
    };
    assert!(directory.to_driver_commands().write(ADD_PUBLICATION, &add.encode()));
    conductor.do_work().unwrap();

    let registration_id = state.publications.ids()[0];
    let initial_term_id =
        state.publications.with(registration_id, |p| p.log_buffers.metadata().initial_term_id()).unwrap();

    // A frame already committed to the term buffer, as if the sender had
    // already transmitted it once before the receiver reported it lost.
    state
        .publications
        .with(registration_id, |p| {
            let term = p.log_buffers.term_mut(0);
            let mut w = FrameWriter::new(&mut term[0..40]);
            w.set_header(FrameType::Data, UNFRAGMENTED, 0, 0, 9, initial_term_id, 0);
            term[32..40].copy_from_slice(b"resend!!");
            let mut w = FrameWriter::new(&mut term[0..40]);
            w.commit(40);
        })
        .unwrap();

    let mut sender = SenderAgent::new(Arc::clone(&directory), config.clone(), Arc::clone(&state));
    sender.do_work().unwrap(); // binds the send channel endpoint

    let client_socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    client_socket.set_nonblocking(true).unwrap();
    client_socket.connect("127.0.0.1:41701").unwrap();

    let nak = NakFrame { session_id: 0, stream_id: 9, term_id: initial_term_id, term_offset: 0, length: 40 };
    client_socket.send(&nak.encode()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    let mut buf = [0u8; 128];
    let mut received_len = None;
    while Instant::now() < deadline && received_len.is_none() {
        sender.do_work().unwrap();
        match client_socket.recv(&mut buf) {
            Ok(len) => received_len = Some(len),
            Err(_) => std::thread::sleep(Duration::from_millis(10)),
        }
    }

    // The retransmitted range is frame-aligned (32 bytes), so a 40-byte
    // NAK pulls back 64 bytes even though only the first 40 are meaningful.
    let len = received_len.expect("sender should have retransmitted the nak'd range");
    assert_eq!(len, 64);
    assert_eq!(&buf[32..40], b"resend!!");
}
