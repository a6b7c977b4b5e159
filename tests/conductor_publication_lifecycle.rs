//! End-to-end: a client's ADD_PUBLICATION command flows through the
//! to-driver ring into the conductor, the conductor hands the new
//! publication off to the sender over the internal command ring, and the
//! client sees a PUBLICATION_READY event on the to-clients broadcast.

use std::sync::Arc;

use clap::Parser;

use mediadriver::Concurrent::RingBuffer;
use mediadriver::Driver::agent::Agent;
use mediadriver::Driver::commands::{
    AddPublicationCommand, RemovePublicationCommand, ADD_PUBLICATION, ON_PUBLICATION_READY,
    REMOVE_PUBLICATION,
};
use mediadriver::Driver::conductor::DriverConductor;
use mediadriver::Driver::directory::DriverDirectory;
use mediadriver::Driver::proxies::NEW_NETWORK_PUBLICATION;
use mediadriver::Driver::SharedState;
use mediadriver::config::MediaDriverConfig;

fn test_config(dir: &std::path::Path) -> MediaDriverConfig {
    let mut config = MediaDriverConfig::parse_from(["mediadriverd"]);
    config.driver_directory = dir.to_path_buf();
    config.to_driver_buffer_length = 4096;
    config.to_clients_buffer_length = 4096;
    config.counters_capacity = 8;
    config.error_log_capacity = 8;
    config.term_length = 64 * 1024;
    config.publication_linger_ms = 0;
    config
}

#[test]
fn add_publication_reaches_the_sender_and_the_client() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let directory = Arc::new(DriverDirectory::create(&config).unwrap());
    let state = Arc::new(SharedState::default());
    let mut conductor = DriverConductor::new(Arc::clone(&directory), config.clone(), Arc::clone(&state));

    let add = AddPublicationCommand {
        correlation_id: 1,
        client_id: 42,
        stream_id: 7,
        channel: "udp://127.0.0.1:41000".to_string(),
    };
    assert!(directory.to_driver_commands().write(ADD_PUBLICATION, &add.encode()));

    conductor.do_work().unwrap();

    assert_eq!(state.publications.len(), 1);
    let registration_id = state.publications.ids()[0];

    let mut seen_sender_command = None;
    directory.sender_commands().read(
        |msg_type, payload| {
            seen_sender_command = Some((msg_type, i64::from_le_bytes(payload.try_into().unwrap())));
        },
        1,
    );
    assert_eq!(seen_sender_command, Some((NEW_NETWORK_PUBLICATION, registration_id.value())));

    let mut receiver = unsafe { mediadriver::Concurrent::BroadcastReceiver::new(directory.to_clients_events()) };
    let (msg_type, _payload) = receiver.receive_next().expect("publication ready event");
    assert_eq!(msg_type, ON_PUBLICATION_READY);

    assert!(config.logbuffer_path(registration_id.value()).exists());

    let remove = RemovePublicationCommand { correlation_id: 2, registration_id: registration_id.value() };
    assert!(directory.to_driver_commands().write(REMOVE_PUBLICATION, &remove.encode()));
    conductor.do_work().unwrap();
    assert!(state.publications.is_empty());

    // Linger is zero, so the next tick's linger sweep deletes the file.
    conductor.do_work().unwrap();
    assert!(!config.logbuffer_path(registration_id.value()).exists());
}

#[test]
fn unknown_publication_removal_is_reported_as_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let directory = Arc::new(DriverDirectory::create(&config).unwrap());
    let state = Arc::new(SharedState::default());
    let mut conductor = DriverConductor::new(Arc::clone(&directory), config.clone(), Arc::clone(&state));

    let remove = RemovePublicationCommand { correlation_id: 9, registration_id: 123 };
    assert!(directory.to_driver_commands().write(REMOVE_PUBLICATION, &remove.encode()));
    conductor.do_work().unwrap();

    let mut receiver = unsafe { mediadriver::Concurrent::BroadcastReceiver::new(directory.to_clients_events()) };
    let (msg_type, _payload) = receiver.receive_next().expect("error event");
    assert_eq!(msg_type, mediadriver::Driver::commands::ON_ERROR);
    assert_eq!(directory.error_log().iter().len(), 1);
}
