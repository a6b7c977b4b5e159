//! A client that stops sending keepalives has its publications and
//! subscriptions torn down once the configured liveness timeout elapses,
//! so a crashed client process doesn't leak resources in the driver
//! directory forever.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use mediadriver::Concurrent::RingBuffer;
use mediadriver::Driver::agent::Agent;
use mediadriver::Driver::commands::{AddPublicationCommand, ADD_PUBLICATION};
use mediadriver::Driver::conductor::DriverConductor;
use mediadriver::Driver::directory::DriverDirectory;
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
    config.client_liveness_timeout_ms = 50;
    config.publication_linger_ms = 0;
    config
}

#[test]
fn publications_are_torn_down_once_the_client_goes_quiet() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let directory = Arc::new(DriverDirectory::create(&config).unwrap());
    let state = Arc::new(SharedState::default());
    let mut conductor = DriverConductor::new(Arc::clone(&directory), config.clone(), Arc::clone(&state));

    let add = AddPublicationCommand {
        correlation_id: 1,
        client_id: 99,
        stream_id: 1,
        channel: "udp://127.0.0.1:41601".to_string(),
    };
    assert!(directory.to_driver_commands().write(ADD_PUBLICATION, &add.encode()));
    conductor.do_work().unwrap();
    assert_eq!(state.publications.len(), 1);
    let registration_id = state.publications.ids()[0];
    let log_path = config.logbuffer_path(registration_id.value());
    assert!(log_path.exists());

    // No further keepalive is sent; once the client_liveness_timeout_ms
    // window passes, the next tick should evict it.
    std::thread::sleep(Duration::from_millis(120));
    conductor.do_work().unwrap();

    assert!(state.publications.is_empty(), "publication should be removed once the client times out");

    // Linger is zero, so the scheduled delete runs on the following tick.
    conductor.do_work().unwrap();
    assert!(!log_path.exists(), "lingering log buffer should have been deleted");
}
