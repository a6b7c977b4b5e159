//! Driver configuration: directory layout, buffer sizing, timeouts, the
//! flow/congestion-control and loss-recovery tunables, and the
//! threading/idle-strategy layout the runtime is started with. Every
//! field is settable from the CLI or from an environment variable of the
//! same name, a `clap` derive struct in the same CLI-plus-env style as
//! `redhat-performance rusty-comms`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::Core::bit_util::is_power_of_two;
use crate::error::{DriverError, DriverResult};

fn default_driver_directory() -> PathBuf {
    std::env::temp_dir().join("mediadriver")
}

/// Which flow-control strategy new network publications are created with.
/// `MulticastMinGroup` folds into the same slowest-receiver tracking as
/// `MulticastMin` -- this driver does not implement Aeron's separate
/// group-tag membership protocol, so the two are equivalent here.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum FlowControlStrategy {
    UnicastMax,
    MulticastMin,
    MulticastMinGroup,
}

/// Which congestion-control strategy new publication images are created
/// with.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum CongestionControlStrategy {
    Static,
    Cubic,
}

/// How agents are mapped onto OS threads. `Dedicated` gives each of
/// conductor/sender/receiver its own thread; `Shared`/`SharedNetwork`
/// collapse them onto fewer threads via [`CompositeAgent`](crate::Driver::agent::CompositeAgent);
/// `Invoker` runs no background threads at all, leaving the caller to
/// drive every agent's `do_work` directly.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum ThreadingMode {
    Dedicated,
    Shared,
    SharedNetwork,
    Invoker,
}

/// Which [`IdleStrategy`](crate::Driver::idle_strategy::IdleStrategy) an
/// agent is driven with between empty `do_work` calls.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum IdleStrategyKind {
    Backoff,
    BusySpin,
    Yielding,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "mediadriverd", about = "Media driver runtime")]
pub struct MediaDriverConfig {
    /// Directory holding cnc.dat and every `<registration-id>.logbuffer`.
    #[arg(long, env = "MEDIADRIVER_DIR", default_value_os_t = default_driver_directory())]
    pub driver_directory: PathBuf,

    /// Default term length for new publications, in bytes. Must be a
    /// power of two.
    #[arg(long, env = "MEDIADRIVER_TERM_LENGTH", default_value_t = 16 * 1024 * 1024)]
    pub term_length: i32,

    /// Maximum transmission unit for outbound frames, in bytes.
    #[arg(long, env = "MEDIADRIVER_MTU_LENGTH", default_value_t = 1408)]
    pub mtu_length: i32,

    /// Initial receiver window, in bytes, before congestion control has
    /// any RTT samples to work from.
    #[arg(long, env = "MEDIADRIVER_INITIAL_WINDOW_LENGTH", default_value_t = 128 * 1024)]
    pub initial_window_length: i32,

    /// `SO_RCVBUF` for every data socket the driver binds. `0` leaves the
    /// OS default in place.
    #[arg(long, env = "MEDIADRIVER_SOCKET_RCVBUF", default_value_t = 0)]
    pub socket_rcvbuf: u32,

    /// `SO_SNDBUF` for every data socket the driver binds. `0` leaves the
    /// OS default in place.
    #[arg(long, env = "MEDIADRIVER_SOCKET_SNDBUF", default_value_t = 0)]
    pub socket_sndbuf: u32,

    /// How long a client may go without a keepalive before the conductor
    /// tears down its publications and subscriptions.
    #[arg(long, env = "MEDIADRIVER_CLIENT_LIVENESS_TIMEOUT_MS", default_value_t = 10_000)]
    pub client_liveness_timeout_ms: u64,

    /// How long an image may go without a single frame before the
    /// receiver gives up on it. Distinct from a client's liveness
    /// timeout: a publisher can die without its client ever
    /// disconnecting.
    #[arg(long, env = "MEDIADRIVER_IMAGE_LIVENESS_TIMEOUT_MS", default_value_t = 10_000)]
    pub image_liveness_timeout_ms: u64,

    /// How long an unreferenced log buffer lingers on disk before being
    /// deleted, giving slow subscribers time to finish draining it.
    #[arg(long, env = "MEDIADRIVER_PUBLICATION_LINGER_MS", default_value_t = 5_000)]
    pub publication_linger_ms: u64,

    /// How long a publication's send position may sit at the same stuck
    /// offset (a producer claimed a frame slot and died before
    /// committing it) before the conductor patches the hole with a
    /// padding frame.
    #[arg(long, env = "MEDIADRIVER_PUBLICATION_UNBLOCK_TIMEOUT_MS", default_value_t = 2_000)]
    pub publication_unblock_timeout_ms: u64,

    /// How often an image with nothing new to report still sends a
    /// status message, so a sender with no traffic to piggyback on
    /// still hears back.
    #[arg(long, env = "MEDIADRIVER_STATUS_MESSAGE_TIMEOUT_MS", default_value_t = 1)]
    pub status_message_timeout_ms: u64,

    /// Which flow-control strategy new network publications use.
    #[arg(long, env = "MEDIADRIVER_FLOW_CONTROL_STRATEGY", value_enum, default_value_t = FlowControlStrategy::UnicastMax)]
    pub flow_control_strategy: FlowControlStrategy,

    /// Which congestion-control strategy new publication images use.
    #[arg(long, env = "MEDIADRIVER_CONGESTION_CONTROL_STRATEGY", value_enum, default_value_t = CongestionControlStrategy::Static)]
    pub congestion_control_strategy: CongestionControlStrategy,

    /// Initial backoff before a receiver's first NAK for a newly
    /// observed gap, in milliseconds.
    #[arg(long, env = "MEDIADRIVER_NAK_UNICAST_DELAY_MS", default_value_t = 1)]
    pub nak_unicast_delay_ms: u64,

    /// Estimated multicast group size, used to widen NAK jitter so a
    /// large group doesn't all re-NAK the same gap in lockstep.
    #[arg(long, env = "MEDIADRIVER_NAK_MULTICAST_GROUP_SIZE", default_value_t = 1)]
    pub nak_multicast_group_size: u32,

    /// Ceiling on the exponential NAK backoff, in milliseconds.
    #[arg(long, env = "MEDIADRIVER_NAK_MULTICAST_MAX_BACKOFF_MS", default_value_t = 1_000)]
    pub nak_multicast_max_backoff_ms: u64,

    /// How long a sender waits after a NAK before actually retransmitting,
    /// giving other receivers in the same multicast group time to have
    /// their NAK for the same loss arrive and get suppressed as a
    /// duplicate.
    #[arg(long, env = "MEDIADRIVER_RETRANSMIT_UNICAST_DELAY_MS", default_value_t = 1)]
    pub retransmit_unicast_delay_ms: u64,

    /// How long a retransmit entry lingers as active after being sent,
    /// suppressing duplicate NAKs for the same range.
    #[arg(long, env = "MEDIADRIVER_RETRANSMIT_UNICAST_LINGER_MS", default_value_t = 60_000)]
    pub retransmit_unicast_linger_ms: u64,

    /// Maximum number of concurrently in-flight retransmit entries per
    /// publication. NAKs arriving once this is full are dropped and
    /// counted rather than queued.
    #[arg(long, env = "MEDIADRIVER_RETRANSMIT_MAX_CONCURRENT", default_value_t = 128)]
    pub retransmit_max_concurrent: usize,

    /// How agents are mapped onto OS threads.
    #[arg(long, env = "MEDIADRIVER_THREADING_MODE", value_enum, default_value_t = ThreadingMode::Dedicated)]
    pub threading_mode: ThreadingMode,

    /// Idle strategy for the conductor agent.
    #[arg(long, env = "MEDIADRIVER_CONDUCTOR_IDLE_STRATEGY", value_enum, default_value_t = IdleStrategyKind::Backoff)]
    pub conductor_idle_strategy: IdleStrategyKind,

    /// Idle strategy for the sender agent.
    #[arg(long, env = "MEDIADRIVER_SENDER_IDLE_STRATEGY", value_enum, default_value_t = IdleStrategyKind::Backoff)]
    pub sender_idle_strategy: IdleStrategyKind,

    /// Idle strategy for the receiver agent.
    #[arg(long, env = "MEDIADRIVER_RECEIVER_IDLE_STRATEGY", value_enum, default_value_t = IdleStrategyKind::Backoff)]
    pub receiver_idle_strategy: IdleStrategyKind,

    /// Capacity of the client command ring, in bytes.
    #[arg(long, env = "MEDIADRIVER_TO_DRIVER_BUFFER_LENGTH", default_value_t = 1024 * 1024)]
    pub to_driver_buffer_length: usize,

    /// Capacity of the client event broadcast buffer, in bytes.
    #[arg(long, env = "MEDIADRIVER_TO_CLIENTS_BUFFER_LENGTH", default_value_t = 1024 * 1024)]
    pub to_clients_buffer_length: usize,

    /// Capacity of the counters values/metadata tables, in number of slots.
    #[arg(long, env = "MEDIADRIVER_COUNTERS_CAPACITY", default_value_t = 1024)]
    pub counters_capacity: usize,

    /// Capacity of the distinct error log, in number of entries.
    #[arg(long, env = "MEDIADRIVER_ERROR_LOG_CAPACITY", default_value_t = 256)]
    pub error_log_capacity: usize,

    /// Log filter, as accepted by `tracing_subscriber::EnvFilter`.
    #[arg(long, env = "MEDIADRIVER_LOG", default_value = "info")]
    pub log_filter: String,
}

impl MediaDriverConfig {
    pub fn validate(&self) -> DriverResult<()> {
        if !is_power_of_two(self.term_length as i64) {
            return Err(DriverError::InvalidTermLength(self.term_length));
        }
        if self.mtu_length <= 0 || self.mtu_length > self.term_length {
            return Err(DriverError::InvalidChannelUri {
                uri: String::new(),
                reason: format!("mtu length {} is not within (0, term_length]", self.mtu_length),
            });
        }
        Ok(())
    }

    pub fn client_liveness_timeout_ns(&self) -> i64 {
        self.client_liveness_timeout_ms as i64 * 1_000_000
    }

    pub fn image_liveness_timeout_ns(&self) -> i64 {
        self.image_liveness_timeout_ms as i64 * 1_000_000
    }

    pub fn publication_linger_ns(&self) -> i64 {
        self.publication_linger_ms as i64 * 1_000_000
    }

    pub fn publication_unblock_timeout_ns(&self) -> i64 {
        self.publication_unblock_timeout_ms as i64 * 1_000_000
    }

    pub fn status_message_timeout_ns(&self) -> i64 {
        self.status_message_timeout_ms as i64 * 1_000_000
    }

    pub fn nak_unicast_delay_ns(&self) -> i64 {
        self.nak_unicast_delay_ms as i64 * 1_000_000
    }

    pub fn nak_multicast_max_backoff_ns(&self) -> i64 {
        self.nak_multicast_max_backoff_ms as i64 * 1_000_000
    }

    pub fn retransmit_unicast_delay_ns(&self) -> i64 {
        self.retransmit_unicast_delay_ms as i64 * 1_000_000
    }

    pub fn retransmit_unicast_linger_ns(&self) -> i64 {
        self.retransmit_unicast_linger_ms as i64 * 1_000_000
    }

    pub fn cnc_path(&self) -> PathBuf {
        self.driver_directory.join("cnc.dat")
    }

    pub fn logbuffer_path(&self, registration_id: i64) -> PathBuf {
        self.driver_directory.join(format!("{registration_id}.logbuffer"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_power_of_two_term_length() {
        let mut config = MediaDriverConfig::parse_from(["mediadriverd"]);
        config.term_length = 100_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_config_validates() {
        let config = MediaDriverConfig::parse_from(["mediadriverd"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn logbuffer_path_is_under_the_driver_directory() {
        let config = MediaDriverConfig::parse_from(["mediadriverd", "--driver-directory", "/tmp/md"]);
        assert_eq!(config.logbuffer_path(42), PathBuf::from("/tmp/md/42.logbuffer"));
    }

    #[test]
    fn default_threading_mode_is_dedicated() {
        let config = MediaDriverConfig::parse_from(["mediadriverd"]);
        assert_eq!(config.threading_mode, ThreadingMode::Dedicated);
    }

    #[test]
    fn flow_control_strategy_is_settable_from_args() {
        let config = MediaDriverConfig::parse_from(["mediadriverd", "--flow-control-strategy", "multicast-min"]);
        assert_eq!(config.flow_control_strategy, FlowControlStrategy::MulticastMin);
    }
}
