//! The `cnc.dat` file: the first thing a client opens when connecting to
//! a running driver, and the file whose presence (and live PID) is how a
//! second driver process refuses to start against an already-active
//! directory. Fixed-size header followed immediately by the to-driver
//! command ring, the to-clients broadcast buffer, the counters
//! metadata+values regions, and the distinct error log, back to back in
//! one mmap'd file.

use std::sync::atomic::{AtomicI64, Ordering};

use crossbeam_utils::CachePadded;

pub const CNC_VERSION: i32 = 1;

/// Offsets into the cnc.dat header region. Everything after
/// [`CncHeader::LENGTH`] bytes is the to-driver ring, then the
/// to-clients broadcast buffer, then counters metadata, then counters
/// values, then the error log, each sized per the fields below.
pub struct CncHeader {
    base: *mut u8,
}

unsafe impl Send for CncHeader {}
unsafe impl Sync for CncHeader {}

mod offset {
    pub const VERSION: usize = 0;
    pub const PID: usize = 8;
    pub const START_TIMESTAMP_NS: usize = 16;
    pub const TO_DRIVER_BUFFER_LENGTH: usize = 24;
    pub const TO_CLIENTS_BUFFER_LENGTH: usize = 32;
    pub const COUNTERS_METADATA_LENGTH: usize = 40;
    pub const COUNTERS_VALUES_LENGTH: usize = 48;
    pub const ERROR_LOG_LENGTH: usize = 56;
    pub const CLIENT_LIVENESS_TIMEOUT_NS: usize = 64;
    pub const DRIVER_ACTIVE: usize = 72;
}

impl CncHeader {
    pub const LENGTH: usize = 128;

    /// # Safety
    /// `base` must point at a writable region of at least
    /// [`CncHeader::LENGTH`] bytes, valid for as long as this value lives.
    pub unsafe fn new(base: *mut u8) -> Self {
        Self { base }
    }

    fn i64_at(&self, offset: usize) -> &CachePadded<AtomicI64> {
        unsafe { &*(self.base.add(offset) as *const CachePadded<AtomicI64>) }
    }

    pub fn version(&self) -> i64 {
        self.i64_at(offset::VERSION).load(Ordering::Acquire)
    }

    pub fn pid(&self) -> i64 {
        self.i64_at(offset::PID).load(Ordering::Acquire)
    }

    pub fn start_timestamp_ns(&self) -> i64 {
        self.i64_at(offset::START_TIMESTAMP_NS).load(Ordering::Acquire)
    }

    pub fn to_driver_buffer_length(&self) -> i64 {
        self.i64_at(offset::TO_DRIVER_BUFFER_LENGTH).load(Ordering::Acquire)
    }

    pub fn to_clients_buffer_length(&self) -> i64 {
        self.i64_at(offset::TO_CLIENTS_BUFFER_LENGTH).load(Ordering::Acquire)
    }

    pub fn counters_metadata_length(&self) -> i64 {
        self.i64_at(offset::COUNTERS_METADATA_LENGTH).load(Ordering::Acquire)
    }

    pub fn counters_values_length(&self) -> i64 {
        self.i64_at(offset::COUNTERS_VALUES_LENGTH).load(Ordering::Acquire)
    }

    pub fn error_log_length(&self) -> i64 {
        self.i64_at(offset::ERROR_LOG_LENGTH).load(Ordering::Acquire)
    }

    pub fn client_liveness_timeout_ns(&self) -> i64 {
        self.i64_at(offset::CLIENT_LIVENESS_TIMEOUT_NS).load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.i64_at(offset::DRIVER_ACTIVE).load(Ordering::Acquire) != 0
    }

    pub fn set_active(&self, active: bool) {
        self.i64_at(offset::DRIVER_ACTIVE).store(if active { 1 } else { 0 }, Ordering::Release);
    }

    /// Write the full geometry. Called once, by the process that
    /// creates `cnc.dat`, before it sets `active`.
    #[allow(clippy::too_many_arguments)]
    pub fn initialize(
        &self,
        pid: i64,
        start_timestamp_ns: i64,
        to_driver_buffer_length: i64,
        to_clients_buffer_length: i64,
        counters_metadata_length: i64,
        counters_values_length: i64,
        error_log_length: i64,
        client_liveness_timeout_ns: i64,
    ) {
        self.i64_at(offset::VERSION).store(CNC_VERSION as i64, Ordering::Relaxed);
        self.i64_at(offset::PID).store(pid, Ordering::Relaxed);
        self.i64_at(offset::START_TIMESTAMP_NS).store(start_timestamp_ns, Ordering::Relaxed);
        self.i64_at(offset::TO_DRIVER_BUFFER_LENGTH)
            .store(to_driver_buffer_length, Ordering::Relaxed);
        self.i64_at(offset::TO_CLIENTS_BUFFER_LENGTH)
            .store(to_clients_buffer_length, Ordering::Relaxed);
        self.i64_at(offset::COUNTERS_METADATA_LENGTH)
            .store(counters_metadata_length, Ordering::Relaxed);
        self.i64_at(offset::COUNTERS_VALUES_LENGTH)
            .store(counters_values_length, Ordering::Relaxed);
        self.i64_at(offset::ERROR_LOG_LENGTH).store(error_log_length, Ordering::Relaxed);
        self.i64_at(offset::CLIENT_LIVENESS_TIMEOUT_NS)
            .store(client_liveness_timeout_ns, Ordering::Relaxed);
        self.set_active(true);
    }
}
