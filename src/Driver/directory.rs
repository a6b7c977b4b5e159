//! The driver directory: `cnc.dat`, one mmap'd file shared by every client
//! process and holding, back to back, the header, the to-driver command
//! ring, the to-clients event broadcast buffer, the counters tables and
//! the distinct error log. Everything the conductor, sender and receiver
//! agents reach for that isn't a per-publication/per-image resource lives
//! here, constructed once at startup and handed around as `Arc<DriverDirectory>`.
//!
//! Built on `Core::SharedMemory`'s file-backed mmap, carved up into
//! several sub-regions of the one mapping rather than one region per use.

use std::path::Path;

use crate::Concurrent::{BroadcastTransmitter, ManyToOneRingBuffer, OneToOneRingBuffer, RingBuffer};
use crate::Core::counters::CountersManager;
use crate::Core::error_log::DistinctErrorLog;
use crate::Core::SharedMemory::{attach_file_backed, create_file_backed, RawHandle, SharedMemoryBackend};
use crate::Driver::cnc::CncHeader;
use crate::Driver::now_ns;
use crate::config::MediaDriverConfig;
use crate::error::{DriverError, DriverResult};

/// Capacity of each inter-agent command/event ring, in bytes. These never
/// cross a process boundary so they're heap-allocated rather than carved
/// out of `cnc.dat`.
const AGENT_RING_CAPACITY: usize = 64 * 1024;

/// A raw-pointer-plus-length view into a byte range of someone else's
/// mapping. Exists because [`CountersManager`] and [`DistinctErrorLog`]
/// each want to own a distinct `Box<dyn SharedMemoryBackend>`, but all of
/// `cnc.dat`'s sub-regions live in the one mmap the directory owns.
struct SubRegion {
    ptr: *mut u8,
    len: usize,
}

unsafe impl Send for SubRegion {}
unsafe impl Sync for SubRegion {}

impl SubRegion {
    /// # Safety
    /// `ptr` must point at `len` writable bytes that outlive every use of
    /// the resulting backend -- i.e. the parent mapping this was sliced
    /// from must outlive it.
    unsafe fn new(ptr: *mut u8, len: usize) -> Self {
        Self { ptr, len }
    }
}

impl SharedMemoryBackend for SubRegion {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    fn size(&self) -> usize {
        self.len
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::Fd(-1)
    }
}

/// Byte offsets of each sub-region within `cnc.dat`, computed once from
/// config so `create` and a future `attach` agree on layout.
struct CncLayout {
    to_driver_offset: usize,
    to_clients_offset: usize,
    counters_metadata_offset: usize,
    counters_values_offset: usize,
    error_log_offset: usize,
    total_length: usize,
}

impl CncLayout {
    fn new(
        to_driver_ring_length: usize,
        to_clients_buffer_length: usize,
        counters_metadata_length: usize,
        counters_values_length: usize,
        error_log_length: usize,
    ) -> Self {
        let to_driver_offset = CncHeader::LENGTH;
        let to_clients_offset = to_driver_offset + to_driver_ring_length;
        let counters_metadata_offset = to_clients_offset + to_clients_buffer_length;
        let counters_values_offset = counters_metadata_offset + counters_metadata_length;
        let error_log_offset = counters_values_offset + counters_values_length;
        let total_length = error_log_offset + error_log_length;
        Self {
            to_driver_offset,
            to_clients_offset,
            counters_metadata_offset,
            counters_values_offset,
            error_log_offset,
            total_length,
        }
    }
}

fn new_agent_ring() -> (Vec<u8>, OneToOneRingBuffer) {
    let mut backing = vec![0u8; OneToOneRingBuffer::buffer_length(AGENT_RING_CAPACITY)];
    let ring = unsafe { OneToOneRingBuffer::new(backing.as_mut_ptr(), AGENT_RING_CAPACITY) };
    (backing, ring)
}

/// Owns every shared resource the three agents coordinate through: the
/// `cnc.dat` mapping (client-visible) plus the purely internal
/// sender/receiver command-and-event rings (conductor-visible only).
pub struct DriverDirectory {
    _cnc: Box<dyn SharedMemoryBackend>,
    header: CncHeader,
    to_driver_commands: ManyToOneRingBuffer,
    to_clients_events: BroadcastTransmitter,
    counters: CountersManager,
    error_log: DistinctErrorLog,

    _sender_commands_backing: Vec<u8>,
    sender_commands: OneToOneRingBuffer,
    _receiver_commands_backing: Vec<u8>,
    receiver_commands: OneToOneRingBuffer,
    _receiver_events_backing: Vec<u8>,
    receiver_events: OneToOneRingBuffer,
}

unsafe impl Send for DriverDirectory {}
unsafe impl Sync for DriverDirectory {}

impl DriverDirectory {
    /// Create a fresh `cnc.dat` under `config.driver_directory`, refusing
    /// to start if an existing one is still marked active (another driver
    /// process is already running against it).
    pub fn create(config: &MediaDriverConfig) -> DriverResult<Self> {
        std::fs::create_dir_all(&config.driver_directory)?;
        let cnc_path = config.cnc_path();

        if let Ok(existing) = attach_file_backed(&cnc_path, CncHeader::LENGTH) {
            let header = unsafe { CncHeader::new(existing.as_ptr()) };
            if header.is_active() {
                return Err(DriverError::DirectoryInUse(cnc_path.display().to_string()));
            }
        }

        let counters_metadata_length = CountersManager::metadata_buffer_length(config.counters_capacity);
        let counters_values_length = CountersManager::values_buffer_length(config.counters_capacity);
        let error_log_length = DistinctErrorLog::buffer_length(config.error_log_capacity);
        let to_driver_ring_length = ManyToOneRingBuffer::buffer_length(config.to_driver_buffer_length);

        let layout = CncLayout::new(
            to_driver_ring_length,
            config.to_clients_buffer_length,
            counters_metadata_length,
            counters_values_length,
            error_log_length,
        );

        let cnc = create_file_backed(&cnc_path, layout.total_length)?;
        let base = cnc.as_ptr();

        let header = unsafe { CncHeader::new(base) };
        header.initialize(
            std::process::id() as i64,
            now_ns(),
            config.to_driver_buffer_length as i64,
            config.to_clients_buffer_length as i64,
            counters_metadata_length as i64,
            counters_values_length as i64,
            error_log_length as i64,
            config.client_liveness_timeout_ns(),
        );

        let to_driver_commands = unsafe {
            ManyToOneRingBuffer::new(base.add(layout.to_driver_offset), config.to_driver_buffer_length)
        };
        let to_clients_events = unsafe {
            BroadcastTransmitter::new(base.add(layout.to_clients_offset), config.to_clients_buffer_length)
        };

        let counters_metadata: Box<dyn SharedMemoryBackend> = Box::new(unsafe {
            SubRegion::new(base.add(layout.counters_metadata_offset), counters_metadata_length)
        });
        let counters_values: Box<dyn SharedMemoryBackend> = Box::new(unsafe {
            SubRegion::new(base.add(layout.counters_values_offset), counters_values_length)
        });
        let counters = CountersManager::new(counters_metadata, counters_values, config.counters_capacity);

        let error_log_region: Box<dyn SharedMemoryBackend> =
            Box::new(unsafe { SubRegion::new(base.add(layout.error_log_offset), error_log_length) });
        let error_log = DistinctErrorLog::new(error_log_region, config.error_log_capacity);

        let (sender_commands_backing, sender_commands) = new_agent_ring();
        let (receiver_commands_backing, receiver_commands) = new_agent_ring();
        let (receiver_events_backing, receiver_events) = new_agent_ring();

        Ok(Self {
            _cnc: cnc,
            header,
            to_driver_commands,
            to_clients_events,
            counters,
            error_log,
            _sender_commands_backing: sender_commands_backing,
            sender_commands,
            _receiver_commands_backing: receiver_commands_backing,
            receiver_commands,
            _receiver_events_backing: receiver_events_backing,
            receiver_events,
        })
    }

    pub fn header(&self) -> &CncHeader {
        &self.header
    }

    pub fn to_driver_commands(&self) -> &ManyToOneRingBuffer {
        &self.to_driver_commands
    }

    pub fn to_clients_events(&self) -> &BroadcastTransmitter {
        &self.to_clients_events
    }

    pub fn counters(&self) -> &CountersManager {
        &self.counters
    }

    pub fn error_log(&self) -> &DistinctErrorLog {
        &self.error_log
    }

    pub fn sender_commands(&self) -> &OneToOneRingBuffer {
        &self.sender_commands
    }

    pub fn receiver_commands(&self) -> &OneToOneRingBuffer {
        &self.receiver_commands
    }

    pub fn receiver_events(&self) -> &OneToOneRingBuffer {
        &self.receiver_events
    }

    pub fn record_error(&self, error_code: i32, stack_location: &str, message: &str) {
        if !self.error_log.record(error_code, stack_location, message, now_ns()) {
            tracing::warn!(error_code, stack_location, message, "distinct error log is full, dropping");
        }
    }
}

impl Drop for DriverDirectory {
    fn drop(&mut self) {
        self.header.set_active(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config(dir: &Path) -> MediaDriverConfig {
        let mut config = MediaDriverConfig::parse_from(["mediadriverd"]);
        config.driver_directory = dir.to_path_buf();
        config.to_driver_buffer_length = 4096;
        config.to_clients_buffer_length = 4096;
        config.counters_capacity = 8;
        config.error_log_capacity = 8;
        config
    }

    #[test]
    fn create_marks_the_directory_active_and_populates_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let directory = DriverDirectory::create(&config).unwrap();
        assert!(directory.header().is_active());
        assert_eq!(directory.header().to_driver_buffer_length(), 4096);
    }

    #[test]
    fn second_create_against_a_still_active_directory_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let _first = DriverDirectory::create(&config).unwrap();
        assert!(DriverDirectory::create(&config).is_err());
    }

    #[test]
    fn create_after_drop_succeeds_since_active_flag_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        {
            let _first = DriverDirectory::create(&config).unwrap();
        }
        assert!(DriverDirectory::create(&config).is_ok());
    }

    #[test]
    fn to_driver_commands_ring_is_usable_after_construction() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let directory = DriverDirectory::create(&config).unwrap();
        assert!(directory.to_driver_commands().write(1, b"hello"));
        let mut seen = Vec::new();
        directory.to_driver_commands().read(|t, p| seen.push((t, p.to_vec())), 10);
        assert_eq!(seen, vec![(1, b"hello".to_vec())]);
    }

    #[test]
    fn counters_and_error_log_live_in_the_same_mapping_without_clobbering_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let directory = DriverDirectory::create(&config).unwrap();

        let counter = directory.counters().allocate(1, "bytes_sent", b"pub-1").unwrap();
        counter.set(99);
        directory.record_error(7, "sender.rs:1", "boom");

        assert_eq!(counter.load(), 99);
        assert_eq!(directory.error_log().iter().len(), 1);
    }
}
