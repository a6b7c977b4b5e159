//! Shared-memory counters manager.
//!
//! Counters are a fixed-size array of 8-byte values, each with a metadata
//! record (key bytes, label). Counters are identified by a stable integer
//! id and readers load them without locks using acquire loads; only the
//! owning writer ever stores to a given counter's value slot.
//!
//! A global header plus a fixed-capacity table, guarded by a
//! `parking_lot::Mutex` only on the (rare) allocation path.

use std::sync::atomic::{AtomicI64, Ordering};

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

use crate::Core::SharedMemory::SharedMemoryBackend;

/// Maximum label length stored per counter, in bytes.
pub const LABEL_LENGTH: usize = 128;
/// Maximum key-blob length stored per counter, in bytes.
pub const KEY_LENGTH: usize = 64;

/// Metadata describing one counter slot.
#[repr(C)]
struct CounterMetadata {
    /// 0 = unused, 1 = allocated.
    state: AtomicI64,
    type_id: i64,
    label_len: u32,
    label: [u8; LABEL_LENGTH],
    key_len: u32,
    key: [u8; KEY_LENGTH],
}

const UNUSED: i64 = 0;
const ALLOCATED: i64 = 1;

/// Manages a shared-memory region holding a table of named 64-bit counters.
pub struct CountersManager {
    metadata: Box<dyn SharedMemoryBackend>,
    values: Box<dyn SharedMemoryBackend>,
    capacity: usize,
    alloc_lock: Mutex<()>,
}

/// A handle to one allocated counter. Cheap to clone (just an index plus
/// raw pointers into the manager's regions), `Sync` because all stores to
/// `value()` are expected to come from the single owning agent.
#[derive(Clone, Copy)]
pub struct Counter {
    id: i32,
    value_ptr: *const CachePadded<AtomicI64>,
}

unsafe impl Send for Counter {}
unsafe impl Sync for Counter {}

impl Counter {
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Writer-private store. Only the agent that owns this counter may call
    /// this; everyone else must use `load`.
    #[inline]
    pub fn set(&self, value: i64) {
        unsafe { (*self.value_ptr).store(value, Ordering::Release) };
    }

    #[inline]
    pub fn add(&self, delta: i64) -> i64 {
        unsafe { (*self.value_ptr).fetch_add(delta, Ordering::AcqRel) }
    }

    /// Lock-free read available to any reader (clients included).
    #[inline]
    pub fn load(&self) -> i64 {
        unsafe { (*self.value_ptr).load(Ordering::Acquire) }
    }
}

impl CountersManager {
    /// Wrap two already-mapped regions: one for per-counter metadata, one
    /// for the packed, cache-padded i64 values. `capacity` is the number of
    /// counter slots both regions were sized for.
    pub fn new(
        metadata: Box<dyn SharedMemoryBackend>,
        values: Box<dyn SharedMemoryBackend>,
        capacity: usize,
    ) -> Self {
        Self {
            metadata,
            values,
            capacity,
            alloc_lock: Mutex::new(()),
        }
    }

    pub fn metadata_buffer_length(capacity: usize) -> usize {
        capacity * std::mem::size_of::<CounterMetadata>()
    }

    pub fn values_buffer_length(capacity: usize) -> usize {
        capacity * std::mem::size_of::<CachePadded<AtomicI64>>()
    }

    fn metadata_slot(&self, id: i32) -> *mut CounterMetadata {
        unsafe {
            (self.metadata.as_ptr() as *mut CounterMetadata).add(id as usize)
        }
    }

    fn value_slot(&self, id: i32) -> *const CachePadded<AtomicI64> {
        unsafe {
            (self.values.as_ptr() as *const CachePadded<AtomicI64>).add(id as usize)
        }
    }

    /// Allocate a new counter with the given type id, label and key bytes.
    /// Returns `None` if the table is full.
    pub fn allocate(&self, type_id: i64, label: &str, key: &[u8]) -> Option<Counter> {
        let _guard = self.alloc_lock.lock();

        for id in 0..self.capacity as i32 {
            let meta = self.metadata_slot(id);
            let state = unsafe { &(*meta).state };
            if state.load(Ordering::Acquire) == UNUSED {
                let label_bytes = label.as_bytes();
                let label_len = label_bytes.len().min(LABEL_LENGTH);
                let key_len = key.len().min(KEY_LENGTH);

                unsafe {
                    (*meta).type_id = type_id;
                    (*meta).label_len = label_len as u32;
                    (*meta).label[..label_len].copy_from_slice(&label_bytes[..label_len]);
                    (*meta).key_len = key_len as u32;
                    (*meta).key[..key_len].copy_from_slice(&key[..key_len]);
                }

                // Reset the value slot before publishing the slot as allocated.
                let value = self.value_slot(id);
                unsafe { (*value).store(0, Ordering::Relaxed) };

                state.store(ALLOCATED, Ordering::Release);

                return Some(Counter {
                    id,
                    value_ptr: value,
                });
            }
        }
        None
    }

    /// Free a previously allocated counter, making its slot available again.
    pub fn free(&self, counter: Counter) {
        let _guard = self.alloc_lock.lock();
        let meta = self.metadata_slot(counter.id);
        unsafe { &(*meta).state }.store(UNUSED, Ordering::Release);
    }

    /// Read the label of a counter by id, for diagnostics/clients.
    pub fn label(&self, id: i32) -> Option<String> {
        if id < 0 || id as usize >= self.capacity {
            return None;
        }
        let meta = self.metadata_slot(id);
        unsafe {
            if (*meta).state.load(Ordering::Acquire) != ALLOCATED {
                return None;
            }
            let len = (*meta).label_len as usize;
            Some(String::from_utf8_lossy(&(*meta).label[..len]).into_owned())
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

unsafe impl Send for CountersManager {}
unsafe impl Sync for CountersManager {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Core::SharedMemory::{create_file_backed, SharedMemoryBackend};

    fn backend(size: usize) -> Box<dyn SharedMemoryBackend> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region.dat");
        let b = create_file_backed(&path, size).unwrap();
        std::mem::forget(dir); // keep the backing file alive for the test
        b
    }

    fn manager(capacity: usize) -> CountersManager {
        let meta = backend(CountersManager::metadata_buffer_length(capacity));
        let values = backend(CountersManager::values_buffer_length(capacity));
        CountersManager::new(meta, values, capacity)
    }

    #[test]
    fn allocate_set_and_load_round_trips() {
        let mgr = manager(4);
        let counter = mgr.allocate(1, "bytes_sent", b"pub-1").unwrap();
        counter.set(42);
        assert_eq!(counter.load(), 42);
        assert_eq!(mgr.label(counter.id()).unwrap(), "bytes_sent");
    }

    #[test]
    fn free_slot_is_reused() {
        let mgr = manager(1);
        let c1 = mgr.allocate(1, "a", b"").unwrap();
        assert!(mgr.allocate(1, "b", b"").is_none());
        mgr.free(c1);
        let c2 = mgr.allocate(1, "c", b"").unwrap();
        assert_eq!(c2.id(), 0);
        assert_eq!(mgr.label(c2.id()).unwrap(), "c");
    }

    #[test]
    fn add_is_atomic_read_modify_write() {
        let mgr = manager(1);
        let counter = mgr.allocate(1, "x", b"").unwrap();
        counter.add(5);
        counter.add(7);
        assert_eq!(counter.load(), 12);
    }
}
