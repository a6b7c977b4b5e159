//! Distinct error log: a shared-memory, de-duplicated record of driver
//! errors, keyed by `(error_code, first_stack_location, message_prefix)` so
//! a storm of identical faults doesn't grow the log unboundedly. One mmap'd
//! region, a linear scan of a fixed-size table, a `parking_lot::Mutex` on
//! the write path, and `sha2` to reduce the dedup key to a fixed-size
//! digest.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::Core::SharedMemory::SharedMemoryBackend;

const MESSAGE_LENGTH: usize = 256;

#[repr(C)]
struct ErrorRecord {
    in_use: AtomicU32,
    observation_count: AtomicU32,
    first_observation_ns: AtomicI64,
    last_observation_ns: AtomicI64,
    error_code: i32,
    dedup_key: [u8; 32],
    message_len: u32,
    message: [u8; MESSAGE_LENGTH],
}

/// One entry as read back by a client or diagnostic tool.
#[derive(Debug, Clone)]
pub struct ErrorObservation {
    pub error_code: i32,
    pub observation_count: u32,
    pub first_observation_ns: i64,
    pub last_observation_ns: i64,
    pub message: String,
}

pub struct DistinctErrorLog {
    region: Box<dyn SharedMemoryBackend>,
    capacity: usize,
    write_lock: Mutex<()>,
}

fn dedup_key(error_code: i32, stack_location: &str, message_prefix: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(error_code.to_le_bytes());
    hasher.update(stack_location.as_bytes());
    hasher.update(message_prefix.as_bytes());
    hasher.finalize().into()
}

impl DistinctErrorLog {
    pub fn buffer_length(capacity: usize) -> usize {
        capacity * std::mem::size_of::<ErrorRecord>()
    }

    pub fn new(region: Box<dyn SharedMemoryBackend>, capacity: usize) -> Self {
        Self {
            region,
            capacity,
            write_lock: Mutex::new(()),
        }
    }

    fn slot(&self, index: usize) -> *mut ErrorRecord {
        unsafe { (self.region.as_ptr() as *mut ErrorRecord).add(index) }
    }

    /// Record an observation of `error_code` at `stack_location` with
    /// `message`, at time `now_ns`. If an entry with the same dedup key
    /// already exists, bumps its counter and `last_observation_ns` instead
    /// of allocating a new slot.
    pub fn record(
        &self,
        error_code: i32,
        stack_location: &str,
        message: &str,
        now_ns: i64,
    ) -> bool {
        let key = dedup_key(error_code, stack_location, message);
        let _guard = self.write_lock.lock();

        for i in 0..self.capacity {
            let slot = self.slot(i);
            let in_use = unsafe { &(*slot).in_use };
            if in_use.load(Ordering::Acquire) == 0 {
                // First unused slot: claim it for this new distinct error.
                let msg_bytes = message.as_bytes();
                let msg_len = msg_bytes.len().min(MESSAGE_LENGTH);
                unsafe {
                    (*slot).error_code = error_code;
                    (*slot).dedup_key = key;
                    (*slot).message_len = msg_len as u32;
                    (*slot).message[..msg_len].copy_from_slice(&msg_bytes[..msg_len]);
                    (*slot).first_observation_ns.store(now_ns, Ordering::Relaxed);
                    (*slot).last_observation_ns.store(now_ns, Ordering::Relaxed);
                    (*slot).observation_count.store(1, Ordering::Relaxed);
                }
                in_use.store(1, Ordering::Release);
                return true;
            }

            if unsafe { (*slot).dedup_key } == key {
                unsafe {
                    (*slot).observation_count.fetch_add(1, Ordering::Relaxed);
                    (*slot).last_observation_ns.store(now_ns, Ordering::Relaxed);
                }
                return true;
            }
        }
        // Log is full; the caller counts this as a dropped (transient) error.
        false
    }

    pub fn iter(&self) -> Vec<ErrorObservation> {
        let mut out = Vec::new();
        for i in 0..self.capacity {
            let slot = self.slot(i);
            unsafe {
                if (*slot).in_use.load(Ordering::Acquire) == 0 {
                    continue;
                }
                let len = (*slot).message_len as usize;
                out.push(ErrorObservation {
                    error_code: (*slot).error_code,
                    observation_count: (*slot).observation_count.load(Ordering::Relaxed),
                    first_observation_ns: (*slot).first_observation_ns.load(Ordering::Relaxed),
                    last_observation_ns: (*slot).last_observation_ns.load(Ordering::Relaxed),
                    message: String::from_utf8_lossy(&(*slot).message[..len]).into_owned(),
                });
            }
        }
        out
    }
}

unsafe impl Send for DistinctErrorLog {}
unsafe impl Sync for DistinctErrorLog {}
