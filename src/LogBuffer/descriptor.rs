//! Layout and accessors for the log metadata region: the fourth segment of
//! a `<registration-id>.logbuffer` file, following the three term
//! partitions. Holds everything a producer and consumer both need to agree
//! on without a term buffer of their own: per-partition tail counters, the
//! active term, immutable geometry (term length, MTU, page size), and a
//! template frame header new terms are initialised from.
//!
//! Grounded on `Core::counters::CountersManager`'s pattern of laying typed
//! fields out over a raw mmap'd region behind `CachePadded<AtomicIxx>`
//! accessors, reused here for the log metadata trailer.

use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};

use crossbeam_utils::CachePadded;

use crate::LogBuffer::frame_descriptor::HEADER_LENGTH as FRAME_HEADER_LENGTH;

pub const PARTITION_COUNT: usize = 3;

/// Size of the metadata region, in bytes. Three tail counters, the active
/// term count, geometry fields, connection/end-of-stream state, and a
/// default frame header template, each cache-line padded where they are
/// contended.
pub const LOG_META_DATA_LENGTH: usize = {
    3 * 64 // term_tail_counters
        + 64 // active_term_count
        + 64 // is_connected
        + 64 // end_of_stream_position
        + 32 // initial_term_id, mtu_length, term_length, page_size, correlation_id (i64)
        + 32 // default_frame_header
};

fn offset_term_tail(index: usize) -> usize {
    index * 64
}
const OFFSET_ACTIVE_TERM_COUNT: usize = 3 * 64;
const OFFSET_IS_CONNECTED: usize = OFFSET_ACTIVE_TERM_COUNT + 64;
const OFFSET_END_OF_STREAM_POSITION: usize = OFFSET_IS_CONNECTED + 64;
const OFFSET_INITIAL_TERM_ID: usize = OFFSET_END_OF_STREAM_POSITION + 64;
const OFFSET_MTU_LENGTH: usize = OFFSET_INITIAL_TERM_ID + 4;
const OFFSET_TERM_LENGTH: usize = OFFSET_MTU_LENGTH + 4;
const OFFSET_PAGE_SIZE: usize = OFFSET_TERM_LENGTH + 4;
const OFFSET_CORRELATION_ID: usize = OFFSET_PAGE_SIZE + 4;
const OFFSET_DEFAULT_FRAME_HEADER: usize = OFFSET_INITIAL_TERM_ID + 32;

/// Pack a term id and term offset into the raw tail value stored per
/// partition: high 32 bits are the term id, low 32 bits the offset.
pub fn pack_tail(term_id: i32, term_offset: i32) -> i64 {
    ((term_id as i64) << 32) | (term_offset as i64 & 0xFFFF_FFFF)
}

pub fn unpack_term_id(raw_tail: i64) -> i32 {
    (raw_tail >> 32) as i32
}

pub fn unpack_term_offset(raw_tail: i64) -> i32 {
    raw_tail as i32
}

/// A typed view over the log metadata region of a mmap'd logbuffer file.
/// Does not own the memory; callers keep the backing mapping alive.
pub struct LogMetadata {
    base: *mut u8,
}

unsafe impl Send for LogMetadata {}
unsafe impl Sync for LogMetadata {}

impl LogMetadata {
    /// # Safety
    /// `base` must point at a writable region of at least
    /// [`LOG_META_DATA_LENGTH`] bytes, valid for as long as this value
    /// lives.
    pub unsafe fn new(base: *mut u8) -> Self {
        Self { base }
    }

    fn atomic_i64(&self, offset: usize) -> &CachePadded<AtomicI64> {
        unsafe { &*(self.base.add(offset) as *const CachePadded<AtomicI64>) }
    }

    fn atomic_i32(&self, offset: usize) -> &CachePadded<AtomicI32> {
        unsafe { &*(self.base.add(offset) as *const CachePadded<AtomicI32>) }
    }

    pub fn raw_tail_volatile(&self, partition_index: usize) -> i64 {
        self.atomic_i64(offset_term_tail(partition_index)).load(Ordering::Acquire)
    }

    pub fn set_raw_tail_ordered(&self, partition_index: usize, value: i64) {
        self.atomic_i64(offset_term_tail(partition_index)).store(value, Ordering::Release);
    }

    pub fn compare_and_set_raw_tail(&self, partition_index: usize, expected: i64, update: i64) -> bool {
        self.atomic_i64(offset_term_tail(partition_index))
            .compare_exchange(expected, update, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn active_term_count(&self) -> i32 {
        self.atomic_i32(OFFSET_ACTIVE_TERM_COUNT).load(Ordering::Acquire)
    }

    pub fn set_active_term_count_ordered(&self, term_count: i32) {
        self.atomic_i32(OFFSET_ACTIVE_TERM_COUNT).store(term_count, Ordering::Release);
    }

    pub fn compare_and_set_active_term_count(&self, expected: i32, update: i32) -> bool {
        self.atomic_i32(OFFSET_ACTIVE_TERM_COUNT)
            .compare_exchange(expected, update, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_connected(&self) -> bool {
        self.atomic_i32(OFFSET_IS_CONNECTED).load(Ordering::Acquire) != 0
    }

    pub fn set_connected(&self, connected: bool) {
        self.atomic_i32(OFFSET_IS_CONNECTED)
            .store(if connected { 1 } else { 0 }, Ordering::Release);
    }

    pub fn end_of_stream_position(&self) -> i64 {
        self.atomic_i64(OFFSET_END_OF_STREAM_POSITION).load(Ordering::Acquire)
    }

    pub fn set_end_of_stream_position(&self, position: i64) {
        self.atomic_i64(OFFSET_END_OF_STREAM_POSITION)
            .store(position, Ordering::Release);
    }

    /// Geometry fields below are written once at creation time and never
    /// mutated afterwards, so plain (non-atomic) reads/writes are safe.

    pub fn initial_term_id(&self) -> i32 {
        unsafe { (self.base.add(OFFSET_INITIAL_TERM_ID) as *const i32).read() }
    }

    pub fn set_initial_term_id(&self, term_id: i32) {
        unsafe { (self.base.add(OFFSET_INITIAL_TERM_ID) as *mut i32).write(term_id) }
    }

    pub fn mtu_length(&self) -> i32 {
        unsafe { (self.base.add(OFFSET_MTU_LENGTH) as *const i32).read() }
    }

    pub fn set_mtu_length(&self, mtu: i32) {
        unsafe { (self.base.add(OFFSET_MTU_LENGTH) as *mut i32).write(mtu) }
    }

    pub fn term_length(&self) -> i32 {
        unsafe { (self.base.add(OFFSET_TERM_LENGTH) as *const i32).read() }
    }

    pub fn set_term_length(&self, term_length: i32) {
        unsafe { (self.base.add(OFFSET_TERM_LENGTH) as *mut i32).write(term_length) }
    }

    pub fn page_size(&self) -> i32 {
        unsafe { (self.base.add(OFFSET_PAGE_SIZE) as *const i32).read() }
    }

    pub fn set_page_size(&self, page_size: i32) {
        unsafe { (self.base.add(OFFSET_PAGE_SIZE) as *mut i32).write(page_size) }
    }

    pub fn correlation_id(&self) -> i64 {
        unsafe { (self.base.add(OFFSET_CORRELATION_ID) as *const i64).read() }
    }

    pub fn set_correlation_id(&self, id: i64) {
        unsafe { (self.base.add(OFFSET_CORRELATION_ID) as *mut i64).write(id) }
    }

    pub fn default_frame_header(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(
                self.base.add(OFFSET_DEFAULT_FRAME_HEADER),
                FRAME_HEADER_LENGTH as usize,
            )
        }
    }

    pub fn default_frame_header_mut(&self) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(
                self.base.add(OFFSET_DEFAULT_FRAME_HEADER),
                FRAME_HEADER_LENGTH as usize,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> (Vec<u8>, LogMetadata) {
        let mut mem = vec![0u8; LOG_META_DATA_LENGTH];
        let md = unsafe { LogMetadata::new(mem.as_mut_ptr()) };
        (mem, md)
    }

    #[test]
    fn geometry_round_trips() {
        let (_mem, md) = metadata();
        md.set_initial_term_id(7);
        md.set_term_length(1 << 16);
        md.set_mtu_length(1408);
        md.set_page_size(4096);
        assert_eq!(md.initial_term_id(), 7);
        assert_eq!(md.term_length(), 1 << 16);
        assert_eq!(md.mtu_length(), 1408);
        assert_eq!(md.page_size(), 4096);
    }

    #[test]
    fn raw_tail_cas_only_succeeds_on_match() {
        let (_mem, md) = metadata();
        md.set_raw_tail_ordered(0, pack_tail(3, 128));
        assert!(!md.compare_and_set_raw_tail(0, pack_tail(3, 64), pack_tail(4, 0)));
        assert!(md.compare_and_set_raw_tail(0, pack_tail(3, 128), pack_tail(4, 0)));
        assert_eq!(unpack_term_id(md.raw_tail_volatile(0)), 4);
    }

    #[test]
    fn default_frame_header_is_writable_template() {
        let (_mem, md) = metadata();
        md.default_frame_header_mut()[0..4].copy_from_slice(&42i32.to_le_bytes());
        assert_eq!(&md.default_frame_header()[0..4], &42i32.to_le_bytes());
    }
}
