//! SPSC and MPSC ring buffers over a power-of-two byte region with a
//! trailer holding the head/tail counters on separate cache lines.
//!
//! Record layout, identical for both variants: `[length:i32][type:i32][payload...]`
//! aligned to 8 bytes. `length` is written last by the producer (release)
//! and read first by the consumer (acquire); zero length means "not yet
//! committed". A producer claims space with a CAS on `tail` and publishes
//! with a release store of `length`, the same claim-then-release
//! discipline a Vyukov queue uses for fixed slots, just applied to
//! variable-length records; wrap-around is handled with an explicit
//! padding record instead of a modular slot index.

use std::sync::atomic::{AtomicI64, Ordering};

use crossbeam_utils::CachePadded;

use crate::Core::bit_util::{align, is_power_of_two, CACHE_LINE_LENGTH};

/// Header length of each record: a 4-byte length followed by a 4-byte type.
pub const HEADER_LENGTH: i32 = 8;
/// All records (and padding records) are aligned to this many bytes.
pub const ALIGNMENT: i32 = HEADER_LENGTH;
/// Message type id reserved for wrap-padding records.
pub const PADDING_MSG_TYPE_ID: i32 = -1;
/// Bytes reserved after the data region for the head/tail cursors.
pub const TRAILER_LENGTH: usize = 2 * CACHE_LINE_LENGTH;

/// Outcome of a single `read` call.
pub enum ReadOutcome {
    /// No committed record was available.
    Empty,
    /// One record was read and its consumer-side bytes consumed.
    Consumed,
}

/// Common ring-buffer surface shared by the SPSC and MPSC variants. Kept as
/// a trait (rather than an enum) so call sites that only care about "is
/// this a queue I can write length-prefixed records into" don't need to
/// know which claim strategy backs it -- the sender/receiver proxies,
/// for instance, are written once against this trait and reused for
/// command rings that happen to be SPSC and ones that happen to be MPSC.
pub trait RingBuffer {
    /// Capacity of the data region, in bytes (always a power of two).
    fn capacity(&self) -> i64;

    /// Largest single message this ring buffer can ever hold.
    fn max_msg_length(&self) -> i32 {
        (self.capacity() / 8) as i32
    }

    /// Write `msg_type_id` and `payload` as one record. Returns `false` if
    /// there isn't currently room (the caller should back off and retry).
    fn write(&self, msg_type_id: i32, payload: &[u8]) -> bool;

    /// Read committed records, invoking `handler(msg_type_id, payload)` for
    /// each one, until either the ring is drained or `limit` records have
    /// been handled. Returns the number of records handled.
    fn read<F: FnMut(i32, &[u8])>(&self, handler: F, limit: usize) -> usize;
}

struct Layout {
    buffer: *mut u8,
    capacity: usize,
    mask: usize,
}

impl Layout {
    fn new(buffer: *mut u8, capacity: usize) -> Self {
        assert!(
            is_power_of_two(capacity as i64),
            "ring buffer capacity must be a power of two"
        );
        Self {
            buffer,
            capacity,
            mask: capacity - 1,
        }
    }

    #[inline]
    fn tail_counter(&self) -> &CachePadded<AtomicI64> {
        unsafe { &*(self.buffer.add(self.capacity) as *const CachePadded<AtomicI64>) }
    }

    #[inline]
    fn head_counter(&self) -> &CachePadded<AtomicI64> {
        unsafe {
            &*(self
                .buffer
                .add(self.capacity + CACHE_LINE_LENGTH) as *const CachePadded<AtomicI64>)
        }
    }

    #[inline]
    fn length_field(&self, index: usize) -> &AtomicI64 {
        // The length field is stored as the low 32 bits of an 8-byte slot so
        // it can be released/acquired as one atomic word without tearing;
        // the high 32 bits hold the type id.
        unsafe { &*(self.buffer.add(index) as *const AtomicI64) }
    }

    #[inline]
    fn payload_ptr(&self, index: usize) -> *mut u8 {
        unsafe { self.buffer.add(index + HEADER_LENGTH as usize) }
    }

    fn record_length(record_field: i64) -> i32 {
        (record_field & 0xFFFF_FFFF) as i32
    }

    fn record_type(record_field: i64) -> i32 {
        (record_field >> 32) as i32
    }

    fn pack(msg_type_id: i32, length: i32) -> i64 {
        ((msg_type_id as i64) << 32) | (length as i64 & 0xFFFF_FFFF)
    }

    /// Total length occupied by a record (header + payload), aligned up.
    fn aligned_record_length(payload_len: usize) -> i32 {
        align(HEADER_LENGTH + payload_len as i32, ALIGNMENT)
    }
}

/// Single-producer, single-consumer ring buffer. The producer is free to
/// load `tail` with `Relaxed` ordering since only it ever advances it.
pub struct OneToOneRingBuffer {
    layout: Layout,
}

unsafe impl Send for OneToOneRingBuffer {}
unsafe impl Sync for OneToOneRingBuffer {}

impl OneToOneRingBuffer {
    /// `buffer` must point at a region of `capacity + TRAILER_LENGTH` bytes
    /// that the caller keeps alive for the lifetime of this ring buffer.
    pub unsafe fn new(buffer: *mut u8, capacity: usize) -> Self {
        Self {
            layout: Layout::new(buffer, capacity),
        }
    }

    pub fn buffer_length(capacity: usize) -> usize {
        capacity + TRAILER_LENGTH
    }

    fn write_padding(&self, index: usize, to_buffer_end: i32) {
        let field = self.layout.length_field(index);
        field.store(Layout::pack(PADDING_MSG_TYPE_ID, to_buffer_end), Ordering::Release);
    }
}

impl RingBuffer for OneToOneRingBuffer {
    fn capacity(&self) -> i64 {
        self.layout.capacity as i64
    }

    fn write(&self, msg_type_id: i32, payload: &[u8]) -> bool {
        assert!(msg_type_id >= 0, "message type id must be non-negative");
        let record_len = Layout::aligned_record_length(payload.len());
        let capacity = self.layout.capacity as i64;
        if record_len as i64 > capacity {
            return false;
        }

        let tail_counter = self.layout.tail_counter();
        let head_counter = self.layout.head_counter();

        let tail = tail_counter.load(Ordering::Relaxed);
        let head = head_counter.load(Ordering::Acquire);
        let used = tail - head;
        let to_buffer_end = capacity - (tail & (self.layout.mask as i64));

        if to_buffer_end < record_len as i64 {
            // Not enough contiguous room before wrap: need room for the
            // padding record plus the real record after wrapping.
            if used + to_buffer_end + record_len as i64 > capacity {
                return false;
            }
            let index = (tail & self.layout.mask as i64) as usize;
            self.write_padding(index, to_buffer_end as i32);
            tail_counter.store(tail + to_buffer_end, Ordering::Release);

            return self.write(msg_type_id, payload);
        }

        if used + record_len as i64 > capacity {
            return false;
        }

        let index = (tail & self.layout.mask as i64) as usize;
        unsafe {
            std::ptr::copy_nonoverlapping(
                payload.as_ptr(),
                self.layout.payload_ptr(index),
                payload.len(),
            );
        }
        let field = self.layout.length_field(index);
        field.store(Layout::pack(msg_type_id, record_len), Ordering::Release);
        tail_counter.store(tail + record_len as i64, Ordering::Release);
        true
    }

    fn read<F: FnMut(i32, &[u8])>(&self, mut handler: F, limit: usize) -> usize {
        let head_counter = self.layout.head_counter();
        let tail_counter = self.layout.tail_counter();

        let mut head = head_counter.load(Ordering::Relaxed);
        let tail = tail_counter.load(Ordering::Acquire);
        let mut handled = 0;

        while handled < limit && head < tail {
            let index = (head & self.layout.mask as i64) as usize;
            let field = self.layout.length_field(index);
            let packed = field.load(Ordering::Acquire);
            let record_len = Layout::record_length(packed);
            if record_len <= 0 {
                // Not yet committed -- single retry only, never spin here.
                break;
            }
            let msg_type_id = Layout::record_type(packed);
            if msg_type_id != PADDING_MSG_TYPE_ID {
                let payload_len = (record_len - HEADER_LENGTH) as usize;
                let payload =
                    unsafe { std::slice::from_raw_parts(self.layout.payload_ptr(index), payload_len) };
                handler(msg_type_id, payload);
                handled += 1;
            }
            // Zero the slot so a stale length can never be misread before
            // the producer wraps back around to it.
            field.store(0, Ordering::Relaxed);
            head += record_len as i64;
        }

        if handled > 0 || head != head_counter.load(Ordering::Relaxed) {
            head_counter.store(head, Ordering::Release);
        }
        handled
    }
}

/// Multi-producer, single-consumer ring buffer. Producers claim space via
/// CAS on `tail`; a producer that straddles the end of the buffer writes
/// the padding record itself before retrying, exactly as a single producer
/// would, just guarded by the CAS instead of assumed exclusivity.
pub struct ManyToOneRingBuffer {
    layout: Layout,
}

unsafe impl Send for ManyToOneRingBuffer {}
unsafe impl Sync for ManyToOneRingBuffer {}

impl ManyToOneRingBuffer {
    /// # Safety
    /// `buffer` must point at a region of `capacity + TRAILER_LENGTH` bytes
    /// kept alive for the lifetime of this ring buffer.
    pub unsafe fn new(buffer: *mut u8, capacity: usize) -> Self {
        Self {
            layout: Layout::new(buffer, capacity),
        }
    }

    pub fn buffer_length(capacity: usize) -> usize {
        capacity + TRAILER_LENGTH
    }
}

impl RingBuffer for ManyToOneRingBuffer {
    fn capacity(&self) -> i64 {
        self.layout.capacity as i64
    }

    fn write(&self, msg_type_id: i32, payload: &[u8]) -> bool {
        assert!(msg_type_id >= 0, "message type id must be non-negative");
        let record_len = Layout::aligned_record_length(payload.len());
        let capacity = self.layout.capacity as i64;
        if record_len as i64 > capacity {
            return false;
        }

        let tail_counter = self.layout.tail_counter();
        let head_counter = self.layout.head_counter();

        loop {
            let tail = tail_counter.load(Ordering::Relaxed);
            let head = head_counter.load(Ordering::Acquire);
            let used = tail - head;
            let to_buffer_end = capacity - (tail & (self.layout.mask as i64));

            let (claim_len, padding) = if to_buffer_end < record_len as i64 {
                if used + to_buffer_end > capacity {
                    return false;
                }
                (to_buffer_end, true)
            } else {
                if used + record_len as i64 > capacity {
                    return false;
                }
                (record_len as i64, false)
            };

            if tail_counter
                .compare_exchange_weak(tail, tail + claim_len, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                std::hint::spin_loop();
                continue;
            }

            let index = (tail & self.layout.mask as i64) as usize;
            if padding {
                let field = self.layout.length_field(index);
                field.store(
                    Layout::pack(PADDING_MSG_TYPE_ID, claim_len as i32),
                    Ordering::Release,
                );
                // Retry the real write now that we've wrapped.
                continue;
            }

            unsafe {
                std::ptr::copy_nonoverlapping(
                    payload.as_ptr(),
                    self.layout.payload_ptr(index),
                    payload.len(),
                );
            }
            let field = self.layout.length_field(index);
            field.store(Layout::pack(msg_type_id, claim_len as i32), Ordering::Release);
            return true;
        }
    }

    fn read<F: FnMut(i32, &[u8])>(&self, mut handler: F, limit: usize) -> usize {
        let head_counter = self.layout.head_counter();
        let tail_counter = self.layout.tail_counter();

        let mut head = head_counter.load(Ordering::Relaxed);
        let tail = tail_counter.load(Ordering::Acquire);
        let mut handled = 0;

        while handled < limit && head < tail {
            let index = (head & self.layout.mask as i64) as usize;
            let field = self.layout.length_field(index);
            let packed = field.load(Ordering::Acquire);
            let record_len = Layout::record_length(packed);
            if record_len <= 0 {
                break;
            }
            let msg_type_id = Layout::record_type(packed);
            if msg_type_id != PADDING_MSG_TYPE_ID {
                let payload_len = (record_len - HEADER_LENGTH) as usize;
                let payload =
                    unsafe { std::slice::from_raw_parts(self.layout.payload_ptr(index), payload_len) };
                handler(msg_type_id, payload);
                handled += 1;
            }
            field.store(0, Ordering::Relaxed);
            head += record_len as i64;
        }

        if handled > 0 || head != head_counter.load(Ordering::Relaxed) {
            head_counter.store(head, Ordering::Release);
        }
        handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_one_to_one(capacity: usize) -> (Vec<u8>, OneToOneRingBuffer) {
        let mut mem = vec![0u8; OneToOneRingBuffer::buffer_length(capacity)];
        let rb = unsafe { OneToOneRingBuffer::new(mem.as_mut_ptr(), capacity) };
        (mem, rb)
    }

    fn new_many_to_one(capacity: usize) -> (Vec<u8>, ManyToOneRingBuffer) {
        let mut mem = vec![0u8; ManyToOneRingBuffer::buffer_length(capacity)];
        let rb = unsafe { ManyToOneRingBuffer::new(mem.as_mut_ptr(), capacity) };
        (mem, rb)
    }

    #[test]
    fn spsc_write_then_read_round_trips_payload() {
        let (_mem, rb) = new_one_to_one(1024);
        assert!(rb.write(7, b"hello"));

        let mut seen = Vec::new();
        let handled = rb.read(
            |msg_type_id, payload| seen.push((msg_type_id, payload.to_vec())),
            10,
        );
        assert_eq!(handled, 1);
        assert_eq!(seen, vec![(7, b"hello".to_vec())]);
    }

    #[test]
    fn spsc_wraps_with_padding_record() {
        let (_mem, rb) = new_one_to_one(64);
        // Fill most of the buffer, drain it, then write something that
        // would straddle the end -- forcing a padding record and wrap.
        for _ in 0..3 {
            assert!(rb.write(1, &[0u8; 16]));
        }
        let mut count = 0;
        rb.read(|_, _| count += 1, 10);
        assert_eq!(count, 3);

        assert!(rb.write(2, &[9u8; 20]));
        let mut seen = Vec::new();
        rb.read(|t, p| seen.push((t, p.to_vec())), 10);
        assert_eq!(seen, vec![(2, vec![9u8; 20])]);
    }

    #[test]
    fn spsc_rejects_writes_larger_than_capacity() {
        let (_mem, rb) = new_one_to_one(64);
        assert!(!rb.write(1, &[0u8; 128]));
    }

    #[test]
    fn mpsc_many_producers_single_consumer_sees_every_record_once() {
        use std::sync::Arc;
        use std::thread;

        let capacity = 1 << 16;
        let mem = Arc::new(parking_lot::Mutex::new(vec![
            0u8;
            ManyToOneRingBuffer::buffer_length(capacity)
        ]));
        let ptr = mem.lock().as_mut_ptr();
        let rb = Arc::new(unsafe { ManyToOneRingBuffer::new(ptr, capacity) });

        let producers = 8;
        let per_producer = 200;
        let mut handles = Vec::new();
        for p in 0..producers {
            let rb = Arc::clone(&rb);
            handles.push(thread::spawn(move || {
                for i in 0..per_producer {
                    let payload = (p * per_producer + i) as u32;
                    while !rb.write(1, &payload.to_le_bytes()) {
                        std::hint::spin_loop();
                    }
                }
            }));
        }

        let mut received = Vec::new();
        let mut remaining = producers * per_producer;
        while remaining > 0 {
            let handled = rb.read(
                |_, payload| {
                    received.push(u32::from_le_bytes(payload.try_into().unwrap()));
                },
                1024,
            );
            remaining -= handled;
        }

        for h in handles {
            h.join().unwrap();
        }

        received.sort_unstable();
        let expected: Vec<u32> = (0..(producers * per_producer) as u32).collect();
        assert_eq!(received, expected);
    }
}
