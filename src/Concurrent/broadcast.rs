//! Broadcast transmitter: one producer, many independent readers with their
//! own cursors. Producers never block on readers; a reader that falls more
//! than `capacity - message_length` behind is lapped and must resynchronise
//! from the current tail. Used for the driver's broadcast-to-clients ring,
//! where every attached client is an independent reader of the same event
//! stream.
//!
//! Tail, tail-intent and latest counters sit in a cache-padded trailer
//! past the data region. A reader whose cursor falls behind `tail -
//! capacity` cannot trust the records it would read and must jump forward
//! instead.

use std::sync::atomic::{AtomicI64, Ordering};

use crossbeam_utils::CachePadded;

use crate::Core::bit_util::{align, is_power_of_two};

pub const HEADER_LENGTH: i32 = 8;
pub const ALIGNMENT: i32 = HEADER_LENGTH;
pub const PADDING_MSG_TYPE_ID: i32 = -1;

/// Transmitter side: the sole producer. Writes proceed unconditionally --
/// there is no backpressure from readers. A reader too slow to keep up
/// simply gets lapped.
pub struct BroadcastTransmitter {
    buffer: *mut u8,
    capacity: i64,
    mask: i64,
    tail_intent: CachePadded<AtomicI64>,
    tail: CachePadded<AtomicI64>,
    latest: CachePadded<AtomicI64>,
}

unsafe impl Send for BroadcastTransmitter {}
unsafe impl Sync for BroadcastTransmitter {}

impl BroadcastTransmitter {
    /// `buffer` must point at a region of at least `capacity` bytes kept
    /// alive for the lifetime of this transmitter. `capacity` must be a
    /// power of two.
    ///
    /// # Safety
    /// Caller guarantees `buffer` is valid, writable, for `capacity` bytes.
    pub unsafe fn new(buffer: *mut u8, capacity: usize) -> Self {
        assert!(
            is_power_of_two(capacity as i64),
            "broadcast buffer capacity must be a power of two"
        );
        Self {
            buffer,
            capacity: capacity as i64,
            mask: capacity as i64 - 1,
            tail_intent: CachePadded::new(AtomicI64::new(0)),
            tail: CachePadded::new(AtomicI64::new(0)),
            latest: CachePadded::new(AtomicI64::new(0)),
        }
    }

    fn record_ptr(&self, index: i64) -> *mut u8 {
        unsafe { self.buffer.add(index as usize) }
    }

    /// Broadcast one message. Never blocks and never fails -- a lagging
    /// reader simply observes `lapped` on its next read.
    pub fn transmit(&self, msg_type_id: i32, payload: &[u8]) {
        assert!(msg_type_id >= 0);
        let record_len = align(HEADER_LENGTH + payload.len() as i32, ALIGNMENT) as i64;
        let tail = self.tail.load(Ordering::Relaxed);

        // Publish intent before writing so a reader that laps us mid-write
        // can tell (via `tail_intent`) that a record is in flight.
        self.tail_intent.store(tail + record_len, Ordering::Relaxed);

        let to_buffer_end = self.capacity - (tail & self.mask);
        let write_tail = if to_buffer_end < record_len {
            let padding_index = (tail & self.mask) as i64;
            unsafe {
                let hdr = self.record_ptr(padding_index) as *mut i32;
                hdr.write(to_buffer_end as i32);
                hdr.add(1).write(PADDING_MSG_TYPE_ID);
            }
            tail + to_buffer_end
        } else {
            tail
        };
        let write_index = (write_tail & self.mask) as i64;
        unsafe {
            let hdr = self.record_ptr(write_index) as *mut i32;
            hdr.write(record_len as i32);
            hdr.add(1).write(msg_type_id);
            std::ptr::copy_nonoverlapping(
                payload.as_ptr(),
                self.record_ptr(write_index).add(HEADER_LENGTH as usize),
                payload.len(),
            );
        }
        self.latest.store(write_tail, Ordering::Relaxed);
        self.tail.store(write_tail + record_len, Ordering::Release);
    }

    pub fn capacity(&self) -> i64 {
        self.capacity
    }
}

/// One reader's independent view of a [`BroadcastTransmitter`]'s buffer.
/// Each reader owns its own cursor and never coordinates with other
/// readers.
pub struct BroadcastReceiver {
    buffer: *const u8,
    capacity: i64,
    mask: i64,
    tail_ptr: *const CachePadded<AtomicI64>,
    latest_ptr: *const CachePadded<AtomicI64>,
    cursor: i64,
    lapped_count: u64,
}

unsafe impl Send for BroadcastReceiver {}

impl BroadcastReceiver {
    /// # Safety
    /// `transmitter` must outlive this receiver.
    pub unsafe fn new(transmitter: &BroadcastTransmitter) -> Self {
        let cursor = transmitter.latest.load(Ordering::Acquire);
        Self {
            buffer: transmitter.buffer,
            capacity: transmitter.capacity,
            mask: transmitter.mask,
            tail_ptr: &transmitter.tail as *const _,
            latest_ptr: &transmitter.latest as *const _,
            cursor,
            lapped_count: 0,
        }
    }

    fn tail(&self) -> i64 {
        unsafe { (*self.tail_ptr).load(Ordering::Acquire) }
    }

    fn latest(&self) -> i64 {
        unsafe { (*self.latest_ptr).load(Ordering::Acquire) }
    }

    /// Number of times this receiver has been lapped since creation.
    pub fn lapped_count(&self) -> u64 {
        self.lapped_count
    }

    /// Poll for the next message. Returns:
    /// - `Some((msg_type_id, payload))` if a new record is available,
    /// - `None` if there is nothing new yet,
    /// and internally resynchronises (counted in `lapped_count`) if this
    /// reader fell too far behind to trust what it was about to read.
    pub fn receive_next(&mut self) -> Option<(i32, &[u8])> {
        let tail = self.tail();
        if tail == self.cursor {
            return None;
        }

        if tail - self.cursor > self.capacity {
            // We've been lapped: the producer has wrapped all the way
            // around past anything we could still safely read. Resync to
            // the current latest record rather than reading stale/partly
            // overwritten bytes.
            self.lapped_count += 1;
            self.cursor = self.latest();
            return None;
        }

        let index = (self.cursor & self.mask) as usize;
        unsafe {
            let hdr = self.buffer.add(index) as *const i32;
            let length = hdr.read();
            let msg_type_id = hdr.add(1).read();

            self.cursor += length as i64;

            if msg_type_id == PADDING_MSG_TYPE_ID {
                return self.receive_next();
            }

            let payload_len = (length - HEADER_LENGTH) as usize;
            let payload = std::slice::from_raw_parts(
                self.buffer.add(index + HEADER_LENGTH as usize),
                payload_len,
            );
            Some((msg_type_id, payload))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_pair(capacity: usize) -> (Vec<u8>, BroadcastTransmitter) {
        let mut mem = vec![0u8; capacity];
        let tx = unsafe { BroadcastTransmitter::new(mem.as_mut_ptr(), capacity) };
        (mem, tx)
    }

    #[test]
    fn receiver_sees_messages_in_order() {
        let (_mem, tx) = new_pair(1024);
        let mut rx = unsafe { BroadcastReceiver::new(&tx) };

        tx.transmit(1, b"one");
        tx.transmit(2, b"two");

        let (t1, p1) = rx.receive_next().unwrap();
        assert_eq!((t1, p1), (1, b"one".as_slice()));
        let (t2, p2) = rx.receive_next().unwrap();
        assert_eq!((t2, p2), (2, b"two".as_slice()));
        assert!(rx.receive_next().is_none());
    }

    #[test]
    fn slow_reader_gets_lapped_and_resyncs() {
        let (_mem, tx) = new_pair(128);
        let mut rx = unsafe { BroadcastReceiver::new(&tx) };

        // Each record here is 8 (header) + 8 (payload) = 16 bytes; writing
        // enough of them wraps the 128-byte buffer several times over
        // before the reader ever polls.
        for i in 0..20u64 {
            tx.transmit(3, &i.to_le_bytes());
        }

        assert!(rx.receive_next().is_none());
        assert_eq!(rx.lapped_count(), 1);

        // After resync, further new messages are visible again.
        tx.transmit(4, b"fresh!!!");
        let (t, p) = rx.receive_next().unwrap();
        assert_eq!(t, 4);
        assert_eq!(p, b"fresh!!!");
    }
}
