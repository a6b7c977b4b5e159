//! Sender side: decide whether to honour an incoming NAK and, once
//! honoured, when to actually re-scan the term buffer and emit the
//! missing range.
//!
//! A NAK does not retransmit immediately. It enters `Delaying` for
//! `delay_ns` -- giving a multicast group time to have its other members'
//! NAKs for the same loss arrive and get suppressed as duplicates -- then
//! becomes `Active` for `linger_ns`, during which further NAKs for the
//! same `(term_id, term_offset)` are dropped outright rather than queued
//! again. The in-flight table is capacity-bounded: once `max_concurrent`
//! entries are outstanding, additional NAKs are rejected and counted
//! rather than queued, the same shape `Core::counters` uses for a bounded
//! table of fixed-size entries.

use std::collections::HashMap;

#[derive(Hash, PartialEq, Eq, Clone, Copy)]
struct RetransmitKey {
    term_id: i32,
    term_offset: i32,
}

#[derive(Clone, Copy)]
enum RetransmitState {
    Delaying { due_ns: i64 },
    Active { linger_until_ns: i64 },
}

struct RetransmitEntry {
    length: i32,
    state: RetransmitState,
}

pub struct RetransmitHandler {
    in_flight: HashMap<RetransmitKey, RetransmitEntry>,
    max_concurrent: usize,
    delay_ns: i64,
    linger_ns: i64,
    dropped_count: u64,
}

impl RetransmitHandler {
    pub fn new(delay_ns: i64, linger_ns: i64, max_concurrent: usize) -> Self {
        Self {
            in_flight: HashMap::new(),
            max_concurrent,
            delay_ns,
            linger_ns,
            dropped_count: 0,
        }
    }

    /// A NAK arrived for `(term_id, term_offset, length)`. Registers a new
    /// `Delaying` entry if there's capacity and none already tracked for
    /// this range; a NAK for a range already `Delaying` or `Active` is a
    /// duplicate and is dropped. A NAK arriving with the table already at
    /// `max_concurrent` is counted in `dropped_count` and dropped.
    pub fn on_nak(&mut self, term_id: i32, term_offset: i32, length: i32, now_ns: i64) {
        let key = RetransmitKey { term_id, term_offset };
        if self.in_flight.contains_key(&key) {
            return;
        }
        if self.in_flight.len() >= self.max_concurrent {
            self.dropped_count += 1;
            return;
        }
        self.in_flight.insert(
            key,
            RetransmitEntry { length, state: RetransmitState::Delaying { due_ns: now_ns + self.delay_ns } },
        );
    }

    /// Advance the state machine: entries whose delay has elapsed move
    /// `Delaying -> Active` and are returned as due for retransmission;
    /// entries whose linger has elapsed are dropped from the table
    /// entirely. Call once per duty cycle.
    pub fn poll_due(&mut self, now_ns: i64) -> Vec<(i32, i32, i32)> {
        let mut due = Vec::new();
        self.in_flight.retain(|key, entry| match entry.state {
            RetransmitState::Delaying { due_ns } => {
                if now_ns < due_ns {
                    return true;
                }
                due.push((key.term_id, key.term_offset, entry.length));
                entry.state = RetransmitState::Active { linger_until_ns: now_ns + self.linger_ns };
                true
            }
            RetransmitState::Active { linger_until_ns } => now_ns < linger_until_ns,
        });
        due
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }
}
