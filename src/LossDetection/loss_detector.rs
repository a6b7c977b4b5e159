//! Receiver-side: watches one image's current gap and decides when to
//! emit a NAK. Backs off exponentially between repeated NAKs for the same
//! gap (the first NAK might just be in flight) and jitters the delay so
//! that, in a multicast group, every receiver doesn't NAK in lockstep.
//!
//! Tracks one entry per distinct gap and bumps a counter instead of
//! re-announcing on every poll, the same dedup-then-count pattern
//! `Core::error_log` uses for repeated faults.

use crate::LogBuffer::term_gap_scanner::Gap;

#[derive(Debug, Clone, Copy)]
pub struct NakRequest {
    pub term_id: i32,
    pub term_offset: i32,
    pub length: i32,
}

struct ActiveGap {
    term_id: i32,
    gap: Gap,
    next_nak_due_ns: i64,
    backoff_ns: i64,
    nak_count: u32,
}

pub struct LossDetector {
    active: Option<ActiveGap>,
    initial_backoff_ns: i64,
    max_backoff_ns: i64,
    group_size: i64,
}

impl LossDetector {
    pub fn new(initial_backoff_ns: i64, max_backoff_ns: i64) -> Self {
        Self::with_group_size(initial_backoff_ns, max_backoff_ns, 1)
    }

    /// `group_size` widens the jitter window applied between repeated
    /// NAKs, so a large multicast group doesn't have every receiver
    /// retry in lockstep after the same backoff.
    pub fn with_group_size(initial_backoff_ns: i64, max_backoff_ns: i64, group_size: u32) -> Self {
        Self {
            active: None,
            initial_backoff_ns,
            max_backoff_ns,
            group_size: group_size.max(1) as i64,
        }
    }

    /// Report the current gap (or lack thereof) for this image. Replaces
    /// whatever gap was being tracked if the term/offset no longer
    /// matches (the old gap must have been filled).
    pub fn on_gap(&mut self, term_id: i32, gap: Option<Gap>, now_ns: i64) {
        match gap {
            None => self.active = None,
            Some(gap) => {
                let same_gap = self
                    .active
                    .as_ref()
                    .is_some_and(|a| a.term_id == term_id && a.gap.term_offset == gap.term_offset);
                if !same_gap {
                    self.active = Some(ActiveGap {
                        term_id,
                        gap,
                        next_nak_due_ns: now_ns,
                        backoff_ns: self.initial_backoff_ns,
                        nak_count: 0,
                    });
                } else if let Some(active) = self.active.as_mut() {
                    active.gap.length = gap.length;
                }
            }
        }
    }

    /// Poll whether a NAK is due right now. Each call that returns
    /// `Some` arms the next backoff window and jitters it so concurrent
    /// receivers in a multicast group don't all retry at once.
    pub fn should_nak(&mut self, now_ns: i64) -> Option<NakRequest> {
        let active = self.active.as_mut()?;
        if now_ns < active.next_nak_due_ns {
            return None;
        }

        let request = NakRequest {
            term_id: active.term_id,
            term_offset: active.gap.term_offset,
            length: active.gap.length,
        };

        active.nak_count += 1;
        active.backoff_ns = (active.backoff_ns * 2).min(self.max_backoff_ns);
        let jitter = fastrand::i64(0..=(active.backoff_ns / 4) * self.group_size);
        active.next_nak_due_ns = now_ns + active.backoff_ns + jitter;

        Some(request)
    }

    pub fn nak_count(&self) -> u32 {
        self.active.as_ref().map_or(0, |a| a.nak_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_nak_fires_immediately_when_gap_reported() {
        let mut ld = LossDetector::new(10_000_000, 1_000_000_000);
        ld.on_gap(3, Some(Gap { term_offset: 64, length: 32 }), 0);
        let nak = ld.should_nak(0).unwrap();
        assert_eq!(nak.term_id, 3);
        assert_eq!(nak.term_offset, 64);
    }

    #[test]
    fn repeated_naks_back_off_exponentially() {
        let mut ld = LossDetector::new(10_000_000, 1_000_000_000);
        ld.on_gap(3, Some(Gap { term_offset: 64, length: 32 }), 0);
        ld.should_nak(0).unwrap();
        assert_eq!(ld.nak_count(), 1);
        // Well before the backoff window elapses, no second NAK fires.
        assert!(ld.should_nak(1_000_000).is_none());
        // Comfortably past even the jittered backoff window, it does.
        assert!(ld.should_nak(10_000_000_000).is_some());
        assert_eq!(ld.nak_count(), 2);
    }

    #[test]
    fn gap_filled_clears_tracking() {
        let mut ld = LossDetector::new(10_000_000, 1_000_000_000);
        ld.on_gap(3, Some(Gap { term_offset: 64, length: 32 }), 0);
        ld.on_gap(3, None, 100);
        assert!(ld.should_nak(100).is_none());
    }
}
