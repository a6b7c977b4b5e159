//! Patches a receiver-side gap that loss detection has given up retrying
//! (NAK retry budget exhausted, or the sender reported end-of-stream
//! before the gap could be filled) so downstream consumers are not stuck
//! behind data that will never arrive.
//!
//! Same padding-frame mechanism as `term_unblocker`, driven by an
//! explicit [`Gap`](crate::LogBuffer::term_gap_scanner::Gap) instead of a
//! scan.

use crate::LogBuffer::frame_descriptor::{FrameType, FrameWriter, UNFRAGMENTED};
use crate::LogBuffer::term_gap_scanner::Gap;

/// Write a single padding frame covering `gap` so a stalled consumer can
/// scan past it.
pub fn fill_gap(term_buffer: &mut [u8], gap: Gap, term_id: i32, session_id: i32, stream_id: i32) {
    let mut writer = FrameWriter::new(&mut term_buffer[gap.term_offset as usize..]);
    writer.set_header(
        FrameType::Pad,
        UNFRAGMENTED,
        gap.term_offset,
        session_id,
        stream_id,
        term_id,
        0,
    );
    writer.commit(gap.length);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogBuffer::frame_descriptor::FrameView;

    #[test]
    fn fill_gap_writes_a_padding_frame_spanning_the_whole_gap() {
        let mut term = vec![0u8; 128];
        let gap = Gap { term_offset: 32, length: 64 };
        fill_gap(&mut term, gap, 5, 11, 22);

        let view = FrameView::new(&term[32..]);
        assert_eq!(view.frame_length(), 64);
        assert_eq!(view.frame_type(), Some(FrameType::Pad));
        assert_eq!(view.term_id(), 5);
        assert_eq!(view.session_id(), 11);
        assert_eq!(view.stream_id(), 22);
    }
}
