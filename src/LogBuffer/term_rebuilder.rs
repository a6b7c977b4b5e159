//! Copies a received frame into a receiver-side term buffer at its
//! `term_offset`. Idempotent: a retransmitted frame (duplicate delivery,
//! or a NAK answered twice) that lands on an already-committed slot is a
//! silent no-op rather than a double-write.
//!
//! Uses the same release-last-field discipline as
//! `LogBuffer::frame_descriptor`.

use crate::LogBuffer::frame_descriptor::{FrameView, FrameWriter, HEADER_LENGTH};

/// Insert `frame` (header + body, as received off the wire) into
/// `term_buffer` at `term_offset`. Returns `true` if the frame was newly
/// written, `false` if that offset already held a committed frame (the
/// call was a harmless duplicate).
pub fn insert_frame(term_buffer: &mut [u8], term_offset: i32, frame: &[u8]) -> bool {
    assert!(frame.len() >= HEADER_LENGTH as usize);
    let offset = term_offset as usize;

    {
        let existing = FrameView::new(&term_buffer[offset..]);
        if existing.frame_length() != 0 {
            return false;
        }
    }

    let frame_length = i32::from_le_bytes(frame[0..4].try_into().unwrap());
    // Everything past the frame_length field itself -- version/flags/type,
    // term_offset, session_id, stream_id, term_id, and the body -- gets
    // copied verbatim. frame_length is written last, via commit below, so
    // a concurrent reader never observes the rest of the header without it.
    term_buffer[offset + 4..offset + frame.len()].copy_from_slice(&frame[4..]);

    let mut writer = FrameWriter::new(&mut term_buffer[offset..]);
    writer.commit(frame_length);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogBuffer::frame_descriptor::{FrameType, FrameWriter as Writer, UNFRAGMENTED};

    fn built_frame(payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; 32 + payload.len()];
        let mut w = Writer::new(&mut buf);
        w.set_header(FrameType::Data, UNFRAGMENTED, 0, 11, 22, 3, 0);
        buf[32..].copy_from_slice(payload);
        let mut w = Writer::new(&mut buf);
        w.commit((32 + payload.len()) as i32);
        buf
    }

    #[test]
    fn first_insert_writes_the_frame() {
        let mut term = vec![0u8; 256];
        let frame = built_frame(b"hello");
        assert!(insert_frame(&mut term, 0, &frame));
        let view = FrameView::new(&term);
        assert_eq!(view.frame_length(), 32 + 5);
        assert_eq!(view.session_id(), 11);
        assert_eq!(&term[32..37], b"hello");
    }

    #[test]
    fn duplicate_insert_at_same_offset_is_a_no_op() {
        let mut term = vec![0u8; 256];
        let frame = built_frame(b"hello");
        assert!(insert_frame(&mut term, 0, &frame));
        let snapshot = term.clone();
        assert!(!insert_frame(&mut term, 0, &frame));
        assert_eq!(term, snapshot);
    }
}
