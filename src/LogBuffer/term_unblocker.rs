//! Recovers a stalled publication: a producer that claimed space (advanced
//! the tail) and died before committing `frame_length` leaves a permanent
//! hole no consumer can scan past. The conductor periodically checks the
//! position a publication is stuck at and, if nothing has moved for a
//! timeout, patches the hole with a padding frame so consumers can make
//! progress again.
//!
//! Shares its padding-frame technique with `term_gap_filler`, just with a
//! different trigger.

use crate::LogBuffer::frame_descriptor::{FrameType, FrameView, FrameWriter, FRAME_ALIGNMENT, UNFRAGMENTED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnblockStatus {
    /// `block_offset` was already committed; nothing to do.
    NoAction,
    /// A single uncommitted slot was patched with one padding frame.
    Unblocked,
    /// More than one uncommitted slot was patched by one padding frame
    /// spanning all of them.
    UnblockedMultiple,
}

/// Attempt to unblock `term_buffer` at `block_offset`. Scans forward in
/// [`FRAME_ALIGNMENT`] steps (the minimum frame granularity) until it finds
/// a committed frame or `term_length`, then writes a single padding frame
/// covering the whole uncommitted span.
pub fn unblock(
    term_buffer: &mut [u8],
    block_offset: i32,
    term_length: i32,
    term_id: i32,
    session_id: i32,
    stream_id: i32,
) -> UnblockStatus {
    if FrameView::new(&term_buffer[block_offset as usize..]).frame_length() != 0 {
        return UnblockStatus::NoAction;
    }

    let mut next_offset = block_offset + FRAME_ALIGNMENT;
    let mut spanned_multiple = false;
    while next_offset < term_length {
        let view = FrameView::new(&term_buffer[next_offset as usize..]);
        if view.frame_length() != 0 {
            break;
        }
        next_offset += FRAME_ALIGNMENT;
        spanned_multiple = true;
    }

    let pad_length = next_offset - block_offset;
    let mut writer = FrameWriter::new(&mut term_buffer[block_offset as usize..]);
    writer.set_header(FrameType::Pad, UNFRAGMENTED, block_offset, session_id, stream_id, term_id, 0);
    writer.commit(pad_length);

    if spanned_multiple {
        UnblockStatus::UnblockedMultiple
    } else {
        UnblockStatus::Unblocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogBuffer::frame_descriptor::{FrameType as Ft, FrameWriter as Writer};

    #[test]
    fn already_committed_slot_needs_no_action() {
        let mut term = vec![0u8; 256];
        let mut w = Writer::new(&mut term);
        w.set_header(Ft::Data, UNFRAGMENTED, 0, 1, 1, 1, 0);
        w.commit(32);
        assert_eq!(unblock(&mut term, 0, 256, 1, 1, 1), UnblockStatus::NoAction);
    }

    #[test]
    fn single_slot_hole_gets_one_padding_frame() {
        let mut term = vec![0u8; 256];
        let mut w = Writer::new(&mut term[64..]);
        w.set_header(Ft::Data, UNFRAGMENTED, 64, 1, 1, 1, 0);
        w.commit(32);

        let status = unblock(&mut term, 32, 256, 1, 1, 1);
        assert_eq!(status, UnblockStatus::Unblocked);
        let view = FrameView::new(&term[32..]);
        assert_eq!(view.frame_length(), 32);
        assert_eq!(view.frame_type(), Some(Ft::Pad));
    }

    #[test]
    fn multi_slot_hole_at_end_of_term_gets_one_padding_frame() {
        let mut term = vec![0u8; 256];
        let status = unblock(&mut term, 64, 256, 1, 1, 1);
        assert_eq!(status, UnblockStatus::UnblockedMultiple);
        let view = FrameView::new(&term[64..]);
        assert_eq!(view.frame_length(), 256 - 64);
        assert_eq!(view.frame_type(), Some(Ft::Pad));
    }
}
