//! Finds the first gap (an uncommitted stretch followed eventually by
//! committed data, or by the scan limit) in a receiver-side term buffer.
//! The loss detector uses this to decide what to NAK.

use crate::LogBuffer::frame_descriptor::{FrameView, FRAME_ALIGNMENT};
use crate::Core::bit_util::align;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub term_offset: i32,
    pub length: i32,
}

/// Scan `[term_offset, limit_offset)` for the first gap. Returns `None`
/// if the region is contiguous (every frame up to `limit_offset` is
/// committed, or the region is exactly empty because `term_offset ==
/// limit_offset`).
pub fn scan_for_gap(term_buffer: &[u8], term_offset: i32, limit_offset: i32) -> Option<Gap> {
    let mut offset = term_offset;
    while offset < limit_offset {
        let view = FrameView::new(&term_buffer[offset as usize..]);
        let frame_length = view.frame_length();
        if frame_length <= 0 {
            break;
        }
        offset += align(frame_length, FRAME_ALIGNMENT);
    }

    if offset >= limit_offset {
        return None;
    }

    let gap_start = offset;
    let mut probe = offset;
    while probe < limit_offset {
        let view = FrameView::new(&term_buffer[probe as usize..]);
        if view.frame_length() > 0 {
            break;
        }
        probe += FRAME_ALIGNMENT;
    }

    Some(Gap {
        term_offset: gap_start,
        length: probe - gap_start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogBuffer::frame_descriptor::{FrameType, FrameWriter, UNFRAGMENTED};

    fn write_frame(buf: &mut [u8], offset: usize, body_len: usize) {
        let frame_len = 32 + body_len;
        let mut w = FrameWriter::new(&mut buf[offset..]);
        w.set_header(FrameType::Data, UNFRAGMENTED, offset as i32, 1, 1, 1, 0);
        let mut w = FrameWriter::new(&mut buf[offset..]);
        w.commit(frame_len as i32);
    }

    #[test]
    fn contiguous_region_has_no_gap() {
        let mut buf = vec![0u8; 128];
        write_frame(&mut buf, 0, 0);
        write_frame(&mut buf, 32, 0);
        assert_eq!(scan_for_gap(&buf, 0, 64), None);
    }

    #[test]
    fn missing_frame_in_the_middle_is_reported() {
        let mut buf = vec![0u8; 128];
        write_frame(&mut buf, 0, 0);
        // offset 32 missing
        write_frame(&mut buf, 64, 0);
        let gap = scan_for_gap(&buf, 0, 96).unwrap();
        assert_eq!(gap, Gap { term_offset: 32, length: 32 });
    }

    #[test]
    fn trailing_gap_runs_to_the_limit() {
        let mut buf = vec![0u8; 128];
        write_frame(&mut buf, 0, 0);
        let gap = scan_for_gap(&buf, 0, 96).unwrap();
        assert_eq!(gap, Gap { term_offset: 32, length: 64 });
    }
}
