//! Pure scan of a term buffer starting at a given offset: how many
//! contiguous, fully-committed bytes are available to send (or copy out)
//! without tearing a frame or fragmented message in half.
//!
//! Uses the acquire-on-length discipline established in
//! `LogBuffer::frame_descriptor`.

use crate::LogBuffer::frame_descriptor::{FrameView, FRAME_ALIGNMENT, FLAG_END};
use crate::Core::bit_util::align;

/// Scan `term_buffer` starting at `term_offset` for up to `max_length`
/// bytes of fully-committed frames. Stops at:
/// - the first uncommitted (`frame_length == 0`) slot,
/// - a frame that would not fit within `max_length` (unless it is the
///   first frame scanned, in which case it is still included so the
///   sender always makes progress),
/// - immediately after a frame carrying [`FLAG_END`] (never straddles a
///   fragmented-message boundary into the next message).
///
/// Returns the number of bytes available, which is always a multiple of
/// [`FRAME_ALIGNMENT`] (or equal to the single oversized frame's aligned
/// length in the "always make progress" case).
pub fn scan_for_availability(term_buffer: &[u8], term_offset: i32, max_length: i32) -> i32 {
    let limit = term_offset + max_length;
    let mut offset = term_offset;
    let mut available = 0i32;

    loop {
        if offset >= limit {
            break;
        }
        let view = FrameView::new(&term_buffer[offset as usize..]);
        let frame_length = view.frame_length();
        if frame_length <= 0 {
            break;
        }
        let aligned_length = align(frame_length, FRAME_ALIGNMENT);

        if offset + aligned_length > limit && available > 0 {
            break;
        }

        let is_end_of_message = view.flags() & FLAG_END != 0;
        available += aligned_length;
        offset += aligned_length;

        if is_end_of_message {
            break;
        }
    }

    available
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogBuffer::frame_descriptor::{FrameType, FrameWriter, UNFRAGMENTED};

    fn write_frame(buf: &mut [u8], offset: usize, frame_type: FrameType, flags: u8, body_len: usize) {
        let frame_len = 32 + body_len;
        let mut w = FrameWriter::new(&mut buf[offset..]);
        w.set_header(frame_type, flags, offset as i32, 1, 1, 1, 0);
        let mut w = FrameWriter::new(&mut buf[offset..]);
        w.commit(frame_len as i32);
    }

    #[test]
    fn stops_at_first_uncommitted_frame() {
        let mut buf = vec![0u8; 256];
        write_frame(&mut buf, 0, FrameType::Data, UNFRAGMENTED, 0);
        let available = scan_for_availability(&buf, 0, 256);
        assert_eq!(available, 32);
    }

    #[test]
    fn stops_after_end_of_message_flag() {
        let mut buf = vec![0u8; 256];
        write_frame(&mut buf, 0, FrameType::Data, crate::LogBuffer::frame_descriptor::FLAG_BEGIN, 0);
        write_frame(&mut buf, 32, FrameType::Data, crate::LogBuffer::frame_descriptor::FLAG_END, 0);
        write_frame(&mut buf, 64, FrameType::Data, UNFRAGMENTED, 0);
        let available = scan_for_availability(&buf, 0, 256);
        assert_eq!(available, 64);
    }

    #[test]
    fn always_makes_progress_on_an_oversized_first_frame() {
        let mut buf = vec![0u8; 256];
        write_frame(&mut buf, 0, FrameType::Data, UNFRAGMENTED, 64);
        let available = scan_for_availability(&buf, 0, 32);
        assert_eq!(available, 96);
    }

    #[test]
    fn empty_term_region_yields_zero() {
        let buf = vec![0u8; 256];
        assert_eq!(scan_for_availability(&buf, 0, 256), 0);
    }
}
