//! The 32-byte frame header that precedes every DATA/PAD frame resident in
//! a term buffer. `frame_length` is the publication flag: a producer
//! writes the frame body first, then releases `frame_length` last; a
//! consumer (term scanner, term rebuilder) acquires `frame_length` first
//! and must not read the body until it has observed a positive value.
//!
//! The same publish-last/acquire-first discipline a Vyukov slot header
//! uses for its sequence number, just over a `frame_length: AtomicI32`
//! sitting in front of a variable-length payload instead of a fixed slot.

use std::sync::atomic::{AtomicI32, Ordering};

/// Total size of the frame header, in bytes. All frames in a term buffer
/// begin on a multiple of this value.
pub const HEADER_LENGTH: i32 = 32;

pub const FRAME_ALIGNMENT: i32 = 32;

pub const FLAG_BEGIN: u8 = 0x80;
pub const FLAG_END: u8 = 0x40;
pub const UNFRAGMENTED: u8 = FLAG_BEGIN | FLAG_END;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FrameType {
    Pad = 0x00,
    Data = 0x01,
    Nak = 0x02,
    StatusMessage = 0x03,
    Err = 0x04,
    Setup = 0x05,
    Rttm = 0x06,
}

impl FrameType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x00 => Some(Self::Pad),
            0x01 => Some(Self::Data),
            0x02 => Some(Self::Nak),
            0x03 => Some(Self::StatusMessage),
            0x04 => Some(Self::Err),
            0x05 => Some(Self::Setup),
            0x06 => Some(Self::Rttm),
            _ => None,
        }
    }
}

/// Byte-offset layout within the 32-byte header. All multi-byte fields are
/// little-endian.
mod offset {
    pub const FRAME_LENGTH: usize = 0;
    pub const VERSION: usize = 4;
    pub const FLAGS: usize = 5;
    pub const TYPE: usize = 6;
    pub const TERM_OFFSET: usize = 8;
    pub const SESSION_ID: usize = 12;
    pub const STREAM_ID: usize = 16;
    pub const TERM_ID: usize = 20;
    pub const RESERVED_VALUE: usize = 24;
}

pub const CURRENT_VERSION: u8 = 0;

/// A read/write view of a frame header at a fixed byte offset inside a
/// term buffer (or any other byte region at least [`HEADER_LENGTH`] long).
pub struct FrameView<'a> {
    bytes: &'a [u8],
}

impl<'a> FrameView<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        debug_assert!(bytes.len() >= HEADER_LENGTH as usize);
        Self { bytes }
    }

    fn frame_length_atomic(&self) -> &AtomicI32 {
        unsafe { &*(self.bytes.as_ptr().add(offset::FRAME_LENGTH) as *const AtomicI32) }
    }

    /// Acquire-load of `frame_length`. A value `<= 0` means "not yet
    /// committed" (zero) -- the term scanner and rebuilder both treat this
    /// as the point where they must stop.
    pub fn frame_length(&self) -> i32 {
        self.frame_length_atomic().load(Ordering::Acquire)
    }

    pub fn version(&self) -> u8 {
        self.bytes[offset::VERSION]
    }

    pub fn flags(&self) -> u8 {
        self.bytes[offset::FLAGS]
    }

    pub fn frame_type(&self) -> Option<FrameType> {
        let raw = u16::from_le_bytes([self.bytes[offset::TYPE], self.bytes[offset::TYPE + 1]]);
        FrameType::from_u16(raw)
    }

    pub fn term_offset(&self) -> i32 {
        i32::from_le_bytes(self.bytes[offset::TERM_OFFSET..offset::TERM_OFFSET + 4].try_into().unwrap())
    }

    pub fn session_id(&self) -> i32 {
        i32::from_le_bytes(self.bytes[offset::SESSION_ID..offset::SESSION_ID + 4].try_into().unwrap())
    }

    pub fn stream_id(&self) -> i32 {
        i32::from_le_bytes(self.bytes[offset::STREAM_ID..offset::STREAM_ID + 4].try_into().unwrap())
    }

    pub fn term_id(&self) -> i32 {
        i32::from_le_bytes(self.bytes[offset::TERM_ID..offset::TERM_ID + 4].try_into().unwrap())
    }

    pub fn reserved_value(&self) -> i64 {
        i64::from_le_bytes(
            self.bytes[offset::RESERVED_VALUE..offset::RESERVED_VALUE + 8]
                .try_into()
                .unwrap(),
        )
    }

    pub fn is_padding(&self) -> bool {
        matches!(self.frame_type(), Some(FrameType::Pad))
    }
}

/// Mutable counterpart to [`FrameView`]. Writers must call [`FrameWriter::commit`]
/// last, after every other field (including the payload body) has been
/// written, so the release store of `frame_length` is the publication
/// point other threads synchronise on.
pub struct FrameWriter<'a> {
    bytes: &'a mut [u8],
}

impl<'a> FrameWriter<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        debug_assert!(bytes.len() >= HEADER_LENGTH as usize);
        Self { bytes }
    }

    pub fn set_header(
        &mut self,
        frame_type: FrameType,
        flags: u8,
        term_offset: i32,
        session_id: i32,
        stream_id: i32,
        term_id: i32,
        reserved_value: i64,
    ) {
        self.bytes[offset::VERSION] = CURRENT_VERSION;
        self.bytes[offset::FLAGS] = flags;
        let type_bytes = (frame_type as u16).to_le_bytes();
        self.bytes[offset::TYPE..offset::TYPE + 2].copy_from_slice(&type_bytes);
        self.bytes[offset::TERM_OFFSET..offset::TERM_OFFSET + 4]
            .copy_from_slice(&term_offset.to_le_bytes());
        self.bytes[offset::SESSION_ID..offset::SESSION_ID + 4]
            .copy_from_slice(&session_id.to_le_bytes());
        self.bytes[offset::STREAM_ID..offset::STREAM_ID + 4]
            .copy_from_slice(&stream_id.to_le_bytes());
        self.bytes[offset::TERM_ID..offset::TERM_ID + 4].copy_from_slice(&term_id.to_le_bytes());
        self.bytes[offset::RESERVED_VALUE..offset::RESERVED_VALUE + 8]
            .copy_from_slice(&reserved_value.to_le_bytes());
    }

    fn frame_length_atomic(&self) -> &AtomicI32 {
        unsafe { &*(self.bytes.as_ptr().add(offset::FRAME_LENGTH) as *const AtomicI32) }
    }

    /// Publish `frame_length`. Must be the last write performed against
    /// this frame.
    pub fn commit(&mut self, frame_length: i32) {
        self.frame_length_atomic().store(frame_length, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_fields_and_publishes_length_last() {
        let mut buf = vec![0u8; 64];
        {
            let mut w = FrameWriter::new(&mut buf);
            w.set_header(FrameType::Data, UNFRAGMENTED, 0, 7, 9, 3, 0);
            buf[32..40].copy_from_slice(b"payload!");
            let mut w = FrameWriter::new(&mut buf);
            w.commit(40);
        }

        let view = FrameView::new(&buf);
        assert_eq!(view.frame_length(), 40);
        assert_eq!(view.session_id(), 7);
        assert_eq!(view.stream_id(), 9);
        assert_eq!(view.term_id(), 3);
        assert_eq!(view.flags(), UNFRAGMENTED);
        assert_eq!(view.frame_type(), Some(FrameType::Data));
        assert!(!view.is_padding());
    }

    #[test]
    fn uncommitted_frame_reads_as_zero_length() {
        let mut buf = vec![0u8; 32];
        let mut w = FrameWriter::new(&mut buf);
        w.set_header(FrameType::Data, UNFRAGMENTED, 0, 1, 1, 1, 0);
        let view = FrameView::new(&buf);
        assert_eq!(view.frame_length(), 0);
    }
}
