//! Wire encoding for the control frames that travel over UDP but never
//! live inside a term buffer: NAK, status message (SM), SETUP, RTTM, and
//! ERR. Each shares the 32-byte base header from
//! `LogBuffer::frame_descriptor` (so a receiver can dispatch on
//! `frame_type` before knowing which of these it is) plus a
//! type-specific tail.

use crate::LogBuffer::frame_descriptor::{FrameType, FrameWriter, UNFRAGMENTED, HEADER_LENGTH};

pub const FLAG_END_OF_STREAM: u8 = 0x01;
pub const FLAG_REPLY: u8 = 0x01;

#[derive(Debug, Clone, Copy)]
pub struct NakFrame {
    pub session_id: i32,
    pub stream_id: i32,
    pub term_id: i32,
    pub term_offset: i32,
    pub length: i32,
}

impl NakFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LENGTH as usize + 4];
        let mut w = FrameWriter::new(&mut buf);
        w.set_header(FrameType::Nak, UNFRAGMENTED, self.term_offset, self.session_id, self.stream_id, self.term_id, 0);
        buf[HEADER_LENGTH as usize..].copy_from_slice(&self.length.to_le_bytes());
        let mut w = FrameWriter::new(&mut buf);
        w.commit(buf.len() as i32);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        use crate::LogBuffer::frame_descriptor::FrameView;
        if bytes.len() < HEADER_LENGTH as usize + 4 {
            return None;
        }
        let view = FrameView::new(bytes);
        let length = i32::from_le_bytes(bytes[HEADER_LENGTH as usize..HEADER_LENGTH as usize + 4].try_into().ok()?);
        Some(Self {
            session_id: view.session_id(),
            stream_id: view.stream_id(),
            term_id: view.term_id(),
            term_offset: view.term_offset(),
            length,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StatusMessageFrame {
    pub session_id: i32,
    pub stream_id: i32,
    pub consumption_term_id: i32,
    pub consumption_term_offset: i32,
    pub receiver_window: i32,
    pub receiver_id: i64,
    pub trigger_setup: bool,
}

impl StatusMessageFrame {
    const TAIL_LEN: usize = 4 + 8 + 4;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LENGTH as usize + Self::TAIL_LEN];
        let mut w = FrameWriter::new(&mut buf);
        w.set_header(
            FrameType::StatusMessage,
            UNFRAGMENTED,
            self.consumption_term_offset,
            self.session_id,
            self.stream_id,
            self.consumption_term_id,
            0,
        );
        let tail_start = HEADER_LENGTH as usize;
        buf[tail_start..tail_start + 4].copy_from_slice(&self.receiver_window.to_le_bytes());
        buf[tail_start + 4..tail_start + 12].copy_from_slice(&self.receiver_id.to_le_bytes());
        let flags: i32 = if self.trigger_setup { 1 } else { 0 };
        buf[tail_start + 12..tail_start + 16].copy_from_slice(&flags.to_le_bytes());
        let mut w = FrameWriter::new(&mut buf);
        w.commit(buf.len() as i32);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        use crate::LogBuffer::frame_descriptor::FrameView;
        if bytes.len() < HEADER_LENGTH as usize + Self::TAIL_LEN {
            return None;
        }
        let view = FrameView::new(bytes);
        let t = HEADER_LENGTH as usize;
        let receiver_window = i32::from_le_bytes(bytes[t..t + 4].try_into().ok()?);
        let receiver_id = i64::from_le_bytes(bytes[t + 4..t + 12].try_into().ok()?);
        let flags = i32::from_le_bytes(bytes[t + 12..t + 16].try_into().ok()?);
        Some(Self {
            session_id: view.session_id(),
            stream_id: view.stream_id(),
            consumption_term_id: view.term_id(),
            consumption_term_offset: view.term_offset(),
            receiver_window,
            receiver_id,
            trigger_setup: flags & 1 != 0,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SetupFrame {
    pub session_id: i32,
    pub stream_id: i32,
    pub active_term_id: i32,
    pub term_offset: i32,
    pub initial_term_id: i32,
    pub term_length: i32,
    pub mtu_length: i32,
    pub ttl: i32,
}

impl SetupFrame {
    const TAIL_LEN: usize = 4 * 4;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LENGTH as usize + Self::TAIL_LEN];
        let mut w = FrameWriter::new(&mut buf);
        w.set_header(
            FrameType::Setup,
            UNFRAGMENTED,
            self.term_offset,
            self.session_id,
            self.stream_id,
            self.active_term_id,
            0,
        );
        let t = HEADER_LENGTH as usize;
        buf[t..t + 4].copy_from_slice(&self.initial_term_id.to_le_bytes());
        buf[t + 4..t + 8].copy_from_slice(&self.term_length.to_le_bytes());
        buf[t + 8..t + 12].copy_from_slice(&self.mtu_length.to_le_bytes());
        buf[t + 12..t + 16].copy_from_slice(&self.ttl.to_le_bytes());
        let mut w = FrameWriter::new(&mut buf);
        w.commit(buf.len() as i32);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        use crate::LogBuffer::frame_descriptor::FrameView;
        if bytes.len() < HEADER_LENGTH as usize + Self::TAIL_LEN {
            return None;
        }
        let view = FrameView::new(bytes);
        let t = HEADER_LENGTH as usize;
        Some(Self {
            session_id: view.session_id(),
            stream_id: view.stream_id(),
            active_term_id: view.term_id(),
            term_offset: view.term_offset(),
            initial_term_id: i32::from_le_bytes(bytes[t..t + 4].try_into().ok()?),
            term_length: i32::from_le_bytes(bytes[t + 4..t + 8].try_into().ok()?),
            mtu_length: i32::from_le_bytes(bytes[t + 8..t + 12].try_into().ok()?),
            ttl: i32::from_le_bytes(bytes[t + 12..t + 16].try_into().ok()?),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RttMeasurementFrame {
    pub session_id: i32,
    pub stream_id: i32,
    pub echo_timestamp_ns: i64,
    pub reception_delta_ns: i64,
    pub receiver_id: i64,
    pub is_reply: bool,
}

impl RttMeasurementFrame {
    const TAIL_LEN: usize = 8 + 8 + 8 + 4;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LENGTH as usize + Self::TAIL_LEN];
        let mut w = FrameWriter::new(&mut buf);
        w.set_header(FrameType::Rttm, UNFRAGMENTED, 0, self.session_id, self.stream_id, 0, 0);
        let t = HEADER_LENGTH as usize;
        buf[t..t + 8].copy_from_slice(&self.echo_timestamp_ns.to_le_bytes());
        buf[t + 8..t + 16].copy_from_slice(&self.reception_delta_ns.to_le_bytes());
        buf[t + 16..t + 24].copy_from_slice(&self.receiver_id.to_le_bytes());
        let flags: i32 = if self.is_reply { FLAG_REPLY as i32 } else { 0 };
        buf[t + 24..t + 28].copy_from_slice(&flags.to_le_bytes());
        let mut w = FrameWriter::new(&mut buf);
        w.commit(buf.len() as i32);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        use crate::LogBuffer::frame_descriptor::FrameView;
        if bytes.len() < HEADER_LENGTH as usize + Self::TAIL_LEN {
            return None;
        }
        let view = FrameView::new(bytes);
        let t = HEADER_LENGTH as usize;
        let flags = i32::from_le_bytes(bytes[t + 24..t + 28].try_into().ok()?);
        Some(Self {
            session_id: view.session_id(),
            stream_id: view.stream_id(),
            echo_timestamp_ns: i64::from_le_bytes(bytes[t..t + 8].try_into().ok()?),
            reception_delta_ns: i64::from_le_bytes(bytes[t + 8..t + 16].try_into().ok()?),
            receiver_id: i64::from_le_bytes(bytes[t + 16..t + 24].try_into().ok()?),
            is_reply: flags & FLAG_REPLY as i32 != 0,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ErrFrame {
    pub session_id: i32,
    pub stream_id: i32,
    pub error_code: i32,
    pub message: String,
}

impl ErrFrame {
    pub fn encode(&self) -> Vec<u8> {
        let message_bytes = self.message.as_bytes();
        let mut buf = vec![0u8; HEADER_LENGTH as usize + 4 + message_bytes.len()];
        let mut w = FrameWriter::new(&mut buf);
        w.set_header(FrameType::Err, UNFRAGMENTED, 0, self.session_id, self.stream_id, 0, 0);
        let t = HEADER_LENGTH as usize;
        buf[t..t + 4].copy_from_slice(&self.error_code.to_le_bytes());
        buf[t + 4..].copy_from_slice(message_bytes);
        let mut w = FrameWriter::new(&mut buf);
        w.commit(buf.len() as i32);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        use crate::LogBuffer::frame_descriptor::FrameView;
        if bytes.len() < HEADER_LENGTH as usize + 4 {
            return None;
        }
        let view = FrameView::new(bytes);
        let t = HEADER_LENGTH as usize;
        let error_code = i32::from_le_bytes(bytes[t..t + 4].try_into().ok()?);
        let message = String::from_utf8_lossy(&bytes[t + 4..]).into_owned();
        Some(Self {
            session_id: view.session_id(),
            stream_id: view.stream_id(),
            error_code,
            message,
        })
    }
}
