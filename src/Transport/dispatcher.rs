//! Demultiplexes inbound frames on a receive channel endpoint to the
//! registered image for their `(session_id, stream_id)` pair. A frame for
//! a session/stream with no registered image is handed to the
//! "unknown session" callback, which the conductor uses to decide
//! whether to create a new image (this is the first frame seen from a
//! new publisher).

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::LogBuffer::frame_descriptor::FrameView;

pub type FrameHandler = Box<dyn FnMut(&[u8], SocketAddr) + Send>;

#[derive(Hash, PartialEq, Eq, Clone, Copy)]
struct StreamSessionKey {
    session_id: i32,
    stream_id: i32,
}

pub struct DataPacketDispatcher {
    handlers: HashMap<StreamSessionKey, FrameHandler>,
    on_unknown: Option<FrameHandler>,
}

impl Default for DataPacketDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl DataPacketDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            on_unknown: None,
        }
    }

    pub fn register(&mut self, session_id: i32, stream_id: i32, handler: FrameHandler) {
        self.handlers.insert(StreamSessionKey { session_id, stream_id }, handler);
    }

    pub fn deregister(&mut self, session_id: i32, stream_id: i32) {
        self.handlers.remove(&StreamSessionKey { session_id, stream_id });
    }

    pub fn set_unknown_session_handler(&mut self, handler: FrameHandler) {
        self.on_unknown = Some(handler);
    }

    /// Dispatch one inbound frame to its registered image, or to the
    /// unknown-session handler if no image exists yet for its
    /// `(session_id, stream_id)`. Malformed frames (too short to contain
    /// a header) are silently dropped, mirroring UDP's own
    /// best-effort delivery.
    pub fn on_frame(&mut self, frame: &[u8], from: SocketAddr) {
        if frame.len() < crate::LogBuffer::frame_descriptor::HEADER_LENGTH as usize {
            return;
        }
        let view = FrameView::new(frame);
        let key = StreamSessionKey {
            session_id: view.session_id(),
            stream_id: view.stream_id(),
        };
        if let Some(handler) = self.handlers.get_mut(&key) {
            handler(frame, from);
        } else if let Some(handler) = self.on_unknown.as_mut() {
            handler(frame, from);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogBuffer::frame_descriptor::{FrameType, FrameWriter, UNFRAGMENTED};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn data_frame(session_id: i32, stream_id: i32) -> Vec<u8> {
        let mut buf = vec![0u8; 32];
        let mut w = FrameWriter::new(&mut buf);
        w.set_header(FrameType::Data, UNFRAGMENTED, 0, session_id, stream_id, 1, 0);
        w.commit(32);
        buf
    }

    #[test]
    fn known_session_routes_to_its_handler() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        let mut dispatcher = DataPacketDispatcher::new();
        dispatcher.register(1, 2, Box::new(move |_frame, _from| {
            seen2.fetch_add(1, Ordering::SeqCst);
        }));

        let frame = data_frame(1, 2);
        dispatcher.on_frame(&frame, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_session_falls_through_to_unknown_handler() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        let mut dispatcher = DataPacketDispatcher::new();
        dispatcher.set_unknown_session_handler(Box::new(move |_frame, _from| {
            seen2.fetch_add(1, Ordering::SeqCst);
        }));

        let frame = data_frame(9, 9);
        dispatcher.on_frame(&frame, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deregistered_session_falls_back_to_unknown() {
        let mut dispatcher = DataPacketDispatcher::new();
        dispatcher.register(1, 2, Box::new(|_, _| {}));
        dispatcher.deregister(1, 2);

        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        dispatcher.set_unknown_session_handler(Box::new(move |_, _| {
            seen2.fetch_add(1, Ordering::SeqCst);
        }));
        dispatcher.on_frame(&data_frame(1, 2), "127.0.0.1:9000".parse().unwrap());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
