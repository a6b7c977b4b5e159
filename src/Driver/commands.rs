//! Client<->driver command protocol carried over the to-driver and
//! to-clients rings from `Concurrent::ring_buffer`/`Concurrent::broadcast`.
//! Each command/event is a `msg_type_id` plus a hand-packed byte payload
//! (little-endian fixed fields, followed by any variable-length string
//! fields length-prefixed) -- the same encoding style as
//! `Transport::wire`'s control frames, just over the client ring instead
//! of the network.

pub const ADD_PUBLICATION: i32 = 1;
pub const REMOVE_PUBLICATION: i32 = 2;
pub const ADD_SUBSCRIPTION: i32 = 3;
pub const REMOVE_SUBSCRIPTION: i32 = 4;
pub const CLIENT_KEEPALIVE: i32 = 5;

pub const ON_PUBLICATION_READY: i32 = 6;
pub const ON_SUBSCRIPTION_READY: i32 = 7;
pub const ON_OPERATION_SUCCESS: i32 = 8;
pub const ON_ERROR: i32 = 9;
pub const ON_AVAILABLE_IMAGE: i32 = 10;
pub const ON_UNAVAILABLE_IMAGE: i32 = 11;

fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as i32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn read_string(bytes: &[u8], cursor: &mut usize) -> Option<String> {
    let len = i32::from_le_bytes(bytes.get(*cursor..*cursor + 4)?.try_into().ok()?) as usize;
    *cursor += 4;
    let s = String::from_utf8(bytes.get(*cursor..*cursor + len)?.to_vec()).ok()?;
    *cursor += len;
    Some(s)
}

fn read_i64(bytes: &[u8], cursor: &mut usize) -> Option<i64> {
    let v = i64::from_le_bytes(bytes.get(*cursor..*cursor + 8)?.try_into().ok()?);
    *cursor += 8;
    Some(v)
}

fn read_i32(bytes: &[u8], cursor: &mut usize) -> Option<i32> {
    let v = i32::from_le_bytes(bytes.get(*cursor..*cursor + 4)?.try_into().ok()?);
    *cursor += 4;
    Some(v)
}

#[derive(Debug, Clone)]
pub struct AddPublicationCommand {
    pub correlation_id: i64,
    pub client_id: i64,
    pub stream_id: i32,
    pub channel: String,
}

impl AddPublicationCommand {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(20 + self.channel.len());
        buf.extend_from_slice(&self.correlation_id.to_le_bytes());
        buf.extend_from_slice(&self.client_id.to_le_bytes());
        buf.extend_from_slice(&self.stream_id.to_le_bytes());
        write_string(&mut buf, &self.channel);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut c = 0;
        Some(Self {
            correlation_id: read_i64(bytes, &mut c)?,
            client_id: read_i64(bytes, &mut c)?,
            stream_id: read_i32(bytes, &mut c)?,
            channel: read_string(bytes, &mut c)?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RemovePublicationCommand {
    pub correlation_id: i64,
    pub registration_id: i64,
}

impl RemovePublicationCommand {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        buf.extend_from_slice(&self.correlation_id.to_le_bytes());
        buf.extend_from_slice(&self.registration_id.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut c = 0;
        Some(Self {
            correlation_id: read_i64(bytes, &mut c)?,
            registration_id: read_i64(bytes, &mut c)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AddSubscriptionCommand {
    pub correlation_id: i64,
    pub client_id: i64,
    pub stream_id: i32,
    pub channel: String,
}

impl AddSubscriptionCommand {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(20 + self.channel.len());
        buf.extend_from_slice(&self.correlation_id.to_le_bytes());
        buf.extend_from_slice(&self.client_id.to_le_bytes());
        buf.extend_from_slice(&self.stream_id.to_le_bytes());
        write_string(&mut buf, &self.channel);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut c = 0;
        Some(Self {
            correlation_id: read_i64(bytes, &mut c)?,
            client_id: read_i64(bytes, &mut c)?,
            stream_id: read_i32(bytes, &mut c)?,
            channel: read_string(bytes, &mut c)?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RemoveSubscriptionCommand {
    pub correlation_id: i64,
    pub registration_id: i64,
}

impl RemoveSubscriptionCommand {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        buf.extend_from_slice(&self.correlation_id.to_le_bytes());
        buf.extend_from_slice(&self.registration_id.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut c = 0;
        Some(Self {
            correlation_id: read_i64(bytes, &mut c)?,
            registration_id: read_i64(bytes, &mut c)?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClientKeepaliveCommand {
    pub client_id: i64,
}

impl ClientKeepaliveCommand {
    pub fn encode(&self) -> Vec<u8> {
        self.client_id.to_le_bytes().to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut c = 0;
        Some(Self { client_id: read_i64(bytes, &mut c)? })
    }
}

#[derive(Debug, Clone)]
pub struct PublicationReadyEvent {
    pub correlation_id: i64,
    pub registration_id: i64,
    pub session_id: i32,
    pub stream_id: i32,
    pub position_limit_counter_id: i32,
    pub log_file_path: String,
}

impl PublicationReadyEvent {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 + self.log_file_path.len());
        buf.extend_from_slice(&self.correlation_id.to_le_bytes());
        buf.extend_from_slice(&self.registration_id.to_le_bytes());
        buf.extend_from_slice(&self.session_id.to_le_bytes());
        buf.extend_from_slice(&self.stream_id.to_le_bytes());
        buf.extend_from_slice(&self.position_limit_counter_id.to_le_bytes());
        write_string(&mut buf, &self.log_file_path);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut c = 0;
        Some(Self {
            correlation_id: read_i64(bytes, &mut c)?,
            registration_id: read_i64(bytes, &mut c)?,
            session_id: read_i32(bytes, &mut c)?,
            stream_id: read_i32(bytes, &mut c)?,
            position_limit_counter_id: read_i32(bytes, &mut c)?,
            log_file_path: read_string(bytes, &mut c)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SubscriptionReadyEvent {
    pub correlation_id: i64,
    pub registration_id: i64,
}

impl SubscriptionReadyEvent {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        buf.extend_from_slice(&self.correlation_id.to_le_bytes());
        buf.extend_from_slice(&self.registration_id.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut c = 0;
        Some(Self {
            correlation_id: read_i64(bytes, &mut c)?,
            registration_id: read_i64(bytes, &mut c)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct OperationSuccessEvent {
    pub correlation_id: i64,
}

impl OperationSuccessEvent {
    pub fn encode(&self) -> Vec<u8> {
        self.correlation_id.to_le_bytes().to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut c = 0;
        Some(Self { correlation_id: read_i64(bytes, &mut c)? })
    }
}

#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub correlation_id: i64,
    pub error_code: i32,
    pub message: String,
}

impl ErrorEvent {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12 + self.message.len());
        buf.extend_from_slice(&self.correlation_id.to_le_bytes());
        buf.extend_from_slice(&self.error_code.to_le_bytes());
        write_string(&mut buf, &self.message);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut c = 0;
        Some(Self {
            correlation_id: read_i64(bytes, &mut c)?,
            error_code: read_i32(bytes, &mut c)?,
            message: read_string(bytes, &mut c)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AvailableImageEvent {
    pub stream_id: i32,
    pub session_id: i32,
    pub subscriber_registration_id: i64,
    pub source_identity: String,
    pub log_file_path: String,
}

impl AvailableImageEvent {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + self.source_identity.len() + self.log_file_path.len());
        buf.extend_from_slice(&self.stream_id.to_le_bytes());
        buf.extend_from_slice(&self.session_id.to_le_bytes());
        buf.extend_from_slice(&self.subscriber_registration_id.to_le_bytes());
        write_string(&mut buf, &self.source_identity);
        write_string(&mut buf, &self.log_file_path);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut c = 0;
        Some(Self {
            stream_id: read_i32(bytes, &mut c)?,
            session_id: read_i32(bytes, &mut c)?,
            subscriber_registration_id: read_i64(bytes, &mut c)?,
            source_identity: read_string(bytes, &mut c)?,
            log_file_path: read_string(bytes, &mut c)?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UnavailableImageEvent {
    pub stream_id: i32,
    pub session_id: i32,
    pub subscriber_registration_id: i64,
}

impl UnavailableImageEvent {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        buf.extend_from_slice(&self.stream_id.to_le_bytes());
        buf.extend_from_slice(&self.session_id.to_le_bytes());
        buf.extend_from_slice(&self.subscriber_registration_id.to_le_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut c = 0;
        Some(Self {
            stream_id: read_i32(bytes, &mut c)?,
            session_id: read_i32(bytes, &mut c)?,
            subscriber_registration_id: read_i64(bytes, &mut c)?,
        })
    }
}
