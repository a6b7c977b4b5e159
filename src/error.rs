//! Driver-wide error type. Bridges the low-level `io::Error`s that come
//! out of shared memory and socket setup with the handful of
//! driver-specific failure modes (a malformed channel URI, an operation
//! on an unknown registration id) that the conductor needs to report back
//! to clients as a distinct error code rather than a generic I/O failure.
//!
//! A `thiserror`-derived enum with `#[from]` on I/O, the same shape
//! DataDog's `libdatadog` uses for its own error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid channel URI `{uri}`: {reason}")]
    InvalidChannelUri { uri: String, reason: String },

    #[error("unknown registration id {0}")]
    UnknownRegistration(i64),

    #[error("stream id {0} already in use on this channel with incompatible parameters")]
    StreamIdConflict(i32),

    #[error("term length {0} is not a power of two")]
    InvalidTermLength(i32),

    #[error("driver directory at {0} is already active (cnc.dat lock held)")]
    DirectoryInUse(String),

    #[error("client {0} timed out without keeping its publications/subscriptions alive")]
    ClientTimeout(i64),
}

pub type DriverResult<T> = Result<T, DriverError>;
