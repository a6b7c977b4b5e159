pub mod bit_util;
pub mod counters;
pub mod error_log;
pub mod futex;
pub mod SharedMemory;

pub use SharedMemory::{attach_file_backed, create_file_backed, RawHandle, SharedMemoryBackend};
