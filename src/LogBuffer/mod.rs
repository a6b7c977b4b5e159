//! The on-wire-compatible log buffer: frame headers, positions, the
//! metadata trailer, and the pure term operations (scan, rebuild,
//! gap-scan, unblock, gap-fill) that everything else in the driver is
//! built on top of.

pub mod descriptor;
pub mod frame_descriptor;
pub mod log_buffers;
pub mod position;
pub mod term_gap_filler;
pub mod term_gap_scanner;
pub mod term_rebuilder;
pub mod term_scanner;
pub mod term_unblocker;

pub use descriptor::LogMetadata;
pub use log_buffers::LogBuffers;
