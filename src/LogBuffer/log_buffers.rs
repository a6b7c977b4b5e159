//! Ties three term partitions and the metadata trailer together as a
//! single `<registration-id>.logbuffer` file: `[term 0][term 1][term
//! 2][metadata]`, mmap'd once and sliced. One side calls [`LogBuffers::create`]
//! when a publication is first registered; every other process that
//! attaches to the same stream calls [`LogBuffers::attach`] with the same
//! path and term length.
//!
//! Built directly on `Core::SharedMemory::{create_file_backed,
//! attach_file_backed}`.

use std::io;
use std::path::Path;

use crate::Core::{attach_file_backed, create_file_backed, SharedMemoryBackend};
use crate::LogBuffer::descriptor::{LogMetadata, LOG_META_DATA_LENGTH, PARTITION_COUNT};

pub struct LogBuffers {
    backend: Box<dyn SharedMemoryBackend>,
    term_length: usize,
}

unsafe impl Send for LogBuffers {}
unsafe impl Sync for LogBuffers {}

impl LogBuffers {
    pub fn file_length(term_length: usize) -> usize {
        term_length * PARTITION_COUNT + LOG_META_DATA_LENGTH
    }

    /// Create a new logbuffer file at `path` with three terms of
    /// `term_length` bytes each, plus the metadata trailer.
    pub fn create(path: &Path, term_length: usize) -> io::Result<Self> {
        let backend = create_file_backed(path, Self::file_length(term_length))?;
        let buffers = Self { backend, term_length };
        buffers.metadata().set_term_length(term_length as i32);
        Ok(buffers)
    }

    /// Attach to an existing logbuffer file created by another process.
    pub fn attach(path: &Path, term_length: usize) -> io::Result<Self> {
        let backend = attach_file_backed(path, Self::file_length(term_length))?;
        Ok(Self { backend, term_length })
    }

    pub fn term_length(&self) -> usize {
        self.term_length
    }

    /// Mutable view of term partition `index` (0, 1, or 2).
    ///
    /// # Safety
    /// Callers across processes coordinate exclusively through the
    /// frame-header publication protocol in `frame_descriptor`; nothing
    /// here prevents a caller from racing itself.
    pub fn term_mut(&self, index: usize) -> &mut [u8] {
        assert!(index < PARTITION_COUNT);
        unsafe {
            std::slice::from_raw_parts_mut(
                self.backend.as_ptr().add(index * self.term_length),
                self.term_length,
            )
        }
    }

    pub fn term(&self, index: usize) -> &[u8] {
        assert!(index < PARTITION_COUNT);
        unsafe { std::slice::from_raw_parts(self.backend.as_ptr().add(index * self.term_length), self.term_length) }
    }

    pub fn metadata(&self) -> LogMetadata {
        unsafe { LogMetadata::new(self.backend.as_ptr().add(self.term_length * PARTITION_COUNT)) }
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn create_then_attach_share_term_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.logbuffer");
        let term_length = 4096usize;

        let writer = LogBuffers::create(&path, term_length).unwrap();
        writer.term_mut(0)[0..5].copy_from_slice(b"hello");
        writer.metadata().set_initial_term_id(9);

        let reader = LogBuffers::attach(&path, term_length).unwrap();
        assert_eq!(&reader.term(0)[0..5], b"hello");
        assert_eq!(reader.metadata().initial_term_id(), 9);
    }
}
