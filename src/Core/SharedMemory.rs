// Shared memory backend abstraction for Linux.
// Uses a real file + mmap so that the driver and client processes, running
// in separate address spaces, can map the same region by path (memfd_create
// cannot be attached to by path across processes, which is why the
// driver-directory contract needs a real file here).

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr::NonNull;

/// Shared memory backend trait for cross-platform memory mapping.
pub trait SharedMemoryBackend: Send + Sync {
    /// Get a pointer to the mapped memory region.
    fn as_ptr(&self) -> *mut u8;

    /// Get the size of the mapped region in bytes.
    fn size(&self) -> usize;

    /// Get the underlying file descriptor.
    fn raw_handle(&self) -> RawHandle;
}

/// Platform-specific handle type.
#[derive(Debug, Clone, Copy)]
pub enum RawHandle {
    /// Unix file descriptor (Linux).
    Fd(i32),
}

/// Create (or truncate-and-create) a file-backed shared memory region at
/// `path` with the given `size` and map it `PROT_READ | PROT_WRITE`,
/// `MAP_SHARED`. This is the path the Conductor takes when it creates a
/// `cnc.dat` or `<registration_id>.logbuffer` file.
#[cfg(target_os = "linux")]
pub fn create_file_backed(path: &Path, size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(LinuxSharedMemory::create(path, size)?))
}

/// Map an existing file-backed region at `path`, validating that its length
/// is at least `size`. This is the path a client or a second agent takes
/// when attaching to a file the Conductor already created.
#[cfg(target_os = "linux")]
pub fn attach_file_backed(path: &Path, size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    LinuxSharedMemory::attach(path, size).map(|shm| Box::new(shm) as Box<dyn SharedMemoryBackend>)
}

#[cfg(not(target_os = "linux"))]
pub fn create_file_backed(_path: &Path, _size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "file-backed shared memory only supported on Linux",
    ))
}

#[cfg(not(target_os = "linux"))]
pub fn attach_file_backed(_path: &Path, _size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "file-backed shared memory only supported on Linux",
    ))
}

#[cfg(target_os = "linux")]
pub struct LinuxSharedMemory {
    ptr: NonNull<u8>,
    size: usize,
    file: File,
}

#[cfg(target_os = "linux")]
unsafe impl Send for LinuxSharedMemory {}
#[cfg(target_os = "linux")]
unsafe impl Sync for LinuxSharedMemory {}

#[cfg(target_os = "linux")]
impl LinuxSharedMemory {
    /// Create a new file-backed region, truncated to `size` bytes.
    pub fn create(path: &Path, size: usize) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size as u64)?;
        Self::map(file, size)
    }

    /// Attach to an existing file-backed region, verifying it is at least
    /// `size` bytes long.
    pub fn attach(path: &Path, size: usize) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let actual_len = file.metadata()?.len() as usize;
        if actual_len < size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "shared memory file {:?} is {} bytes, expected at least {}",
                    path, actual_len, size
                ),
            ));
        }
        Self::map(file, size)
    }

    fn map(file: File, size: usize) -> io::Result<Self> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            ) as *mut u8
        };

        if ptr == libc::MAP_FAILED as *mut u8 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            ptr: NonNull::new(ptr)
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))?,
            size,
            file,
        })
    }
}

#[cfg(target_os = "linux")]
impl Drop for LinuxSharedMemory {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size);
        }
    }
}

#[cfg(target_os = "linux")]
impl SharedMemoryBackend for LinuxSharedMemory {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::Fd(self.file.as_raw_fd())
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn create_then_attach_shares_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region.dat");

        let creator = create_file_backed(&path, 4096).unwrap();
        unsafe {
            *creator.as_ptr() = 0xAB;
        }

        let attacher = attach_file_backed(&path, 4096).unwrap();
        unsafe {
            assert_eq!(*attacher.as_ptr(), 0xAB);
        }
    }

    #[test]
    fn attach_rejects_undersized_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region.dat");
        let _creator = create_file_backed(&path, 128).unwrap();

        assert!(attach_file_backed(&path, 4096).is_err());
    }
}
