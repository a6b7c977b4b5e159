//! Edge-triggered-free (level-triggered) `epoll` wrapper the sender and
//! receiver agents use to find out which of their registered sockets has
//! data ready, without paying a `recv` syscall per idle socket per duty
//! cycle.
//!
//! Grounded on the raw-syscall style of `Core::futex` (direct `libc`
//! calls, no async runtime) -- the driver's agents are cooperatively
//! scheduled, not async, so polling goes through `libc::epoll_wait`
//! directly rather than through `mio`/`tokio`.

use std::io;
use std::os::unix::io::RawFd;

pub struct TransportPoller {
    epoll_fd: RawFd,
}

impl TransportPoller {
    pub fn new() -> io::Result<Self> {
        let epoll_fd = unsafe { libc::epoll_create1(0) };
        if epoll_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { epoll_fd })
    }

    pub fn register(&self, fd: RawFd) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: libc::EPOLLIN as u32,
            u64: fd as u64,
        };
        let rc = unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_ADD, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn deregister(&self, fd: RawFd) -> io::Result<()> {
        let rc = unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Poll for ready sockets, waiting up to `timeout_ms` (0 returns
    /// immediately). Returns the fds that are readable.
    pub fn poll(&self, timeout_ms: i32) -> io::Result<Vec<RawFd>> {
        let mut events: [libc::epoll_event; 64] = unsafe { std::mem::zeroed() };
        let n = unsafe { libc::epoll_wait(self.epoll_fd, events.as_mut_ptr(), events.len() as i32, timeout_ms) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(events[..n as usize].iter().map(|e| e.u64 as RawFd).collect())
    }
}

impl Drop for TransportPoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epoll_fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_with_no_registered_fds_times_out_empty() {
        let poller = TransportPoller::new().unwrap();
        let ready = poller.poll(0).unwrap();
        assert!(ready.is_empty());
    }

    #[test]
    fn registering_a_readable_pipe_reports_it_ready() {
        let mut fds = [0; 2];
        unsafe {
            assert_eq!(libc::pipe(fds.as_mut_ptr()), 0);
        }
        let [read_fd, write_fd] = fds;
        let poller = TransportPoller::new().unwrap();
        poller.register(read_fd).unwrap();

        assert!(poller.poll(0).unwrap().is_empty());

        unsafe {
            libc::write(write_fd, b"x".as_ptr() as *const _, 1);
        }
        let ready = poller.poll(100).unwrap();
        assert_eq!(ready, vec![read_fd]);

        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }
}
