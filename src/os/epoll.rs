// src/os/epoll.rs

//! Readiness wait on one descriptor, over `epoll`.

use bitflags::bitflags;
use log::{debug, trace};
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::time::Duration;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EpollFlags: u32 {
        const EPOLLIN = libc::EPOLLIN as u32;
        const EPOLLPRI = libc::EPOLLPRI as u32;
        const EPOLLERR = libc::EPOLLERR as u32;
        const EPOLLHUP = libc::EPOLLHUP as u32;
    }
}

/// Converts an optional wait bound into the `epoll_wait` timeout argument,
/// rounding up to whole milliseconds. `None` blocks indefinitely (-1).
pub fn timeout_to_ms(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(d) => d
            .as_nanos()
            .div_ceil(1_000_000)
            .min(libc::c_int::MAX as u128) as libc::c_int,
    }
}

/// An epoll instance watching a single descriptor for input.
#[derive(Debug)]
pub struct EventMonitor {
    epoll: OwnedFd,
}

impl EventMonitor {
    pub fn watch(fd: BorrowedFd<'_>) -> io::Result<Self> {
        let raw = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if raw == -1 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: epoll_create1 just returned this descriptor; nothing else owns it.
        let epoll = unsafe { OwnedFd::from_raw_fd(raw) };

        let mut event = libc::epoll_event {
            events: (EpollFlags::EPOLLIN | EpollFlags::EPOLLPRI).bits(),
            u64: 0,
        };
        let rc = unsafe {
            libc::epoll_ctl(
                epoll.as_raw_fd(),
                libc::EPOLL_CTL_ADD,
                fd.as_raw_fd(),
                &mut event,
            )
        };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        debug!("Watching fd {} through epoll fd {}", fd.as_raw_fd(), raw);
        Ok(Self { epoll })
    }

    /// Waits up to `timeout` for the watched descriptor. Returns no flags when
    /// the bound elapsed or the wait was interrupted by a signal.
    pub fn wait(&self, timeout: Option<Duration>) -> io::Result<EpollFlags> {
        let mut event = libc::epoll_event { events: 0, u64: 0 };
        let n = unsafe {
            libc::epoll_wait(
                self.epoll.as_raw_fd(),
                &mut event,
                1,
                timeout_to_ms(timeout),
            )
        };
        match n {
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    trace!("epoll_wait interrupted");
                    return Ok(EpollFlags::empty());
                }
                Err(err)
            }
            0 => Ok(EpollFlags::empty()),
            _ => Ok(EpollFlags::from_bits_truncate(event.events)),
        }
    }
}
