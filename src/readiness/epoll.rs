//! Linux backend: `epoll_create1` / `epoll_ctl` / `epoll_wait`.

use std::{io, os::unix::io::RawFd};

use super::{ReadinessQueue, ReadyEvent, Role};
use crate::errors::ReadinessError;

pub struct Epoll {
    qfd: RawFd,
}

impl ReadinessQueue for Epoll {
    fn create() -> Result<Self, ReadinessError> {
        // SAFETY: no arguments to misuse; the return value is checked below.
        let qfd = unsafe { libc::epoll_create1(0) };
        if qfd < 0 {
            return Err(ReadinessError::Create(io::Error::last_os_error()));
        }
        Ok(Self { qfd })
    }

    fn register(&self, fd: RawFd, role: Role) -> Result<(), ReadinessError> {
        let mut events = libc::EPOLLIN as u32;
        if role == Role::Client {
            events |= libc::EPOLLRDHUP as u32;
        }

        let mut ev = libc::epoll_event { events, u64: fd as u64 };

        if role == Role::Listener {
            // Ask for exclusive wakeup so only one worker is woken per accept
            // event; silently fall back to shared wakeup on kernels that
            // don't support it (pre-4.5, or EPOLLEXCLUSIVE rejected for some
            // other reason).
            let exclusive_events = events | libc::EPOLLEXCLUSIVE as u32;
            let mut exclusive_ev = libc::epoll_event {
                events: exclusive_events,
                u64: fd as u64,
            };
            // SAFETY: `exclusive_ev` is a valid, fully-initialized epoll_event.
            let rc = unsafe {
                libc::epoll_ctl(self.qfd, libc::EPOLL_CTL_ADD, fd, &mut exclusive_ev)
            };
            if rc == 0 {
                return Ok(());
            }
        }

        // SAFETY: `ev` is a valid, fully-initialized epoll_event.
        let rc = unsafe { libc::epoll_ctl(self.qfd, libc::EPOLL_CTL_ADD, fd, &mut ev) };
        if rc != 0 {
            return Err(ReadinessError::Register(io::Error::last_os_error()));
        }
        Ok(())
    }

    fn unregister(&self, fd: RawFd) -> Result<(), ReadinessError> {
        // SAFETY: the last argument is ignored by the kernel for EPOLL_CTL_DEL.
        let rc = unsafe {
            libc::epoll_ctl(self.qfd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut())
        };
        if rc != 0 {
            let err = io::Error::last_os_error();
            // The descriptor may already be gone (closed elsewhere); that's
            // not a condition the caller needs to act on.
            if err.raw_os_error() != Some(libc::ENOENT) && err.raw_os_error() != Some(libc::EBADF)
            {
                return Err(ReadinessError::Register(err));
            }
        }
        Ok(())
    }

    fn wait(&self, events: &mut [ReadyEvent]) -> Result<usize, ReadinessError> {
        let mut raw = [libc::epoll_event { events: 0, u64: 0 }; super::MAX_EVENTS];
        let cap = raw.len().min(events.len());

        loop {
            // SAFETY: `raw` has room for `cap` events and the kernel writes at most `cap`.
            let n = unsafe {
                libc::epoll_wait(self.qfd, raw.as_mut_ptr(), cap as i32, -1)
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                return Err(ReadinessError::Wait(err));
            }

            for i in 0..n as usize {
                let e = raw[i];
                let hangup = (e.events
                    & (libc::EPOLLERR as u32 | libc::EPOLLHUP as u32 | libc::EPOLLRDHUP as u32))
                    != 0;
                events[i] = ReadyEvent {
                    // We always register with `u64: fd as u64`.
                    fd: e.u64 as RawFd,
                    hangup,
                };
            }
            return Ok(n as usize);
        }
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        // SAFETY: `qfd` is owned by this value and not used afterward.
        unsafe {
            libc::close(self.qfd);
        }
    }
}
