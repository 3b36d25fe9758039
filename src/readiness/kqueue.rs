//! macOS/BSD backend: `kqueue` / `kevent`.
//!
//! kqueue has no analogue to `EPOLLEXCLUSIVE`; the listener is registered
//! plainly and relies on the kernel's own serialization of `accept()`.

use std::{io, os::unix::io::RawFd, ptr};

use super::{ReadinessQueue, ReadyEvent, Role};
use crate::errors::ReadinessError;

pub struct Kqueue {
    qfd: RawFd,
}

impl ReadinessQueue for Kqueue {
    fn create() -> Result<Self, ReadinessError> {
        // SAFETY: no arguments; the return value is checked below.
        let qfd = unsafe { libc::kqueue() };
        if qfd < 0 {
            return Err(ReadinessError::Create(io::Error::last_os_error()));
        }
        Ok(Self { qfd })
    }

    fn register(&self, fd: RawFd, _role: Role) -> Result<(), ReadinessError> {
        let mut change: libc::kevent = unsafe { std::mem::zeroed() };
        change.ident = fd as usize;
        change.filter = libc::EVFILT_READ;
        change.flags = libc::EV_ADD | libc::EV_ENABLE;

        // SAFETY: `change` is one well-formed kevent; `nevents`/`out` are 0/null.
        let rc = unsafe { libc::kevent(self.qfd, &change, 1, ptr::null_mut(), 0, ptr::null()) };
        if rc < 0 {
            return Err(ReadinessError::Register(io::Error::last_os_error()));
        }
        Ok(())
    }

    fn unregister(&self, fd: RawFd) -> Result<(), ReadinessError> {
        let mut change: libc::kevent = unsafe { std::mem::zeroed() };
        change.ident = fd as usize;
        change.filter = libc::EVFILT_READ;
        change.flags = libc::EV_DELETE;

        // SAFETY: see `register`. ENOENT (already gone) is not an error the
        // caller needs to act on.
        let rc = unsafe { libc::kevent(self.qfd, &change, 1, ptr::null_mut(), 0, ptr::null()) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOENT) && err.raw_os_error() != Some(libc::EBADF)
            {
                return Err(ReadinessError::Register(err));
            }
        }
        Ok(())
    }

    fn wait(&self, events: &mut [ReadyEvent]) -> Result<usize, ReadinessError> {
        let mut raw: [libc::kevent; super::MAX_EVENTS] = unsafe { std::mem::zeroed() };
        let cap = raw.len().min(events.len());

        loop {
            // SAFETY: `raw` has room for `cap` events and the kernel writes at most `cap`.
            let n = unsafe {
                libc::kevent(
                    self.qfd,
                    ptr::null(),
                    0,
                    raw.as_mut_ptr(),
                    cap as i32,
                    ptr::null(),
                )
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
                let hangup = (e.flags & libc::EV_EOF) != 0 || e.filter == libc::EVFILT_ERROR as i16;
                events[i] = ReadyEvent {
                    fd: e.ident as RawFd,
                    hangup,
                };
            }
            return Ok(n as usize);
        }
    }
}

impl Drop for Kqueue {
    fn drop(&mut self) {
        // SAFETY: `qfd` is owned by this value and not used afterward.
        unsafe {
            libc::close(self.qfd);
        }
    }
}
