//! Listening-socket setup and file-descriptor limit tuning.

use std::{io, net::SocketAddr, os::unix::io::RawFd};

use socket2::{Domain, Protocol, Socket, Type};

/// The floor the process tries to raise `RLIMIT_NOFILE` to, mirroring a
/// worker pool sized for tens of thousands of concurrent connections.
const TARGET_NOFILE: libc::rlim_t = 200_000;

/// Raises the soft `RLIMIT_NOFILE` toward [`TARGET_NOFILE`], never above the
/// hard limit. Best-effort: failure to raise it is not fatal, it just caps
/// how many connections a worker's slot array can address.
pub fn tune_fd_limit() -> io::Result<libc::rlim_t> {
    let mut lim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `lim` is a valid, writable rlimit.
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut lim) } != 0 {
        return Err(io::Error::last_os_error());
    }

    let target = if lim.rlim_cur < TARGET_NOFILE {
        lim.rlim_max.min(TARGET_NOFILE)
    } else {
        lim.rlim_cur
    };

    if target > lim.rlim_cur {
        lim.rlim_cur = target;
        // SAFETY: `lim` is a valid rlimit with rlim_cur <= rlim_max.
        if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &lim) } != 0 {
            return Err(io::Error::last_os_error());
        }
    }

    Ok(lim.rlim_cur)
}

/// Binds and listens on `addr`, ready to be cloned across worker threads.
///
/// Non-blocking so `accept()` in the worker loop never stalls the reactor;
/// `SO_REUSEADDR` so a restart doesn't fail on a lingering `TIME_WAIT` socket.
pub fn bind_listener(addr: SocketAddr) -> io::Result<Socket> {
    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    Ok(socket)
}

/// Applies per-connection tuning immediately after `accept`, operating on
/// the raw descriptor directly (the worker loop deals in `RawFd`, not
/// `socket2::Socket`, for the lifetime of an accepted connection): disables
/// Nagle's algorithm and, on platforms without `MSG_NOSIGNAL`, arranges for
/// `SIGPIPE` suppression via a socket option instead.
pub fn configure_accepted(fd: RawFd) -> io::Result<()> {
    let one: libc::c_int = 1;
    // SAFETY: `fd` is a valid, open socket descriptor; `one` outlives the call.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::IPPROTO_TCP,
            libc::TCP_NODELAY,
            &one as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    #[cfg(target_os = "macos")]
    {
        // SAFETY: same as above; SO_NOSIGPIPE takes the same int-flag shape.
        let rc = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_NOSIGPIPE,
                &one as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
    }

    Ok(())
}

/// Accepts one connection in non-blocking mode, preferring `accept4` with
/// `SOCK_NONBLOCK | SOCK_CLOEXEC` on Linux and falling back to `accept` plus
/// separate `fcntl` calls everywhere else (or if the kernel rejects the
/// combined flags, e.g. `ENOSYS`/`EINVAL` on an old Linux kernel).
pub fn accept_nonblocking(listen_fd: RawFd) -> io::Result<RawFd> {
    #[cfg(target_os = "linux")]
    {
        // SAFETY: `listen_fd` is a valid listening socket; null addr/addrlen
        // is allowed when the peer address isn't needed.
        let fd = unsafe {
            libc::accept4(
                listen_fd,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            )
        };
        if fd >= 0 {
            return Ok(fd);
        }
        let err = io::Error::last_os_error();
        if !matches!(err.raw_os_error(), Some(libc::ENOSYS) | Some(libc::EINVAL)) {
            return Err(err);
        }
    }

    // SAFETY: `listen_fd` is a valid listening socket.
    let fd = unsafe { libc::accept(listen_fd, std::ptr::null_mut(), std::ptr::null_mut()) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    if let Err(e) = set_nonblocking_and_cloexec(fd) {
        // SAFETY: `fd` was just returned by `accept` and is owned here.
        unsafe {
            libc::close(fd);
        }
        return Err(e);
    }
    Ok(fd)
}

fn set_nonblocking_and_cloexec(fd: RawFd) -> io::Result<()> {
    // SAFETY: `fd` is a valid, open descriptor.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: same as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: same as above.
    let fdflags = unsafe { libc::fcntl(fd, libc::F_GETFD, 0) };
    if fdflags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: same as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFD, fdflags | libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn bind_listener_picks_an_ephemeral_port_and_listens() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = bind_listener(addr).unwrap();
        let local = listener.local_addr().unwrap();
        assert!(local.as_socket().unwrap().port() > 0);
    }

    #[test]
    fn accept_nonblocking_returns_ewouldblock_with_nothing_pending() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = bind_listener(addr).unwrap();
        let err = accept_nonblocking(listener.as_raw_fd()).unwrap_err();
        assert!(matches!(
            err.raw_os_error(),
            Some(libc::EAGAIN) | Some(libc::EWOULDBLOCK)
        ));
    }

    #[test]
    fn tune_fd_limit_never_lowers_the_soft_limit() {
        let mut before = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut before) };
        let after = tune_fd_limit().unwrap();
        assert!(after >= before.rlim_cur);
    }
}
