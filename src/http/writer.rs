//! Response assembly and the blocking send loop.

use std::{
    io::Write as _,
    os::unix::io::RawFd,
    thread,
    time::Duration,
};

use crate::errors::ErrorKind;

const HEADER_CAP: usize = 2048;
const WOULD_BLOCK_RETRIES: u32 = 4;
const WOULD_BLOCK_SLEEP: Duration = Duration::from_micros(50);

#[cfg(target_os = "linux")]
fn send_flags() -> libc::c_int {
    libc::MSG_NOSIGNAL
}

#[cfg(not(target_os = "linux"))]
fn send_flags() -> libc::c_int {
    // SIGPIPE is suppressed per-socket via SO_NOSIGPIPE, set once at accept time.
    0
}

/// Writes a full `HTTP/1.1 <code> <reason>` response with a JSON body.
///
/// Assembles the header block in a stack buffer, then sends header and body
/// in a blocking loop. Every failure here is terminal for the connection, so
/// errors are swallowed rather than propagated: the worker closes the
/// connection right after calling this either way.
pub fn send_response(fd: RawFd, status: u16, reason: &str, body: &[u8]) {
    let mut header_buf = [0u8; HEADER_CAP];
    let mut cursor: &mut [u8] = &mut header_buf;
    let header_len = {
        let start_len = cursor.len();
        let _ = write!(
            cursor,
            "HTTP/1.1 {status} {reason}\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n",
            body.len()
        );
        start_len - cursor.len()
    };

    if send_all(fd, &header_buf[..header_len]) && !body.is_empty() {
        send_all(fd, body);
    }
}

/// Sends a precomputed `ErrorKind` response verbatim (already includes headers and body).
pub fn send_error(fd: RawFd, kind: ErrorKind) {
    send_all(fd, kind.as_http());
}

/// Sends `buf` in full, retrying transient would-block and interrupted
/// conditions. Returns `false` on any unrecoverable failure, in which case
/// the caller should not attempt to send anything further on this socket.
fn send_all(fd: RawFd, buf: &[u8]) -> bool {
    let mut sent = 0usize;
    let mut would_block_retries = 0u32;

    while sent < buf.len() {
        let chunk = &buf[sent..];
        // SAFETY: `chunk` is valid for `chunk.len()` bytes for the duration of the call.
        let rc = unsafe {
            libc::send(
                fd,
                chunk.as_ptr() as *const libc::c_void,
                chunk.len(),
                send_flags(),
            )
        };

        if rc > 0 {
            sent += rc as usize;
            continue;
        }
        if rc == 0 {
            return false;
        }

        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(libc::EAGAIN) | Some(libc::EWOULDBLOCK) => {
                if would_block_retries >= WOULD_BLOCK_RETRIES {
                    return false;
                }
                would_block_retries += 1;
                thread::sleep(WOULD_BLOCK_SLEEP);
            }
            _ => return false,
        }
    }
    true
}
