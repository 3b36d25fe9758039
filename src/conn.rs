//! Per-connection state: the growable read buffer owned by exactly one worker.

use std::os::unix::io::RawFd;

use crate::errors::ErrorKind;

/// Initial buffer size; doubles up to [`MAX_BUFFER`] as a request needs more room.
pub const INIT_BUFFER: usize = 8 * 1024;
/// Hard ceiling on how large a single request's header+body section may grow.
pub const MAX_BUFFER: usize = 64 * 1024;

/// State for one accepted client socket, from accept to close.
///
/// Owned exclusively by the worker that accepted it; never touched by
/// another thread. `buf` always has one byte of spare capacity beyond `len`
/// so a trailing NUL can be written without reallocating.
pub struct Connection {
    pub fd: RawFd,
    buf: Vec<u8>,
    len: usize,
}

impl Connection {
    pub fn new(fd: RawFd) -> Self {
        let mut buf = Vec::with_capacity(INIT_BUFFER + 1);
        buf.resize(INIT_BUFFER, 0);
        Self { fd, buf, len: 0 }
    }

    /// Bytes read so far for the request currently in progress.
    pub fn filled(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Doubles the buffer (up to [`MAX_BUFFER`]) if it is already full.
    /// Returns `Err(PayloadTooLarge)` if it is full and already at the ceiling.
    pub fn grow_if_full(&mut self) -> Result<(), ErrorKind> {
        if self.len < self.buf.len() {
            return Ok(());
        }
        if self.buf.len() >= MAX_BUFFER {
            return Err(ErrorKind::PayloadTooLarge);
        }
        let new_cap = (self.buf.len() * 2).min(MAX_BUFFER);
        self.buf
            .try_reserve(new_cap - self.buf.len())
            .map_err(|_| ErrorKind::Oom)?;
        self.buf.resize(new_cap, 0);
        Ok(())
    }

    /// Appends up to `n` bytes read into the spare tail of the buffer. The
    /// caller must have read directly into `&mut self.spare()[..n]`.
    pub fn advance(&mut self, n: usize) {
        self.len += n;
    }

    /// The unfilled tail of the buffer available for the next `recv`.
    pub fn spare(&mut self) -> &mut [u8] {
        &mut self.buf[self.len..]
    }

    /// Clears buffered bytes for a fresh request. Unused in the current
    /// one-request-per-connection lifecycle, kept for the resumption
    /// contract's symmetry with `append`/`grow_if_full`.
    pub fn reset(&mut self) {
        self.len = 0;
    }
}
