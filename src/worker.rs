//! One worker's event loop: accept, read, parse, respond, close.
//!
//! Everything here belongs to exactly one OS thread for its entire
//! lifetime — the store handle, the readiness queue, the slot array. Two
//! workers never touch the same connection or the same prepared statement.

use std::{
    os::unix::io::{AsRawFd, RawFd},
    path::Path,
};

use socket2::Socket;

use crate::{
    conn::Connection,
    http::{parser::ParseOutcome, parser::process as process_request, writer::send_error},
    net,
    readiness::{ReadinessQueue, ReadyEvent, Readiness, Role, MAX_EVENTS},
    store::WorkerStore,
    ErrorKind,
};

/// Drives one worker's entire lifetime. Returns only on an unrecoverable
/// startup failure (store open, queue creation, listener registration); the
/// steady-state loop never returns.
pub fn run(listener: &Socket, db_path: &Path, max_fd: usize) {
    let listen_fd = listener.as_raw_fd();

    let store = match WorkerStore::open(db_path) {
        Ok(store) => store,
        Err(err) => {
            tracing::error!(%err, "worker failed to open store handle");
            return;
        }
    };

    let queue = match Readiness::create() {
        Ok(queue) => queue,
        Err(err) => {
            tracing::error!(%err, "worker failed to create readiness queue");
            return;
        }
    };

    if let Err(err) = queue.register(listen_fd, Role::Listener) {
        tracing::error!(%err, "worker failed to register listening socket");
        return;
    }

    let mut slots: Vec<Option<Connection>> = (0..=max_fd).map(|_| None).collect();
    let mut events = vec![ReadyEvent { fd: -1, hangup: false }; MAX_EVENTS];

    loop {
        let n = match queue.wait(&mut events) {
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(%err, "readiness wait failed");
                continue;
            }
        };

        for i in 0..n {
            let fd = events[i].fd;
            let hangup = events[i].hangup;

            if fd == listen_fd {
                accept_loop(&queue, listen_fd, &mut slots, max_fd);
                continue;
            }

            if fd < 0 || fd as usize >= slots.len() {
                continue;
            }

            if hangup {
                close_conn(&queue, &mut slots, fd);
                continue;
            }

            if slots[fd as usize].is_none() {
                continue;
            }

            service_readable(&queue, &store, &mut slots, fd);
        }
    }
}

fn accept_loop(queue: &Readiness, listen_fd: RawFd, slots: &mut [Option<Connection>], max_fd: usize) {
    loop {
        let client_fd = match net::accept_nonblocking(listen_fd) {
            Ok(fd) => fd,
            Err(err) => {
                match err.raw_os_error() {
                    Some(libc::EAGAIN) | Some(libc::EWOULDBLOCK) => return,
                    Some(libc::EINTR) => continue,
                    _ => return,
                }
            }
        };

        if client_fd as usize > max_fd {
            // SAFETY: `client_fd` was just accepted and is owned here.
            unsafe {
                libc::close(client_fd);
            }
            continue;
        }

        if net::configure_accepted(client_fd).is_err() {
            // SAFETY: same as above.
            unsafe {
                libc::close(client_fd);
            }
            continue;
        }

        slots[client_fd as usize] = Some(Connection::new(client_fd));
        if queue.register(client_fd, Role::Client).is_err() {
            close_conn(queue, slots, client_fd);
        }
    }
}

fn service_readable(
    queue: &Readiness,
    store: &WorkerStore,
    slots: &mut [Option<Connection>],
    fd: RawFd,
) {
    loop {
        let conn = slots[fd as usize]
            .as_mut()
            .expect("slot checked non-empty by caller");

        if let Err(kind) = conn.grow_if_full() {
            send_error(fd, kind);
            close_conn(queue, slots, fd);
            return;
        }

        // SAFETY: `spare()` is a valid, writable region of at least its length.
        let n = unsafe {
            libc::recv(
                fd,
                conn.spare().as_mut_ptr() as *mut libc::c_void,
                conn.spare().len(),
                0,
            )
        };

        if n > 0 {
            conn.advance(n as usize);
            if conn.capacity() >= crate::conn::MAX_BUFFER && conn.len() == conn.capacity() {
                send_error(fd, ErrorKind::PayloadTooLarge);
                close_conn(queue, slots, fd);
                return;
            }

            match process_request(conn, store) {
                ParseOutcome::Done => {
                    close_conn(queue, slots, fd);
                    return;
                }
                ParseOutcome::Incomplete => continue,
            }
        }

        if n == 0 {
            close_conn(queue, slots, fd);
            return;
        }

        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EAGAIN) | Some(libc::EWOULDBLOCK) => return,
            Some(libc::EINTR) => continue,
            _ => {
                close_conn(queue, slots, fd);
                return;
            }
        }
    }
}

fn close_conn(queue: &Readiness, slots: &mut [Option<Connection>], fd: RawFd) {
    if fd < 0 {
        return;
    }
    let _ = queue.unregister(fd);
    if fd as usize < slots.len() {
        slots[fd as usize] = None;
    }
    // SAFETY: every fd reaching here was accepted by this worker and is not
    // referenced anywhere else once its slot is cleared.
    unsafe {
        libc::close(fd);
    }
}
