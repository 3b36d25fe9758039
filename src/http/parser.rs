//! Incremental request parsing, routing and dispatch.
//!
//! Called once per successful `recv` on a connection's buffer. Stateless
//! across calls except for what's already sitting in the [`Connection`]'s
//! buffer: a call that returns [`ParseOutcome::Incomplete`] is safe to retry
//! verbatim once more bytes have been appended.

use super::writer::{send_error, send_response};
use crate::{conn::Connection, errors::ErrorKind, keys, store::WorkerStore};

const PREFIX: &[u8] = b"/v1/data/";
const MAX_METHOD: usize = 7;
const MAX_TARGET: usize = 511;
const MAX_REQUEST: usize = 65536;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The buffer doesn't yet contain everything the request needs; call
    /// again after the next successful read.
    Incomplete,
    /// A terminal response (success or error) has been written. The caller
    /// closes the connection unconditionally.
    Done,
}

/// Parses and, if complete, serves the request currently buffered in `conn`.
pub fn process(conn: &mut Connection, store: &WorkerStore) -> ParseOutcome {
    let buf = conn.filled();
    let Some(term_pos) = memchr::memmem::find(buf, b"\r\n\r\n") else {
        return ParseOutcome::Incomplete;
    };
    let header_len = term_pos + 4;
    let header_block = &buf[..term_pos];

    let mut lines = header_block.split(|&b| b == b'\n').map(strip_cr);
    let request_line = lines.next().unwrap_or(&[]);
    let header_lines = lines;

    let Some((method, target)) = parse_request_line(request_line) else {
        send_error(conn.fd, ErrorKind::MalformedRequestLine);
        return ParseOutcome::Done;
    };

    if target == b"/health" && method == b"GET" {
        send_response(conn.fd, 200, "OK", br#"{"status":"ok"}"#);
        return ParseOutcome::Done;
    }

    let Some(key_bytes) = target.strip_prefix(PREFIX) else {
        send_error(conn.fd, ErrorKind::NotFound);
        return ParseOutcome::Done;
    };
    let Ok(key) = std::str::from_utf8(key_bytes) else {
        send_error(conn.fd, ErrorKind::UnknownKey);
        return ParseOutcome::Done;
    };
    if !keys::is_valid_key(key) {
        send_error(conn.fd, ErrorKind::UnknownKey);
        return ParseOutcome::Done;
    }
    // Owned so the match arms below may reborrow `conn` mutably: `key` and
    // `content_len` would otherwise keep `conn`'s buffer borrowed.
    let key = key.to_owned();
    let is_get = method == b"GET";
    let is_put = method == b"PUT";
    let content_len = if is_put {
        Some(content_length(header_lines))
    } else {
        None
    };

    if is_get {
        handle_get(conn.fd, store, &key);
        return ParseOutcome::Done;
    }
    if is_put {
        return handle_put(conn, store, &key, header_len, content_len.unwrap());
    }

    send_error(conn.fd, ErrorKind::MethodNotAllowed);
    ParseOutcome::Done
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Extracts the first two whitespace-separated tokens (method, target),
/// ignoring anything after (including an HTTP version token, which this
/// server never inspects). Rejects tokens past their length ceilings rather
/// than silently truncating them.
fn parse_request_line(line: &[u8]) -> Option<(&[u8], &[u8])> {
    let mut tokens = line
        .split(|&b| b == b' ' || b == b'\t')
        .filter(|t| !t.is_empty());
    let method = tokens.next()?;
    let target = tokens.next()?;
    if method.len() > MAX_METHOD || target.len() > MAX_TARGET {
        return None;
    }
    Some((method, target))
}

/// Scans header lines for a case-insensitive `Content-Length`. Absent means
/// length 0; present-but-malformed (non-numeric) is reported as an error.
fn content_length<'a>(mut header_lines: impl Iterator<Item = &'a [u8]>) -> Result<usize, ()> {
    const NAME: &[u8] = b"content-length:";
    for line in &mut header_lines {
        if line.len() < NAME.len() {
            continue;
        }
        if line[..NAME.len()].eq_ignore_ascii_case(NAME) {
            let value = line[NAME.len()..]
                .iter()
                .skip_while(|b| b.is_ascii_whitespace())
                .copied()
                .collect::<Vec<u8>>();
            if value.is_empty() || !value.iter().all(u8::is_ascii_digit) {
                return Err(());
            }
            return std::str::from_utf8(&value)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(());
        }
    }
    Ok(0)
}

fn handle_get(fd: std::os::unix::io::RawFd, store: &WorkerStore, key: &str) {
    match store.fetch(key) {
        Ok(Some(value)) => send_response(fd, 200, "OK", value.as_bytes()),
        Ok(None) => send_response(fd, 200, "OK", keys::default_json(key).as_bytes()),
        Err(_) => send_error(fd, ErrorKind::Database),
    }
}

fn handle_put(
    conn: &mut Connection,
    store: &WorkerStore,
    key: &str,
    header_len: usize,
    content_len: Result<usize, ()>,
) -> ParseOutcome {
    let content_len = match content_len {
        Ok(n) if header_len.saturating_add(n) <= MAX_REQUEST => n,
        _ => {
            send_error(conn.fd, ErrorKind::InvalidContentLength);
            return ParseOutcome::Done;
        }
    };

    let buffered_body = conn.len() - header_len;
    if buffered_body < content_len {
        return ParseOutcome::Incomplete;
    }

    let body = &conn.filled()[header_len..header_len + content_len];
    let fd = conn.fd;
    let body_text = match std::str::from_utf8(body) {
        Ok(s) => s,
        Err(_) => {
            send_error(fd, ErrorKind::InvalidJsonPayload);
            return ParseOutcome::Done;
        }
    };

    match store.json_is_valid(body_text) {
        Ok(true) => {}
        Ok(false) => {
            send_error(fd, ErrorKind::InvalidJsonPayload);
            return ParseOutcome::Done;
        }
        Err(_) => {
            send_error(fd, ErrorKind::Database);
            return ParseOutcome::Done;
        }
    }

    match store.upsert(key, body_text) {
        Ok(()) => send_response(fd, 204, "No Content", b""),
        Err(_) => send_error(fd, ErrorKind::Database),
    }
    ParseOutcome::Done
}
