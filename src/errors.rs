//! Error taxonomy for the request-serving engine.
//!
//! Client-facing conditions become a fixed, precomputed HTTP response (see
//! [`ErrorKind::as_http`]); everything else either retries locally or
//! terminates the connection without a response.

use std::{error, fmt, io};

/// A condition that aborts processing of the current request.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorKind {
    MalformedRequestLine,
    UnknownKey,
    NotFound,
    MethodNotAllowed,
    InvalidContentLength,
    InvalidJsonPayload,
    PayloadTooLarge,
    Database,
    Oom,
}

const fn parse_code(s: &str) -> u16 {
    let b = s.as_bytes();
    (b[0] - b'0') as u16 * 100 + (b[1] - b'0') as u16 * 10 + (b[2] - b'0') as u16
}

macro_rules! http_errors {
    ($($name:ident: $code:literal, $reason:literal, $len:literal => $json:literal; )*) => {
        impl ErrorKind {
            /// The full, pre-assembled response (status line, headers, body) for this error.
            pub const fn as_http(self) -> &'static [u8] {
                match self { $(
                    Self::$name => concat!(
                        "HTTP/1.1 ", $code, " ", $reason, "\r\n",
                        "Content-Type: application/json\r\n",
                        "Content-Length: ", $len, "\r\n",
                        "Connection: close\r\n",
                        "\r\n",
                        $json,
                    ).as_bytes(),
                )* }
            }

            /// The numeric status code for this error.
            pub const fn status_code(self) -> u16 {
                match self { $( Self::$name => parse_code($code), )* }
            }
        }
    };
}

http_errors! {
    MalformedRequestLine: "400", "Bad Request", "34" => "{\"error\":\"malformed request line\"}";
    UnknownKey: "404", "Not Found", "23" => "{\"error\":\"unknown key\"}";
    NotFound: "404", "Not Found", "21" => "{\"error\":\"not found\"}";
    MethodNotAllowed: "405", "Method Not Allowed", "30" => "{\"error\":\"method not allowed\"}";
    InvalidContentLength: "400", "Bad Request", "34" => "{\"error\":\"invalid content length\"}";
    InvalidJsonPayload: "400", "Bad Request", "32" => "{\"error\":\"invalid json payload\"}";
    PayloadTooLarge: "413", "Payload Too Large", "29" => "{\"error\":\"request too large\"}";
    Database: "500", "Internal Server Error", "26" => "{\"error\":\"database error\"}";
    Oom: "500", "Internal Server Error", "15" => "{\"error\":\"oom\"}";
}

impl error::Error for ErrorKind {}
impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Failures from the worker's SQLite handle; always maps to [`ErrorKind::Database`]
/// at the HTTP boundary.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<StoreError> for ErrorKind {
    fn from(_: StoreError) -> Self {
        ErrorKind::Database
    }
}

/// Failures from the platform readiness abstraction.
#[derive(thiserror::Error, Debug)]
pub enum ReadinessError {
    #[error("failed to create readiness queue: {0}")]
    Create(#[source] io::Error),
    #[error("failed to register descriptor: {0}")]
    Register(#[source] io::Error),
    #[error("wait on readiness queue failed: {0}")]
    Wait(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ErrorKind; 9] = [
        ErrorKind::MalformedRequestLine,
        ErrorKind::UnknownKey,
        ErrorKind::NotFound,
        ErrorKind::MethodNotAllowed,
        ErrorKind::InvalidContentLength,
        ErrorKind::InvalidJsonPayload,
        ErrorKind::PayloadTooLarge,
        ErrorKind::Database,
        ErrorKind::Oom,
    ];

    #[test]
    fn declared_content_length_matches_actual_body() {
        for kind in ALL {
            let full = kind.as_http();
            let text = std::str::from_utf8(full).unwrap();
            let (headers, body) = text.split_once("\r\n\r\n").unwrap();
            let declared: usize = headers
                .lines()
                .find_map(|l| l.strip_prefix("Content-Length: "))
                .unwrap()
                .parse()
                .unwrap();
            assert_eq!(declared, body.len(), "mismatch for {kind:?}");
            assert!(text.starts_with(&format!("HTTP/1.1 {}", kind.status_code())));
            assert!(text.contains("Connection: close\r\n"));
        }
    }
}
