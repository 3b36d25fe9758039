//! End-to-end: a single worker bound to an ephemeral port, driven with real
//! `TcpStream`s, checking parser + store + response wiring together.

use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpStream},
    thread,
    time::Duration,
};

use fricu_server::{net, store};
use tempfile::NamedTempFile;

fn spawn_server() -> SocketAddr {
    // Leaked on purpose: the worker thread outlives this function and needs
    // the file to exist for the rest of the test process.
    let db = NamedTempFile::new().unwrap();
    store::bootstrap(db.path()).unwrap();
    let db_path = db.path().to_path_buf();
    std::mem::forget(db);

    let listener = net::bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = listener.local_addr().unwrap().as_socket().unwrap();

    thread::spawn(move || {
        fricu_server::worker::run(&listener, &db_path, 65535);
    });

    // Give the worker a moment to register the listener before the first connect.
    thread::sleep(Duration::from_millis(50));
    addr
}

fn request(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream.write_all(raw).unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    String::from_utf8(response).unwrap()
}

#[test]
fn health_check_round_trips_over_real_tcp() {
    let addr = spawn_server();
    let response = request(addr, b"GET /health HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Connection: close\r\n"));
    assert!(response.ends_with(r#"{"status":"ok"}"#));
}

#[test]
fn put_then_get_round_trips_through_the_store() {
    let addr = spawn_server();
    let body = br#"[{"sport":"swim","minutes":30}]"#;
    let put = format!(
        "PUT /v1/data/activities HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    let mut raw = put.into_bytes();
    raw.extend_from_slice(body);
    let response = request(addr, &raw);
    assert!(response.starts_with("HTTP/1.1 204"));

    let get = request(addr, b"GET /v1/data/activities HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(get.ends_with(r#"[{"sport":"swim","minutes":30}]"#));
}

#[test]
fn unknown_key_is_404_over_real_tcp() {
    let addr = spawn_server();
    let response = request(addr, b"GET /v1/data/nope HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 404"));
    assert!(response.contains("unknown key"));
}

#[test]
fn connection_closes_after_one_response_even_with_keep_alive_requested() {
    let addr = spawn_server();
    let response = request(
        addr,
        b"GET /health HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n",
    );
    assert!(response.contains("Connection: close\r\n"));
}

#[test]
fn oversized_headers_without_terminator_are_rejected() {
    let addr = spawn_server();
    let mut raw = b"GET /".to_vec();
    raw.extend(std::iter::repeat(b'a').take(70_000));
    // No trailing \r\n\r\n: this should overflow the 64 KiB ceiling.
    let response = request(addr, &raw);
    assert!(response.starts_with("HTTP/1.1 413"));
}
