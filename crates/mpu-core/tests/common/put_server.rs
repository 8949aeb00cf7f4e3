//! Minimal HTTP/1.1 server that accepts PUT bodies for integration tests.
//!
//! Stores each body under its request path and answers 200 with an ETag
//! derived from the body. Paths can be scripted to fail a number of times
//! (or forever) with a given status first.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct State {
    bodies: HashMap<String, Vec<u8>>,
    /// path -> (status, remaining failures)
    failures: HashMap<String, (u16, u32)>,
    requests: Vec<String>,
}

#[derive(Clone)]
pub struct PutServer {
    base: String,
    state: Arc<Mutex<State>>,
}

impl PutServer {
    /// Starts the server on a background thread. It runs until the process exits.
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(State::default()));
        let shared = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let state = Arc::clone(&shared);
                thread::spawn(move || handle(stream, &state));
            }
        });
        Self {
            base: format!("http://127.0.0.1:{}", port),
            state,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Answer `times` requests to `path` with `status` before accepting it.
    pub fn fail(&self, path: &str, status: u16, times: u32) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(path.to_string(), (status, times));
    }

    pub fn body(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().bodies.get(path).cloned()
    }

    pub fn requests_to(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|p| *p == path)
            .count()
    }
}

/// ETag the server hands out for `body`.
pub fn etag_for(body: &[u8]) -> String {
    let sum = body
        .iter()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(*b as u64));
    format!("{:016x}-{}", sum, body.len())
}

fn handle(mut stream: TcpStream, state: &Mutex<State>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));

    let mut buf = Vec::new();
    let mut chunk = [0u8; 64 * 1024];
    let header_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let (method, path, content_length) = parse_head(&head);

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(n) => body.extend_from_slice(&chunk[..n]),
        }
    }
    body.truncate(content_length);

    if !method.eq_ignore_ascii_case("PUT") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    }

    let failure = {
        let mut state = state.lock().unwrap();
        state.requests.push(path.clone());
        match state.failures.get_mut(&path) {
            Some((status, left)) if *left > 0 => {
                *left -= 1;
                Some(*status)
            }
            _ => None,
        }
    };
    if let Some(status) = failure {
        let response = format!(
            "HTTP/1.1 {} Scripted Failure\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            status
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    let etag = etag_for(&body);
    state.lock().unwrap().bodies.insert(path, body);
    let response = format!(
        "HTTP/1.1 200 OK\r\nETag: \"{}\"\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        etag
    );
    let _ = stream.write_all(response.as_bytes());
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// (method, path, content length)
fn parse_head(head: &str) -> (String, String, usize) {
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or("").split_whitespace();
    let method = request_line.next().unwrap_or("").to_string();
    let path = request_line.next().unwrap_or("/").to_string();
    let mut content_length = 0;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    (method, path, content_length)
}
