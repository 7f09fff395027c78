//! Minimal HTTP/1.1 server that supports HEAD and Range GET for integration tests.
//!
//! Serves a set of static bodies by path; unknown paths get 404. HEAD answers
//! with Content-Length (and Accept-Ranges: bytes when ranges are on); GET with
//! Range answers 206 Partial Content. One request per connection.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, HEAD returns 405 (simulates servers that block HEAD).
    pub head_allowed: bool,
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// Pause after every 1 KiB of body (simulates a slow link).
    pub chunk_delay: Option<Duration>,
    /// Answer every range with 206 but `Content-Range` (and body) shifted to
    /// start at byte 0, keeping the requested length.
    pub shift_ranges: bool,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
            chunk_delay: None,
            shift_ranges: false,
        }
    }
}

/// Handle to a running server. The server runs until the process exits.
pub struct RangeServer {
    base: String,
    /// GET requests seen, with their Range header if any.
    gets: Arc<std::sync::Mutex<Vec<(String, Option<(u64, u64)>)>>>,
    heads: Arc<AtomicUsize>,
}

impl RangeServer {
    /// URL for `path` on this server (e.g. `url("a.bin")`).
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn gets_for(&self, path: &str) -> Vec<Option<(u64, u64)>> {
        let want = format!("/{}", path);
        self.gets
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| *p == want)
            .map(|(_, r)| *r)
            .collect()
    }

    pub fn head_count(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }
}

/// Serve `files` (path without leading slash, body) in a background thread.
pub fn start(files: Vec<(&str, Vec<u8>)>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let files: Arc<HashMap<String, Vec<u8>>> = Arc::new(
        files
            .into_iter()
            .map(|(p, b)| (format!("/{}", p), b))
            .collect(),
    );
    let gets = Arc::new(std::sync::Mutex::new(Vec::new()));
    let heads = Arc::new(AtomicUsize::new(0));
    {
        let gets = Arc::clone(&gets);
        let heads = Arc::clone(&heads);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let files = Arc::clone(&files);
                let gets = Arc::clone(&gets);
                let heads = Arc::clone(&heads);
                thread::spawn(move || {
                    if let Some(req) = read_request(&stream) {
                        match req.method.as_str() {
                            "HEAD" => {
                                heads.fetch_add(1, Ordering::SeqCst);
                            }
                            "GET" => gets.lock().unwrap().push((req.path.clone(), req.range)),
                            _ => {}
                        }
                        respond(stream, &files, &req, opts);
                    }
                });
            }
        });
    }
    RangeServer {
        base: format!("http://127.0.0.1:{}/", port),
        gets,
        heads,
    }
}

struct Request {
    method: String,
    path: String,
    /// `Range: bytes=a-b` as (a, b inclusive); open end is `u64::MAX`.
    range: Option<(u64, u64)>,
}

fn read_request(mut stream: &TcpStream) -> Option<Request> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let text = String::from_utf8_lossy(&buf);
    let mut lines = text.lines();
    let mut first = lines.next()?.split_whitespace();
    let method = first.next()?.to_ascii_uppercase();
    let path = first.next()?.to_string();
    let mut range = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("range") {
            continue;
        }
        let spec = value.trim();
        if let Some(rest) = spec.strip_prefix("bytes=") {
            if let Some((a, b)) = rest.split_once('-') {
                let start = a.trim().parse().unwrap_or(0);
                let end = b.trim().parse().unwrap_or(u64::MAX);
                range = Some((start, end));
            }
        }
    }
    Some(Request {
        method,
        path,
        range,
    })
}

fn respond(
    mut stream: TcpStream,
    files: &HashMap<String, Vec<u8>>,
    req: &Request,
    opts: RangeServerOptions,
) {
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let Some(body) = files.get(&req.path) else {
        let _ = stream
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    };
    let total = body.len() as u64;
    let accept_ranges = if opts.support_ranges {
        "Accept-Ranges: bytes\r\n"
    } else {
        ""
    };

    if req.method == "HEAD" {
        let head = if opts.head_allowed {
            format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
                total, accept_ranges
            )
        } else {
            "HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string()
        };
        let _ = stream.write_all(head.as_bytes());
        return;
    }
    if req.method != "GET" {
        let _ = stream.write_all(
            b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        return;
    }

    let (status, extra, slice): (&str, String, &[u8]) = match req.range {
        Some((start, end)) if opts.support_ranges => {
            let end = end.min(total.saturating_sub(1));
            if start >= total || start > end {
                (
                    "416 Range Not Satisfiable",
                    format!("Content-Range: bytes */{}\r\n", total),
                    &body[..0],
                )
            } else if opts.shift_ranges {
                let last = end - start;
                (
                    "206 Partial Content",
                    format!("Content-Range: bytes 0-{}/{}\r\n", last, total),
                    &body[..=last as usize],
                )
            } else {
                (
                    "206 Partial Content",
                    format!("Content-Range: bytes {}-{}/{}\r\n", start, end, total),
                    &body[start as usize..=end as usize],
                )
            }
        }
        _ => ("200 OK", String::new(), &body[..]),
    };
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}{}Connection: close\r\n\r\n",
        status,
        slice.len(),
        extra,
        accept_ranges
    );
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }
    for part in slice.chunks(1024) {
        if let Some(d) = opts.chunk_delay {
            thread::sleep(d);
        }
        if stream.write_all(part).is_err() {
            return;
        }
    }
}
