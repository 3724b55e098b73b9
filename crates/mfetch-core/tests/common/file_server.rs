//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves a fixed set of paths, each with its own status, body and headers.
//! Every response closes the connection. Request lines and headers are
//! recorded so tests can assert on what the client sent, and the server
//! tracks how many requests it was serving at the same time.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Route {
    pub status: u16,
    pub reason: &'static str,
    pub body: Vec<u8>,
    /// Value sent as Content-Length. `None` omits the header and the body
    /// ends when the connection closes.
    pub content_length: Option<usize>,
    pub headers: Vec<(String, String)>,
    /// Pause between reading the request and answering it.
    pub delay: Duration,
}

impl Route {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        Self {
            status: 200,
            reason: "OK",
            content_length: Some(body.len()),
            body,
            headers: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16, reason: &'static str) -> Self {
        let body = reason.as_bytes().to_vec();
        Self {
            status,
            reason,
            content_length: Some(body.len()),
            body,
            headers: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn redirect(location: &str) -> Self {
        let mut r = Self::status(302, "Found");
        r.headers.push(("Location".to_string(), location.to_string()));
        r
    }

    pub fn without_length(mut self) -> Self {
        self.content_length = None;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Advertise a different length than the body actually has.
    pub fn claiming_length(mut self, len: usize) -> Self {
        self.content_length = Some(len);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub struct FileServer {
    /// e.g. "http://127.0.0.1:12345/"
    pub base: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    connections: Arc<Gauge>,
}

/// Requests being answered right now, and the most seen at once.
#[derive(Debug, Default)]
struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) -> GaugeGuard<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard(self)
    }
}

struct GaugeGuard<'a>(&'a Gauge);

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FileServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path.trim_start_matches('/'))
    }

    /// Template with the path substituted after the base URL.
    pub fn template(&self) -> String {
        format!("{}{{0}}", self.base)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Highest number of requests that were in flight together.
    pub fn peak_connections(&self) -> usize {
        self.connections.peak.load(Ordering::SeqCst)
    }
}

/// Starts a server in a background thread. Paths are matched without the
/// query string and without the leading slash. Unknown paths get 404.
/// The server runs until the process exits.
pub fn start<P: Into<String>>(routes: impl IntoIterator<Item = (P, Route)>) -> FileServer {
    let routes: HashMap<String, Route> = routes
        .into_iter()
        .map(|(p, r)| (p.into().trim_start_matches('/').to_string(), r))
        .collect();
    let routes = Arc::new(routes);
    let requests = Arc::new(Mutex::new(Vec::new()));

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let connections = Arc::new(Gauge::default());
    let recorded = Arc::clone(&requests);
    let gauge = Arc::clone(&connections);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let routes = Arc::clone(&routes);
            let recorded = Arc::clone(&recorded);
            let gauge = Arc::clone(&gauge);
            thread::spawn(move || handle(stream, &routes, &recorded, &gauge));
        }
    });
    FileServer {
        base: format!("http://127.0.0.1:{}/", port),
        requests,
        connections,
    }
}

/// A URL on a port nothing listens on.
pub fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/gone.bin", port)
}

fn handle(
    mut stream: TcpStream,
    routes: &HashMap<String, Route>,
    recorded: &Mutex<Vec<RecordedRequest>>,
    gauge: &Gauge,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));

    let Some(request) = read_head(&mut stream) else {
        return;
    };
    let Some(parsed) = parse_request(&request) else {
        return;
    };
    let key = parsed
        .path
        .split('?')
        .next()
        .unwrap_or("")
        .trim_start_matches('/')
        .to_string();
    recorded.lock().unwrap().push(parsed);
    let _serving = gauge.enter();

    let route = routes
        .get(&key)
        .cloned()
        .unwrap_or_else(|| Route::status(404, "Not Found"));
    if !route.delay.is_zero() {
        thread::sleep(route.delay);
    }

    let mut head = format!("HTTP/1.1 {} {}\r\n", route.status, route.reason);
    if let Some(len) = route.content_length {
        head.push_str(&format!("Content-Length: {}\r\n", len));
    }
    for (k, v) in &route.headers {
        head.push_str(&format!("{}: {}\r\n", k, v));
    }
    head.push_str("Connection: close\r\n\r\n");
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&route.body);
    let _ = stream.flush();
}

fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    while !data.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return None,
            Ok(n) => data.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8(data).ok()
}

fn parse_request(request: &str) -> Option<RecordedRequest> {
    let mut lines = request.split("\r\n");
    let mut first = lines.next()?.split_whitespace();
    let method = first.next()?.to_string();
    let path = first.next()?.to_string();
    let headers = lines
        .take_while(|l| !l.is_empty())
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    Some(RecordedRequest {
        method,
        path,
        headers,
    })
}
