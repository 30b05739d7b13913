//! Shared utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use hyper::{HeaderMap, StatusCode, Uri};
use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use lb_client::http::{LbRequest, LbResponse, Transport, TransportError, TransportOptions};
use lb_client::load_balancer::{ServerDirectory, ServerIdentity};
use lb_client::resilience::{AttemptFailure, BackoffStrategy, RetryContext, RetryListener};

/// One scripted transport outcome.
#[derive(Debug, Clone)]
pub enum Step {
    Respond(u16, &'static str),
    Fail(TransportError),
}

/// What the transport saw for one attempt.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub uri: Uri,
    pub headers: HeaderMap,
    pub options: TransportOptions,
}

/// In-memory transport replaying a script; the last step repeats forever.
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    pub seen: Mutex<Vec<SeenRequest>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(None),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn hosts(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|r| format!("{}", r.uri.authority().unwrap()))
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(
        &self,
        request: LbRequest,
        options: &TransportOptions,
    ) -> Result<LbResponse, TransportError> {
        self.seen.lock().unwrap().push(SeenRequest {
            uri: request.uri.clone(),
            headers: request.headers.clone(),
            options: *options,
        });

        let step = {
            let mut steps = self.steps.lock().unwrap();
            let mut last = self.last.lock().unwrap();
            match steps.pop_front() {
                Some(step) => {
                    *last = Some(step.clone());
                    step
                }
                None => last.clone().expect("empty script"),
            }
        };

        match step {
            Step::Respond(status, body) => {
                Ok(LbResponse::new(StatusCode::from_u16(status).unwrap(), request.uri).with_body(body))
            }
            Step::Fail(error) => Err(error),
        }
    }
}

/// Directory rotating over fixed servers and counting every call.
pub struct RecordingDirectory {
    servers: Vec<ServerIdentity>,
    cursor: AtomicUsize,
    choice_limit: AtomicUsize,
    pub chosen: AtomicUsize,
    pub marked_down: Mutex<Vec<ServerIdentity>>,
}

impl RecordingDirectory {
    pub fn new(count: u16) -> Arc<Self> {
        Self::with_servers((0..count).map(|i| ServerIdentity::new("10.0.0.1", 9000 + i)).collect())
    }

    pub fn with_servers(servers: Vec<ServerIdentity>) -> Arc<Self> {
        Arc::new(Self {
            servers,
            cursor: AtomicUsize::new(0),
            choice_limit: AtomicUsize::new(usize::MAX),
            chosen: AtomicUsize::new(0),
            marked_down: Mutex::new(Vec::new()),
        })
    }

    pub fn choose_calls(&self) -> usize {
        self.chosen.load(Ordering::SeqCst)
    }

    /// Answer `None` to every `choose` after the first `limit` ones.
    pub fn empty_after(&self, limit: usize) {
        self.choice_limit.store(limit, Ordering::SeqCst);
    }
}

#[async_trait]
impl ServerDirectory for RecordingDirectory {
    async fn choose(&self, _service: &str) -> Option<ServerIdentity> {
        let previous = self.chosen.fetch_add(1, Ordering::SeqCst);
        if self.servers.is_empty() || previous >= self.choice_limit.load(Ordering::SeqCst) {
            return None;
        }
        let i = self.cursor.fetch_add(1, Ordering::SeqCst) % self.servers.len();
        Some(self.servers[i].clone())
    }

    async fn mark_down(&self, server: &ServerIdentity) {
        self.marked_down.lock().unwrap().push(server.clone());
    }

    async fn all_servers(&self, _service: &str) -> Vec<ServerIdentity> {
        self.servers.clone()
    }
}

/// Backoff that only counts its invocations.
#[derive(Default)]
pub struct CountingBackoff {
    pub waits: AtomicUsize,
}

#[async_trait]
impl BackoffStrategy for CountingBackoff {
    async fn wait(&self, _ctx: &RetryContext) {
        self.waits.fetch_add(1, Ordering::SeqCst);
    }
}

/// Listener recording hook calls; vetoes retries when `allow` is false.
pub struct RecordingListener {
    allow: AtomicBool,
    pub before: AtomicUsize,
    pub errors: AtomicUsize,
    pub closes: AtomicUsize,
}

impl RecordingListener {
    pub fn new(allow: bool) -> Arc<Self> {
        Arc::new(Self {
            allow: AtomicBool::new(allow),
            before: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        })
    }
}

impl RetryListener for RecordingListener {
    fn on_before_attempt(&self, _ctx: &RetryContext) -> bool {
        self.before.fetch_add(1, Ordering::SeqCst);
        self.allow.load(Ordering::SeqCst)
    }

    fn on_error(&self, _ctx: &RetryContext, _failure: &AttemptFailure) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    fn on_close(&self, _ctx: &RetryContext, _failure: Option<&AttemptFailure>) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn refused() -> TransportError {
    TransportError::ConnectionRefused("10.0.0.1:9000".into())
}

pub fn io_error() -> TransportError {
    TransportError::Io("unexpected eof".into())
}

fn status_line(status: u16) -> String {
    let code = StatusCode::from_u16(status).expect("valid status code");
    format!("{} {}", code.as_u16(), code.canonical_reason().unwrap_or("Unknown"))
}

/// Start a programmable mock backend on an ephemeral port and return its address.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    start_programmable_backend_on("127.0.0.1:0".parse().unwrap(), f).await
}

/// Start a programmable mock backend on `addr` and return the bound address.
pub async fn start_programmable_backend_on<F, Fut>(addr: SocketAddr, f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        // Consume the request head before answering.
                        let mut buf = Vec::with_capacity(1024);
                        let mut chunk = [0u8; 1024];
                        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut chunk).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                            }
                        }

                        let (status, body) = f().await;
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_line(status),
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Address on which nothing listens.
pub fn closed_port_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}
