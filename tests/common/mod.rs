//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

use video_resilience::config::ServiceConfig;
use video_resilience::http::AppState;
use video_resilience::lifecycle::Shutdown;
use video_resilience::store::AssetStore;
use video_resilience::webhook::{compute_signature, format_signature_header};
use video_resilience::HttpServer;

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";
pub const ADMIN_KEY: &str = "test-admin-key";

/// A request as seen by the mock provider.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

pub struct MockProvider {
    pub addr: SocketAddr,
    calls: Arc<AtomicU32>,
}

impl MockProvider {
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Start a programmable mock provider on an ephemeral port.
///
/// `f` receives the zero-based call number and the request, and returns
/// the status code and JSON body to send back.
pub async fn start_mock_provider<F, Fut>(f: F) -> MockProvider
where
    F: Fn(u32, MockRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let f = Arc::new(f);

    let counter = calls.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let f = f.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                let (mut socket, request) = match read_request(socket).await {
                    Some(parsed) => parsed,
                    None => return,
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let (status, body) = f(n, request).await;

                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reason(status),
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    MockProvider { addr, calls }
}

async fn read_request(mut socket: TcpStream) -> Option<(TcpStream, MockRequest)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    Some((socket, MockRequest { method, path, body }))
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Provider JSON for an asset in `status`.
pub fn asset_json(id: &str, status: &str) -> String {
    if status == "ready" {
        format!(
            r#"{{"data":{{"id":"{}","status":"ready","duration":12.5,"playback_ids":[{{"id":"pb-{}","policy":"public"}}]}}}}"#,
            id, id
        )
    } else {
        format!(r#"{{"data":{{"id":"{}","status":"{}"}}}}"#, id, status)
    }
}

/// Config tuned for fast tests against `provider_url`.
pub fn test_config(provider_url: &str) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.provider.base_url = provider_url.to_string();
    config.provider.token_id = "token-id".into();
    config.provider.token_secret = "token-secret".into();
    config.provider.request_timeout_ms = 2_000;
    config.circuit_breaker.failure_threshold = 3;
    config.circuit_breaker.cooldown_ms = 60_000;
    config.retries.max_attempts = 3;
    config.retries.base_delay_ms = 10;
    config.retries.max_delay_ms = 50;
    config.polling.base_interval_ms = 20;
    config.polling.max_interval_ms = 100;
    config.polling.error_backoff_ms = 20;
    config.polling.max_backoff_ms = 100;
    config.polling.degraded_interval_ms = 50;
    config.webhook.secret = WEBHOOK_SECRET.into();
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.into();
    config.observability.metrics_enabled = false;
    config
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub shutdown: Shutdown,
    pub config_tx: mpsc::UnboundedSender<ServiceConfig>,
    pub handle: tokio::task::JoinHandle<Result<(), std::io::Error>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = self.handle.await;
    }
}

/// Run the full HTTP server on an ephemeral port.
pub async fn spawn_server(config: ServiceConfig) -> TestServer {
    spawn_server_with_store(config, AssetStore::new(None)).await
}

/// Run the full HTTP server over an existing asset store.
pub async fn spawn_server_with_store(config: ServiceConfig, store: AssetStore) -> TestServer {
    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, store, shutdown.token()).unwrap();
    let state = server.state().clone();

    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (config_tx, config_rx) = mpsc::unbounded_channel();
    let shutdown_rx: broadcast::Receiver<()> = shutdown.subscribe();

    let handle = tokio::spawn(server.run(listener, config_rx, shutdown_rx));

    TestServer {
        addr,
        state,
        shutdown,
        config_tx,
        handle,
    }
}

pub fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
}

/// `mux-signature` header value for `payload` signed at `timestamp`.
pub fn sign(payload: &str, timestamp: i64, secret: &str) -> String {
    let signature = compute_signature(payload.as_bytes(), timestamp, secret.as_bytes());
    format_signature_header(timestamp, &signature)
}

/// Poll `condition` every 10ms for up to `attempts` tries.
pub async fn eventually<F: Fn() -> bool>(attempts: u32, condition: F) -> bool {
    for _ in 0..attempts {
        if condition() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    condition()
}
