// tests/common.rs
#![allow(dead_code)]

use zmq_engine::options::LAST_ENDPOINT;
use zmq_engine::{Context, Msg, Socket, ZmqError};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use std::time::Duration;

use tokio::time::timeout;

static IPC_ENDPOINT_COUNTER: AtomicUsize = AtomicUsize::new(0);
static INPROC_ENDPOINT_COUNTER: AtomicUsize = AtomicUsize::new(0);

static TRACING_INIT: Once = Once::new();

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(250);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(3);

/// Installs a test-output subscriber once. `RUST_LOG` overrides the filter.
pub fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("zmq_engine=debug"));
    let subscriber = FmtSubscriber::builder()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_line_number(true)
      .with_test_writer()
      .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
  });
}

pub fn test_context() -> Context {
  setup_tracing();
  Context::new().expect("Failed to create test context")
}

pub fn unique_ipc_endpoint() -> String {
  let pid = std::process::id();
  let count = IPC_ENDPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
  format!("ipc:///tmp/zmq_engine_test_{}_{}", pid, count)
}

pub fn unique_inproc_endpoint() -> String {
  let pid = std::process::id();
  let count = INPROC_ENDPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
  format!("inproc://zmq_engine_test_{}_{}", pid, count)
}

/// A loopback port that was free a moment ago.
pub fn free_tcp_endpoint() -> String {
  let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind scratch listener");
  let port = listener.local_addr().expect("scratch listener address").port();
  format!("tcp://127.0.0.1:{}", port)
}

/// Binds and returns the concrete endpoint (resolves `tcp://...:*`).
pub async fn bind_resolve(socket: &Socket, endpoint: &str) -> Result<String, ZmqError> {
  socket.bind(endpoint).await?;
  let raw = socket.get_option(LAST_ENDPOINT).await?;
  Ok(String::from_utf8(raw).expect("LAST_ENDPOINT is not UTF-8"))
}

pub async fn recv_timeout(socket: &Socket, duration: Duration) -> Result<Msg, ZmqError> {
  match timeout(duration, socket.recv()).await {
    Ok(result) => result,
    Err(_) => Err(ZmqError::Timeout),
  }
}

pub async fn recv_multipart_timeout(socket: &Socket, duration: Duration) -> Result<Vec<Msg>, ZmqError> {
  match timeout(duration, socket.recv_multipart()).await {
    Ok(result) => result,
    Err(_) => Err(ZmqError::Timeout),
  }
}

pub async fn send_timeout(socket: &Socket, msg: Msg, duration: Duration) -> Result<(), ZmqError> {
  match timeout(duration, socket.send(msg)).await {
    Ok(result) => result,
    Err(_) => Err(ZmqError::Timeout),
  }
}

pub fn frames_as_vecs(frames: &[Msg]) -> Vec<Vec<u8>> {
  frames.iter().map(|f| f.data().to_vec()).collect()
}

/// Gives transport handshakes time to finish.
pub async fn settle() {
  tokio::time::sleep(Duration::from_millis(150)).await;
}
