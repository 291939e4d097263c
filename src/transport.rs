//! Command transport: one TCP connection per command, parse-driven response framing.
//!
//! - [Transport]: the seam the graph primitives talk through.
//! - [TcpTransport]: connects, writes the command once, reads until the accumulated bytes
//!   decode as one JSON document or the peer closes.
//! - [ResponseBuffer]: the framing logic on its own, independent of any socket.
//!
//! The host must answer with a top-level JSON object. A bare scalar prefix (`1` of `12`)
//! would decode early, so framing is only sound for object responses.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, instrument, trace};

use crate::types::{Command, CommandResult, FailureKind};

/// Default host address of the editor's command endpoint.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default port of the editor's command endpoint.
pub const DEFAULT_PORT: u16 = 55557;
/// Default wait limit for connect + send + receive of one command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

const READ_CHUNK: usize = 64 * 1024;

/// Sends one command and returns its classified result. Never retries.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, command: &Command) -> CommandResult;
}

/// Accumulates response bytes and reports the document once they decode.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
  bytes: Vec<u8>,
}

impl ResponseBuffer {
  pub fn new() -> Self {
    Self::default()
  }

  /// Appends a chunk and tries to decode everything received so far.
  pub fn push(&mut self, chunk: &[u8]) -> Option<Value> {
    self.bytes.extend_from_slice(chunk);
    serde_json::from_slice(&self.bytes).ok()
  }

  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }

  /// Received bytes as text, undecodable sequences replaced.
  pub fn lossy_text(&self) -> String {
    String::from_utf8_lossy(&self.bytes).into_owned()
  }
}

/// Writes `payload` once, then reads until a complete document or end of stream.
#[instrument(level = "trace", skip(stream, payload))]
pub(crate) async fn exchange<S>(stream: &mut S, command_name: &str, payload: &[u8]) -> CommandResult
where
  S: AsyncRead + AsyncWrite + Unpin,
{
  if let Err(e) = stream.write_all(payload).await {
    return io_failure(command_name, "send", e);
  }
  if let Err(e) = stream.flush().await {
    return io_failure(command_name, "send", e);
  }

  let mut buffer = ResponseBuffer::new();
  let mut chunk = vec![0u8; READ_CHUNK];
  loop {
    let n = match stream.read(&mut chunk).await {
      Ok(n) => n,
      Err(e) => return io_failure(command_name, "receive", e),
    };
    if n == 0 {
      break;
    }
    trace!(command = %command_name, chunk_len = n, buffered = buffer.bytes().len() + n, "received chunk");
    if let Some(doc) = buffer.push(&chunk[..n]) {
      return CommandResult::from_response(command_name, doc);
    }
  }

  debug!(command = %command_name, buffered = buffer.bytes().len(), "stream closed before a complete response");
  CommandResult::failure(
    command_name,
    FailureKind::IncompleteResponse,
    Value::String(buffer.lossy_text()),
  )
}

fn io_failure(command_name: &str, stage: &str, e: std::io::Error) -> CommandResult {
  CommandResult::failure(
    command_name,
    FailureKind::IoError,
    json!(format!("{}: {}", stage, e)),
  )
}

/// TCP transport to the host's command endpoint.
#[derive(Debug, Clone)]
pub struct TcpTransport {
  addr: String,
  timeout: Duration,
}

impl TcpTransport {
  pub fn new(host: impl AsRef<str>, port: u16, timeout: Duration) -> Self {
    Self {
      addr: format!("{}:{}", host.as_ref(), port),
      timeout,
    }
  }

  pub fn addr(&self) -> &str {
    &self.addr
  }

  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  async fn connect_and_exchange(&self, command_name: &str, payload: &[u8]) -> CommandResult {
    let mut stream = match TcpStream::connect(&self.addr).await {
      Ok(s) => s,
      Err(e) => return io_failure(command_name, "connect", e),
    };
    exchange(&mut stream, command_name, payload).await
  }
}

impl Default for TcpTransport {
  fn default() -> Self {
    Self::new(DEFAULT_HOST, DEFAULT_PORT, DEFAULT_TIMEOUT)
  }
}

#[async_trait]
impl Transport for TcpTransport {
  #[instrument(level = "trace", skip(self, command), fields(command = %command.name(), addr = %self.addr))]
  async fn send(&self, command: &Command) -> CommandResult {
    let payload = match command.to_wire() {
      Ok(p) => p,
      Err(e) => {
        return CommandResult::failure(
          command.name(),
          FailureKind::IoError,
          json!(format!("encode: {}", e)),
        );
      }
    };
    debug!(command = %command.name(), bytes = payload.len(), "sending command");
    match tokio::time::timeout(
      self.timeout,
      self.connect_and_exchange(command.name(), &payload),
    )
    .await
    {
      Ok(result) => result,
      Err(_) => CommandResult::failure(
        command.name(),
        FailureKind::Timeout,
        json!(format!(
          "no complete response from {} within {}ms",
          self.addr,
          self.timeout.as_millis()
        )),
      ),
    }
  }
}
