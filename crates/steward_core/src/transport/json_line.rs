//! Newline-delimited JSON transport over TCP.
//!
//! Every message is one JSON object per line:
//!
//! * request: `{"id": 7, "method": "Authenticate", "params": ["login", "pass"]}`
//! * response: `{"id": 7, "result": true}` or
//!   `{"id": 7, "error": {"code": -1000, "message": "..."}}`
//! * callback: `{"method": "ManiaPlanet.PlayerConnect", "params": [...]}`
//!
//! Callbacks that arrive while a call is waiting for its response are
//! buffered and handed out on the next [`Transport::drain_callbacks`].

use super::{Connector, RemoteCallback, Transport, TransportError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

/// Default budget for a single remote call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct Envelope {
    id: Option<u64>,
    method: Option<String>,
    #[serde(default)]
    params: Vec<Value>,
    #[serde(default)]
    result: Value,
    error: Option<Fault>,
}

#[derive(Debug, Deserialize)]
struct Fault {
    code: Value,
    #[serde(default)]
    message: String,
}

enum Incoming {
    Response {
        id: u64,
        outcome: Result<Value, TransportError>,
    },
    Callback(RemoteCallback),
}

fn parse_line(line: &[u8]) -> Result<Incoming, TransportError> {
    let envelope: Envelope = serde_json::from_slice(line)
        .map_err(|e| TransportError::Protocol(e.to_string()))?;

    match (envelope.id, envelope.method) {
        (Some(id), _) => {
            let outcome = match envelope.error {
                Some(fault) => Err(TransportError::Remote {
                    code: match fault.code {
                        Value::String(code) => code,
                        other => other.to_string(),
                    },
                    message: fault.message,
                }),
                None => Ok(envelope.result),
            };
            Ok(Incoming::Response { id, outcome })
        }
        (None, Some(method)) => Ok(Incoming::Callback(RemoteCallback {
            method,
            params: envelope.params,
        })),
        (None, None) => Err(TransportError::Protocol(
            "message has neither id nor method".to_string(),
        )),
    }
}

/// A [`Transport`] speaking newline-delimited JSON over a TCP stream.
pub struct JsonLineTransport {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    /// Bytes of a line that has not been fully received yet.
    partial: Vec<u8>,
    pending: VecDeque<RemoteCallback>,
    next_id: u64,
    call_timeout: Duration,
    connected: bool,
}

impl JsonLineTransport {
    /// Opens a connection to `address`, giving up after `timeout`.
    pub async fn connect(
        address: &str,
        timeout: Duration,
        call_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| TransportError::Connect {
                address: address.to_string(),
                reason: format!("timed out after {timeout:?}"),
            })?
            .map_err(|e| TransportError::Connect {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true).ok();

        let (read_half, write_half) = stream.into_split();
        debug!("Transport connected to {}", address);

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            partial: Vec::new(),
            pending: VecDeque::new(),
            next_id: 1,
            call_timeout,
            connected: true,
        })
    }

    /// Reads the next complete message. Cancel safe: partially received
    /// lines stay in `self.partial`.
    async fn read_message(&mut self) -> Result<Incoming, TransportError> {
        loop {
            let read = self.reader.read_until(b'\n', &mut self.partial).await;
            let read = match read {
                Ok(read) => read,
                Err(e) => {
                    self.connected = false;
                    return Err(e.into());
                }
            };
            if read == 0 {
                self.connected = false;
                return Err(TransportError::Closed);
            }
            if self.partial.last() != Some(&b'\n') {
                continue;
            }

            let line = std::mem::take(&mut self.partial);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            trace!("<- {}", String::from_utf8_lossy(&line).trim_end());
            return parse_line(&line);
        }
    }

    async fn await_response(&mut self, id: u64) -> Result<Value, TransportError> {
        loop {
            match self.read_message().await {
                Ok(Incoming::Callback(callback)) => self.pending.push_back(callback),
                Ok(Incoming::Response { id: got, outcome }) if got == id => return outcome,
                Ok(Incoming::Response { id: got, .. }) => {
                    debug!("Discarding stale response {} while waiting for {}", got, id);
                }
                Err(e) if e.is_disconnect() => return Err(e),
                Err(e) => warn!("Skipping unreadable message: {}", e),
            }
        }
    }
}

#[async_trait]
impl Transport for JsonLineTransport {
    async fn call(&mut self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        let id = self.next_id;
        self.next_id += 1;

        let mut line = serde_json::to_vec(&json!({
            "id": id,
            "method": method,
            "params": params,
        }))
        .map_err(|e| TransportError::Protocol(e.to_string()))?;
        line.push(b'\n');

        if let Err(e) = self.writer.write_all(&line).await {
            self.connected = false;
            return Err(e.into());
        }
        trace!("-> {} #{}", method, id);

        match tokio::time::timeout(self.call_timeout, self.await_response(id)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransportError::Timeout {
                method: method.to_string(),
                timeout: self.call_timeout,
            }),
        }
    }

    async fn drain_callbacks(&mut self) -> Result<Vec<RemoteCallback>, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        // Only take what is already readable; never wait for more.
        loop {
            match tokio::time::timeout(Duration::ZERO, self.read_message()).await {
                Err(_) => break,
                Ok(Ok(Incoming::Callback(callback))) => self.pending.push_back(callback),
                Ok(Ok(Incoming::Response { id, .. })) => {
                    debug!("Discarding unsolicited response {}", id);
                }
                // One bad line does not poison the stream.
                Ok(Err(e)) if !e.is_disconnect() => warn!("Skipping unreadable message: {}", e),
                Ok(Err(e)) => return Err(e),
            }
        }

        Ok(self.pending.drain(..).collect())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn terminate(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        self.pending.clear();
        if let Err(e) = self.writer.shutdown().await {
            debug!("Transport shutdown reported: {}", e);
        }
    }
}

/// Creates [`JsonLineTransport`]s.
#[derive(Debug, Clone)]
pub struct JsonLineConnector {
    call_timeout: Duration,
}

impl JsonLineConnector {
    /// Creates a connector whose transports give every call `call_timeout`.
    pub fn new(call_timeout: Duration) -> Self {
        Self { call_timeout }
    }
}

impl Default for JsonLineConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CALL_TIMEOUT)
    }
}

#[async_trait]
impl Connector for JsonLineConnector {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let address = format!("{host}:{port}");
        let transport = JsonLineTransport::connect(&address, timeout, self.call_timeout).await?;
        Ok(Box::new(transport))
    }
}
