//! In-memory stand-ins for the remote server.
//!
//! [`ScriptedServer`] answers calls from a script and records everything
//! the controller does to it, so lifecycle behavior can be checked without
//! a network. Unscripted methods succeed with `true`.

use crate::transport::{Connector, RemoteCallback, Transport, TransportError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// One scripted answer to a remote call.
#[derive(Debug, Clone)]
pub enum Reply {
    Value(Value),
    Fault { code: String, message: String },
    /// The connection drops while the call is in flight.
    Disconnect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Default)]
struct ServerState {
    /// Replies used once each, in order, before falling back to `fixed`.
    queued: HashMap<String, VecDeque<Reply>>,
    fixed: HashMap<String, Reply>,
    callbacks: VecDeque<RemoteCallback>,
    calls: Vec<RecordedCall>,
    connects: usize,
    terminations: usize,
    refuse_connect: Option<String>,
    drain_error: bool,
    /// Protocol error reported by the next drain only.
    garbled: Option<String>,
}

/// A scripted remote server shared between a test and the transports it
/// hands out. Cloning shares the same script and log.
#[derive(Debug, Clone)]
pub struct ScriptedServer {
    state: Arc<Mutex<ServerState>>,
}

impl ScriptedServer {
    /// A server that is immediately ready, runs in script mode (game mode
    /// `0`) and exposes the script-callbacks setting.
    pub fn new() -> Self {
        let server = Self {
            state: Arc::new(Mutex::new(ServerState::default())),
        };
        server
            .respond("GetStatus", json!({"Code": 4, "Name": "Running - Play"}))
            .respond("GetGameMode", json!(0))
            .respond(
                "GetModeScriptSettings",
                json!({"S_UseScriptCallbacks": false, "S_TimeLimit": 300}),
            )
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        // A panicking test thread must not hide the original failure.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Always answer `method` with `value`.
    pub fn respond(self, method: &str, value: Value) -> Self {
        self.lock()
            .fixed
            .insert(method.to_string(), Reply::Value(value));
        self
    }

    /// Always fail `method` with the given remote fault.
    pub fn fail(self, method: &str, code: &str, message: &str) -> Self {
        self.lock().fixed.insert(
            method.to_string(),
            Reply::Fault {
                code: code.to_string(),
                message: message.to_string(),
            },
        );
        self
    }

    /// Answer the next calls to `method` with `replies`, one each.
    pub fn respond_sequence(self, method: &str, replies: Vec<Reply>) -> Self {
        self.lock()
            .queued
            .entry(method.to_string())
            .or_default()
            .extend(replies);
        self
    }

    /// Make every connection attempt fail with `reason`.
    pub fn refuse_connections(self, reason: &str) -> Self {
        self.lock().refuse_connect = Some(reason.to_string());
        self
    }

    /// Make callback draining fail as if the connection dropped.
    pub fn break_callback_stream(&self) {
        self.lock().drain_error = true;
    }

    /// Make the next drain report an unreadable message. The connection
    /// stays up.
    pub fn garble_callback_stream(&self, reason: &str) {
        self.lock().garbled = Some(reason.to_string());
    }

    pub fn push_callback(&self, callback: RemoteCallback) {
        self.lock().callbacks.push_back(callback);
    }

    /// A connected transport bound to this script.
    pub fn transport(&self) -> Box<dyn Transport> {
        self.lock().connects += 1;
        Box::new(ScriptedTransport {
            server: self.clone(),
            connected: true,
        })
    }

    pub fn connector(&self) -> ScriptedConnector {
        ScriptedConnector {
            server: self.clone(),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.lock().calls.iter().map(|c| c.method.clone()).collect()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.method == method).count()
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn terminations(&self) -> usize {
        self.lock().terminations
    }

    fn answer(&self, method: &str, params: Vec<Value>) -> Reply {
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            method: method.to_string(),
            params,
        });
        if let Some(reply) = state.queued.get_mut(method).and_then(VecDeque::pop_front) {
            return reply;
        }
        state
            .fixed
            .get(method)
            .cloned()
            .unwrap_or(Reply::Value(Value::Bool(true)))
    }
}

impl Default for ScriptedServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Transport half of a [`ScriptedServer`].
pub struct ScriptedTransport {
    server: ScriptedServer,
    connected: bool,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn call(&mut self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        match self.server.answer(method, params) {
            Reply::Value(value) => Ok(value),
            Reply::Fault { code, message } => Err(TransportError::Remote { code, message }),
            Reply::Disconnect => {
                self.connected = false;
                Err(TransportError::Closed)
            }
        }
    }

    async fn drain_callbacks(&mut self) -> Result<Vec<RemoteCallback>, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let mut state = self.server.lock();
        if state.drain_error {
            self.connected = false;
            return Err(TransportError::Closed);
        }
        if let Some(reason) = state.garbled.take() {
            return Err(TransportError::Protocol(reason));
        }
        Ok(state.callbacks.drain(..).collect())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn terminate(&mut self) {
        if self.connected {
            self.connected = false;
            self.server.lock().terminations += 1;
        }
    }
}

/// Connector handing out [`ScriptedTransport`]s.
#[derive(Debug, Clone)]
pub struct ScriptedConnector {
    server: ScriptedServer,
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        _timeout: Duration,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let refused = self.server.lock().refuse_connect.clone();
        if let Some(reason) = refused {
            return Err(TransportError::Connect {
                address: format!("{host}:{port}"),
                reason,
            });
        }
        Ok(self.server.transport())
    }
}
