//! Loopback Transport
//!
//! In-process stand-in for the host helper. Reply handlers are registered per
//! channel, events are pushed with [`LoopbackTransport::emit`], and every call
//! is recorded so callers can assert on what crossed the boundary.

use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

use super::listeners::{ListenerId, ListenerTable};
use super::{BoundaryTransport, RawHandler};
use crate::error::{BridgeError, BridgeResult};

type ReplyHandler = Arc<dyn Fn(Value) -> BridgeResult<Value> + Send + Sync>;

/// In-process transport
pub struct LoopbackTransport {
    handlers: DashMap<String, ReplyHandler>,
    listeners: ListenerTable,
    calls: Mutex<Vec<(String, Value)>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            listeners: ListenerTable::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer calls on `channel` with `handler`
    pub fn on<F>(&self, channel: &str, handler: F)
    where
        F: Fn(Value) -> BridgeResult<Value> + Send + Sync + 'static,
    {
        self.handlers.insert(channel.to_string(), Arc::new(handler));
    }

    /// Answer every call on `channel` with the same reply
    pub fn reply(&self, channel: &str, reply: Value) {
        self.on(channel, move |_| Ok(reply.clone()));
    }

    /// Make calls on `channel` fail as if the round trip broke
    pub fn fail_transport(&self, channel: &str, message: &str) {
        let message = message.to_string();
        self.on(channel, move |_| Err(BridgeError::Transport(message.clone())));
    }

    /// Push one event with the given positional arguments.
    /// Returns the number of listeners that received it.
    pub fn emit(&self, channel: &str, args: Vec<Value>) -> usize {
        debug!("loopback event {}", channel);
        self.listeners.dispatch(channel, &args)
    }

    /// Push one event carrying a single argument
    pub fn emit_one(&self, channel: &str, arg: Value) -> usize {
        self.emit(channel, vec![arg])
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, channel: &str) -> usize {
        self.calls.lock().iter().filter(|(c, _)| c == channel).count()
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        self.listeners.count(channel)
    }

    pub fn total_listeners(&self) -> usize {
        self.listeners.total()
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BoundaryTransport for LoopbackTransport {
    async fn invoke(&self, channel: &str, payload: Value) -> BridgeResult<Value> {
        self.calls.lock().push((channel.to_string(), payload.clone()));

        let handler = self.handlers.get(channel).map(|h| h.value().clone());
        match handler {
            Some(handler) => handler(payload),
            None => Err(BridgeError::Transport(format!("No handler registered for '{}'", channel))),
        }
    }

    fn listen(&self, channel: &str, handler: RawHandler) -> ListenerId {
        self.listeners.add(channel, handler)
    }

    fn unlisten(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    fn transport_type(&self) -> &'static str {
        "loopback"
    }
}
