//! Boundary Transport
//!
//! The only way the presentation side reaches the privileged host:
//! - request/reply calls on a named channel
//! - push events on named channels, delivered to registered listeners
//!
//! Implementations:
//! - `StdioTransport` (host helper process speaking JSON lines)
//! - `LoopbackTransport` (in-process host stand-in)

pub mod listeners;
pub mod loopback;
pub mod stdio;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::BridgeResult;

pub use listeners::{ListenerId, ListenerTable};
pub use loopback::LoopbackTransport;
pub use stdio::{Frame, StdioTransport};

/// Listener callback; receives the positional event arguments as sent by the host
pub type RawHandler = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Transport trait - the capability handed to the gateway and the event registry
#[async_trait]
pub trait BoundaryTransport: Send + Sync {
    /// Issue one request on `channel` and await its single reply
    async fn invoke(&self, channel: &str, payload: Value) -> BridgeResult<Value>;

    /// Register a listener for push events on `channel`
    fn listen(&self, channel: &str, handler: RawHandler) -> ListenerId;

    /// Remove a listener. Returns false when it was already gone.
    fn unlisten(&self, id: ListenerId) -> bool;

    /// Get transport type name
    fn transport_type(&self) -> &'static str;
}
