//! Event Subscription Registry
//!
//! Wraps the transport's raw listener primitive. Each `subscribe` registers
//! exactly one listener and hands back a [`Subscription`] that removes exactly
//! that listener. Disposal is idempotent and never fails.

use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::error::{BridgeError, BridgeResult};
use crate::transport::{BoundaryTransport, ListenerId, RawHandler};

/// Decode positional event arguments into a typed payload (first argument)
pub fn decode_args<T: DeserializeOwned>(args: &[Value]) -> BridgeResult<T> {
    let first = args.first().cloned().unwrap_or(Value::Null);
    serde_json::from_value(first).map_err(|e| BridgeError::Decode(e.to_string()))
}

/// Registers typed callbacks against named event channels
#[derive(Clone)]
pub struct EventRegistry {
    transport: Arc<dyn BoundaryTransport>,
}

impl EventRegistry {
    pub fn new(transport: Arc<dyn BoundaryTransport>) -> Self {
        Self { transport }
    }

    /// Subscribe `callback` to `channel`; events that fail to decode as `T`
    /// are logged and dropped.
    pub fn subscribe<T, F>(&self, channel: &str, callback: F) -> Subscription
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let gate = active.clone();
        let name = channel.to_string();

        let handler: RawHandler = Arc::new(move |args: &[Value]| {
            // A dispatch that raced with dispose must not deliver
            if !gate.load(Ordering::SeqCst) {
                return;
            }
            match decode_args::<T>(args) {
                Ok(payload) => callback(payload),
                Err(e) => warn!("Dropping malformed {} event: {}", name, e),
            }
        });

        let id = self.transport.listen(channel, handler);
        debug!("Subscribed to {} (listener {})", channel, id);

        Subscription {
            channel: channel.to_string(),
            id,
            transport: Arc::downgrade(&self.transport),
            active,
        }
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("transport", &self.transport.transport_type())
            .finish()
    }
}

/// Disposer for one registered listener. Dropping it disposes it.
pub struct Subscription {
    channel: String,
    id: ListenerId,
    transport: Weak<dyn BoundaryTransport>,
    active: Arc<AtomicBool>,
}

impl Subscription {
    /// Remove the listener. Returns true only for the call that actually
    /// released it; every later call is a no-op.
    pub fn dispose(&self) -> bool {
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }

        match self.transport.upgrade() {
            Some(transport) => {
                if !transport.unlisten(self.id) {
                    debug!("Listener {} on {} was already gone", self.id, self.channel);
                }
            }
            None => debug!("Transport for {} already dropped", self.channel),
        }
        true
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Owns a set of subscriptions and releases all of them together
#[derive(Debug, Default)]
pub struct SubscriptionGroup {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.subscriptions.iter().filter(|s| s.is_active()).count()
    }

    /// Dispose every member, each independently of the others.
    /// Returns how many were released by this call.
    pub fn dispose_all(&mut self) -> usize {
        let mut released = 0;
        for subscription in &self.subscriptions {
            match catch_unwind(AssertUnwindSafe(|| subscription.dispose())) {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(_) => error!("Disposing listener on {} panicked", subscription.channel),
            }
        }
        released
    }
}

impl Drop for SubscriptionGroup {
    fn drop(&mut self) {
        self.dispose_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::payloads::ErrorPayload;
    use crate::transport::LoopbackTransport;
    use parking_lot::Mutex;
    use serde_json::json;

    fn setup() -> (Arc<LoopbackTransport>, EventRegistry) {
        let transport = Arc::new(LoopbackTransport::new());
        let registry = EventRegistry::new(transport.clone());
        (transport, registry)
    }

    #[test]
    fn test_each_subscribe_registers_one_listener() {
        let (host, registry) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = seen.clone();
        let _a = registry.subscribe("scan.error", move |e: ErrorPayload| s1.lock().push(("a", e.message)));
        let s2 = seen.clone();
        let _b = registry.subscribe("scan.error", move |e: ErrorPayload| s2.lock().push(("b", e.message)));
        assert_eq!(host.listener_count("scan.error"), 2);

        host.emit_one("scan.error", json!({"message": "boom"}));
        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&("a", Some("boom".to_string()))));
        assert!(seen.contains(&("b", Some("boom".to_string()))));
    }

    #[test]
    fn test_double_dispose_is_noop() {
        let (host, registry) = setup();
        let hits = Arc::new(Mutex::new(0));
        let h = hits.clone();
        let sub = registry.subscribe("scan.progress", move |_: Value| *h.lock() += 1);

        host.emit_one("scan.progress", json!({}));
        assert!(sub.dispose());
        assert!(!sub.dispose());

        host.emit_one("scan.progress", json!({}));
        host.emit_one("scan.progress", json!({}));
        assert_eq!(*hits.lock(), 1);
        assert_eq!(host.listener_count("scan.progress"), 0);
    }

    #[test]
    fn test_dispose_removes_only_its_listener() {
        let (host, registry) = setup();
        let first = registry.subscribe("scan.complete", |_: Value| {});
        let _second = registry.subscribe("scan.complete", |_: Value| {});

        first.dispose();
        assert_eq!(host.listener_count("scan.complete"), 1);
    }

    #[test]
    fn test_dispose_after_transport_dropped() {
        let (host, registry) = setup();
        let sub = registry.subscribe("scan.error", |_: Value| {});
        drop(registry);
        drop(host);

        assert!(sub.dispose());
        assert!(!sub.dispose());
    }

    #[test]
    fn test_malformed_payload_not_forwarded() {
        let (host, registry) = setup();
        let hits = Arc::new(Mutex::new(0));
        let h = hits.clone();
        let _sub = registry.subscribe("scan.error", move |_: ErrorPayload| *h.lock() += 1);

        assert_eq!(host.emit_one("scan.error", json!("not an object")), 1);
        assert_eq!(*hits.lock(), 0);
    }

    #[test]
    fn test_group_disposes_everything_once() {
        let (host, registry) = setup();
        let mut group = SubscriptionGroup::new();
        group.push(registry.subscribe("scan.progress", |_: Value| {}));
        group.push(registry.subscribe("scan.error", |_: Value| {}));
        assert_eq!(host.total_listeners(), 2);

        assert_eq!(group.dispose_all(), 2);
        assert_eq!(group.dispose_all(), 0);
        assert_eq!(host.total_listeners(), 0);
        assert_eq!(group.active_count(), 0);
    }

    #[test]
    fn test_dropping_group_disposes() {
        let (host, registry) = setup();
        {
            let mut group = SubscriptionGroup::new();
            group.push(registry.subscribe("scan.fileFound", |_: Value| {}));
            assert_eq!(host.total_listeners(), 1);
        }
        assert_eq!(host.total_listeners(), 0);
    }
}
