//! Listener bookkeeping shared by the transport implementations.

use dashmap::DashMap;
use log::debug;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

use super::RawHandler;

/// Identifies one registered listener
pub type ListenerId = u64;

/// Channel -> listeners table
///
/// Handlers are invoked outside the map's shard locks, so a handler may
/// register or remove listeners while it runs.
pub struct ListenerTable {
    next_id: AtomicU64,
    by_channel: DashMap<String, Vec<(ListenerId, RawHandler)>>,
    channel_of: DashMap<ListenerId, String>,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            by_channel: DashMap::new(),
            channel_of: DashMap::new(),
        }
    }

    pub fn add(&self, channel: &str, handler: RawHandler) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.channel_of.insert(id, channel.to_string());
        self.by_channel
            .entry(channel.to_string())
            .or_default()
            .push((id, handler));
        debug!("Listener {} registered on {}", id, channel);
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let Some((_, channel)) = self.channel_of.remove(&id) else {
            return false;
        };

        let mut emptied = false;
        if let Some(mut listeners) = self.by_channel.get_mut(&channel) {
            listeners.retain(|(lid, _)| *lid != id);
            emptied = listeners.is_empty();
        }
        if emptied {
            self.by_channel.remove_if(&channel, |_, l| l.is_empty());
        }
        debug!("Listener {} removed from {}", id, channel);
        true
    }

    /// Deliver one event to every listener on `channel`, in registration order.
    /// Returns the number of listeners invoked.
    pub fn dispatch(&self, channel: &str, args: &[Value]) -> usize {
        let handlers: Vec<RawHandler> = match self.by_channel.get(channel) {
            Some(listeners) => listeners.iter().map(|(_, h)| h.clone()).collect(),
            None => return 0,
        };

        for handler in &handlers {
            handler(args);
        }
        handlers.len()
    }

    pub fn count(&self, channel: &str) -> usize {
        self.by_channel.get(channel).map(|l| l.len()).unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.channel_of.len()
    }
}

impl Default for ListenerTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, RawHandler) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        (hits, Arc::new(move |_args: &[Value]| {
            h.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_independent_listeners_on_one_channel() {
        let table = ListenerTable::new();
        let (a, ha) = counter();
        let (b, hb) = counter();
        table.add("scan.progress", ha);
        table.add("scan.progress", hb);

        assert_eq!(table.dispatch("scan.progress", &[json!({})]), 2);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_is_exact_and_idempotent() {
        let table = ListenerTable::new();
        let (a, ha) = counter();
        let (b, hb) = counter();
        let id_a = table.add("scan.error", ha);
        table.add("scan.error", hb);

        assert!(table.remove(id_a));
        assert!(!table.remove(id_a));

        table.dispatch("scan.error", &[]);
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(table.count("scan.error"), 1);
    }

    #[test]
    fn test_handler_may_remove_itself() {
        let table = Arc::new(ListenerTable::new());
        let slot = Arc::new(AtomicU64::new(0));
        let (t, s) = (table.clone(), slot.clone());
        let id = table.add(
            "scan.complete",
            Arc::new(move |_args: &[Value]| {
                t.remove(s.load(Ordering::SeqCst));
            }),
        );
        slot.store(id, Ordering::SeqCst);

        assert_eq!(table.dispatch("scan.complete", &[]), 1);
        assert_eq!(table.dispatch("scan.complete", &[]), 0);
        assert_eq!(table.total(), 0);
    }
}
