//! Session Lifecycle Controller
//!
//! Drives one session at a time for a single view:
//! - issues start/pause/resume/cancel through the gateway
//! - wires the four host event channels into the store
//! - releases every subscription (and any device lock) on teardown
//!
//! The controller is the only writer of its store.

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::kind::{RecoveryKind, ScanKind, SessionKind};
use super::locks::{DeviceLease, DeviceLocks};
use super::state::SessionStatus;
use super::store::SessionStore;
use crate::config::{BridgeConfig, ControlFailurePolicy};
use crate::error::{BridgeError, BridgeResult};
use crate::events::{CompletePayload, ErrorPayload, EventRegistry, OneOrMany, ProgressUpdate, SubscriptionGroup};
use crate::gateway::CommandGateway;
use crate::types::SessionId;

pub type ScanController = SessionController<ScanKind>;
pub type RecoveryController = SessionController<RecoveryKind>;

type Store<K> = SessionStore<<K as SessionKind>::Progress, <K as SessionKind>::Item>;
type LeaseSlot = Arc<Mutex<Option<DeviceLease>>>;

/// Which control command is being issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Pause,
    Resume,
    Cancel,
}

impl Control {
    fn verb(self) -> &'static str {
        match self {
            Control::Pause => "pause",
            Control::Resume => "resume",
            Control::Cancel => "cancel",
        }
    }

    fn target(self) -> SessionStatus {
        match self {
            Control::Pause => SessionStatus::Paused,
            Control::Resume => SessionStatus::Running,
            Control::Cancel => SessionStatus::Cancelled,
        }
    }
}

/// Per-view session state machine
pub struct SessionController<K: SessionKind> {
    kind: K,
    gateway: CommandGateway,
    registry: EventRegistry,
    store: Arc<Store<K>>,
    subscriptions: Mutex<Option<SubscriptionGroup>>,
    policy: ControlFailurePolicy,
    locks: Option<Arc<DeviceLocks>>,
    lease: LeaseSlot,
    /// Set while `start` waits for the host's reply
    starting: Arc<AtomicBool>,
}

/// Clears the in-flight flag when `start` finishes or is abandoned
struct StartGuard(Arc<AtomicBool>);

impl StartGuard {
    fn enter(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag.clone())
    }
}

impl Drop for StartGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<K: SessionKind> SessionController<K> {
    pub fn new(kind: K, gateway: CommandGateway, registry: EventRegistry, config: &BridgeConfig) -> Self {
        Self {
            kind,
            gateway,
            registry,
            store: Arc::new(SessionStore::new(config.event_buffer)),
            subscriptions: Mutex::new(None),
            policy: config.control_failure_policy,
            locks: None,
            lease: Arc::new(Mutex::new(None)),
            starting: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share device locks with other controllers
    pub fn with_device_locks(mut self, locks: Arc<DeviceLocks>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn with_policy(mut self, policy: ControlFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Read side of the session state
    pub fn store(&self) -> &Arc<Store<K>> {
        &self.store
    }

    pub fn status(&self) -> SessionStatus {
        self.store.status()
    }

    pub fn is_activated(&self) -> bool {
        self.subscriptions.lock().is_some()
    }

    /// Subscribe to the kind's event channels. Only the first call subscribes.
    pub fn activate(&self) {
        let mut slot = self.subscriptions.lock();
        if slot.is_some() {
            return;
        }

        let channels = K::CHANNELS;
        let mut group = SubscriptionGroup::new();

        let store = self.store.clone();
        let starting = self.starting.clone();
        group.push(self.registry.subscribe(channels.progress, move |update: K::Progress| {
            if is_stale(&store, &starting, update.session_id()) {
                debug!("Dropping progress for another {} session", K::NAME);
                return;
            }
            if let Some(id) = update.session_id() {
                if store.session_id().is_none() {
                    store.set_session_id(id.clone());
                }
            }
            store.merge_progress(update);
        }));

        let store = self.store.clone();
        let starting = self.starting.clone();
        group.push(self.registry.subscribe(channels.item, move |batch: OneOrMany<K::Item>| {
            // Items carry no session id; only accept them once a session is under way
            if starting.load(Ordering::SeqCst) || store.status() == SessionStatus::Idle {
                debug!("Dropping {} items outside a session", K::NAME);
                return;
            }
            let total = store.append_items(batch.into_vec());
            debug!("{} items so far: {}", K::NAME, total);
        }));

        let store = self.store.clone();
        let starting = self.starting.clone();
        let lease = self.lease.clone();
        group.push(self.registry.subscribe(channels.complete, move |done: Option<CompletePayload>| {
            let done = done.unwrap_or_default();
            if is_stale(&store, &starting, done.session_id.as_ref()) {
                debug!("Dropping completion for another {} session", K::NAME);
                return;
            }
            if let Some(id) = done.session_id {
                store.set_session_id(id);
            }
            store.set_status(SessionStatus::Completed);
            lease.lock().take();
            info!("{} completed ({} files)", K::NAME, done.files_found);
        }));

        let store = self.store.clone();
        let starting = self.starting.clone();
        let lease = self.lease.clone();
        group.push(self.registry.subscribe(channels.error, move |raw: Value| {
            let failure = ErrorPayload::from_event(raw);
            if is_stale(&store, &starting, failure.session_id.as_ref()) {
                debug!("Dropping error for another {} session", K::NAME);
                return;
            }
            let message = failure.message_or(K::STREAM_FAILURE);
            warn!("{} error from host: {}", K::NAME, message);
            store.set_error(message);
            store.set_status(SessionStatus::Error);
            lease.lock().take();
        }));

        debug!("{} controller subscribed to {} channels", K::NAME, group.len());
        *slot = Some(group);
    }

    /// Release every subscription and any device lock. Safe to call repeatedly.
    pub fn teardown(&self) {
        let group = self.subscriptions.lock().take();
        if let Some(mut group) = group {
            let released = group.dispose_all();
            debug!("{} controller released {} subscriptions", K::NAME, released);
        }
        self.lease.lock().take();
    }

    /// Start a new session. Does nothing on the host when no device is
    /// selected or a session is already in flight.
    pub async fn start(&self, config: K::Config) -> BridgeResult<()> {
        let device = self
            .kind
            .target_device(&config)
            .ok_or_else(|| BridgeError::Validation("No device selected".into()))?
            .to_string();
        self.kind.validate(&config).map_err(BridgeError::Validation)?;

        if self.starting.load(Ordering::SeqCst) {
            return Err(BridgeError::Validation(format!("A {} session is already starting", K::NAME)));
        }
        let status = self.store.status();
        if status.is_active() {
            return Err(BridgeError::Validation(format!(
                "A {} session is already {}",
                K::NAME,
                status
            )));
        }

        let lease = match &self.locks {
            Some(locks) => Some(locks.acquire(&device, K::NAME)?),
            None => None,
        };

        self.activate();
        let guard = StartGuard::enter(&self.starting);
        self.store.reset();

        info!("Starting {} on {}", K::NAME, device);
        let result = self.kind.start(&self.gateway, &config).await;
        match result {
            Ok(id) => {
                if let Some(id) = id {
                    self.store.set_session_id(id);
                }
                self.store.set_status(SessionStatus::Running);
                drop(guard);
                // A completion may already have landed while the reply was in flight
                if !self.store.status().is_terminal() {
                    *self.lease.lock() = lease;
                }
                Ok(())
            }
            Err(e) => {
                self.store.set_error(e.to_string());
                self.store.set_status(SessionStatus::Error);
                drop(guard);
                Err(e)
            }
        }
    }

    pub async fn pause(&self) -> BridgeResult<()> {
        self.control(Control::Pause).await
    }

    pub async fn resume(&self) -> BridgeResult<()> {
        self.control(Control::Resume).await
    }

    /// Ask the host to cancel. Status only becomes `cancelled` once the host agrees.
    pub async fn cancel(&self) -> BridgeResult<()> {
        self.control(Control::Cancel).await
    }

    async fn control(&self, command: Control) -> BridgeResult<()> {
        let Some(id) = self.store.session_id() else {
            debug!("No {} session to {}", K::NAME, command.verb());
            return Err(BridgeError::Validation(format!("No active {} session", K::NAME)));
        };

        let result = match command {
            Control::Pause => self.kind.pause(&self.gateway, &id).await,
            Control::Resume => self.kind.resume(&self.gateway, &id).await,
            Control::Cancel => self.kind.cancel(&self.gateway, &id).await,
        };

        match result {
            Ok(()) => {
                if self.store.set_status(command.target()) && command == Control::Cancel {
                    self.lease.lock().take();
                }
                Ok(())
            }
            Err(e) => {
                self.record_control_failure(&id, command, &e);
                Err(e)
            }
        }
    }

    fn record_control_failure(&self, id: &SessionId, command: Control, error: &BridgeError) {
        warn!("Failed to {} {} {}: {}", command.verb(), K::NAME, id, error);
        self.store.set_error(error.to_string());
        if self.policy == ControlFailurePolicy::MarkError {
            self.store.set_status(SessionStatus::Error);
            self.lease.lock().take();
        }
    }
}

/// An event for a different session than the recorded one. While a start is
/// in flight every event naming a session is stale: the reply decides the id.
fn is_stale<P: ProgressUpdate, I: Clone>(
    store: &SessionStore<P, I>,
    starting: &AtomicBool,
    incoming: Option<&SessionId>,
) -> bool {
    let Some(incoming) = incoming else {
        return false;
    };
    if starting.load(Ordering::SeqCst) {
        return true;
    }
    match store.session_id() {
        Some(current) => current != *incoming,
        None => false,
    }
}

impl<K: SessionKind> Drop for SessionController<K> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<K: SessionKind> std::fmt::Debug for SessionController<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("kind", &K::NAME)
            .field("store", &self.store)
            .field("activated", &self.is_activated())
            .field("policy", &self.policy)
            .finish()
    }
}
