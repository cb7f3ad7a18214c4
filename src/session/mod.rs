//! Session Management Module
//!
//! Scan and recovery sessions driven from the presentation side:
//! - Status machine and snapshots (`state`)
//! - Single-writer reactive store (`store`)
//! - Lifecycle controller bound to a view's lifetime (`controller`)
//! - Per-device exclusivity across controllers (`locks`)

pub mod controller;
pub mod kind;
pub mod locks;
pub mod state;
pub mod store;

pub use controller::{RecoveryController, ScanController, SessionController};
pub use kind::{EventChannels, RecoveryKind, ScanKind, SessionKind};
pub use locks::{DeviceLease, DeviceLocks};
pub use state::{SessionSnapshot, SessionStatus};
pub use store::{SessionStore, StoreChange};
