//! Recovery bridge
//!
//! Session control plane that lets a sandboxed presentation process drive a
//! privileged recovery helper: device listing, scans, file recovery,
//! privilege elevation and previews, all through one narrow boundary.

pub mod bridge;
pub mod channels;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod session;
pub mod transport;
pub mod types;

pub use bridge::Bridge;
pub use config::{BridgeConfig, ControlFailurePolicy};
pub use error::{BridgeError, BridgeResult};
pub use gateway::CommandGateway;
pub use session::{RecoveryController, ScanController, SessionStatus};
