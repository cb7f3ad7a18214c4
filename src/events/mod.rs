//! Host Events
//!
//! Typed subscriptions to the host's push channels.

pub mod payloads;
pub mod registry;

pub use payloads::{
    CompletePayload, ErrorPayload, OneOrMany, ProgressUpdate, RecoveryProgress, ScanProgress,
};
pub use registry::{decode_args, EventRegistry, Subscription, SubscriptionGroup};
