//! Session Kinds
//!
//! Scan and recovery sessions share one lifecycle; a kind supplies what
//! differs: payload types, channel names and the gateway calls.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

use crate::channels;
use crate::error::BridgeResult;
use crate::events::{ProgressUpdate, RecoveryProgress, ScanProgress};
use crate::gateway::CommandGateway;
use crate::types::{RecoverableFile, RecoveredFile, RecoveryConfig, ScanConfig, SessionId};

/// Event channels a session listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventChannels {
    pub progress: &'static str,
    pub item: &'static str,
    pub complete: &'static str,
    pub error: &'static str,
}

impl EventChannels {
    pub fn all(&self) -> [&'static str; 4] {
        [self.progress, self.item, self.complete, self.error]
    }
}

/// Per-operation behaviour plugged into the session controller
#[async_trait]
pub trait SessionKind: Send + Sync + 'static {
    type Config: Clone + Debug + Send + Sync + 'static;
    type Progress: ProgressUpdate;
    type Item: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Short name used in logs and messages
    const NAME: &'static str;
    const CHANNELS: EventChannels;
    /// Message recorded when an error event carries no text
    const STREAM_FAILURE: &'static str;

    /// Device the session targets; `None` means nothing is selected
    fn target_device<'a>(&self, config: &'a Self::Config) -> Option<&'a str>;

    /// Extra local preconditions checked before `start` is issued
    fn validate(&self, _config: &Self::Config) -> Result<(), String> {
        Ok(())
    }

    async fn start(&self, gateway: &CommandGateway, config: &Self::Config) -> BridgeResult<Option<SessionId>>;
    async fn pause(&self, gateway: &CommandGateway, id: &SessionId) -> BridgeResult<()>;
    async fn resume(&self, gateway: &CommandGateway, id: &SessionId) -> BridgeResult<()>;
    async fn cancel(&self, gateway: &CommandGateway, id: &SessionId) -> BridgeResult<()>;
}

/// Device scan
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanKind;

#[async_trait]
impl SessionKind for ScanKind {
    type Config = ScanConfig;
    type Progress = ScanProgress;
    type Item = RecoverableFile;

    const NAME: &'static str = "scan";
    const CHANNELS: EventChannels = EventChannels {
        progress: channels::SCAN_PROGRESS,
        item: channels::SCAN_FILE_FOUND,
        complete: channels::SCAN_COMPLETE,
        error: channels::SCAN_ERROR,
    };
    const STREAM_FAILURE: &'static str = "Scan failed";

    fn target_device<'a>(&self, config: &'a ScanConfig) -> Option<&'a str> {
        Some(config.device_path.as_str()).filter(|p| !p.trim().is_empty())
    }

    async fn start(&self, gateway: &CommandGateway, config: &ScanConfig) -> BridgeResult<Option<SessionId>> {
        gateway.start_scan(config).await.map(Some)
    }

    async fn pause(&self, gateway: &CommandGateway, id: &SessionId) -> BridgeResult<()> {
        gateway.pause_scan(id).await
    }

    async fn resume(&self, gateway: &CommandGateway, id: &SessionId) -> BridgeResult<()> {
        gateway.resume_scan(id).await
    }

    async fn cancel(&self, gateway: &CommandGateway, id: &SessionId) -> BridgeResult<()> {
        gateway.cancel_scan(id).await
    }
}

/// File recovery from a previous scan's results
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryKind;

#[async_trait]
impl SessionKind for RecoveryKind {
    type Config = RecoveryConfig;
    type Progress = RecoveryProgress;
    type Item = RecoveredFile;

    const NAME: &'static str = "recovery";
    const CHANNELS: EventChannels = EventChannels {
        progress: channels::RECOVERY_PROGRESS,
        item: channels::RECOVERY_FILE_RECOVERED,
        complete: channels::RECOVERY_COMPLETE,
        error: channels::RECOVERY_ERROR,
    };
    const STREAM_FAILURE: &'static str = "Recovery failed";

    fn target_device<'a>(&self, config: &'a RecoveryConfig) -> Option<&'a str> {
        Some(config.device_path.as_str()).filter(|p| !p.trim().is_empty())
    }

    fn validate(&self, config: &RecoveryConfig) -> Result<(), String> {
        if config.files.is_empty() {
            return Err("No files selected for recovery".to_string());
        }
        if config.destination.as_os_str().is_empty() {
            return Err("No destination directory selected".to_string());
        }
        Ok(())
    }

    async fn start(&self, gateway: &CommandGateway, config: &RecoveryConfig) -> BridgeResult<Option<SessionId>> {
        gateway.start_recovery(config).await
    }

    async fn pause(&self, gateway: &CommandGateway, id: &SessionId) -> BridgeResult<()> {
        gateway.pause_recovery(id).await
    }

    async fn resume(&self, gateway: &CommandGateway, id: &SessionId) -> BridgeResult<()> {
        gateway.resume_recovery(id).await
    }

    async fn cancel(&self, gateway: &CommandGateway, id: &SessionId) -> BridgeResult<()> {
        gateway.cancel_recovery(id).await
    }
}
