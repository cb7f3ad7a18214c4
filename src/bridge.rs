//! Bridge
//!
//! Built once per presentation process and passed by reference to whatever
//! needs to reach the host. Hands out the gateway and session controllers,
//! all sharing the same transport and device locks.

use log::info;
use std::sync::Arc;

use crate::config::BridgeConfig;
use crate::error::BridgeResult;
use crate::events::EventRegistry;
use crate::gateway::CommandGateway;
use crate::session::{DeviceLocks, RecoveryController, RecoveryKind, ScanController, ScanKind};
use crate::transport::{BoundaryTransport, StdioTransport};

/// Capability handle for the host boundary
#[derive(Clone)]
pub struct Bridge {
    config: BridgeConfig,
    gateway: CommandGateway,
    registry: EventRegistry,
    locks: Option<Arc<DeviceLocks>>,
}

impl Bridge {
    /// Spawn the configured host helper and connect to it over stdio
    pub fn connect(config: BridgeConfig) -> BridgeResult<Self> {
        let transport = StdioTransport::spawn(&config)?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    /// Use an already connected transport
    pub fn with_transport(transport: Arc<dyn BoundaryTransport>, config: BridgeConfig) -> Self {
        info!("Bridge ready over {} transport", transport.transport_type());
        let locks = config.exclusive_devices.then(DeviceLocks::new);
        Self {
            gateway: CommandGateway::new(transport.clone()),
            registry: EventRegistry::new(transport),
            config,
            locks,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn gateway(&self) -> &CommandGateway {
        &self.gateway
    }

    pub fn events(&self) -> &EventRegistry {
        &self.registry
    }

    pub fn device_locks(&self) -> Option<&Arc<DeviceLocks>> {
        self.locks.as_ref()
    }

    /// New scan controller for one view
    pub fn scan_controller(&self) -> ScanController {
        let controller = ScanController::new(ScanKind, self.gateway.clone(), self.registry.clone(), &self.config);
        match &self.locks {
            Some(locks) => controller.with_device_locks(locks.clone()),
            None => controller,
        }
    }

    /// New recovery controller for one view
    pub fn recovery_controller(&self) -> RecoveryController {
        let controller =
            RecoveryController::new(RecoveryKind, self.gateway.clone(), self.registry.clone(), &self.config);
        match &self.locks {
            Some(locks) => controller.with_device_locks(locks.clone()),
            None => controller,
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("gateway", &self.gateway)
            .field("exclusive_devices", &self.locks.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels;
    use crate::error::BridgeError;
    use crate::transport::LoopbackTransport;
    use crate::types::{RecoverableFile, RecoveryConfig, ScanConfig};
    use serde_json::json;

    fn file() -> RecoverableFile {
        serde_json::from_value(json!({"id": "f", "name": "f.png", "size": "1", "offset": "0"})).unwrap()
    }

    #[tokio::test]
    async fn test_scan_and_recovery_share_device_locks() {
        let host = Arc::new(LoopbackTransport::new());
        host.reply(channels::SCAN_START, json!({"success": true, "sessionId": "s1"}));
        host.reply(channels::RECOVERY_START, json!({"success": true, "recoveryId": "r1"}));
        let bridge = Bridge::with_transport(host.clone(), BridgeConfig::default());

        let scan = bridge.scan_controller();
        let recovery = bridge.recovery_controller();
        scan.start(ScanConfig::builder("/dev/sdb").build()).await.unwrap();

        let blocked = recovery
            .start(RecoveryConfig::new("/dev/sdb", vec![file()], "/tmp/out"))
            .await;
        assert!(matches!(blocked, Err(BridgeError::Validation(_))));

        drop(scan);
        recovery
            .start(RecoveryConfig::new("/dev/sdb", vec![file()], "/tmp/out"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_locks_disabled_by_config() {
        let host = Arc::new(LoopbackTransport::new());
        host.reply(channels::SCAN_START, json!({"success": true, "sessionId": "s1"}));
        let config = BridgeConfig { exclusive_devices: false, ..BridgeConfig::default() };
        let bridge = Bridge::with_transport(host.clone(), config);
        assert!(bridge.device_locks().is_none());

        let first = bridge.scan_controller();
        let second = bridge.scan_controller();
        first.start(ScanConfig::builder("/dev/sdb").build()).await.unwrap();
        second.start(ScanConfig::builder("/dev/sdb").build()).await.unwrap();
        assert_eq!(host.call_count(channels::SCAN_START), 2);
    }
}
