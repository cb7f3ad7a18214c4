//! Command Gateway
//!
//! One method per host command. Each method makes exactly one boundary call,
//! checks the reply envelope and returns the payload it cares about. The
//! gateway holds no state of its own and never retries.

pub mod envelope;

use log::{debug, warn};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

use crate::channels;
use crate::error::{BridgeError, BridgeResult};
use crate::transport::BoundaryTransport;
use crate::types::{
    ByteCount, Device, HexPayload, PreviewPayload, PrivilegeStatus, RecoveryConfig, ScanConfig, SessionId,
};

pub use envelope::CommandReply;

/// Typed front for the host's request/reply channels
#[derive(Clone)]
pub struct CommandGateway {
    transport: Arc<dyn BoundaryTransport>,
}

impl CommandGateway {
    pub fn new(transport: Arc<dyn BoundaryTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn BoundaryTransport> {
        &self.transport
    }

    async fn raw_call(&self, channel: &'static str, payload: Value) -> BridgeResult<Value> {
        debug!("Calling {}", channel);
        self.transport.invoke(channel, payload).await.map_err(|e| {
            warn!("{} did not complete: {}", channel, e);
            e
        })
    }

    async fn call(&self, channel: &'static str, payload: Value, fallback: &str) -> BridgeResult<CommandReply> {
        let raw = self.raw_call(channel, payload).await?;
        CommandReply::parse(channel, raw)?
            .ensure_success(channel, fallback)
            .map_err(|e| {
                warn!("{} failed: {}", channel, e);
                e
            })
    }

    // Devices

    pub async fn list_devices(&self) -> BridgeResult<Vec<Device>> {
        let reply = self.call(channels::DEVICE_LIST, Value::Null, "Failed to list devices").await?;
        Ok(reply.optional_field("devices")?.unwrap_or_default())
    }

    pub async fn refresh_devices(&self) -> BridgeResult<Vec<Device>> {
        let reply = self
            .call(channels::DEVICE_REFRESH, Value::Null, "Failed to refresh devices")
            .await?;
        Ok(reply.optional_field("devices")?.unwrap_or_default())
    }

    // Scan

    /// Returns the host-assigned id of the new scan session
    pub async fn start_scan(&self, config: &ScanConfig) -> BridgeResult<SessionId> {
        let reply = self
            .call(channels::SCAN_START, serde_json::to_value(config)?, "Failed to start scan")
            .await?;
        reply.field("sessionId")
    }

    pub async fn pause_scan(&self, session_id: &SessionId) -> BridgeResult<()> {
        self.call(channels::SCAN_PAUSE, json!({ "sessionId": session_id }), "Failed to pause scan")
            .await
            .map(|_| ())
    }

    pub async fn resume_scan(&self, session_id: &SessionId) -> BridgeResult<()> {
        self.call(channels::SCAN_RESUME, json!({ "sessionId": session_id }), "Failed to resume scan")
            .await
            .map(|_| ())
    }

    pub async fn cancel_scan(&self, session_id: &SessionId) -> BridgeResult<()> {
        self.call(channels::SCAN_CANCEL, json!({ "sessionId": session_id }), "Failed to cancel scan")
            .await
            .map(|_| ())
    }

    // Recovery

    /// The host may or may not hand back a recovery id in the reply
    pub async fn start_recovery(&self, config: &RecoveryConfig) -> BridgeResult<Option<SessionId>> {
        let reply = self
            .call(channels::RECOVERY_START, serde_json::to_value(config)?, "Failed to start recovery")
            .await?;
        match reply.optional_field("recoveryId")? {
            Some(id) => Ok(Some(id)),
            None => reply.optional_field("sessionId"),
        }
    }

    pub async fn pause_recovery(&self, recovery_id: &SessionId) -> BridgeResult<()> {
        self.call(channels::RECOVERY_PAUSE, json!({ "recoveryId": recovery_id }), "Failed to pause recovery")
            .await
            .map(|_| ())
    }

    pub async fn resume_recovery(&self, recovery_id: &SessionId) -> BridgeResult<()> {
        self.call(channels::RECOVERY_RESUME, json!({ "recoveryId": recovery_id }), "Failed to resume recovery")
            .await
            .map(|_| ())
    }

    pub async fn cancel_recovery(&self, recovery_id: &SessionId) -> BridgeResult<()> {
        self.call(channels::RECOVERY_CANCEL, json!({ "recoveryId": recovery_id }), "Failed to cancel recovery")
            .await
            .map(|_| ())
    }

    // Privileges

    pub async fn check_privileges(&self) -> BridgeResult<PrivilegeStatus> {
        let reply = self
            .call(channels::PRIVILEGE_CHECK, Value::Null, "Failed to check privileges")
            .await?;
        privilege_status(&reply)
    }

    pub async fn request_privileges(&self) -> BridgeResult<PrivilegeStatus> {
        let reply = self
            .call(channels::PRIVILEGE_REQUEST, Value::Null, "Failed to request privileges")
            .await?;
        privilege_status(&reply)
    }

    // Previews

    /// `None` when the host has no preview for this file
    pub async fn generate_preview(
        &self,
        device_path: &str,
        file_id: &str,
        offset: ByteCount,
        size: ByteCount,
    ) -> BridgeResult<Option<PreviewPayload>> {
        let payload = json!({
            "devicePath": device_path,
            "fileId": file_id,
            "offset": offset,
            "size": size,
        });
        let raw = self.raw_call(channels::PREVIEW_GENERATE, payload).await?;
        envelope::reject_failure(channels::PREVIEW_GENERATE, &raw, "Failed to generate preview")?;

        let body = match raw.get("preview") {
            Some(inner) => inner.clone(),
            None => raw,
        };
        if body.is_null() {
            return Ok(None);
        }
        serde_json::from_value(body)
            .map(Some)
            .map_err(|e| BridgeError::Decode(format!("preview: {}", e)))
    }

    pub async fn hex_preview(&self, device_path: &str, offset: ByteCount, length: u32) -> BridgeResult<HexPayload> {
        let payload = json!({
            "devicePath": device_path,
            "offset": offset,
            "length": length,
        });
        let raw = self.raw_call(channels::PREVIEW_HEX, payload).await?;
        envelope::reject_failure(channels::PREVIEW_HEX, &raw, "Failed to read bytes")?;

        let body = match raw.get("hex") {
            Some(inner) => inner.clone(),
            None => raw,
        };
        serde_json::from_value(body).map_err(|e| BridgeError::Decode(format!("hex view: {}", e)))
    }

    // Dialogs

    /// `None` when the user dismissed the dialog
    pub async fn select_directory(&self) -> BridgeResult<Option<PathBuf>> {
        let raw = self.raw_call(channels::DIALOG_SELECT_DIRECTORY, Value::Null).await?;
        envelope::reject_failure(channels::DIALOG_SELECT_DIRECTORY, &raw, "Failed to open directory dialog")?;

        Ok(raw
            .get("path")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from))
    }
}

/// Accepts both `{status: {...}}` and the flattened `{elevated, platform}` form
fn privilege_status(reply: &CommandReply) -> BridgeResult<PrivilegeStatus> {
    if let Some(status) = reply.optional_field::<PrivilegeStatus>("status")? {
        return Ok(status);
    }
    Ok(PrivilegeStatus {
        elevated: reply.field("elevated")?,
        platform: reply.optional_field("platform")?.unwrap_or_default(),
        helper_pid: reply.optional_field("helperPid")?,
    })
}

impl std::fmt::Debug for CommandGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandGateway")
            .field("transport", &self.transport.transport_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackTransport;
    use crate::types::{FileCategory, ScanType};

    fn gateway() -> (Arc<LoopbackTransport>, CommandGateway) {
        let transport = Arc::new(LoopbackTransport::new());
        let gateway = CommandGateway::new(transport.clone());
        (transport, gateway)
    }

    #[tokio::test]
    async fn test_list_devices() {
        let (host, gateway) = gateway();
        host.reply(
            channels::DEVICE_LIST,
            json!({
                "success": true,
                "devices": [{
                    "path": "/dev/sdb",
                    "size": "64023257088",
                    "label": "SanDisk Ultra",
                    "removable": true,
                    "partitions": [{"path": "/dev/sdb1", "size": "64022208512", "offset": "1048576"}]
                }]
            }),
        );

        let devices = gateway.list_devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].size, ByteCount(64_023_257_088));
        assert_eq!(devices[0].partitions[0].offset, ByteCount(1_048_576));
        assert_eq!(host.call_count(channels::DEVICE_LIST), 1);
    }

    #[tokio::test]
    async fn test_start_scan_returns_session_id() {
        let (host, gateway) = gateway();
        host.reply(channels::SCAN_START, json!({"success": true, "sessionId": "s1"}));

        let config = ScanConfig::builder("/dev/sdb")
            .scan_type(ScanType::Quick)
            .category(FileCategory::Photos)
            .build();
        let id = gateway.start_scan(&config).await.unwrap();
        assert_eq!(id, SessionId::from("s1"));

        let (_, sent) = &host.calls()[0];
        assert_eq!(sent["fileCategories"], json!(["photos"]));
    }

    #[tokio::test]
    async fn test_failure_uses_fallback_message() {
        let (host, gateway) = gateway();
        host.reply(channels::SCAN_PAUSE, json!({"success": false}));

        let err = gateway.pause_scan(&SessionId::from("s1")).await.unwrap_err();
        assert!(matches!(err, BridgeError::Command { operation: "scan.pause", .. }));
        assert_eq!(err.to_string(), "Failed to pause scan");
    }

    #[tokio::test]
    async fn test_transport_failure_passes_through() {
        let (host, gateway) = gateway();
        host.fail_transport(channels::SCAN_CANCEL, "helper is gone");

        let err = gateway.cancel_scan(&SessionId::from("s1")).await.unwrap_err();
        assert_eq!(err.to_string(), "helper is gone");
        assert!(err.is_remote());
    }

    #[tokio::test]
    async fn test_recovery_id_is_optional() {
        let (host, gateway) = gateway();
        let config = RecoveryConfig::new("/dev/sdb", Vec::new(), "/tmp/out");

        host.reply(channels::RECOVERY_START, json!({"success": true}));
        assert_eq!(gateway.start_recovery(&config).await.unwrap(), None);

        host.reply(channels::RECOVERY_START, json!({"success": true, "recoveryId": "r9"}));
        assert_eq!(gateway.start_recovery(&config).await.unwrap(), Some(SessionId::from("r9")));
    }

    #[tokio::test]
    async fn test_pause_recovery_sends_recovery_id() {
        let (host, gateway) = gateway();
        host.reply(channels::RECOVERY_PAUSE, json!({"success": true}));

        gateway.pause_recovery(&SessionId::from("r1")).await.unwrap();
        assert_eq!(host.calls()[0].1, json!({"recoveryId": "r1"}));
    }

    #[tokio::test]
    async fn test_privilege_reply_shapes() {
        let (host, gateway) = gateway();
        host.reply(
            channels::PRIVILEGE_CHECK,
            json!({"success": true, "status": {"elevated": false, "platform": "linux"}}),
        );
        host.reply(
            channels::PRIVILEGE_REQUEST,
            json!({"success": true, "elevated": true, "platform": "darwin", "helperPid": 4242}),
        );

        let checked = gateway.check_privileges().await.unwrap();
        assert!(!checked.elevated);
        assert_eq!(checked.platform, "linux");

        let requested = gateway.request_privileges().await.unwrap();
        assert!(requested.elevated);
        assert_eq!(requested.helper_pid, Some(4242));
    }

    #[tokio::test]
    async fn test_preview_may_be_null() {
        let (host, gateway) = gateway();
        host.reply(channels::PREVIEW_GENERATE, Value::Null);

        let preview = gateway
            .generate_preview("/dev/sdb", "f-1", ByteCount(u64::MAX - 1), ByteCount(512))
            .await
            .unwrap();
        assert!(preview.is_none());

        let sent = &host.calls()[0].1;
        assert_eq!(sent["offset"], "18446744073709551614");
        assert_eq!(sent["size"], "512");
    }

    #[tokio::test]
    async fn test_hex_preview() {
        let (host, gateway) = gateway();
        host.reply(
            channels::PREVIEW_HEX,
            json!({"offset": "4096", "length": 4, "data": "3q2+7w=="}),
        );

        let hex = gateway.hex_preview("/dev/sdb", ByteCount(4096), 4).await.unwrap();
        assert_eq!(hex.bytes().unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(host.calls()[0].1["length"], 4);
    }

    #[tokio::test]
    async fn test_select_directory() {
        let (host, gateway) = gateway();
        host.reply(channels::DIALOG_SELECT_DIRECTORY, Value::Null);
        assert_eq!(gateway.select_directory().await.unwrap(), None);

        host.reply(channels::DIALOG_SELECT_DIRECTORY, json!({"path": "/home/me/recovered"}));
        assert_eq!(
            gateway.select_directory().await.unwrap(),
            Some(PathBuf::from("/home/me/recovered"))
        );
    }
}
