//! Reply envelope
//!
//! Every command reply has the shape `{ success, error?, ..payload }`.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{BridgeError, BridgeResult};

/// Canonical command reply
#[derive(Debug, Clone, Deserialize)]
pub struct CommandReply {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl CommandReply {
    pub fn parse(channel: &str, raw: Value) -> BridgeResult<Self> {
        serde_json::from_value(raw)
            .map_err(|e| BridgeError::Decode(format!("{} reply: {}", channel, e)))
    }

    /// Turn `success: false` into a command failure
    pub fn ensure_success(self, operation: &'static str, fallback: &str) -> BridgeResult<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(BridgeError::command(operation, self.error, fallback))
        }
    }

    /// Required payload field
    pub fn field<T: DeserializeOwned>(&self, name: &str) -> BridgeResult<T> {
        let value = self
            .payload
            .get(name)
            .ok_or_else(|| BridgeError::Decode(format!("reply is missing '{}'", name)))?;
        serde_json::from_value(value.clone())
            .map_err(|e| BridgeError::Decode(format!("reply field '{}': {}", name, e)))
    }

    /// Optional payload field; `null` counts as absent
    pub fn optional_field<T: DeserializeOwned>(&self, name: &str) -> BridgeResult<Option<T>> {
        match self.payload.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.field(name).map(Some),
        }
    }
}

/// Replies that are a bare payload (or `null`) may still carry `success: false`
pub(crate) fn reject_failure(operation: &'static str, raw: &Value, fallback: &str) -> BridgeResult<()> {
    if raw.get("success").and_then(Value::as_bool) == Some(false) {
        let message = raw.get("error").and_then(Value::as_str).map(str::to_string);
        return Err(BridgeError::command(operation, message, fallback));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failed_reply_carries_host_message() {
        let reply = CommandReply::parse("scan.start", json!({"success": false, "error": "no such device"})).unwrap();
        let err = reply.ensure_success("scan.start", "Failed to start scan").unwrap_err();
        assert_eq!(err.to_string(), "no such device");
    }

    #[test]
    fn test_payload_fields() {
        let reply = CommandReply::parse("scan.start", json!({"success": true, "sessionId": "s1", "extra": null})).unwrap();
        let id: String = reply.field("sessionId").unwrap();
        assert_eq!(id, "s1");
        assert_eq!(reply.optional_field::<String>("extra").unwrap(), None);
        assert!(reply.field::<String>("missing").is_err());
    }

    #[test]
    fn test_missing_success_is_decode_error() {
        let result = CommandReply::parse("device.list", json!({"devices": []}));
        assert!(matches!(result, Err(BridgeError::Decode(_))));
    }
}
