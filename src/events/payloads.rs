//! Event Payloads
//!
//! Closed schema for everything the host pushes on the event channels.
//! Payloads are decoded from the first positional event argument. Error and
//! completion events decode from any shape, including no argument at all.

use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;

use crate::types::{ByteCount, SessionId};

/// A file-found event carries either one item or an ordered batch
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    /// Flatten to arrival order
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

/// Progress snapshot that can absorb later updates
pub trait ProgressUpdate:
    Clone + Default + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Fold `update` into `self`. Counters never move backwards.
    fn merge(&mut self, update: Self);

    /// Session the update belongs to, when the host says so
    fn session_id(&self) -> Option<&SessionId>;
}

/// `scan.progress`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanProgress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub bytes_scanned: ByteCount,
    pub total_bytes: ByteCount,
    pub files_found: u64,
    /// 0-100
    pub percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

impl ProgressUpdate for ScanProgress {
    fn merge(&mut self, update: Self) {
        if self.session_id.is_none() {
            self.session_id = update.session_id;
        }
        self.bytes_scanned = self.bytes_scanned.max(update.bytes_scanned);
        self.total_bytes = self.total_bytes.max(update.total_bytes);
        self.files_found = self.files_found.max(update.files_found);
        self.percent = self.percent.max(clamp_percent(update.percent));
        if update.eta_seconds.is_some() {
            self.eta_seconds = update.eta_seconds;
        }
        if update.phase.is_some() {
            self.phase = update.phase;
        }
    }

    fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }
}

/// `recovery.progress`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecoveryProgress {
    #[serde(alias = "recoveryId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub files_recovered: u64,
    pub files_failed: u64,
    pub files_total: u64,
    pub bytes_written: ByteCount,
    pub percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
}

impl ProgressUpdate for RecoveryProgress {
    fn merge(&mut self, update: Self) {
        if self.session_id.is_none() {
            self.session_id = update.session_id;
        }
        self.files_recovered = self.files_recovered.max(update.files_recovered);
        self.files_failed = self.files_failed.max(update.files_failed);
        self.files_total = self.files_total.max(update.files_total);
        self.bytes_written = self.bytes_written.max(update.bytes_written);
        self.percent = self.percent.max(clamp_percent(update.percent));
        if update.current_file.is_some() {
            self.current_file = update.current_file;
        }
    }

    fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// `scan.complete` / `recovery.complete`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletePayload {
    #[serde(alias = "recoveryId")]
    pub session_id: Option<SessionId>,
    #[serde(alias = "filesRecovered")]
    pub files_found: u64,
    pub files_failed: u64,
}

/// `scan.error` / `recovery.error`
///
/// Hosts send an object, a bare message string, or nothing at all; every
/// form decodes so that no stream error is lost.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ErrorWire")]
pub struct ErrorPayload {
    pub message: Option<String>,
    pub session_id: Option<SessionId>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorWire {
    Empty,
    Text(String),
    Fields {
        #[serde(default)]
        message: Option<String>,
        #[serde(default, rename = "sessionId", alias = "recoveryId")]
        session_id: Option<SessionId>,
    },
}

impl From<ErrorWire> for ErrorPayload {
    fn from(wire: ErrorWire) -> Self {
        match wire {
            ErrorWire::Empty => Self::default(),
            ErrorWire::Text(message) => Self {
                message: Some(message),
                session_id: None,
            },
            ErrorWire::Fields { message, session_id } => Self { message, session_id },
        }
    }
}

impl ErrorPayload {
    /// Decode an error event, falling back to an empty payload for shapes
    /// that do not decode at all
    pub fn from_event(raw: Value) -> Self {
        serde_json::from_value(raw).unwrap_or_else(|e| {
            warn!("Unreadable error event payload: {}", e);
            Self::default()
        })
    }

    /// Host message, or `fallback` when the event carried no usable text
    pub fn message_or(&self, fallback: &str) -> String {
        self.message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(fallback)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecoverableFile;
    use serde_json::json;

    #[test]
    fn test_file_found_single_or_batch() {
        let one: OneOrMany<RecoverableFile> = serde_json::from_value(json!(
            {"id": "a", "name": "a.jpg", "size": "1", "offset": "0"}
        ))
        .unwrap();
        assert_eq!(one.into_vec().len(), 1);

        let many: OneOrMany<RecoverableFile> = serde_json::from_value(json!([
            {"id": "a", "name": "a.jpg", "size": "1", "offset": "0"},
            {"id": "b", "name": "b.jpg", "size": "2", "offset": "512"},
            {"id": "c", "name": "c.jpg", "size": "3", "offset": "1024"}
        ]))
        .unwrap();
        let ids: Vec<String> = many.into_vec().into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_progress_never_moves_backwards() {
        let mut progress = ScanProgress::default();
        progress.merge(serde_json::from_value(json!({
            "bytesScanned": "1000", "totalBytes": "4000", "filesFound": 7, "percent": 25.0
        })).unwrap());
        progress.merge(serde_json::from_value(json!({
            "bytesScanned": "900", "filesFound": 5, "percent": 20.0, "phase": "carving"
        })).unwrap());

        assert_eq!(progress.bytes_scanned, ByteCount(1000));
        assert_eq!(progress.total_bytes, ByteCount(4000));
        assert_eq!(progress.files_found, 7);
        assert_eq!(progress.percent, 25.0);
        assert_eq!(progress.phase.as_deref(), Some("carving"));
    }

    #[test]
    fn test_percent_is_clamped() {
        let mut progress = RecoveryProgress::default();
        progress.merge(RecoveryProgress { percent: 140.0, ..Default::default() });
        assert_eq!(progress.percent, 100.0);
    }

    #[test]
    fn test_recovery_aliases() {
        let done: CompletePayload =
            serde_json::from_value(json!({"recoveryId": "r1", "filesRecovered": 12})).unwrap();
        assert_eq!(done.session_id, Some(SessionId::from("r1")));
        assert_eq!(done.files_found, 12);
    }

    #[test]
    fn test_error_message_fallback() {
        let empty: ErrorPayload = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.message_or("Scan failed"), "Scan failed");

        let blank = ErrorPayload { message: Some("  ".into()), session_id: None };
        assert_eq!(blank.message_or("Scan failed"), "Scan failed");

        let real: ErrorPayload = serde_json::from_value(json!({"message": "disk read failure"})).unwrap();
        assert_eq!(real.message_or("Scan failed"), "disk read failure");
    }

    #[test]
    fn test_error_event_shapes() {
        let text: ErrorPayload = serde_json::from_value(json!("disk read failure")).unwrap();
        assert_eq!(text.message.as_deref(), Some("disk read failure"));

        let null: ErrorPayload = serde_json::from_value(Value::Null).unwrap();
        assert_eq!(null, ErrorPayload::default());

        let tagged: ErrorPayload = serde_json::from_value(json!({"recoveryId": "r1"})).unwrap();
        assert_eq!(tagged.session_id, Some(SessionId::from("r1")));

        let odd = ErrorPayload::from_event(json!([1, 2, 3]));
        assert_eq!(odd.message_or("Recovery failed"), "Recovery failed");
    }
}
