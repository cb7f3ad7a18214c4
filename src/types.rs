//! Bridge Types - Core data structures exchanged with the host helper
//!
//! Field names follow the host's camelCase JSON. Every 64-bit quantity
//! travels as decimal text and lives in memory as [`ByteCount`].

use base64::Engine;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;

use crate::error::{BridgeError, BridgeResult};

/// Unsigned 64-bit quantity (sizes, byte offsets) carried as decimal text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteCount(pub u64);

impl ByteCount {
    pub const ZERO: ByteCount = ByteCount(0);

    pub fn get(self) -> u64 {
        self.0
    }

    /// Parse the decimal text form used on the wire
    pub fn parse(text: &str) -> BridgeResult<Self> {
        text.trim()
            .parse::<u64>()
            .map(ByteCount)
            .map_err(|e| BridgeError::Decode(format!("invalid byte count {:?}: {}", text, e)))
    }
}

impl From<u64> for ByteCount {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ByteCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ByteCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

struct ByteCountVisitor;

impl<'de> Visitor<'de> for ByteCountVisitor {
    type Value = ByteCount;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal string or non-negative integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<ByteCount, E> {
        v.trim().parse::<u64>().map(ByteCount).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<ByteCount, E> {
        Ok(ByteCount(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<ByteCount, E> {
        u64::try_from(v).map(ByteCount).map_err(E::custom)
    }

    // Hosts that leak a native number past 2^53 would send a float; reject
    // anything that is not an exact integer.
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<ByteCount, E> {
        if v >= 0.0 && v.fract() == 0.0 && v < 9_007_199_254_740_992.0 {
            Ok(ByteCount(v as u64))
        } else {
            Err(E::custom(format!("imprecise byte count {}", v)))
        }
    }
}

impl<'de> Deserialize<'de> for ByteCount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ByteCountVisitor)
    }
}

/// Opaque, host-assigned session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A physical or logical storage unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub path: String,
    pub size: ByteCount,
    #[serde(alias = "name", alias = "model", default)]
    pub label: String,
    #[serde(default)]
    pub removable: bool,
    #[serde(default)]
    pub partitions: Vec<Partition>,
}

/// Sub-range of a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    pub path: String,
    pub size: ByteCount,
    #[serde(default)]
    pub offset: ByteCount,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub label: Option<String>,
}

/// Scan depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    #[default]
    Quick,
    Deep,
}

/// Broad file family used for selection and grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Photos,
    Videos,
    Documents,
    Audio,
    Archives,
    #[serde(other)]
    Other,
}

/// How likely the host thinks a discovered file is intact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Parameters for `scan.start`. Never mutated after submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanConfig {
    pub device_path: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub partition_path: Option<String>,
    pub scan_type: ScanType,
    #[serde(default)]
    pub file_categories: Vec<FileCategory>,
    #[serde(default)]
    pub file_types: Vec<String>,
    #[serde(default)]
    pub total_size: ByteCount,
}

impl ScanConfig {
    pub fn builder(device_path: impl Into<String>) -> ScanConfigBuilder {
        ScanConfigBuilder {
            config: ScanConfig {
                device_path: device_path.into(),
                partition_path: None,
                scan_type: ScanType::Quick,
                file_categories: Vec::new(),
                file_types: Vec::new(),
                total_size: ByteCount::ZERO,
            },
        }
    }
}

/// Builder for [`ScanConfig`]
#[derive(Debug, Clone)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    pub fn partition(mut self, path: impl Into<String>) -> Self {
        self.config.partition_path = Some(path.into());
        self
    }

    pub fn scan_type(mut self, scan_type: ScanType) -> Self {
        self.config.scan_type = scan_type;
        self
    }

    pub fn category(mut self, category: FileCategory) -> Self {
        if !self.config.file_categories.contains(&category) {
            self.config.file_categories.push(category);
        }
        self
    }

    pub fn file_type(mut self, extension: impl Into<String>) -> Self {
        self.config.file_types.push(extension.into());
        self
    }

    pub fn total_size(mut self, size: impl Into<ByteCount>) -> Self {
        self.config.total_size = size.into();
        self
    }

    /// Size the scan from a listed device (and partition, when one is selected)
    pub fn sized_from(mut self, device: &Device) -> Self {
        let size = self
            .config
            .partition_path
            .as_deref()
            .and_then(|p| device.partitions.iter().find(|part| part.path == p))
            .map(|part| part.size)
            .unwrap_or(device.size);
        self.config.total_size = size;
        self
    }

    pub fn build(self) -> ScanConfig {
        self.config
    }
}

/// A discovered artifact that may be recovered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverableFile {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub path: Option<String>,
    pub size: ByteCount,
    pub offset: ByteCount,
    #[serde(default = "default_category")]
    pub category: FileCategory,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub confidence: Confidence,
}

fn default_category() -> FileCategory {
    FileCategory::Other
}

/// Parameters for `recovery.start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryConfig {
    pub device_path: String,
    pub files: Vec<RecoverableFile>,
    pub destination: PathBuf,
    #[serde(default)]
    pub preserve_structure: bool,
}

impl RecoveryConfig {
    pub fn new(device_path: impl Into<String>, files: Vec<RecoverableFile>, destination: impl Into<PathBuf>) -> Self {
        Self {
            device_path: device_path.into(),
            files,
            destination: destination.into(),
            preserve_structure: false,
        }
    }

    /// Total bytes the recovery is expected to write
    pub fn total_bytes(&self) -> ByteCount {
        ByteCount(self.files.iter().map(|f| f.size.0).fold(0u64, u64::saturating_add))
    }
}

/// Outcome of recovering one file, delivered on `recovery.fileRecovered`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveredFile {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output_path: Option<PathBuf>,
    #[serde(default)]
    pub size: ByteCount,
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Whether the host helper currently runs with raw-device rights
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivilegeStatus {
    pub elevated: bool,
    #[serde(default)]
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub helper_pid: Option<u32>,
}

/// Content kind of a generated preview
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewKind {
    Image,
    Text,
    #[serde(other)]
    Binary,
}

/// Preview of a discovered file, as produced by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewPayload {
    pub kind: PreviewKind,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mime_type: Option<String>,
    /// Base64 encoded content
    pub data: String,
    #[serde(default)]
    pub truncated: bool,
}

impl PreviewPayload {
    pub fn bytes(&self) -> BridgeResult<Vec<u8>> {
        decode_base64(&self.data)
    }
}

/// Raw bytes read from a device for the hex viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HexPayload {
    pub offset: ByteCount,
    pub length: u32,
    /// Base64 encoded bytes
    pub data: String,
}

impl HexPayload {
    pub fn bytes(&self) -> BridgeResult<Vec<u8>> {
        decode_base64(&self.data)
    }
}

fn decode_base64(data: &str) -> BridgeResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| BridgeError::Decode(format!("invalid base64 content: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_byte_count_wire_form_is_decimal_text() {
        let offset = ByteCount(18_446_744_073_709_551_615);
        let json = serde_json::to_value(offset).unwrap();
        assert_eq!(json, json!("18446744073709551615"));

        let back: ByteCount = serde_json::from_value(json).unwrap();
        assert_eq!(back, offset);
    }

    #[test]
    fn test_byte_count_accepts_native_integers() {
        let size: ByteCount = serde_json::from_value(json!(4096)).unwrap();
        assert_eq!(size.get(), 4096);

        assert!(serde_json::from_value::<ByteCount>(json!(-1)).is_err());
        assert!(serde_json::from_value::<ByteCount>(json!(1.5)).is_err());
        assert!(serde_json::from_value::<ByteCount>(json!("12ab")).is_err());
    }

    #[test]
    fn test_recoverable_file_from_host_json() {
        let file: RecoverableFile = serde_json::from_value(json!({
            "id": "f-1",
            "name": "IMG_0001.jpg",
            "size": "2048000",
            "offset": "9007199254740993",
            "category": "photos",
            "confidence": "high"
        }))
        .unwrap();

        assert_eq!(file.offset.get(), 9_007_199_254_740_993);
        assert_eq!(file.category, FileCategory::Photos);
        assert_eq!(file.confidence, Confidence::High);

        let unknown: RecoverableFile = serde_json::from_value(json!({
            "id": "f-2", "name": "x.bin", "size": "1", "offset": "0",
            "category": "firmware", "confidence": "certain"
        }))
        .unwrap();
        assert_eq!(unknown.category, FileCategory::Other);
        assert_eq!(unknown.confidence, Confidence::Unknown);
    }

    #[test]
    fn test_scan_config_builder() {
        let device = Device {
            path: "/dev/sdb".into(),
            size: ByteCount(64_000_000_000),
            label: "USB Stick".into(),
            removable: true,
            partitions: vec![Partition {
                path: "/dev/sdb1".into(),
                size: ByteCount(32_000_000_000),
                offset: ByteCount(1_048_576),
                label: None,
            }],
        };

        let config = ScanConfig::builder(&device.path)
            .partition("/dev/sdb1")
            .scan_type(ScanType::Deep)
            .category(FileCategory::Photos)
            .category(FileCategory::Photos)
            .file_type("jpg")
            .sized_from(&device)
            .build();

        assert_eq!(config.file_categories, vec![FileCategory::Photos]);
        assert_eq!(config.total_size, ByteCount(32_000_000_000));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["devicePath"], "/dev/sdb");
        assert_eq!(json["scanType"], "deep");
        assert_eq!(json["totalSize"], "32000000000");
    }

    #[test]
    fn test_recovery_config_sends_sizes_as_text() {
        let file = RecoverableFile {
            id: "f-1".into(),
            name: "a.png".into(),
            path: None,
            size: ByteCount(10),
            offset: ByteCount(u64::MAX),
            category: FileCategory::Photos,
            extension: Some("png".into()),
            confidence: Confidence::Medium,
        };
        let config = RecoveryConfig::new("/dev/sdb", vec![file.clone(), file], "/tmp/out");
        assert_eq!(config.total_bytes(), ByteCount(20));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["files"][0]["offset"], "18446744073709551615");
        assert_eq!(json["files"][0]["size"], "10");
    }

    #[test]
    fn test_preview_bytes() {
        let preview = PreviewPayload {
            kind: PreviewKind::Text,
            mime_type: Some("text/plain".into()),
            data: "aGVsbG8=".into(),
            truncated: false,
        };
        assert_eq!(preview.bytes().unwrap(), b"hello");
    }
}
