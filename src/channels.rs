//! Channel names shared with the host helper.

pub const DEVICE_LIST: &str = "device.list";
pub const DEVICE_REFRESH: &str = "device.refresh";

pub const SCAN_START: &str = "scan.start";
pub const SCAN_PAUSE: &str = "scan.pause";
pub const SCAN_RESUME: &str = "scan.resume";
pub const SCAN_CANCEL: &str = "scan.cancel";

pub const RECOVERY_START: &str = "recovery.start";
pub const RECOVERY_PAUSE: &str = "recovery.pause";
pub const RECOVERY_RESUME: &str = "recovery.resume";
pub const RECOVERY_CANCEL: &str = "recovery.cancel";

pub const PRIVILEGE_CHECK: &str = "privilege.check";
pub const PRIVILEGE_REQUEST: &str = "privilege.request";

pub const PREVIEW_GENERATE: &str = "preview.generate";
pub const PREVIEW_HEX: &str = "preview.hex";

pub const DIALOG_SELECT_DIRECTORY: &str = "dialog.selectDirectory";

// Push-only event channels
pub const SCAN_PROGRESS: &str = "scan.progress";
pub const SCAN_FILE_FOUND: &str = "scan.fileFound";
pub const SCAN_COMPLETE: &str = "scan.complete";
pub const SCAN_ERROR: &str = "scan.error";

pub const RECOVERY_PROGRESS: &str = "recovery.progress";
pub const RECOVERY_FILE_RECOVERED: &str = "recovery.fileRecovered";
pub const RECOVERY_COMPLETE: &str = "recovery.complete";
pub const RECOVERY_ERROR: &str = "recovery.error";
