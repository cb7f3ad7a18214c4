//! Device Locks
//!
//! At most one active session per device across every controller sharing the
//! same `DeviceLocks`. A lease is released when it is dropped.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info};
use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};

/// Devices that currently have an active session (device path -> session kind)
#[derive(Debug, Default)]
pub struct DeviceLocks {
    held: DashMap<String, &'static str>,
}

impl DeviceLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim `device` for a session of kind `owner`
    pub fn acquire(self: &Arc<Self>, device: &str, owner: &'static str) -> BridgeResult<DeviceLease> {
        match self.held.entry(device.to_string()) {
            Entry::Occupied(entry) => Err(BridgeError::Validation(format!(
                "{} already has an active {} session",
                device,
                entry.get()
            ))),
            Entry::Vacant(entry) => {
                entry.insert(owner);
                info!("Locked {} for {}", device, owner);
                Ok(DeviceLease {
                    device: device.to_string(),
                    locks: Arc::clone(self),
                })
            }
        }
    }

    pub fn is_locked(&self, device: &str) -> bool {
        self.held.contains_key(device)
    }

    pub fn locked_count(&self) -> usize {
        self.held.len()
    }
}

/// Proof that a device is claimed; dropping it releases the claim
#[derive(Debug)]
pub struct DeviceLease {
    device: String,
    locks: Arc<DeviceLocks>,
}

impl DeviceLease {
    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.locks.held.remove(&self.device);
        debug!("Released {}", self.device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_rejected_until_release() {
        let locks = DeviceLocks::new();
        let lease = locks.acquire("/dev/sdb", "scan").unwrap();
        assert_eq!(lease.device(), "/dev/sdb");

        let err = locks.acquire("/dev/sdb", "recovery").unwrap_err();
        assert_eq!(err.to_string(), "/dev/sdb already has an active scan session");

        assert!(locks.acquire("/dev/sdc", "scan").is_ok());
        assert_eq!(locks.locked_count(), 1);

        drop(lease);
        assert!(!locks.is_locked("/dev/sdb"));
        assert!(locks.acquire("/dev/sdb", "recovery").is_ok());
    }
}
