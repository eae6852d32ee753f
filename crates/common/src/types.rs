//! Core types for LabDash

use serde::{Deserialize, Serialize};

/// A virtual machine as presented to dashboard clients.
///
/// Rebuilt from the control plane on every listing call; `node` is the
/// cluster node the VM was discovered under.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VmInfo {
    /// String form of the numeric vmid
    pub id: String,
    pub name: String,
    pub status: String,
    /// Current CPU usage (fraction of `cpus`)
    pub cpu: f64,
    /// Maximum available CPU count
    pub cpus: f64,
    /// Current memory usage (bytes)
    pub mem: f64,
    /// Maximum memory (bytes)
    pub maxmem: u64,
    /// Current disk usage
    pub disk: f64,
    /// Root disk size (bytes)
    pub maxdisk: u64,
    /// Total disk read (bytes)
    pub diskread: u64,
    /// Total disk write (bytes)
    pub diskwrite: u64,
    /// Total network input (bytes)
    pub netin: u64,
    /// Total network output (bytes)
    pub netout: u64,
    /// Running time (seconds)
    pub uptime: u64,
    pub node: String,
}

/// A saved VM state, as listed by the control plane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Creation time, seconds since the epoch
    #[serde(default)]
    pub snaptime: i64,
}

/// Outcome of one VM within a bulk operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmOperationResult {
    pub vmid: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VmOperationResult {
    pub fn ok(vmid: impl Into<String>) -> Self {
        Self {
            vmid: vmid.into(),
            success: true,
            message: None,
        }
    }

    pub fn failed(vmid: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            vmid: vmid.into(),
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Per-VM tally of a lab reset run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabResetSummary {
    /// VMs rolled back to their latest snapshot
    pub restored: usize,
    /// VMs without any snapshot
    pub skipped: usize,
    /// VMs whose snapshot listing or rollback failed
    pub failed: usize,
}

/// A connected OpenVPN client reported by the firewall.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpnConnection {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub common_name: String,
    #[serde(default)]
    pub connect_time_unix: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_result_serialization() {
        let ok = serde_json::to_value(VmOperationResult::ok("100")).unwrap();
        assert_eq!(ok, serde_json::json!({"vmid": "100", "success": true}));

        let failed = serde_json::to_value(VmOperationResult::failed("200", "boom")).unwrap();
        assert_eq!(
            failed,
            serde_json::json!({"vmid": "200", "success": false, "message": "boom"})
        );
    }

    #[test]
    fn test_snapshot_defaults() {
        let snap: SnapshotInfo = serde_json::from_str(r#"{"name": "current"}"#).unwrap();
        assert_eq!(snap.snaptime, 0);
        assert!(snap.description.is_empty());
    }
}
