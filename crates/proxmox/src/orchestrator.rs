//! VM pool orchestration over the Proxmox VE API
//!
//! Discovery walks every node in the cluster and collects its QEMU guests.
//! Bulk actions apply a single-VM call to every discovered VM and report one
//! outcome per VM. The lab reset rolls every VM back to its most recent
//! snapshot and records when that was last attempted.

use crate::transport::{HttpTransport, Transport};
use labdash_common::{
    Error, LabResetSummary, ProxmoxConfig, Result, ResultExt, SnapshotInfo, VmInfo,
    VmOperationResult,
};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// PVE lists the live state as a pseudo-snapshot with this name.
pub const CURRENT_SNAPSHOT: &str = "current";

/// Power-state change that can be applied to a VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmAction {
    Start,
    Stop,
    Reset,
}

impl VmAction {
    /// Path segment under `/status/`
    pub fn as_str(&self) -> &'static str {
        match self {
            VmAction::Start => "start",
            VmAction::Stop => "stop",
            VmAction::Reset => "reset",
        }
    }
}

impl std::fmt::Display for VmAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `{"data": ...}` wrapper around every PVE reply
#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Deserialize)]
struct NodeEntry {
    node: String,
}

/// One row of `GET /nodes/{node}/qemu`
#[derive(Deserialize)]
struct QemuEntry {
    #[serde(default)]
    vmid: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    cpu: f64,
    #[serde(default)]
    cpus: f64,
    #[serde(default)]
    mem: f64,
    #[serde(default)]
    maxmem: u64,
    #[serde(default)]
    disk: f64,
    #[serde(default)]
    maxdisk: u64,
    #[serde(default)]
    diskread: u64,
    #[serde(default)]
    diskwrite: u64,
    #[serde(default)]
    netin: u64,
    #[serde(default)]
    netout: u64,
    #[serde(default)]
    uptime: u64,
}

impl QemuEntry {
    fn into_vm(self, node: &str) -> VmInfo {
        VmInfo {
            id: self.vmid.to_string(),
            name: self.name,
            status: self.status,
            cpu: self.cpu,
            cpus: self.cpus,
            mem: self.mem,
            maxmem: self.maxmem,
            disk: self.disk,
            maxdisk: self.maxdisk,
            diskread: self.diskread,
            diskwrite: self.diskwrite,
            netin: self.netin,
            netout: self.netout,
            uptime: self.uptime,
            node: node.to_string(),
        }
    }
}

fn qemu_path(node: &str, vmid: &str) -> String {
    format!(
        "/nodes/{}/qemu/{}",
        urlencoding::encode(node),
        urlencoding::encode(vmid)
    )
}

fn now_epoch_secs() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Pick the snapshot with the greatest `snaptime`.
///
/// The first snapshot with a strictly greater time than the running maximum
/// wins, so on ties the earliest in listing order is kept.
pub fn latest_snapshot(snapshots: &[SnapshotInfo]) -> Option<&SnapshotInfo> {
    let mut iter = snapshots.iter();
    let mut latest = iter.next()?;
    for snapshot in iter {
        if snapshot.snaptime > latest.snaptime {
            latest = snapshot;
        }
    }
    Some(latest)
}

/// Control-plane client shared by every request handler.
pub struct Orchestrator {
    transport: Arc<dyn Transport>,
    /// Unix seconds of the last lab reset attempt, 0 if none yet
    last_reset: AtomicU64,
}

impl Orchestrator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            last_reset: AtomicU64::new(0),
        }
    }

    /// Orchestrator talking HTTPS to the configured PVE cluster
    pub fn from_config(config: &ProxmoxConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(HttpTransport::new(config)?)))
    }

    async fn get_data<T: DeserializeOwned + Default>(&self, path: &str, what: &str) -> Result<T> {
        let body = self.transport.request(Method::GET, path, None).await?;
        let envelope: Envelope<T> =
            serde_json::from_slice(&body).map_err(|e| Error::decode(what, e))?;
        Ok(envelope.data.unwrap_or_default())
    }

    async fn post(&self, path: &str) -> Result<()> {
        self.transport.request(Method::POST, path, None).await?;
        Ok(())
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    /// Names of all cluster nodes
    pub async fn list_nodes(&self) -> Result<Vec<String>> {
        let nodes: Vec<NodeEntry> = self
            .get_data("/nodes", "nodes response")
            .await
            .context("failed to get nodes")?;
        Ok(nodes.into_iter().map(|n| n.node).collect())
    }

    /// QEMU guests on one node, tagged with that node
    pub async fn list_vms(&self, node: &str) -> Result<Vec<VmInfo>> {
        let path = format!("/nodes/{}/qemu", urlencoding::encode(node));
        let entries: Vec<QemuEntry> = self
            .get_data(&path, "VMs response")
            .await
            .with_context(|| format!("failed to get VMs for node {}", node))?;
        Ok(entries.into_iter().map(|e| e.into_vm(node)).collect())
    }

    /// Every VM in the cluster, in node order.
    ///
    /// The first node that cannot be listed fails the whole call; nothing
    /// collected from earlier nodes is returned.
    pub async fn get_vms(&self) -> Result<Vec<VmInfo>> {
        let nodes = self.list_nodes().await?;

        let mut all_vms = Vec::new();
        for node in &nodes {
            let vms = self.list_vms(node).await?;
            debug!(node = %node, count = vms.len(), "listed VMs");
            all_vms.extend(vms);
        }

        Ok(all_vms)
    }

    // ========================================================================
    // Single-VM operations
    // ========================================================================

    /// Request a power-state change. Returns once PVE accepted the task.
    pub async fn vm_action(&self, action: VmAction, node: &str, vmid: &str) -> Result<()> {
        let path = format!("{}/status/{}", qemu_path(node, vmid), action.as_str());
        self.post(&path)
            .await
            .with_context(|| format!("failed to {} VM", action))
    }

    pub async fn start_vm(&self, node: &str, vmid: &str) -> Result<()> {
        self.vm_action(VmAction::Start, node, vmid).await
    }

    pub async fn stop_vm(&self, node: &str, vmid: &str) -> Result<()> {
        self.vm_action(VmAction::Stop, node, vmid).await
    }

    pub async fn reset_vm(&self, node: &str, vmid: &str) -> Result<()> {
        self.vm_action(VmAction::Reset, node, vmid).await
    }

    /// Snapshots of a VM as PVE lists them (including the `current` entry)
    pub async fn list_snapshots(&self, node: &str, vmid: &str) -> Result<Vec<SnapshotInfo>> {
        let path = format!("{}/snapshot", qemu_path(node, vmid));
        self.get_data(&path, "snapshots response")
            .await
            .context("failed to get snapshots")
    }

    /// Roll a VM back to the named snapshot
    pub async fn restore_snapshot(&self, node: &str, vmid: &str, snapshot: &str) -> Result<()> {
        let path = format!(
            "{}/snapshot/{}/rollback",
            qemu_path(node, vmid),
            urlencoding::encode(snapshot)
        );
        self.post(&path).await.context("failed to restore snapshot")
    }

    // ========================================================================
    // Bulk operations
    // ========================================================================

    /// Apply `action` to every VM.
    ///
    /// Fails only if discovery fails. Otherwise there is exactly one result
    /// per discovered VM, in discovery order.
    pub async fn apply_to_all(&self, action: VmAction) -> Result<Vec<VmOperationResult>> {
        let vms = self.get_vms().await.context("failed to get VMs")?;

        let mut results = Vec::with_capacity(vms.len());
        for vm in &vms {
            let result = match self.vm_action(action, &vm.node, &vm.id).await {
                Ok(()) => VmOperationResult::ok(&vm.id),
                Err(e) => {
                    warn!(vmid = %vm.id, node = %vm.node, %action, "VM action failed: {}", e);
                    VmOperationResult::failed(&vm.id, e.to_string())
                }
            };
            results.push(result);
        }

        let failed = results.iter().filter(|r| !r.success).count();
        info!(%action, total = results.len(), failed, "bulk VM action finished");
        Ok(results)
    }

    pub async fn start_all_vms(&self) -> Result<Vec<VmOperationResult>> {
        self.apply_to_all(VmAction::Start).await
    }

    pub async fn stop_all_vms(&self) -> Result<Vec<VmOperationResult>> {
        self.apply_to_all(VmAction::Stop).await
    }

    pub async fn reset_all_vms(&self) -> Result<Vec<VmOperationResult>> {
        self.apply_to_all(VmAction::Reset).await
    }

    // ========================================================================
    // Lab reset
    // ========================================================================

    /// Unix seconds of the most recent lab reset attempt, 0 if none
    pub fn last_reset(&self) -> u64 {
        self.last_reset.load(Ordering::SeqCst)
    }

    /// Roll every VM back to its latest snapshot.
    ///
    /// The reset time is recorded before anything else happens, so it is
    /// updated even when discovery then fails. Only discovery errors are
    /// returned; per-VM problems are logged and counted in the summary.
    pub async fn reset_lab(&self) -> Result<LabResetSummary> {
        let started = now_epoch_secs();
        self.last_reset.fetch_max(started, Ordering::SeqCst);
        info!(started, "lab reset started");

        let vms = self.get_vms().await?;

        let mut summary = LabResetSummary::default();
        for vm in &vms {
            let snapshots = match self.list_snapshots(&vm.node, &vm.id).await {
                Ok(snapshots) => snapshots,
                Err(e) => {
                    warn!(vmid = %vm.id, node = %vm.node, "failed to get snapshots: {}", e);
                    summary.failed += 1;
                    continue;
                }
            };

            let snapshots: Vec<SnapshotInfo> = snapshots
                .into_iter()
                .filter(|s| s.name != CURRENT_SNAPSHOT)
                .collect();

            let Some(latest) = latest_snapshot(&snapshots) else {
                warn!(vmid = %vm.id, node = %vm.node, "no snapshots found");
                summary.skipped += 1;
                continue;
            };

            match self.restore_snapshot(&vm.node, &vm.id, &latest.name).await {
                Ok(()) => {
                    info!(vmid = %vm.id, node = %vm.node, snapshot = %latest.name, "restored VM");
                    summary.restored += 1;
                }
                Err(e) => {
                    warn!(
                        vmid = %vm.id,
                        node = %vm.node,
                        snapshot = %latest.name,
                        "failed to restore snapshot: {}",
                        e
                    );
                    summary.failed += 1;
                }
            }
        }

        info!(
            restored = summary.restored,
            skipped = summary.skipped,
            failed = summary.failed,
            "lab reset finished"
        );
        Ok(summary)
    }
}
