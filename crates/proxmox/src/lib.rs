//! LabDash Proxmox VE client
//!
//! Discovery of nodes and VMs, single-VM and bulk power actions, and the lab
//! reset workflow, on top of an authenticated JSON transport.

pub mod orchestrator;
pub mod transport;

// When the `test-helpers` feature is enabled, include the in-memory transport.
#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;

pub use orchestrator::{latest_snapshot, Orchestrator, VmAction, CURRENT_SNAPSHOT};
pub use transport::{HttpTransport, Transport, API_PREFIX};
