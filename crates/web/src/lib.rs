//! LabDash web server
//!
//! JSON API over the Proxmox and pfSense clients, plus the dashboard UI.

pub mod server;
pub mod static_files;

pub use server::{ApiError, WebServer};
pub use static_files::UiAssets;
