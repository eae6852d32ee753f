//! LabDash Common Library
//!
//! Shared types, errors and configuration for the lab dashboard.

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{DashboardConfig, PfsenseConfig, ProxmoxConfig};
pub use error::{Error, Result, ResultExt};
pub use types::*;

/// LabDash version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
