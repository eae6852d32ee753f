//! Dashboard configuration
//!
//! Everything is read from environment variables at startup. The loader takes
//! a lookup closure so callers (and tests) can supply any source.

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Dashboard configuration
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Proxmox VE control plane
    pub proxmox: ProxmoxConfig,

    /// pfSense firewall
    pub pfsense: PfsenseConfig,

    /// Directory holding the built web UI (index.html + assets)
    pub ui_dir: Option<PathBuf>,
}

/// Proxmox VE API access
#[derive(Debug, Clone)]
pub struct ProxmoxConfig {
    /// Base URL, e.g. https://pve.lab:8006
    pub url: String,

    /// API token in `user@realm!tokenName=tokenValue` form
    pub auth_token: String,

    /// Verify the server certificate. Off by default: PVE ships self-signed.
    pub verify_tls: bool,
}

impl ProxmoxConfig {
    pub fn new(url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: auth_token.into(),
            verify_tls: false,
        }
    }
}

/// pfSense REST API access
#[derive(Debug, Clone)]
pub struct PfsenseConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub verify_tls: bool,
}

/// Assemble a PVE API token string.
pub fn proxmox_token(username: &str, realm: &str, token_name: &str, token_value: &str) -> String {
    format!("{}@{}!{}={}", username, realm, token_name, token_value)
}

impl DashboardConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    Error::InvalidConfig(format!("{} environment variable is required", key))
                })
        };
        let flag = |key: &str, default: bool| -> Result<bool> {
            match lookup(key) {
                Some(v) if !v.trim().is_empty() => parse_bool(key, &v),
                _ => Ok(default),
            }
        };

        let url = required("PROXMOX_URL")?;
        let auth_token = proxmox_token(
            &required("PROXMOX_USERNAME")?,
            &required("PROXMOX_REALM")?,
            &required("PROXMOX_API_TOKEN_NAME")?,
            &required("PROXMOX_API_TOKEN")?,
        );
        let proxmox = ProxmoxConfig {
            url,
            auth_token,
            verify_tls: flag("PROXMOX_VERIFY_TLS", false)?,
        };

        let pfsense = PfsenseConfig {
            url: required("PFSENSE_URL")?,
            username: required("PFSENSE_USERNAME")?,
            password: required("PFSENSE_PASSWORD")?,
            verify_tls: flag("PFSENSE_VERIFY_TLS", true)?,
        };

        let ui_dir = lookup("LABDASH_UI_DIR").and_then(|v| {
            let v = v.trim();
            if v.is_empty() {
                None
            } else {
                Some(PathBuf::from(v))
            }
        });

        Ok(Self {
            proxmox,
            pfsense,
            ui_dir,
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::InvalidConfig(format!(
            "{} must be a boolean, got {:?}",
            key, other
        ))),
    }
}
