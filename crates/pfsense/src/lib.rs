//! LabDash pfSense client
//!
//! Reads OpenVPN client connections from the firewall's REST API.

pub mod client;

pub use client::{PfsenseClient, OPENVPN_SERVERS_PATH};
