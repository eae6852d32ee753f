//! pfSense REST API client

use labdash_common::{Error, PfsenseConfig, Result, ResultExt, VpnConnection};
use serde::Deserialize;
use tracing::debug;

/// OpenVPN server status endpoint of the pfSense REST API v2
pub const OPENVPN_SERVERS_PATH: &str = "/api/v2/status/openvpn/servers";

#[derive(Debug, Deserialize)]
struct ServersResponse {
    code: u16,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<Vec<OpenVpnServer>>,
}

#[derive(Debug, Deserialize)]
struct OpenVpnServer {
    #[serde(default)]
    name: String,
    #[serde(default)]
    conns: Option<Vec<VpnConnection>>,
}

/// Client for the firewall's status API
pub struct PfsenseClient {
    base_url: String,
    username: String,
    password: String,
    client: reqwest::Client,
}

impl PfsenseClient {
    pub fn new(config: &PfsenseConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            client,
        })
    }

    /// Every client currently connected to any OpenVPN server, in server order
    pub async fn openvpn_connections(&self) -> Result<Vec<VpnConnection>> {
        let url = format!("{}{}", self.base_url, OPENVPN_SERVERS_PATH);
        let resp = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .context("request failed")?;

        let status = resp.status().as_u16();
        let body = resp.bytes().await.context("failed to read response body")?;

        // pfSense reports failures in the JSON envelope, so the body is decoded
        // before looking at the HTTP status.
        let response: ServersResponse = match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(_) if status >= 400 => {
                return Err(Error::Api {
                    status,
                    body: String::from_utf8_lossy(&body).into_owned(),
                })
            }
            Err(e) => return Err(Error::decode("OpenVPN servers response", e)),
        };

        if response.code != 200 {
            return Err(Error::Firewall(format!(
                "failed to get OpenVPN clients: {}",
                response.message
            )));
        }

        let mut connections = Vec::new();
        for server in response.data.unwrap_or_default() {
            let conns = server.conns.unwrap_or_default();
            debug!(server = %server.name, count = conns.len(), "OpenVPN server status");
            connections.extend(conns);
        }

        Ok(connections)
    }
}
