//! Authenticated HTTP access to the Proxmox VE API

use async_trait::async_trait;
use bytes::Bytes;
use labdash_common::{Error, ProxmoxConfig, Result, ResultExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use tracing::debug;

/// Fixed namespace every PVE JSON endpoint lives under.
pub const API_PREFIX: &str = "/api2/json";

/// A way to reach the control plane.
///
/// `path` is relative to the API namespace, e.g. `/nodes/pve1/qemu`. On
/// success the raw response body is returned for the caller to decode. Any
/// response with status >= 400 is an [`Error::Api`] and its body is never
/// handed back as a payload.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Bytes>;
}

/// reqwest-backed transport using a PVE API token.
pub struct HttpTransport {
    base_url: String,
    auth_token: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &ProxmoxConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            client,
        })
    }

    /// Full URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Bytes> {
        debug!(%method, path, "proxmox request");

        let mut req = self
            .client
            .request(method, self.url(path))
            .header(AUTHORIZATION, format!("PVEAPIToken={}", self.auth_token));

        if let Some(body) = body {
            let payload = serde_json::to_vec(body).map_err(Error::Encode)?;
            req = req.header(CONTENT_TYPE, "application/json").body(payload);
        }

        let resp = req.send().await.context("request failed")?;
        let status = resp.status();
        let body = resp.bytes().await.context("failed to read response body")?;

        if status.as_u16() >= 400 {
            return Err(Error::Api {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Router,
    };

    const TOKEN: &str = "dash@pve!lab=secret";

    async fn spawn_api() -> String {
        let app = Router::new()
            .route(
                "/api2/json/nodes",
                get(|headers: HeaderMap| async move {
                    let auth = headers
                        .get(AUTHORIZATION)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    if auth != format!("PVEAPIToken={}", TOKEN) {
                        return (StatusCode::UNAUTHORIZED, "no ticket".to_string());
                    }
                    (StatusCode::OK, r#"{"data":[{"node":"pve1"}]}"#.to_string())
                }),
            )
            .route(
                "/api2/json/echo",
                post(|headers: HeaderMap, body: String| async move {
                    let ct = headers
                        .get(CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("none")
                        .to_string();
                    format!("{}|{}", ct, body)
                }),
            )
            .route(
                "/api2/json/broken",
                post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "VM 100 is locked") }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    fn transport(base: &str) -> HttpTransport {
        HttpTransport::new(&ProxmoxConfig::new(base, TOKEN)).unwrap()
    }

    #[test]
    fn test_url_building() {
        let t = transport("https://pve.lab:8006/");
        assert_eq!(
            t.url("/nodes/pve1/qemu"),
            "https://pve.lab:8006/api2/json/nodes/pve1/qemu"
        );
    }

    #[tokio::test]
    async fn test_sends_token_and_returns_body() {
        let base = spawn_api().await;
        let body = transport(&base)
            .request(Method::GET, "/nodes", None)
            .await
            .unwrap();
        assert_eq!(&body[..], br#"{"data":[{"node":"pve1"}]}"#);

        let wrong = HttpTransport::new(&ProxmoxConfig::new(&base, "nobody@pam!x=y")).unwrap();
        let err = wrong.request(Method::GET, "/nodes", None).await.unwrap_err();
        assert_eq!(err.api_status(), Some(401));
    }

    #[tokio::test]
    async fn test_json_body_sets_content_type() {
        let base = spawn_api().await;
        let t = transport(&base);

        let payload = serde_json::json!({"force": 1});
        let body = t.request(Method::POST, "/echo", Some(&payload)).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&body), r#"application/json|{"force":1}"#);

        let body = t.request(Method::POST, "/echo", None).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&body), "none|");
    }

    #[tokio::test]
    async fn test_error_status_keeps_body_verbatim() {
        let base = spawn_api().await;
        let err = transport(&base)
            .request(Method::POST, "/broken", None)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "request failed with status 500: VM 100 is locked"
        );
    }

    #[tokio::test]
    async fn test_connection_failure_names_step() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = transport(&format!("http://{}", addr))
            .request(Method::GET, "/nodes", None)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("request failed: "));
        assert_eq!(err.api_status(), None);
    }
}
