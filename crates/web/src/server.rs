//! Web server implementation

use crate::static_files::UiAssets;
use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use labdash_common::{DashboardConfig, VmInfo, VmOperationResult, VpnConnection};
use labdash_pfsense::PfsenseClient;
use labdash_proxmox::Orchestrator;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Upper bound on how long a client waits for a response.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Web server state
#[derive(Clone)]
pub struct WebServer {
    state: Arc<WebServerState>,
}

struct WebServerState {
    orchestrator: Arc<Orchestrator>,
    pfsense: PfsenseClient,
    ui: UiAssets,
}

/// Any failure surfaced to a dashboard client: 500 with the message.
#[derive(Debug)]
pub struct ApiError(String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("request failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": self.0})),
        )
            .into_response()
    }
}

impl From<labdash_common::Error> for ApiError {
    fn from(e: labdash_common::Error) -> Self {
        ApiError(e.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError(format!("background task failed: {}", e))
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

impl WebServer {
    /// Create a new web server
    pub fn new(orchestrator: Orchestrator, pfsense: PfsenseClient, ui: UiAssets) -> Self {
        Self {
            state: Arc::new(WebServerState {
                orchestrator: Arc::new(orchestrator),
                pfsense,
                ui,
            }),
        }
    }

    /// Build the server from loaded configuration
    pub fn from_config(config: &DashboardConfig) -> labdash_common::Result<Self> {
        Ok(Self::new(
            Orchestrator::from_config(&config.proxmox)?,
            PfsenseClient::new(&config.pfsense)?,
            UiAssets::new(config.ui_dir.clone()),
        ))
    }

    /// Create router
    pub fn router(&self) -> Router {
        let pve_routes = Router::new()
            .route("/vms", get(list_vms_handler))
            .route("/vms/start", post(start_all_handler))
            .route("/vms/stop", post(stop_all_handler))
            .route("/vms/reset", post(reset_all_handler))
            .route("/reset", get(last_reset_handler).post(reset_lab_handler));

        let pfsense_routes =
            Router::new().route("/openvpn/connections", get(openvpn_connections_handler));

        Router::new()
            .route("/api/health", get(health_handler))
            .nest("/api/pve", pve_routes)
            .nest("/api/pfsense", pfsense_routes)
            .fallback(fallback_handler)
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
            .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the web server
    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        info!("Dashboard listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received shutdown signal");
                }
            })
            .await?;

        Ok(())
    }
}

/// Run a control-plane job on its own task.
///
/// A client that disconnects drops the handler future; the spawned job keeps
/// going until it finishes or discovery fails.
async fn run_detached<T, F, Fut>(state: &WebServerState, job: F) -> Result<T, ApiError>
where
    F: FnOnce(Arc<Orchestrator>) -> Fut,
    Fut: Future<Output = labdash_common::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(job(state.orchestrator.clone()));
    Ok(handle.await??)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "labdash",
        "version": labdash_common::VERSION,
    }))
}

async fn list_vms_handler(State(state): State<Arc<WebServerState>>) -> ApiResult<Vec<VmInfo>> {
    Ok(Json(state.orchestrator.get_vms().await?))
}

async fn start_all_handler(
    State(state): State<Arc<WebServerState>>,
) -> ApiResult<Vec<VmOperationResult>> {
    let results = run_detached(&state, |o| async move { o.start_all_vms().await }).await?;
    Ok(Json(results))
}

async fn stop_all_handler(
    State(state): State<Arc<WebServerState>>,
) -> ApiResult<Vec<VmOperationResult>> {
    let results = run_detached(&state, |o| async move { o.stop_all_vms().await }).await?;
    Ok(Json(results))
}

async fn reset_all_handler(
    State(state): State<Arc<WebServerState>>,
) -> ApiResult<Vec<VmOperationResult>> {
    let results = run_detached(&state, |o| async move { o.reset_all_vms().await }).await?;
    Ok(Json(results))
}

async fn last_reset_handler(State(state): State<Arc<WebServerState>>) -> impl IntoResponse {
    Json(serde_json::json!({ "last_reset": state.orchestrator.last_reset() }))
}

async fn reset_lab_handler(
    State(state): State<Arc<WebServerState>>,
) -> ApiResult<serde_json::Value> {
    let summary = run_detached(&state, |o| async move { o.reset_lab().await }).await?;
    debug!(?summary, "lab reset request complete");
    Ok(Json(serde_json::json!({ "message": "VMs reset successfully" })))
}

async fn openvpn_connections_handler(
    State(state): State<Arc<WebServerState>>,
) -> ApiResult<Vec<VpnConnection>> {
    Ok(Json(state.pfsense.openvpn_connections().await?))
}

async fn fallback_handler(State(state): State<Arc<WebServerState>>, uri: Uri) -> Response {
    if uri.path().starts_with("/api/") {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "not found"})),
        )
            .into_response();
    }
    state.ui.serve(uri.path()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use labdash_common::PfsenseConfig;
    use labdash_proxmox::mock::MockTransport;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn cluster() -> MockTransport {
        MockTransport::new()
            .with_get("/nodes", json!([{"node": "A"}, {"node": "B"}]))
            .with_get("/nodes/A/qemu", json!([{"vmid": 100, "name": "dc01", "status": "running"}]))
            .with_get("/nodes/B/qemu", json!([{"vmid": 200, "name": "srv02", "status": "stopped"}]))
            .with_get("/nodes/A/qemu/100/snapshot", json!([{"name": "base", "snaptime": 10}]))
            .with_get("/nodes/B/qemu/200/snapshot", json!([]))
    }

    fn server(mock: MockTransport) -> WebServer {
        // Nothing listens on the discard port; firewall calls fail fast.
        let pfsense = PfsenseClient::new(&PfsenseConfig {
            url: "http://127.0.0.1:9".to_string(),
            username: "admin".to_string(),
            password: "pfsense".to_string(),
            verify_tls: true,
        })
        .unwrap();
        WebServer::new(Orchestrator::new(Arc::new(mock)), pfsense, UiAssets::default())
    }

    async fn call(server: &WebServer, method: Method, uri: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let res = server.router().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(&server(cluster()), Method::GET, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_list_vms() {
        let (status, body) = call(&server(cluster()), Method::GET, "/api/pve/vms").await;
        assert_eq!(status, StatusCode::OK);
        let vms = body.as_array().unwrap();
        assert_eq!(vms.len(), 2);
        assert_eq!(vms[0]["id"], "100");
        assert_eq!(vms[0]["node"], "A");
        assert_eq!(vms[1]["id"], "200");
        assert_eq!(vms[1]["node"], "B");
        assert_eq!(vms[1]["status"], "stopped");
    }

    #[tokio::test]
    async fn test_stop_all_reports_each_vm() {
        let mock = cluster().with_failure(
            Method::POST,
            "/nodes/A/qemu/100/status/stop",
            500,
            "locked",
        );
        let (status, body) = call(&server(mock), Method::POST, "/api/pve/vms/stop").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([
                {
                    "vmid": "100",
                    "success": false,
                    "message": "failed to stop VM: request failed with status 500: locked"
                },
                {"vmid": "200", "success": true}
            ])
        );
    }

    #[tokio::test]
    async fn test_discovery_failure_is_server_error() {
        let mock = MockTransport::new().with_failure(Method::GET, "/nodes", 401, "no ticket");
        let srv = server(mock);

        let (status, body) = call(&srv, Method::GET, "/api/pve/vms").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["error"],
            "failed to get nodes: request failed with status 401: no ticket"
        );

        let (status, _) = call(&srv, Method::POST, "/api/pve/vms/start").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_lab_reset_updates_timestamp() {
        let srv = server(cluster());

        let (_, body) = call(&srv, Method::GET, "/api/pve/reset").await;
        assert_eq!(body, json!({"last_reset": 0}));

        let (status, body) = call(&srv, Method::POST, "/api/pve/reset").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "VMs reset successfully");

        let (_, body) = call(&srv, Method::GET, "/api/pve/reset").await;
        assert!(body["last_reset"].as_u64().unwrap() > 1_700_000_000);
    }

    #[tokio::test]
    async fn test_firewall_failure_is_server_error() {
        let (status, body) =
            call(&server(cluster()), Method::GET, "/api/pfsense/openvpn/connections").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().starts_with("request failed"));
    }

    #[tokio::test]
    async fn test_unknown_api_route_is_not_found() {
        let (status, _) = call(&server(cluster()), Method::GET, "/api/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
