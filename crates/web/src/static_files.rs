//! Web UI asset serving
//!
//! Files come from the built UI directory. Unknown paths fall back to
//! `index.html` so client-side routes resolve.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::path::PathBuf;

/// Built UI directory, if one is configured
#[derive(Clone, Debug, Default)]
pub struct UiAssets {
    dir: Option<PathBuf>,
}

impl UiAssets {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Serve `path`, or `index.html` when it does not exist
    pub async fn serve(&self, path: &str) -> Response {
        let rel = path.trim_start_matches('/');
        let rel = if rel.is_empty() { "index.html" } else { rel };

        let res = self.serve_file(rel).await;
        if res.status() != StatusCode::NOT_FOUND || rel == "index.html" {
            return res;
        }
        self.serve_file("index.html").await
    }

    async fn serve_file(&self, rel: &str) -> Response {
        let Some(dir) = self.dir.as_ref() else {
            return (StatusCode::NOT_FOUND, "UI not configured").into_response();
        };

        // Prevent path traversal: the canonical path must stay within dir.
        let Ok(canon_dir) = dir.canonicalize() else {
            return (StatusCode::INTERNAL_SERVER_ERROR, "Bad UI dir").into_response();
        };
        let Ok(canon_req) = dir.join(rel).canonicalize() else {
            return (StatusCode::NOT_FOUND, "Not found").into_response();
        };
        if !canon_req.starts_with(&canon_dir) {
            return (StatusCode::FORBIDDEN, "Forbidden").into_response();
        }
        if !canon_req.is_file() {
            return (StatusCode::NOT_FOUND, "Not found").into_response();
        }

        match tokio::fs::read(&canon_req).await {
            Ok(bytes) => {
                let mime = mime_guess::from_path(&canon_req).first_or_octet_stream();
                (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE, mime.essence_str().to_string())],
                    bytes,
                )
                    .into_response()
            }
            Err(_) => (StatusCode::NOT_FOUND, "Not found").into_response(),
        }
    }
}
