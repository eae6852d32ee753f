//! Scripted in-memory control plane.
//!
//! Responses are keyed by `(method, path)`. Unscripted `POST`s succeed with an
//! empty task reply; unscripted `GET`s answer 404 like PVE does for unknown
//! resources. Every request is recorded in call order.

use crate::transport::Transport;
use async_trait::async_trait;
use bytes::Bytes;
use labdash_common::{Error, Result};
use reqwest::Method;
use std::collections::HashMap;
use std::sync::Mutex;

enum Reply {
    Json(serde_json::Value),
    Status(u16, String),
}

#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<(Method, String), Reply>>,
    calls: Mutex<Vec<(Method, String)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `GET path` with `{"data": data}`.
    pub fn with_get(self, path: &str, data: serde_json::Value) -> Self {
        self.script(Method::GET, path, Reply::Json(serde_json::json!({ "data": data })))
    }

    /// Answer `GET path` with an arbitrary raw JSON body.
    pub fn with_raw_get(self, path: &str, body: serde_json::Value) -> Self {
        self.script(Method::GET, path, Reply::Json(body))
    }

    /// Fail `method path` with the given HTTP status and body.
    pub fn with_failure(self, method: Method, path: &str, status: u16, body: &str) -> Self {
        self.script(method, path, Reply::Status(status, body.to_string()))
    }

    fn script(self, method: Method, path: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((method, path.to_string()), reply);
        self
    }

    /// Requests seen so far, in order.
    pub fn calls(&self) -> Vec<(Method, String)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Paths of the `POST` requests seen so far, in order.
    pub fn posts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(m, _)| *m == Method::POST)
            .map(|(_, p)| p)
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        _body: Option<&serde_json::Value>,
    ) -> Result<Bytes> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((method.clone(), path.to_string()));

        let replies = self.replies.lock().unwrap_or_else(|e| e.into_inner());
        match replies.get(&(method.clone(), path.to_string())) {
            Some(Reply::Json(value)) => Ok(Bytes::from(value.to_string())),
            Some(Reply::Status(status, body)) => Err(Error::Api {
                status: *status,
                body: body.clone(),
            }),
            None if method == Method::POST => Ok(Bytes::from_static(br#"{"data":null}"#)),
            None => Err(Error::Api {
                status: 404,
                body: format!("no such resource: {}", path),
            }),
        }
    }
}
