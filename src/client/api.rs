//! HTTP client for a running dashboard server.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;

use super::session::QuerySource;
use crate::dashboard::models::{
    CloseIssueRequest, CreateIssueRequest, DependencyTreeNode, Issue, UpdateIssueRequest,
};
use crate::errors::ClientError;

pub const DEFAULT_API_BASE: &str = "http://localhost:3000";

/// `http` → `ws`, `https` → `wss`, plus the `/ws` path.
pub fn derive_ws_url(api_base: &str) -> String {
    let base = api_base.trim_end_matches('/');
    let swapped = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/ws", swapped)
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base: String,
    ws_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self {
            ws_url: derive_ws_url(&base),
            base,
            http: reqwest::Client::new(),
        }
    }

    /// Base URLs from `LOOM_API_BASE` and `LOOM_WS_URL`.
    pub fn from_env() -> Self {
        let base = std::env::var("LOOM_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let client = Self::new(base);
        match std::env::var("LOOM_WS_URL") {
            Ok(ws_url) if !ws_url.is_empty() => client.with_ws_url(ws_url),
            _ => client,
        }
    }

    pub fn with_ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    pub async fn health(&self) -> Result<serde_json::Value, ClientError> {
        self.send(Method::GET, "/api/health", |r| r).await
    }

    pub async fn list_issues(&self) -> Result<Vec<Issue>, ClientError> {
        self.send(Method::GET, "/api/issues", |r| r).await
    }

    pub async fn get_issue(&self, id: &str) -> Result<Issue, ClientError> {
        self.send(Method::GET, &format!("/api/issues/{}", id), |r| r)
            .await
    }

    pub async fn create_issue(&self, request: &CreateIssueRequest) -> Result<Issue, ClientError> {
        self.send(Method::POST, "/api/issues", |r| r.json(request))
            .await
    }

    pub async fn update_issue(&self, request: &UpdateIssueRequest) -> Result<Issue, ClientError> {
        self.send(Method::PATCH, "/api/issues", |r| r.json(request))
            .await
    }

    pub async fn close_issue(&self, id: &str, reason: Option<&str>) -> Result<Issue, ClientError> {
        let body = CloseIssueRequest {
            reason: reason.map(str::to_string),
        };
        self.send(Method::POST, &format!("/api/issues/{}/close", id), |r| {
            r.json(&body)
        })
        .await
    }

    pub async fn ready_issues(&self) -> Result<Vec<Issue>, ClientError> {
        self.send(Method::GET, "/api/issues/ready", |r| r).await
    }

    pub async fn blocked_issues(&self) -> Result<Vec<Issue>, ClientError> {
        self.send(Method::GET, "/api/issues/blocked", |r| r).await
    }

    pub async fn dependency_tree(&self, id: &str) -> Result<Vec<DependencyTreeNode>, ClientError> {
        self.send(Method::GET, &format!("/api/issues/{}/dependencies", id), |r| r)
            .await
    }

    /// Every issue with both edge directions attached.
    pub async fn graph(&self) -> Result<Vec<Issue>, ClientError> {
        self.send(Method::GET, "/api/graph", |r| r).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base, path);
        let http_err = |source| ClientError::Http {
            url: url.clone(),
            source,
        };

        let resp = build(self.http.request(method, &url))
            .send()
            .await
            .map_err(http_err)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
                .unwrap_or(text);
            return Err(ClientError::Status {
                url: url.clone(),
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<T>().await.map_err(http_err)
    }
}

#[async_trait]
impl QuerySource for ApiClient {
    async fn list_issues(&self) -> Result<Vec<Issue>, ClientError> {
        ApiClient::list_issues(self).await
    }

    async fn get_issue(&self, id: &str) -> Result<Issue, ClientError> {
        ApiClient::get_issue(self, id).await
    }

    async fn update_issue(&self, request: &UpdateIssueRequest) -> Result<Issue, ClientError> {
        ApiClient::update_issue(self, request).await
    }
}
