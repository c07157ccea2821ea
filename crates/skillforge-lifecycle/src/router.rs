//! Skill router: runs a discovered skill on behalf of the agent.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{LifecycleConfig, endpoint_url};
use crate::context::Priority;
use crate::error::Result;
use crate::transport;

/// Path of the invocation endpoint.
pub const INVOKE_PATH: &str = "/wasm/invoke";

const SERVICE: &str = "router";

/// Status the router reports for a successful run.
pub const STATUS_SUCCESS: &str = "SUCCESS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterInvokeRequest {
    pub invocation_id: String,
    pub agent_id: String,
    pub skill_uri: String,
    pub nrn_token: String,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    pub priority: Priority,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterInvokeResponse {
    pub status: String,
    #[serde(default)]
    pub skill_data: Option<Value>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub invocation_id: Option<String>,
}

impl RouterInvokeResponse {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// Remote service that executes skills.
#[async_trait]
pub trait RouterService: Send + Sync {
    /// Run a skill. Errors only when the call itself failed; a skill that
    /// ran and failed is reported through the response status.
    async fn invoke(&self, request: &RouterInvokeRequest) -> Result<RouterInvokeResponse>;
}

/// [`RouterService`] over JSON/HTTP.
#[derive(Debug, Clone)]
pub struct HttpRouterClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpRouterClient {
    pub fn new(config: &LifecycleConfig) -> Result<Self> {
        Ok(Self::with_client(
            config.router_endpoint.clone(),
            transport::build_client(config)?,
        ))
    }

    pub fn with_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl RouterService for HttpRouterClient {
    async fn invoke(&self, request: &RouterInvokeRequest) -> Result<RouterInvokeResponse> {
        let url = endpoint_url(&self.base_url, INVOKE_PATH);
        transport::post_json(&self.http, SERVICE, &url, request).await
    }
}
