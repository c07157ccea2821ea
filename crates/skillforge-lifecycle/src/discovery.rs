//! Error-cluster discovery service: queries for existing skills and files
//! new error nodes when nothing matches.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{LifecycleConfig, endpoint_url};
use crate::context::{ErrorContext, Priority};
use crate::error::Result;
use crate::transport;

/// Path of the cluster query endpoint.
pub const QUERY_PATH: &str = "/api/error-clusters/query";
/// Path of the error node submission endpoint.
pub const SUBMIT_PATH: &str = "/api/error-nodes/submit";

const SERVICE: &str = "discovery";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorClusterQueryRequest {
    pub error_context: ErrorContext,
    pub max_results: u32,
    pub similarity_threshold: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorClusterQueryResponse {
    pub status: String,
    #[serde(default)]
    pub skill_node_result: Option<SkillNodeResult>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// The best-matching skill node for a query.
///
/// A result without `skill_uri` is a discovery failure, not a malformed
/// body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillNodeResult {
    #[serde(default)]
    pub skill_uri: Option<String>,
    #[serde(default)]
    pub skill_node_id: Option<String>,
    #[serde(default)]
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Interpretation of [`ErrorClusterQueryResponse::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    Success,
    NoMatch,
    Other(String),
}

impl ErrorClusterQueryResponse {
    pub fn query_status(&self) -> QueryStatus {
        match self.status.as_str() {
            "QUERY_SUCCESS" => QueryStatus::Success,
            "QUERY_NO_MATCH" => QueryStatus::NoMatch,
            other => QueryStatus::Other(other.to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorNodeSubmissionRequest {
    pub error_context: ErrorContext,
    pub bounty_amount: f64,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorNodeSubmissionResponse {
    pub status: String,
    #[serde(default)]
    pub error_node_id: Option<String>,
    #[serde(default)]
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ErrorNodeSubmissionResponse {
    /// Both the long and short success spellings are accepted.
    pub fn is_success(&self) -> bool {
        matches!(self.status.as_str(), "SUBMISSION_SUCCESS" | "SUCCESS")
    }
}

/// Remote service that indexes error contexts and the skills fixing them.
#[async_trait]
pub trait DiscoveryService: Send + Sync {
    async fn query_error_clusters(
        &self,
        request: &ErrorClusterQueryRequest,
    ) -> Result<ErrorClusterQueryResponse>;

    async fn submit_error_node(
        &self,
        request: &ErrorNodeSubmissionRequest,
    ) -> Result<ErrorNodeSubmissionResponse>;
}

/// [`DiscoveryService`] over JSON/HTTP.
#[derive(Debug, Clone)]
pub struct HttpDiscoveryClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpDiscoveryClient {
    pub fn new(config: &LifecycleConfig) -> Result<Self> {
        Ok(Self::with_client(
            config.discovery_endpoint.clone(),
            transport::build_client(config)?,
        ))
    }

    /// Use an existing client, e.g. one shared with the router.
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
impl DiscoveryService for HttpDiscoveryClient {
    async fn query_error_clusters(
        &self,
        request: &ErrorClusterQueryRequest,
    ) -> Result<ErrorClusterQueryResponse> {
        let url = endpoint_url(&self.base_url, QUERY_PATH);
        transport::post_json(&self.http, SERVICE, &url, request).await
    }

    async fn submit_error_node(
        &self,
        request: &ErrorNodeSubmissionRequest,
    ) -> Result<ErrorNodeSubmissionResponse> {
        let url = endpoint_url(&self.base_url, SUBMIT_PATH);
        transport::post_json(&self.http, SERVICE, &url, request).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn query_status_mapping() {
        let parse = |status: &str| {
            serde_json::from_value::<ErrorClusterQueryResponse>(json!({ "status": status }))
                .unwrap()
                .query_status()
        };
        assert_eq!(parse("QUERY_SUCCESS"), QueryStatus::Success);
        assert_eq!(parse("QUERY_NO_MATCH"), QueryStatus::NoMatch);
        assert_eq!(parse("QUERY_ERROR"), QueryStatus::Other("QUERY_ERROR".into()));
    }

    #[test]
    fn query_response_reads_nested_result() {
        let response: ErrorClusterQueryResponse = serde_json::from_value(json!({
            "status": "QUERY_SUCCESS",
            "skillNodeResult": { "skillUri": "uri://x", "clusterId": "c9", "confidence": 0.92 }
        }))
        .unwrap();
        let node = response.skill_node_result.unwrap();
        assert_eq!(node.skill_uri.as_deref(), Some("uri://x"));
        assert_eq!(node.cluster_id.as_deref(), Some("c9"));
        assert_eq!(node.skill_node_id, None);
    }

    #[test]
    fn submission_success_spellings() {
        for (status, ok) in [
            ("SUBMISSION_SUCCESS", true),
            ("SUCCESS", true),
            ("SUBMISSION_FAILED", false),
        ] {
            let response = ErrorNodeSubmissionResponse {
                status: status.into(),
                error_node_id: None,
                cluster_id: None,
                error_message: None,
            };
            assert_eq!(response.is_success(), ok, "{status}");
        }
    }

    #[test]
    fn submission_request_uses_camel_case() {
        let request = ErrorNodeSubmissionRequest {
            error_context: ErrorContext {
                error_type: "E".into(),
                message: "m".into(),
                agent_id: "a".into(),
                agent_version: "1".into(),
                base_model_id: "b".into(),
                task_description: "t".into(),
                additional_context: Default::default(),
                timestamp: chrono::Utc::now(),
            },
            bounty_amount: 1.0,
            priority: Priority::Medium,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["bountyAmount"], 1.0);
        assert_eq!(value["priority"], "MEDIUM");
        assert_eq!(value["errorContext"]["agentId"], "a");
    }
}
