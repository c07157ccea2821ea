//! The error → skill lifecycle.
//!
//! Each host failure moves through
//! `RECEIVED → CONTEXT_BUILT → DISCOVERING → {SKILL_FOUND | ERROR_SUBMITTED}`
//! and, when a skill was found and the caller asked for it,
//! `→ INVOKING → INVOKED`.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use serde_json::Value;
use skillforge_lora::{LoraAdapter, SkillInvocationResponse, codec};
use skillforge_store::AdapterStore;
use tracing::{debug, info, warn};

use crate::config::LifecycleConfig;
use crate::context::{
    ErrorContext, HostFailure, InvocationResult, LifecycleStage, SkillDiscoveryResult,
    SkillResolution,
};
use crate::discovery::{
    DiscoveryService, ErrorClusterQueryRequest, ErrorNodeSubmissionRequest, HttpDiscoveryClient,
    QueryStatus,
};
use crate::error::{LifecycleError, Result};
use crate::router::{HttpRouterClient, RouterInvokeRequest, RouterService};
use crate::transport;

/// Drives discovery, submission, and invocation for host failures.
pub struct SkillLifecycleManager {
    config: LifecycleConfig,
    discovery: Arc<dyn DiscoveryService>,
    router: Arc<dyn RouterService>,
    store: AdapterStore,
}

impl SkillLifecycleManager {
    /// Validate `config` and connect to the configured HTTP services.
    pub fn new(config: LifecycleConfig) -> Result<Self> {
        config.validate()?;
        let http = transport::build_client(&config)?;
        let discovery =
            HttpDiscoveryClient::with_client(config.discovery_endpoint.clone(), http.clone());
        let router = HttpRouterClient::with_client(config.router_endpoint.clone(), http);

        info!(
            discovery = %config.discovery_endpoint,
            router = %config.router_endpoint,
            agent_id = %config.agent_id,
            "skill lifecycle manager ready"
        );
        Ok(Self::with_services(
            config,
            Arc::new(discovery),
            Arc::new(router),
        ))
    }

    /// Use caller-provided service implementations.
    pub fn with_services(
        config: LifecycleConfig,
        discovery: Arc<dyn DiscoveryService>,
        router: Arc<dyn RouterService>,
    ) -> Self {
        Self {
            config,
            discovery,
            router,
            store: AdapterStore::new(),
        }
    }

    /// Share an existing store for adopted adapters.
    pub fn with_store(mut self, store: AdapterStore) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &AdapterStore {
        &self.store
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Describe a failure for the discovery service.
    pub fn build_error_context(
        &self,
        failure: &HostFailure,
        task_description: &str,
        extra_context: HashMap<String, Value>,
    ) -> ErrorContext {
        ErrorContext {
            error_type: failure.error_type.clone(),
            message: failure.message.clone(),
            agent_id: self.config.agent_id.clone(),
            agent_version: self.config.agent_version.clone(),
            base_model_id: self.config.base_model_id.clone(),
            task_description: task_description.to_owned(),
            additional_context: extra_context,
            timestamp: Utc::now(),
        }
    }

    /// Look for a skill addressing `failure`.
    ///
    /// Transport failures are returned as errors. Any other failure is
    /// reported as [`SkillDiscoveryResult::unavailable`].
    pub async fn handle_error(
        &self,
        failure: &HostFailure,
        task_description: &str,
        extra_context: HashMap<String, Value>,
    ) -> Result<SkillDiscoveryResult> {
        let mut stages = Vec::new();
        self.resolve(failure, task_description, extra_context, &mut stages)
            .await
    }

    /// Query discovery and, on no match, file the error as a new node.
    pub async fn discover_skill_for_error(
        &self,
        context: &ErrorContext,
    ) -> Result<SkillDiscoveryResult> {
        let query = ErrorClusterQueryRequest {
            error_context: context.clone(),
            max_results: self.config.max_results,
            similarity_threshold: self.config.similarity_threshold,
        };
        let response = self.discovery.query_error_clusters(&query).await?;

        match response.query_status() {
            QueryStatus::Success => {
                let node = response.skill_node_result.ok_or_else(|| {
                    LifecycleError::Discovery("QUERY_SUCCESS without skillNodeResult".into())
                })?;
                let skill_uri = node.skill_uri.ok_or_else(|| {
                    LifecycleError::Discovery("QUERY_SUCCESS result has no skillUri".into())
                })?;
                info!(
                    error_type = %context.error_type,
                    skill_uri = %skill_uri,
                    confidence = ?node.confidence,
                    "skill found for error"
                );
                Ok(SkillDiscoveryResult::Found {
                    skill_uri,
                    skill_node_id: node.skill_node_id,
                    cluster_id: node.cluster_id,
                    confidence: node.confidence,
                })
            }
            QueryStatus::NoMatch => self.submit_error_node(context).await,
            QueryStatus::Other(status) => Err(LifecycleError::Discovery(format!(
                "unexpected status {status}: {}",
                response.error_message.as_deref().unwrap_or("no message")
            ))),
        }
    }

    async fn submit_error_node(&self, context: &ErrorContext) -> Result<SkillDiscoveryResult> {
        let request = ErrorNodeSubmissionRequest {
            error_context: context.clone(),
            bounty_amount: self.config.bounty_amount,
            priority: self.config.submission_priority,
        };
        let response = self.discovery.submit_error_node(&request).await?;

        if !response.is_success() {
            return Err(LifecycleError::Submission(format!(
                "{}: {}",
                response.status,
                response.error_message.as_deref().unwrap_or("no message")
            )));
        }

        info!(
            error_type = %context.error_type,
            error_node_id = ?response.error_node_id,
            cluster_id = ?response.cluster_id,
            "no skill yet, error node submitted"
        );
        Ok(SkillDiscoveryResult::NotFound {
            error_node_id: response.error_node_id,
            cluster_id: response.cluster_id,
            confidence: None,
        })
    }

    /// Run a skill through the router.
    ///
    /// A skill that ran but did not succeed is `Ok` with `success == false`.
    pub async fn invoke_skill(
        &self,
        skill_uri: &str,
        token: &str,
        parameters: HashMap<String, Value>,
    ) -> Result<InvocationResult> {
        let (result, _) = self.invoke_and_adopt(skill_uri, token, parameters).await?;
        Ok(result)
    }

    /// Resolve `failure` and, if a skill exists, invoke it.
    pub async fn handle_error_and_invoke_skill(
        &self,
        failure: &HostFailure,
        task_description: &str,
        extra_context: HashMap<String, Value>,
        token: &str,
        parameters: HashMap<String, Value>,
    ) -> Result<SkillResolution> {
        let mut stages = Vec::new();
        let discovery = self
            .resolve(failure, task_description, extra_context, &mut stages)
            .await?;

        let Some(skill_uri) = discovery.skill_uri().map(str::to_owned) else {
            return Ok(SkillResolution {
                discovery,
                invocation: None,
                adopted_adapter: None,
                stages,
            });
        };

        enter(&mut stages, LifecycleStage::Invoking);
        let (invocation, adopted) = self.invoke_and_adopt(&skill_uri, token, parameters).await?;
        enter(&mut stages, LifecycleStage::Invoked);

        Ok(SkillResolution {
            discovery,
            invocation: Some(invocation),
            adopted_adapter: adopted,
            stages,
        })
    }

    /// Store the adapter carried by a successful protobuf invocation
    /// response. Non-success responses adopt nothing.
    pub fn adopt_invocation_response(
        &self,
        response: SkillInvocationResponse,
    ) -> Result<Option<Arc<LoraAdapter>>> {
        let invocation_id = response.invocation_id.clone();
        let adopted = response.into_adapter()?.map(|adapter| self.store.insert(adapter));
        if let Some(adapter) = &adopted {
            info!(%invocation_id, skill_id = %adapter.skill_id, "adapter adopted from invocation");
        }
        Ok(adopted)
    }

    async fn resolve(
        &self,
        failure: &HostFailure,
        task_description: &str,
        extra_context: HashMap<String, Value>,
        stages: &mut Vec<LifecycleStage>,
    ) -> Result<SkillDiscoveryResult> {
        enter(stages, LifecycleStage::Received);
        let context = self.build_error_context(failure, task_description, extra_context);
        enter(stages, LifecycleStage::ContextBuilt);

        enter(stages, LifecycleStage::Discovering);
        match self.discover_skill_for_error(&context).await {
            Ok(result) => {
                let stage = if result.is_found() {
                    LifecycleStage::SkillFound
                } else {
                    LifecycleStage::ErrorSubmitted
                };
                enter(stages, stage);
                Ok(result)
            }
            Err(err) if err.is_transport_failure() => {
                warn!(error_type = %failure.error_type, error = %err, "discovery transport failure");
                Err(err)
            }
            Err(err) => {
                warn!(
                    error_type = %failure.error_type,
                    error = %err,
                    "discovery failed, reporting no skill"
                );
                Ok(SkillDiscoveryResult::unavailable())
            }
        }
    }

    async fn invoke_and_adopt(
        &self,
        skill_uri: &str,
        token: &str,
        parameters: HashMap<String, Value>,
    ) -> Result<(InvocationResult, Option<String>)> {
        let request = RouterInvokeRequest {
            invocation_id: uuid::Uuid::now_v7().to_string(),
            agent_id: self.config.agent_id.clone(),
            skill_uri: skill_uri.to_owned(),
            nrn_token: token.to_owned(),
            parameters,
            priority: self.config.invocation_priority,
            timestamp: Utc::now(),
        };
        let response = self.router.invoke(&request).await?;

        let result = InvocationResult {
            success: response.is_success(),
            invocation_id: response
                .invocation_id
                .unwrap_or_else(|| request.invocation_id.clone()),
            skill_data: response.skill_data,
            error_message: response.error_message,
        };

        if !result.success {
            warn!(
                skill_uri,
                invocation_id = %result.invocation_id,
                status = %response.status,
                error = ?result.error_message,
                "skill invocation did not succeed"
            );
            return Ok((result, None));
        }

        info!(skill_uri, invocation_id = %result.invocation_id, "skill invoked");
        let adopted = result
            .skill_data
            .as_ref()
            .and_then(container_bytes)
            .and_then(|bytes| match self.store.import(&bytes) {
                Ok(adapter) => Some(adapter.skill_id.clone()),
                Err(e) => {
                    warn!(skill_uri, error = %e, "skill data looked like an adapter but did not decode");
                    None
                }
            });
        Ok((result, adopted))
    }
}

fn enter(stages: &mut Vec<LifecycleStage>, stage: LifecycleStage) {
    debug!(%stage, "lifecycle stage");
    stages.push(stage);
}

/// Extract a base64 binary container from invocation `skill_data`, either
/// as the whole string or under an `adapter` key.
fn container_bytes(data: &Value) -> Option<Vec<u8>> {
    let encoded = match data {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("adapter")?.as_str()?,
        _ => return None,
    };
    let bytes = BASE64.decode(encoded.trim()).ok()?;
    bytes.starts_with(&codec::HEADER).then_some(bytes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
