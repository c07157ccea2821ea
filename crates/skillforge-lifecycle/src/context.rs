//! Error contexts and lifecycle outcomes.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Urgency attached to submissions and invocations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// A failure reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFailure {
    /// Short type name of the failure (e.g. `TimeoutError`).
    pub error_type: String,
    pub message: String,
}

impl HostFailure {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Describe a Rust error, using its unqualified type name as the type.
    pub fn from_error<E: std::error::Error>(err: &E) -> Self {
        let full = std::any::type_name::<E>();
        let short = full
            .split('<')
            .next()
            .and_then(|path| path.rsplit("::").next())
            .unwrap_or(full);
        Self::new(short, err.to_string())
    }
}

/// Structured record of one runtime failure, sent to discovery.
///
/// Built once per failure and never stored locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    pub error_type: String,
    pub message: String,
    pub agent_id: String,
    pub agent_version: String,
    pub base_model_id: String,
    pub task_description: String,
    #[serde(default)]
    pub additional_context: HashMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one discovery round.
///
/// Serializes to the flat `{skillFound, skillUri?, ...}` shape used on the
/// wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "FlatDiscoveryResult", try_from = "FlatDiscoveryResult")]
pub enum SkillDiscoveryResult {
    /// A skill addressing this error exists.
    Found {
        skill_uri: String,
        skill_node_id: Option<String>,
        cluster_id: Option<String>,
        confidence: Option<f32>,
    },
    /// No skill yet; the error may have been filed as a new node.
    NotFound {
        error_node_id: Option<String>,
        cluster_id: Option<String>,
        confidence: Option<f32>,
    },
}

impl SkillDiscoveryResult {
    /// The negative result reported when discovery failed for a
    /// non-transport reason.
    pub fn unavailable() -> Self {
        Self::NotFound {
            error_node_id: None,
            cluster_id: None,
            confidence: Some(0.0),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }

    pub fn skill_uri(&self) -> Option<&str> {
        match self {
            Self::Found { skill_uri, .. } => Some(skill_uri),
            Self::NotFound { .. } => None,
        }
    }

    pub fn error_node_id(&self) -> Option<&str> {
        match self {
            Self::Found { .. } => None,
            Self::NotFound { error_node_id, .. } => error_node_id.as_deref(),
        }
    }

    pub fn cluster_id(&self) -> Option<&str> {
        match self {
            Self::Found { cluster_id, .. } | Self::NotFound { cluster_id, .. } => {
                cluster_id.as_deref()
            }
        }
    }

    pub fn confidence(&self) -> Option<f32> {
        match self {
            Self::Found { confidence, .. } | Self::NotFound { confidence, .. } => *confidence,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlatDiscoveryResult {
    skill_found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    skill_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    skill_node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cluster_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_node_id: Option<String>,
}

impl From<SkillDiscoveryResult> for FlatDiscoveryResult {
    fn from(result: SkillDiscoveryResult) -> Self {
        match result {
            SkillDiscoveryResult::Found {
                skill_uri,
                skill_node_id,
                cluster_id,
                confidence,
            } => Self {
                skill_found: true,
                skill_uri: Some(skill_uri),
                skill_node_id,
                cluster_id,
                confidence,
                error_node_id: None,
            },
            SkillDiscoveryResult::NotFound {
                error_node_id,
                cluster_id,
                confidence,
            } => Self {
                skill_found: false,
                skill_uri: None,
                skill_node_id: None,
                cluster_id,
                confidence,
                error_node_id,
            },
        }
    }
}

impl TryFrom<FlatDiscoveryResult> for SkillDiscoveryResult {
    type Error = String;

    fn try_from(flat: FlatDiscoveryResult) -> Result<Self, Self::Error> {
        if flat.skill_found {
            let skill_uri = flat
                .skill_uri
                .ok_or_else(|| "skillFound is true but skillUri is missing".to_owned())?;
            Ok(Self::Found {
                skill_uri,
                skill_node_id: flat.skill_node_id,
                cluster_id: flat.cluster_id,
                confidence: flat.confidence,
            })
        } else {
            Ok(Self::NotFound {
                error_node_id: flat.error_node_id,
                cluster_id: flat.cluster_id,
                confidence: flat.confidence,
            })
        }
    }
}

/// Outcome of invoking a skill through the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    /// `true` iff the router reported `SUCCESS`.
    pub success: bool,
    pub skill_data: Option<Value>,
    pub error_message: Option<String>,
    pub invocation_id: String,
}

/// Steps a failure passes through on its way to a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleStage {
    Received,
    ContextBuilt,
    Discovering,
    SkillFound,
    ErrorSubmitted,
    Invoking,
    Invoked,
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Received => "RECEIVED",
            Self::ContextBuilt => "CONTEXT_BUILT",
            Self::Discovering => "DISCOVERING",
            Self::SkillFound => "SKILL_FOUND",
            Self::ErrorSubmitted => "ERROR_SUBMITTED",
            Self::Invoking => "INVOKING",
            Self::Invoked => "INVOKED",
        };
        f.write_str(s)
    }
}

/// Full outcome of resolving a failure and, if possible, applying a skill.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillResolution {
    pub discovery: SkillDiscoveryResult,
    /// Present only when a skill was found.
    pub invocation: Option<InvocationResult>,
    /// Id of an adapter delivered by the invocation and placed in the store.
    pub adopted_adapter: Option<String>,
    /// Stages visited, in order.
    pub stages: Vec<LifecycleStage>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
