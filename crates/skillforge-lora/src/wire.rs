//! Protobuf wire messages for skills and skill invocation.
//!
//! Field numbers and types are a compatibility contract with the router
//! and any other service exchanging adapters; do not renumber.

use std::collections::HashMap;

use prost::Message;

use crate::codec::{pack_f32, unpack_f32};
use crate::error::{LoraError, Result};
use crate::types::LoraAdapter;

/// A LoRA adapter on the wire. Weights are packed little-endian `f32`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct LoRaAdapterSkill {
    #[prost(string, tag = "1")]
    pub skill_id: String,
    #[prost(string, tag = "2")]
    pub skill_name: String,
    #[prost(string, tag = "3")]
    pub description: String,
    #[prost(string, tag = "4")]
    pub base_model_compatibility: String,
    #[prost(uint32, tag = "5")]
    pub version: u32,
    #[prost(int32, tag = "6")]
    pub rank: i32,
    #[prost(float, tag = "7")]
    pub alpha: f32,
    #[prost(bytes = "vec", tag = "8")]
    pub weights_a: Vec<u8>,
    #[prost(bytes = "vec", tag = "9")]
    pub weights_b: Vec<u8>,
    #[prost(map = "string, string", tag = "10")]
    pub additional_metadata: HashMap<String, String>,
}

/// Request to run a skill on behalf of an agent core.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SkillInvocationRequest {
    #[prost(string, tag = "1")]
    pub invocation_id: String,
    #[prost(string, tag = "2")]
    pub skill_id: String,
    #[prost(map = "string, string", tag = "3")]
    pub parameters: HashMap<String, String>,
    #[prost(string, tag = "4")]
    pub agent_core_id: String,
}

/// Outcome of a skill invocation.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SkillInvocationResponse {
    #[prost(string, tag = "1")]
    pub invocation_id: String,
    #[prost(enumeration = "InvocationStatus", tag = "2")]
    pub status: i32,
    #[prost(message, optional, tag = "3")]
    pub skill: Option<LoRaAdapterSkill>,
    #[prost(string, tag = "4")]
    pub error_message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum InvocationStatus {
    Unspecified = 0,
    Success = 1,
    Failure = 2,
    NotFound = 3,
}

impl From<&LoraAdapter> for LoRaAdapterSkill {
    fn from(adapter: &LoraAdapter) -> Self {
        Self {
            skill_id: adapter.skill_id.clone(),
            skill_name: adapter.skill_name.clone(),
            description: adapter.description.clone(),
            base_model_compatibility: adapter.base_model_compatibility.clone(),
            version: adapter.version,
            rank: adapter.rank,
            alpha: adapter.alpha,
            weights_a: pack_f32(&adapter.weights_a),
            weights_b: pack_f32(&adapter.weights_b),
            additional_metadata: adapter.additional_metadata.clone(),
        }
    }
}

impl TryFrom<LoRaAdapterSkill> for LoraAdapter {
    type Error = LoraError;

    /// Fails if either weight block is not a whole number of floats, or if
    /// the message is missing its id.
    fn try_from(skill: LoRaAdapterSkill) -> Result<Self> {
        if skill.skill_id.is_empty() {
            return Err(LoraError::InvalidParameter {
                name: "skill_id",
                reason: "wire skill has no id".into(),
            });
        }
        Ok(Self {
            weights_a: unpack_f32(&skill.weights_a)?,
            weights_b: unpack_f32(&skill.weights_b)?,
            skill_id: skill.skill_id,
            skill_name: skill.skill_name,
            description: skill.description,
            base_model_compatibility: skill.base_model_compatibility,
            version: skill.version,
            rank: skill.rank,
            alpha: skill.alpha,
            additional_metadata: skill.additional_metadata,
        })
    }
}

impl SkillInvocationRequest {
    /// Build a request with a fresh invocation id.
    pub fn new(
        skill_id: impl Into<String>,
        agent_core_id: impl Into<String>,
        parameters: HashMap<String, String>,
    ) -> Self {
        Self {
            invocation_id: uuid::Uuid::now_v7().to_string(),
            skill_id: skill_id.into(),
            parameters,
            agent_core_id: agent_core_id.into(),
        }
    }
}

impl SkillInvocationResponse {
    /// Decode a protobuf-encoded response.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self::decode(bytes)?)
    }

    /// The adapter carried by a successful response, if any.
    pub fn into_adapter(self) -> Result<Option<LoraAdapter>> {
        if self.status() != InvocationStatus::Success {
            return Ok(None);
        }
        self.skill.map(LoraAdapter::try_from).transpose()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
