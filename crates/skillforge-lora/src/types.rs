//! Adapter type definitions.
//!
//! A skill is not code: it is a pair of low-rank weight factors plus the
//! scalar LoRA hyperparameters needed to apply them to a host model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata keys written by the compilation and composition paths.
pub mod meta {
    pub const COMPILATION_ID: &str = "compilationId";
    pub const SOLUTION_COUNT: &str = "solutionCount";
    pub const ERROR_COUNT: &str = "errorCount";
    pub const TRAINING_PAIR_COUNT: &str = "trainingPairCount";
    pub const BASE_MODEL: &str = "baseModel";
    pub const COMPILED_AT: &str = "compiledAt";
    pub const COMPOSITION_TYPE: &str = "compositionType";
    pub const SOURCE_ADAPTERS: &str = "sourceAdapters";
    pub const COMPOSED_AT: &str = "composedAt";
}

/// A LoRA adapter representing one skill.
///
/// Adapters are immutable once built: every transformation (composition,
/// recompilation) yields a new value with freshly allocated weight vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoraAdapter {
    /// Globally unique, stable identifier.
    pub skill_id: String,

    /// Human-readable skill name.
    pub skill_name: String,

    /// What the skill does.
    pub description: String,

    /// Identifier of the base model these weights were trained against.
    pub base_model_compatibility: String,

    pub version: u32,

    /// LoRA rank. Always positive.
    pub rank: i32,

    /// LoRA scaling factor. Always positive.
    pub alpha: f32,

    /// First low-rank factor, flattened.
    pub weights_a: Vec<f32>,

    /// Second low-rank factor, flattened.
    pub weights_b: Vec<f32>,

    /// Free-form provenance (compilation id, lineage, timestamps).
    #[serde(default)]
    pub additional_metadata: HashMap<String, String>,
}

impl LoraAdapter {
    /// Look up a metadata value.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.additional_metadata.get(key).map(String::as_str)
    }

    /// Total number of weights across both factors.
    pub fn parameter_count(&self) -> usize {
        self.weights_a.len() + self.weights_b.len()
    }
}

/// One remedy proposed for a recorded error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionRecord {
    pub error_id: String,
    pub solution: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
}

/// One recorded error the skill is meant to address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub error_id: String,
    pub description: String,
    pub context: String,
}

/// Naming and hyperparameters for a skill being compiled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillMetadata {
    pub skill_name: String,
    #[serde(default)]
    pub description: String,
    pub base_model: String,
    /// Defaults to [`crate::compile::DEFAULT_RANK`].
    #[serde(default)]
    pub rank: Option<i32>,
    /// Defaults to [`crate::compile::DEFAULT_ALPHA`].
    #[serde(default)]
    pub alpha: Option<f32>,
}

impl SkillMetadata {
    /// Metadata with default rank and alpha.
    pub fn new(skill_name: impl Into<String>, base_model: impl Into<String>) -> Self {
        Self {
            skill_name: skill_name.into(),
            description: String::new(),
            base_model: base_model.into(),
            rank: None,
            alpha: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Override the rank.
    pub fn with_rank(mut self, rank: i32) -> Self {
        self.rank = Some(rank);
        self
    }

    /// Override alpha.
    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = Some(alpha);
        self
    }
}

/// An `(input, output)` example derived from a matched solution/error pair.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingPair {
    pub error_id: String,
    /// `description + " " + context` of the error.
    pub input: String,
    /// The solution text.
    pub output: String,
    pub confidence: f32,
}
