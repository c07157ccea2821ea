//! Adapter composition.
//!
//! Combines N adapters into one. All strategies are pure: they read their
//! inputs and allocate fresh weight vectors for the output.
//!
//! | Strategy   | rank          | alpha         | weights                              |
//! |------------|---------------|---------------|--------------------------------------|
//! | `merge`    | max           | mean          | per-index mean over covering inputs  |
//! | `chain`    | first input's | first input's | first + Σ input\[i\] / (i + 1)       |
//! | `parallel` | max           | mean          | Σ input\[k\] · alpha_k / Σ alpha     |

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LoraError, Result};
use crate::types::{LoraAdapter, meta};

/// How a set of adapters is combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionStrategy {
    /// Element-wise average.
    Merge,
    /// Sequential accumulation with diminishing influence.
    Chain,
    /// Alpha-weighted sum.
    Parallel,
}

impl CompositionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Chain => "chain",
            Self::Parallel => "parallel",
        }
    }
}

impl fmt::Display for CompositionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompositionStrategy {
    type Err = LoraError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "merge" => Ok(Self::Merge),
            "chain" => Ok(Self::Chain),
            "parallel" => Ok(Self::Parallel),
            other => Err(LoraError::UnknownStrategy(other.to_owned())),
        }
    }
}

/// Compose adapters, stamping the result with the current time.
pub fn compose(adapters: &[&LoraAdapter], strategy: CompositionStrategy) -> Result<LoraAdapter> {
    compose_at(adapters, strategy, Utc::now())
}

/// Compose adapters with an explicit composition timestamp.
///
/// A single input is returned unchanged (same id, same weights).
pub fn compose_at(
    adapters: &[&LoraAdapter],
    strategy: CompositionStrategy,
    at: DateTime<Utc>,
) -> Result<LoraAdapter> {
    match adapters {
        [] => Err(LoraError::EmptyComposition),
        [single] => Ok((*single).clone()),
        _ => {
            let (rank, alpha, weights_a, weights_b) = match strategy {
                CompositionStrategy::Merge => merge(adapters),
                CompositionStrategy::Chain => chain(adapters),
                CompositionStrategy::Parallel => parallel(adapters),
            };
            let composed = finish(adapters, strategy, at, rank, alpha, weights_a, weights_b);
            tracing::debug!(
                skill_id = %composed.skill_id,
                strategy = %strategy,
                inputs = adapters.len(),
                "adapters composed"
            );
            Ok(composed)
        }
    }
}

/// Identifier given to a composition result.
pub fn composed_id(strategy: CompositionStrategy, at: DateTime<Utc>) -> String {
    format!("composed_{}_{}", strategy, at.timestamp_millis())
}

type Parts = (i32, f32, Vec<f32>, Vec<f32>);

fn merge(adapters: &[&LoraAdapter]) -> Parts {
    (
        max_rank(adapters),
        mean_alpha(adapters),
        merge_vectors(adapters.iter().map(|a| a.weights_a.as_slice())),
        merge_vectors(adapters.iter().map(|a| a.weights_b.as_slice())),
    )
}

fn chain(adapters: &[&LoraAdapter]) -> Parts {
    let first = adapters[0];
    (
        first.rank,
        first.alpha,
        chain_vectors(adapters.iter().map(|a| a.weights_a.as_slice())),
        chain_vectors(adapters.iter().map(|a| a.weights_b.as_slice())),
    )
}

fn parallel(adapters: &[&LoraAdapter]) -> Parts {
    let shares = alpha_shares(adapters);
    (
        max_rank(adapters),
        mean_alpha(adapters),
        weighted_sum(adapters.iter().map(|a| a.weights_a.as_slice()), &shares),
        weighted_sum(adapters.iter().map(|a| a.weights_b.as_slice()), &shares),
    )
}

/// Each adapter's share of the total alpha. The shares sum to 1.
pub fn alpha_shares(adapters: &[&LoraAdapter]) -> Vec<f32> {
    let total: f32 = adapters.iter().map(|a| a.alpha).sum();
    adapters.iter().map(|a| a.alpha / total).collect()
}

fn max_rank(adapters: &[&LoraAdapter]) -> i32 {
    adapters.iter().map(|a| a.rank).max().unwrap_or(0)
}

fn mean_alpha(adapters: &[&LoraAdapter]) -> f32 {
    adapters.iter().map(|a| a.alpha).sum::<f32>() / adapters.len() as f32
}

/// Per-index mean; inputs too short for an index do not take part in it.
fn merge_vectors<'a>(vectors: impl Iterator<Item = &'a [f32]> + Clone) -> Vec<f32> {
    let max_len = vectors.clone().map(<[f32]>::len).max().unwrap_or(0);
    let mut sums = vec![0.0f32; max_len];
    let mut counts = vec![0u32; max_len];
    for v in vectors {
        for (i, x) in v.iter().enumerate() {
            sums[i] += x;
            counts[i] += 1;
        }
    }
    sums.iter()
        .zip(&counts)
        .map(|(s, &n)| if n == 0 { 0.0 } else { s / n as f32 })
        .collect()
}

fn chain_vectors<'a>(mut vectors: impl Iterator<Item = &'a [f32]>) -> Vec<f32> {
    let mut acc = vectors.next().map(<[f32]>::to_vec).unwrap_or_default();
    for (i, v) in vectors.enumerate() {
        let factor = 1.0 / (i as f32 + 2.0);
        for (a, x) in acc.iter_mut().zip(v) {
            *a += x * factor;
        }
    }
    acc
}

fn weighted_sum<'a>(vectors: impl Iterator<Item = &'a [f32]> + Clone, shares: &[f32]) -> Vec<f32> {
    let max_len = vectors.clone().map(<[f32]>::len).max().unwrap_or(0);
    let mut out = vec![0.0f32; max_len];
    for (v, share) in vectors.zip(shares) {
        for (o, x) in out.iter_mut().zip(v) {
            *o += x * share;
        }
    }
    out
}

fn finish(
    adapters: &[&LoraAdapter],
    strategy: CompositionStrategy,
    at: DateTime<Utc>,
    rank: i32,
    alpha: f32,
    weights_a: Vec<f32>,
    weights_b: Vec<f32>,
) -> LoraAdapter {
    let source_ids: Vec<&str> = adapters.iter().map(|a| a.skill_id.as_str()).collect();
    let names: Vec<&str> = adapters.iter().map(|a| a.skill_name.as_str()).collect();

    let mut additional_metadata = HashMap::new();
    additional_metadata.insert(meta::COMPOSITION_TYPE.to_owned(), strategy.to_string());
    additional_metadata.insert(meta::SOURCE_ADAPTERS.to_owned(), source_ids.join(","));
    additional_metadata.insert(
        meta::COMPOSED_AT.to_owned(),
        at.to_rfc3339_opts(SecondsFormat::Millis, true),
    );

    LoraAdapter {
        skill_id: composed_id(strategy, at),
        skill_name: names.join(" + "),
        description: format!("{} composition of {} adapters", strategy, adapters.len()),
        base_model_compatibility: adapters[0].base_model_compatibility.clone(),
        version: 1,
        rank,
        alpha,
        weights_a,
        weights_b,
        additional_metadata,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
