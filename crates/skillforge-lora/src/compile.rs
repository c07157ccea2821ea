//! Compilation of training signal into adapter weights.
//!
//! Solutions are paired with the errors they address; each pair nudges the
//! leading weights of both LoRA factors in proportion to its confidence.
//! This is a bounded update rule, not gradient descent.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{LoraError, Result};
use crate::types::{ErrorRecord, LoraAdapter, SkillMetadata, SolutionRecord, TrainingPair, meta};

/// Default LoRA rank.
pub const DEFAULT_RANK: i32 = 8;

/// Default LoRA alpha.
pub const DEFAULT_ALPHA: f32 = 16.0;

/// Largest rank a compilation accepts.
pub const MAX_RANK: i32 = 1024;

/// Source of values in `[0, 1)` used to initialize and perturb weights.
///
/// Inject a seeded source to make compilation reproducible.
pub trait PerturbationSource: Send {
    fn next_unit(&mut self) -> f32;
}

/// [`PerturbationSource`] backed by [`StdRng`].
pub struct SeededPerturbation {
    rng: StdRng,
}

impl SeededPerturbation {
    /// Deterministic source for a fixed seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Source seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl PerturbationSource for SeededPerturbation {
    fn next_unit(&mut self) -> f32 {
        self.rng.gen_range(0.0f32..1.0)
    }
}

/// Fixed numeric parameters of the update rule.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    pub input_dim: usize,
    pub output_dim: usize,
    pub learning_rate: f32,
    /// Number of leading elements of each factor touched per pair.
    pub perturbed_prefix: usize,
    /// Half-width of the initial uniform weight distribution.
    pub init_scale: f32,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            input_dim: 1024,
            output_dim: 1024,
            learning_rate: 0.001,
            perturbed_prefix: 100,
            init_scale: 0.01,
        }
    }
}

/// Turns solution/error records into new adapters.
pub struct CompilationPipeline {
    options: CompileOptions,
    source: Box<dyn PerturbationSource>,
}

impl CompilationPipeline {
    /// Pipeline with default options and an entropy-seeded source.
    pub fn new() -> Self {
        Self::with_source(Box::new(SeededPerturbation::from_entropy()))
    }

    /// Pipeline with default options and a fixed seed.
    pub fn seeded(seed: u64) -> Self {
        Self::with_source(Box::new(SeededPerturbation::new(seed)))
    }

    /// Pipeline drawing from a custom perturbation source.
    pub fn with_source(source: Box<dyn PerturbationSource>) -> Self {
        Self {
            options: CompileOptions::default(),
            source,
        }
    }

    /// Replace the numeric options.
    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile a new adapter, stamped with the current time.
    pub fn compile(
        &mut self,
        solutions: &[SolutionRecord],
        errors: &[ErrorRecord],
        metadata: &SkillMetadata,
    ) -> Result<LoraAdapter> {
        self.compile_at(solutions, errors, metadata, Utc::now())
    }

    /// Compile a new adapter with an explicit timestamp.
    ///
    /// Any invalid record aborts the whole compilation before weights are
    /// touched.
    pub fn compile_at(
        &mut self,
        solutions: &[SolutionRecord],
        errors: &[ErrorRecord],
        metadata: &SkillMetadata,
        at: DateTime<Utc>,
    ) -> Result<LoraAdapter> {
        let rank = metadata.rank.unwrap_or(DEFAULT_RANK);
        let alpha = metadata.alpha.unwrap_or(DEFAULT_ALPHA);
        validate_hyperparameters(rank, alpha)?;
        factor_len(rank as usize, self.options.input_dim)?;
        factor_len(rank as usize, self.options.output_dim)?;

        let pairs = prepare_training_pairs(solutions, errors)?;
        let compilation_id = uuid::Uuid::now_v7().to_string();

        tracing::info!(
            skill = %metadata.skill_name,
            compilation_id = %compilation_id,
            pairs = pairs.len(),
            rank,
            "compiling skill adapter"
        );
        if pairs.is_empty() {
            tracing::warn!(skill = %metadata.skill_name, "no training pairs matched, adapter keeps its initial weights");
        }

        let rank_dim = rank as usize;
        let len_a = factor_len(rank_dim, self.options.input_dim)?;
        let len_b = factor_len(rank_dim, self.options.output_dim)?;
        let mut weights_a = self.initial_weights(len_a);
        let mut weights_b = self.initial_weights(len_b);
        for pair in &pairs {
            self.perturb(&mut weights_a, pair.confidence);
            self.perturb(&mut weights_b, pair.confidence);
        }

        let mut additional_metadata = HashMap::new();
        additional_metadata.insert(meta::COMPILATION_ID.to_owned(), compilation_id);
        additional_metadata.insert(meta::SOLUTION_COUNT.to_owned(), solutions.len().to_string());
        additional_metadata.insert(meta::ERROR_COUNT.to_owned(), errors.len().to_string());
        additional_metadata.insert(meta::TRAINING_PAIR_COUNT.to_owned(), pairs.len().to_string());
        additional_metadata.insert(meta::BASE_MODEL.to_owned(), metadata.base_model.clone());
        additional_metadata.insert(
            meta::COMPILED_AT.to_owned(),
            at.to_rfc3339_opts(SecondsFormat::Millis, true),
        );

        Ok(LoraAdapter {
            skill_id: format!("skill-{}-{}", slugify(&metadata.skill_name), at.timestamp_millis()),
            skill_name: metadata.skill_name.clone(),
            description: metadata.description.clone(),
            base_model_compatibility: metadata.base_model.clone(),
            version: 1,
            rank,
            alpha,
            weights_a,
            weights_b,
            additional_metadata,
        })
    }

    fn initial_weights(&mut self, len: usize) -> Vec<f32> {
        let scale = self.options.init_scale;
        (0..len)
            .map(|_| (self.source.next_unit() * 2.0 - 1.0) * scale)
            .collect()
    }

    fn perturb(&mut self, weights: &mut [f32], confidence: f32) {
        let step = self.options.learning_rate * confidence;
        let prefix = self.options.perturbed_prefix.min(weights.len());
        for w in &mut weights[..prefix] {
            *w += (self.source.next_unit() - 0.5) * step;
        }
    }
}

impl Default for CompilationPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Pair solutions with the errors they address.
///
/// Solutions whose `error_id` matches no error are dropped without further
/// checks. If several errors share an id, the first one wins. A matched
/// solution with a non-finite confidence is an error.
pub fn prepare_training_pairs(
    solutions: &[SolutionRecord],
    errors: &[ErrorRecord],
) -> Result<Vec<TrainingPair>> {
    let mut by_id: HashMap<&str, &ErrorRecord> = HashMap::with_capacity(errors.len());
    for error in errors {
        by_id.entry(error.error_id.as_str()).or_insert(error);
    }

    let mut pairs = Vec::with_capacity(solutions.len());
    for solution in solutions {
        let Some(error) = by_id.get(solution.error_id.as_str()) else {
            tracing::trace!(error_id = %solution.error_id, "solution has no matching error, dropped");
            continue;
        };
        if !solution.confidence.is_finite() {
            return Err(LoraError::InvalidTrainingData {
                error_id: solution.error_id.clone(),
                reason: format!("confidence {} is not finite", solution.confidence),
            });
        }
        pairs.push(TrainingPair {
            error_id: solution.error_id.clone(),
            input: format!("{} {}", error.description, error.context),
            output: solution.solution.clone(),
            confidence: solution.confidence,
        });
    }
    Ok(pairs)
}

/// Lowercase, with every run of non-alphanumeric characters collapsed to `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

fn validate_hyperparameters(rank: i32, alpha: f32) -> Result<()> {
    if rank <= 0 {
        return Err(LoraError::InvalidParameter {
            name: "rank",
            reason: format!("must be positive, got {rank}"),
        });
    }
    if rank > MAX_RANK {
        return Err(LoraError::InvalidParameter {
            name: "rank",
            reason: format!("must be at most {MAX_RANK}, got {rank}"),
        });
    }
    if !(alpha.is_finite() && alpha > 0.0) {
        return Err(LoraError::InvalidParameter {
            name: "alpha",
            reason: format!("must be positive, got {alpha}"),
        });
    }
    Ok(())
}

fn factor_len(rank: usize, dim: usize) -> Result<usize> {
    rank.checked_mul(dim)
        .filter(|len| *len <= u32::MAX as usize / 4)
        .ok_or_else(|| LoraError::InvalidParameter {
            name: "rank",
            reason: format!("rank {rank} x dimension {dim} is too large"),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
