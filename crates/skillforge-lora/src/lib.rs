//! LoRA skill adapters for skillforge.
//!
//! A skill is represented as a Low-Rank Adaptation delta rather than code.
//! This crate provides the pure, synchronous core that every other layer
//! builds on:
//!
//! - **[`codec`]**: the canonical binary container used whenever an
//!   adapter crosses a process or transport boundary.
//!
//! - **[`compose`]**: merge / chain / parallel composition of N adapters
//!   into one.
//!
//! - **[`compile`]**: turns solution/error records into a fresh adapter,
//!   with an injectable [`PerturbationSource`] for reproducible output.
//!
//! - **[`wire`]**: protobuf messages exchanged with the skill router.
//!
//! Nothing here performs I/O or holds shared state, so every function is
//! reentrant and safe to call from any task.
//!
//! # Example
//!
//! ```rust
//! use skillforge_lora::{
//!     CompilationPipeline, CompositionStrategy, ErrorRecord, SkillMetadata, SolutionRecord,
//!     codec, compose,
//! };
//!
//! let mut pipeline = CompilationPipeline::seeded(7);
//! let errors = [ErrorRecord {
//!     error_id: "e1".into(),
//!     description: "timeout".into(),
//!     context: "GET /health".into(),
//! }];
//! let solutions = [SolutionRecord {
//!     error_id: "e1".into(),
//!     solution: "retry with backoff".into(),
//!     confidence: 0.9,
//! }];
//!
//! let a = pipeline.compile(&solutions, &errors, &SkillMetadata::new("Retry", "base")).unwrap();
//! let b = pipeline.compile(&solutions, &errors, &SkillMetadata::new("Backoff", "base")).unwrap();
//! let merged = compose(&[&a, &b], CompositionStrategy::Merge).unwrap();
//!
//! let bytes = codec::encode(&merged).unwrap();
//! assert_eq!(codec::decode(&bytes).unwrap().rank, 8);
//! ```

pub mod codec;
pub mod compile;
pub mod compose;
pub mod error;
pub mod types;
pub mod wire;

pub use compile::{
    CompilationPipeline, CompileOptions, DEFAULT_ALPHA, DEFAULT_RANK, MAX_RANK, PerturbationSource,
    SeededPerturbation, prepare_training_pairs,
};
pub use compose::{CompositionStrategy, compose, compose_at};
pub use error::{FormatError, LoraError, Result};
pub use types::{ErrorRecord, LoraAdapter, SkillMetadata, SolutionRecord, TrainingPair, meta};
pub use wire::{InvocationStatus, LoRaAdapterSkill, SkillInvocationRequest, SkillInvocationResponse};
