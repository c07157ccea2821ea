//! # skillforge-store
//!
//! The adapter store for skillforge: one explicit, cloneable registry of
//! skill adapters per instance (no process-wide global).
//!
//! - **[`AdapterStore`]**: concurrent `skill_id → adapter` map with
//!   composition and compilation that write their results back, plus
//!   binary export/import and directory persistence.
//! - **[`StoreError`]**: `thiserror` error type for every store operation.

pub mod error;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::{ADAPTER_FILE_EXTENSION, AdapterStore};
