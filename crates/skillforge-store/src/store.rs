//! Adapter store.
//!
//! The store owns every adapter known to one skillforge instance, keyed by
//! skill id. Adapters are held behind [`Arc`] and never mutated, so a
//! reader either sees an adapter absent or fully built.
//!
//! Internally the store is backed by [`DashMap`], which provides lock-free
//! concurrent reads and fine-grained write locking, so it can be shared
//! across tasks without a global `RwLock`.
//!
//! # Example
//!
//! ```rust
//! # use skillforge_store::AdapterStore;
//! # use skillforge_lora::{CompilationPipeline, CompositionStrategy, SkillMetadata};
//! let store = AdapterStore::new();
//! let mut pipeline = CompilationPipeline::seeded(1);
//!
//! let a = store.compile(&mut pipeline, &[], &[], &SkillMetadata::new("a", "base")).unwrap();
//! let b = store.compile(&mut pipeline, &[], &[], &SkillMetadata::new("b", "base")).unwrap();
//!
//! let merged = store
//!     .compose(&[a.skill_id.as_str(), b.skill_id.as_str()], CompositionStrategy::Merge)
//!     .unwrap();
//! assert!(store.contains(&merged.skill_id));
//! assert_eq!(store.len(), 3);
//! ```

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use skillforge_lora::{
    CompilationPipeline, CompositionStrategy, ErrorRecord, LoraAdapter, SkillMetadata,
    SolutionRecord, codec,
};

use crate::error::{StoreError, StoreResult};

/// File extension used for persisted adapters.
pub const ADAPTER_FILE_EXTENSION: &str = "lora";

/// Concurrent adapter registry.
///
/// The store is cheaply cloneable (`Arc`-backed) and `Send + Sync`.
#[derive(Clone, Default)]
pub struct AdapterStore {
    inner: Arc<DashMap<String, Arc<LoraAdapter>>>,
}

impl AdapterStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an adapter under its `skill_id`.
    ///
    /// An existing adapter with the same id is replaced.
    pub fn insert(&self, adapter: LoraAdapter) -> Arc<LoraAdapter> {
        let adapter = Arc::new(adapter);
        let replaced = self
            .inner
            .insert(adapter.skill_id.clone(), Arc::clone(&adapter))
            .is_some();

        tracing::info!(
            skill_id = %adapter.skill_id,
            rank = adapter.rank,
            parameters = adapter.parameter_count(),
            replaced,
            "adapter stored"
        );
        adapter
    }

    /// Retrieve an adapter by id.
    pub fn get(&self, id: &str) -> StoreResult<Arc<LoraAdapter>> {
        self.inner
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StoreError::NotFound { id: id.to_owned() })
    }

    /// Whether an adapter with this id is stored.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.contains_key(id)
    }

    /// Remove an adapter, returning it if it existed.
    pub fn remove_adapter(&self, id: &str) -> Option<Arc<LoraAdapter>> {
        let removed = self.inner.remove(id).map(|(_, adapter)| adapter);
        if removed.is_some() {
            tracing::info!(skill_id = %id, "adapter removed");
        }
        removed
    }

    /// All stored ids, sorted.
    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Snapshot of every stored adapter, sorted by id.
    pub fn list_all(&self) -> Vec<Arc<LoraAdapter>> {
        let mut all: Vec<Arc<LoraAdapter>> =
            self.inner.iter().map(|e| Arc::clone(e.value())).collect();
        all.sort_by(|a, b| a.skill_id.cmp(&b.skill_id));
        all
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Compose stored adapters and store the result.
    ///
    /// A single id returns the stored adapter itself; nothing new is
    /// stored. Any unknown id fails the whole call.
    pub fn compose(
        &self,
        ids: &[&str],
        strategy: CompositionStrategy,
    ) -> StoreResult<Arc<LoraAdapter>> {
        let sources = ids
            .iter()
            .map(|id| self.get(id))
            .collect::<StoreResult<Vec<_>>>()?;

        if let [single] = sources.as_slice() {
            return Ok(Arc::clone(single));
        }

        let refs: Vec<&LoraAdapter> = sources.iter().map(|a| &**a).collect();
        let composed = skillforge_lora::compose(&refs, strategy)?;
        Ok(self.insert_unique(composed))
    }

    /// Like [`compose`](Self::compose) with the strategy given by name.
    pub fn compose_named(&self, ids: &[&str], strategy: &str) -> StoreResult<Arc<LoraAdapter>> {
        self.compose(ids, strategy.parse()?)
    }

    /// Compile a new adapter and store it.
    ///
    /// Nothing is stored if compilation fails.
    pub fn compile(
        &self,
        pipeline: &mut CompilationPipeline,
        solutions: &[SolutionRecord],
        errors: &[ErrorRecord],
        metadata: &SkillMetadata,
    ) -> StoreResult<Arc<LoraAdapter>> {
        let adapter = pipeline.compile(solutions, errors, metadata)?;
        Ok(self.insert_unique(adapter))
    }

    /// Encode a stored adapter into the binary container.
    pub fn export(&self, id: &str) -> StoreResult<Vec<u8>> {
        let adapter = self.get(id)?;
        Ok(codec::encode(&adapter)?)
    }

    /// Decode a binary container and store the adapter.
    pub fn import(&self, bytes: &[u8]) -> StoreResult<Arc<LoraAdapter>> {
        let adapter = codec::decode(bytes)?;
        Ok(self.insert(adapter))
    }

    /// Write every adapter to `<dir>/<encoded skill_id>.lora`.
    ///
    /// Returns the number of files written.
    pub fn save_to_dir(&self, dir: &Path) -> StoreResult<usize> {
        std::fs::create_dir_all(dir)?;

        let adapters = self.list_all();
        for adapter in &adapters {
            let path = dir.join(format!(
                "{}.{ADAPTER_FILE_EXTENSION}",
                file_stem_for(&adapter.skill_id)
            ));
            std::fs::write(&path, codec::encode(adapter)?)?;
            tracing::debug!(skill_id = %adapter.skill_id, path = %path.display(), "adapter saved");
        }

        tracing::info!(count = adapters.len(), dir = %dir.display(), "adapters saved");
        Ok(adapters.len())
    }

    /// Load every `*.lora` file in `dir`.
    ///
    /// Files that fail to decode are skipped with a warning. A missing
    /// directory loads nothing. Returns the number of adapters loaded.
    pub fn load_from_dir(&self, dir: &Path) -> StoreResult<usize> {
        if !dir.exists() {
            tracing::debug!(path = %dir.display(), "adapter directory does not exist");
            return Ok(0);
        }

        let mut loaded = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(ADAPTER_FILE_EXTENSION)
            {
                continue;
            }

            match std::fs::read(&path)
                .map_err(StoreError::from)
                .and_then(|bytes| self.import(&bytes))
            {
                Ok(_) => loaded += 1,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load adapter"
                    );
                }
            }
        }

        tracing::info!(count = loaded, dir = %dir.display(), "adapters loaded");
        Ok(loaded)
    }

    /// Store an adapter, suffixing its id with `-2`, `-3`, ... if taken.
    fn insert_unique(&self, mut adapter: LoraAdapter) -> Arc<LoraAdapter> {
        let base = adapter.skill_id.clone();
        let mut n = 1;
        loop {
            match self.inner.entry(adapter.skill_id.clone()) {
                Entry::Vacant(slot) => {
                    let adapter = Arc::new(adapter);
                    slot.insert(Arc::clone(&adapter));
                    tracing::info!(
                        skill_id = %adapter.skill_id,
                        rank = adapter.rank,
                        parameters = adapter.parameter_count(),
                        "adapter stored"
                    );
                    return adapter;
                }
                Entry::Occupied(_) => {
                    n += 1;
                    adapter.skill_id = format!("{base}-{n}");
                }
            }
        }
    }
}

/// Filesystem-safe form of a skill id.
///
/// Lowercase ASCII alphanumerics and `-`, `_`, `.` are kept; every other
/// byte becomes `%XX`. Distinct ids therefore never share a file, even on
/// case-insensitive filesystems.
fn file_stem_for(id: &str) -> String {
    let mut stem = String::with_capacity(id.len());
    for b in id.bytes() {
        if b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'-' | b'_' | b'.') {
            stem.push(char::from(b));
        } else {
            stem.push_str(&format!("%{b:02X}"));
        }
    }
    stem
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use skillforge_lora::{LoraError, meta};

    use super::*;

    fn adapter(id: &str, weights: &[f32]) -> LoraAdapter {
        LoraAdapter {
            skill_id: id.into(),
            skill_name: id.into(),
            description: String::new(),
            base_model_compatibility: "base".into(),
            version: 1,
            rank: 2,
            alpha: 4.0,
            weights_a: weights.to_vec(),
            weights_b: weights.to_vec(),
            additional_metadata: HashMap::new(),
        }
    }

    #[test]
    fn insert_and_retrieve() {
        let store = AdapterStore::new();
        store.insert(adapter("a", &[1.0]));

        let got = store.get("a").expect("adapter should exist");
        assert_eq!(got.skill_id, "a");
        assert!(store.contains("a"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn insert_replaces_existing() {
        let store = AdapterStore::new();
        store.insert(adapter("a", &[1.0]));
        store.insert(adapter("a", &[2.0]));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a").unwrap().weights_a, vec![2.0]);
    }

    #[test]
    fn not_found_error() {
        let store = AdapterStore::new();
        assert!(matches!(
            store.get("nonexistent"),
            Err(StoreError::NotFound { id }) if id == "nonexistent"
        ));
    }

    #[test]
    fn remove_adapter() {
        let store = AdapterStore::new();
        store.insert(adapter("temp", &[]));
        assert!(store.remove_adapter("temp").is_some());
        assert!(store.remove_adapter("temp").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn list_ids_sorted() {
        let store = AdapterStore::new();
        for id in ["c", "a", "b"] {
            store.insert(adapter(id, &[]));
        }
        assert_eq!(store.list_ids(), vec!["a", "b", "c"]);
        let all: Vec<String> = store.list_all().iter().map(|a| a.skill_id.clone()).collect();
        assert_eq!(all, vec!["a", "b", "c"]);
    }

    #[test]
    fn compose_stores_result() {
        let store = AdapterStore::new();
        store.insert(adapter("a", &[1.0, 3.0]));
        store.insert(adapter("b", &[3.0, 5.0]));

        let merged = store.compose(&["a", "b"], CompositionStrategy::Merge).unwrap();
        assert_eq!(merged.weights_a, vec![2.0, 4.0]);
        assert_eq!(merged.metadata(meta::SOURCE_ADAPTERS), Some("a,b"));
        assert!(Arc::ptr_eq(&merged, &store.get(&merged.skill_id).unwrap()));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn compose_single_returns_stored_adapter() {
        let store = AdapterStore::new();
        let a = store.insert(adapter("a", &[1.0]));
        let out = store.compose(&["a"], CompositionStrategy::Chain).unwrap();
        assert!(Arc::ptr_eq(&a, &out));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn compose_with_unknown_id_fails_without_storing() {
        let store = AdapterStore::new();
        store.insert(adapter("a", &[1.0]));
        let err = store
            .compose(&["a", "missing"], CompositionStrategy::Merge)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id } if id == "missing"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn compose_named_rejects_unknown_strategy() {
        let store = AdapterStore::new();
        store.insert(adapter("a", &[1.0]));
        store.insert(adapter("b", &[1.0]));
        let err = store.compose_named(&["a", "b"], "average").unwrap_err();
        assert!(matches!(err, StoreError::Lora(LoraError::UnknownStrategy(_))));
    }

    #[test]
    fn colliding_composition_ids_are_suffixed() {
        let store = AdapterStore::new();
        store.insert(adapter("a", &[1.0]));
        store.insert(adapter("b", &[1.0]));

        let first = store.compose(&["a", "b"], CompositionStrategy::Merge).unwrap();
        store.insert_unique((*first).clone());
        let dup = store.get(&format!("{}-2", first.skill_id)).unwrap();
        assert_eq!(dup.weights_a, first.weights_a);
    }

    #[test]
    fn failed_compile_stores_nothing() {
        let store = AdapterStore::new();
        let mut pipeline = CompilationPipeline::seeded(3);
        let result = store.compile(
            &mut pipeline,
            &[],
            &[],
            &SkillMetadata::new("bad", "base").with_alpha(-1.0),
        );
        assert!(result.is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn export_import_round_trip() {
        let store = AdapterStore::new();
        store.insert(adapter("a", &[0.5, -0.5]));
        let bytes = store.export("a").unwrap();

        let other = AdapterStore::new();
        let imported = other.import(&bytes).unwrap();
        assert_eq!(*imported, *store.get("a").unwrap());
    }

    #[test]
    fn export_unknown_id() {
        let store = AdapterStore::new();
        assert!(matches!(store.export("x"), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn file_stems_are_escaped() {
        assert_eq!(file_stem_for("skill-a_1.2"), "skill-a_1.2");
        assert_eq!(file_stem_for("uri://x/y"), "uri%3A%2F%2Fx%2Fy");
        assert_eq!(file_stem_for("Skill"), "%53kill");
        assert_eq!(file_stem_for("50%"), "50%25");
    }

    #[test]
    fn file_stems_never_collide() {
        let ids = ["uri://x", "uri___x", "uri%3A%2F%2Fx", "URI___X", "a b", "a_b"];
        let mut stems: Vec<String> = ids.iter().map(|id| file_stem_for(id)).collect();
        stems.sort();
        stems.dedup();
        assert_eq!(stems.len(), ids.len());
    }
}
