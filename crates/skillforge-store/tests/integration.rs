//! Integration tests for the skillforge-store crate.
//!
//! These exercise the store as shared state: concurrent writers and
//! readers, composition chains, and persistence through the filesystem.

use std::sync::Arc;

use skillforge_lora::{
    CompilationPipeline, CompositionStrategy, ErrorRecord, SkillMetadata, SolutionRecord, meta,
};
use skillforge_store::{AdapterStore, StoreError};

fn training() -> (Vec<SolutionRecord>, Vec<ErrorRecord>) {
    (
        vec![SolutionRecord {
            error_id: "e1".into(),
            solution: "reconnect".into(),
            confidence: 0.8,
        }],
        vec![ErrorRecord {
            error_id: "e1".into(),
            description: "socket closed".into(),
            context: "websocket".into(),
        }],
    )
}

fn compile(store: &AdapterStore, name: &str, seed: u64) -> String {
    let (solutions, errors) = training();
    store
        .compile(
            &mut CompilationPipeline::seeded(seed),
            &solutions,
            &errors,
            &SkillMetadata::new(name, "hrm-base").with_rank(2),
        )
        .unwrap()
        .skill_id
        .clone()
}

// ═══════════════════════════════════════════════════════════════════════
//  Concurrency
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_readers_never_see_partial_adapters() {
    let store = AdapterStore::new();
    let (solutions, errors) = training();

    let mut handles = Vec::new();
    for i in 0..8u64 {
        let store = store.clone();
        let (solutions, errors) = (solutions.clone(), errors.clone());
        handles.push(tokio::spawn(async move {
            let mut pipeline = CompilationPipeline::seeded(i);
            store
                .compile(
                    &mut pipeline,
                    &solutions,
                    &errors,
                    &SkillMetadata::new(format!("skill {i}"), "hrm-base").with_rank(2),
                )
                .unwrap();
        }));
    }

    let reader = {
        let store = store.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                for adapter in store.list_all() {
                    assert_eq!(adapter.weights_a.len(), 2 * 1024);
                    assert_eq!(adapter.weights_b.len(), 1024 * 2);
                }
                tokio::task::yield_now().await;
            }
        })
    };

    for handle in handles {
        handle.await.unwrap();
    }
    reader.await.unwrap();
    assert_eq!(store.len(), 8);
}

// ═══════════════════════════════════════════════════════════════════════
//  Composition
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn composed_adapters_can_be_composed_again() {
    let store = AdapterStore::new();
    let a = compile(&store, "alpha", 1);
    let b = compile(&store, "beta", 2);
    let c = compile(&store, "gamma", 3);

    let ab = store
        .compose(&[a.as_str(), b.as_str()], CompositionStrategy::Merge)
        .unwrap();
    let abc = store
        .compose(&[ab.skill_id.as_str(), c.as_str()], CompositionStrategy::Parallel)
        .unwrap();

    assert_eq!(
        abc.metadata(meta::SOURCE_ADAPTERS),
        Some(format!("{},{}", ab.skill_id, c).as_str())
    );
    assert_eq!(store.len(), 5);
}

#[test]
fn repeated_composition_keeps_ids_unique() {
    let store = AdapterStore::new();
    let a = compile(&store, "alpha", 1);
    let b = compile(&store, "beta", 2);

    let ids: Vec<String> = (0..5)
        .map(|_| {
            store
                .compose(&[a.as_str(), b.as_str()], CompositionStrategy::Chain)
                .unwrap()
                .skill_id
                .clone()
        })
        .collect();

    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 5);
    assert_eq!(store.len(), 7);
}

#[test]
fn removed_adapter_cannot_be_composed() {
    let store = AdapterStore::new();
    let a = compile(&store, "alpha", 1);
    let b = compile(&store, "beta", 2);
    store.remove_adapter(&b);

    let err = store
        .compose(&[a.as_str(), b.as_str()], CompositionStrategy::Merge)
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { id } if id == b));
}

// ═══════════════════════════════════════════════════════════════════════
//  Persistence
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn save_and_load_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let store = AdapterStore::new();
    let a = compile(&store, "alpha", 1);
    let b = compile(&store, "beta", 2);
    store
        .compose(&[a.as_str(), b.as_str()], CompositionStrategy::Merge)
        .unwrap();

    assert_eq!(store.save_to_dir(tmp.path()).unwrap(), 3);

    // A stray file and a corrupt container are skipped.
    std::fs::write(tmp.path().join("notes.txt"), "ignore me").unwrap();
    std::fs::write(tmp.path().join("broken.lora"), b"not a container").unwrap();

    let restored = AdapterStore::new();
    assert_eq!(restored.load_from_dir(tmp.path()).unwrap(), 3);
    assert_eq!(restored.list_ids(), store.list_ids());
    for id in store.list_ids() {
        let original = store.get(&id).unwrap();
        let loaded = restored.get(&id).unwrap();
        assert_eq!(*original, *loaded);
        assert!(!Arc::ptr_eq(&original, &loaded));
    }
}

#[test]
fn ids_that_look_alike_keep_separate_files() {
    let tmp = tempfile::tempdir().unwrap();
    let store = AdapterStore::new();
    let a = compile(&store, "alpha", 1);
    for id in ["uri://x", "uri___x", "URI___X"] {
        let mut adapter = (*store.get(&a).unwrap()).clone();
        adapter.skill_id = id.into();
        store.insert(adapter);
    }
    store.remove_adapter(&a);

    assert_eq!(store.save_to_dir(tmp.path()).unwrap(), 3);
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 3);

    let restored = AdapterStore::new();
    assert_eq!(restored.load_from_dir(tmp.path()).unwrap(), 3);
    assert_eq!(restored.list_ids(), vec!["URI___X", "uri://x", "uri___x"]);
}

#[test]
fn load_missing_directory_is_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let store = AdapterStore::new();
    assert_eq!(store.load_from_dir(&tmp.path().join("absent")).unwrap(), 0);
    assert!(store.is_empty());
}
