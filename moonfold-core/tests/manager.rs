//! Tests for building managers from persisted artifacts.

mod common;

use common::persist;
use moonfold_core::{
    ArtifactError, ArtifactKind, ArtifactStore, DataManager, IterationStrategy, ManagerBuilder,
    ManagerError, ManagerErrorCode, SettingsUpdate,
};
use rstest::{fixture, rstest};
use tempfile::TempDir;

#[fixture]
fn root() -> TempDir {
    TempDir::new().expect("temporary directory")
}

#[rstest]
fn manager_loads_persisted_artifacts(root: TempDir) {
    let store = ArtifactStore::new(root.path());
    persist(&store, "v3", 120, 4, 3);

    let mut manager = ManagerBuilder::new()
        .with_version("v3")
        .with_artifact_root(root.path())
        .with_batch_size(16)
        .with_seed(9)
        .build()
        .expect("artifacts are consistent");
    assert_eq!(manager.name(), "DoubleMoon-v3");
    assert_eq!(manager.full_dataset().len(), 120);
    assert_eq!(manager.folds().shape(), (4, 3));

    let fold = manager.fold_mut(3, 2).expect("fold exists");
    let loader = fold.test_loader_mut();
    assert_eq!(loader.strategy(), IterationStrategy::Sequential);
    let expected = loader.dataset().global_indices();
    let batches: Vec<_> = loader.epoch().collect();
    assert!(batches.iter().all(|batch| batch.len() <= 16));
    let seen: Vec<usize> = batches.into_iter().flat_map(|batch| batch.indices).collect();
    assert_eq!(seen, expected);
}

#[rstest]
fn settings_survive_a_reload_round(root: TempDir) {
    let store = ArtifactStore::new(root.path());
    persist(&store, "v1", 40, 2, 2);
    let mut manager = ManagerBuilder::new()
        .with_artifact_root(root.path())
        .build()
        .expect("artifacts are consistent");
    manager
        .change_settings(&SettingsUpdate::new().with_batch_size(7).with_device("cuda:1"))
        .expect("valid update");
    assert_eq!(manager.settings().batch_size, 7);
    assert_eq!(manager.settings().device.as_str(), "cuda:1");
    assert_eq!(manager.full_loader_mut().epoch().count(), 6);
}

#[rstest]
#[case::samples("v2", ArtifactKind::Samples, "doublemoon_data_v2.csv")]
#[case::plan("v1", ArtifactKind::IndexPlan, "doublemoon_indices_splits_v1.json")]
fn missing_artifacts_abort_construction(
    root: TempDir,
    #[case] version: &str,
    #[case] kind: ArtifactKind,
    #[case] file: &str,
) {
    let store = ArtifactStore::new(root.path());
    persist(&store, "v1", 20, 2, 2);
    std::fs::remove_file(store.plan_path("v1")).expect("plan removed");

    let err = ManagerBuilder::new()
        .with_version(version)
        .with_artifact_root(root.path())
        .build()
        .expect_err("artifact is missing");
    assert_eq!(err.code(), ManagerErrorCode::MissingArtifact);
    assert_eq!(err.code().as_str(), "MOONFOLD_MISSING_ARTIFACT");
    match err {
        ManagerError::Artifact(ArtifactError::Missing { kind: found, path }) => {
            assert_eq!(found, kind);
            assert_eq!(path, root.path().join(file));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[rstest]
fn plan_for_a_different_sample_count_is_corrupt(root: TempDir) {
    let store = ArtifactStore::new(root.path());
    persist(&store, "v1", 30, 3, 2);
    store
        .write_plan(
            "v1",
            &common::draw_plan(25, 3, 2, 1),
            moonfold_core::WriteMode::Overwrite,
        )
        .expect("plan replaced");
    let err = ManagerBuilder::new()
        .with_artifact_root(root.path())
        .build()
        .expect_err("plan covers only 25 samples");
    assert_eq!(err.code(), ManagerErrorCode::CorruptPlan);
}
