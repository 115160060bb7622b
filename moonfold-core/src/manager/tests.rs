//! Unit tests for the double-moon manager.

use std::collections::BTreeSet;

use moonfold_test_support::tracing::EventRecorder;
use rand::{SeedableRng, rngs::StdRng};
use rstest::{fixture, rstest};
use tracing_subscriber::layer::SubscriberExt;

use super::*;
use crate::{
    ManagerError, ManagerErrorCode,
    error::{DeviceError, PlanError},
    plan::FoldIndices,
    sampler::{DoubleMoonConfig, DoubleMoonSampler},
};

const SAMPLES: usize = 60;

struct Parts {
    samples: SampleTable,
    plan: NestedFoldPlan,
}

#[fixture]
fn parts() -> Parts {
    generated_parts()
}

fn generated_parts() -> Parts {
    let mut rng = StdRng::seed_from_u64(42);
    let samples = DoubleMoonSampler::new(DoubleMoonConfig::default())
        .expect("default config is valid")
        .sample(SAMPLES, 0.5, &mut rng)
        .expect("sampling succeeds");
    let plan = NestedFoldPlan::generate(SAMPLES, 3, 2, &mut rng).expect("valid shape");
    Parts { samples, plan }
}

fn build(parts: Parts, builder: ManagerBuilder) -> DoubleMoonManager {
    builder
        .with_seed(5)
        .build_from_parts(parts.samples, parts.plan)
        .expect("manager builds")
}

#[fixture]
fn manager(parts: Parts) -> DoubleMoonManager {
    build(parts, ManagerBuilder::new().with_batch_size(8))
}

#[rstest]
fn defaults_follow_documented_configuration() {
    let builder = ManagerBuilder::new();
    assert_eq!(builder.version(), "v1");
    let Parts { samples, plan } = generated_parts();
    let manager = builder.with_seed(1).build_from_parts(samples, plan).expect("builds");
    let settings = manager.settings();
    assert_eq!(settings.batch_size, 64);
    assert_eq!(settings.strategy, IterationStrategy::Shuffle);
    assert!(settings.device.is_cpu());
    assert!(!settings.drop_last);
    assert!(settings.relocate_full_dataset);
    assert_eq!(manager.name(), "DoubleMoon-v1");
    assert!(manager.readme().contains("intertwined moons"));
}

#[rstest]
fn folds_mirror_the_plan(parts: Parts) {
    let plan = parts.plan.clone();
    let manager = build(parts, ManagerBuilder::new().with_version("v7"));
    assert_eq!(manager.folds().shape(), (3, 2));
    assert_eq!(manager.folds().len(), 6);
    for ((outer, inner), cell) in plan.iter() {
        let fold = manager.fold(outer, inner).expect("fold exists");
        assert_eq!(fold.name(), format!("out{outer}in{inner}"));
        assert_eq!(fold.manager_name(), "DoubleMoon-v7");
        assert_eq!(fold.training_dataset().global_indices(), cell.training);
        assert_eq!(fold.validation_dataset().global_indices(), cell.validation);
        assert_eq!(fold.test_dataset().global_indices(), cell.test);
        let design: BTreeSet<usize> = fold.design_dataset().global_indices().into_iter().collect();
        assert_eq!(design, cell.design().into_iter().collect());
    }
}

#[rstest]
fn views_share_the_full_dataset_storage(manager: DoubleMoonManager) {
    let full = manager.full_dataset();
    assert_eq!(full.len(), SAMPLES);
    for fold in manager.folds().iter() {
        assert!(fold.training_dataset().shares_storage_with(full));
        assert!(fold.test_dataset().shares_storage_with(full));
        let view = fold.validation_dataset();
        for position in 0..view.len() {
            let global = view.global_index(position).expect("position in range");
            assert_eq!(view.get(position), full.get(global));
        }
    }
}

#[rstest]
fn only_training_and_design_loaders_follow_the_strategy(parts: Parts) {
    let manager = build(parts, ManagerBuilder::new().with_strategy(IterationStrategy::Bootstrap));
    for fold in manager.folds().iter() {
        assert_eq!(fold.training_loader().strategy(), IterationStrategy::Bootstrap);
        assert_eq!(fold.design_loader().strategy(), IterationStrategy::Bootstrap);
        assert_eq!(fold.validation_loader().strategy(), IterationStrategy::Sequential);
        assert_eq!(fold.test_loader().strategy(), IterationStrategy::Sequential);
    }
    assert_eq!(manager.full_loader().strategy(), IterationStrategy::Bootstrap);
}

#[rstest]
fn batch_size_change_reaches_every_loader(mut manager: DoubleMoonManager) {
    manager
        .change_settings(&SettingsUpdate::new().with_batch_size(5))
        .expect("positive batch size");
    assert_eq!(manager.settings().batch_size, 5);
    assert_eq!(manager.full_loader().batch_size(), 5);
    for fold in manager.folds().iter() {
        for loader in [
            fold.training_loader(),
            fold.validation_loader(),
            fold.design_loader(),
            fold.test_loader(),
        ] {
            assert_eq!(loader.batch_size(), 5);
        }
    }
}

#[rstest]
fn strategy_change_leaves_evaluation_and_full_loaders_alone(mut manager: DoubleMoonManager) {
    manager
        .change_settings(&SettingsUpdate::new().with_strategy("bootstrap"))
        .expect("known strategy");
    assert_eq!(manager.settings().strategy, IterationStrategy::Bootstrap);
    assert_eq!(manager.full_loader().strategy(), IterationStrategy::Shuffle);
    let fold = manager.fold(1, 1).expect("fold exists");
    assert_eq!(fold.training_loader().strategy(), IterationStrategy::Bootstrap);
    assert_eq!(fold.design_loader().strategy(), IterationStrategy::Bootstrap);
    assert_eq!(fold.validation_loader().strategy(), IterationStrategy::Sequential);
    assert_eq!(fold.test_loader().strategy(), IterationStrategy::Sequential);
}

#[rstest]
#[case::relocating(true, "cuda:0")]
#[case::fixed_full_dataset(false, "cpu")]
fn device_change_moves_views_and_optionally_the_full_dataset(
    parts: Parts,
    #[case] relocate: bool,
    #[case] full_device: &str,
) {
    let mut manager = build(parts, ManagerBuilder::new().with_relocate_full_dataset(relocate));
    let before: Vec<Vec<usize>> = manager
        .folds()
        .iter()
        .map(|fold| fold.test_dataset().global_indices())
        .collect();
    manager
        .change_settings(&SettingsUpdate::new().with_device("CUDA:0"))
        .expect("valid device");
    let cuda = Device::parse("cuda:0").expect("valid token");
    assert_eq!(manager.settings().device, cuda);
    assert_eq!(manager.full_dataset().device().as_str(), full_device);
    for fold in manager.folds().iter() {
        assert_eq!(fold.training_dataset().device(), &cuda);
        assert_eq!(fold.validation_dataset().device(), &cuda);
        assert_eq!(fold.design_dataset().device(), &cuda);
        assert_eq!(fold.test_dataset().device(), &cuda);
    }
    let after: Vec<Vec<usize>> = manager
        .folds()
        .iter()
        .map(|fold| fold.test_dataset().global_indices())
        .collect();
    assert_eq!(before, after);
}

#[rstest]
fn failing_step_keeps_earlier_steps_applied(mut manager: DoubleMoonManager) {
    let update = SettingsUpdate::new()
        .with_batch_size(3)
        .with_strategy("sorted")
        .with_device("cuda");
    let err = manager.change_settings(&update).expect_err("unknown strategy");
    assert_eq!(err.code(), ManagerErrorCode::InvalidStrategy);
    assert_eq!(manager.settings().batch_size, 3);
    assert_eq!(manager.settings().strategy, IterationStrategy::Shuffle);
    assert!(manager.settings().device.is_cpu());
}

#[rstest]
fn zero_batch_size_update_is_rejected_untouched(mut manager: DoubleMoonManager) {
    let err = manager
        .change_settings(&SettingsUpdate::new().with_batch_size(0))
        .expect_err("zero batch size");
    assert_eq!(err.code(), ManagerErrorCode::ZeroBatchSize);
    assert_eq!(manager.settings().batch_size, 8);
}

#[rstest]
fn malformed_device_update_reports_device_error(mut manager: DoubleMoonManager) {
    let err = manager
        .change_settings(&SettingsUpdate::new().with_device("cuda:"))
        .expect_err("malformed device");
    assert!(matches!(
        err,
        ManagerError::Device(DeviceError::Malformed { .. })
    ));
}

#[rstest]
#[case::strategy(ManagerBuilder::new().with_strategy("sorted"), ManagerErrorCode::InvalidStrategy)]
#[case::batch(ManagerBuilder::new().with_batch_size(0), ManagerErrorCode::ZeroBatchSize)]
#[case::device(ManagerBuilder::new().with_device(""), ManagerErrorCode::InvalidDevice)]
fn invalid_configuration_aborts_construction(
    parts: Parts,
    #[case] builder: ManagerBuilder,
    #[case] code: ManagerErrorCode,
) {
    let err = builder
        .build_from_parts(parts.samples, parts.plan)
        .expect_err("configuration must be rejected");
    assert_eq!(err.code(), code);
}

#[rstest]
fn plan_that_does_not_fit_the_samples_is_rejected(parts: Parts) {
    let plan = NestedFoldPlan::from_cells(vec![vec![FoldIndices {
        training: vec![0, 1],
        validation: vec![2],
        test: vec![3],
    }]]);
    let err = ManagerBuilder::new()
        .build_from_parts(parts.samples, plan)
        .expect_err("plan covers only four samples");
    assert_eq!(err.code(), ManagerErrorCode::CorruptPlan);
    assert!(matches!(
        err,
        ManagerError::Plan(PlanError::IncompleteCoverage { index: 4, .. })
    ));
}

#[rstest]
fn seeded_managers_replay_identical_passes() {
    let mut a = build(generated_parts(), ManagerBuilder::new().with_batch_size(8));
    let mut b = build(generated_parts(), ManagerBuilder::new().with_batch_size(8));
    let order = |manager: &mut DoubleMoonManager| -> Vec<usize> {
        let fold = manager.fold_mut(0, 0).expect("fold exists");
        fold.training_loader_mut().epoch().flat_map(|batch| batch.indices).collect()
    };
    assert_eq!(order(&mut a), order(&mut b));
}

#[rstest]
fn extras_hold_consumer_annotations(mut manager: DoubleMoonManager) {
    let fold = manager.fold_mut(2, 1).expect("fold exists");
    fold.extras_mut().insert("note".to_owned(), "baseline".to_owned());
    assert_eq!(
        manager
            .fold(2, 1)
            .and_then(|fold| fold.extras().get("note"))
            .map(String::as_str),
        Some("baseline")
    );
}

#[rstest]
fn settings_changes_and_construction_are_logged(parts: Parts) {
    let recorder = EventRecorder::default();
    let subscriber = tracing_subscriber::registry().with(recorder.clone());
    tracing::subscriber::with_default(subscriber, || {
        let mut manager = build(parts, ManagerBuilder::new());
        manager
            .change_settings(
                &SettingsUpdate::new()
                    .with_batch_size(16)
                    .with_device("mps"),
            )
            .expect("valid update");
    });
    let ready = recorder.with_message("data manager ready");
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].field("outer_folds"), Some("3"));
    assert_eq!(ready[0].field("inner_folds"), Some("2"));
    assert_eq!(recorder.with_message("batch size applied").len(), 1);
    let moved = recorder.with_message("device applied");
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].field("device"), Some("mps"));
    assert!(recorder.with_message("training strategy applied").is_empty());
}

#[rstest]
fn rebuilding_folds_does_not_touch_the_installed_grid(mut manager: DoubleMoonManager) {
    let plan = NestedFoldPlan::generate(SAMPLES, 2, 2, &mut StdRng::seed_from_u64(1))
        .expect("valid shape");
    let grid = manager.build_folds(&plan).expect("plan fits");
    assert_eq!(grid.shape(), (2, 2));
    assert_eq!(manager.folds().shape(), (3, 2));
}

fn assert_whole_batches(loader: &mut BatchLoader, batch_size: usize) {
    assert!(loader.drop_last());
    assert_eq!(loader.batch_size(), batch_size);
    let expected = loader.dataset().len() / batch_size;
    assert_eq!(loader.n_batches(), expected);
    let sizes: Vec<usize> = loader.epoch().map(|batch| batch.len()).collect();
    assert_eq!(sizes.len(), expected);
    assert!(sizes.iter().all(|&size| size == batch_size), "{sizes:?}");
}

fn assert_every_loader_drops_short_batches(manager: &mut DoubleMoonManager, batch_size: usize) {
    assert_whole_batches(manager.full_loader_mut(), batch_size);
    for outer in 0..3 {
        for inner in 0..2 {
            let fold = manager.fold_mut(outer, inner).expect("fold exists");
            assert_whole_batches(fold.training_loader_mut(), batch_size);
            assert_whole_batches(fold.validation_loader_mut(), batch_size);
            assert_whole_batches(fold.design_loader_mut(), batch_size);
            assert_whole_batches(fold.test_loader_mut(), batch_size);
        }
    }
}

#[rstest]
fn drop_last_trims_every_loader_before_and_after_a_batch_change(parts: Parts) {
    // 60 samples in 3 x 2 folds give views of 20, 40 and 60; none divides by 7 or 9.
    let mut manager = build(
        parts,
        ManagerBuilder::new()
            .with_batch_size(7)
            .with_drop_last(true),
    );
    assert!(manager.settings().drop_last);
    assert_every_loader_drops_short_batches(&mut manager, 7);

    manager
        .change_settings(&SettingsUpdate::new().with_batch_size(9))
        .expect("positive batch size");
    assert_every_loader_drops_short_batches(&mut manager, 9);
}

#[rstest]
fn rebuilding_folds_rejects_a_plan_for_another_sample_count(mut manager: DoubleMoonManager) {
    let plan = NestedFoldPlan::generate(SAMPLES + 1, 3, 2, &mut StdRng::seed_from_u64(1))
        .expect("valid shape");
    let err = manager.build_folds(&plan).expect_err("plan indexes one sample too many");
    assert_eq!(err.code(), ManagerErrorCode::CorruptPlan);
    assert_eq!(manager.folds().shape(), (3, 2));
}

#[rstest]
fn to_moves_views_like_a_device_only_update(mut manager: DoubleMoonManager) {
    let mps = Device::parse("mps").expect("valid token");
    manager.to(&mps).expect("valid device");
    assert_eq!(manager.settings().device, mps);
    assert_eq!(manager.settings().batch_size, 8);
    assert_eq!(manager.full_dataset().device(), &mps);
    for fold in manager.folds().iter() {
        assert_eq!(fold.training_dataset().device(), &mps);
        assert_eq!(fold.test_dataset().device(), &mps);
    }
}
