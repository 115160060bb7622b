//! Shared helpers for the moonfold-core integration tests.

use moonfold_core::{
    ArtifactStore, DoubleMoonConfig, DoubleMoonSampler, NestedFoldPlan, SampleTable, WriteMode,
};
use rand::{SeedableRng, rngs::StdRng};

/// Draws `samples` noiseless double-moon points with an even class split.
pub fn draw_samples(samples: usize, seed: u64) -> SampleTable {
    DoubleMoonSampler::new(DoubleMoonConfig::default())
        .expect("default config is valid")
        .sample(samples, 0.5, &mut StdRng::seed_from_u64(seed))
        .expect("sampling succeeds")
}

/// Generates a nested plan over `samples` indices.
pub fn draw_plan(samples: usize, outer: usize, inner: usize, seed: u64) -> NestedFoldPlan {
    NestedFoldPlan::generate(samples, outer, inner, &mut StdRng::seed_from_u64(seed))
        .expect("valid plan shape")
}

/// Persists a freshly drawn table and plan as `version` under `store`.
pub fn persist(store: &ArtifactStore, version: &str, samples: usize, outer: usize, inner: usize) {
    store
        .write_samples(version, &draw_samples(samples, 42), WriteMode::CreateNew)
        .expect("sample table written");
    store
        .write_plan(version, &draw_plan(samples, outer, inner, 42), WriteMode::CreateNew)
        .expect("plan written");
}
