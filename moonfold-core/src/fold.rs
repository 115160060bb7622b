//! Materialised cells of a nested fold plan.

use std::{collections::BTreeMap, sync::Arc};

use rand::{RngCore, SeedableRng, rngs::SmallRng};

use crate::{
    Result,
    dataset::SampleDataset,
    loader::{BatchLoader, IterationStrategy},
    manager::ManagerSettings,
    plan::FoldIndices,
};

/// One `(outer, inner)` cell with its four views and their loaders.
///
/// Each loader owns its view, so the dataset accessors read through the
/// loaders and a device move touches exactly one object per view. Training
/// and design loaders follow the manager's strategy; validation and test
/// loaders always iterate in fixed order.
#[derive(Clone, Debug)]
pub struct DataFold {
    name: String,
    outer: usize,
    inner: usize,
    manager: Arc<str>,
    training: BatchLoader,
    validation: BatchLoader,
    design: BatchLoader,
    test: BatchLoader,
    extras: BTreeMap<String, String>,
}

/// Returns the display name of the fold at `(outer, inner)`.
///
/// # Examples
/// ```
/// assert_eq!(moonfold_core::fold_name(2, 0), "out2in0");
/// ```
#[must_use]
pub fn fold_name(outer: usize, inner: usize) -> String {
    format!("out{outer}in{inner}")
}

impl DataFold {
    pub(crate) fn assemble(
        manager: Arc<str>,
        (outer, inner): (usize, usize),
        full: &SampleDataset,
        indices: &FoldIndices,
        settings: &ManagerSettings,
        master: &mut SmallRng,
    ) -> Result<Self> {
        let mut design_positions =
            Vec::with_capacity(indices.training.len() + indices.validation.len());
        design_positions.extend(&indices.training);
        design_positions.extend(&indices.validation);

        let mut loader = |positions: &[usize], strategy: IterationStrategy| -> Result<BatchLoader> {
            let view = full.subset(positions)?;
            let rng = SmallRng::seed_from_u64(master.next_u64());
            Ok(BatchLoader::new(
                view,
                strategy,
                settings.batch_size,
                settings.drop_last,
                rng,
            )?)
        };
        let training = loader(&indices.training, settings.strategy)?;
        let validation = loader(&indices.validation, IterationStrategy::Sequential)?;
        let design = loader(&design_positions, settings.strategy)?;
        let test = loader(&indices.test, IterationStrategy::Sequential)?;

        Ok(Self {
            name: fold_name(outer, inner),
            outer,
            inner,
            manager,
            training,
            validation,
            design,
            test,
            extras: BTreeMap::new(),
        })
    }

    /// Display name, `out{outer}in{inner}`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Outer fold index.
    #[must_use]
    pub fn outer(&self) -> usize {
        self.outer
    }

    /// Inner fold index.
    #[must_use]
    pub fn inner(&self) -> usize {
        self.inner
    }

    /// Name of the manager that built this fold.
    #[must_use]
    pub fn manager_name(&self) -> &str {
        &self.manager
    }

    /// Inner training view.
    #[must_use]
    pub fn training_dataset(&self) -> &SampleDataset {
        self.training.dataset()
    }

    /// Inner validation view.
    #[must_use]
    pub fn validation_dataset(&self) -> &SampleDataset {
        self.validation.dataset()
    }

    /// Design view: training followed by validation.
    #[must_use]
    pub fn design_dataset(&self) -> &SampleDataset {
        self.design.dataset()
    }

    /// Outer test view.
    #[must_use]
    pub fn test_dataset(&self) -> &SampleDataset {
        self.test.dataset()
    }

    /// Loader over the training view.
    #[must_use]
    pub fn training_loader(&self) -> &BatchLoader {
        &self.training
    }

    /// Mutable loader over the training view.
    pub fn training_loader_mut(&mut self) -> &mut BatchLoader {
        &mut self.training
    }

    /// Loader over the validation view.
    #[must_use]
    pub fn validation_loader(&self) -> &BatchLoader {
        &self.validation
    }

    /// Mutable loader over the validation view.
    pub fn validation_loader_mut(&mut self) -> &mut BatchLoader {
        &mut self.validation
    }

    /// Loader over the design view.
    #[must_use]
    pub fn design_loader(&self) -> &BatchLoader {
        &self.design
    }

    /// Mutable loader over the design view.
    pub fn design_loader_mut(&mut self) -> &mut BatchLoader {
        &mut self.design
    }

    /// Loader over the test view.
    #[must_use]
    pub fn test_loader(&self) -> &BatchLoader {
        &self.test
    }

    /// Mutable loader over the test view.
    pub fn test_loader_mut(&mut self) -> &mut BatchLoader {
        &mut self.test
    }

    /// Free-form annotations attached by consumers.
    #[must_use]
    pub fn extras(&self) -> &BTreeMap<String, String> {
        &self.extras
    }

    /// Mutable access to the annotations.
    pub fn extras_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.extras
    }

    pub(crate) fn loaders_mut(&mut self) -> [&mut BatchLoader; 4] {
        [
            &mut self.training,
            &mut self.validation,
            &mut self.design,
            &mut self.test,
        ]
    }

    pub(crate) fn strategy_loaders_mut(&mut self) -> [&mut BatchLoader; 2] {
        [&mut self.training, &mut self.design]
    }
}

/// A rectangular grid of folds indexed by `(outer, inner)`.
#[derive(Clone, Debug, Default)]
pub struct FoldGrid {
    rows: Vec<Vec<DataFold>>,
}

impl FoldGrid {
    pub(crate) fn from_rows(rows: Vec<Vec<DataFold>>) -> Self {
        Self { rows }
    }

    /// Returns `(outer folds, inner folds)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.rows.first().map_or(0, Vec::len))
    }

    /// Total number of folds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    /// Whether the grid holds no folds.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the fold at `(outer, inner)`.
    #[must_use]
    pub fn get(&self, outer: usize, inner: usize) -> Option<&DataFold> {
        self.rows.get(outer)?.get(inner)
    }

    /// Returns the fold at `(outer, inner)` mutably.
    pub fn get_mut(&mut self, outer: usize, inner: usize) -> Option<&mut DataFold> {
        self.rows.get_mut(outer)?.get_mut(inner)
    }

    /// Iterates folds in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &DataFold> + '_ {
        self.rows.iter().flatten()
    }

    /// Iterates folds mutably in row-major order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DataFold> + '_ {
        self.rows.iter_mut().flatten()
    }
}
