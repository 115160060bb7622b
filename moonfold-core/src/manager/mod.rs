//! Fold-aware dataset manager.
//!
//! Loads the versioned sample table and nested index plan, materialises the
//! fold grid over one shared full dataset, and fans settings changes out to
//! every loader.

use std::{
    env, fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use rand::{RngCore, SeedableRng, rngs::SmallRng};
use tracing::{info, instrument};

use crate::{
    Result,
    artifacts::ArtifactStore,
    dataset::SampleDataset,
    device::Device,
    error::LoaderError,
    fold::{DataFold, FoldGrid},
    loader::{BatchLoader, IterationStrategy},
    plan::NestedFoldPlan,
    sample::SampleTable,
};

/// Environment variable naming the artifact directory.
pub const ARTIFACT_DIR_ENV: &str = "MOONFOLD_ARTIFACT_DIR";
/// Artifact directory used when [`ARTIFACT_DIR_ENV`] is unset.
pub const DEFAULT_ARTIFACT_DIR: &str = "resources";
/// Batch size used when none is configured.
pub const DEFAULT_BATCH_SIZE: usize = 64;
/// Dataset version used when none is configured.
pub const DEFAULT_VERSION: &str = "v1";

const README: &str = "This binary classification task involves categorizing\n\
points in a 2D plane that belong to two sets resembling\n\
intertwined moons. x1 are the x-coordinates and x2\n\
are the y-coordinates on the cartesian plane. label=0 indicates\n\
moon 0, and label=1 indicates moon 1.";

/// Runtime settings shared by every loader a manager owns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Batch size of every loader.
    pub batch_size: usize,
    /// Strategy of the training and design loaders.
    pub strategy: IterationStrategy,
    /// Device every view is placed on.
    pub device: Device,
    /// Whether loaders drop a short final batch.
    pub drop_last: bool,
    /// Whether device changes also move the full dataset.
    pub relocate_full_dataset: bool,
}

/// A sparse settings change; omitted keys stay as they are.
///
/// Strategy and device are carried as tokens and parsed when the change is
/// applied, so a bad token fails at its own step.
///
/// # Examples
/// ```
/// use moonfold_core::{IterationStrategy, SettingsUpdate};
///
/// let update = SettingsUpdate::new()
///     .with_batch_size(32)
///     .with_strategy(IterationStrategy::Bootstrap);
/// assert_eq!(update.batch_size(), Some(32));
/// assert_eq!(update.strategy(), Some("bootstrap"));
/// assert!(update.device().is_none());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    batch_size: Option<usize>,
    strategy: Option<String>,
    device: Option<String>,
}

impl SettingsUpdate {
    /// Creates an update that changes nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a new batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Requests a new training strategy (`none`, `shuffle` or `bootstrap`).
    #[must_use]
    pub fn with_strategy(mut self, strategy: impl fmt::Display) -> Self {
        self.strategy = Some(strategy.to_string());
        self
    }

    /// Requests a new device.
    #[must_use]
    pub fn with_device(mut self, device: impl fmt::Display) -> Self {
        self.device = Some(device.to_string());
        self
    }

    /// Requested batch size, if any.
    #[must_use]
    pub fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    /// Requested strategy token, if any.
    #[must_use]
    pub fn strategy(&self) -> Option<&str> {
        self.strategy.as_deref()
    }

    /// Requested device token, if any.
    #[must_use]
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Whether the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch_size.is_none() && self.strategy.is_none() && self.device.is_none()
    }
}

/// Operations every fold-aware manager provides.
pub trait DataManager {
    /// Materialises a fold grid for `plan` over the manager's full dataset
    /// using the current settings.
    ///
    /// # Errors
    /// Returns an error when the plan does not fit the dataset or a loader
    /// cannot be configured.
    fn build_folds(&mut self, plan: &NestedFoldPlan) -> Result<FoldGrid>;

    /// Applies `update` in the order batch size, strategy, device. A failing
    /// step leaves earlier steps applied.
    ///
    /// # Errors
    /// Returns the error of the first failing step.
    fn change_settings(&mut self, update: &SettingsUpdate) -> Result<()>;

    /// The fold grid.
    fn folds(&self) -> &FoldGrid;

    /// The current settings.
    fn settings(&self) -> &ManagerSettings;
}

/// Manager over the versioned double-moon artifacts.
///
/// # Examples
/// ```
/// use moonfold_core::{
///     DataManager, DoubleMoonConfig, DoubleMoonManager, DoubleMoonSampler, NestedFoldPlan,
///     SettingsUpdate,
/// };
/// use rand::{SeedableRng, rngs::StdRng};
///
/// let mut rng = StdRng::seed_from_u64(42);
/// let samples = DoubleMoonSampler::new(DoubleMoonConfig::default())?.sample(40, 0.5, &mut rng)?;
/// let plan = NestedFoldPlan::generate(40, 2, 2, &mut rng)?;
/// let mut manager = DoubleMoonManager::builder()
///     .with_batch_size(8)
///     .with_seed(7)
///     .build_from_parts(samples, plan)?;
/// assert_eq!(manager.name(), "DoubleMoon-v1");
/// assert_eq!(manager.folds().shape(), (2, 2));
/// manager.change_settings(&SettingsUpdate::new().with_batch_size(4))?;
/// assert_eq!(manager.settings().batch_size, 4);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct DoubleMoonManager {
    name: Arc<str>,
    version: String,
    settings: ManagerSettings,
    full_loader: BatchLoader,
    folds: FoldGrid,
    master: SmallRng,
}

impl DoubleMoonManager {
    /// Returns a builder populated with defaults.
    #[must_use]
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    /// `DoubleMoon-<version>`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Describes the task the dataset poses.
    #[must_use]
    pub fn readme(&self) -> &'static str {
        README
    }

    /// Dataset version tag.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The full dataset every fold view reads from.
    #[must_use]
    pub fn full_dataset(&self) -> &SampleDataset {
        self.full_loader.dataset()
    }

    /// Loader over the full dataset.
    #[must_use]
    pub fn full_loader(&self) -> &BatchLoader {
        &self.full_loader
    }

    /// Mutable loader over the full dataset.
    pub fn full_loader_mut(&mut self) -> &mut BatchLoader {
        &mut self.full_loader
    }

    /// The fold at `(outer, inner)`.
    #[must_use]
    pub fn fold(&self, outer: usize, inner: usize) -> Option<&DataFold> {
        self.folds.get(outer, inner)
    }

    /// The fold at `(outer, inner)`, mutably.
    pub fn fold_mut(&mut self, outer: usize, inner: usize) -> Option<&mut DataFold> {
        self.folds.get_mut(outer, inner)
    }

    /// Moves every view to `device`; shorthand for a settings update that
    /// only names the device.
    ///
    /// # Errors
    /// Returns [`crate::ManagerError::Device`] for a malformed device.
    pub fn to(&mut self, device: &Device) -> Result<()> {
        self.change_settings(&SettingsUpdate::new().with_device(device))
    }

    fn apply_batch_size(&mut self, batch_size: usize) -> Result<()> {
        if batch_size == 0 {
            return Err(LoaderError::ZeroBatchSize.into());
        }
        for fold in self.folds.iter_mut() {
            for loader in fold.loaders_mut() {
                loader.set_batch_size(batch_size)?;
            }
        }
        self.full_loader.set_batch_size(batch_size)?;
        self.settings.batch_size = batch_size;
        info!(batch_size, "batch size applied");
        Ok(())
    }

    fn apply_strategy(&mut self, token: &str) -> Result<()> {
        let strategy: IterationStrategy = token.parse()?;
        for fold in self.folds.iter_mut() {
            for loader in fold.strategy_loaders_mut() {
                loader.set_strategy(strategy);
            }
        }
        self.settings.strategy = strategy;
        info!(strategy = %strategy, "training strategy applied");
        Ok(())
    }

    fn apply_device(&mut self, token: &str) -> Result<()> {
        let device = Device::parse(token)?;
        for fold in self.folds.iter_mut() {
            for loader in fold.loaders_mut() {
                loader.relocate(&device);
            }
        }
        if self.settings.relocate_full_dataset {
            self.full_loader.relocate(&device);
        }
        info!(
            device = %device,
            full_dataset = self.settings.relocate_full_dataset,
            "device applied"
        );
        self.settings.device = device;
        Ok(())
    }
}

impl DataManager for DoubleMoonManager {
    fn build_folds(&mut self, plan: &NestedFoldPlan) -> Result<FoldGrid> {
        let full = self.full_loader.dataset();
        plan.validate(full.len())?;
        let mut rows = Vec::with_capacity(plan.cells().len());
        for (outer, row) in plan.cells().iter().enumerate() {
            let mut folds = Vec::with_capacity(row.len());
            for (inner, indices) in row.iter().enumerate() {
                folds.push(DataFold::assemble(
                    Arc::clone(&self.name),
                    (outer, inner),
                    full,
                    indices,
                    &self.settings,
                    &mut self.master,
                )?);
            }
            rows.push(folds);
        }
        Ok(FoldGrid::from_rows(rows))
    }

    #[instrument(name = "manager.change_settings", err, skip(self), fields(manager = %self.name))]
    fn change_settings(&mut self, update: &SettingsUpdate) -> Result<()> {
        if let Some(batch_size) = update.batch_size() {
            self.apply_batch_size(batch_size)?;
        }
        if let Some(token) = update.strategy() {
            self.apply_strategy(token)?;
        }
        if let Some(token) = update.device() {
            self.apply_device(token)?;
        }
        Ok(())
    }

    fn folds(&self) -> &FoldGrid {
        &self.folds
    }

    fn settings(&self) -> &ManagerSettings {
        &self.settings
    }
}

/// Configures and constructs [`DoubleMoonManager`] instances.
///
/// Strategy and device are kept as tokens until [`ManagerBuilder::build`]
/// so parse failures abort construction like any other error.
#[derive(Clone, Debug)]
pub struct ManagerBuilder {
    batch_size: usize,
    strategy: String,
    device: String,
    version: String,
    artifact_root: Option<PathBuf>,
    seed: Option<u64>,
    drop_last: bool,
    relocate_full_dataset: bool,
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            strategy: IterationStrategy::Shuffle.as_str().to_owned(),
            device: Device::cpu().to_string(),
            version: DEFAULT_VERSION.to_owned(),
            artifact_root: None,
            seed: None,
            drop_last: false,
            relocate_full_dataset: true,
        }
    }
}

impl ManagerBuilder {
    /// Creates a builder populated with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Overrides the training strategy token.
    #[must_use]
    pub fn with_strategy(mut self, strategy: impl fmt::Display) -> Self {
        self.strategy = strategy.to_string();
        self
    }

    /// Overrides the device token.
    #[must_use]
    pub fn with_device(mut self, device: impl fmt::Display) -> Self {
        self.device = device.to_string();
        self
    }

    /// Overrides the dataset version tag.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Overrides the directory artifacts are read from.
    #[must_use]
    pub fn with_artifact_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.artifact_root = Some(root.into());
        self
    }

    /// Seeds the loaders' random streams for reproducible passes.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets whether loaders drop a short final batch.
    #[must_use]
    pub fn with_drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Sets whether device changes also move the full dataset.
    #[must_use]
    pub fn with_relocate_full_dataset(mut self, relocate: bool) -> Self {
        self.relocate_full_dataset = relocate;
        self
    }

    /// Configured version tag.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Directory artifacts are read from: the explicit root, else
    /// `MOONFOLD_ARTIFACT_DIR`, else `resources`.
    #[must_use]
    pub fn artifact_root(&self) -> PathBuf {
        self.artifact_root.clone().unwrap_or_else(|| {
            env::var_os(ARTIFACT_DIR_ENV)
                .map_or_else(|| Path::new(DEFAULT_ARTIFACT_DIR).to_path_buf(), PathBuf::from)
        })
    }

    /// Loads both versioned artifacts and builds the manager.
    ///
    /// # Errors
    /// Returns [`crate::ManagerError::Artifact`] when an artifact is missing
    /// or malformed, plus every error of [`ManagerBuilder::build_from_parts`].
    pub fn build(self) -> Result<DoubleMoonManager> {
        let store = ArtifactStore::new(self.artifact_root());
        let samples = store.read_samples(&self.version)?;
        let plan = store.read_plan(&self.version)?;
        self.build_from_parts(samples, plan)
    }

    /// Builds the manager from in-memory artifacts.
    ///
    /// # Errors
    /// Returns an error for a zero batch size, an unknown strategy, a
    /// malformed device token, or a plan that does not fit `samples` (checked
    /// by [`DataManager::build_folds`]). No partially built manager is
    /// returned.
    #[instrument(
        name = "manager.build",
        err,
        skip(self, samples, plan),
        fields(version = %self.version, samples = samples.len()),
    )]
    pub fn build_from_parts(
        self,
        samples: SampleTable,
        plan: NestedFoldPlan,
    ) -> Result<DoubleMoonManager> {
        if self.batch_size == 0 {
            return Err(LoaderError::ZeroBatchSize.into());
        }
        let strategy: IterationStrategy = self.strategy.parse()?;
        let device = Device::parse(&self.device)?;

        let mut master = self
            .seed
            .map_or_else(SmallRng::from_entropy, SmallRng::seed_from_u64);
        let settings = ManagerSettings {
            batch_size: self.batch_size,
            strategy,
            device: device.clone(),
            drop_last: self.drop_last,
            relocate_full_dataset: self.relocate_full_dataset,
        };
        let full = SampleDataset::from_table(samples, device);
        let full_loader = BatchLoader::new(
            full,
            strategy,
            self.batch_size,
            self.drop_last,
            SmallRng::seed_from_u64(master.next_u64()),
        )?;

        let mut manager = DoubleMoonManager {
            name: Arc::from(format!("DoubleMoon-{}", self.version)),
            version: self.version,
            settings,
            full_loader,
            folds: FoldGrid::default(),
            master,
        };
        manager.folds = manager.build_folds(&plan)?;
        let (outer_folds, inner_folds) = manager.folds.shape();
        info!(
            manager = %manager.name,
            outer_folds,
            inner_folds,
            samples = manager.full_dataset().len(),
            "data manager ready"
        );
        Ok(manager)
    }
}

#[cfg(test)]
mod tests;
