//! Moonfold core library.
//!
//! Generates the double-moon benchmark, partitions its indices into a nested
//! cross-validation plan, and serves every fold through device-aware batch
//! loaders.
#![cfg_attr(docsrs, feature(doc_cfg))]

mod artifacts;
mod dataset;
mod device;
mod error;
mod fold;
mod loader;
mod manager;
mod plan;
mod sample;
mod sampler;
pub mod split;
#[cfg(test)]
mod test_utils;

pub use crate::{
    artifacts::{ArtifactStore, WriteMode},
    dataset::{DeviceBuffer, SampleDataset},
    device::Device,
    error::{
        ArtifactError, ArtifactKind, DatasetError, DeviceError, LoaderError, ManagerError,
        ManagerErrorCode, PlanError, Result, SamplerError, SplitError, SplitErrorCode,
    },
    fold::{DataFold, FoldGrid, fold_name},
    loader::{Batch, BatchLoader, Epoch, IterationStrategy},
    manager::{
        ARTIFACT_DIR_ENV, DEFAULT_ARTIFACT_DIR, DEFAULT_BATCH_SIZE, DEFAULT_VERSION, DataManager,
        DoubleMoonManager, ManagerBuilder, ManagerSettings, SettingsUpdate,
    },
    plan::{FoldIndices, NestedFoldPlan},
    sample::{Label, Point, Sample, SampleTable},
    sampler::{DEFAULT_CLASS0_FRACTION, DoubleMoonConfig, DoubleMoonSampler},
    split::{IndexDomain, Split, TrainingSize},
};
