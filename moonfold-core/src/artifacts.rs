//! Versioned reproducibility artifacts on disk.
//!
//! Two files exist per dataset version under one root directory: the sample
//! table `doublemoon_data_<version>.csv` and the nested index plan
//! `doublemoon_indices_splits_<version>.json`. Writers refuse to replace an
//! existing file unless asked to overwrite.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::{
    error::{ArtifactError, ArtifactKind},
    plan::NestedFoldPlan,
    sample::{Label, Point, Sample, SampleTable},
};

/// Whether a write may replace an existing artifact.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum WriteMode {
    /// Fail with [`ArtifactError::AlreadyExists`] if the file exists.
    #[default]
    CreateNew,
    /// Replace the file, logging a warning when one existed.
    Overwrite,
}

#[derive(Debug, Serialize, Deserialize)]
struct SampleRow {
    id: usize,
    x1: f64,
    x2: f64,
    label: u8,
}

/// Reads and writes versioned artifacts under a root directory.
///
/// # Examples
/// ```
/// use moonfold_core::ArtifactStore;
///
/// let store = ArtifactStore::new("resources");
/// assert!(store.samples_path("v1").ends_with("doublemoon_data_v1.csv"));
/// assert!(store.plan_path("v1").ends_with("doublemoon_indices_splits_v1.json"));
/// ```
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the sample table for `version`.
    #[must_use]
    pub fn samples_path(&self, version: &str) -> PathBuf {
        self.root.join(format!("doublemoon_data_{version}.csv"))
    }

    /// Location of the index plan for `version`.
    #[must_use]
    pub fn plan_path(&self, version: &str) -> PathBuf {
        self.root
            .join(format!("doublemoon_indices_splits_{version}.json"))
    }

    /// Reads the sample table for `version`.
    ///
    /// # Errors
    /// Returns [`ArtifactError::Missing`] when the file does not exist,
    /// [`ArtifactError::Csv`] for undecodable rows,
    /// [`ArtifactError::NonSequentialId`] when an `id` differs from its row
    /// position, [`ArtifactError::InvalidLabel`] for labels other than 0 or 1,
    /// and [`ArtifactError::EmptySamples`] for a table without rows.
    #[instrument(name = "artifacts.read_samples", err, skip(self), fields(root = %self.root.display()))]
    pub fn read_samples(&self, version: &str) -> Result<SampleTable, ArtifactError> {
        let path = self.samples_path(version);
        let file = open_existing(&path, ArtifactKind::Samples)?;
        let mut reader = csv::Reader::from_reader(BufReader::new(file));

        let mut table = SampleTable::default();
        for (row, record) in reader.deserialize::<SampleRow>().enumerate() {
            let record = record.map_err(|source| ArtifactError::Csv {
                path: path.clone(),
                source,
            })?;
            if record.id != row {
                return Err(ArtifactError::NonSequentialId {
                    path,
                    row,
                    id: record.id,
                });
            }
            let label = Label::try_from(record.label).map_err(|label| {
                ArtifactError::InvalidLabel {
                    path: path.clone(),
                    row,
                    label,
                }
            })?;
            table.push(Sample {
                point: Point::new(record.x1, record.x2),
                label,
            });
        }
        if table.is_empty() {
            return Err(ArtifactError::EmptySamples { path });
        }
        Ok(table)
    }

    /// Writes `table` as the sample table for `version`.
    ///
    /// # Errors
    /// Returns [`ArtifactError::AlreadyExists`] in [`WriteMode::CreateNew`]
    /// when the file exists, and [`ArtifactError::Io`] or
    /// [`ArtifactError::Csv`] when writing fails.
    #[instrument(
        name = "artifacts.write_samples",
        err,
        skip(self, table),
        fields(root = %self.root.display(), rows = table.len()),
    )]
    pub fn write_samples(
        &self,
        version: &str,
        table: &SampleTable,
        mode: WriteMode,
    ) -> Result<PathBuf, ArtifactError> {
        let path = self.samples_path(version);
        let file = self.create(&path, ArtifactKind::Samples, mode)?;
        let mut writer = csv::Writer::from_writer(BufWriter::new(file));
        for (id, sample) in table.iter().enumerate() {
            writer
                .serialize(SampleRow {
                    id,
                    x1: sample.point.x1,
                    x2: sample.point.x2,
                    label: sample.label.as_u8(),
                })
                .map_err(|source| ArtifactError::Csv {
                    path: path.clone(),
                    source,
                })?;
        }
        writer.flush().map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Reads the index plan for `version`. The plan is not validated.
    ///
    /// # Errors
    /// Returns [`ArtifactError::Missing`] when the file does not exist and
    /// [`ArtifactError::Json`] when it is not a plan document.
    #[instrument(name = "artifacts.read_plan", err, skip(self), fields(root = %self.root.display()))]
    pub fn read_plan(&self, version: &str) -> Result<NestedFoldPlan, ArtifactError> {
        let path = self.plan_path(version);
        let file = open_existing(&path, ArtifactKind::IndexPlan)?;
        NestedFoldPlan::from_json_reader(BufReader::new(file))
            .map_err(|source| ArtifactError::Json { path, source })
    }

    /// Writes `plan` as the index plan for `version`.
    ///
    /// # Errors
    /// Returns [`ArtifactError::AlreadyExists`] in [`WriteMode::CreateNew`]
    /// when the file exists, and [`ArtifactError::Io`] or
    /// [`ArtifactError::Json`] when writing fails.
    #[instrument(
        name = "artifacts.write_plan",
        err,
        skip(self, plan),
        fields(root = %self.root.display()),
    )]
    pub fn write_plan(
        &self,
        version: &str,
        plan: &NestedFoldPlan,
        mode: WriteMode,
    ) -> Result<PathBuf, ArtifactError> {
        let path = self.plan_path(version);
        let file = self.create(&path, ArtifactKind::IndexPlan, mode)?;
        let mut writer = BufWriter::new(file);
        plan.to_json_writer(&mut writer)
            .map_err(|source| ArtifactError::Json {
                path: path.clone(),
                source,
            })?;
        writer.flush().map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    fn create(&self, path: &Path, kind: ArtifactKind, mode: WriteMode) -> Result<File, ArtifactError> {
        fs::create_dir_all(&self.root).map_err(|source| ArtifactError::Io {
            path: self.root.clone(),
            source,
        })?;
        let mut options = OpenOptions::new();
        options.write(true);
        match mode {
            WriteMode::CreateNew => {
                options.create_new(true);
            }
            WriteMode::Overwrite => {
                if path.exists() {
                    warn!(kind = %kind, path = %path.display(), "overwriting existing artifact");
                }
                options.create(true).truncate(true);
            }
        }
        options.open(path).map_err(|source| {
            if source.kind() == io::ErrorKind::AlreadyExists {
                ArtifactError::AlreadyExists {
                    kind,
                    path: path.to_path_buf(),
                }
            } else {
                ArtifactError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })
    }
}

fn open_existing(path: &Path, kind: ArtifactKind) -> Result<File, ArtifactError> {
    File::open(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ArtifactError::Missing {
                kind,
                path: path.to_path_buf(),
            }
        } else {
            ArtifactError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}
