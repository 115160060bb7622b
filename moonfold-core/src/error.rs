//! Error types for the moonfold core library.
//!
//! Every module reports failures through its own enum; [`ManagerError`]
//! aggregates the ones that can abort manager construction or a settings
//! change. Errors that cross a process boundary carry stable codes.

use std::{fmt, io, path::PathBuf};

use thiserror::Error;

use crate::device::Device;

macro_rules! define_error_codes {
    (
        $(#[$enum_meta:meta])*
        enum $CodeTy:ident for $ErrTy:ident {
            $(
                $(#[$variant_meta:meta])*
                $CodeVariant:ident => $pattern:pat => $code:expr
            ),+ $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        #[non_exhaustive]
        pub enum $CodeTy {
            $(
                $(#[$variant_meta])*
                $CodeVariant,
            )+
        }

        impl $CodeTy {
            /// Return the stable machine-readable representation of this error code.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$CodeVariant => $code,)+
                }
            }
        }

        impl fmt::Display for $CodeTy {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl $ErrTy {
            #[doc = concat!(
                "Retrieve the stable [`",
                stringify!($CodeTy),
                "`] for this error."
            )]
            #[must_use]
            pub const fn code(&self) -> $CodeTy {
                match self {
                    $($pattern => $CodeTy::$CodeVariant,)+
                }
            }
        }
    };
}

/// An error produced while configuring or running the double-moon sampler.
#[non_exhaustive]
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SamplerError {
    /// The requested sample count was zero.
    #[error("sample count must be greater than zero")]
    ZeroSamples,
    /// The class-0 fraction was outside the open interval (0, 1).
    #[error("class-0 fraction must lie strictly between 0 and 1 (got {value})")]
    InvalidClassFraction {
        /// The rejected fraction.
        value: f64,
    },
    /// A geometric or noise parameter was out of range or non-finite.
    #[error("invalid sampler parameter `{parameter}`")]
    InvalidParameter {
        /// Name of the rejected parameter.
        parameter: &'static str,
    },
}

/// An error produced by the index splitting routines.
///
/// Every variant is raised before the supplied random source is touched.
#[non_exhaustive]
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SplitError {
    /// A fractional training size was outside `[0, 1]` or not finite.
    #[error("training fraction must lie within [0, 1] (got {value})")]
    InvalidFraction {
        /// The rejected fraction.
        value: f64,
    },
    /// A k-fold split was requested with zero folds.
    #[error("fold count must be at least 1")]
    ZeroFolds,
    /// A repeated holdout was requested with zero repetitions.
    #[error("repetition count must be at least 1")]
    ZeroRepetitions,
    /// An explicit index domain listed the same index twice.
    #[error("index {index} appears more than once in the index domain")]
    DuplicateIndex {
        /// The repeated index.
        index: usize,
    },
}

define_error_codes! {
    /// Stable codes describing [`SplitError`] variants.
    enum SplitErrorCode for SplitError {
        /// A fractional training size was outside `[0, 1]`.
        InvalidFraction => SplitError::InvalidFraction { .. } => "SPLIT_INVALID_FRACTION",
        /// A k-fold split was requested with zero folds.
        ZeroFolds => SplitError::ZeroFolds => "SPLIT_ZERO_FOLDS",
        /// A repeated holdout was requested with zero repetitions.
        ZeroRepetitions => SplitError::ZeroRepetitions => "SPLIT_ZERO_REPETITIONS",
        /// An explicit index domain listed the same index twice.
        DuplicateIndex => SplitError::DuplicateIndex { .. } => "SPLIT_DUPLICATE_INDEX",
    }
}

/// An error raised when a nested fold plan is generated or fails validation.
#[non_exhaustive]
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PlanError {
    /// The plan has no outer or no inner folds.
    #[error("nested fold plan must contain at least one outer and one inner fold")]
    EmptyGrid,
    /// An outer fold has a different number of inner folds than the first one.
    #[error("outer fold {outer} has {actual} inner folds, expected {expected}")]
    RaggedGrid {
        /// Offending outer fold.
        outer: usize,
        /// Inner fold count of outer fold 0.
        expected: usize,
        /// Inner fold count of the offending outer fold.
        actual: usize,
    },
    /// A cell referenced an index outside `[0, total)`.
    #[error("fold out{outer}in{inner} references index {index} outside [0, {total})")]
    IndexOutOfRange {
        /// Outer fold of the offending cell.
        outer: usize,
        /// Inner fold of the offending cell.
        inner: usize,
        /// The out-of-range index.
        index: usize,
        /// Number of samples the plan was checked against.
        total: usize,
    },
    /// An index appeared in more than one of a cell's sets, or twice in one set.
    #[error("fold out{outer}in{inner} lists index {index} more than once")]
    OverlappingSets {
        /// Outer fold of the offending cell.
        outer: usize,
        /// Inner fold of the offending cell.
        inner: usize,
        /// The repeated index.
        index: usize,
    },
    /// A cell's training, validation and test sets did not cover every index.
    #[error("fold out{outer}in{inner} does not assign index {index}")]
    IncompleteCoverage {
        /// Outer fold of the offending cell.
        outer: usize,
        /// Inner fold of the offending cell.
        inner: usize,
        /// The first index not assigned to any set.
        index: usize,
    },
    /// The test set of a cell differs from the test set of inner fold 0.
    #[error("fold out{outer}in{inner} has a test set different from out{outer}in0")]
    TestSetVaries {
        /// Outer fold of the offending cell.
        outer: usize,
        /// Inner fold of the offending cell.
        inner: usize,
    },
    /// The outer test sets do not partition the index range.
    #[error("index {index} appears in {occurrences} outer test sets, expected exactly one")]
    OuterTestsNotPartition {
        /// The offending index.
        index: usize,
        /// How many outer test sets contain it.
        occurrences: usize,
    },
    /// The inner validation sets do not partition an outer design set.
    #[error(
        "index {index} appears in {occurrences} validation sets of outer fold {outer}, expected exactly one"
    )]
    InnerValidationsNotPartition {
        /// Outer fold whose design set is affected.
        outer: usize,
        /// The offending index.
        index: usize,
        /// How many inner validation sets contain it.
        occurrences: usize,
    },
    /// The underlying k-fold split rejected its arguments.
    #[error(transparent)]
    Split(#[from] SplitError),
}

/// An error raised while parsing a compute device token.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum DeviceError {
    /// The device token was empty.
    #[error("device token must not be empty")]
    Empty,
    /// The device token did not match `name` or `name:ordinal`.
    #[error("malformed device token `{token}`; expected `name` or `name:ordinal`")]
    Malformed {
        /// The rejected token.
        token: String,
    },
}

/// An error raised by dataset construction or view slicing.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum DatasetError {
    /// Point and label counts disagree.
    #[error("dataset has {points} points but {labels} labels")]
    ShapeMismatch {
        /// Number of points supplied.
        points: usize,
        /// Number of labels supplied.
        labels: usize,
    },
    /// Points and labels live on different devices.
    #[error("points are on `{points}` but labels are on `{labels}`")]
    DeviceMismatch {
        /// Device of the point buffer.
        points: Device,
        /// Device of the label buffer.
        labels: Device,
    },
    /// A view position fell outside the dataset.
    #[error("position {index} is out of bounds for a dataset of length {len}")]
    IndexOutOfBounds {
        /// The requested position.
        index: usize,
        /// Length of the dataset that was indexed.
        len: usize,
    },
}

/// An error raised while configuring a batch loader.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum LoaderError {
    /// The iteration strategy token was not recognised.
    #[error("unsupported iteration strategy `{provided}`; expected `none`, `shuffle` or `bootstrap`")]
    InvalidStrategy {
        /// The rejected token.
        provided: String,
    },
    /// A batch size of zero was requested.
    #[error("batch size must be greater than zero")]
    ZeroBatchSize,
}

/// Which reproducibility artifact an [`ArtifactError`] concerns.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArtifactKind {
    /// The raw-sample CSV table.
    Samples,
    /// The nested index plan JSON document.
    IndexPlan,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Samples => f.write_str("sample table"),
            Self::IndexPlan => f.write_str("index plan"),
        }
    }
}

/// An error raised while reading or writing versioned artifacts.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The versioned artifact does not exist.
    #[error("{kind} artifact not found at `{path}`")]
    Missing {
        /// Which artifact was expected.
        kind: ArtifactKind,
        /// Path that was looked up.
        path: PathBuf,
    },
    /// Writing would replace an existing artifact without an explicit overwrite.
    #[error("{kind} artifact already exists at `{path}`; pass an explicit overwrite to regenerate")]
    AlreadyExists {
        /// Which artifact would be replaced.
        kind: ArtifactKind,
        /// Existing artifact path.
        path: PathBuf,
    },
    /// File I/O failed.
    #[error("i/o failure on `{path}`: {source}")]
    Io {
        /// Path that triggered the failure.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// The sample table could not be encoded or decoded.
    #[error("malformed sample table `{path}`: {source}")]
    Csv {
        /// Path of the table.
        path: PathBuf,
        /// Underlying CSV error.
        #[source]
        source: csv::Error,
    },
    /// The index plan could not be encoded or decoded.
    #[error("malformed index plan `{path}`: {source}")]
    Json {
        /// Path of the document.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// A sample row's `id` did not match its position.
    #[error("row {row} of `{path}` has id {id}; ids must ascend from 0 without gaps")]
    NonSequentialId {
        /// Path of the table.
        path: PathBuf,
        /// Zero-based row position.
        row: usize,
        /// The `id` value found.
        id: usize,
    },
    /// A sample row carried a label other than 0 or 1.
    #[error("row {row} of `{path}` has label {label}; labels must be 0 or 1")]
    InvalidLabel {
        /// Path of the table.
        path: PathBuf,
        /// Zero-based row position.
        row: usize,
        /// The label value found.
        label: u8,
    },
    /// The sample table contained no rows.
    #[error("sample table `{path}` contains no rows")]
    EmptySamples {
        /// Path of the table.
        path: PathBuf,
    },
}

/// Error type produced when constructing or reconfiguring a data manager.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The full dataset or one of its views could not be built.
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    /// A batch loader rejected its configuration.
    #[error(transparent)]
    Loader(#[from] LoaderError),
    /// The nested index plan failed validation.
    #[error("nested index plan rejected: {0}")]
    Plan(#[from] PlanError),
    /// A versioned artifact could not be loaded.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    /// The requested compute device was malformed.
    #[error(transparent)]
    Device(#[from] DeviceError),
}

define_error_codes! {
    /// Stable codes describing [`ManagerError`] variants.
    enum ManagerErrorCode for ManagerError {
        /// Point and label counts disagree.
        ShapeMismatch =>
            ManagerError::Dataset(DatasetError::ShapeMismatch { .. }) => "MOONFOLD_SHAPE_MISMATCH",
        /// Points and labels live on different devices.
        DeviceMismatch =>
            ManagerError::Dataset(DatasetError::DeviceMismatch { .. }) => "MOONFOLD_DEVICE_MISMATCH",
        /// A view position fell outside the dataset.
        IndexOutOfBounds =>
            ManagerError::Dataset(DatasetError::IndexOutOfBounds { .. }) => "MOONFOLD_INDEX_OUT_OF_BOUNDS",
        /// The iteration strategy token was not recognised.
        InvalidStrategy =>
            ManagerError::Loader(LoaderError::InvalidStrategy { .. }) => "MOONFOLD_INVALID_STRATEGY",
        /// A batch size of zero was requested.
        ZeroBatchSize =>
            ManagerError::Loader(LoaderError::ZeroBatchSize) => "MOONFOLD_ZERO_BATCH_SIZE",
        /// The nested index plan failed validation.
        CorruptPlan => ManagerError::Plan(_) => "MOONFOLD_CORRUPT_PLAN",
        /// The versioned artifact does not exist.
        MissingArtifact =>
            ManagerError::Artifact(ArtifactError::Missing { .. }) => "MOONFOLD_MISSING_ARTIFACT",
        /// A versioned artifact exists but could not be used.
        InvalidArtifact => ManagerError::Artifact(_) => "MOONFOLD_INVALID_ARTIFACT",
        /// The requested compute device was malformed.
        InvalidDevice => ManagerError::Device(_) => "MOONFOLD_INVALID_DEVICE",
    }
}

impl ManagerError {
    /// Retrieve the inner [`SplitErrorCode`] when a plan failed inside a k-fold split.
    #[must_use]
    pub const fn split_code(&self) -> Option<SplitErrorCode> {
        match self {
            Self::Plan(PlanError::Split(error)) => Some(error.code()),
            _ => None,
        }
    }
}

/// Convenient alias for results returned by the manager API.
pub type Result<T> = core::result::Result<T, ManagerError>;
