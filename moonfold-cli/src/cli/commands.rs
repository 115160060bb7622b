use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use moonfold_core::{
    ArtifactError, ArtifactStore, DEFAULT_ARTIFACT_DIR, DEFAULT_CLASS0_FRACTION, DEFAULT_VERSION,
    DoubleMoonConfig, DoubleMoonSampler, ManagerErrorCode, NestedFoldPlan, PlanError,
    SamplerError, WriteMode,
};
use rand::{SeedableRng, rngs::StdRng};
use thiserror::Error;
use tracing::{Span, field, info, instrument};

const DEFAULT_SAMPLES: usize = 1000;
const DEFAULT_FOLDS: usize = 5;
const DEFAULT_SEED: u64 = 42;

/// Top-level CLI options parsed by [`clap`].
#[derive(Debug, Parser, Clone)]
#[command(name = "moonfold", about = "Generate double-moon benchmark artifacts.")]
pub struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported CLI commands.
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Draw a sample table and persist it as CSV.
    GenerateData(GenerateDataCommand),
    /// Draw a nested index plan and persist it as JSON.
    GenerateSplits(GenerateSplitsCommand),
}

/// Options accepted by the `generate-data` command.
#[derive(Debug, Args, Clone)]
pub struct GenerateDataCommand {
    /// Number of samples to draw.
    #[arg(long, default_value_t = DEFAULT_SAMPLES)]
    pub samples: usize,

    /// Standard deviation of the Gaussian noise on each coordinate.
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    /// Seed for the sampling generator.
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Share of samples drawn for class 0.
    #[arg(long = "class0-fraction", default_value_t = DEFAULT_CLASS0_FRACTION)]
    pub class0_fraction: f64,

    /// Radial width of each moon.
    #[arg(long, default_value_t = 0.4)]
    pub width: f64,

    /// Artifact version tag.
    #[arg(long, default_value = DEFAULT_VERSION)]
    pub version: String,

    /// Directory the artifact is written to.
    #[arg(long = "out-dir", default_value = DEFAULT_ARTIFACT_DIR)]
    pub out_dir: PathBuf,

    /// Replace an existing artifact.
    #[arg(long)]
    pub force: bool,
}

/// Options accepted by the `generate-splits` command.
#[derive(Debug, Args, Clone)]
pub struct GenerateSplitsCommand {
    /// Number of samples to partition; read from the sample table when omitted.
    #[arg(long)]
    pub samples: Option<usize>,

    /// Number of outer folds.
    #[arg(long = "outer-folds", default_value_t = DEFAULT_FOLDS)]
    pub outer_folds: usize,

    /// Number of inner folds.
    #[arg(long = "inner-folds", default_value_t = DEFAULT_FOLDS)]
    pub inner_folds: usize,

    /// Seed for the permutation generator.
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Artifact version tag.
    #[arg(long, default_value = DEFAULT_VERSION)]
    pub version: String,

    /// Directory the artifact is written to.
    #[arg(long = "out-dir", default_value = DEFAULT_ARTIFACT_DIR)]
    pub out_dir: PathBuf,

    /// Replace an existing artifact.
    #[arg(long)]
    pub force: bool,
}

/// Errors surfaced while executing CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Sampling parameters were rejected.
    #[error(transparent)]
    Sampler(#[from] SamplerError),
    /// The index plan could not be generated.
    #[error(transparent)]
    Plan(#[from] PlanError),
    /// Reading or writing an artifact failed.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl CliError {
    /// Stable machine-readable code for the failure, when one exists.
    #[must_use]
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Plan(PlanError::Split(split)) => Some(split.code().as_str()),
            Self::Artifact(ArtifactError::Missing { .. }) => {
                Some(ManagerErrorCode::MissingArtifact.as_str())
            }
            Self::Artifact(_) => Some(ManagerErrorCode::InvalidArtifact.as_str()),
            _ => None,
        }
    }
}

/// Summarises the artifact a command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSummary {
    /// A sample table was written.
    Data {
        /// Location of the table.
        path: PathBuf,
        /// Rows of class 0.
        class0: usize,
        /// Rows of class 1.
        class1: usize,
    },
    /// An index plan was written.
    Splits {
        /// Location of the plan.
        path: PathBuf,
        /// Number of partitioned samples.
        samples: usize,
        /// Number of outer folds.
        outer_folds: usize,
        /// Number of inner folds.
        inner_folds: usize,
    },
}

/// Executes the CLI command represented by `cli`.
///
/// # Errors
/// Returns [`CliError`] when generation or persistence fails.
///
/// # Examples
/// ```
/// # use std::error::Error;
/// # use moonfold_cli::cli::{Cli, CommandSummary, run_cli};
/// # use clap::Parser;
/// # use tempfile::TempDir;
/// #
/// # fn main() -> Result<(), Box<dyn Error>> {
/// let dir = TempDir::new()?;
/// let out = dir.path().to_str().ok_or("non-UTF-8 temp path")?;
/// let cli = Cli::try_parse_from(["moonfold", "generate-data", "--samples", "10", "--out-dir", out])?;
/// let summary = run_cli(cli)?;
/// assert!(matches!(summary, CommandSummary::Data { class0: 5, class1: 5, .. }));
/// # Ok(())
/// # }
/// ```
#[instrument(name = "cli.run", err, skip(cli), fields(command = field::Empty))]
pub fn run_cli(cli: Cli) -> Result<CommandSummary, CliError> {
    let span = Span::current();
    match cli.command {
        Command::GenerateData(command) => {
            span.record("command", field::display("generate-data"));
            generate_data(command)
        }
        Command::GenerateSplits(command) => {
            span.record("command", field::display("generate-splits"));
            generate_splits(command)
        }
    }
}

fn write_mode(force: bool) -> WriteMode {
    if force {
        WriteMode::Overwrite
    } else {
        WriteMode::CreateNew
    }
}

#[instrument(
    name = "cli.generate_data",
    err,
    skip(command),
    fields(samples = command.samples, seed = command.seed, version = %command.version),
)]
pub(super) fn generate_data(command: GenerateDataCommand) -> Result<CommandSummary, CliError> {
    let sampler = DoubleMoonSampler::new(DoubleMoonConfig {
        width: command.width,
        noise: command.noise,
        ..DoubleMoonConfig::default()
    })?;
    let mut rng = StdRng::seed_from_u64(command.seed);
    let table = sampler.sample(command.samples, command.class0_fraction, &mut rng)?;

    let store = ArtifactStore::new(command.out_dir);
    let path = store.write_samples(&command.version, &table, write_mode(command.force))?;
    let (class0, class1) = table.class_counts();
    info!(path = %path.display(), class0, class1, "sample table written");
    Ok(CommandSummary::Data {
        path,
        class0,
        class1,
    })
}

#[instrument(
    name = "cli.generate_splits",
    err,
    skip(command),
    fields(
        outer_folds = command.outer_folds,
        inner_folds = command.inner_folds,
        seed = command.seed,
        samples = field::Empty,
    ),
)]
pub(super) fn generate_splits(command: GenerateSplitsCommand) -> Result<CommandSummary, CliError> {
    let store = ArtifactStore::new(command.out_dir);
    let samples = match command.samples {
        Some(samples) => samples,
        None => store.read_samples(&command.version)?.len(),
    };
    Span::current().record("samples", samples);

    let mut rng = StdRng::seed_from_u64(command.seed);
    let plan = NestedFoldPlan::generate(samples, command.outer_folds, command.inner_folds, &mut rng)?;
    let path = store.write_plan(&command.version, &plan, write_mode(command.force))?;
    info!(path = %path.display(), samples, "index plan written");
    Ok(CommandSummary::Splits {
        path,
        samples,
        outer_folds: command.outer_folds,
        inner_folds: command.inner_folds,
    })
}

/// Renders `summary` to `writer` in a human-readable text format.
///
/// # Errors
/// Returns [`io::Error`] if writing to the supplied writer fails.
///
/// # Examples
/// ```
/// # use std::io::Cursor;
/// # use moonfold_cli::cli::{CommandSummary, render_summary};
/// let summary = CommandSummary::Data {
///     path: "resources/doublemoon_data_v1.csv".into(),
///     class0: 500,
///     class1: 500,
/// };
/// let mut buffer = Cursor::new(Vec::new());
/// render_summary(&summary, &mut buffer)?;
/// let text = String::from_utf8(buffer.into_inner()).expect("utf-8 output");
/// assert!(text.contains("class 0: 500"));
/// # Ok::<(), std::io::Error>(())
/// ```
pub fn render_summary(summary: &CommandSummary, mut writer: impl Write) -> io::Result<()> {
    match summary {
        CommandSummary::Data {
            path,
            class0,
            class1,
        } => {
            writeln!(writer, "sample table: {}", path.display())?;
            writeln!(writer, "samples: {}", class0 + class1)?;
            writeln!(writer, "class 0: {class0}")?;
            writeln!(writer, "class 1: {class1}")?;
        }
        CommandSummary::Splits {
            path,
            samples,
            outer_folds,
            inner_folds,
        } => {
            writeln!(writer, "index plan: {}", path.display())?;
            writeln!(writer, "samples: {samples}")?;
            writeln!(writer, "folds: {outer_folds} outer x {inner_folds} inner")?;
        }
    }
    Ok(())
}
