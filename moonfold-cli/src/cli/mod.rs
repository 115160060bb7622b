//! Command-line interface for producing the double-moon artifacts.
//!
//! `generate-data` draws and persists the sample table; `generate-splits`
//! draws and persists the nested index plan. Both refuse to replace an
//! existing artifact unless `--force` is given.

mod commands;

pub use commands::{
    Cli, CliError, Command, CommandSummary, GenerateDataCommand, GenerateSplitsCommand,
    render_summary, run_cli,
};
