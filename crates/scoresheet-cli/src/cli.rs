use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "scoresheet",
    about = "Encrypted FSGT volleyball match scoresheets",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Optional subcommand; defaults to listing scoresheets when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    #[command(flatten)]
    Sheet(SheetCommand),
    /// Print version and exit.
    Version,
    /// Round-trip a probe value through the encrypted store.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SheetCommand {
    /// List saved scoresheets, most recent first.
    List,
    /// Create a blank scoresheet.
    New,
    /// Print a scoresheet's match data.
    Show { id: String },
    /// Save match data from a JSON file (any earlier layout is upgraded).
    Import {
        file: PathBuf,
        /// Update this scoresheet instead of creating a new one.
        #[arg(long)]
        id: Option<String>,
    },
    /// Print the full stored record of a scoresheet as JSON.
    Export { id: String },
    /// Delete a scoresheet.
    Delete { id: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
