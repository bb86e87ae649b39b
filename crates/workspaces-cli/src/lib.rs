//! Workspaces CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

/// Workspaces - desired configuration tooling for remote development
#[derive(Parser, Debug)]
#[command(name = "workspaces")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile the desired configuration of one workspace
    Compile(commands::compile::CompileArgs),
}

impl Cli {
    /// Run the CLI command
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Compile(args) => commands::compile::run(args),
        }
    }
}
