//! Workspaces CLI
//!
//! Compiles a workspace's desired configuration from a local input file.

use clap::Parser;

use workspaces_cli::{Cli, Result};
use workspaces_common::telemetry::{init_logging, LoggingConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LoggingConfig {
        json: cli.log_json,
        ..Default::default()
    })?;
    cli.run()
}
