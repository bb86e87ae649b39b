//! Compile command

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use tracing::info;
use workspaces_common::yaml::parse_yaml;
use workspaces_desired_config::{
    CommandTranslator, CompileInput, CompiledResult, DesiredConfigCompiler, Manifest,
};

use crate::{Error, Result};

#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Compile input: workspace, agent policy, variables and devfile
    #[arg(long)]
    pub input: PathBuf,

    /// Processed devfile, replacing the one embedded in the input
    #[arg(long)]
    pub devfile: Option<PathBuf>,

    /// Program that renders the base manifests from a devfile
    #[arg(long)]
    pub translator: PathBuf,

    /// Argument passed to the translator program (repeatable)
    #[arg(long = "translator-arg", allow_hyphen_values = true)]
    pub translator_args: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
    pub format: OutputFormat,

    /// Only print resources applied on partial reconciliation
    #[arg(long)]
    pub partial_only: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Multi-document YAML stream
    Yaml,
    /// JSON array
    Json,
}

pub fn run(args: CompileArgs) -> Result<()> {
    let output = compile(&args)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Load the input, compile it and render the result
pub fn compile(args: &CompileArgs) -> Result<String> {
    let input = load_input(&args.input, args.devfile.as_deref())?;
    let translator =
        CommandTranslator::new(&args.translator).with_args(args.translator_args.iter().cloned());

    let compiled = DesiredConfigCompiler::new(&input, &translator).compile()?;
    info!(
        workspace = %input.workspace.name,
        resources = compiled.len(),
        "compiled workspace"
    );
    render(&compiled, args.format, args.partial_only)
}

/// Read a compile input from YAML, optionally swapping in a devfile
pub fn load_input(path: &Path, devfile: Option<&Path>) -> Result<CompileInput> {
    let text = read(path)?;
    let value = parse_yaml(&text).map_err(|e| Error::invalid_yaml(path, e.to_string()))?;
    let mut input: CompileInput = serde_json::from_value(value)?;

    if let Some(devfile) = devfile {
        input.devfile = read(devfile)?;
    }
    Ok(input)
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::read(path, e))
}

fn render(compiled: &CompiledResult, format: OutputFormat, partial_only: bool) -> Result<String> {
    let resources: Vec<&Manifest> = if partial_only {
        compiled.partial_reconciliation_resources()
    } else {
        compiled.resources().iter().collect()
    };

    match format {
        OutputFormat::Json => {
            let mut out = serde_json::to_string_pretty(&resources)?;
            out.push('\n');
            Ok(out)
        }
        OutputFormat::Yaml if !partial_only => Ok(compiled.to_yaml()?),
        OutputFormat::Yaml => {
            let mut out = String::new();
            for resource in resources {
                out.push_str("---\n");
                out.push_str(&serde_yaml::to_string(resource)?);
            }
            Ok(out)
        }
    }
}
