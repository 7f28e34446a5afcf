use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{Config, Environment, File};
use loadgen::config::LoadConfig;

mod apply;
mod cleanup;
mod reports;
mod run;
mod verify;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// Config file (YAML); defaults to ./loadgen.yaml if present.
    #[clap(short, long, parse(from_os_str), value_name = "FILE")]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the namespace range with its workload objects.
    Apply(apply::Arg),
    /// Scale the range up and down in batches to generate load.
    Run(run::Arg),
    /// Compare cluster object counts against the expected totals.
    Verify(verify::Arg),
    /// Count rows in the Reports Server database tables.
    Reports(reports::Arg),
    /// Delete everything the tool created and check for residue.
    Cleanup(cleanup::Arg),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    config.validate()?;

    match &cli.command {
        Commands::Apply(arg) => arg.handle(&config).await?,
        Commands::Run(arg) => arg.handle(&config).await?,
        Commands::Verify(arg) => arg.handle(&config).await?,
        Commands::Reports(arg) => arg.handle(&config).await?,
        Commands::Cleanup(arg) => arg.handle(&config).await?,
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<LoadConfig> {
    let builder = match path {
        Some(path) => Config::builder().add_source(File::from(path.to_path_buf())),
        None => Config::builder().add_source(File::with_name("loadgen").required(false)),
    };
    builder
        .add_source(Environment::with_prefix("LOADGEN").separator("__"))
        .build()
        .and_then(|config| config.try_deserialize())
        .with_context(|| "Failed to load config".to_string())
}
