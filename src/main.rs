use anyhow::Result;
use clap::{Parser, Subcommand};
use std::ffi::OsString;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod archive;
mod args;
mod backend;
mod config;
mod env;
mod error;
mod http;
mod ingest;
mod login;
mod schema;
mod stats;
mod status;
mod ui;
mod upload;
mod utils;

use crate::args::CLIArgs;

const CLI_VERSION: &str = env!("CARCHIVE_VERSION_STRING");

#[derive(Debug, Parser)]
#[command(name = "carchive", about = "Community archive uploader", version = CLI_VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Upload an archive export and ingest its records
    Upload(CLIArgs<upload::UploadArgs>),
    /// Show global totals across all uploaded archives
    Stats(CLIArgs<stats::StatsArgs>),
    /// Show resolved configuration and where each value came from
    Status(CLIArgs<status::StatusArgs>),
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("CARCHIVE_LOG").unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let argv: Vec<OsString> = std::env::args_os().collect();
    env::bootstrap_from_args(&argv)?;
    init_tracing();
    let cli = Cli::parse_from(argv);

    match cli.command {
        Commands::Upload(mut cmd) => {
            login::apply_env_aliases(&mut cmd.base, |name| std::env::var(name).ok());
            upload::run(cmd.base, cmd.args).await?
        }
        Commands::Stats(mut cmd) => {
            login::apply_env_aliases(&mut cmd.base, |name| std::env::var(name).ok());
            stats::run(cmd.base, cmd.args).await?
        }
        Commands::Status(mut cmd) => {
            login::apply_env_aliases(&mut cmd.base, |name| std::env::var(name).ok());
            status::run(cmd.base, cmd.args).await?
        }
    }

    Ok(())
}
