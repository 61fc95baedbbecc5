use std::path::PathBuf;

use clap::Args;

pub const API_URL_ENV: &str = "CARCHIVE_API_URL";
pub const SERVICE_KEY_ENV: &str = "CARCHIVE_SERVICE_KEY";

#[derive(Debug, Clone, Args)]
pub struct BaseArgs {
    /// Output as JSON
    #[arg(short = 'j', long, global = true)]
    pub json: bool,

    /// Backend URL (or via CARCHIVE_API_URL)
    #[arg(long, env = "CARCHIVE_API_URL", hide_env_values = true, global = true)]
    pub api_url: Option<String>,

    /// Backend service key (or via CARCHIVE_SERVICE_KEY)
    #[arg(long, env = "CARCHIVE_SERVICE_KEY", hide_env_values = true, global = true)]
    pub service_key: Option<String>,

    /// Per-request timeout in seconds (or via CARCHIVE_TIMEOUT_SECS)
    #[arg(long, env = "CARCHIVE_TIMEOUT_SECS", global = true)]
    pub timeout: Option<u64>,

    /// Retry transient backend failures this many times (or via CARCHIVE_RETRIES)
    #[arg(long, env = "CARCHIVE_RETRIES", global = true)]
    pub retries: Option<usize>,

    /// Path to a .env file to load before running commands.
    #[arg(long, env = "CARCHIVE_ENV_FILE", hide_env_values = true)]
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct CLIArgs<T: Args> {
    #[command(flatten)]
    pub base: BaseArgs,

    #[command(flatten)]
    pub args: T,
}
