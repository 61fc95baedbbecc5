use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

/// Load env files before clap reads `env = ...` defaults.
pub fn bootstrap_from_args(args: &[OsString]) -> Result<()> {
    let explicit_env_file = extract_env_file_arg(args)
        .or_else(|| std::env::var_os("CARCHIVE_ENV_FILE").map(PathBuf::from));
    load_env(explicit_env_file.as_ref())
}

/// Values already present in the process environment always win over files.
pub fn load_env(explicit_env_file: Option<&PathBuf>) -> Result<()> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let mut loaded = HashMap::new();

    for env_file in resolve_env_files(&cwd, explicit_env_file) {
        if !env_file.exists() && explicit_env_file.is_none() {
            continue;
        }

        let parsed = dotenvy::from_path_iter(&env_file)
            .with_context(|| format!("failed to read env file {}", env_file.display()))?;
        for item in parsed {
            let (key, value) =
                item.with_context(|| format!("failed to parse env file {}", env_file.display()))?;
            if std::env::var_os(&key).is_some() {
                continue;
            }
            // Later files have higher precedence.
            loaded.insert(key, value);
        }
        debug!(path = %env_file.display(), "loaded env file");
    }

    let mut envs: Vec<(String, String)> = loaded.into_iter().collect();
    envs.sort_by(|a, b| a.0.cmp(&b.0));
    for (key, value) in envs {
        std::env::set_var(key, value);
    }
    Ok(())
}

fn extract_env_file_arg(args: &[OsString]) -> Option<PathBuf> {
    let mut explicit = None;
    let mut iter = args.iter().skip(1).filter_map(|arg| arg.to_str());
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }
        if arg == "--env-file" {
            explicit = iter.next().map(PathBuf::from);
        } else if let Some(value) = arg.strip_prefix("--env-file=") {
            explicit = Some(PathBuf::from(value));
        }
    }
    explicit
}

/// Env files in ascending precedence: `.env`, `.env.{mode}`, `.env.local`, `.env.{mode}.local`.
///
/// The mode comes from `CARCHIVE_MODE`, then `NODE_ENV`, defaulting to `development`.
/// `.env.local` is skipped in `test` mode.
fn resolve_env_files(cwd: &Path, explicit_env_file: Option<&PathBuf>) -> Vec<PathBuf> {
    if let Some(path) = explicit_env_file {
        return vec![cwd.join(path)];
    }

    let mode = std::env::var("CARCHIVE_MODE")
        .or_else(|_| std::env::var("NODE_ENV"))
        .unwrap_or_else(|_| "development".to_string());
    env_files_for_mode(cwd, &mode)
}

fn env_files_for_mode(cwd: &Path, mode: &str) -> Vec<PathBuf> {
    let mut files = vec![cwd.join(".env"), cwd.join(format!(".env.{mode}"))];
    if mode != "test" {
        files.push(cwd.join(".env.local"));
    }
    files.push(cwd.join(format!(".env.{mode}.local")));
    files
}
