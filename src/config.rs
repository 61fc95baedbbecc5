use anyhow::{anyhow, Result};
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::args::BaseArgs;
use crate::ingest::{IngestOptions, DEFAULT_BATCH_SIZE, DEFAULT_BUCKET};
use crate::ui::{print_command_status, CommandStatus};

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
const LOCAL_CONFIG_FILE: &str = ".carchive.json";

/// Settings read from `~/.carchive/config.json` and `./.carchive.json`.
///
/// The service key is deliberately absent: it only comes from flags or the environment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api_url: Option<String>,
    pub bucket: Option<String>,
    pub batch_size: Option<usize>,
    pub timeout_secs: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub fn global_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))?;
    Ok(home.join(".carchive").join("config.json"))
}

pub fn local_path() -> Option<PathBuf> {
    std::env::current_dir()
        .ok()
        .map(|cwd| cwd.join(LOCAL_CONFIG_FILE))
}

pub fn load_file(path: &Path) -> Config {
    let file_contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Config::default(),
        Err(e) => {
            print_command_status(
                CommandStatus::Warning,
                &format!("could not read {}: {e}", path.display()),
            );
            return Config::default();
        }
    };

    let config: Config = match serde_json::from_str(&file_contents) {
        Ok(c) => c,
        Err(e) => {
            print_command_status(
                CommandStatus::Warning,
                &format!("could not parse {}: {e}", path.display()),
            );
            return Config::default();
        }
    };

    for key in config.extra.keys() {
        print_command_status(
            CommandStatus::Warning,
            &format!("unknown config key {} in {}", key, path.display()),
        );
    }

    tracing::debug!(path = %path.display(), "loaded config");
    config
}

#[cfg(test)]
pub fn save_file(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(config)?)?;
    Ok(())
}

/// Where a resolved setting came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A command-line flag or environment variable.
    Cli,
    File(PathBuf),
    Default,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Cli => f.write_str("flag/env"),
            Source::File(path) => write!(f, "{}", path.display()),
            Source::Default => f.write_str("default"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    pub source: Source,
}

/// Config files loaded with their paths, lowest precedence first.
pub struct Layers {
    layers: Vec<(PathBuf, Config)>,
}

impl Layers {
    pub fn load() -> Self {
        let mut layers = Vec::new();
        if let Ok(path) = global_path() {
            let config = load_file(&path);
            layers.push((path, config));
        }
        if let Some(path) = local_path() {
            let config = load_file(&path);
            layers.push((path, config));
        }
        Self { layers }
    }

    #[cfg(test)]
    fn from_layers(layers: Vec<(PathBuf, Config)>) -> Self {
        Self { layers }
    }

    fn pick<T: Clone>(
        &self,
        cli: Option<T>,
        field: impl Fn(&Config) -> Option<T>,
        default: T,
    ) -> Resolved<T> {
        if let Some(value) = cli {
            return Resolved {
                value,
                source: Source::Cli,
            };
        }
        self.layers
            .iter()
            .rev()
            .find_map(|(path, config)| {
                field(config).map(|value| Resolved {
                    value,
                    source: Source::File(path.clone()),
                })
            })
            .unwrap_or(Resolved {
                value: default,
                source: Source::Default,
            })
    }
}

/// Effective non-secret settings: flag/env > local file > global file > default.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: Option<Resolved<String>>,
    pub bucket: Resolved<String>,
    pub batch_size: Resolved<usize>,
    pub timeout: Resolved<Duration>,
    pub retries: usize,
}

impl Settings {
    pub fn resolve(base: &BaseArgs, layers: &Layers, bucket: Option<String>, batch_size: Option<usize>) -> Self {
        let api_url = layers.pick(base.api_url.clone().map(Some), |c| c.api_url.clone().map(Some), None);
        let api_url = api_url.value.map(|value| Resolved {
            value,
            source: api_url.source,
        });

        let timeout = layers.pick(base.timeout, |c| c.timeout_secs, DEFAULT_TIMEOUT_SECS);

        Settings {
            api_url,
            bucket: layers.pick(bucket, |c| c.bucket.clone(), DEFAULT_BUCKET.to_string()),
            batch_size: layers.pick(batch_size, |c| c.batch_size, DEFAULT_BATCH_SIZE),
            timeout: Resolved {
                value: Duration::from_secs(timeout.value.max(1)),
                source: timeout.source,
            },
            retries: base.retries.unwrap_or(0),
        }
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            bucket: self.bucket.value.clone(),
            batch_size: self.batch_size.value,
        }
    }
}
