use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::args::BaseArgs;
use crate::config::{Layers, Resolved, Settings};

#[derive(Debug, Clone, Args)]
pub struct StatusArgs {}

#[derive(Serialize)]
struct StatusOutput {
    api_url: Option<Entry>,
    service_key: &'static str,
    bucket: Entry,
    batch_size: Entry,
    timeout_secs: Entry,
    retries: usize,
}

#[derive(Serialize)]
struct Entry {
    value: String,
    source: String,
}

impl<T: ToString> From<&Resolved<T>> for Entry {
    fn from(resolved: &Resolved<T>) -> Self {
        Entry {
            value: resolved.value.to_string(),
            source: resolved.source.to_string(),
        }
    }
}

pub async fn run(base: BaseArgs, _args: StatusArgs) -> Result<()> {
    let settings = Settings::resolve(&base, &Layers::load(), None, None);
    let output = status_output(&base, &settings);

    if base.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_line("api_url", output.api_url.as_ref());
        println!("service_key: {}", output.service_key);
        print_line("bucket", Some(&output.bucket));
        print_line("batch_size", Some(&output.batch_size));
        print_line("timeout_secs", Some(&output.timeout_secs));
        println!("retries: {}", output.retries);
    }
    Ok(())
}

fn status_output(base: &BaseArgs, settings: &Settings) -> StatusOutput {
    let has_key = base
        .service_key
        .as_deref()
        .is_some_and(|key| !key.trim().is_empty());
    StatusOutput {
        api_url: settings.api_url.as_ref().map(Entry::from),
        service_key: if has_key { "(set)" } else { "(not set)" },
        bucket: Entry::from(&settings.bucket),
        batch_size: Entry::from(&settings.batch_size),
        timeout_secs: Entry {
            value: settings.timeout.value.as_secs().to_string(),
            source: settings.timeout.source.to_string(),
        },
        retries: settings.retries,
    }
}

fn print_line(name: &str, entry: Option<&Entry>) {
    match entry {
        Some(entry) => println!("{name}: {} ({})", entry.value, entry.source),
        None => println!("{name}: (not set)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Source;
    use std::time::Duration;

    #[test]
    fn secret_is_never_echoed() {
        let base = BaseArgs {
            json: true,
            api_url: Some("https://x.example".into()),
            service_key: Some("super-secret".into()),
            timeout: None,
            retries: Some(2),
            env_file: None,
        };
        let settings = Settings {
            api_url: Some(Resolved {
                value: "https://x.example".into(),
                source: Source::Cli,
            }),
            bucket: Resolved {
                value: "archives".into(),
                source: Source::Default,
            },
            batch_size: Resolved {
                value: 500,
                source: Source::Default,
            },
            timeout: Resolved {
                value: Duration::from_secs(60),
                source: Source::Default,
            },
            retries: 2,
        };

        let json = serde_json::to_string(&status_output(&base, &settings)).unwrap();
        assert!(!json.contains("super-secret"));
        assert!(json.contains(r#""service_key":"(set)""#));
        assert!(json.contains(r#""source":"flag/env""#));
    }
}
