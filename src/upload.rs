use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use dialoguer::Confirm;
use tracing::{debug, warn};

use crate::archive::{read_archive, Archive};
use crate::args::BaseArgs;
use crate::backend::{Backend, MemoryBackend};
use crate::config::{Layers, Settings};
use crate::http::ApiClient;
use crate::ingest::{ArchiveProcessor, ChannelSink, IngestReport};
use crate::login::login;
use crate::ui::{print_command_status, renderer, CommandStatus, ProgressMode};
use crate::utils::pluralize;

#[derive(Debug, Clone, Args)]
pub struct UploadArgs {
    /// Path to the archive JSON file
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,

    /// How to render progress
    #[arg(long, value_enum, default_value_t = ProgressMode::Auto)]
    progress: ProgressMode,

    /// Storage bucket for the raw archive
    #[arg(long)]
    bucket: Option<String>,

    /// Rows per upsert request
    #[arg(long)]
    batch_size: Option<usize>,

    /// Run against an in-memory backend; no credentials or network needed
    #[arg(long)]
    dry_run: bool,

    /// Ask for confirmation before uploading
    #[arg(long)]
    confirm: bool,
}

pub async fn run(base: BaseArgs, args: UploadArgs) -> Result<()> {
    let Some(path) = args.path.as_deref() else {
        bail!("archive path required. Use: carchive upload <path-to-archive.json>");
    };

    // Read before touching the backend so a bad file never causes network calls.
    let archive = read_archive(path)?;

    if args.confirm && !confirm_upload(&archive)? {
        print_command_status(CommandStatus::Warning, "Upload cancelled");
        return Ok(());
    }

    let settings = Settings::resolve(&base, &Layers::load(), args.bucket, args.batch_size);
    let backend: Box<dyn Backend> = if args.dry_run {
        Box::new(MemoryBackend::new())
    } else {
        let ctx = login(&base, &settings)?;
        Box::new(ApiClient::new(&ctx, settings.timeout.value, settings.retries)?)
    };

    let report = ingest(backend.as_ref(), &archive, &settings, args.progress, base.json).await?;

    if base.json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        let verb = if args.dry_run { "Validated" } else { "Uploaded" };
        print_command_status(
            CommandStatus::Success,
            &format!(
                "{verb} archive for @{}: {}, {}, {}",
                archive.account.username,
                pluralize(report.tweets, "tweet", None),
                pluralize(report.likes, "like", None),
                pluralize(report.user_mentions, "mention", None),
            ),
        );
    }
    Ok(())
}

/// Run the processor while a separate task renders its events.
///
/// If rendering fails the task drops its receiver, which stops the upload at
/// the next progress event.
async fn ingest(
    backend: &dyn Backend,
    archive: &Archive,
    settings: &Settings,
    mode: ProgressMode,
    json: bool,
) -> Result<IngestReport> {
    let (mut events, mut rx) = ChannelSink::new();
    let mut sink = renderer(mode, json);
    let render = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(err) = sink.emit(event) {
                warn!(error = %err, "progress rendering failed");
                return Err(err);
            }
        }
        Ok(())
    });

    let mut processor = ArchiveProcessor::new(backend, settings.ingest_options());
    let result = processor.run(archive, &mut events).await;
    debug!(state = ?processor.state(), "ingest finished");
    drop(events);

    let rendered = render.await.context("progress renderer panicked")?;
    let report = result?;
    rendered.context("failed to render progress")?;
    Ok(report)
}

fn confirm_upload(archive: &Archive) -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        bail!("--confirm requires an interactive terminal");
    }
    let prompt = format!(
        "Upload archive for @{} ({}, {}, {})?",
        archive.account.username,
        pluralize(archive.tweets.len(), "tweet", None),
        pluralize(archive.likes.len(), "like", None),
        pluralize(archive.mentions.len(), "mention", None),
    );
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(true)
        .interact()?)
}
