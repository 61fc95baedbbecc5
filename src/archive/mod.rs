//! Loading a social-media export into memory.
//!
//! Parsing is all-or-nothing: either every record validates and the
//! [`Archive`] is returned, or the whole file is rejected as
//! [`ArchiveError::MalformedInput`].

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::ArchiveError;

mod model;

pub use model::{Account, Like, Mention, Tweet};

/// Timestamp layout used by legacy exports, e.g. `Wed Oct 10 20:19:24 +0000 2018`.
const LEGACY_TIMESTAMP_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

#[derive(Debug, Deserialize)]
struct ArchiveDocument {
    account: Account,
    #[serde(default)]
    tweets: Vec<Tweet>,
    #[serde(default)]
    likes: Vec<Like>,
    #[serde(default)]
    mentions: Vec<Mention>,
}

/// A fully validated export. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Archive {
    pub account: Account,
    pub tweets: Vec<Tweet>,
    pub likes: Vec<Like>,
    pub mentions: Vec<Mention>,
    raw: Vec<u8>,
}

impl Archive {
    /// Parse and validate an export. Errors are plain reasons; callers attach the path.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, String> {
        let document: ArchiveDocument =
            serde_json::from_slice(bytes).map_err(|err| err.to_string())?;

        let mut account = document.account;
        if account.account_id.trim().is_empty() {
            return Err("account.account_id is empty".to_string());
        }
        if let Some(created_at) = account.created_at.as_deref() {
            account.created_at = Some(
                normalize_timestamp(created_at)
                    .ok_or_else(|| format!("account.created_at '{created_at}' is not a timestamp"))?,
            );
        }

        let mut tweets = document.tweets;
        for tweet in &mut tweets {
            if tweet.tweet_id.trim().is_empty() {
                return Err("tweet with empty tweet_id".to_string());
            }
            if let Some(created_at) = tweet.created_at.as_deref() {
                tweet.created_at = Some(normalize_timestamp(created_at).ok_or_else(|| {
                    format!(
                        "tweet {}: created_at '{created_at}' is not a timestamp",
                        tweet.tweet_id
                    )
                })?);
            }
        }

        if let Some(like) = document.likes.iter().find(|l| l.tweet_id.trim().is_empty()) {
            return Err(format!("like with empty tweet_id ({:?})", like.full_text));
        }

        let mentions = merge_mentions(document.mentions, &tweets);

        Ok(Self {
            account,
            tweets,
            likes: document.likes,
            mentions,
            raw: bytes.to_vec(),
        })
    }

    /// The file contents exactly as read, for the storage upload.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

/// Read and validate the export at `path`.
pub fn read_archive(path: &Path) -> Result<Archive, ArchiveError> {
    let bytes = fs::read(path).map_err(|err| ArchiveError::MalformedInput {
        path: path.to_path_buf(),
        reason: match err.kind() {
            io::ErrorKind::NotFound => "file not found".to_string(),
            _ => err.to_string(),
        },
    })?;

    let archive = Archive::from_slice(&bytes).map_err(|reason| ArchiveError::MalformedInput {
        path: path.to_path_buf(),
        reason,
    })?;

    debug!(
        path = %path.display(),
        account_id = %archive.account.account_id,
        tweets = archive.tweets.len(),
        likes = archive.likes.len(),
        mentions = archive.mentions.len(),
        "loaded archive"
    );
    Ok(archive)
}

/// Explicit mentions first, then those embedded in tweet entities; first occurrence wins.
fn merge_mentions(explicit: Vec<Mention>, tweets: &[Tweet]) -> Vec<Mention> {
    let embedded = tweets.iter().flat_map(|tweet| {
        tweet.entities.user_mentions.iter().map(|m| Mention {
            tweet_id: tweet.tweet_id.clone(),
            mentioned_user_id: m.id.clone(),
            screen_name: m.screen_name.clone(),
            name: m.name.clone(),
        })
    });

    let mut seen = HashSet::new();
    explicit
        .into_iter()
        .chain(embedded)
        .filter(|m| !m.mentioned_user_id.is_empty())
        .filter(|m| seen.insert((m.tweet_id.clone(), m.mentioned_user_id.clone())))
        .collect()
}

/// Normalize to RFC 3339 in UTC. Returns `None` for unrecognized input.
pub fn normalize_timestamp(value: &str) -> Option<String> {
    let value = value.trim();
    let parsed = DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, LEGACY_TIMESTAMP_FORMAT))
        .ok()?;
    Some(
        parsed
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}
