use serde::Serialize;
use serde_json::Value;

use crate::backend::{Backend, Row};
use crate::error::ArchiveError;
use crate::schema::{stats_column_names, StatsField, STATS_COLUMNS, STATS_VIEW};

/// Global totals across every uploaded archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub account_count: u64,
    pub tweet_count: u64,
    pub liked_tweet_count: u64,
    pub user_mentions_count: u64,
}

pub async fn get_stats(backend: &dyn Backend) -> Result<StatsSummary, ArchiveError> {
    let rows = backend
        .select_rows(STATS_VIEW, &stats_column_names())
        .await?;
    match rows.as_slice() {
        [row] => summary_from_row(row),
        _ => Err(ArchiveError::AggregateNotFound { rows: rows.len() }),
    }
}

fn summary_from_row(row: &Row) -> Result<StatsSummary, ArchiveError> {
    let mut summary = StatsSummary::default();
    for &(column, field) in STATS_COLUMNS {
        let value = row
            .get(column)
            .and_then(as_count)
            .ok_or(ArchiveError::SchemaMismatch { column })?;
        let slot = match field {
            StatsField::AccountCount => &mut summary.account_count,
            StatsField::TweetCount => &mut summary.tweet_count,
            StatsField::LikedTweetCount => &mut summary.liked_tweet_count,
            StatsField::UserMentionsCount => &mut summary.user_mentions_count,
        };
        *slot = value;
    }
    Ok(summary)
}

/// Postgres `bigint`/`numeric` aggregates may arrive as numbers or strings.
fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
