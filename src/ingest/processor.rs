use std::collections::HashSet;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::phase::IngestState;
use super::progress::ProgressPlan;
use super::storage::{upload_archive_to_storage, DEFAULT_BUCKET};
use super::{Phase, ProgressEvent, ProgressSink};
use crate::archive::Archive;
use crate::backend::Backend;
use crate::error::ArchiveError;
use crate::schema::{
    AccountRow, LikeRow, LikedTweetRow, MentionedUserRow, TweetRow, UserMentionRow,
    ACCOUNT_KEY, ACCOUNT_TABLE, LIKED_TWEETS_KEY, LIKED_TWEETS_TABLE, LIKES_KEY, LIKES_TABLE,
    MENTIONED_USERS_KEY, MENTIONED_USERS_TABLE, RECORD_UPLOAD_RPC, TWEETS_KEY, TWEETS_TABLE,
    USER_MENTIONS_KEY, USER_MENTIONS_TABLE,
};

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub bucket: String,
    /// Rows per upsert request. Zero is treated as one.
    pub batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Rows written per record set by a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub account_id: String,
    pub storage_key: String,
    pub tweets: usize,
    pub liked_tweets: usize,
    pub likes: usize,
    pub mentioned_users: usize,
    pub user_mentions: usize,
}

/// Runs the ingest phases for one archive against one backend.
///
/// Every write is an upsert on the record set's natural key, so a run that
/// failed part-way can be repeated. Nothing is rolled back on failure.
pub struct ArchiveProcessor<'a> {
    backend: &'a dyn Backend,
    options: IngestOptions,
    state: IngestState,
}

impl<'a> ArchiveProcessor<'a> {
    pub fn new(backend: &'a dyn Backend, options: IngestOptions) -> Self {
        Self {
            backend,
            options,
            state: IngestState::Idle,
        }
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    pub async fn run<S>(&mut self, archive: &Archive, sink: &mut S) -> Result<IngestReport, ArchiveError>
    where
        S: ProgressSink + ?Sized,
    {
        let started = Instant::now();
        let result = self.run_phases(archive, sink).await;
        match &result {
            Ok(report) => info!(
                account_id = %report.account_id,
                tweets = report.tweets,
                likes = report.likes,
                user_mentions = report.user_mentions,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "archive ingested"
            ),
            Err(err) => {
                let phase = err.failed_phase().unwrap_or(match self.state {
                    IngestState::Running(phase) => phase,
                    _ => Phase::UploadingStorage,
                });
                if !self.state.is_terminal() {
                    self.state.fail(phase);
                }
                warn!(%phase, error = %err, "archive ingest failed");
            }
        }
        result
    }

    async fn run_phases<S>(&mut self, archive: &Archive, sink: &mut S) -> Result<IngestReport, ArchiveError>
    where
        S: ProgressSink + ?Sized,
    {
        let account_id = archive.account.account_id.as_str();
        let plan = ProgressPlan::new(
            archive.tweets.len(),
            archive.likes.len(),
            archive.mentions.len(),
        );
        let mut report = IngestReport {
            account_id: account_id.to_string(),
            ..IngestReport::default()
        };

        self.state.enter(Phase::UploadingStorage);
        emit(sink, Phase::UploadingStorage, None)?;
        report.storage_key =
            upload_archive_to_storage(self.backend, &self.options.bucket, archive).await?;
        emit(sink, Phase::UploadingStorage, Some(plan.end(Phase::UploadingStorage)))?;

        let phase = Phase::InsertingAccount;
        self.state.enter(phase);
        emit(sink, phase, Some(plan.percent(phase, 0, 1)))?;
        let account = encode_rows(phase, [AccountRow::from(&archive.account)], ACCOUNT_KEY)?;
        self.upsert(phase, ACCOUNT_TABLE, ACCOUNT_KEY, &account).await?;
        let upload = json!({
            "p_account_id": account_id,
            "p_archive_at": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "p_tweet_count": archive.tweets.len(),
            "p_like_count": archive.likes.len(),
            "p_mention_count": archive.mentions.len(),
        });
        self.backend
            .rpc(RECORD_UPLOAD_RPC, &upload)
            .await
            .map_err(|err| ArchiveError::processing(phase, err))?;
        emit(sink, phase, Some(plan.end(phase)))?;

        if !archive.tweets.is_empty() {
            let phase = Phase::InsertingTweets;
            self.state.enter(phase);
            let total = archive.tweets.len();
            emit(sink, phase, Some(plan.percent(phase, 0, total)))?;
            let mut done = 0;
            for chunk in archive.tweets.chunks(self.batch_size()) {
                let rows = encode_rows(
                    phase,
                    chunk.iter().map(|tweet| TweetRow::new(account_id, tweet)),
                    TWEETS_KEY,
                )?;
                self.upsert(phase, TWEETS_TABLE, TWEETS_KEY, &rows).await?;
                report.tweets += rows.len();
                done += chunk.len();
                emit(sink, phase, Some(plan.percent(phase, done, total)))?;
            }
        }

        if !archive.likes.is_empty() {
            let phase = Phase::InsertingLikes;
            self.state.enter(phase);
            let total = archive.likes.len();
            emit(sink, phase, Some(plan.percent(phase, 0, total)))?;
            let mut done = 0;
            for chunk in archive.likes.chunks(self.batch_size()) {
                let liked = encode_rows(phase, chunk.iter().map(LikedTweetRow::from), LIKED_TWEETS_KEY)?;
                self.upsert(phase, LIKED_TWEETS_TABLE, LIKED_TWEETS_KEY, &liked)
                    .await?;
                let likes = encode_rows(
                    phase,
                    chunk.iter().map(|like| LikeRow {
                        account_id,
                        liked_tweet_id: &like.tweet_id,
                    }),
                    LIKES_KEY,
                )?;
                self.upsert(phase, LIKES_TABLE, LIKES_KEY, &likes).await?;
                report.liked_tweets += liked.len();
                report.likes += likes.len();
                done += chunk.len();
                emit(sink, phase, Some(plan.percent(phase, done, total)))?;
            }
        }

        if !archive.mentions.is_empty() {
            let phase = Phase::InsertingMentions;
            self.state.enter(phase);
            let total = archive.mentions.len();
            emit(sink, phase, Some(plan.percent(phase, 0, total)))?;
            let mut users = HashSet::new();
            let mut done = 0;
            for chunk in archive.mentions.chunks(self.batch_size()) {
                let mentioned = encode_rows(
                    phase,
                    chunk.iter().map(MentionedUserRow::from),
                    MENTIONED_USERS_KEY,
                )?;
                self.upsert(phase, MENTIONED_USERS_TABLE, MENTIONED_USERS_KEY, &mentioned)
                    .await?;
                let mentions =
                    encode_rows(phase, chunk.iter().map(UserMentionRow::from), USER_MENTIONS_KEY)?;
                self.upsert(phase, USER_MENTIONS_TABLE, USER_MENTIONS_KEY, &mentions)
                    .await?;
                users.extend(chunk.iter().map(|m| m.mentioned_user_id.as_str()));
                report.user_mentions += mentions.len();
                done += chunk.len();
                emit(sink, phase, Some(plan.percent(phase, done, total)))?;
            }
            report.mentioned_users = users.len();
        }

        emit(sink, Phase::Done, Some(plan.end(Phase::Done)))?;
        self.state.enter(Phase::Done);
        Ok(report)
    }

    fn batch_size(&self) -> usize {
        self.options.batch_size.max(1)
    }

    async fn upsert(
        &self,
        phase: Phase,
        table: &str,
        on_conflict: &[&str],
        rows: &[Value],
    ) -> Result<(), ArchiveError> {
        debug!(%phase, table, rows = rows.len(), "upserting batch");
        self.backend
            .upsert_rows(table, on_conflict, rows)
            .await
            .map_err(|err| ArchiveError::processing(phase, err))
    }
}

fn emit<S>(sink: &mut S, phase: Phase, percent: Option<f64>) -> Result<(), ArchiveError>
where
    S: ProgressSink + ?Sized,
{
    sink.emit(ProgressEvent { phase, percent })
        .map_err(|err| ArchiveError::processing(phase, err))
}

/// Serialize rows, keeping the last row for each conflict key.
///
/// A single upsert request may not touch the same key twice.
fn encode_rows<T: Serialize>(
    phase: Phase,
    rows: impl IntoIterator<Item = T>,
    on_conflict: &[&str],
) -> Result<Vec<Value>, ArchiveError> {
    let mut encoded: Vec<Value> = Vec::new();
    let mut positions = std::collections::HashMap::new();
    for row in rows {
        let value = serde_json::to_value(row).map_err(|err| ArchiveError::processing(phase, err))?;
        let key: Vec<String> = on_conflict
            .iter()
            .map(|column| value.get(column).map(Value::to_string).unwrap_or_default())
            .collect();
        match positions.get(&key) {
            Some(&index) => encoded[index] = value,
            None => {
                positions.insert(key, encoded.len());
                encoded.push(value);
            }
        }
    }
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::ingest::{ChannelSink, RecordingSink, SinkError};

    fn archive(tweets: &[&str], likes: &[&str], mentions: &[(&str, &str)]) -> Archive {
        let doc = json!({
            "account": {
                "account_id": "1",
                "username": "alice",
                "account_display_name": "Alice",
                "num_tweets": tweets.len(),
            },
            "tweets": tweets
                .iter()
                .map(|id| json!({"tweet_id": id, "full_text": format!("tweet {id}")}))
                .collect::<Vec<_>>(),
            "likes": likes
                .iter()
                .map(|id| json!({"tweet_id": id, "full_text": "liked"}))
                .collect::<Vec<_>>(),
            "mentions": mentions
                .iter()
                .map(|(tweet, user)| json!({
                    "tweet_id": tweet,
                    "mentioned_user_id": user,
                    "screen_name": format!("user{user}"),
                }))
                .collect::<Vec<_>>(),
        });
        Archive::from_slice(doc.to_string().as_bytes()).unwrap()
    }

    fn options(batch_size: usize) -> IngestOptions {
        IngestOptions {
            batch_size,
            ..IngestOptions::default()
        }
    }

    fn assert_non_decreasing(events: &[ProgressEvent]) {
        let percents: Vec<f64> = events.iter().filter_map(|e| e.percent).collect();
        for pair in percents.windows(2) {
            assert!(pair[0] <= pair[1], "percent went backwards: {percents:?}");
        }
        assert!(percents.iter().all(|p| (0.0..=100.0).contains(p)));
    }

    struct FailOn(Phase);

    impl ProgressSink for FailOn {
        fn emit(&mut self, event: ProgressEvent) -> Result<(), SinkError> {
            if event.phase == self.0 {
                return Err(SinkError::Closed);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn single_tweet_archive_skips_empty_phases() {
        let backend = MemoryBackend::new();
        let archive = archive(&["t1"], &[], &[]);
        let mut sink = RecordingSink::default();

        let report = ArchiveProcessor::new(&backend, options(500))
            .run(&archive, &mut sink)
            .await
            .unwrap();

        assert_eq!(
            sink.phases(),
            vec![
                Phase::UploadingStorage,
                Phase::InsertingAccount,
                Phase::InsertingTweets,
                Phase::Done
            ]
        );
        assert_eq!(sink.events.first().unwrap().percent, None);
        assert_eq!(sink.events.last().unwrap().percent, Some(100.0));
        assert_non_decreasing(&sink.events);
        assert_eq!(report.tweets, 1);
        assert_eq!(report.storage_key, "1/archive.json");
        assert_eq!(backend.row_count(ACCOUNT_TABLE), 1);
        assert_eq!(backend.row_count(TWEETS_TABLE), 1);
    }

    #[tokio::test]
    async fn full_archive_writes_every_record_set() {
        let backend = MemoryBackend::new();
        let archive = archive(
            &["t1", "t2", "t3"],
            &["l1", "l2"],
            &[("t1", "u1"), ("t2", "u1"), ("t3", "u2")],
        );
        let mut sink = RecordingSink::default();
        let mut processor = ArchiveProcessor::new(&backend, options(2));

        let report = processor.run(&archive, &mut sink).await.unwrap();

        assert_eq!(processor.state(), IngestState::Done);
        assert_eq!(sink.phases().len(), 6);
        assert_non_decreasing(&sink.events);
        assert_eq!(
            report,
            IngestReport {
                account_id: "1".into(),
                storage_key: "1/archive.json".into(),
                tweets: 3,
                liked_tweets: 2,
                likes: 2,
                mentioned_users: 2,
                user_mentions: 3,
            }
        );
        assert_eq!(backend.row_count(LIKED_TWEETS_TABLE), 2);
        assert_eq!(backend.row_count(LIKES_TABLE), 2);
        assert_eq!(backend.row_count(MENTIONED_USERS_TABLE), 2);
        assert_eq!(backend.row_count(USER_MENTIONS_TABLE), 3);

        let calls = backend.rpc_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, RECORD_UPLOAD_RPC);
        assert_eq!(calls[0].1["p_account_id"], "1");
        assert_eq!(calls[0].1["p_tweet_count"], 3);
    }

    #[tokio::test]
    async fn tweet_failure_leaves_account_row_in_place() {
        let backend = MemoryBackend::new();
        backend.fail_rows_where(TWEETS_TABLE, "tweet_id", "t2");
        let archive = archive(&["t1", "t2", "t3"], &["l1"], &[]);
        let mut sink = RecordingSink::default();
        let mut processor = ArchiveProcessor::new(&backend, options(1));

        let err = processor.run(&archive, &mut sink).await.unwrap_err();

        assert!(matches!(
            err,
            ArchiveError::ProcessingFailed {
                phase: Phase::InsertingTweets,
                ..
            }
        ));
        assert_eq!(processor.state(), IngestState::Failed(Phase::InsertingTweets));
        assert_eq!(backend.row_count(ACCOUNT_TABLE), 1);
        assert_eq!(backend.row_count(TWEETS_TABLE), 1);
        assert_eq!(backend.row_count(LIKES_TABLE), 0);
        assert!(!sink.phases().contains(&Phase::InsertingLikes));
    }

    #[tokio::test]
    async fn rerun_after_partial_failure_converges() {
        let backend = MemoryBackend::new();
        backend.fail_rows_where(TWEETS_TABLE, "tweet_id", "t2");
        let archive = archive(&["t1", "t2", "t3"], &["l1"], &[("t1", "u1")]);

        let first = ArchiveProcessor::new(&backend, options(1))
            .run(&archive, &mut RecordingSink::default())
            .await;
        assert!(first.is_err());

        backend.clear_failures();
        ArchiveProcessor::new(&backend, options(1))
            .run(&archive, &mut RecordingSink::default())
            .await
            .unwrap();
        ArchiveProcessor::new(&backend, options(1))
            .run(&archive, &mut RecordingSink::default())
            .await
            .unwrap();

        assert_eq!(backend.row_count(ACCOUNT_TABLE), 1);
        assert_eq!(backend.row_count(TWEETS_TABLE), 3);
        assert_eq!(backend.row_count(LIKES_TABLE), 1);
        assert_eq!(backend.row_count(USER_MENTIONS_TABLE), 1);
    }

    #[tokio::test]
    async fn failing_sink_stops_later_phases() {
        let backend = MemoryBackend::new();
        let archive = archive(&["t1"], &["l1"], &[("t1", "u1")]);
        let mut sink = FailOn(Phase::InsertingTweets);

        let err = ArchiveProcessor::new(&backend, options(500))
            .run(&archive, &mut sink)
            .await
            .unwrap_err();

        assert_eq!(err.failed_phase(), Some(Phase::InsertingTweets));
        assert_eq!(backend.row_count(TWEETS_TABLE), 0);
        assert_eq!(backend.row_count(LIKES_TABLE), 0);
        assert_eq!(backend.row_count(USER_MENTIONS_TABLE), 0);
    }

    #[tokio::test]
    async fn sink_failure_before_upload_makes_no_calls() {
        let backend = MemoryBackend::new();
        let archive = archive(&["t1"], &[], &[]);
        let mut sink = FailOn(Phase::UploadingStorage);

        let err = ArchiveProcessor::new(&backend, options(500))
            .run(&archive, &mut sink)
            .await
            .unwrap_err();

        assert_eq!(err.failed_phase(), Some(Phase::UploadingStorage));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn storage_failure_is_upload_failed() {
        let backend = MemoryBackend::new();
        backend.fail_storage();
        let archive = archive(&["t1"], &[], &[]);
        let mut processor = ArchiveProcessor::new(&backend, options(500));

        let err = processor
            .run(&archive, &mut RecordingSink::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ArchiveError::UploadFailed(_)));
        assert_eq!(processor.state(), IngestState::Failed(Phase::UploadingStorage));
        assert_eq!(backend.row_count(ACCOUNT_TABLE), 0);
    }

    #[tokio::test]
    async fn dropped_receiver_cancels_the_run() {
        let backend = MemoryBackend::new();
        let archive = archive(&["t1", "t2"], &[], &[]);
        let (mut sink, rx) = ChannelSink::new();
        drop(rx);

        let err = ArchiveProcessor::new(&backend, options(1))
            .run(&archive, &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ArchiveError::ProcessingFailed {
                phase: Phase::UploadingStorage,
                ..
            }
        ));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn channel_sink_delivers_events_in_order() {
        let backend = MemoryBackend::new();
        let archive = archive(&["t1", "t2"], &["l1"], &[]);
        let (mut sink, mut rx) = ChannelSink::new();

        ArchiveProcessor::new(&backend, options(1))
            .run(&archive, &mut sink)
            .await
            .unwrap();
        drop(sink);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.last().map(|e| e.phase), Some(Phase::Done));
        assert_non_decreasing(&events);
    }

    #[test]
    fn encode_rows_keeps_last_duplicate() {
        let rows = [
            MentionedUserRow {
                user_id: "1",
                name: "old",
                screen_name: "a",
            },
            MentionedUserRow {
                user_id: "1",
                name: "new",
                screen_name: "a",
            },
        ];
        let encoded = encode_rows(Phase::InsertingMentions, rows, MENTIONED_USERS_KEY).unwrap();
        assert_eq!(encoded.len(), 1);
        assert_eq!(encoded[0]["name"], "new");
    }
}
