use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use super::Phase;

/// A point-in-time status of an ingest run.
///
/// `percent` is overall completion in `[0, 100]` and never decreases within a
/// run. `None` means the phase started but its progress cannot be estimated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub percent: Option<f64>,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("progress receiver was dropped")]
    Closed,
    #[error("failed to write progress: {0}")]
    Io(#[from] std::io::Error),
}

/// Receives progress events. An error aborts the run before the next write.
pub trait ProgressSink {
    fn emit(&mut self, event: ProgressEvent) -> Result<(), SinkError>;
}

impl<S: ProgressSink + ?Sized> ProgressSink for &mut S {
    fn emit(&mut self, event: ProgressEvent) -> Result<(), SinkError> {
        (**self).emit(event)
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for Box<S> {
    fn emit(&mut self, event: ProgressEvent) -> Result<(), SinkError> {
        (**self).emit(event)
    }
}

/// Forwards events to a channel. Dropping the receiver cancels the run.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&mut self, event: ProgressEvent) -> Result<(), SinkError> {
        self.tx.send(event).map_err(|_| SinkError::Closed)
    }
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<ProgressEvent>,
}

impl ProgressSink for RecordingSink {
    fn emit(&mut self, event: ProgressEvent) -> Result<(), SinkError> {
        self.events.push(event);
        Ok(())
    }
}

impl RecordingSink {
    /// Phases in the order they first appeared.
    #[cfg(test)]
    pub fn phases(&self) -> Vec<Phase> {
        let mut phases: Vec<Phase> = Vec::new();
        for event in &self.events {
            if phases.last() != Some(&event.phase) {
                phases.push(event.phase);
            }
        }
        phases
    }
}

const STORAGE_SHARE: f64 = 10.0;
const ACCOUNT_SHARE: f64 = 5.0;

/// Maps `(phase, done, total)` to overall percent.
///
/// Storage and account get fixed shares; the row phases split the rest in
/// proportion to their row counts.
#[derive(Debug, Clone)]
pub(crate) struct ProgressPlan {
    spans: Vec<(Phase, f64, f64)>,
}

impl ProgressPlan {
    pub(crate) fn new(tweets: usize, likes: usize, mentions: usize) -> Self {
        let total_rows = (tweets + likes + mentions) as f64;
        let rows_start = STORAGE_SHARE + ACCOUNT_SHARE;
        let account_end = if total_rows == 0.0 { 100.0 } else { rows_start };

        let mut spans = vec![
            (Phase::UploadingStorage, 0.0, STORAGE_SHARE),
            (Phase::InsertingAccount, STORAGE_SHARE, account_end),
        ];

        let mut cursor = rows_start;
        for (phase, count) in [
            (Phase::InsertingTweets, tweets),
            (Phase::InsertingLikes, likes),
            (Phase::InsertingMentions, mentions),
        ] {
            let width = if total_rows == 0.0 {
                0.0
            } else {
                (100.0 - rows_start) * count as f64 / total_rows
            };
            spans.push((phase, cursor, (cursor + width).min(100.0)));
            cursor += width;
        }
        spans.push((Phase::Done, 100.0, 100.0));
        Self { spans }
    }

    pub(crate) fn percent(&self, phase: Phase, done: usize, total: usize) -> f64 {
        let Some(&(_, start, end)) = self.spans.iter().find(|(p, _, _)| *p == phase) else {
            return 100.0;
        };
        if total == 0 {
            return start;
        }
        let fraction = (done.min(total) as f64) / total as f64;
        start + (end - start) * fraction
    }

    pub(crate) fn end(&self, phase: Phase) -> f64 {
        self.percent(phase, 1, 1)
    }
}
