//! Archive ingestion: storage upload, row upserts, and progress events.

mod phase;
mod processor;
mod progress;
mod storage;

pub use phase::Phase;
pub use processor::{ArchiveProcessor, IngestOptions, IngestReport, DEFAULT_BATCH_SIZE};
pub use progress::{ChannelSink, ProgressEvent, ProgressSink, RecordingSink, SinkError};
pub use storage::DEFAULT_BUCKET;
