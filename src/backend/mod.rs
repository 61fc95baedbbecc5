use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

mod memory;

pub use memory::MemoryBackend;

pub type Row = Map<String, Value>;

/// The calls ingestion and stats make against the hosted backend.
///
/// Handles are passed explicitly to every operation so separate runs can use
/// separate backends.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Store `body` at `bucket/key`, replacing any existing object.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), BackendError>;

    /// Insert `rows` into `table`, updating rows that collide on `on_conflict`.
    async fn upsert_rows(
        &self,
        table: &str,
        on_conflict: &[&str],
        rows: &[Value],
    ) -> Result<(), BackendError>;

    async fn rpc(&self, function: &str, args: &Value) -> Result<Value, BackendError>;

    async fn select_rows(&self, relation: &str, columns: &[&str]) -> Result<Vec<Row>, BackendError>;
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{method} {path} failed ({status}): {body}")]
    Http {
        method: &'static str,
        path: String,
        status: u16,
        body: String,
    },

    #[error("{path} timed out")]
    Timeout { path: String },

    #[error("network error calling {path}: {source}")]
    Network {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {path}: {reason}")]
    Decode { path: String, reason: String },
}

impl BackendError {
    /// Whether another attempt at the same call could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Timeout { .. } | Self::Network { .. } => true,
            Self::Decode { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> BackendError {
        BackendError::Http {
            method: "POST",
            path: "/rest/v1/tweets".into(),
            status,
            body: String::new(),
        }
    }

    #[test]
    fn server_errors_and_throttling_are_transient() {
        assert!(http(500).is_transient());
        assert!(http(503).is_transient());
        assert!(http(429).is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        assert!(!http(400).is_transient());
        assert!(!http(401).is_transient());
        assert!(!http(409).is_transient());
        let decode = BackendError::Decode {
            path: "/rest/v1/global_activity_summary".into(),
            reason: "not an array".into(),
        };
        assert!(!decode.is_transient());
    }
}
