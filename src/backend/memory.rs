use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::{Backend, BackendError, Row};

/// In-process backend used for `--dry-run` and tests.
///
/// Upserts are keyed by the conflict columns, so replaying the same rows
/// leaves the table unchanged. Each `upsert_rows` call is applied atomically.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    objects: BTreeMap<String, Vec<u8>>,
    tables: BTreeMap<String, BTreeMap<String, Row>>,
    relations: BTreeMap<String, Vec<Row>>,
    rpc_calls: Vec<(String, Value)>,
    calls: usize,
    fail_storage: bool,
    fail_rows: Vec<(String, String, Value)>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Reject every storage write.
    #[cfg(test)]
    pub fn fail_storage(&self) {
        self.lock().fail_storage = true;
    }

    /// Reject any upsert batch into `table` containing a row whose `column` equals `value`.
    #[cfg(test)]
    pub fn fail_rows_where(&self, table: &str, column: &str, value: impl Into<Value>) {
        self.lock()
            .fail_rows
            .push((table.to_string(), column.to_string(), value.into()));
    }

    #[cfg(test)]
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.fail_storage = false;
        state.fail_rows.clear();
    }

    /// Rows returned by `select_rows` for a view or table that is not written by upserts.
    #[cfg(test)]
    pub fn set_relation(&self, relation: &str, rows: Vec<Row>) {
        self.lock().relations.insert(relation.to_string(), rows);
    }

    #[cfg(test)]
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(&object_path(bucket, key)).cloned()
    }

    #[cfg(test)]
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock()
            .tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn row_count(&self, table: &str) -> usize {
        self.lock().tables.get(table).map_or(0, BTreeMap::len)
    }

    #[cfg(test)]
    pub fn rpc_calls(&self) -> Vec<(String, Value)> {
        self.lock().rpc_calls.clone()
    }

    /// Total number of backend calls received, failed ones included.
    #[cfg(test)]
    pub fn call_count(&self) -> usize {
        self.lock().calls
    }
}

fn object_path(bucket: &str, key: &str) -> String {
    format!("{bucket}/{key}")
}

fn conflict_key(row: &Value, on_conflict: &[&str]) -> String {
    on_conflict
        .iter()
        .map(|column| match row.get(column) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        })
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

fn rejected(method: &'static str, path: String) -> BackendError {
    BackendError::Http {
        method,
        path,
        status: 500,
        body: "injected failure".to_string(),
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        _content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.calls += 1;
        let path = object_path(bucket, key);
        if state.fail_storage {
            return Err(rejected("POST", format!("/storage/v1/object/{path}")));
        }
        state.objects.insert(path, body);
        Ok(())
    }

    async fn upsert_rows(
        &self,
        table: &str,
        on_conflict: &[&str],
        rows: &[Value],
    ) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.calls += 1;

        let blocked = rows.iter().any(|row| {
            state
                .fail_rows
                .iter()
                .any(|(t, column, value)| t == table && row.get(column) == Some(value))
        });
        if blocked {
            return Err(rejected("POST", format!("/rest/v1/{table}")));
        }

        let mut staged = Vec::with_capacity(rows.len());
        for row in rows {
            let Value::Object(fields) = row else {
                return Err(BackendError::Http {
                    method: "POST",
                    path: format!("/rest/v1/{table}"),
                    status: 400,
                    body: "row is not an object".to_string(),
                });
            };
            staged.push((conflict_key(row, on_conflict), fields.clone()));
        }

        let target = state.tables.entry(table.to_string()).or_default();
        for (key, fields) in staged {
            match target.get_mut(&key) {
                Some(existing) => existing.extend(fields),
                None => {
                    target.insert(key, fields);
                }
            }
        }
        Ok(())
    }

    async fn rpc(&self, function: &str, args: &Value) -> Result<Value, BackendError> {
        let mut state = self.lock();
        state.calls += 1;
        state.rpc_calls.push((function.to_string(), args.clone()));
        Ok(Value::Null)
    }

    async fn select_rows(&self, relation: &str, columns: &[&str]) -> Result<Vec<Row>, BackendError> {
        let mut state = self.lock();
        state.calls += 1;
        let source = match state.relations.get(relation) {
            Some(rows) => rows.clone(),
            None => state
                .tables
                .get(relation)
                .map(|rows| rows.values().cloned().collect())
                .unwrap_or_default(),
        };
        Ok(source
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .filter(|(column, _)| columns.contains(&column.as_str()))
                    .collect()
            })
            .collect())
    }
}
