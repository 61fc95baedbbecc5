use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use backoff::future::retry_notify;
use backoff::{Error as BackoffError, ExponentialBackoffBuilder};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, warn};
use urlencoding::encode;

use crate::backend::{Backend, BackendError, Row};
use crate::login::LoginContext;

const RETRY_BASE_DELAY_MS: u64 = 300;
const MAX_BACKOFF_SECS: u64 = 8;

/// HTTP client for the hosted backend's storage, row, and RPC endpoints.
pub struct ApiClient {
    http: Client,
    base_url: String,
    service_key: String,
    max_attempts: usize,
}

enum Body {
    Empty,
    Json(Value),
    Bytes(Vec<u8>),
}

struct Call {
    method: Method,
    path: String,
    headers: Vec<(&'static str, String)>,
    body: Body,
}

impl Call {
    fn new(method: Method, path: String) -> Self {
        Self {
            method,
            path,
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    fn method_name(&self) -> &'static str {
        match self.method {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::PATCH => "PATCH",
            Method::DELETE => "DELETE",
            _ => "REQUEST",
        }
    }
}

impl ApiClient {
    /// `retries` extra attempts are made for transient failures only.
    pub fn new(ctx: &LoginContext, timeout: Duration, retries: usize) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("carchive/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: ctx.api_url.trim_end_matches('/').to_string(),
            service_key: ctx.service_key.clone(),
            max_attempts: retries.saturating_add(1),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, call: &Call) -> RequestBuilder {
        let mut request = self
            .http
            .request(call.method.clone(), self.url(&call.path))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key);
        for (name, value) in &call.headers {
            request = request.header(*name, value);
        }
        match &call.body {
            Body::Empty => request,
            Body::Json(value) => request.json(value),
            Body::Bytes(bytes) => request.body(bytes.clone()),
        }
    }

    async fn send(&self, call: Call) -> Result<Response, BackendError> {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(RETRY_BASE_DELAY_MS))
            .with_multiplier(2.0)
            .with_randomization_factor(0.2)
            .with_max_interval(Duration::from_secs(MAX_BACKOFF_SECS))
            .with_max_elapsed_time(None)
            .build();

        let method = call.method_name();
        let max_attempts = self.max_attempts;
        let mut attempt = 0usize;

        retry_notify(
            backoff,
            || {
                attempt += 1;
                let current = attempt;
                let request = self.request(&call);
                let path = call.path.clone();

                async move {
                    debug!(method, path = %path, attempt = current, "backend request");
                    let err = match request.send().await {
                        Ok(response) if response.status().is_success() => return Ok(response),
                        Ok(response) => {
                            let status = response.status().as_u16();
                            let body = response.text().await.unwrap_or_default();
                            BackendError::Http {
                                method,
                                path,
                                status,
                                body,
                            }
                        }
                        Err(source) if source.is_timeout() => BackendError::Timeout { path },
                        Err(source) => BackendError::Network { path, source },
                    };

                    if err.is_transient() && current < max_attempts {
                        Err(BackoffError::transient(err))
                    } else {
                        Err(BackoffError::permanent(err))
                    }
                }
            },
            |err: BackendError, delay: Duration| {
                warn!(error = %err, delay_ms = delay.as_millis() as u64, "retrying backend call");
            },
        )
        .await
    }

    async fn send_json(&self, call: Call) -> Result<Value, BackendError> {
        let path = call.path.clone();
        let text = self
            .send(call)
            .await?
            .text()
            .await
            .map_err(|err| BackendError::Decode {
                path: path.clone(),
                reason: err.to_string(),
            })?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|err| BackendError::Decode {
            path,
            reason: err.to_string(),
        })
    }
}

fn object_path(bucket: &str, key: &str) -> String {
    let key = key.split('/').map(encode).collect::<Vec<_>>().join("/");
    format!("/storage/v1/object/{}/{key}", encode(bucket))
}

fn upsert_path(table: &str, on_conflict: &[&str]) -> String {
    format!(
        "/rest/v1/{}?on_conflict={}",
        encode(table),
        encode(&on_conflict.join(","))
    )
}

fn select_path(relation: &str, columns: &[&str]) -> String {
    format!(
        "/rest/v1/{}?select={}",
        encode(relation),
        encode(&columns.join(","))
    )
}

#[async_trait]
impl Backend for ApiClient {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), BackendError> {
        let call = Call::new(Method::POST, object_path(bucket, key))
            .header("content-type", content_type)
            .header("x-upsert", "true")
            .body(Body::Bytes(body));
        self.send(call).await.map(drop)
    }

    async fn upsert_rows(
        &self,
        table: &str,
        on_conflict: &[&str],
        rows: &[Value],
    ) -> Result<(), BackendError> {
        if rows.is_empty() {
            return Ok(());
        }
        let call = Call::new(Method::POST, upsert_path(table, on_conflict))
            .header("prefer", "resolution=merge-duplicates,return=minimal")
            .body(Body::Json(Value::Array(rows.to_vec())));
        self.send(call).await.map(drop)
    }

    async fn rpc(&self, function: &str, args: &Value) -> Result<Value, BackendError> {
        let call = Call::new(Method::POST, format!("/rest/v1/rpc/{}", encode(function)))
            .body(Body::Json(args.clone()));
        self.send_json(call).await
    }

    async fn select_rows(&self, relation: &str, columns: &[&str]) -> Result<Vec<Row>, BackendError> {
        let path = select_path(relation, columns);
        let value = self.send_json(Call::new(Method::GET, path.clone())).await?;
        serde_json::from_value(value).map_err(|err| BackendError::Decode {
            path,
            reason: format!("expected an array of rows: {err}"),
        })
    }
}
