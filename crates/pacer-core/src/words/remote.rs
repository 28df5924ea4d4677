use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{PayloadSet, Refresh, WordSource};
use crate::error::{PacerError, Result};
use crate::scheduler::SchedulerHandle;

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

fn all_strings(items: &[Value]) -> Option<Vec<String>> {
    items
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// Extract words from a remote response body.
///
/// Accepted shapes, in order:
/// 1. `["a", "b"]`
/// 2. `{"words": ["a", "b"]}` or any other field holding an array of strings
/// 3. any object, whose values are flattened one level and filtered to strings
pub fn parse_word_payload(body: &Value) -> Result<PayloadSet> {
    let words = match body {
        Value::Array(items) => all_strings(items).ok_or_else(|| {
            PacerError::MalformedPayload("array contains non-string entries".into())
        })?,
        Value::Object(map) => {
            let field = map
                .get("words")
                .into_iter()
                .chain(map.values())
                .find_map(|v| v.as_array().and_then(|a| all_strings(a)));
            match field {
                Some(words) => words,
                None => map
                    .values()
                    .flat_map(|v| match v {
                        Value::Array(items) => items.clone(),
                        other => vec![other.clone()],
                    })
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            }
        }
        other => {
            return Err(PacerError::MalformedPayload(format!(
                "expected an array or object, got {}",
                kind(other)
            )))
        }
    };
    PayloadSet::from_words(words)
        .ok_or_else(|| PacerError::MalformedPayload("no valid words found in response".into()))
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// RemoteWordList
// ---------------------------------------------------------------------------

/// HTTP client for the remote word list.
#[derive(Clone)]
pub struct RemoteWordList {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl RemoteWordList {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch and parse the list. Transport errors, timeouts and non-2xx
    /// statuses are `RemoteFetchFailed`; unusable bodies are `MalformedPayload`.
    pub async fn fetch(&self) -> Result<PayloadSet> {
        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| PacerError::RemoteFetchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PacerError::RemoteFetchFailed(format!("HTTP {status}")));
        }

        // A body that stalls past the timeout is a fetch failure, not a bad payload.
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PacerError::RemoteFetchFailed(e.to_string()))?;
        let body: Value = serde_json::from_slice(&bytes)
            .map_err(|e| PacerError::MalformedPayload(e.to_string()))?;
        parse_word_payload(&body)
    }
}

// ---------------------------------------------------------------------------
// Refresher
// ---------------------------------------------------------------------------

/// Spawn the periodic refresh loop.
///
/// The first refresh runs immediately. Successful refreshes are handed to the
/// scheduler, which persists the new set; the loop exits once the scheduler
/// has shut down.
pub fn spawn_refresher(
    mut source: WordSource,
    interval: Duration,
    handle: SchedulerHandle,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match source.refresh().await {
                Refresh::Replaced { count } => {
                    if handle.replace_payloads(source.current()).await.is_err() {
                        debug!("scheduler gone; stopping word refresher");
                        break;
                    }
                    info!(count, "word list handed to scheduler");
                }
                Refresh::KeptLastKnown { reason } => {
                    debug!(%reason, "word list unchanged");
                }
            }
            if handle.is_closed() {
                break;
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
