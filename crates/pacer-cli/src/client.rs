use anyhow::{anyhow, Context};
use pacer_core::scheduler::StatusSnapshot;
use std::time::Duration;

/// Blocking client for the control surface of a running `pacer run`.
pub struct DaemonClient {
    agent: ureq::Agent,
    base: String,
}

impl DaemonClient {
    pub fn new(base: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(2))
            .timeout_read(Duration::from_secs(10))
            .build();
        Self {
            agent,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn status(&self) -> anyhow::Result<StatusSnapshot> {
        self.call("GET", "/api/status", None)
    }

    pub fn post(&self, path: &str) -> anyhow::Result<StatusSnapshot> {
        self.call("POST", path, None)
    }

    pub fn put_settings(&self, body: serde_json::Value) -> anyhow::Result<StatusSnapshot> {
        self.call("PUT", "/api/settings", Some(body))
    }

    fn call(
        &self,
        method: &str,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> anyhow::Result<StatusSnapshot> {
        let url = format!("{}{path}", self.base);
        let request = self.agent.request(method, &url);
        let result = match body {
            Some(json) => request
                .set("Content-Type", "application/json")
                .send_string(&json.to_string()),
            None => request.call(),
        };

        let text = match result {
            Ok(resp) => resp.into_string()?,
            Err(ureq::Error::Status(code, resp)) => {
                let text = resp.into_string().unwrap_or_default();
                return Err(anyhow!("{}", server_error(code, &text)));
            }
            Err(ureq::Error::Transport(t)) => {
                return Err(anyhow!(
                    "cannot reach {}: {t} (is `pacer run` running?)",
                    self.base
                ));
            }
        };
        serde_json::from_str(&text).with_context(|| format!("unexpected response from {url}"))
    }
}

/// Pull the `error` field out of an error body, falling back to the raw text.
fn server_error(code: u16, body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());
    if message.is_empty() {
        format!("HTTP {code}")
    } else {
        format!("{message} (HTTP {code})")
    }
}
