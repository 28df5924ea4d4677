use crate::client::DaemonClient;
use crate::output::{print_fields, print_json};
use anyhow::Context;
use pacer_core::config::Config;
use pacer_core::scheduler::{parse_setting, StatusSnapshot};
use std::path::Path;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub fn status(root: &Path, url: Option<&str>, json: bool) -> anyhow::Result<()> {
    let snapshot = client(root, url)?.status()?;
    render(&snapshot, json)
}

pub fn pause(root: &Path, url: Option<&str>, json: bool) -> anyhow::Result<()> {
    let snapshot = client(root, url)?.post("/api/pause")?;
    render(&snapshot, json)
}

pub fn resume(root: &Path, url: Option<&str>, json: bool) -> anyhow::Result<()> {
    let snapshot = client(root, url)?.post("/api/resume")?;
    render(&snapshot, json)
}

pub fn toggle(root: &Path, url: Option<&str>, json: bool) -> anyhow::Result<()> {
    let snapshot = client(root, url)?.post("/api/toggle")?;
    render(&snapshot, json)
}

/// Validate locally, then send both settings in one request so the daemon
/// applies all or nothing.
pub fn set(
    root: &Path,
    url: Option<&str>,
    pause_after: Option<&str>,
    resume_after: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    if pause_after.is_none() && resume_after.is_none() {
        anyhow::bail!("nothing to set: pass --pause-after and/or --resume-after");
    }

    let mut body = serde_json::Map::new();
    if let Some(raw) = pause_after {
        let n = parse_setting("pause_threshold", raw)?;
        body.insert("pause_threshold".into(), n.into());
    }
    if let Some(raw) = resume_after {
        let n = parse_setting("resume_delay_minutes", raw)?;
        body.insert("resume_delay_minutes".into(), n.into());
    }

    let snapshot = client(root, url)?.put_settings(body.into())?;
    render(&snapshot, json)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn client(root: &Path, url: Option<&str>) -> anyhow::Result<DaemonClient> {
    if let Some(url) = url {
        return Ok(DaemonClient::new(url));
    }
    let config = Config::load_or_default(root).context("failed to load config")?;
    Ok(DaemonClient::new(&format!(
        "http://127.0.0.1:{}",
        config.server.port
    )))
}

fn render(snapshot: &StatusSnapshot, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(snapshot);
    }
    print_fields(&describe(snapshot));
    Ok(())
}

fn describe(s: &StatusSnapshot) -> Vec<(&'static str, String)> {
    let or_dash = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
    let mut fields = vec![
        ("status", s.headline()),
        ("repetitions", s.progress()),
        (
            "resume after",
            match s.resume_delay_minutes {
                0 => "off".to_string(),
                m => format!("{m}m"),
            },
        ),
        ("last word", or_dash(s.last_payload.clone())),
        (
            "last action",
            or_dash(s.last_action_at.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())),
        ),
        ("words", s.payload_count.to_string()),
    ];
    if let Some(until) = s.pause_until {
        fields.insert(1, ("resumes at", until.format("%Y-%m-%d %H:%M:%S UTC").to_string()));
    }
    if let Some(note) = &s.note {
        fields.push(("note", note.clone()));
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacer_core::scheduler::Phase;

    #[test]
    fn describe_running_snapshot() {
        let snap = StatusSnapshot {
            repetition_count: 2,
            pause_threshold: 5,
            payload_count: 30,
            last_payload: Some("zebra".into()),
            ..StatusSnapshot::default()
        };
        let fields = describe(&snap);
        assert_eq!(fields[0], ("status", "Running".to_string()));
        assert!(fields.contains(&("repetitions", "2/5".to_string())));
        assert!(fields.contains(&("resume after", "off".to_string())));
        assert!(fields.contains(&("last word", "zebra".to_string())));
        assert!(fields.contains(&("last action", "-".to_string())));
        assert!(!fields.iter().any(|(k, _)| *k == "resumes at"));
    }

    #[test]
    fn describe_scheduled_pause_shows_countdown() {
        let until = chrono::DateTime::from_timestamp_millis(1_700_000_125_000).unwrap();
        let snap = StatusSnapshot {
            phase: Phase::PausedScheduled {
                until: until.timestamp_millis(),
            },
            is_paused: true,
            resume_delay_minutes: 5,
            remaining_pause_millis: 125_000,
            pause_until: Some(until),
            note: Some("Auto-paused at 5".into()),
            ..StatusSnapshot::default()
        };
        let fields = describe(&snap);
        assert_eq!(fields[0], ("status", "Paused (resumes in 2m 5s)".to_string()));
        assert_eq!(fields[1], ("resumes at", "2023-11-14 22:15:25 UTC".to_string()));
        assert!(fields.contains(&("resume after", "5m".to_string())));
        assert_eq!(fields.last(), Some(&("note", "Auto-paused at 5".to_string())));
    }
}
