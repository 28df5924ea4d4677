use axum::extract::State;
use axum::Json;
use pacer_core::error::PacerError;
use pacer_core::scheduler::parse_setting;
use serde::Deserialize;

use super::status::StatusView;
use crate::error::AppError;
use crate::state::AppState;

/// A setting as typed by the operator: a number, or text such as `""` or `"5"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SettingInput {
    Int(i64),
    Text(String),
    Other(serde_json::Value),
}

impl SettingInput {
    fn parse(&self, name: &str) -> Result<u32, PacerError> {
        let invalid = |shown: String| PacerError::InvalidSetting {
            name: name.to_string(),
            reason: format!("'{shown}' is not a non-negative whole number"),
        };
        match self {
            SettingInput::Int(n) => u32::try_from(*n).map_err(|_| invalid(n.to_string())),
            SettingInput::Text(s) => parse_setting(name, s),
            SettingInput::Other(v) => Err(invalid(v.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SettingsBody {
    #[serde(default)]
    pub pause_threshold: Option<SettingInput>,
    #[serde(default)]
    pub resume_delay_minutes: Option<SettingInput>,
}

/// PUT /api/settings: update the auto-pause threshold and/or resume delay.
///
/// Both values are validated first, then applied as a single write.
pub async fn put_settings(
    State(app): State<AppState>,
    Json(body): Json<SettingsBody>,
) -> Result<Json<StatusView>, AppError> {
    let threshold = body
        .pause_threshold
        .as_ref()
        .map(|v| v.parse("pause_threshold"))
        .transpose()?;
    let delay = body
        .resume_delay_minutes
        .as_ref()
        .map(|v| v.parse("resume_delay_minutes"))
        .transpose()?;

    if threshold.is_none() && delay.is_none() {
        return Err(AppError::bad_request(
            "expected pause_threshold and/or resume_delay_minutes",
        ));
    }
    let status = app.scheduler.update_settings(threshold, delay).await?;
    Ok(Json(status.into()))
}
