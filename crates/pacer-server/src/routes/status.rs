use axum::extract::State;
use axum::Json;
use pacer_core::scheduler::{format_remaining, StatusSnapshot};
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

/// A snapshot plus its rendered headline and countdown.
#[derive(Debug, Serialize)]
pub struct StatusView {
    #[serde(flatten)]
    pub status: StatusSnapshot,
    pub headline: String,
    pub progress: String,
    /// Countdown to the scheduled auto-resume, e.g. `4m 5s`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<String>,
}

impl From<StatusSnapshot> for StatusView {
    fn from(status: StatusSnapshot) -> Self {
        let remaining = (status.remaining_pause_millis > 0)
            .then(|| format_remaining(status.remaining_pause_millis));
        Self {
            headline: status.headline(),
            progress: status.progress(),
            remaining,
            status,
        }
    }
}

/// GET /api/status: current scheduler state with a fresh countdown.
pub async fn get_status(State(app): State<AppState>) -> Result<Json<StatusView>, AppError> {
    let status = app.scheduler.refresh_status().await?;
    Ok(Json(status.into()))
}
