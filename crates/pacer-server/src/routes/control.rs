use axum::extract::State;
use axum::Json;

use super::status::StatusView;
use crate::error::AppError;
use crate::state::AppState;

/// POST /api/pause: pause until resumed; drops a pending auto-resume.
pub async fn pause(State(app): State<AppState>) -> Result<Json<StatusView>, AppError> {
    Ok(Json(app.scheduler.pause().await?.into()))
}

/// POST /api/resume: resume now, keeping the repetition count.
pub async fn resume(State(app): State<AppState>) -> Result<Json<StatusView>, AppError> {
    Ok(Json(app.scheduler.resume().await?.into()))
}

/// POST /api/toggle
pub async fn toggle(State(app): State<AppState>) -> Result<Json<StatusView>, AppError> {
    Ok(Json(app.scheduler.toggle().await?.into()))
}
