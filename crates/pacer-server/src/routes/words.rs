use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WordsView {
    pub count: usize,
    pub words: Vec<String>,
    pub source_url: Option<String>,
}

/// GET /api/words: the payload set actions are currently drawn from.
pub async fn get_words(State(app): State<AppState>) -> Result<Json<WordsView>, AppError> {
    let set = app.scheduler.payloads().await?;
    Ok(Json(WordsView {
        count: set.len(),
        words: set.as_slice().to_vec(),
        source_url: app.words_url.clone(),
    }))
}
