use pacer_core::scheduler::SchedulerHandle;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: SchedulerHandle,
    /// Remote word list URL, reported by `GET /api/words`.
    pub words_url: Option<String>,
}

impl AppState {
    pub fn new(scheduler: SchedulerHandle) -> Self {
        Self {
            scheduler,
            words_url: None,
        }
    }

    pub fn with_words_url(mut self, url: Option<String>) -> Self {
        self.words_url = url;
        self
    }
}
