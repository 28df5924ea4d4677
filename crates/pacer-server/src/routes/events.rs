use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt as _;

use super::status::StatusView;
use crate::state::AppState;

/// GET /api/events: SSE stream emitting a `status` event with the current
/// snapshot on connect and after every scheduler state change.
pub async fn sse_events(
    State(app): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = WatchStream::new(app.scheduler.subscribe()).filter_map(|status| {
        Event::default()
            .event("status")
            .json_data(StatusView::from(status))
            .ok()
            .map(Ok::<Event, Infallible>)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
