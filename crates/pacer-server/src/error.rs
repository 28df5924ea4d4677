use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pacer_core::error::PacerError;

// ---------------------------------------------------------------------------
// Internal sentinel for explicit 400 errors
// ---------------------------------------------------------------------------

/// Carries an explicit HTTP 400 through the `anyhow::Error` chain.
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }
}

fn status_for(err: &PacerError) -> StatusCode {
    match err {
        PacerError::InvalidSetting { .. } | PacerError::NotInitialized => StatusCode::BAD_REQUEST,
        PacerError::SchedulerStopped | PacerError::PersistenceWriteFailed(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        PacerError::RemoteFetchFailed(_) | PacerError::MalformedPayload(_) => {
            StatusCode::BAD_GATEWAY
        }
        PacerError::Store(_)
        | PacerError::UnsupportedSchema { .. }
        | PacerError::Io(_)
        | PacerError::Yaml(_)
        | PacerError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.downcast_ref::<BadRequestError>().is_some() {
            StatusCode::BAD_REQUEST
        } else if let Some(e) = self.0.downcast_ref::<PacerError>() {
            status_for(e)
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(err: PacerError) -> StatusCode {
        AppError(err.into()).into_response().status()
    }

    #[test]
    fn invalid_setting_maps_to_400() {
        let err = PacerError::InvalidSetting {
            name: "pause_threshold".into(),
            reason: "bad".into(),
        };
        assert_eq!(status(err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn stopped_scheduler_maps_to_503() {
        assert_eq!(status(PacerError::SchedulerStopped), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn write_failure_maps_to_503() {
        assert_eq!(
            status(PacerError::PersistenceWriteFailed("disk full".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn io_error_maps_to_500() {
        let io_err = std::io::Error::other("disk full");
        assert_eq!(status(PacerError::Io(io_err)), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn non_pacer_error_maps_to_500() {
        let response = AppError(anyhow::anyhow!("something unexpected")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn bad_request_constructor_maps_to_400() {
        let response = AppError::bad_request("no settings given").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let ct = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .expect("should have content-type");
        assert!(ct.to_str().unwrap().contains("application/json"));
    }
}
