use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::resolver::ResolveError;

// Taken from https://github.com/tokio-rs/axum/blob/main/examples/anyhow-error-response/src/main.rs
#[derive(Debug)]
pub struct RelayError {
    pub status: StatusCode,
    pub message: HttpErrorResponse,
}

#[derive(Debug, Serialize)]
pub struct HttpErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl HttpErrorResponse {
    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        HttpErrorResponse {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

impl From<String> for HttpErrorResponse {
    fn from(message: String) -> Self {
        HttpErrorResponse {
            error: message,
            details: None,
        }
    }
}

impl From<&str> for HttpErrorResponse {
    fn from(message: &str) -> Self {
        HttpErrorResponse {
            error: message.to_string(),
            details: None,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let mut res = Json(self.message).into_response();
        *res.status_mut() = self.status;
        res
    }
}

impl<E> From<E> for RelayError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        RelayError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: HttpErrorResponse::from(err.into().to_string()),
        }
    }
}

impl RelayError {
    /// Maps a resolution failure onto the HTTP surface. Not a `From` impl
    /// since the 404 bodies carry the video id as context.
    pub fn from_resolve(video_id: &str, err: ResolveError) -> Self {
        let video_context = format!("Video ID: {video_id}");
        match err {
            ResolveError::TranscriptsDisabled => RelayError {
                status: StatusCode::NOT_FOUND,
                message: HttpErrorResponse::with_details(
                    "Transcripts are disabled for this video.",
                    video_context,
                ),
            },
            ResolveError::NoTranscriptAvailable => RelayError {
                status: StatusCode::NOT_FOUND,
                message: HttpErrorResponse::with_details(
                    "Could not find any transcript for this video",
                    video_context,
                ),
            },
            ResolveError::EmptyTranscript => RelayError {
                status: StatusCode::NOT_FOUND,
                message: HttpErrorResponse::with_details("Empty transcript content", video_context),
            },
            ResolveError::Upstream(details) => RelayError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: HttpErrorResponse::with_details(
                    "An unexpected error occurred fetching transcript",
                    details,
                ),
            },
        }
    }
}

pub type RelayResult<T, E = RelayError> = Result<T, E>;

#[macro_export]
macro_rules! bail_relay {
    ($error_message:expr) => {
        return Err($crate::error::RelayError { status: StatusCode::INTERNAL_SERVER_ERROR, message: $crate::error::HttpErrorResponse::from($error_message) })
    };
    ($status_code:expr, $error_message:expr) => {
        return Err($crate::error::RelayError { status: $status_code, message: $crate::error::HttpErrorResponse::from($error_message) })
    };
    ($status:expr, $fmt:expr $(, $arg:expr)*) => {
        return Err($crate::error::RelayError {
            status: $status,
            message: $crate::error::HttpErrorResponse::from(format!($fmt $(, $arg)*)),
        })
    };
}
