use std::io;

use axum::response::{IntoResponse, Response};
use http::StatusCode;

/// Failures recovered inside a session. None of them reach the transport,
/// they are logged with the device identity and the session carries on.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("pipeline for {device} failed to start: {source}")]
    PipelineStart {
        device: String,
        #[source]
        source: io::Error,
    },
    #[error("pipeline for {device} failed: {reason}")]
    PipelineRuntime { device: String, reason: String },
    #[error("device {0} was claimed by a newer connection")]
    ResourceConflict(String),
}

#[derive(Debug)]
pub enum AppError {
    DeviceNotFound(String),
    DeviceNotConnected(String),
    BadRequest(String),
    InternalServerError(anyhow::Error),
}

impl AppError {
    pub fn device_not_found<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::DeviceNotFound(t.to_string())
    }

    pub fn device_not_connected<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::DeviceNotConnected(t.to_string())
    }

    pub fn bad_request<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::BadRequest(t.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::DeviceNotFound(err) => (StatusCode::NOT_FOUND, err).into_response(),
            AppError::DeviceNotConnected(err) => (StatusCode::CONFLICT, err).into_response(),
            AppError::BadRequest(err) => (StatusCode::BAD_REQUEST, err).into_response(),
            AppError::InternalServerError(err) => {
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
            }
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        AppError::InternalServerError(err.into())
    }
}
