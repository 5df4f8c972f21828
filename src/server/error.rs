use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use super::services::dlhd_services::DlhdError;
use super::services::transport_services::TransportError;

pub type AppResult<T> = Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    // upstream said no or couldn't be reached
    #[error("{0}")]
    BadGateway(String),

    #[error("internal server error")]
    InternalServerError,

    #[error("{0}")]
    InternalServerErrorWithContext(String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::InternalServerError | Self::InternalServerErrorWithContext(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<DlhdError> for Error {
    fn from(err: DlhdError) -> Self {
        let message = err.to_string();
        match err {
            DlhdError::ChannelIdNotFound(_) => Self::BadRequest(message),
            DlhdError::NoPlayerLinks(_)
            | DlhdError::NoWorkingIframe(_)
            | DlhdError::MissingAuthParameters(_)
            | DlhdError::NoServerKey(_) => Self::NotFound(message),
            DlhdError::Transport(TransportError::InvalidProxy { .. }) => {
                Self::InternalServerErrorWithContext(message)
            }
            // the auth url is built from whatever the iframe handed out
            DlhdError::InvalidUrl(_)
            | DlhdError::AuthRequestFailed(_)
            | DlhdError::Transport(_) => Self::BadGateway(message),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("request failed with {}: {}", status, self);
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
