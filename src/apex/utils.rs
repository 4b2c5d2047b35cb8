use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Serialize)]
pub struct ErrorMessage {
    pub status: &'static str,
    pub message: String,
}

impl ErrorMessage {
    #[inline]
    pub fn new(_status: StatusCode, message: String) -> Self {
        Self {
            status: "error",
            message,
        }
    }
}

#[derive(Debug)]
pub enum VerboseHTTPError {
    Standard(StatusCode, String),
}

impl IntoResponse for VerboseHTTPError {
    fn into_response(self) -> Response {
        match self {
            Self::Standard(status, message) => {
                let error_message = ErrorMessage::new(status, message);
                (status, axum::Json(error_message)).into_response()
            }
        }
    }
}

/// Failures of the messaging pipeline. All are non-fatal and surfaced to the
/// caller; nothing here is retried automatically.
#[derive(Debug)]
pub enum ChatError {
    /// Compose precondition failed; nothing reached the store.
    Validation(String),
    /// A send for the same conversation is still outstanding.
    InFlight,
    /// Attachment upload failed; no store or ledger mutation happened.
    Upload(String),
    /// Message append or ledger update failed after any upload succeeded.
    Write(String),
    Forbidden(String),
    NotFound(String),
    Unavailable,
}

impl ChatError {
    fn parts(self) -> (StatusCode, String) {
        match self {
            Self::Validation(message) => (StatusCode::BAD_REQUEST, message),
            Self::InFlight => (
                StatusCode::CONFLICT,
                "A message for this conversation is already being sent".to_string(),
            ),
            Self::Upload(message) => (StatusCode::BAD_GATEWAY, message),
            Self::Write(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
            Self::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::Unavailable => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database unavailable".to_string(),
            ),
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let (status, message) = self.parts();
        (status, axum::Json(ErrorMessage::new(status, message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_error_status_mapping() {
        let (status, _) = ChatError::Validation("empty".to_string()).parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = ChatError::InFlight.parts();
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = ChatError::Upload("blob store down".to_string()).parts();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let (status, _) = ChatError::Write("insert failed".to_string()).parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
