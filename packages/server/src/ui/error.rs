//! Mapping of room errors onto HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{
    domain::ValueObjectError, infrastructure::dto::http::ErrorResponse, usecase::RoomError,
};

/// A `RoomError` on its way to the client.
#[derive(Debug)]
pub struct ApiError(pub RoomError);

impl From<RoomError> for ApiError {
    fn from(err: RoomError) -> Self {
        Self(err)
    }
}

impl From<ValueObjectError> for ApiError {
    fn from(err: ValueObjectError) -> Self {
        Self(RoomError::from(err))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            RoomError::NotFound => StatusCode::NOT_FOUND,
            RoomError::Forbidden(_) => StatusCode::FORBIDDEN,
            RoomError::Validation(_) => StatusCode::BAD_REQUEST,
            RoomError::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            tracing::warn!("Request failed: {}", self.0);
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
