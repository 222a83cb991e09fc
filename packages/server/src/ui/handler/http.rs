//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    domain::{DisplayName, MessageId, MessagePayload, entity::FileAttachment},
    infrastructure::dto::http::{
        CreateRoomRequest, CreateRoomResponse, DeleteRoomRequest, JoinRoomRequest, KickRequest,
        LeaveRoomRequest, MessageDto, PinRequest, RoomSnapshotDto, SendMessageRequest,
        TypingRequest, VerifyPasswordRequest, VerifyPasswordResponse,
    },
    ui::{error::ApiError, state::AppState},
    usecase::RoomError,
};

use super::parse_code;

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Create a room
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<CreateRoomResponse>), ApiError> {
    let code = state
        .lifecycle
        .create_room(request.is_private, request.password.as_deref())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateRoomResponse {
            code: code.into_string(),
        }),
    ))
}

/// Get the current snapshot of a room
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<RoomSnapshotDto>, ApiError> {
    let code = parse_code(code)?;
    let room = state
        .lifecycle
        .get_room(&code)
        .await?
        .ok_or(RoomError::NotFound)?;

    // Domain Model から DTO への変換
    Ok(Json(RoomSnapshotDto::from(room)))
}

/// Check a private room's password
pub async fn verify_password(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(request): Json<VerifyPasswordRequest>,
) -> Result<Json<VerifyPasswordResponse>, ApiError> {
    let code = parse_code(code)?;
    let valid = state
        .lifecycle
        .verify_password(&code, request.password.as_deref())
        .await?;
    Ok(Json(VerifyPasswordResponse { valid }))
}

pub async fn join_room(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(request): Json<JoinRoomRequest>,
) -> Result<StatusCode, ApiError> {
    let code = parse_code(code)?;
    // Convert String -> DisplayName (Domain Model)
    let name = DisplayName::new(request.display_name)?;
    state
        .membership
        .join(&code, name, request.avatar_url)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn leave_room(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(request): Json<LeaveRoomRequest>,
) -> Result<StatusCode, ApiError> {
    let code = parse_code(code)?;
    let name = DisplayName::new(request.display_name)?;
    state.membership.leave(&code, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Send a message; classification happens after the response
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageDto>), ApiError> {
    let code = parse_code(code)?;
    let sender = DisplayName::new(request.sender_name)?;
    let file = request.file_url.map(|url| FileAttachment {
        url,
        name: request.file_name,
        mime_type: request.file_type,
    });
    let payload = MessagePayload::new(request.text, file)?;

    let message = state
        .send_message
        .execute(&code, sender, request.avatar_url, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(MessageDto::from(message))))
}

pub async fn typing(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(request): Json<TypingRequest>,
) -> Result<StatusCode, ApiError> {
    let code = parse_code(code)?;
    let name = DisplayName::new(request.user_name)?;
    state.typing.execute(&code, name).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn kick_user(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(request): Json<KickRequest>,
) -> Result<StatusCode, ApiError> {
    let code = parse_code(code)?;
    let admin = DisplayName::new(request.admin_name)?;
    let target = DisplayName::new(request.target_name)?;
    state.membership.kick(&code, &admin, &target).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Pin a message, or clear the pin with `messageId: null`
pub async fn pin_message(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(request): Json<PinRequest>,
) -> Result<StatusCode, ApiError> {
    let code = parse_code(code)?;
    let admin = DisplayName::new(request.admin_name)?;
    let message_id = request.message_id.map(MessageId::new).transpose()?;
    state
        .pin_message
        .execute(&code, &admin, message_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_room(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(request): Json<DeleteRoomRequest>,
) -> Result<StatusCode, ApiError> {
    let code = parse_code(code)?;
    let admin = DisplayName::new(request.admin_name)?;
    state.lifecycle.delete_room(&code, &admin).await?;
    Ok(StatusCode::NO_CONTENT)
}
