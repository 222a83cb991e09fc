//! WebSocket stream of a room.

use std::sync::Arc;

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};

use crate::{
    infrastructure::dto::stream::RoomEventDto,
    ui::{error::ApiError, state::AppState},
    usecase::RoomWatch,
};

use super::parse_code;

/// `GET /ws/rooms/{code}`
///
/// The watch is opened before the upgrade, so an absent room is answered
/// with a plain 404 instead of an empty socket.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let code = parse_code(code)?;
    let watch = state
        .watch_room
        .watch(&code, state.shutdown.child_token())
        .await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, watch)))
}

/// Spawns a task that forwards room events to the WebSocket sender.
///
/// The socket is closed once the watch ends (room deleted or shutdown).
fn pusher_loop(
    mut watch: RoomWatch,
    mut sender: SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = watch.next().await {
            let event = RoomEventDto::from(event);
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("Failed to encode event for '{}': {}", watch.code(), e);
                    break;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        if let Err(e) = sender.close().await {
            tracing::debug!("WebSocket of '{}' already closed: {}", watch.code(), e);
        }
    })
}

async fn handle_socket(socket: WebSocket, watch: RoomWatch) {
    let code = watch.code().clone();
    let (sender, mut receiver) = socket.split();
    tracing::info!("WebSocket observer attached to room '{}'", code);

    // Observers are read-only; inbound frames only signal liveness or close.
    let close_code = code.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    tracing::debug!("Observer of '{}' requested close", close_code);
                    break;
                }
                Ok(Message::Ping(_)) => tracing::trace!("Received ping"),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("WebSocket error: {}", e);
                    break;
                }
            }
        }
    });

    let mut send_task = pusher_loop(watch, sender);

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    tracing::info!("WebSocket observer of room '{}' detached", code);
}
