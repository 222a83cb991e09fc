//! Server-Sent Events stream of a room.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{self, Stream};

use crate::{
    infrastructure::dto::stream::RoomEventDto,
    ui::{error::ApiError, state::AppState},
};

use super::parse_code;

/// `GET /api/rooms/{code}/events`
///
/// Emits a `snapshot` event right away, then one per change, and a final
/// `deleted` event. The watch lives inside the response stream, so a client
/// disconnect drops it and releases the room channel.
pub async fn room_events(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let code = parse_code(code)?;
    let watch = state
        .watch_room
        .watch(&code, state.shutdown.child_token())
        .await?;
    tracing::info!("SSE observer attached to room '{}'", code);

    let events = stream::unfold(watch, |mut watch| async move {
        let event = RoomEventDto::from(watch.next().await?);
        match Event::default().event(event.name()).json_data(&event) {
            Ok(sse) => Some((Ok::<_, Infallible>(sse), watch)),
            Err(e) => {
                tracing::error!("Failed to encode event for '{}': {}", watch.code(), e);
                None
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
