//! Server execution logic.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use super::{
    handler::{
        create_room, delete_room, get_room, health_check, join_room, kick_user, leave_room,
        pin_message, room_events, send_message, typing, verify_password, websocket_handler,
    },
    signal::shutdown_signal,
    state::AppState,
};

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // ストリーミングエンドポイント
        .route("/ws/rooms/{code}", get(websocket_handler))
        .route("/api/rooms/{code}/events", get(room_events))
        // HTTP エンドポイント
        .route("/api/health", get(health_check))
        .route("/api/rooms", post(create_room))
        .route("/api/rooms/{code}", get(get_room).delete(delete_room))
        .route("/api/rooms/{code}/verify", post(verify_password))
        .route("/api/rooms/{code}/join", post(join_room))
        .route("/api/rooms/{code}/leave", post(leave_room))
        .route("/api/rooms/{code}/messages", post(send_message))
        .route("/api/rooms/{code}/typing", post(typing))
        .route("/api/rooms/{code}/kick", post(kick_user))
        .route("/api/rooms/{code}/pin", post(pin_message))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Room server
///
/// # Example
///
/// ```ignore
/// let server = Server::new(Arc::new(AppState::new(lifecycle, None, shutdown)));
/// server.run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Run the server until a shutdown signal arrives
    ///
    /// On shutdown the state's `shutdown` token is cancelled, which ends every
    /// open room stream so the graceful shutdown can complete.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let app = router(self.state.clone());

        // Bind the server to the host and port
        let bind_addr = format!("{}:{}", host, port);
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

        tracing::info!("Room server listening on {}", listener.local_addr()?);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        let shutdown = self.state.shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                shutdown.cancel();
            })
            .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }
}
