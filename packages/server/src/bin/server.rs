//! Ephemeral chat room server.
//!
//! Rooms live in memory by default; `--store redis` shares them (and their
//! change notifications) between several server processes.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin roomcast-server
//! cargo run --bin roomcast-server -- --host 0.0.0.0 --port 3000
//! ROOMCAST_STORE=redis REDIS_URL=redis://127.0.0.1:6379 cargo run --bin roomcast-server
//! ```

use std::{sync::Arc, time::Duration};

use clap::{Parser, ValueEnum};
use roomcast_server::{
    domain::{CodeClassifier, RoomEventPublisher, RoomPolicy, RoomStore},
    infrastructure::{
        classifier::HttpCodeClassifier,
        publisher::{BroadcastRoomEvents, RedisRoomEvents},
        repository::{InMemoryRoomStore, RedisRoomStore},
    },
    ui::{AppState, Server},
    usecase::{ClassificationQueue, RoomLifecycle, UpdateMessageDetailsUseCase},
};
use roomcast_shared::{logger::setup_logger, time::SystemClock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// Single process, rooms vanish on restart
    Memory,
    /// Shared Redis store and Pub/Sub fan-out
    Redis,
}

#[derive(Parser, Debug)]
#[command(name = "roomcast-server")]
#[command(about = "Ephemeral chat room server with real-time fan-out", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, env = "ROOMCAST_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, env = "ROOMCAST_PORT", default_value = "8080")]
    port: u16,

    /// Room store backend
    #[arg(long, env = "ROOMCAST_STORE", value_enum, default_value = "memory")]
    store: StoreKind,

    /// Redis URL for the redis store
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Deadline of a single store call, in milliseconds
    #[arg(long, env = "ROOMCAST_STORE_TIMEOUT_MS", default_value = "2000")]
    store_timeout_ms: u64,

    /// Silence after which an open room stream re-reads the room, in seconds
    #[arg(long, env = "ROOMCAST_LIVENESS_SECS", default_value = "25")]
    liveness_secs: u64,

    /// Interval of the expired-room sweep, in seconds (0 disables it)
    #[arg(long, env = "ROOMCAST_SWEEP_SECS", default_value = "60")]
    sweep_secs: u64,

    /// Endpoint of the code classification service (disabled when unset)
    #[arg(long, env = "ROOMCAST_CLASSIFIER_URL")]
    classifier_url: Option<String>,

    /// Request timeout of the classification service, in milliseconds
    #[arg(long, env = "ROOMCAST_CLASSIFIER_TIMEOUT_MS", default_value = "10000")]
    classifier_timeout_ms: u64,
}

impl Args {
    fn policy(&self) -> RoomPolicy {
        let defaults = RoomPolicy::default();
        // The store must outlive a room by at least two sweeps
        let eviction_grace = defaults
            .eviction_grace
            .max(Duration::from_secs(self.sweep_secs.saturating_mul(2)));
        RoomPolicy {
            eviction_grace,
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            liveness_timeout: Duration::from_secs(self.liveness_secs.max(1)),
            ..defaults
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();
    if let Err(e) = run(args).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = CancellationToken::new();
    let mut workers: Vec<JoinHandle<()>> = Vec::new();

    // Initialize dependencies in order:
    // 1. RoomStore
    // 2. RoomEventPublisher
    // 3. RoomLifecycle (+ expiry sweeper)
    // 4. ClassificationQueue
    // 5. AppState
    // 6. Server

    // 1. & 2. Create the store and the fan-out for the chosen backend
    let local_events = Arc::new(BroadcastRoomEvents::default());
    let (store, publisher): (Arc<dyn RoomStore>, Arc<dyn RoomEventPublisher>) = match args.store {
        StoreKind::Memory => {
            tracing::info!("Using the in-memory room store");
            (
                Arc::new(InMemoryRoomStore::new(Arc::new(SystemClock))),
                local_events,
            )
        }
        StoreKind::Redis => {
            tracing::info!("Using the Redis room store at {}", args.redis_url);
            let store = RedisRoomStore::new(&args.redis_url)?;
            let events = RedisRoomEvents::new(&args.redis_url, local_events)?;
            workers.push(events.spawn_relay(shutdown.child_token()));
            (Arc::new(store), Arc::new(events))
        }
    };

    // 3. Create the lifecycle shared by every use case
    let lifecycle = Arc::new(RoomLifecycle::new(
        store,
        publisher,
        Arc::new(SystemClock),
        args.policy(),
    ));
    if args.sweep_secs > 0 {
        workers.push(
            lifecycle
                .clone()
                .spawn_sweeper(Duration::from_secs(args.sweep_secs), shutdown.child_token()),
        );
    }

    // 4. Start the classification worker when a classifier is configured
    let classification = match &args.classifier_url {
        Some(url) => {
            let classifier: Arc<dyn CodeClassifier> = Arc::new(HttpCodeClassifier::new(
                url,
                Duration::from_millis(args.classifier_timeout_ms),
            )?);
            let (queue, worker) = ClassificationQueue::spawn(
                classifier,
                Arc::new(UpdateMessageDetailsUseCase::new(lifecycle.clone())),
                ClassificationQueue::DEFAULT_CAPACITY,
                shutdown.child_token(),
            );
            workers.push(worker);
            tracing::info!("Code classification enabled ({})", url);
            Some(queue)
        }
        None => {
            tracing::info!("Code classification disabled");
            None
        }
    };

    // 5. & 6. Create and run the server
    let state = Arc::new(AppState::new(lifecycle, classification, shutdown.clone()));
    let result = Server::new(state).run(args.host, args.port).await;

    // Stop background workers whether the server ended cleanly or not
    shutdown.cancel();
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::warn!("Background worker ended abnormally: {}", e);
        }
    }

    result
}
