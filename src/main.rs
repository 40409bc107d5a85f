use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use checkin_tracker::{
    AppState,
    admission::AdmissionController,
    config::{Config, StoreBackend},
    database::{LocationStore, MemoryLocationStore, PostgresLocationStore, RedisLocationStore},
    routes,
    tracker::UserTracker,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(store = config.store.name(), "Starting check-in tracker");

    let store = connect_store(&config.store).await;
    let admission = AdmissionController::new(config.admission_capacity);
    let tracker = UserTracker::new(store, admission.clone(), config.stream_batch_size);

    let state = AppState {
        tracker,
        config: config.clone(),
    };
    let app = routes::router(state);

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!(
        admission_capacity = config.admission_capacity,
        batch_size = config.stream_batch_size,
        "Server listening on {}",
        addr
    );

    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app,
    )
    .with_graceful_shutdown(shutdown_signal(admission))
    .await
    .expect("Failed to start server");

    tracing::info!("Server stopped");
}

async fn connect_store(backend: &StoreBackend) -> Arc<dyn LocationStore> {
    match backend {
        StoreBackend::Postgres {
            url,
            max_connections,
        } => {
            let pool = PgPoolOptions::new()
                .max_connections(*max_connections)
                .after_connect(|conn, _meta| {
                    Box::pin(async move {
                        conn.execute("SET application_name = 'checkin_tracker';")
                            .await?;
                        Ok(())
                    })
                })
                .connect(url)
                .await
                .expect("Failed to connect to Postgres");
            Arc::new(PostgresLocationStore::new(pool))
        }
        StoreBackend::Redis { url } => Arc::new(
            RedisLocationStore::connect(url)
                .await
                .expect("Failed to connect to Redis"),
        ),
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; check-ins are lost on restart");
            Arc::new(MemoryLocationStore::new())
        }
    }
}

async fn shutdown_signal(admission: AdmissionController) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
        tracing::info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    admission.close();
}
