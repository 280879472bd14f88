use anyhow::Result;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use footfall::analytics::{StatsService, VisitRecorder};
use footfall::config::{Config, DatabaseBackend, SessionScheme};
use footfall::storage::{PostgresStorage, SqliteStorage, Storage};
use footfall::{api, cursor, tracking};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.database.url);
            Arc::new(SqliteStorage::new(&config.database.url, config.database.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage");
            Arc::new(
                PostgresStorage::new(&config.database.url, config.database.max_connections).await?,
            )
        }
    };

    // Initialize database
    info!("Initializing database...");
    storage.init().await?;
    info!("Database initialized successfully");

    cursor::init_cursor_hmac_key(config.pagination.cursor_hmac_secret.as_deref());

    match config.analytics.session_scheme {
        SessionScheme::Literal => info!("Sessions: one per request"),
        SessionScheme::Bucketed { bucket_minutes } => {
            info!("Sessions: per IP in {}-minute buckets", bucket_minutes)
        }
    }
    if config.analytics.rollup_cache_max_days == 0 {
        info!("Daily rollup cache disabled");
    }

    let recorder = Arc::new(VisitRecorder::new(Arc::clone(&storage), &config.analytics));
    let stats = Arc::new(StatsService::new(Arc::clone(&storage), &config.analytics));

    // Create routers
    let api_router = api::create_api_router(stats, &config.cors);
    let site_router = tracking::create_site_router(recorder, &config.site);

    match config.site.static_dir {
        Some(ref static_dir) => info!("Serving site from directory: {}", static_dir),
        None => info!("No SITE_STATIC_DIR set, site requests are tracked and answered with 404"),
    }

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl-C, shutting down");
            }
            shutdown.cancel();
        }
    });

    // Start API server
    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("API server listening on http://{}", api_addr);
    info!("   - Stats endpoints available at http://{}/api/visit-stats/...", api_addr);

    // Start site server
    let site_addr = format!("{}:{}", config.site_server.host, config.site_server.port);
    let site_listener = tokio::net::TcpListener::bind(&site_addr).await?;
    info!("Tracked site server listening on http://{}", site_addr);

    // Run both servers concurrently
    tokio::try_join!(
        axum::serve(api_listener, api_router)
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .into_future(),
        axum::serve(
            site_listener,
            site_router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .into_future(),
    )?;

    Ok(())
}
