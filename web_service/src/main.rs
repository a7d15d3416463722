use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use db_service::{DbConfig, DbService};
use shared_lib::env_utils;
use web_service::{build_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::debug!("initializing app state ...");

    let db = DbService::connect(DbConfig::from_env())
        .await
        .context("Failed to set up database")?;
    db.init_tables().await.context("Failed to create call tables")?;
    let db = Arc::new(db);

    let port = env_utils::get_port();
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let host_uri = env_utils::get_host_uri();

    tracing::info!("Starting server at host: {}", host_uri);

    axum::Server::bind(&addr)
        .serve(build_app(AppState { db: db.clone() }).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("error while starting API server")?;

    db.shutdown();
    tracing::info!("Server stopped");

    anyhow::Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
