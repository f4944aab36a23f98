mod config;
mod error;
mod extract;
mod handlers;
mod middleware;
mod models;
mod occ;
mod repos;
mod routes;
mod services;
mod state;
mod stores;
#[cfg(test)]
mod test_utils;

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio_util::task::TaskTracker;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    config::Config,
    middleware::admission::AdmissionGate,
    repos::{PgMovieRepo, PgStatusRepo, PgTokenRepo, PgUserRepo, Repos},
    services::{EmailSender, LogEmailSender, SmtpEmailSender},
    state::AppState,
    stores::{ClientRegistry, spawn_reaper},
};

#[derive(Parser)]
#[command(name = "api", version)]
#[command(about = "Greenlight movies API server")]
struct Args {
    /// Run database migrations and exit
    #[arg(long)]
    migrate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider before any TLS operations
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let args = Args::parse();
    let config = envy::prefixed("GREENLIGHT_").from_env::<Config>()?;
    config.validate()?;

    // Initialize Sentry for error tracking (guard must stay alive)
    let _sentry_guard = config.sentry_dsn.as_ref().map(|dsn| {
        sentry::init((
            dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: Some(config.env.clone().into()),
                ..Default::default()
            },
        ))
    });

    // Set up tracing: JSON in production, human-readable otherwise
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.is_production() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init();
    }

    let database = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("connecting to database")?;

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&database).await?;
        tracing::info!("Migrations complete");
        return Ok(());
    }

    let repos = Repos {
        movies: Arc::new(PgMovieRepo::new(database.clone())),
        users: Arc::new(PgUserRepo::new(database.clone())),
        tokens: Arc::new(PgTokenRepo::new(database.clone())),
        status: Arc::new(PgStatusRepo::new(database)),
    };

    let email: Arc<dyn EmailSender> = match config.smtp_url.as_deref() {
        Some(url) => Arc::new(SmtpEmailSender::new(url, &config.smtp_sender)?),
        None => {
            tracing::warn!("GREENLIGHT_SMTP_URL not set, welcome emails will only be logged");
            Arc::new(LogEmailSender)
        }
    };

    let registry = Arc::new(ClientRegistry::new(
        config.limiter_rps,
        config.limiter_burst,
    ));
    let reaper = spawn_reaper(registry.clone(), config.limiter_cleanup_interval());
    let gate = AdmissionGate::new(registry, config.limiter_enabled);

    let tasks = TaskTracker::new();
    let state = AppState {
        config: config.clone(),
        repos,
        email,
        tasks: tasks.clone(),
    };

    let app = routes::router(state, gate);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(
        env = %config.env,
        limiter_enabled = config.limiter_enabled,
        "Listening on {}",
        addr
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    reaper.shutdown().await;

    tracing::info!(pending = tasks.len(), "Waiting for background tasks");
    tasks.close();
    tasks.wait().await;

    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
