use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use storefront_api::config::{load_config, init_tracing, AppConfig};
use storefront_api::events::EventSender;
use storefront_api::gateway::HttpPaymentGateway;
use storefront_api::notifications::LogNotificationService;
use storefront_api::services::support::{CannedReplyGenerator, HttpReplyGenerator};
use storefront_api::services::{AppServices, ReplyGenerator};
use storefront_api::{create_app, AppState};

#[derive(Parser)]
#[command(name = "storefront-api", version, about = "Storefront backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (the default when no subcommand is given).
    Serve,
    /// Apply pending database migrations and exit.
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = load_config().context("configuration rejected")?;
    init_tracing(cfg.log_level(), cfg.log_json);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cfg).await,
        Command::Migrate => migrate(cfg).await,
    }
}

async fn migrate(cfg: AppConfig) -> anyhow::Result<()> {
    let pool = storefront_api::db::establish_connection_from_app_config(&cfg).await?;
    storefront_api::db::run_migrations(&pool).await?;
    storefront_api::db::close_pool(pool).await?;
    Ok(())
}

async fn serve(cfg: AppConfig) -> anyhow::Result<()> {
    let pool = storefront_api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        storefront_api::db::run_migrations(&pool).await.map_err(|e| {
            error!("failed running migrations: {e}");
            e
        })?;
    }
    let db = Arc::new(pool);

    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = Arc::new(EventSender::new(event_tx));
    tokio::spawn(storefront_api::events::process_events(
        event_rx,
        Arc::new(LogNotificationService),
    ));

    let gateway = Arc::new(HttpPaymentGateway::new(
        cfg.razorpay_base_url.clone(),
        cfg.razorpay_key_id.clone(),
        cfg.razorpay_key_secret.clone(),
    )?);

    // Ticket auto-replies come from the completion service when one is
    // configured, and from the canned responder otherwise.
    let reply: Option<Arc<dyn ReplyGenerator>> = if !cfg.support_autoreply {
        None
    } else {
        match (&cfg.reply_api_url, &cfg.reply_api_key) {
            (Some(url), Some(key)) => {
                info!("ticket auto-replies via completion service");
                Some(Arc::new(HttpReplyGenerator::new(url.clone(), key.clone())?))
            }
            _ => Some(Arc::new(CannedReplyGenerator)),
        }
    };

    let config = Arc::new(cfg);
    let services = AppServices::build(
        db.clone(),
        &config,
        event_sender.clone(),
        gateway,
        reply,
    );

    let state = AppState {
        db,
        config: config.clone(),
        event_sender,
        services,
    };

    let cors = build_cors_layer(&config)?;
    let app = create_app(state, cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("storefront-api listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Explicit origins from config when present; permissive only in
/// development. A production process without origins refuses to start.
fn build_cors_layer(cfg: &AppConfig) -> anyhow::Result<CorsLayer> {
    let configured: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured {
        Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any))
    } else if cfg.should_allow_permissive_cors() {
        info!("permissive CORS enabled outside production");
        Ok(CorsLayer::permissive())
    } else {
        anyhow::bail!("missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
