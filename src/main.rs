//! Photo studio API server.
//!
//! Loads `.env`/environment config, opens the Sled store and serves the REST
//! API until SIGINT/SIGTERM.
//!
//! Usage:
//!   cargo run --bin seed_data    # team roster + admin account
//!   cargo run --bin studio       # start server

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use photo_studio::config::Config;
use photo_studio::rest::{create_router, AppState};
use photo_studio::storage::Storage;

/// Stdout logging (JSON when `LOG_JSON`), plus a daily rolling JSON file under
/// `LOG_DIR`. The returned guard flushes the file writer on drop.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout = if config.log_json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    let (file, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "studio.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file)
        .init();
    guard
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = sigint.recv() => {}
                }
            }
            _ => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let _log_guard = init_tracing(&config);
    config.log_sources();

    if config.uses_dev_secret() {
        warn!("JWT_SECRET not set, signing tokens with the development secret");
    }

    let storage = Storage::open(&config.data_dir)?;
    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let address = config.address();
    info!(
        %address,
        data_dir = %config.data_dir,
        uploads = %config.upload_dir.display(),
        cloudinary = config.cloudinary.is_some(),
        "photo studio API starting"
    );

    let state = AppState::new(storage.clone(), config);
    let app = create_router(state);

    let listener = TcpListener::bind(&address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    storage.flush().await?;
    info!("storage flushed, bye");
    Ok(())
}
