/**
 * Ripple Server Entry Point
 *
 * Loads configuration, initializes tracing, builds the application, and
 * serves it alongside the embedded worker and notification bridge.
 *
 * # Exit Codes
 *
 * - 0: normal shutdown
 * - 1: configuration error
 * - 2: startup failure (database unreachable, migration mismatch, bind)
 */

use std::net::SocketAddr;

use ripple::config::{LogFormat, Settings};
use ripple::server::init::{create_app, spawn_background_tasks};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    // The guard must live for the whole process so buffered log lines
    // are flushed on exit
    let _log_guard = init_tracing(&settings);

    let host = settings.host.clone();
    let port = settings.port;

    let (app, state) = match create_app(settings).await {
        Ok(parts) => parts,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            eprintln!("startup failed: {e}");
            std::process::exit(2);
        }
    };

    spawn_background_tasks(&state);

    let addr: SocketAddr = match format!("{host}:{port}").parse() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("invalid bind address {host}:{port}: {e}");
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "bind failed");
            eprintln!("bind failed on {addr}: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!("Listening on {}", addr);

    let serve = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = serve.await {
        tracing::error!(error = %e, "server error");
        std::process::exit(2);
    }

    tracing::info!("Shutdown complete");
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}

/// Initialize the tracing subscriber per LOG_LEVEL / LOG_FORMAT /
/// LOG_FILE. Returns the appender guard when writing to a file or the
/// non-blocking stdout writer.
fn init_tracing(settings: &Settings) -> tracing_appender::non_blocking::WorkerGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone()));

    let (writer, guard) = match &settings.log_file {
        Some(path) => {
            let path = std::path::Path::new(path);
            let directory = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let filename = path.file_name().unwrap_or_else(|| "ripple.log".as_ref());
            let appender = tracing_appender::rolling::never(directory, filename);
            tracing_appender::non_blocking(appender)
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    match settings.log_format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(writer)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(settings.log_file.is_none())
                .init();
        }
    }

    guard
}
