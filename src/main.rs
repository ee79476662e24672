use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use relaycache::cache::Cache;
use relaycache::pipeline::handle_connection;

fn parse_port() -> Result<u16, String> {
    let mut args = std::env::args();
    let prog = args.next().unwrap_or_else(|| "relaycache".to_string());
    let port_arg = args
        .next()
        .ok_or_else(|| format!("usage: {prog} <port>"))?;
    port_arg
        .parse::<u16>()
        .map_err(|_| format!("usage: {prog} <port>"))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let port = match parse_port() {
        Ok(port) => port,
        Err(usage) => {
            eprintln!("{usage}");
            return ExitCode::FAILURE;
        }
    };

    let listener = match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(port, error = %err, "failed to bind listening socket");
            return ExitCode::FAILURE;
        }
    };

    info!(port, "relaycache listening");

    let cache = Arc::new(Cache::new());

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let _ = stream.set_nodelay(true);
                        let cache = Arc::clone(&cache);
                        tokio::spawn(async move {
                            handle_connection(stream, cache, peer).await;
                        });
                    }
                    Err(err) => {
                        // A transient accept failure (e.g. too many open
                        // files) should not bring the dispatcher down.
                        error!(error = %err, "accept failed");
                    }
                }
            }
            _ = shutdown_signal() => {
                info!("shutdown signal received, no longer accepting connections");
                break;
            }
        }
    }

    info!(
        entries = cache.len(),
        bytes = cache.total_bytes(),
        "final cache state"
    );
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
