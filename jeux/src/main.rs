use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jeux::config::Cli;
use jeux::service::run_connection;
use jeux::state::ServerState;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_filter = match &cli.log_filter {
        Some(filter) => tracing_subscriber::EnvFilter::new(filter),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
    };

    tracing_subscriber::registry()
        .with(log_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true),
        )
        .init();

    let state = Arc::new(ServerState::new(cli.max_connections));

    let listener = match TcpListener::bind(("0.0.0.0", cli.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(port = cli.port, ?err, "failed to bind listen socket");
            std::process::exit(1);
        }
    };
    tracing::info!(port = cli.port, "jeux listening");

    #[cfg(unix)]
    let mut hangup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        .expect("failed to install SIGHUP handler");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _addr) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::warn!(?err, "failed to accept connection");
                        continue;
                    }
                };
                let state = state.clone();
                tokio::spawn(async move {
                    run_connection(stream, state).await;
                });
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT, draining connections before exit");
                break;
            }
            #[cfg(unix)]
            _ = hangup.recv() => {
                tracing::info!("received SIGHUP, draining connections before exit");
                break;
            }
        }
    }

    state.clients.shutdown_all().await;
    state.clients.wait_for_empty().await;
    tracing::info!("all connections drained, exiting");
}
