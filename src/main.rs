//! ptycast relay server binary.
//!
//! Resolves configuration (defaults < config file < CLI flags), binds the
//! listener, serves the HTTP/WebSocket API, and logs a stats line on a
//! fixed cadence. Startup failures print one diagnostic line and exit
//! non-zero; after that, nothing a peer does is fatal to the process.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ptycast::api::{self, AppState};
use ptycast::codec::Compression;
use ptycast::config::{Config, ConfigFile};

/// ptycast - terminal sharing relay
///
/// Accepts one runner and any number of browser viewers per session,
/// fanning PTY output out over WebSockets.
#[derive(Parser, Debug)]
#[command(name = "ptycast", version, about, long_about = None)]
struct Args {
    /// HTTP/WebSocket listen port
    #[arg(long)]
    port: Option<u16>,

    /// Shared secret required by runners and viewers
    #[arg(long, env = "PTYCAST_TOKEN")]
    token: Option<String>,

    /// Binary frame codec
    #[arg(long, value_enum)]
    compression: Option<Compression>,

    /// Seconds an exited, viewerless session lingers before deletion
    #[arg(long)]
    session_ttl_secs: Option<u64>,

    /// Seconds between stats log lines
    #[arg(long)]
    stats_interval_secs: Option<u64>,

    /// Maximum simultaneous viewers per session
    #[arg(long)]
    max_viewers: Option<usize>,

    /// TOML config file; CLI flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
}

fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = Config::default();
    if let Some(path) = &args.config {
        let file = ConfigFile::load(path)?;
        config.apply_file(&file);
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(token) = &args.token {
        config.token = token.clone();
    }
    if let Some(compression) = args.compression {
        config.compression = compression;
    }
    if let Some(secs) = args.session_ttl_secs {
        config.session_ttl = Duration::from_secs(secs);
    }
    if let Some(secs) = args.stats_interval_secs {
        config.stats_interval = Duration::from_secs(secs);
    }
    if let Some(max) = args.max_viewers {
        config.max_viewers = max;
    }
    config.validate()?;
    Ok(config)
}

fn spawn_stats_loop(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.stats_interval);
        interval.tick().await; // the first tick fires immediately
        loop {
            interval.tick().await;
            let snap = state.stats.snapshot();
            tracing::info!(
                sessions = state.sessions.len(),
                viewers = state.sessions.total_viewers(),
                in_bps = snap.in_rate,
                out_bps = snap.out_rate,
                in_fps = format_args!("{:.1}", snap.in_fps),
                out_fps = format_args!("{:.1}", snap.out_fps),
                ratio = format_args!("{:.2}", snap.window_ratio),
                ratio_total = format_args!("{:.2}", snap.lifetime_ratio),
                bytes_in = snap.bytes_in,
                bytes_out = snap.bytes_out,
                "stats"
            );
        }
    });
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ptycast=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ptycast: {e}");
            std::process::exit(1);
        }
    };

    if config.token == ptycast::config::DEFAULT_TOKEN {
        tracing::warn!("running with the default token; set --token or PTYCAST_TOKEN");
    }

    let state = AppState::new(config.clone());
    spawn_stats_loop(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("ptycast: failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, compression = %config.compression, "relay listening");

    let app = api::router(state.clone()).into_make_service_with_connect_info::<SocketAddr>();

    // Channel to tell the server to stop accepting connections.
    let (server_shutdown_tx, server_shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                server_shutdown_rx.await.ok();
            })
            .await
    });

    tokio::select! {
        result = &mut server_handle => {
            match result {
                Ok(Ok(())) => return,
                Ok(Err(e)) => {
                    eprintln!("ptycast: server error: {e}");
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("ptycast: server task panicked: {e}");
                    std::process::exit(1);
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    // Close live WebSockets with a normal close frame, then stop the
    // listener and wait for the server to wind down.
    let active = state.shutdown.active_count();
    if active > 0 {
        tracing::info!(active, "signaling clients to disconnect");
        state.shutdown.shutdown();
        state.shutdown.wait_for_all_closed().await;
        tracing::debug!("all clients disconnected");
    }

    let _ = server_shutdown_tx.send(());
    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "server exited with error"),
        Err(e) => tracing::warn!(error = %e, "server task panicked"),
    }
}
