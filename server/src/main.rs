use clap::Parser;
use log::{info, warn};
use server::auth::HttpAuthenticator;
use server::{manager, routes};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Base URL of the auth/user service
    #[clap(long, default_value = "http://127.0.0.1:3000")]
    auth_url: String,
}

/// Parses command-line arguments, wires up the registry and HTTP surface,
/// and serves until a shutdown signal arrives.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let registry = manager::shared();
    let auth = Arc::new(HttpAuthenticator::new(&args.auth_url));
    let state = routes::AppState::new(Arc::clone(&registry), auth);
    let app = routes::router(state);

    // Periodically clears a waiting slot nobody ever matched with.
    {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            let max_idle = Duration::from_secs(shared::WAITING_SLOT_TIMEOUT_SECS);
            let mut ticker = interval(Duration::from_secs(30));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                registry.lock().await.sweep_waiting(max_idle);
            }
        });
    }

    let address = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("listening on {} (auth service at {})", address, args.auth_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop every live game before exiting so no tick task outlives the
    // listener.
    registry.lock().await.stop_all_games();
    info!("shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => warn!("failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
