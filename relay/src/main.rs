use std::fmt::Debug;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use inference_client::{Client, ClientConfig};
use relay::Relay;

#[derive(Parser)]
#[clap(about = "Relays chat messages to a text-generation inference API")]
struct Args {
    #[clap(short, long, env = "RELAY_ADDRESS", default_value = "127.0.0.1:5000")]
    address: String,
    #[clap(long, env = "UPSTREAM_URL")]
    upstream_url: String,
    /// Sent verbatim as the `Authorization` header.
    #[clap(long, env = "UPSTREAM_TOKEN", hide_env_values = true)]
    upstream_token: String,
    #[clap(long, env = "UPSTREAM_TIMEOUT_SECS", default_value = "30")]
    timeout_secs: u64,
    #[clap(long, env = "UPSTREAM_CONNECT_TIMEOUT_SECS", default_value = "10")]
    connect_timeout_secs: u64,
}

impl Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("address", &self.address)
            .field("upstream_url", &self.upstream_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the environment may already carry everything.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Ok(path) = &dotenv {
        tracing::info!("Loaded environment from {}", path.display());
    } else if let Some(e) = dotenv_problem(&dotenv) {
        tracing::warn!("Ignoring .env that could not be loaded: {}", e);
    }

    let args = Args::parse();
    tracing::info!("args: {:?}", &args);

    let client = Client::new(ClientConfig {
        url: args.upstream_url.clone(),
        authorization: args.upstream_token.clone(),
        timeout: Duration::from_secs(args.timeout_secs),
        connect_timeout: Duration::from_secs(args.connect_timeout_secs),
    })
    .context("failed to build inference client")?;
    tracing::info!("Relaying to {}", client.url());

    let app = relay::app(Relay::new(client));

    let listener = TcpListener::bind(&args.address)
        .await
        .with_context(|| format!("failed to bind {}", args.address))?;
    tracing::info!("Listening on {}", &args.address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server shutdown");

    Ok(())
}

/// A load failure worth reporting; an absent `.env` is not one.
fn dotenv_problem(result: &dotenvy::Result<PathBuf>) -> Option<&dotenvy::Error> {
    match result {
        Err(e) if !e.not_found() => Some(e),
        _ => None,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {:?}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {:?}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
