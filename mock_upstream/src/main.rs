use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use mock_upstream::{MockConfig, Shape};

#[derive(Parser, Debug)]
struct Args {
    #[clap(short, long, default_value = "8081")]
    port: u16,
    #[clap(short, long, value_enum, default_value = "list")]
    shape: Shape,
    #[clap(long, default_value = "")]
    prefix: String,
    /// Require this exact `Authorization` header value.
    #[clap(long, env = "UPSTREAM_TOKEN", hide_env_values = true)]
    authorization: Option<String>,
    #[clap(long, default_value = "0")]
    delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    tracing::info!(
        "Starting mock upstream on port {} with shape {:?}",
        args.port,
        args.shape
    );

    let config = MockConfig {
        shape: args.shape,
        prefix: args.prefix,
        authorization: args.authorization,
        delay: Duration::from_millis(args.delay_ms),
    };

    let listener = TcpListener::bind(("127.0.0.1", args.port)).await?;
    axum::serve(listener, mock_upstream::router(config))
        .with_graceful_shutdown(mock_upstream::shutdown_signal())
        .await?;

    tracing::info!("Mock upstream shutdown");
    Ok(())
}
