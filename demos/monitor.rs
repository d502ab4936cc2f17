//! Watch a backend and print its events.
//!
//! ```text
//! cargo run --example monitor -- mythbox.local --tag "91 BuzzOff" --block-shutdown
//! ```
//!
//! Ctrl-C disconnects cleanly; a second Ctrl-C aborts.

use std::time::Duration;

use clap::Parser;
use mythwire_client::{ConnectOptions, ConnectionConfig, Connector, Event, Session};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "monitor", about = "Print events from a MythTV backend")]
struct Args {
    /// Backend host name or address
    host: String,

    /// Protocol version tag, e.g. "91 BuzzOff"
    #[arg(short, long)]
    tag: String,

    /// Backend control port
    #[arg(short, long, default_value_t = 6543)]
    port: u16,

    /// Name announced to the backend (default: local host name)
    #[arg(short, long)]
    name: Option<String>,

    /// Keep the backend from shutting down while connected
    #[arg(long)]
    block_shutdown: bool,

    /// Socket timeout in seconds
    #[arg(long, default_value_t = 4.0)]
    timeout: f64,

    /// Give up connecting after this many seconds
    #[arg(long, default_value_t = 120)]
    budget: u64,

    /// Log raw payloads
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut builder = ConnectionConfig::builder(args.host, args.tag)
        .port(args.port)
        .block_shutdown(args.block_shutdown)
        .receive_timeout(Duration::from_secs_f64(args.timeout))
        .debug(args.debug);
    if let Some(name) = args.name {
        builder = builder.announce_name(name);
    }
    let config = builder.build()?;

    let session = Session::new(config, |event: Event| println!("{}", event))?;
    let mut connector = Connector::new(
        session,
        ConnectOptions {
            budget: Duration::from_secs(args.budget),
            ..ConnectOptions::default()
        },
    );

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let connected = connector
        .connect(&cancel, |progress| {
            tracing::info!("Waiting for backend, {}% of budget left", progress.percent_remaining())
        })
        .await;

    let (handle, task) = connector.into_parts();
    if let Err(e) = connected {
        handle.abort();
        if let Some(task) = task {
            task.await?;
        }
        return Err(e.into());
    }

    tokio::signal::ctrl_c().await?;
    handle.disconnect();

    tokio::select! {
        _ = handle.wait_for_close() => {}
        _ = tokio::signal::ctrl_c() => handle.abort(),
    }

    if let Some(task) = task {
        let reason = task.await?;
        tracing::info!("Session ended: {}", reason);
    }

    Ok(())
}
