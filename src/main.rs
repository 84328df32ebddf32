//! Proxy console admission service.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                  PROXY CONSOLE                        │
//!                     │                                                        │
//!  Client Request     │  ┌──────────┐   ┌───────────┐   ┌──────────────┐      │
//!  ───────────────────┼─▶│ request  │──▶│ admission │──▶│ access list  │      │
//!                     │  │ id/trace │   │ rate tier │   │ net + creds  │      │
//!                     │  └──────────┘   └───────────┘   └──────┬───────┘      │
//!                     │                                        │               │
//!                     │                                        ▼               │
//!  Client Response    │  ┌──────────┐   ┌───────────┐   ┌──────────────┐      │
//!  ◀──────────────────┼──│ handlers │◀──│   route   │◀──│   router     │      │
//!                     │  │          │   │   guard   │   │              │      │
//!                     │  └──────────┘   └─────┬─────┘   └──────────────┘      │
//!                     │                       │                                │
//!                     │                       ▼                                │
//!                     │               ┌──────────────┐                         │
//!                     │               │  directory   │                         │
//!                     │               │ roles/perms  │                         │
//!                     │               └──────────────┘                         │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use proxy_console::admission::{AdmissionPipeline, Collaborators};
use proxy_console::config::load_config;
use proxy_console::directory::{BcryptVerifier, MemoryDirectory};
use proxy_console::http::{AppState, HttpServer};
use proxy_console::lifecycle::{signals, startup, Shutdown};
use proxy_console::observability::{logging, metrics};
use proxy_console::security::clock::SystemClock;

#[derive(Parser)]
#[command(name = "proxy-console")]
#[command(about = "Admission front-end for the nginx proxy console", long_about = None)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "CONSOLE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "proxy-console starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        rate_limit_enabled = config.rate_limit.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Metrics exporter not started");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let directory = MemoryDirectory::new(Arc::new(BcryptVerifier));
    startup::seed_directory(&config, &directory).await?;

    let collaborators = Collaborators {
        directory: Arc::new(directory.clone()),
        access_lists: Arc::new(directory.clone()),
        verifier: Arc::new(BcryptVerifier),
    };
    let pipeline = Arc::new(AdmissionPipeline::new(&config, collaborators, Arc::new(SystemClock)));

    let shutdown = Shutdown::new();
    let eviction = pipeline.spawn_eviction(shutdown.sender());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let state = AppState::with_pipeline(pipeline, directory);
    let server = HttpServer::new(config, state);
    let server_shutdown = shutdown.subscribe();
    let server_task = tokio::spawn(async move { server.run(listener, server_shutdown).await });

    signals::wait_for_signal().await;
    shutdown.trigger();

    server_task.await??;
    for task in eviction {
        let _ = task.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
