// remote-boot-endpoint: Resident agent that wakes and probes local devices
// on behalf of a remote coordinator.
//
// Wires together the config, the device registry and the network
// primitives, then hands control to the reconnect loop until Ctrl-C.

use endpoint::agent::Agent;
use endpoint::config::{self, DEFAULT_CONFIG_PATH};
use endpoint::net::SystemNetwork;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber for structured logging to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "endpoint starting");

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("a rustls crypto provider was already installed");
    }

    // Parse optional --config <path> argument.
    // Defaults to ./endpoint_config.json when not supplied.
    let args: Vec<String> = std::env::args().collect();
    let config_path = match args.iter().position(|a| a == "--config") {
        Some(i) => match args.get(i + 1) {
            Some(p) => PathBuf::from(p),
            None => {
                eprintln!("FATAL: --config requires a path argument");
                std::process::exit(1);
            }
        },
        None => PathBuf::from(DEFAULT_CONFIG_PATH),
    };

    let loaded = config::load_or_create(&config_path);
    if loaded.created {
        info!(path = %config_path.display(), "no config found, wrote default config");
    }
    if let Some(e) = &loaded.error {
        error!(path = %config_path.display(), error = %e, "config unusable, running with defaults");
    }
    let cfg = loaded.config;
    info!(
        address = %cfg.address,
        port = cfg.port,
        targets = cfg.targets.len(),
        "config loaded"
    );

    let net = Arc::new(SystemNetwork::new());
    let agent = Agent::new(&cfg, net);
    info!(url = %agent.url(), "control channel endpoint");

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received ctrl-c, shutting down");
                signal_token.cancel();
            }
            Err(e) => warn!(error = %e, "cannot listen for ctrl-c; running until killed"),
        }
    });

    agent.run(shutdown).await;
    info!("endpoint stopped");
}
