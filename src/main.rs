//! Gateway entry point.
//!
//! Loads configuration, initializes logging on stderr, builds the server and
//! serves on the configured transport. Tool calls run one at a time, so a
//! single-threaded runtime is enough.

use anyhow::{Context, Result};
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, fmt};

use research_gateway::core::{Config, TransportService, bootstrap};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_logging("info");
            error!("{}", e);
            return Err(e).context("invalid configuration");
        }
    };

    init_logging(&config.logging.level);

    let transport = TransportService::new(config.transport.clone());
    let server = bootstrap(config).context("failed to build the tool catalog")?;

    transport.run(server).await?;

    info!("Server shutting down");
    Ok(())
}

/// Log to stderr; stdout belongs to the MCP channel.
///
/// `RUST_LOG` directives are honoured on top of the configured level.
fn init_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();
}
