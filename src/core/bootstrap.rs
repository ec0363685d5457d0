//! Startup sequence.
//!
//! Configuration is loaded by the caller; from there the gateway provisions
//! its working directories, builds every module and guard, composes the
//! catalog and logs what it is about to serve.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use super::config::Config;
use super::error::Result;
use super::server::McpServer;
use crate::domains::tools::build_dispatcher;

/// Create the directories the tools write into.
///
/// Failures are logged and skipped; the affected tools report the problem
/// when they are called. Returns the directories that could not be created.
pub fn provision_directories(config: &Config) -> Vec<PathBuf> {
    let mut failed = Vec::new();
    for dir in config.paths.required_directories() {
        match std::fs::create_dir_all(dir) {
            Ok(()) => info!("Directory ready: {}", dir.display()),
            Err(e) => {
                warn!("Could not create {}: {}", dir.display(), e);
                failed.push(dir.to_path_buf());
            }
        }
    }
    failed
}

/// Build a ready-to-serve server from `config`.
///
/// The only failure is a catalog defect, which must stop the process before
/// any transport is opened.
pub fn bootstrap(config: Config) -> Result<McpServer> {
    info!("Starting {} v{}", config.server.name, config.server.version);
    provision_directories(&config);

    let dispatcher = build_dispatcher(&config)?;

    let integrations = dispatcher
        .guards()
        .iter()
        .map(|g| {
            let state = if g.is_available() { "available" } else { "unavailable" };
            format!("{}={}", g.integration(), state)
        })
        .collect::<Vec<_>>()
        .join(", ");
    info!(
        "Gateway ready: {} tools; integrations: {}",
        dispatcher.catalog().len(),
        integrations
    );

    Ok(McpServer::new(Arc::new(config), dispatcher))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bootstrap_provisions_and_builds() {
        let dir = TempDir::new().unwrap();
        let config = Config::with_base_path(dir.path());

        let server = bootstrap(config).unwrap();
        assert!(dir.path().join("Obsidian_Vault").is_dir());
        assert!(dir.path().join("Manim_Outputs").is_dir());
        assert_eq!(server.tools().len(), 18);
    }

    #[test]
    fn test_provisioning_failure_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();

        // Every path sits under a regular file, so nothing can be created.
        let config = Config::with_base_path(&blocker);
        let failed = provision_directories(&config);
        assert_eq!(failed.len(), 2);

        let server = bootstrap(config).unwrap();
        assert_eq!(server.tools().len(), 18);
    }
}
