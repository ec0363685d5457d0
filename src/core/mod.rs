//! Core infrastructure: configuration, errors, path confinement, the MCP
//! server handler, startup and transports.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod security;
pub mod server;
pub mod transport;

pub use bootstrap::{bootstrap, provision_directories};
pub use config::Config;
pub use error::{Error, Result};
pub use security::{PathSecurityError, resolve_existing, resolve_in_root};
pub use server::McpServer;
pub use transport::{TransportConfig, TransportError, TransportService};
