//! Research gateway MCP server.
//!
//! Exposes a catalog of research tools (local storage, research session
//! coordination, visualization, an Obsidian knowledge vault) and optional
//! integrations (GitHub, Notion, Gemini, Kimi K2, Wolfram|Alpha) to MCP
//! clients. Every call is answered with a uniform JSON response envelope.
//!
//! # Architecture
//!
//! - **core**: configuration, errors, path confinement, the server handler,
//!   startup and transports
//! - **domains::tools**: descriptors, capability modules, integration
//!   guards, the catalog and the dispatcher, plus the tool implementations
//!
//! # Example
//!
//! ```rust,no_run
//! use research_gateway::core::{Config, TransportService, bootstrap};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let transport = TransportService::new(config.transport.clone());
//!     let server = bootstrap(config)?;
//!     transport.run(server).await?;
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod domains;

pub use core::{Config, Error, McpServer, Result, bootstrap};
