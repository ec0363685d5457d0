//! Transport layer.
//!
//! - **STDIO** (feature `stdio`, default): the standard MCP mode
//! - **TCP** (feature `tcp`): line-delimited JSON-RPC, one session per connection
//! - **HTTP** (feature `http`): JSON-RPC over POST, plus `/health` and `/`
//!
//! Every transport hands requests to the same [`McpServer`](crate::core::McpServer).

mod config;
mod error;
mod service;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "tcp")]
pub mod tcp;

#[cfg(feature = "stdio")]
pub mod stdio;

pub use config::TransportConfig;
pub use error::{TransportError, TransportResult};
pub use service::TransportService;

#[cfg(feature = "tcp")]
pub use config::TcpConfig;

#[cfg(feature = "http")]
pub use config::HttpConfig;
