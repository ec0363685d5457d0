//! Transport configuration types.

use serde::{Deserialize, Serialize};

use crate::core::config::env_var;
#[cfg(any(feature = "tcp", feature = "http"))]
use crate::core::config::parse_env;
use crate::core::error::{Error, Result};

/// Which transport the gateway serves on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Standard input/output (default MCP mode).
    #[cfg(feature = "stdio")]
    Stdio,

    /// Line-delimited JSON-RPC over TCP.
    #[cfg(feature = "tcp")]
    Tcp(TcpConfig),

    /// JSON-RPC over HTTP POST.
    #[cfg(feature = "http")]
    Http(HttpConfig),
}

/// TCP transport configuration.
#[cfg(feature = "tcp")]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcpConfig {
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

/// HTTP transport configuration.
#[cfg(feature = "http")]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Path of the JSON-RPC endpoint.
    #[serde(default = "default_rpc_path")]
    pub rpc_path: String,

    /// Allow browser clients from any origin.
    #[serde(default = "default_cors")]
    pub enable_cors: bool,
}

#[cfg(any(feature = "tcp", feature = "http"))]
fn default_host() -> String {
    "127.0.0.1".to_string()
}

#[cfg(feature = "http")]
fn default_rpc_path() -> String {
    "/mcp".to_string()
}

#[cfg(feature = "http")]
fn default_cors() -> bool {
    true
}

impl Default for TransportConfig {
    fn default() -> Self {
        #[cfg(feature = "stdio")]
        {
            return Self::Stdio;
        }

        #[cfg(all(not(feature = "stdio"), feature = "tcp"))]
        {
            return Self::Tcp(TcpConfig::default());
        }

        #[cfg(all(not(feature = "stdio"), not(feature = "tcp"), feature = "http"))]
        {
            return Self::Http(HttpConfig::default());
        }

        #[cfg(not(any(feature = "stdio", feature = "tcp", feature = "http")))]
        {
            compile_error!("At least one transport feature must be enabled: stdio, tcp, or http");
        }
    }
}

#[cfg(feature = "tcp")]
impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: default_host(),
        }
    }
}

#[cfg(feature = "http")]
impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: default_host(),
            rpc_path: default_rpc_path(),
            enable_cors: default_cors(),
        }
    }
}

impl TransportConfig {
    /// Read `MCP_TRANSPORT` and the settings of the selected transport.
    ///
    /// Naming a transport that was not compiled in, or giving a port that
    /// does not parse, is a configuration error.
    pub fn from_env() -> Result<Self> {
        let Some(kind) = env_var("MCP_TRANSPORT").map(|v| v.to_lowercase()) else {
            return Ok(Self::default());
        };

        match kind.as_str() {
            #[cfg(feature = "stdio")]
            "stdio" => Ok(Self::Stdio),
            #[cfg(feature = "tcp")]
            "tcp" => {
                let defaults = TcpConfig::default();
                Ok(Self::Tcp(TcpConfig {
                    port: parse_env("MCP_TCP_PORT")?.unwrap_or(defaults.port),
                    host: env_var("MCP_TCP_HOST").unwrap_or(defaults.host),
                }))
            }
            #[cfg(feature = "http")]
            "http" => {
                let defaults = HttpConfig::default();
                Ok(Self::Http(HttpConfig {
                    port: parse_env("MCP_HTTP_PORT")?.unwrap_or(defaults.port),
                    host: env_var("MCP_HTTP_HOST").unwrap_or(defaults.host),
                    rpc_path: env_var("MCP_HTTP_PATH").unwrap_or(defaults.rpc_path),
                    enable_cors: env_var("MCP_HTTP_CORS")
                        .map(|v| !matches!(v.to_lowercase().as_str(), "false" | "0" | "no"))
                        .unwrap_or(defaults.enable_cors),
                }))
            }
            other => Err(Error::config(format!(
                "MCP_TRANSPORT '{}' is unknown or not compiled in (enable the matching cargo feature)",
                other
            ))),
        }
    }

    /// Description for the startup log.
    pub fn description(&self) -> String {
        match self {
            #[cfg(feature = "stdio")]
            Self::Stdio => "STDIO (standard MCP mode)".to_string(),
            #[cfg(feature = "tcp")]
            Self::Tcp(cfg) => format!("TCP on {}:{}", cfg.host, cfg.port),
            #[cfg(feature = "http")]
            Self::Http(cfg) => format!("HTTP on {}:{}{}", cfg.host, cfg.port, cfg.rpc_path),
        }
    }
}
