//! Tool-specific error types.

use thiserror::Error;

/// Errors that can occur while resolving or invoking a tool.
///
/// Every variant is converted into a response envelope at the dispatch
/// boundary; none of them is fatal to the process.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The requested tool matches no descriptor and no guard prefix.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The tool belongs to an integration that failed to initialize.
    #[error("{integration} integration not available. {hint}")]
    IntegrationUnavailable {
        integration: String,
        hint: String,
    },

    /// The argument mapping does not satisfy the tool's input schema.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The wrapped integration failed (network, auth, quota, filesystem...).
    #[error("{0}")]
    UpstreamFailure(String),
}

impl ToolError {
    /// Create a new "unknown tool" error.
    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownTool(name.into())
    }

    /// Create a new "integration unavailable" error.
    pub fn unavailable(integration: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::IntegrationUnavailable {
            integration: integration.into(),
            hint: hint.into(),
        }
    }

    /// Create a new "invalid arguments" error.
    pub fn invalid_arguments(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    /// Create a new "upstream failure" error.
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::UpstreamFailure(msg.into())
    }
}

impl From<reqwest::Error> for ToolError {
    fn from(err: reqwest::Error) -> Self {
        Self::UpstreamFailure(format!("Request failed: {}", err))
    }
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        Self::UpstreamFailure(err.to_string())
    }
}

impl From<crate::core::security::PathSecurityError> for ToolError {
    fn from(err: crate::core::security::PathSecurityError) -> Self {
        Self::InvalidArguments(err.to_string())
    }
}

/// Defects detected while composing the tool catalog.
///
/// These are startup defects: the gateway refuses to serve with an
/// inconsistent catalog.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// Two descriptors share the same name.
    #[error("Duplicate tool name '{name}' registered by '{first}' and '{second}'")]
    DuplicateTool {
        name: String,
        first: String,
        second: String,
    },

    /// A descriptor has an empty name.
    #[error("Module '{namespace}' registers a tool with an empty name")]
    EmptyName { namespace: String },

    /// Two integration guards reserve the same namespace prefix.
    #[error("Namespace prefix '{prefix}' is reserved by both '{first}' and '{second}'")]
    DuplicatePrefix {
        prefix: String,
        first: String,
        second: String,
    },
}

/// Reasons an optional integration could not be constructed.
#[derive(Debug, Error)]
pub enum IntegrationError {
    /// The credential the integration needs is not configured.
    #[error("{variable} is not set")]
    MissingCredential { variable: &'static str },

    /// The API client could not be built.
    #[error("Failed to initialize client: {0}")]
    Client(String),
}

impl IntegrationError {
    /// Create a new "missing credential" error.
    pub fn missing_credential(variable: &'static str) -> Self {
        Self::MissingCredential { variable }
    }

    /// Create a new client construction error.
    pub fn client(msg: impl Into<String>) -> Self {
        Self::Client(msg.into())
    }
}

impl From<reqwest::Error> for IntegrationError {
    fn from(err: reqwest::Error) -> Self {
        Self::Client(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for IntegrationError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        Self::Client(format!("invalid credential header: {}", err))
    }
}
