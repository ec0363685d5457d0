//! Configuration management for the gateway.
//!
//! The configuration is assembled once from environment variables (and an
//! optional `.env` file) and then shared by reference with every component.
//! Nothing else in the crate reads the environment.

use super::error::{Error, Result};
use super::transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default maximum size of a file read through the storage tools (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default upstream request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Main configuration structure for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server identification and metadata.
    pub server: ServerConfig,

    /// Filesystem locations used by the tools.
    pub paths: PathsConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Transport configuration.
    pub transport: TransportConfig,

    /// External API credentials, one per optional integration.
    pub credentials: CredentialsConfig,

    /// Per-integration endpoints and model names.
    pub integrations: IntegrationsConfig,

    /// Tool behaviour settings.
    pub settings: SettingsConfig,

    /// Security and path validation configuration.
    pub security: SecurityConfig,
}

/// Server identification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The name of the server as reported to clients.
    pub name: String,

    /// The version of the server.
    pub version: String,
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the synced storage folder; every storage tool path is
    /// relative to it.
    pub storage_base: PathBuf,

    /// Obsidian vault.
    pub vault: PathBuf,

    /// Output directory for rendered animations, diagrams and visuals.
    pub output_dir: PathBuf,

    /// Where vault notes are copied when no destination is given.
    pub knowledge: PathBuf,
}

impl PathsConfig {
    /// Derive every path from the storage base, the way the defaults do.
    pub fn under(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            vault: base.join("Obsidian_Vault"),
            output_dir: base.join("Manim_Outputs"),
            knowledge: base.join("Knowledge"),
            storage_base: base,
        }
    }

    /// Directories the gateway provisions before serving.
    pub fn required_directories(&self) -> [&Path; 2] {
        [self.vault.as_path(), self.output_dir.as_path()]
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    pub level: String,
}

/// Configuration for external API credentials.
///
/// Each credential is independently optional; a missing one only disables
/// the matching integration.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub github_token: Option<String>,
    pub notion_token: Option<String>,
    pub gemini_api_key: Option<String>,
    /// Groq API key, used by the Kimi K2 integration.
    pub groq_api_key: Option<String>,
    pub wolfram_app_id: Option<String>,
    pub perplexity_api_key: Option<String>,
}

/// Custom Debug implementation to redact secrets from logs.
impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redact(value: &Option<String>) -> Option<&'static str> {
            value.as_ref().map(|_| "[REDACTED]")
        }

        f.debug_struct("CredentialsConfig")
            .field("github_token", &redact(&self.github_token))
            .field("notion_token", &redact(&self.notion_token))
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .field("groq_api_key", &redact(&self.groq_api_key))
            .field("wolfram_app_id", &redact(&self.wolfram_app_id))
            .field("perplexity_api_key", &redact(&self.perplexity_api_key))
            .finish()
    }
}

/// Endpoints and model names of the upstream APIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationsConfig {
    pub github_api_url: String,
    pub notion_api_url: String,
    pub gemini_api_url: String,
    pub gemini_model: String,
    pub groq_api_url: String,
    pub kimi_model: String,
    pub wolfram_api_url: String,
    pub perplexity_api_url: String,
    pub perplexity_model: String,
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            github_api_url: "https://api.github.com".to_string(),
            notion_api_url: "https://api.notion.com/v1".to_string(),
            gemini_api_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            gemini_model: "gemini-2.0-flash".to_string(),
            groq_api_url: "https://api.groq.com/openai/v1".to_string(),
            kimi_model: "moonshotai/kimi-k2-instruct".to_string(),
            wolfram_api_url: "https://api.wolframalpha.com/v2".to_string(),
            perplexity_api_url: "https://api.perplexity.ai".to_string(),
            perplexity_model: "sonar-pro".to_string(),
        }
    }
}

/// Tool behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Manim quality preset used when a call does not specify one.
    pub manim_quality: String,

    /// Largest file (in bytes) the read tools will return.
    pub max_file_size: u64,

    /// Upstream HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl SettingsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            manim_quality: "medium_quality".to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Configuration for security and path validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Whether symlinks inside the storage root may point outside it.
    pub allow_symlinks: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allow_symlinks: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let base = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Dropbox");

        Self::with_base_path(base)
    }
}

impl Config {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration with every path derived from `base`.
    pub fn with_base_path(base: impl Into<PathBuf>) -> Self {
        Self {
            server: ServerConfig {
                name: "research-gateway".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            paths: PathsConfig::under(base),
            logging: LoggingConfig {
                level: "info".to_string(),
            },
            transport: TransportConfig::default(),
            credentials: CredentialsConfig::default(),
            integrations: IntegrationsConfig::default(),
            settings: SettingsConfig::default(),
            security: SecurityConfig::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Missing settings fall back to their defaults; a setting that is
    /// present but does not parse is a configuration error.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match env_var("DROPBOX_BASE_PATH") {
            Some(base) => Self::with_base_path(base),
            None => Self::default(),
        };

        if let Some(vault) = env_var("OBSIDIAN_VAULT_PATH") {
            config.paths.vault = PathBuf::from(vault);
        }
        if let Some(output) = env_var("MANIM_OUTPUT_DIR") {
            config.paths.output_dir = PathBuf::from(output);
        }

        if let Some(name) = env_var("MCP_SERVER_NAME") {
            config.server.name = name;
        }
        if let Some(level) = env_var("LOG_LEVEL").or_else(|| env_var("MCP_LOG_LEVEL")) {
            config.logging.level = level;
        }

        config.transport = TransportConfig::from_env()?;

        config.credentials = CredentialsConfig {
            github_token: credential("GITHUB_TOKEN"),
            notion_token: credential("NOTION_TOKEN"),
            gemini_api_key: credential("GEMINI_API_KEY"),
            groq_api_key: credential("GROQ_API_KEY"),
            wolfram_app_id: credential("WOLFRAM_ALPHA_APP_ID"),
            perplexity_api_key: credential("PERPLEXITY_API_KEY"),
        };

        if let Some(model) = env_var("GEMINI_MODEL") {
            config.integrations.gemini_model = model;
        }
        if let Some(model) = env_var("KIMI_K2_MODEL") {
            config.integrations.kimi_model = model;
        }
        if let Some(model) = env_var("PERPLEXITY_MODEL") {
            config.integrations.perplexity_model = model;
        }

        if let Some(quality) = env_var("MANIM_QUALITY") {
            config.settings.manim_quality = quality;
        }
        if let Some(size) = parse_env::<u64>("MAX_FILE_SIZE")? {
            config.settings.max_file_size = size;
        }
        if let Some(timeout) = parse_env::<u64>("REQUEST_TIMEOUT")? {
            if timeout == 0 {
                return Err(Error::config("REQUEST_TIMEOUT must be greater than zero"));
            }
            config.settings.request_timeout_secs = timeout;
        }
        if let Some(allow) = parse_env::<bool>("MCP_ALLOW_SYMLINKS")? {
            config.security.allow_symlinks = allow;
        }

        Ok(config)
    }
}

/// Read a variable, treating empty values as absent.
pub(crate) fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read a credential; template placeholders such as `your_token_here` count
/// as absent.
fn credential(name: &str) -> Option<String> {
    env_var(name).filter(|v| !v.starts_with("your_"))
}

pub(crate) fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>> {
    env_var(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| Error::config(format!("{} has an invalid value: '{}'", name, raw)))
        })
        .transpose()
}

/// Serializes every test that touches the process environment.
#[cfg(test)]
pub(crate) static ENV_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
