//! Wolfram|Alpha validation tool.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::common::{http_client, json_response};
use crate::core::config::Config;
use crate::domains::tools::{
    CapabilityModule, IntegrationError, IntegrationGuard, ParamSpec, ToolArgs, ToolDescriptor,
    ToolError, ToolOutput, ToolResult,
};

pub const INTEGRATION: &str = "Wolfram Alpha";
pub const PREFIX: &str = "wolfram_";
pub const HINT: &str = "Set WOLFRAM_ALPHA_APP_ID to enable Wolfram|Alpha validation.";

/// Pods whose text is reported as the headline result, in order of preference.
const RESULT_PODS: &[&str] = &["Result", "Exact result", "Decimal approximation", "Solution"];

/// Build the Wolfram|Alpha guard from the configured app id.
pub fn guard(config: &Config) -> IntegrationGuard {
    IntegrationGuard::new(INTEGRATION, PREFIX, HINT, || {
        let app_id = config
            .credentials
            .wolfram_app_id
            .as_deref()
            .ok_or(IntegrationError::missing_credential("WOLFRAM_ALPHA_APP_ID"))?;
        let client = WolframClient::new(
            app_id,
            &config.integrations.wolfram_api_url,
            config.settings.request_timeout(),
        )?;
        Ok(WolframTools::module(client))
    })
}

// ============================================================================
// Client
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Pod {
    pub title: String,
    pub text: String,
    pub primary: bool,
}

#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    queryresult: QueryResult,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Value,
    #[serde(default)]
    pods: Vec<RawPod>,
}

#[derive(Debug, Deserialize)]
struct RawPod {
    #[serde(default)]
    title: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    subpods: Vec<RawSubpod>,
}

#[derive(Debug, Deserialize)]
struct RawSubpod {
    #[serde(default)]
    plaintext: String,
}

/// Wolfram|Alpha full results API client.
pub struct WolframClient {
    client: Client,
    base_url: String,
    app_id: String,
}

impl std::fmt::Debug for WolframClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WolframClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl WolframClient {
    pub fn new(
        app_id: &str,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, IntegrationError> {
        Ok(Self {
            client: http_client(timeout, HeaderMap::new())?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            app_id: app_id.to_string(),
        })
    }

    /// Query and return every pod that has plaintext.
    pub async fn query(&self, input: &str) -> Result<Vec<Pod>, ToolError> {
        let response = self
            .client
            .get(format!("{}/query", self.base_url))
            .query(&[
                ("appid", self.app_id.as_str()),
                ("input", input),
                ("output", "json"),
                ("format", "plaintext"),
            ])
            .send()
            .await?;
        let envelope: QueryEnvelope = json_response("Wolfram|Alpha", response).await?;
        let result = envelope.queryresult;

        if let Some(msg) = result.error.get("msg").and_then(|m| m.as_str()) {
            return Err(ToolError::upstream(format!("Wolfram|Alpha error: {}", msg)));
        }
        if !result.success {
            return Err(ToolError::upstream(format!(
                "Wolfram|Alpha could not interpret '{}'",
                input
            )));
        }

        Ok(result
            .pods
            .into_iter()
            .filter_map(|pod| {
                let text = pod
                    .subpods
                    .iter()
                    .map(|s| s.plaintext.trim())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                (!text.is_empty()).then_some(Pod {
                    title: pod.title,
                    text,
                    primary: pod.primary,
                })
            })
            .collect())
    }
}

// ============================================================================
// Tool
// ============================================================================

#[derive(Debug, Deserialize)]
struct ValidateParams {
    expression: String,
    expected: Option<String>,
}

pub struct WolframTools {
    client: WolframClient,
}

impl WolframTools {
    pub const NAMESPACE: &'static str = "wolfram";

    pub fn module(client: WolframClient) -> CapabilityModule {
        CapabilityModule::builder(Self::NAMESPACE, Arc::new(Self { client }))
            .tool(
                ToolDescriptor::new(
                    "wolfram_validate",
                    "Evaluate an expression with Wolfram|Alpha and optionally check it against an expected result.",
                )
                .param(ParamSpec::string("expression", "Expression or question").required())
                .param(ParamSpec::string("expected", "Expected result to check for")),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    tools.validate(args.parse()?).await
                },
            )
            .build()
    }

    #[instrument(skip_all, fields(expression = %params.expression))]
    async fn validate(&self, params: ValidateParams) -> ToolResult {
        if params.expression.trim().is_empty() {
            return Err(ToolError::invalid_arguments("expression must not be empty"));
        }
        let pods = self.client.query(&params.expression).await?;
        debug!("Wolfram|Alpha returned {} pods", pods.len());

        let result = headline(&pods).map(|p| p.text.clone());
        let matches = params
            .expected
            .as_deref()
            .map(|expected| pods.iter().any(|p| contains_normalized(&p.text, expected)));

        let message = match matches {
            Some(true) => "Expected result confirmed",
            Some(false) => "Expected result not found",
            None => "Expression evaluated",
        };

        Ok(ToolOutput::with_message(
            json!({
                "expression": params.expression,
                "result": result,
                "expected": params.expected,
                "matches_expected": matches,
                "pods": pods
                    .iter()
                    .map(|p| json!({ "title": p.title, "text": p.text }))
                    .collect::<Vec<_>>(),
            }),
            message,
        ))
    }
}

fn headline(pods: &[Pod]) -> Option<&Pod> {
    pods.iter().find(|p| p.primary).or_else(|| {
        RESULT_PODS
            .iter()
            .find_map(|title| pods.iter().find(|p| p.title == *title))
    })
}

/// Whitespace- and case-insensitive containment.
fn contains_normalized(haystack: &str, needle: &str) -> bool {
    fn squash(s: &str) -> String {
        s.chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect()
    }
    let needle = squash(needle);
    !needle.is_empty() && squash(haystack).contains(&needle)
}
