//! Kimi K2 tools, served through Groq's OpenAI-compatible endpoint.
//!
//! These handlers shape their own response envelopes (including failures),
//! and the dispatcher passes them through unchanged.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::llm::{CompletionBackend, CompletionRequest, GroqBackend};
use crate::core::config::Config;
use crate::domains::tools::{
    CapabilityModule, IntegrationError, IntegrationGuard, ParamSpec, ResponseEnvelope, ToolArgs,
    ToolDescriptor, ToolError, ToolOutput,
};

pub const INTEGRATION: &str = "Kimi K2";
pub const PREFIX: &str = "kimi_k2_";
pub const HINT: &str = "Set GROQ_API_KEY to enable the Kimi K2 tools.";

const SYSTEM: &str = "You are Kimi K2, an expert in mathematics, programming and research. \
Answer carefully and show your reasoning when it matters.";

#[derive(Debug, Deserialize)]
struct QueryParams {
    prompt: String,
    system_prompt: Option<String>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CodeParams {
    code: String,
    language: Option<String>,
    analysis_type: String,
}

#[derive(Debug, Deserialize)]
struct MathParams {
    problem: String,
    show_steps: bool,
}

#[derive(Debug, Deserialize)]
struct SummaryParams {
    content: String,
    focus: Option<String>,
}

/// Build the Kimi K2 guard from the configured Groq key.
pub fn guard(config: &Config) -> IntegrationGuard {
    IntegrationGuard::new(INTEGRATION, PREFIX, HINT, || {
        let key = config
            .credentials
            .groq_api_key
            .as_deref()
            .ok_or(IntegrationError::missing_credential("GROQ_API_KEY"))?;
        let backend = GroqBackend::new(
            key,
            &config.integrations.groq_api_url,
            &config.integrations.kimi_model,
            config.settings.request_timeout(),
        )?;
        Ok(KimiTools::module(Arc::new(backend)))
    })
}

pub struct KimiTools {
    backend: Arc<dyn CompletionBackend>,
}

impl KimiTools {
    pub const NAMESPACE: &'static str = "kimi_k2";

    pub fn module(backend: Arc<dyn CompletionBackend>) -> CapabilityModule {
        CapabilityModule::builder(Self::NAMESPACE, Arc::new(Self { backend }))
            .tool(
                ToolDescriptor::new("kimi_k2_query", "Ask Kimi K2 a question.")
                    .param(ParamSpec::string("prompt", "The question").required())
                    .param(ParamSpec::string("system_prompt", "Replace the default system prompt"))
                    .param(
                        ParamSpec::number("temperature", "Sampling temperature")
                            .default_value(json!(0.6)),
                    )
                    .param(
                        ParamSpec::integer("max_tokens", "Maximum answer length in tokens")
                            .default_value(json!(4096)),
                    ),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    Ok::<_, ToolError>(tools.query(args.parse()?).await)
                },
            )
            .tool(
                ToolDescriptor::new("kimi_k2_analyze_code", "Analyze code with Kimi K2.")
                    .param(ParamSpec::string("code", "Code to analyze").required())
                    .param(ParamSpec::string("language", "Programming language"))
                    .param(
                        ParamSpec::string("analysis_type", "Kind of analysis")
                            .default_value(json!("comprehensive"))
                            .one_of(&["comprehensive", "bugs", "optimization", "explanation"]),
                    ),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    Ok::<_, ToolError>(tools.analyze_code(args.parse()?).await)
                },
            )
            .tool(
                ToolDescriptor::new(
                    "kimi_k2_math_reasoning",
                    "Solve a mathematical problem step by step.",
                )
                .param(ParamSpec::string("problem", "The problem statement").required())
                .param(
                    ParamSpec::boolean("show_steps", "Show the reasoning")
                        .default_value(json!(true)),
                ),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    Ok::<_, ToolError>(tools.math(args.parse()?).await)
                },
            )
            .tool(
                ToolDescriptor::new(
                    "kimi_k2_research_summary",
                    "Summarize research content and its key findings.",
                )
                .param(ParamSpec::string("content", "Research content").required())
                .param(ParamSpec::string("focus", "Aspect to emphasize")),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    Ok::<_, ToolError>(tools.summary(args.parse()?).await)
                },
            )
            .build()
    }

    /// Run a completion and shape the envelope, success or not.
    async fn run(&self, tool: &str, request: CompletionRequest) -> ToolOutput {
        let envelope = match self.backend.complete(request).await {
            Ok(completion) => {
                info!(tool, tokens = completion.usage.total_tokens, "Kimi K2 answered");
                ResponseEnvelope::success_with_message(
                    json!({
                        "response": completion.text,
                        "model": completion.model,
                        "usage": completion.usage,
                    }),
                    format!("{} completed", tool),
                )
            }
            Err(e) => {
                warn!(tool, "Kimi K2 request failed: {}", e);
                ResponseEnvelope::failure(tool, format!("Kimi K2 request failed: {}", e))
            }
        };
        ToolOutput::Envelope(envelope)
    }

    async fn query(&self, params: QueryParams) -> ToolOutput {
        if !(0.0..=2.0).contains(&params.temperature) {
            return ToolOutput::Envelope(ResponseEnvelope::failure(
                "kimi_k2_query",
                "temperature must be between 0 and 2",
            ));
        }
        let request = CompletionRequest::new(params.prompt)
            .system(params.system_prompt.unwrap_or_else(|| SYSTEM.to_string()))
            .temperature(params.temperature)
            .max_tokens(params.max_tokens.clamp(1, 16_384));
        self.run("kimi_k2_query", request).await
    }

    async fn analyze_code(&self, params: CodeParams) -> ToolOutput {
        let task = match params.analysis_type.as_str() {
            "bugs" => "Find bugs and explain how to fix each one.",
            "optimization" => "Find performance problems and propose faster alternatives.",
            "explanation" => "Explain what the code does, block by block.",
            _ => "Review correctness, performance, readability and security.",
        };
        let prompt = format!(
            "{}\nLanguage: {}\n\n```\n{}\n```",
            task,
            params.language.as_deref().unwrap_or("unspecified"),
            params.code
        );
        self.run(
            "kimi_k2_analyze_code",
            CompletionRequest::new(prompt).system(SYSTEM).temperature(0.2),
        )
        .await
    }

    async fn math(&self, params: MathParams) -> ToolOutput {
        let style = if params.show_steps {
            "Reason step by step, justify each step, then state the final answer."
        } else {
            "State the final answer with a brief justification."
        };
        let prompt = format!("{}\n\nProblem:\n{}", style, params.problem);
        self.run(
            "kimi_k2_math_reasoning",
            CompletionRequest::new(prompt).system(SYSTEM).temperature(0.1),
        )
        .await
    }

    async fn summary(&self, params: SummaryParams) -> ToolOutput {
        let mut prompt = String::from(
            "Summarize the research below: main question, method, key findings and open problems.",
        );
        if let Some(focus) = &params.focus {
            prompt.push_str(&format!(" Emphasize {}.", focus));
        }
        prompt.push_str("\n\n");
        prompt.push_str(&params.content);
        self.run(
            "kimi_k2_research_summary",
            CompletionRequest::new(prompt).system(SYSTEM).temperature(0.3),
        )
        .await
    }
}
