//! Gemini tools: prompt templates over a single `generateContent` call.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::llm::{Completion, CompletionBackend, CompletionRequest, GeminiBackend};
use crate::core::config::Config;
use crate::domains::tools::{
    CapabilityModule, IntegrationError, IntegrationGuard, ParamSpec, ToolArgs, ToolDescriptor,
    ToolError, ToolOutput, ToolResult,
};

pub const INTEGRATION: &str = "Gemini";
pub const PREFIX: &str = "gemini_";
pub const HINT: &str = "Set GEMINI_API_KEY to enable the Gemini tools.";

const SYSTEM: &str = "You are a rigorous research assistant for mathematics and computer science. \
Be precise, state assumptions and say when you are unsure.";

#[derive(Debug, Deserialize)]
struct QueryParams {
    prompt: String,
    context: Option<String>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CodeParams {
    code: String,
    language: Option<String>,
    focus: String,
}

#[derive(Debug, Deserialize)]
struct BrainstormParams {
    topic: String,
    num_ideas: u32,
    constraints: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SummarizeParams {
    text: String,
    length: String,
}

#[derive(Debug, Deserialize)]
struct MathParams {
    problem: String,
    approach: String,
    show_steps: bool,
}

#[derive(Debug, Deserialize)]
struct ReviewParams {
    content: String,
    review_type: String,
}

/// Build the Gemini guard from the configured credential.
pub fn guard(config: &Config) -> IntegrationGuard {
    IntegrationGuard::new(INTEGRATION, PREFIX, HINT, || {
        let key = config
            .credentials
            .gemini_api_key
            .as_deref()
            .ok_or(IntegrationError::missing_credential("GEMINI_API_KEY"))?;
        let backend = GeminiBackend::new(
            key,
            &config.integrations.gemini_api_url,
            &config.integrations.gemini_model,
            config.settings.request_timeout(),
        )?;
        Ok(GeminiTools::module(Arc::new(backend)))
    })
}

pub struct GeminiTools {
    backend: Arc<dyn CompletionBackend>,
}

impl GeminiTools {
    pub const NAMESPACE: &'static str = "gemini";

    pub fn module(backend: Arc<dyn CompletionBackend>) -> CapabilityModule {
        CapabilityModule::builder(Self::NAMESPACE, Arc::new(Self { backend }))
            .tool(
                ToolDescriptor::new("gemini_query", "Ask Gemini a question.")
                    .param(ParamSpec::string("prompt", "The question").required())
                    .param(ParamSpec::string("context", "Background the answer should use"))
                    .param(
                        ParamSpec::number("temperature", "Sampling temperature")
                            .default_value(json!(0.7)),
                    ),
                |tools: Arc<Self>, args: ToolArgs| async move { tools.query(args.parse()?).await },
            )
            .tool(
                ToolDescriptor::new("gemini_analyze_code", "Review code with Gemini.")
                    .param(ParamSpec::string("code", "Code to analyze").required())
                    .param(ParamSpec::string("language", "Programming language"))
                    .param(
                        ParamSpec::string("focus", "What to look at")
                            .default_value(json!("general"))
                            .one_of(&["general", "bugs", "performance", "security", "style"]),
                    ),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    tools.analyze_code(args.parse()?).await
                },
            )
            .tool(
                ToolDescriptor::new("gemini_brainstorm", "Generate ideas on a topic.")
                    .param(ParamSpec::string("topic", "Topic to brainstorm").required())
                    .param(
                        ParamSpec::integer("num_ideas", "How many ideas (1-50)")
                            .default_value(json!(10)),
                    )
                    .param(ParamSpec::string("constraints", "Constraints the ideas must respect")),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    tools.brainstorm(args.parse()?).await
                },
            )
            .tool(
                ToolDescriptor::new("gemini_summarize", "Summarize a text.")
                    .param(ParamSpec::string("text", "Text to summarize").required())
                    .param(
                        ParamSpec::string("length", "Summary length")
                            .default_value(json!("medium"))
                            .one_of(&["brief", "medium", "detailed"]),
                    ),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    tools.summarize(args.parse()?).await
                },
            )
            .tool(
                ToolDescriptor::new("gemini_math_analysis", "Work through a mathematical problem.")
                    .param(ParamSpec::string("problem", "The problem statement").required())
                    .param(
                        ParamSpec::string("approach", "How to attack it")
                            .default_value(json!("analytical"))
                            .one_of(&["analytical", "numerical", "proof", "intuitive"]),
                    )
                    .param(
                        ParamSpec::boolean("show_steps", "Show intermediate steps")
                            .default_value(json!(true)),
                    ),
                |tools: Arc<Self>, args: ToolArgs| async move { tools.math(args.parse()?).await },
            )
            .tool(
                ToolDescriptor::new(
                    "gemini_research_review",
                    "Critically review research writing.",
                )
                .param(ParamSpec::string("content", "Paper, draft or abstract").required())
                .param(
                    ParamSpec::string("review_type", "Kind of review")
                        .default_value(json!("comprehensive"))
                        .one_of(&["comprehensive", "methodology", "literature", "argument"]),
                ),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    tools.review(args.parse()?).await
                },
            )
            .build()
    }

    async fn run(&self, tool: &str, request: CompletionRequest) -> ToolResult {
        let Completion {
            text, model, usage, ..
        } = self.backend.complete(request).await?;
        info!(tool, model = %model, tokens = usage.total_tokens, "Gemini answered");
        Ok(ToolOutput::data(json!({
            "response": text,
            "model": model,
            "usage": usage,
        })))
    }

    async fn query(&self, params: QueryParams) -> ToolResult {
        if !(0.0..=2.0).contains(&params.temperature) {
            return Err(ToolError::invalid_arguments(
                "temperature must be between 0 and 2",
            ));
        }
        let prompt = match params.context {
            Some(context) => format!("Context:\n{}\n\nQuestion:\n{}", context, params.prompt),
            None => params.prompt,
        };
        let request = CompletionRequest::new(prompt)
            .system(SYSTEM)
            .temperature(params.temperature);
        self.run("gemini_query", request).await
    }

    async fn analyze_code(&self, params: CodeParams) -> ToolResult {
        let language = params.language.as_deref().unwrap_or("the detected language");
        let prompt = format!(
            "Analyze the following code written in {}.\nFocus: {}.\n\
             Point out concrete problems with line references and suggest fixes.\n\n```\n{}\n```",
            language, params.focus, params.code
        );
        self.run(
            "gemini_analyze_code",
            CompletionRequest::new(prompt).system(SYSTEM).temperature(0.2),
        )
        .await
    }

    async fn brainstorm(&self, params: BrainstormParams) -> ToolResult {
        if !(1..=50).contains(&params.num_ideas) {
            return Err(ToolError::invalid_arguments("num_ideas must be between 1 and 50"));
        }
        let mut prompt = format!(
            "Brainstorm {} distinct ideas about: {}\nNumber them and give one or two sentences each.",
            params.num_ideas, params.topic
        );
        if let Some(constraints) = params.constraints {
            prompt.push_str(&format!("\nConstraints: {}", constraints));
        }
        self.run(
            "gemini_brainstorm",
            CompletionRequest::new(prompt).system(SYSTEM).temperature(1.0),
        )
        .await
    }

    async fn summarize(&self, params: SummarizeParams) -> ToolResult {
        let instruction = match params.length.as_str() {
            "brief" => "in two or three sentences",
            "detailed" => "in detail, section by section",
            _ => "in one or two paragraphs",
        };
        let prompt = format!("Summarize the following text {}:\n\n{}", instruction, params.text);
        self.run(
            "gemini_summarize",
            CompletionRequest::new(prompt).system(SYSTEM).temperature(0.3),
        )
        .await
    }

    async fn math(&self, params: MathParams) -> ToolResult {
        let steps = if params.show_steps {
            "Show every intermediate step."
        } else {
            "Give the result with a short justification."
        };
        let prompt = format!(
            "Solve the following problem using a {} approach. {}\n\nProblem:\n{}",
            params.approach, steps, params.problem
        );
        self.run(
            "gemini_math_analysis",
            CompletionRequest::new(prompt).system(SYSTEM).temperature(0.1),
        )
        .await
    }

    async fn review(&self, params: ReviewParams) -> ToolResult {
        let focus = match params.review_type.as_str() {
            "methodology" => "the soundness of the methodology",
            "literature" => "coverage of and positioning against prior work",
            "argument" => "the logical structure of the argument",
            _ => "methodology, prior work, argument and presentation",
        };
        let prompt = format!(
            "Review the following research content, concentrating on {}. \
             List strengths, weaknesses and concrete suggestions.\n\n{}",
            focus, params.content
        );
        self.run(
            "gemini_research_review",
            CompletionRequest::new(prompt).system(SYSTEM).temperature(0.4),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::JsonObject;
    use crate::domains::tools::definitions::llm::testing::FakeBackend;
    use serde_json::Value;

    fn args(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_guard_without_key_is_unavailable() {
        let config = Config::with_base_path("/tmp/unused");
        let guard = guard(&config);
        assert!(!guard.is_available());
        assert!(guard.descriptors().is_empty());
        assert!(guard.claims("gemini_query"));
    }

    #[test]
    fn test_guard_with_key_lists_all_tools() {
        let mut config = Config::with_base_path("/tmp/unused");
        config.credentials.gemini_api_key = Some("key".to_string());
        let guard = guard(&config);
        let names: Vec<_> = guard.descriptors().iter().map(|d| d.name().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "gemini_query",
                "gemini_analyze_code",
                "gemini_brainstorm",
                "gemini_summarize",
                "gemini_math_analysis",
                "gemini_research_review"
            ]
        );
        assert!(names.iter().all(|n| n.starts_with(PREFIX)));
    }

    #[tokio::test]
    async fn test_query_with_context() {
        let backend = Arc::new(FakeBackend::default());
        let module = GeminiTools::module(backend.clone());
        let output = module
            .invoke(
                "gemini_query",
                args(json!({"prompt": "What is a group?", "context": "abstract algebra"})),
            )
            .await
            .unwrap();

        let request = backend.last_request();
        assert!(request.prompt.starts_with("Context:\nabstract algebra"));
        assert!(request.system.is_some());
        let envelope = output.into_envelope().to_value();
        assert_eq!(envelope["status"], json!("success"));
        assert_eq!(envelope["data"]["model"], json!("fake-model"));
    }

    #[tokio::test]
    async fn test_brainstorm_bounds() {
        let module = GeminiTools::module(Arc::new(FakeBackend::default()));
        let err = module
            .invoke("gemini_brainstorm", args(json!({"topic": "x", "num_ideas": 0})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_math_prompt_mentions_approach() {
        let backend = Arc::new(FakeBackend::default());
        let module = GeminiTools::module(backend.clone());
        module
            .invoke(
                "gemini_math_analysis",
                args(json!({"problem": "Integrate x^2", "approach": "numerical"})),
            )
            .await
            .unwrap();
        let request = backend.last_request();
        assert!(request.prompt.contains("numerical approach"));
        assert!(request.prompt.contains("Show every intermediate step."));
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let module = GeminiTools::module(Arc::new(FakeBackend::failing("quota exceeded")));
        let err = module
            .invoke("gemini_summarize", args(json!({"text": "long text"})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "quota exceeded");
    }
}
