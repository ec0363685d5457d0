//! Research discovery through Perplexity's search-grounded answers.
//!
//! Every tool turns its arguments into one research question, lets the
//! backend search the literature and returns the answer with the sources
//! it cited.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::llm::{CompletionBackend, CompletionRequest, PerplexityBackend, SearchFilter};
use crate::core::config::Config;
use crate::domains::tools::{
    CapabilityModule, IntegrationError, IntegrationGuard, ParamSpec, ToolArgs, ToolDescriptor,
    ToolError, ToolOutput, ToolResult,
};

pub const INTEGRATION: &str = "Perplexity";
pub const PREFIX: &str = "perplexity_";
pub const HINT: &str = "Set PERPLEXITY_API_KEY to enable research discovery.";

const MAX_RESULTS: u32 = 25;

/// Perplexity accepts at most this many domains in a search filter.
const MAX_SOURCE_DOMAINS: usize = 10;

const SYSTEM: &str = "You are a research librarian for mathematics and computer science. \
Cite every paper you mention with its authors, year and a link, and never invent references.";

#[derive(Debug, Deserialize)]
struct DiscoverParams {
    topic: String,
    field: String,
    time_range: String,
    max_results: u32,
    sources: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct PaperParams {
    paper: String,
    focus: String,
}

#[derive(Debug, Deserialize)]
struct RelatedParams {
    reference: String,
    relationship: String,
    max_results: u32,
}

#[derive(Debug, Deserialize)]
struct TrendParams {
    field: String,
    time_period: String,
    focus: Option<String>,
}

/// Build the Perplexity guard from the configured key.
pub fn guard(config: &Config) -> IntegrationGuard {
    IntegrationGuard::new(INTEGRATION, PREFIX, HINT, || {
        let key = config
            .credentials
            .perplexity_api_key
            .as_deref()
            .ok_or(IntegrationError::missing_credential("PERPLEXITY_API_KEY"))?;
        let backend = PerplexityBackend::new(
            key,
            &config.integrations.perplexity_api_url,
            &config.integrations.perplexity_model,
            config.settings.request_timeout(),
        )?;
        Ok(PerplexityTools::module(Arc::new(backend)))
    })
}

pub struct PerplexityTools {
    backend: Arc<dyn CompletionBackend>,
}

impl PerplexityTools {
    pub const NAMESPACE: &'static str = "perplexity";

    pub fn module(backend: Arc<dyn CompletionBackend>) -> CapabilityModule {
        let max_results = || {
            ParamSpec::integer("max_results", "How many papers to return (1-25)")
                .default_value(json!(10))
        };

        CapabilityModule::builder(Self::NAMESPACE, Arc::new(Self { backend }))
            .tool(
                ToolDescriptor::new(
                    "perplexity_discover_research",
                    "Find recent papers and results on a research topic, with sources.",
                )
                .param(ParamSpec::string("topic", "Research topic or question").required())
                .param(
                    ParamSpec::string("field", "Discipline to search in")
                        .default_value(json!("mathematics")),
                )
                .param(
                    ParamSpec::string("time_range", "Only consider work from this period")
                        .default_value(json!("all"))
                        .one_of(&["day", "week", "month", "year", "all"]),
                )
                .param(max_results())
                .param(ParamSpec::string_list(
                    "sources",
                    "Restrict the search to these domains (e.g. arxiv.org)",
                )),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    tools.discover(args.parse()?).await
                },
            )
            .tool(
                ToolDescriptor::new(
                    "perplexity_analyze_paper",
                    "Analyze a paper given its title, DOI, arXiv id or URL.",
                )
                .param(ParamSpec::string("paper", "Title, DOI, arXiv id or URL").required())
                .param(
                    ParamSpec::string("focus", "What the analysis concentrates on")
                        .default_value(json!("comprehensive"))
                        .one_of(&[
                            "comprehensive",
                            "summary",
                            "methodology",
                            "contributions",
                            "limitations",
                        ]),
                ),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    tools.analyze_paper(args.parse()?).await
                },
            )
            .tool(
                ToolDescriptor::new(
                    "perplexity_find_related_work",
                    "Find work related to a paper or topic.",
                )
                .param(ParamSpec::string("reference", "Paper or topic").required())
                .param(
                    ParamSpec::string("relationship", "Which kind of related work")
                        .default_value(json!("all"))
                        .one_of(&["all", "foundational", "follow_up", "competing"]),
                )
                .param(max_results()),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    tools.related_work(args.parse()?).await
                },
            )
            .tool(
                ToolDescriptor::new(
                    "perplexity_track_research_trends",
                    "Summarize what is moving in a research field over a recent period.",
                )
                .param(ParamSpec::string("field", "Research field").required())
                .param(
                    ParamSpec::string("time_period", "Period to look back over")
                        .default_value(json!("month"))
                        .one_of(&["week", "month", "year"]),
                )
                .param(ParamSpec::string("focus", "Sub-area to concentrate on")),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    tools.trends(args.parse()?).await
                },
            )
            .build()
    }

    async fn run(&self, tool: &str, subject: &str, request: CompletionRequest) -> ToolResult {
        let completion = self.backend.complete(request).await?;
        info!(
            tool,
            sources = completion.citations.len(),
            tokens = completion.usage.total_tokens,
            "Perplexity answered"
        );
        let sources = completion.citations.len();
        Ok(ToolOutput::with_message(
            json!({
                "subject": subject,
                "response": completion.text,
                "citations": completion.citations,
                "model": completion.model,
                "usage": completion.usage,
            }),
            format!("{} sources cited", sources),
        ))
    }

    async fn discover(&self, params: DiscoverParams) -> ToolResult {
        let max_results = checked_max_results(params.max_results)?;
        let sources = params.sources.unwrap_or_default();
        if sources.len() > MAX_SOURCE_DOMAINS {
            return Err(ToolError::invalid_arguments(format!(
                "at most {} source domains can be given",
                MAX_SOURCE_DOMAINS
            )));
        }

        let prompt = format!(
            "Find up to {} significant papers or results in {} on: {}\n\
             For each, give the title, authors, year, a link and one sentence on why it matters.",
            max_results, params.field, params.topic
        );
        let search = SearchFilter {
            recency: recency(&params.time_range),
            domains: sources,
        };
        let request = CompletionRequest::new(prompt)
            .system(SYSTEM)
            .temperature(0.2)
            .search(search);
        self.run("perplexity_discover_research", &params.topic, request)
            .await
    }

    async fn analyze_paper(&self, params: PaperParams) -> ToolResult {
        if params.paper.trim().is_empty() {
            return Err(ToolError::invalid_arguments("paper must not be empty"));
        }
        let task = match params.focus.as_str() {
            "summary" => "Summarize its problem, approach and main results.",
            "methodology" => "Explain and assess its methods and proof techniques.",
            "contributions" => "State its contributions and how they advance prior work.",
            "limitations" => "Identify its assumptions, gaps and open problems it leaves.",
            _ => "Cover the problem, methods, main results, contributions and limitations.",
        };
        let prompt = format!("Locate this paper: {}\n{}", params.paper, task);
        let request = CompletionRequest::new(prompt).system(SYSTEM).temperature(0.2);
        self.run("perplexity_analyze_paper", &params.paper, request)
            .await
    }

    async fn related_work(&self, params: RelatedParams) -> ToolResult {
        let max_results = checked_max_results(params.max_results)?;
        let kind = match params.relationship.as_str() {
            "foundational" => "earlier foundational work it builds on",
            "follow_up" => "later work that cites or extends it",
            "competing" => "alternative approaches to the same problem",
            _ => "foundational work, follow-up work and competing approaches",
        };
        let prompt = format!(
            "List up to {} papers that are {} for: {}\n\
             Group them by relationship and say in one sentence how each one relates.",
            max_results, kind, params.reference
        );
        let request = CompletionRequest::new(prompt).system(SYSTEM).temperature(0.2);
        self.run("perplexity_find_related_work", &params.reference, request)
            .await
    }

    async fn trends(&self, params: TrendParams) -> ToolResult {
        let mut prompt = format!(
            "What are the main research trends in {} over the past {}? \
             Name the active problems, notable new results and the groups driving them.",
            params.field, params.time_period
        );
        if let Some(focus) = &params.focus {
            prompt.push_str(&format!("\nConcentrate on {}.", focus));
        }
        let search = SearchFilter {
            recency: recency(&params.time_period),
            domains: Vec::new(),
        };
        let request = CompletionRequest::new(prompt)
            .system(SYSTEM)
            .temperature(0.3)
            .search(search);
        self.run("perplexity_track_research_trends", &params.field, request)
            .await
    }
}

fn checked_max_results(max_results: u32) -> Result<u32, ToolError> {
    if (1..=MAX_RESULTS).contains(&max_results) {
        Ok(max_results)
    } else {
        Err(ToolError::invalid_arguments(format!(
            "max_results must be between 1 and {}",
            MAX_RESULTS
        )))
    }
}

/// Search recency filter for a period; `all` means unrestricted.
fn recency(period: &str) -> Option<String> {
    (period != "all").then(|| period.to_string())
}
