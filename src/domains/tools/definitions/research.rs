//! Research coordination tools.
//!
//! Sessions live in memory for the lifetime of the process. Each one tracks a
//! topic, its objectives, the agents assigned to it and the workflow steps
//! recorded so far.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::domains::tools::{
    CapabilityModule, ParamSpec, ToolArgs, ToolDescriptor, ToolError, ToolOutput, ToolResult,
};

/// Agents assigned to a session when the caller names none.
pub const DEFAULT_AGENTS: &[&str] = &["literature", "analysis", "visualization", "synthesis"];

/// Workflow steps, in their natural order.
pub const WORKFLOW_STEPS: &[&str] = &[
    "planning",
    "literature_review",
    "analysis",
    "visualization",
    "synthesis",
    "complete",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSession {
    pub id: String,
    pub topic: String,
    pub objectives: Vec<String>,
    pub agents: Vec<String>,
    pub status: SessionStatus,
    pub steps: Vec<WorkflowStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResearchSession {
    fn new(topic: String, objectives: Vec<String>, agents: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            topic,
            objectives,
            agents,
            status: SessionStatus::Active,
            steps: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn current_step(&self) -> Option<&str> {
        self.steps.last().map(|s| s.step.as_str())
    }

    /// Share of the workflow covered by the furthest step recorded.
    fn progress(&self) -> f64 {
        let furthest = self
            .steps
            .iter()
            .filter_map(|s| WORKFLOW_STEPS.iter().position(|w| *w == s.step))
            .max();
        match furthest {
            Some(index) => (index + 1) as f64 / WORKFLOW_STEPS.len() as f64,
            None => 0.0,
        }
    }

    fn summary(&self) -> serde_json::Value {
        json!({
            "session": self,
            "current_step": self.current_step(),
            "progress": self.progress(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct InitiateParams {
    topic: String,
    objectives: Option<Vec<String>>,
    agents: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct WorkflowParams {
    session_id: String,
    step: String,
    details: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusParams {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct AgentParams {
    session_id: String,
    action: String,
    agent: Option<String>,
}

/// In-memory session store shared by the research tools.
#[derive(Debug, Default)]
pub struct ResearchTools {
    sessions: RwLock<HashMap<String, ResearchSession>>,
}

impl ResearchTools {
    pub const NAMESPACE: &'static str = "research";

    pub fn module() -> CapabilityModule {
        CapabilityModule::builder(Self::NAMESPACE, Arc::new(Self::default()))
            .tool(
                ToolDescriptor::new(
                    "initiate_research_session",
                    "Start a research session on a topic and assign agents to it.",
                )
                .param(ParamSpec::string("topic", "Research topic").required())
                .param(ParamSpec::string_list("objectives", "Research objectives"))
                .param(ParamSpec::string_list(
                    "agents",
                    "Agents to assign (defaults to literature, analysis, visualization, synthesis)",
                )),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    tools.initiate(args.parse()?).await
                },
            )
            .tool(
                ToolDescriptor::new(
                    "coordinate_workflow",
                    "Record the next workflow step of a research session.",
                )
                .param(ParamSpec::string("session_id", "Session identifier").required())
                .param(
                    ParamSpec::string("step", "Workflow step")
                        .required()
                        .one_of(WORKFLOW_STEPS),
                )
                .param(ParamSpec::string("details", "Notes about this step")),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    tools.coordinate(args.parse()?).await
                },
            )
            .tool(
                ToolDescriptor::new(
                    "get_session_status",
                    "Show a research session with its current step and progress.",
                )
                .param(ParamSpec::string("session_id", "Session identifier").required()),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    tools.status(args.parse()?).await
                },
            )
            .tool(
                ToolDescriptor::new("manage_agents", "List, add or remove a session's agents.")
                    .param(ParamSpec::string("session_id", "Session identifier").required())
                    .param(
                        ParamSpec::string("action", "What to do")
                            .default_value(json!("list"))
                            .one_of(&["list", "add", "remove"]),
                    )
                    .param(ParamSpec::string("agent", "Agent name for add/remove")),
                |tools: Arc<Self>, args: ToolArgs| async move {
                    tools.manage_agents(args.parse()?).await
                },
            )
            .build()
    }

    async fn initiate(&self, params: InitiateParams) -> ToolResult {
        let topic = params.topic.trim().to_string();
        if topic.is_empty() {
            return Err(ToolError::invalid_arguments("topic must not be empty"));
        }

        let agents = params
            .agents
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| DEFAULT_AGENTS.iter().map(|a| a.to_string()).collect());
        let session = ResearchSession::new(topic, params.objectives.unwrap_or_default(), agents);

        info!("Research session {} started: {}", session.id, session.topic);
        let message = format!("Research session started for '{}'", session.topic);
        let data = session.summary();
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);

        Ok(ToolOutput::with_message(data, message))
    }

    async fn coordinate(&self, params: WorkflowParams) -> ToolResult {
        let mut sessions = self.sessions.write().await;
        let session = lookup_mut(&mut sessions, &params.session_id)?;
        if session.status == SessionStatus::Completed {
            return Err(ToolError::invalid_arguments(format!(
                "Session {} is already complete",
                session.id
            )));
        }

        let now = Utc::now();
        session.steps.push(WorkflowStep {
            step: params.step.clone(),
            details: params.details,
            recorded_at: now,
        });
        session.updated_at = now;
        if params.step == "complete" {
            session.status = SessionStatus::Completed;
        }

        info!("Session {} moved to step {}", session.id, params.step);
        Ok(ToolOutput::with_message(
            session.summary(),
            format!("Recorded step '{}'", params.step),
        ))
    }

    async fn status(&self, params: StatusParams) -> ToolResult {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(&params.session_id)
            .ok_or_else(|| session_not_found(&params.session_id))?;
        Ok(ToolOutput::data(session.summary()))
    }

    async fn manage_agents(&self, params: AgentParams) -> ToolResult {
        let mut sessions = self.sessions.write().await;
        let session = lookup_mut(&mut sessions, &params.session_id)?;

        let agent = || {
            params
                .agent
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .ok_or_else(|| {
                    ToolError::invalid_arguments(format!("'{}' requires an agent", params.action))
                })
        };

        let message = match params.action.as_str() {
            "add" => {
                let agent = agent()?;
                if session.agents.iter().any(|a| a == agent) {
                    return Err(ToolError::invalid_arguments(format!(
                        "Agent '{}' is already assigned",
                        agent
                    )));
                }
                session.agents.push(agent.to_string());
                Some(format!("Added agent '{}'", agent))
            }
            "remove" => {
                let agent = agent()?;
                let before = session.agents.len();
                session.agents.retain(|a| a != agent);
                if session.agents.len() == before {
                    return Err(ToolError::invalid_arguments(format!(
                        "Agent '{}' is not assigned",
                        agent
                    )));
                }
                Some(format!("Removed agent '{}'", agent))
            }
            _ => None,
        };

        let data = json!({
            "session_id": session.id,
            "agents": session.agents,
        });
        Ok(match message {
            Some(message) => {
                session.updated_at = Utc::now();
                ToolOutput::with_message(data, message)
            }
            None => ToolOutput::data(data),
        })
    }
}

fn lookup_mut<'a>(
    sessions: &'a mut HashMap<String, ResearchSession>,
    id: &str,
) -> Result<&'a mut ResearchSession, ToolError> {
    sessions.get_mut(id).ok_or_else(|| session_not_found(id))
}

fn session_not_found(id: &str) -> ToolError {
    ToolError::invalid_arguments(format!("No research session with id '{}'", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::JsonObject;
    use serde_json::Value;

    fn args(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    async fn run(module: &CapabilityModule, name: &str, value: Value) -> Result<Value, String> {
        match module.invoke(name, args(value)).await {
            Ok(ToolOutput::Data { data, .. }) => Ok(data),
            Ok(ToolOutput::Envelope(envelope)) => Ok(envelope.to_value()),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn start(module: &CapabilityModule) -> String {
        let data = run(
            module,
            "initiate_research_session",
            json!({"topic": "Riemann zeta zeros", "objectives": ["survey"]}),
        )
        .await
        .unwrap();
        data["session"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_initiate_uses_default_agents() {
        let module = ResearchTools::module();
        let data = run(
            &module,
            "initiate_research_session",
            json!({"topic": "Knot invariants"}),
        )
        .await
        .unwrap();
        assert_eq!(data["session"]["agents"], json!(DEFAULT_AGENTS));
        assert_eq!(data["session"]["status"], json!("active"));
        assert_eq!(data["progress"], json!(0.0));
    }

    #[tokio::test]
    async fn test_workflow_progress_and_completion() {
        let module = ResearchTools::module();
        let id = start(&module).await;

        let data = run(
            &module,
            "coordinate_workflow",
            json!({"session_id": id, "step": "analysis", "details": "compute zeros"}),
        )
        .await
        .unwrap();
        assert_eq!(data["current_step"], json!("analysis"));
        assert_eq!(data["progress"], json!(0.5));

        run(
            &module,
            "coordinate_workflow",
            json!({"session_id": id, "step": "complete"}),
        )
        .await
        .unwrap();

        let status = run(&module, "get_session_status", json!({"session_id": id}))
            .await
            .unwrap();
        assert_eq!(status["session"]["status"], json!("completed"));
        assert_eq!(status["session"]["steps"].as_array().unwrap().len(), 2);

        let err = run(
            &module,
            "coordinate_workflow",
            json!({"session_id": id, "step": "analysis"}),
        )
        .await
        .unwrap_err();
        assert!(err.contains("already complete"));
    }

    #[tokio::test]
    async fn test_unknown_step_is_rejected() {
        let module = ResearchTools::module();
        let id = start(&module).await;
        let err = run(
            &module,
            "coordinate_workflow",
            json!({"session_id": id, "step": "dancing"}),
        )
        .await
        .unwrap_err();
        assert!(err.starts_with("Invalid arguments"));
    }

    #[tokio::test]
    async fn test_manage_agents() {
        let module = ResearchTools::module();
        let id = start(&module).await;

        let data = run(
            &module,
            "manage_agents",
            json!({"session_id": id, "action": "add", "agent": "reviewer"}),
        )
        .await
        .unwrap();
        assert_eq!(data["agents"].as_array().unwrap().len(), 5);

        let err = run(
            &module,
            "manage_agents",
            json!({"session_id": id, "action": "add", "agent": "reviewer"}),
        )
        .await
        .unwrap_err();
        assert!(err.contains("already assigned"));

        run(
            &module,
            "manage_agents",
            json!({"session_id": id, "action": "remove", "agent": "literature"}),
        )
        .await
        .unwrap();

        let data = run(&module, "manage_agents", json!({"session_id": id}))
            .await
            .unwrap();
        assert_eq!(
            data["agents"],
            json!(["analysis", "visualization", "synthesis", "reviewer"])
        );

        let err = run(
            &module,
            "manage_agents",
            json!({"session_id": id, "action": "remove"}),
        )
        .await
        .unwrap_err();
        assert!(err.contains("requires an agent"));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let module = ResearchTools::module();
        let err = run(&module, "get_session_status", json!({"session_id": "nope"}))
            .await
            .unwrap_err();
        assert!(err.contains("No research session"));
    }
}
