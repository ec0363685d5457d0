//! Capability modules: named groups of tools and their implementations.
//!
//! A descriptor and its handler are always registered together, so a module
//! can never advertise a tool it cannot run or hold a handler nobody can
//! reach.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use super::descriptor::{JsonObject, ToolArgs, ToolDescriptor};
use super::envelope::ResponseEnvelope;
use super::error::ToolError;

/// What a tool body produces on success.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Raw result, wrapped into a success envelope by the dispatcher.
    Data {
        data: Value,
        message: Option<String>,
    },
    /// A complete envelope, passed through unchanged.
    Envelope(ResponseEnvelope),
}

impl ToolOutput {
    pub fn data(data: Value) -> Self {
        Self::Data {
            data,
            message: None,
        }
    }

    pub fn with_message(data: Value, message: impl Into<String>) -> Self {
        Self::Data {
            data,
            message: Some(message.into()),
        }
    }

    /// Normalize into the single envelope shape.
    pub fn into_envelope(self) -> ResponseEnvelope {
        match self {
            Self::Data {
                data,
                message: Some(message),
            } => ResponseEnvelope::success_with_message(data, message),
            Self::Data {
                data,
                message: None,
            } => ResponseEnvelope::success(data),
            Self::Envelope(envelope) => envelope,
        }
    }
}

pub type ToolResult = Result<ToolOutput, ToolError>;

/// Type-erased asynchronous tool body.
pub type ToolHandlerFn = Arc<dyn Fn(ToolArgs) -> BoxFuture<'static, ToolResult> + Send + Sync>;

struct RegisteredTool {
    descriptor: ToolDescriptor,
    handler: ToolHandlerFn,
}

/// A named group of related tools backed by one integration.
pub struct CapabilityModule {
    namespace: String,
    tools: Vec<RegisteredTool>,
}

impl std::fmt::Debug for CapabilityModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityModule")
            .field("namespace", &self.namespace)
            .field("tools", &self.tool_names())
            .finish()
    }
}

impl CapabilityModule {
    /// Start building a module whose handlers share `state`.
    pub fn builder<S>(namespace: impl Into<String>, state: Arc<S>) -> ModuleBuilder<S>
    where
        S: Send + Sync + 'static,
    {
        ModuleBuilder {
            state,
            module: Self {
                namespace: namespace.into(),
                tools: Vec::new(),
            },
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter().map(|t| &t.descriptor)
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.descriptors().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.descriptor.name() == name)
    }

    /// Validate `args` against the tool's schema and run it.
    pub async fn invoke(&self, name: &str, args: JsonObject) -> ToolResult {
        let tool = self
            .tools
            .iter()
            .find(|t| t.descriptor.name() == name)
            .ok_or_else(|| ToolError::unknown_tool(name))?;

        let args = tool.descriptor.schema().validate(args)?;
        (tool.handler)(ToolArgs::new(args)).await
    }
}

/// Registers tools against a shared state (usually an API client).
pub struct ModuleBuilder<S> {
    state: Arc<S>,
    module: CapabilityModule,
}

impl<S> ModuleBuilder<S>
where
    S: Send + Sync + 'static,
{
    /// Register a descriptor together with its handler.
    pub fn tool<F, Fut>(mut self, descriptor: ToolDescriptor, handler: F) -> Self
    where
        F: Fn(Arc<S>, ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        let state = self.state.clone();
        let handler: ToolHandlerFn = Arc::new(move |args| handler(state.clone(), args).boxed());
        self.module.tools.push(RegisteredTool {
            descriptor,
            handler,
        });
        self
    }

    pub fn build(self) -> CapabilityModule {
        self.module
    }
}
