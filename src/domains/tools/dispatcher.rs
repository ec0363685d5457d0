//! Tool dispatch.
//!
//! Resolution order for a call:
//! 1. exact name match against core modules and available guards;
//! 2. namespace-prefix match against guards (unavailable guards answer with
//!    their fixed envelope);
//! 3. otherwise `Unknown tool`.
//!
//! Whatever happens during resolution or invocation, the caller gets exactly
//! one [`ResponseEnvelope`] back.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, error, instrument, warn};

use super::catalog::{Catalog, build_catalog};
use super::descriptor::JsonObject;
use super::envelope::ResponseEnvelope;
use super::error::{CatalogError, ToolError};
use super::guard::IntegrationGuard;
use super::module::CapabilityModule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Module(usize),
    Guard(usize),
}

/// Routes tool calls to their implementation and normalizes the outcome.
#[derive(Debug)]
pub struct Dispatcher {
    modules: Vec<CapabilityModule>,
    guards: Vec<IntegrationGuard>,
    routes: HashMap<String, Route>,
    catalog: Catalog,
}

impl Dispatcher {
    /// Compose modules and guards; fails on any catalog defect.
    pub fn new(
        modules: Vec<CapabilityModule>,
        guards: Vec<IntegrationGuard>,
    ) -> Result<Self, CatalogError> {
        let catalog = build_catalog(&modules, &guards)?;

        let mut routes = HashMap::with_capacity(catalog.len());
        for (index, module) in modules.iter().enumerate() {
            for descriptor in module.descriptors() {
                routes.insert(descriptor.name().to_string(), Route::Module(index));
            }
        }
        for (index, guard) in guards.iter().enumerate() {
            for descriptor in guard.descriptors() {
                routes.insert(descriptor.name().to_string(), Route::Guard(index));
            }
        }

        Ok(Self {
            modules,
            guards,
            routes,
            catalog,
        })
    }

    /// The advertised catalog, computed once at construction.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn modules(&self) -> &[CapabilityModule] {
        &self.modules
    }

    pub fn guards(&self) -> &[IntegrationGuard] {
        &self.guards
    }

    fn resolve(&self, name: &str) -> Option<Route> {
        if let Some(route) = self.routes.get(name) {
            return Some(*route);
        }
        self.guards
            .iter()
            .position(|g| g.claims(name))
            .map(Route::Guard)
    }

    /// Invoke `name` with `args` and return the normalized envelope.
    #[instrument(skip(self, args))]
    pub async fn dispatch(&self, name: &str, args: JsonObject) -> ResponseEnvelope {
        let Some(route) = self.resolve(name) else {
            warn!("Unknown tool requested: {}", name);
            return ResponseEnvelope::unknown_tool(name);
        };

        debug!("Routing {} to {:?}", name, route);

        let invocation = async {
            match route {
                Route::Module(index) => self.modules[index].invoke(name, args).await,
                Route::Guard(index) => self.guards[index].invoke(name, args).await,
            }
        };

        match AssertUnwindSafe(invocation).catch_unwind().await {
            Ok(Ok(output)) => output.into_envelope(),
            Ok(Err(ToolError::UnknownTool(unknown))) => {
                warn!("Unknown tool requested: {}", unknown);
                ResponseEnvelope::unknown_tool(&unknown)
            }
            Ok(Err(e @ ToolError::IntegrationUnavailable { .. })) => {
                ResponseEnvelope::error(e.to_string())
            }
            Ok(Err(e)) => {
                error!("Error handling tool {}: {}", name, e);
                ResponseEnvelope::failure(name, e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Tool {} panicked: {}", name, message);
                ResponseEnvelope::failure(name, message)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "tool panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::descriptor::{ParamSpec, ToolDescriptor};
    use crate::domains::tools::error::IntegrationError;
    use crate::domains::tools::module::ToolOutput;
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn args(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap_or_default()
    }

    fn storage_module() -> CapabilityModule {
        CapabilityModule::builder("storage", Arc::new(()))
            .tool(
                ToolDescriptor::new("search_storage", "Search")
                    .param(ParamSpec::string("query", "Query").required()),
                |_, _| async move { Ok::<_, ToolError>(ToolOutput::data(json!([]))) },
            )
            .tool(
                ToolDescriptor::new("list_folder", "List")
                    .param(ParamSpec::string("path", "Folder").required()),
                |_, _| async move {
                    Ok::<_, ToolError>(ToolOutput::data(json!(["a.txt", "b.txt"])))
                },
            )
            .tool(
                ToolDescriptor::new("read_file", "Read"),
                |_, _| async move {
                    Err::<ToolOutput, _>(ToolError::upstream("connection reset by peer"))
                },
            )
            .tool(
                ToolDescriptor::new("explode", "Panics"),
                |_, _| async move {
                    if true {
                        panic!("kaboom");
                    }
                    Ok::<_, ToolError>(ToolOutput::data(json!(null)))
                },
            )
            .build()
    }

    fn llm_module() -> CapabilityModule {
        CapabilityModule::builder("kimi_k2", Arc::new(()))
            .tool(ToolDescriptor::new("kimi_k2_query", "Query"), |_, _| async move {
                Ok::<_, ToolError>(ToolOutput::Envelope(ResponseEnvelope::success_with_message(
                    json!({"answer": 42}),
                    "Kimi K2 response",
                )))
            })
            .build()
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            vec![storage_module()],
            vec![
                IntegrationGuard::new("Kimi K2", "kimi_k2_", "Set GROQ_API_KEY.", || {
                    Ok(llm_module())
                }),
                IntegrationGuard::new("notes-db", "notesdb_", "Set NOTESDB_TOKEN.", || {
                    Err(IntegrationError::missing_credential("NOTESDB_TOKEN"))
                }),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_success_is_wrapped() {
        let envelope = dispatcher()
            .dispatch("list_folder", args(json!({"path": "/inbox"})))
            .await;
        assert_eq!(
            envelope.to_value(),
            json!({"status": "success", "data": ["a.txt", "b.txt"]})
        );
    }

    #[tokio::test]
    async fn test_every_catalog_tool_is_routable() {
        let dispatcher = dispatcher();
        for name in dispatcher.catalog().names() {
            assert!(dispatcher.resolve(name).is_some(), "{} has no route", name);
        }
        assert_eq!(dispatcher.catalog().len(), 5);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let envelope = dispatcher().dispatch("frobnicate", JsonObject::new()).await;
        assert_eq!(
            envelope.to_value(),
            json!({"status": "error", "error": "Unknown tool: frobnicate"})
        );
    }

    #[tokio::test]
    async fn test_unavailable_guard_prefix() {
        let envelope = dispatcher()
            .dispatch("notesdb_search", args(json!({"q": "x"})))
            .await;
        assert_eq!(
            envelope.to_value(),
            json!({
                "status": "error",
                "error": "notes-db integration not available. Set NOTESDB_TOKEN."
            })
        );
    }

    #[tokio::test]
    async fn test_available_guard_unknown_suffix_is_unknown_tool() {
        let envelope = dispatcher()
            .dispatch("kimi_k2_nonexistent", JsonObject::new())
            .await;
        assert_eq!(
            envelope.error_message(),
            Some("Unknown tool: kimi_k2_nonexistent")
        );
    }

    #[tokio::test]
    async fn test_envelope_output_passes_through() {
        let envelope = dispatcher().dispatch("kimi_k2_query", JsonObject::new()).await;
        assert_eq!(
            envelope.to_value(),
            json!({
                "status": "success",
                "data": {"answer": 42},
                "message": "Kimi K2 response"
            })
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_is_normalized() {
        let envelope = dispatcher().dispatch("read_file", JsonObject::new()).await;
        assert_eq!(
            envelope.to_value(),
            json!({
                "status": "error",
                "error": "connection reset by peer",
                "tool": "read_file",
                "suggestion": "Check the parameters and try again"
            })
        );
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_normalized() {
        let envelope = dispatcher()
            .dispatch("list_folder", args(json!({"path": 7})))
            .await;
        let value = envelope.to_value();
        assert_eq!(value["status"], json!("error"));
        assert_eq!(value["tool"], json!("list_folder"));
        assert!(
            value["error"]
                .as_str()
                .unwrap()
                .starts_with("Invalid arguments:")
        );
    }

    #[tokio::test]
    async fn test_panic_is_normalized() {
        let dispatcher = dispatcher();
        let envelope = dispatcher.dispatch("explode", JsonObject::new()).await;
        assert_eq!(
            envelope,
            ResponseEnvelope::failure("explode", "kaboom")
        );

        // The dispatcher keeps serving after a panicking tool.
        let envelope = dispatcher
            .dispatch("search_storage", args(json!({"query": "x"})))
            .await;
        assert!(envelope.is_success());
    }

    #[test]
    fn test_duplicate_names_refuse_to_build() {
        let result = Dispatcher::new(vec![storage_module(), storage_module()], vec![]);
        assert!(matches!(result, Err(CatalogError::DuplicateTool { .. })));
    }
}
