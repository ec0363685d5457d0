//! Optional integration guards.
//!
//! A guard wraps a capability module whose construction may fail (missing
//! credential, client initialization error). Availability is decided once,
//! when the guard is built, and never changes afterwards.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::{info, warn};

use super::descriptor::{JsonObject, ToolDescriptor};
use super::envelope::ResponseEnvelope;
use super::error::{IntegrationError, ToolError};
use super::module::{CapabilityModule, ToolResult};

/// Two-state wrapper around an optional capability module.
#[derive(Debug)]
pub struct IntegrationGuard {
    integration: String,
    prefix: String,
    hint: String,
    module: Option<CapabilityModule>,
}

impl IntegrationGuard {
    /// Attempt to build the wrapped module.
    ///
    /// A construction error or a panic inside `build` leaves the guard
    /// unavailable; it is logged and never propagated.
    pub fn new<F>(
        integration: impl Into<String>,
        prefix: impl Into<String>,
        hint: impl Into<String>,
        build: F,
    ) -> Self
    where
        F: FnOnce() -> Result<CapabilityModule, IntegrationError>,
    {
        let integration = integration.into();

        let module = match catch_unwind(AssertUnwindSafe(build)) {
            Ok(Ok(module)) => {
                info!(
                    "{} integration active ({} tools)",
                    integration,
                    module.len()
                );
                Some(module)
            }
            Ok(Err(e)) => {
                warn!("{} integration unavailable: {}", integration, e);
                None
            }
            Err(_) => {
                warn!("{} integration unavailable: initialization panicked", integration);
                None
            }
        };

        Self {
            integration,
            prefix: prefix.into(),
            hint: hint.into(),
            module,
        }
    }

    /// A guard that is unavailable from the start.
    pub fn unavailable(
        integration: impl Into<String>,
        prefix: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self {
            integration: integration.into(),
            prefix: prefix.into(),
            hint: hint.into(),
            module: None,
        }
    }

    pub fn integration(&self) -> &str {
        &self.integration
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_available(&self) -> bool {
        self.module.is_some()
    }

    pub fn module(&self) -> Option<&CapabilityModule> {
        self.module.as_ref()
    }

    /// Advertised descriptors: the wrapped module's, or none.
    pub fn descriptors(&self) -> Vec<&ToolDescriptor> {
        self.module
            .as_ref()
            .map(|m| m.descriptors().collect())
            .unwrap_or_default()
    }

    /// Whether `name` falls in this guard's reserved namespace.
    pub fn claims(&self, name: &str) -> bool {
        name.starts_with(&self.prefix)
    }

    /// The error every call gets while the integration is unavailable.
    pub fn unavailable_error(&self) -> ToolError {
        ToolError::unavailable(&self.integration, &self.hint)
    }

    /// The fixed envelope the dispatcher renders for [`Self::unavailable_error`].
    pub fn unavailable_envelope(&self) -> ResponseEnvelope {
        ResponseEnvelope::error(self.unavailable_error().to_string())
    }

    /// Delegate to the wrapped module, or fail with the unavailable error.
    pub async fn invoke(&self, name: &str, args: JsonObject) -> ToolResult {
        match &self.module {
            Some(module) => module.invoke(name, args).await,
            None => Err(self.unavailable_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::module::ToolOutput;
    use serde_json::json;
    use std::sync::Arc;

    fn notes_module() -> CapabilityModule {
        CapabilityModule::builder("notesdb", Arc::new(()))
            .tool(
                ToolDescriptor::new("notesdb_search", "Search notes"),
                |_, _| async move { Ok::<_, ToolError>(ToolOutput::data(json!([]))) },
            )
            .build()
    }

    #[test]
    fn test_available_guard_exposes_module() {
        let guard = IntegrationGuard::new("notes-db", "notesdb_", "Set NOTES_TOKEN.", || {
            Ok(notes_module())
        });
        assert!(guard.is_available());
        assert_eq!(guard.descriptors().len(), 1);
        assert!(guard.claims("notesdb_search"));
        assert!(!guard.claims("search_notesdb"));
    }

    #[test]
    fn test_failed_construction_is_not_fatal() {
        let guard = IntegrationGuard::new("notes-db", "notesdb_", "Set NOTES_TOKEN.", || {
            Err(IntegrationError::missing_credential("NOTES_TOKEN"))
        });
        assert!(!guard.is_available());
        assert!(guard.descriptors().is_empty());
    }

    #[test]
    fn test_panicking_construction_is_not_fatal() {
        let guard = IntegrationGuard::new("notes-db", "notesdb_", "hint", || {
            panic!("client exploded")
        });
        assert!(!guard.is_available());
    }

    #[tokio::test]
    async fn test_unavailable_invoke_fails_with_fixed_message() {
        let guard = IntegrationGuard::unavailable(
            "notes-db",
            "notesdb_",
            "Install the notes client.",
        );
        let err = guard
            .invoke("notesdb_search", JsonObject::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::IntegrationUnavailable { .. }));
        assert_eq!(
            guard.unavailable_envelope(),
            ResponseEnvelope::error(
                "notes-db integration not available. Install the notes client."
            )
        );
    }

    #[tokio::test]
    async fn test_available_invoke_delegates() {
        let guard = IntegrationGuard::new("notes-db", "notesdb_", "hint", || Ok(notes_module()));
        let output = guard
            .invoke("notesdb_search", JsonObject::new())
            .await
            .unwrap();
        assert_eq!(output, ToolOutput::data(json!([])));
    }
}
