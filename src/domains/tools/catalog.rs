//! Catalog aggregation.
//!
//! The catalog is the ordered, flattened list of every advertised tool:
//! core modules first, then available guards, each in registration order.

use std::collections::HashMap;

use rmcp::model::Tool;

use super::descriptor::ToolDescriptor;
use super::error::CatalogError;
use super::guard::IntegrationGuard;
use super::module::CapabilityModule;

/// Ordered, duplicate-free list of advertised tools.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    tools: Vec<ToolDescriptor>,
}

impl Catalog {
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// rmcp Tool models, in catalog order.
    pub fn to_tools(&self) -> Vec<Tool> {
        self.tools.iter().map(ToolDescriptor::to_tool).collect()
    }
}

/// Concatenate descriptors from every module and every available guard.
///
/// Fails fast on an empty name, a name registered twice (within or across
/// modules) or two guards reserving the same prefix.
pub fn build_catalog(
    modules: &[CapabilityModule],
    guards: &[IntegrationGuard],
) -> Result<Catalog, CatalogError> {
    let mut prefixes: HashMap<&str, &str> = HashMap::new();
    for guard in guards {
        if let Some(first) = prefixes.insert(guard.prefix(), guard.integration()) {
            return Err(CatalogError::DuplicatePrefix {
                prefix: guard.prefix().to_string(),
                first: first.to_string(),
                second: guard.integration().to_string(),
            });
        }
    }

    let sources = modules
        .iter()
        .map(|m| (m.namespace(), m.descriptors().collect::<Vec<_>>()))
        .chain(
            guards
                .iter()
                .filter_map(|g| g.module())
                .map(|m| (m.namespace(), m.descriptors().collect::<Vec<_>>())),
        );

    let mut owners: HashMap<&str, &str> = HashMap::new();
    let mut tools = Vec::new();

    for (namespace, descriptors) in sources {
        for descriptor in descriptors {
            if descriptor.name().is_empty() {
                return Err(CatalogError::EmptyName {
                    namespace: namespace.to_string(),
                });
            }
            if let Some(first) = owners.insert(descriptor.name(), namespace) {
                return Err(CatalogError::DuplicateTool {
                    name: descriptor.name().to_string(),
                    first: first.to_string(),
                    second: namespace.to_string(),
                });
            }
            tools.push(descriptor.clone());
        }
    }

    Ok(Catalog { tools })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::error::ToolError;
    use crate::domains::tools::module::ToolOutput;
    use serde_json::json;
    use std::sync::Arc;

    fn module(namespace: &str, names: &[&str]) -> CapabilityModule {
        names
            .iter()
            .fold(
                CapabilityModule::builder(namespace, Arc::new(())),
                |builder, name| {
                    builder.tool(ToolDescriptor::new(*name, "test tool"), |_, _| async move {
                        Ok::<_, ToolError>(ToolOutput::data(json!(null)))
                    })
                },
            )
            .build()
    }

    #[test]
    fn test_catalog_order_is_modules_then_available_guards() {
        let modules = vec![
            module("storage", &["search_storage", "list_folder"]),
            module("research", &["initiate_research_session"]),
        ];
        let guards = vec![
            IntegrationGuard::new("GitHub", "github_", "hint", || {
                Ok(module("github", &["github_search"]))
            }),
            IntegrationGuard::unavailable("Notion", "notion_", "hint"),
        ];

        let catalog = build_catalog(&modules, &guards).unwrap();
        assert_eq!(
            catalog.names(),
            vec![
                "search_storage",
                "list_folder",
                "initiate_research_session",
                "github_search"
            ]
        );
        assert!(catalog.contains("github_search"));
        assert!(!catalog.contains("notion_search"));
    }

    #[test]
    fn test_catalog_build_is_idempotent() {
        let modules = vec![module("storage", &["search_storage", "list_folder"])];
        let guards = vec![IntegrationGuard::unavailable("Notion", "notion_", "hint")];
        let first = build_catalog(&modules, &guards).unwrap();
        let second = build_catalog(&modules, &guards).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_duplicate_across_modules_fails_fast() {
        let modules = vec![
            module("storage", &["read_file"]),
            module("vault", &["read_file"]),
        ];
        let err = build_catalog(&modules, &[]).unwrap_err();
        assert_eq!(
            err,
            CatalogError::DuplicateTool {
                name: "read_file".to_string(),
                first: "storage".to_string(),
                second: "vault".to_string(),
            }
        );
    }

    #[test]
    fn test_duplicate_within_module_fails_fast() {
        let modules = vec![module("storage", &["read_file", "read_file"])];
        assert!(matches!(
            build_catalog(&modules, &[]),
            Err(CatalogError::DuplicateTool { .. })
        ));
    }

    #[test]
    fn test_duplicate_between_module_and_guard_fails_fast() {
        let modules = vec![module("storage", &["github_search"])];
        let guards = vec![IntegrationGuard::new("GitHub", "github_", "hint", || {
            Ok(module("github", &["github_search"]))
        })];
        assert!(matches!(
            build_catalog(&modules, &guards),
            Err(CatalogError::DuplicateTool { .. })
        ));
    }

    #[test]
    fn test_empty_name_fails_fast() {
        let modules = vec![module("storage", &[""])];
        assert_eq!(
            build_catalog(&modules, &[]).unwrap_err(),
            CatalogError::EmptyName {
                namespace: "storage".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_prefix_fails_fast() {
        let guards = vec![
            IntegrationGuard::unavailable("Gemini", "gemini_", "hint"),
            IntegrationGuard::unavailable("Gemini Pro", "gemini_", "hint"),
        ];
        assert!(matches!(
            build_catalog(&[], &guards),
            Err(CatalogError::DuplicatePrefix { .. })
        ));
    }
}
