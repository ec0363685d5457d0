//! Tool registry - which modules and guards the gateway is built from.
//!
//! Registration order is the catalog order: core modules first, then the
//! optional integrations.

use tracing::info;

use crate::core::config::Config;

use super::definitions::{
    KnowledgeTools, ResearchTools, StorageTools, VisualizationTools, gemini, github, kimi, notion,
    perplexity, wolfram,
};
use super::dispatcher::Dispatcher;
use super::error::CatalogError;
use super::guard::IntegrationGuard;
use super::module::CapabilityModule;

/// Always-available modules, in catalog order.
pub fn build_modules(config: &Config) -> Vec<CapabilityModule> {
    vec![
        StorageTools::module(config),
        ResearchTools::module(),
        VisualizationTools::module(config),
        KnowledgeTools::module(config),
    ]
}

/// Credential-gated integrations, in catalog order.
///
/// Each guard decides its availability here, once.
pub fn build_guards(config: &Config) -> Vec<IntegrationGuard> {
    vec![
        github::guard(config),
        perplexity::guard(config),
        notion::guard(config),
        gemini::guard(config),
        kimi::guard(config),
        wolfram::guard(config),
    ]
}

/// Build every module and guard and compose the dispatcher.
///
/// Fails on a catalog defect (empty or duplicate tool name, shared prefix).
pub fn build_dispatcher(config: &Config) -> Result<Dispatcher, CatalogError> {
    let dispatcher = Dispatcher::new(build_modules(config), build_guards(config))?;
    info!(
        "Registered {} tools from {} modules and {} integrations",
        dispatcher.catalog().len(),
        dispatcher.modules().len(),
        dispatcher.guards().iter().filter(|g| g.is_available()).count()
    );
    Ok(dispatcher)
}
