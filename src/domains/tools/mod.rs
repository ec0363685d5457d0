//! Tools domain module.
//!
//! Everything a client can call lives here. Tools are grouped into capability
//! modules; modules that depend on an external service sit behind an
//! integration guard so a missing credential disables only that group.
//!
//! ## Architecture
//!
//! - `descriptor.rs` - Tool metadata and declarative input schemas
//! - `module.rs` - Capability modules pairing descriptors with handlers
//! - `guard.rs` - Optional integrations and their unavailable responses
//! - `catalog.rs` - The aggregated, duplicate-free tool list
//! - `dispatcher.rs` - Name-based routing and envelope normalization
//! - `envelope.rs` - The uniform response shape
//! - `registry.rs` - Which modules and guards the gateway is built from
//! - `definitions/` - The tool implementations
//!
//! ## Adding a New Tool
//!
//! 1. Add a descriptor and handler to the module's `module()` builder
//! 2. If it is a new module, register it in `registry.rs`
//!
//! The catalog and the routing table are derived from the same registration,
//! so nothing else needs to change.

mod catalog;
pub mod definitions;
mod descriptor;
mod dispatcher;
mod envelope;
mod error;
mod guard;
mod module;
mod registry;

pub use catalog::{Catalog, build_catalog};
pub use descriptor::{InputSchema, JsonObject, ParamSpec, ParamType, ToolArgs, ToolDescriptor};
pub use dispatcher::Dispatcher;
pub use envelope::{DEFAULT_SUGGESTION, ResponseEnvelope};
pub use error::{CatalogError, IntegrationError, ToolError};
pub use guard::IntegrationGuard;
pub use module::{CapabilityModule, ModuleBuilder, ToolHandlerFn, ToolOutput, ToolResult};
pub use registry::{build_dispatcher, build_guards, build_modules};
