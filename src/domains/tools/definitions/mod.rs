//! Tool definitions.
//!
//! Core modules (`storage`, `research`, `visualization`, `knowledge`) are
//! always available. The remaining files each expose a `guard` constructor
//! for a credential-gated integration.

pub mod common;
pub mod gemini;
pub mod github;
pub mod kimi;
pub mod knowledge;
pub mod llm;
pub mod notion;
pub mod perplexity;
pub mod research;
pub mod storage;
pub mod visualization;
pub mod wolfram;

pub use knowledge::KnowledgeTools;
pub use research::ResearchTools;
pub use storage::StorageTools;
pub use visualization::VisualizationTools;
