//! Source adapters.
//!
//! Every backing source (filesystem trees, web endpoints, content platforms,
//! code hosts, databases) sits behind the [`SourceAdapter`] contract. The
//! [`AdapterRegistry`] creates adapters through registered factories, runs
//! their health checks in parallel and tears them down tolerantly on
//! shutdown. The [`FileSystemAdapter`] is the source a stock deployment
//! ships with: runbook documents loaded from a directory into an in-memory
//! index.

mod adapter;
mod filesystem;
mod registry;

pub use adapter::{
    AdapterContent, AdapterError, AdapterHealth, AdapterMetadata, DecisionBranch, DecisionTree,
    Procedure, ProcedureStep, Runbook, RunbookMatch, SearchResult, SourceAdapter, SourceConfig,
};
pub use filesystem::FileSystemAdapter;
pub use registry::{AdapterFactory, AdapterRegistry};
