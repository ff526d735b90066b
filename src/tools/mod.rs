//! Data tools — the read-only fetchers the model can route questions to.
//!
//! Submodules:
//! - `registry`: the [`Tool`] trait and ordered [`ToolRegistry`]
//! - `sqlite`: closing-events SQL fetchers (aggregate summary, top-N tasks)
//! - `datalake`: HTTP fetchers (commercial/regulatory summaries, task detail)
//! - `errors`: the fetcher error taxonomy

pub mod datalake;
pub mod errors;
pub mod registry;
pub mod sqlite;

// Re-exports for convenience
pub use datalake::{datalake_registry, DatalakeClient};
pub use errors::ToolError;
pub use registry::{Tool, ToolRegistry};
pub use sqlite::{sqlite_registry, ClosingDb};
