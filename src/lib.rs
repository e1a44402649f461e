//! tracescope: trace query and analysis tools for LLM observability backends
//!
//! Exposes a fixed set of tools over exported span data: export, trace
//! lookup, filtering, error clustering, latency percentiles, aggregate
//! statistics, project listing and schema discovery. Filters are pushed
//! down to the backend where that is reliable and always re-applied locally.
//!
//! # Features
//!
//! - **Value Normalization**: heterogeneous backend cells to a closed value set
//! - **Predicate Builder**: injection-safe filter expressions with a pushdown policy
//! - **Fallback Dispatch**: ordered sources, per-source timeouts, source tagging
//! - **Client-Side Filtering**: `where` expressions evaluated with `sqlparser`
//! - **Statistics**: percentiles, error clustering, per-kind/status aggregates
//!
//! # Example
//!
//! ```no_run
//! use tracescope::config::ServiceConfig;
//! use tracescope::tools::invoke;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServiceConfig::from_env()?;
//! let ctx = tracescope::api::tool_context(&config)?;
//!
//! let result = invoke(
//!     &ctx,
//!     "analyze_latency",
//!     serde_json::json!({"project_name": "chatbot", "span_kind": "LLM"}),
//! )
//! .await;
//! println!("p95: {}", result["p95_ms"]);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod data;
pub mod query;
pub mod source;
pub mod tools;

// Re-export commonly used types
pub use data::{Record, SpanKind, Value};
pub use query::{InvalidParameter, Predicate, QueryWindow};
pub use source::{DispatchError, Dispatcher, SourceError};
pub use tools::{call_tool, invoke, ToolContext, ToolError};
