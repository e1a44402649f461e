//! Query and analysis tools
//!
//! Each tool takes JSON arguments and returns a JSON value. Failures never
//! escape as faults: they are rendered into an `{error, kind, hint}` payload.

pub mod analysis;
pub mod error;
pub mod pipeline;
pub mod projects;
pub mod traces;

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::data::span::DEFAULT_USAGE_FIELDS;
use crate::query::window::{parse_bound, Clock, SystemClock, WindowSpec};
use crate::query::{resolve_window, InvalidParameter, QueryWindow};
use crate::source::{Dispatcher, ProjectCatalog, SchemaCatalog, SpanExporter};

pub use error::{ErrorKind, ToolError};

pub const DEFAULT_DAYS: f64 = 7.0;
pub const MAX_LIMIT: i64 = 10_000;
pub const MAX_PROJECT_NAME_LEN: usize = 256;

/// Shared, immutable state every tool call runs against
#[derive(Clone)]
pub struct ToolContext {
    pub exporter: Arc<dyn SpanExporter>,
    /// Project catalogs in fallback order
    pub catalogs: Vec<Arc<dyn ProjectCatalog>>,
    /// Schema catalogs in fallback order
    pub schemas: Vec<Arc<dyn SchemaCatalog>>,
    pub clock: Arc<dyn Clock>,
    pub dispatcher: Dispatcher,
    pub usage_fields: Vec<String>,
}

impl ToolContext {
    pub fn new(exporter: Arc<dyn SpanExporter>, catalogs: Vec<Arc<dyn ProjectCatalog>>) -> Self {
        Self {
            exporter,
            catalogs,
            schemas: Vec::new(),
            clock: Arc::new(SystemClock),
            dispatcher: Dispatcher::default(),
            usage_fields: DEFAULT_USAGE_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn with_schemas(mut self, schemas: Vec<Arc<dyn SchemaCatalog>>) -> Self {
        self.schemas = schemas;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_usage_fields(mut self, usage_fields: Vec<String>) -> Self {
        self.usage_fields = usage_fields;
        self
    }
}

/// Tool metadata as listed by `GET /tools`
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: &'static [&'static str],
}

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "export_traces",
        description: "Export spans from a project as a table of records",
        parameters: &["project_name", "days", "limit", "columns", "start_time", "end_time"],
    },
    ToolSpec {
        name: "get_trace",
        description: "Get all spans belonging to one trace",
        parameters: &["project_name", "trace_id", "days"],
    },
    ToolSpec {
        name: "filter_spans",
        description: "Filter spans by expression, span kind and error state",
        parameters: &[
            "project_name",
            "days",
            "limit",
            "where",
            "span_kind",
            "has_error",
            "start_time",
            "end_time",
        ],
    },
    ToolSpec {
        name: "analyze_errors",
        description: "Cluster error spans by status message",
        parameters: &["project_name", "days", "limit"],
    },
    ToolSpec {
        name: "analyze_latency",
        description: "Latency distribution and percentiles, optionally per span kind",
        parameters: &["project_name", "days", "span_kind"],
    },
    ToolSpec {
        name: "get_trace_statistics",
        description: "Span counts by kind and status plus token usage totals",
        parameters: &["project_name", "days"],
    },
    ToolSpec {
        name: "list_projects",
        description: "List projects visible to the configured credentials",
        parameters: &[],
    },
    ToolSpec {
        name: "get_model_schema",
        description: "Span properties, evaluations and annotations known for a project",
        parameters: &["model_id", "days"],
    },
];

pub fn find_tool(name: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().find(|t| t.name == name)
}

/// Run a tool, propagating failures
pub async fn call_tool(
    ctx: &ToolContext,
    name: &str,
    args: serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    match name {
        "export_traces" => traces::export_traces(ctx, parse_args(args)?).await,
        "get_trace" => traces::get_trace(ctx, parse_args(args)?).await,
        "filter_spans" => traces::filter_spans(ctx, parse_args(args)?).await,
        "analyze_errors" => analysis::analyze_errors(ctx, parse_args(args)?).await,
        "analyze_latency" => analysis::analyze_latency(ctx, parse_args(args)?).await,
        "get_trace_statistics" => analysis::get_trace_statistics(ctx, parse_args(args)?).await,
        "list_projects" => projects::list_projects(ctx).await,
        "get_model_schema" => projects::get_model_schema(ctx, parse_args(args)?).await,
        other => Err(ToolError::UnknownTool(other.to_string())),
    }
}

/// Run a tool and render any failure as an error payload
pub async fn invoke(ctx: &ToolContext, name: &str, args: serde_json::Value) -> serde_json::Value {
    let project_name = args
        .get("project_name")
        .and_then(|v| v.as_str())
        .map(String::from);

    match call_tool(ctx, name, args).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(tool = name, kind = ?e.kind(), error = %e, "Tool call failed");
            e.to_payload(name, project_name.as_deref())
        }
    }
}

fn parse_args<T: DeserializeOwned>(args: serde_json::Value) -> Result<T, InvalidParameter> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| InvalidParameter::new("arguments", e.to_string()))
}

pub(crate) fn default_days() -> f64 {
    DEFAULT_DAYS
}

pub(crate) fn validate_project_name(name: &str) -> Result<&str, InvalidParameter> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(InvalidParameter::new("project_name", "must not be empty"));
    }
    if trimmed.chars().count() > MAX_PROJECT_NAME_LEN {
        return Err(InvalidParameter::new(
            "project_name",
            format!("longer than {} characters", MAX_PROJECT_NAME_LEN),
        ));
    }
    Ok(trimmed)
}

pub(crate) fn validate_limit(limit: i64) -> Result<usize, InvalidParameter> {
    if (1..=MAX_LIMIT).contains(&limit) {
        Ok(limit as usize)
    } else {
        Err(InvalidParameter::new(
            "limit",
            format!("must be between 1 and {}, got {}", MAX_LIMIT, limit),
        ))
    }
}

const COLUMN_PATTERN: &str = r"^[A-Za-z0-9_.\-]{1,256}$";

fn is_valid_column(name: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(COLUMN_PATTERN).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

pub(crate) fn validate_columns(columns: Option<Vec<String>>) -> Result<Option<Vec<String>>, InvalidParameter> {
    let Some(columns) = columns else {
        return Ok(None);
    };
    if columns.is_empty() {
        return Ok(None);
    }
    if let Some(bad) = columns.iter().find(|c| !is_valid_column(c)) {
        return Err(InvalidParameter::new(
            "columns",
            format!("'{}' is not a valid column name", bad),
        ));
    }
    Ok(Some(columns))
}

pub(crate) fn resolve(
    ctx: &ToolContext,
    days: f64,
    start_time: Option<&str>,
    end_time: Option<&str>,
) -> Result<QueryWindow, InvalidParameter> {
    let spec = WindowSpec::days(days).with_bounds(
        parse_bound("start_time", start_time)?,
        parse_bound("end_time", end_time)?,
    );
    resolve_window(&spec, ctx.clock.as_ref())
}

/// Merge `extra` keys into a serialized summary object
pub(crate) fn with_fields<T: Serialize>(
    summary: &T,
    extra: serde_json::Value,
) -> serde_json::Value {
    let mut base = serde_json::to_value(summary).unwrap_or_else(|_| json!({}));
    if let (Some(obj), serde_json::Value::Object(extra)) = (base.as_object_mut(), extra) {
        obj.extend(extra);
    }
    base
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_validate_limit() {
        assert_eq!(validate_limit(1).unwrap(), 1);
        assert_eq!(validate_limit(10_000).unwrap(), 10_000);
        assert!(validate_limit(0).is_err());
        assert!(validate_limit(-5).is_err());
        assert!(validate_limit(10_001).is_err());
    }

    #[test]
    fn test_validate_project_name() {
        assert_eq!(validate_project_name(" chatbot ").unwrap(), "chatbot");
        assert!(validate_project_name("   ").is_err());
        assert!(validate_project_name(&"p".repeat(257)).is_err());
    }

    #[test]
    fn test_validate_columns() {
        let ok = validate_columns(Some(vec!["context.span_id".into(), "attributes.llm-x_1".into()]))
            .unwrap();
        assert_eq!(ok.map(|c| c.len()), Some(2));
        assert_eq!(validate_columns(Some(vec![])).unwrap(), None);
        assert!(validate_columns(Some(vec!["name; DROP".into()])).is_err());
        assert!(validate_columns(Some(vec!["".into()])).is_err());
    }

    #[test]
    fn test_find_tool() {
        assert!(find_tool("filter_spans").is_some());
        assert!(find_tool("drop_everything").is_none());
        assert_eq!(TOOLS.len(), 8);
    }

    #[tokio::test]
    async fn test_unknown_tool_payload() {
        let ctx = context(Arc::new(MockExporter::new(vec![])));
        let payload = invoke(&ctx, "nope", json!({})).await;
        assert_eq!(payload["kind"], "unknown_tool");
    }

    #[tokio::test]
    async fn test_bad_arguments_become_invalid_parameter() {
        let ctx = context(Arc::new(MockExporter::new(vec![])));
        let payload = invoke(&ctx, "export_traces", json!({"days": 7})).await;
        assert_eq!(payload["kind"], "invalid_parameter");
        assert!(payload["hint"].is_string());
    }
}
