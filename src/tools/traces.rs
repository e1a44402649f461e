use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::json;

use super::pipeline::{fetch_spans, SpanQuery};
use super::{default_days, resolve, validate_columns, validate_limit, validate_project_name, ToolContext, ToolError};
use crate::data::Record;
use crate::query::predicate::validate_trace_id;
use crate::query::{build_predicate, PredicateParams};

/// Spans returned by `get_trace` at most
pub const TRACE_SPAN_LIMIT: usize = 1000;

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Deserialize)]
pub struct ExportArgs {
    pub project_name: String,
    #[serde(default = "default_days")]
    pub days: f64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GetTraceArgs {
    pub project_name: String,
    pub trace_id: String,
    #[serde(default = "default_days")]
    pub days: f64,
}

#[derive(Debug, Deserialize)]
pub struct FilterArgs {
    pub project_name: String,
    #[serde(default = "default_days")]
    pub days: f64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
    #[serde(default)]
    pub span_kind: Option<String>,
    #[serde(default)]
    pub has_error: Option<bool>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

fn to_json(records: &[Record], limit: usize) -> Vec<serde_json::Value> {
    records
        .iter()
        .take(limit)
        .map(|record| {
            serde_json::Value::Object(
                record
                    .iter()
                    .map(|(column, value)| (column.clone(), value.to_json()))
                    .collect(),
            )
        })
        .collect()
}

/// Union of the columns present in any record, sorted
fn observed_columns(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .flat_map(|r| r.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .cloned()
        .collect()
}

pub async fn export_traces(ctx: &ToolContext, args: ExportArgs) -> Result<serde_json::Value, ToolError> {
    let project_name = validate_project_name(&args.project_name)?;
    let limit = validate_limit(args.limit)?;
    let columns = validate_columns(args.columns)?;
    let window = resolve(ctx, args.days, args.start_time.as_deref(), args.end_time.as_deref())?;
    let plan = build_predicate(&PredicateParams::default())?;

    let fetched = fetch_spans(
        ctx,
        SpanQuery {
            project_name,
            window,
            predicate: &plan.predicate,
            columns: columns.as_deref(),
        },
    )
    .await?;

    let spans = to_json(&fetched.records, limit);
    let column_names = columns.unwrap_or_else(|| observed_columns(&fetched.records));

    Ok(json!({
        "count": spans.len(),
        "total_rows": fetched.records.len(),
        "columns": column_names,
        "spans": spans,
        "source": fetched.source,
    }))
}

pub async fn get_trace(ctx: &ToolContext, args: GetTraceArgs) -> Result<serde_json::Value, ToolError> {
    let project_name = validate_project_name(&args.project_name)?;
    let trace_id = validate_trace_id(args.trace_id.trim())?;
    let window = resolve(ctx, args.days, None, None)?;
    let plan = build_predicate(&PredicateParams {
        trace_id: Some(trace_id),
        ..Default::default()
    })?;

    let fetched = fetch_spans(
        ctx,
        SpanQuery {
            project_name,
            window,
            predicate: &plan.predicate,
            columns: None,
        },
    )
    .await?;

    let spans = to_json(&fetched.records, TRACE_SPAN_LIMIT);

    Ok(json!({
        "trace_id": trace_id,
        "count": spans.len(),
        "spans": spans,
        "source": fetched.source,
    }))
}

pub async fn filter_spans(ctx: &ToolContext, args: FilterArgs) -> Result<serde_json::Value, ToolError> {
    let project_name = validate_project_name(&args.project_name)?;
    let limit = validate_limit(args.limit)?;
    let window = resolve(ctx, args.days, args.start_time.as_deref(), args.end_time.as_deref())?;
    let plan = build_predicate(&PredicateParams {
        span_kind: args.span_kind.as_deref(),
        has_error: args.has_error,
        where_clause: args.where_clause.as_deref(),
        trace_id: None,
    })?;

    let fetched = fetch_spans(
        ctx,
        SpanQuery {
            project_name,
            window,
            predicate: &plan.predicate,
            columns: None,
        },
    )
    .await?;

    let spans = to_json(&fetched.records, limit);

    Ok(json!({
        "count": spans.len(),
        "total_matches": fetched.records.len(),
        "filter_applied": plan.predicate.describe(),
        "dropped": fetched.dropped,
        "warnings": fetched.warnings,
        "spans": spans,
        "source": fetched.source,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::data::Value;
    use crate::source::SourceError;
    use crate::tools::testing::*;
    use crate::tools::{call_tool, invoke};

    fn spans() -> Vec<Record> {
        (0..100)
            .map(|i| {
                let kind = if i % 10 < 3 { "LLM" } else { "CHAIN" };
                let trace = format!("{:032x}", i / 4);
                record(&[
                    ("context.span_id", Value::from(format!("span-{}", i))),
                    ("context.trace_id", Value::from(trace)),
                    ("span_kind", Value::from(kind)),
                    ("status_code", Value::from(if i == 7 { "ERROR" } else { "OK" })),
                    ("latency_ms", Value::Int(i)),
                ])
            })
            .collect()
    }

    fn ctx() -> (Arc<MockExporter>, ToolContext) {
        let exporter = Arc::new(MockExporter::new(spans()));
        (exporter.clone(), context(exporter))
    }

    #[tokio::test]
    async fn test_export_traces_limits_rows() {
        let (_, ctx) = ctx();
        let result = call_tool(&ctx, "export_traces", json!({"project_name": "chatbot", "limit": 10}))
            .await
            .unwrap();
        assert_eq!(result["count"], 10);
        assert_eq!(result["total_rows"], 100);
        assert_eq!(result["source"], "export");
        assert!(result["columns"]
            .as_array()
            .unwrap()
            .contains(&json!("context.span_id")));
    }

    #[tokio::test]
    async fn test_export_traces_window_sent_to_backend() {
        let (exporter, ctx) = ctx();
        call_tool(&ctx, "export_traces", json!({"project_name": "chatbot", "days": 0.5}))
            .await
            .unwrap();
        let request = &exporter.requests()[0];
        assert_eq!(request.window.end, now());
        assert_eq!(request.window.duration(), chrono::Duration::hours(12));
    }

    #[tokio::test]
    async fn test_filter_spans_by_kind_case_insensitive() {
        let (_, ctx) = ctx();
        let result = call_tool(
            &ctx,
            "filter_spans",
            json!({"project_name": "chatbot", "span_kind": "llm", "limit": 1000}),
        )
        .await
        .unwrap();

        assert_eq!(result["total_matches"], 30);
        assert_eq!(result["dropped"], 70);
        assert_eq!(result["filter_applied"], "span_kind = 'LLM'");
        let ids: Vec<&str> = result["spans"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["context.span_id"].as_str().unwrap())
            .collect();
        assert_eq!(&ids[..4], &["span-0", "span-1", "span-2", "span-10"]);
    }

    fn mixed_status() -> Vec<Record> {
        vec![
            record(&[
                ("context.span_id", Value::from("a")),
                ("status_code", Value::from("OK")),
                ("status_message", Value::from("upstream timeout")),
                ("latency_ms", Value::Int(5)),
            ]),
            record(&[
                ("context.span_id", Value::from("b")),
                ("status_code", Value::from("ERROR")),
                ("latency_ms", Value::Int(6)),
            ]),
            record(&[
                ("context.span_id", Value::from("c")),
                ("status_code", Value::from("OK")),
                ("latency_ms", Value::Int(7)),
            ]),
        ]
    }

    #[tokio::test]
    async fn test_has_error_is_evaluated_locally() {
        let exporter = Arc::new(MockExporter::new(mixed_status()));
        let ctx = context(exporter.clone());
        let result = call_tool(
            &ctx,
            "filter_spans",
            json!({"project_name": "chatbot", "has_error": true}),
        )
        .await
        .unwrap();

        assert_eq!(result["source"], "export");
        assert_eq!(result["total_matches"], 2);
        assert_eq!(result["filter_applied"], "status_code = 'ERROR'");
        assert_eq!(exporter.requests()[0].filter, None);
    }

    #[tokio::test]
    async fn test_has_error_same_answer_on_both_source_paths() {
        let args = json!({"project_name": "chatbot", "has_error": true, "where": "latency_ms >= 0"});

        let server = Arc::new(MockExporter::new(mixed_status()));
        let via_server = call_tool(&context(server.clone()), "filter_spans", args.clone())
            .await
            .unwrap();
        assert_eq!(via_server["source"], "server_filter");
        assert_eq!(server.requests()[0].filter.as_deref(), Some("(latency_ms >= 0)"));

        let client = Arc::new(MockExporter::new(mixed_status()).failing_filtered(SourceError::Remote {
            status: 500,
            body: "filter rejected".into(),
        }));
        let via_client = call_tool(&context(client), "filter_spans", args).await.unwrap();
        assert_eq!(via_client["source"], "client_filter");

        for result in [&via_server, &via_client] {
            assert_eq!(result["total_matches"], 2);
            assert_eq!(result["spans"][0]["context.span_id"], "a");
            assert_eq!(result["spans"][1]["context.span_id"], "b");
        }
    }

    #[tokio::test]
    async fn test_empty_server_answer_stands_for_unevaluable_where() {
        let exporter = Arc::new(MockExporter::new(spans()).answering_filtered(vec![]));
        let ctx = context(exporter.clone());
        let result = call_tool(
            &ctx,
            "filter_spans",
            json!({"project_name": "chatbot", "where": "latency_ms > 1000 OR latency_ms < 0"}),
        )
        .await
        .unwrap();

        assert_eq!(result["source"], "server_filter");
        assert_eq!(result["total_matches"], 0);
        assert!(result["warnings"].as_array().unwrap().is_empty());
        assert_eq!(exporter.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_server_answer_rechecked_for_evaluable_where() {
        let exporter = Arc::new(MockExporter::new(spans()).answering_filtered(vec![]));
        let ctx = context(exporter.clone());
        let result = call_tool(
            &ctx,
            "filter_spans",
            json!({"project_name": "chatbot", "where": "latency_ms >= 98"}),
        )
        .await
        .unwrap();

        assert_eq!(result["source"], "client_filter");
        assert_eq!(result["total_matches"], 2);
        assert_eq!(exporter.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_filter_spans_unsupported_where_warns_after_fallback() {
        let exporter = Arc::new(
            MockExporter::new(spans()).failing_filtered(SourceError::Remote {
                status: 400,
                body: "bad where".into(),
            }),
        );
        let ctx = context(exporter);
        let result = call_tool(
            &ctx,
            "filter_spans",
            json!({"project_name": "chatbot", "where": "latency_ms < 5 OR latency_ms > 95"}),
        )
        .await
        .unwrap();

        assert_eq!(result["source"], "client_filter");
        assert_eq!(result["total_matches"], 100);
        assert_eq!(result["warnings"][0]["expression"], "latency_ms < 5 OR latency_ms > 95");
    }

    #[tokio::test]
    async fn test_invalid_span_kind_payload() {
        let (exporter, ctx) = ctx();
        let payload = invoke(
            &ctx,
            "filter_spans",
            json!({"project_name": "chatbot", "span_kind": "INVALID"}),
        )
        .await;
        assert_eq!(payload["kind"], "invalid_parameter");
        assert!(payload["details"]["valid_kinds"]
            .as_array()
            .unwrap()
            .contains(&json!("LLM")));
        assert!(exporter.requests().is_empty());
    }

    #[tokio::test]
    async fn test_get_trace() {
        let (exporter, ctx) = ctx();
        let trace_id = format!("{:032x}", 2);
        let result = call_tool(
            &ctx,
            "get_trace",
            json!({"project_name": "chatbot", "trace_id": trace_id}),
        )
        .await
        .unwrap();

        assert_eq!(result["count"], 4);
        assert_eq!(result["trace_id"], trace_id.as_str());
        assert_eq!(
            exporter.requests()[0].filter,
            Some(format!("context.trace_id = '{}'", trace_id))
        );
    }

    #[tokio::test]
    async fn test_get_trace_rejects_malformed_id_before_io() {
        let (exporter, ctx) = ctx();
        let payload = invoke(
            &ctx,
            "get_trace",
            json!({"project_name": "chatbot", "trace_id": "x' OR '1'='1"}),
        )
        .await;
        assert_eq!(payload["kind"], "invalid_parameter");
        assert!(exporter.requests().is_empty());
    }

    #[tokio::test]
    async fn test_parameter_validation() {
        let (_, ctx) = ctx();
        for args in [
            json!({"project_name": "chatbot", "limit": 0}),
            json!({"project_name": "chatbot", "days": -1}),
            json!({"project_name": ""}),
            json!({"project_name": "chatbot", "columns": ["ok", "not ok"]}),
            json!({"project_name": "chatbot", "start_time": "2024-06-15T00:00:00Z", "end_time": "2024-06-14T00:00:00Z"}),
        ] {
            let payload = invoke(&ctx, "export_traces", args.clone()).await;
            assert_eq!(payload["kind"], "invalid_parameter", "args: {}", args);
        }
    }
}
