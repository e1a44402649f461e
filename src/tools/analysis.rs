use serde::Deserialize;
use serde_json::json;

use super::pipeline::{fetch_spans, FetchedSpans, SpanQuery};
use super::{default_days, resolve, validate_limit, validate_project_name, with_fields, ToolContext, ToolError};
use crate::query::{aggregate_stats, build_predicate, error_patterns, latency_summary, Predicate, PredicateParams};

/// Error clusters reported by `analyze_errors`
pub const MAX_ERROR_PATTERNS: usize = 10;

fn default_error_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct ErrorArgs {
    pub project_name: String,
    #[serde(default = "default_days")]
    pub days: f64,
    /// Sample errors to include
    #[serde(default = "default_error_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct LatencyArgs {
    pub project_name: String,
    #[serde(default = "default_days")]
    pub days: f64,
    #[serde(default)]
    pub span_kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatisticsArgs {
    pub project_name: String,
    #[serde(default = "default_days")]
    pub days: f64,
}

async fn fetch(
    ctx: &ToolContext,
    project_name: &str,
    days: f64,
    predicate: &Predicate,
) -> Result<FetchedSpans, ToolError> {
    let window = resolve(ctx, days, None, None)?;
    fetch_spans(
        ctx,
        SpanQuery {
            project_name,
            window,
            predicate,
            columns: None,
        },
    )
    .await
}

pub async fn analyze_errors(ctx: &ToolContext, args: ErrorArgs) -> Result<serde_json::Value, ToolError> {
    let project_name = validate_project_name(&args.project_name)?;
    let limit = validate_limit(args.limit)?;
    let plan = build_predicate(&PredicateParams {
        has_error: Some(true),
        ..Default::default()
    })?;

    let fetched = fetch(ctx, project_name, args.days, &plan.predicate).await?;
    let summary = error_patterns(&fetched.records, MAX_ERROR_PATTERNS);

    let mut result = with_fields(
        &summary,
        json!({
            "time_range_days": args.days,
            "source": fetched.source,
        }),
    );

    if summary.error_count == 0 {
        result["message"] = json!("No errors found in the specified time range");
    } else {
        result["sample_errors"] = json!(fetched
            .records
            .iter()
            .take(limit)
            .map(|r| r.iter().map(|(k, v)| (k.clone(), v.to_json())).collect::<serde_json::Map<_, _>>())
            .collect::<Vec<_>>());
    }
    Ok(result)
}

pub async fn analyze_latency(ctx: &ToolContext, args: LatencyArgs) -> Result<serde_json::Value, ToolError> {
    let project_name = validate_project_name(&args.project_name)?;
    let plan = build_predicate(&PredicateParams {
        span_kind: args.span_kind.as_deref(),
        ..Default::default()
    })?;

    let fetched = fetch(ctx, project_name, args.days, &plan.predicate).await?;
    let summary = latency_summary(&fetched.records);

    let span_kind = plan.predicate.conditions().iter().find_map(|c| match c {
        crate::query::Condition::SpanKind(kind) => Some(kind.as_str()),
        _ => None,
    });

    let mut result = with_fields(
        &summary,
        json!({
            "span_count": fetched.records.len(),
            "span_kind": span_kind,
            "time_range_days": args.days,
            "source": fetched.source,
        }),
    );

    if fetched.records.is_empty() {
        result["message"] = json!("No spans found in the specified time range");
    } else if summary.count == 0 {
        result["message"] = json!("No latency values found in the exported spans");
    }
    Ok(result)
}

pub async fn get_trace_statistics(
    ctx: &ToolContext,
    args: StatisticsArgs,
) -> Result<serde_json::Value, ToolError> {
    let project_name = validate_project_name(&args.project_name)?;
    let plan = build_predicate(&PredicateParams::default())?;

    let fetched = fetch(ctx, project_name, args.days, &plan.predicate).await?;
    let summary = aggregate_stats(&fetched.records, &ctx.usage_fields);

    let mut result = with_fields(
        &summary,
        json!({
            "time_range_days": args.days,
            "source": fetched.source,
        }),
    );
    if summary.total_spans == 0 {
        result["message"] = json!("No spans found in the specified time range");
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::data::{Record, Value};
    use crate::tools::call_tool;
    use crate::tools::testing::*;

    fn spans() -> Vec<Record> {
        let mut rows = Vec::new();
        for i in 0..15 {
            rows.push(record(&[
                ("context.trace_id", Value::from(format!("t{}", i % 5))),
                ("span_kind", Value::from("LLM")),
                ("status_code", Value::from("ERROR")),
                ("status_message", Value::from("Rate limit exceeded")),
                ("latency_ms", Value::Int(10 * (i % 5 + 1))),
                ("attributes.llm.token_count.total", Value::Int(100)),
            ]));
        }
        for i in 0..5 {
            rows.push(record(&[
                ("context.trace_id", Value::from(format!("t{}", i))),
                ("span_kind", Value::from("CHAIN")),
                ("status_code", Value::from("ERROR")),
                ("status_message", Value::from("Context length exceeded")),
            ]));
        }
        rows.push(record(&[
            ("context.trace_id", Value::from("t9")),
            ("span_kind", Value::from("TOOL")),
            ("status_code", Value::from("OK")),
            ("latency_ms", Value::Int(1000)),
        ]));
        rows
    }

    #[tokio::test]
    async fn test_analyze_errors_clusters_messages() {
        let ctx = context(Arc::new(MockExporter::new(spans())));
        let result = call_tool(&ctx, "analyze_errors", json!({"project_name": "chatbot", "limit": 3}))
            .await
            .unwrap();

        assert_eq!(result["error_count"], 20);
        assert_eq!(result["source"], "export");
        assert_eq!(
            result["error_patterns"],
            json!([
                {"message": "Rate limit exceeded", "count": 15},
                {"message": "Context length exceeded", "count": 5},
            ])
        );
        assert_eq!(result["sample_errors"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_analyze_errors_counts_message_only_errors() {
        let rows = vec![
            record(&[
                ("status_code", Value::from("OK")),
                ("status_message", Value::from("upstream timeout")),
            ]),
            record(&[("status_code", Value::from("ERROR"))]),
            record(&[("status_code", Value::from("OK"))]),
        ];
        let exporter = Arc::new(MockExporter::new(rows));
        let ctx = context(exporter.clone());
        let result = call_tool(&ctx, "analyze_errors", json!({"project_name": "chatbot"}))
            .await
            .unwrap();

        assert_eq!(result["error_count"], 2);
        assert_eq!(result["unlabeled"], 1);
        assert_eq!(
            result["error_patterns"],
            json!([{"message": "upstream timeout", "count": 1}])
        );
        assert_eq!(exporter.requests()[0].filter, None);
    }

    #[tokio::test]
    async fn test_analyze_errors_empty() {
        let ctx = context(Arc::new(MockExporter::new(vec![])));
        let result = call_tool(&ctx, "analyze_errors", json!({"project_name": "chatbot"}))
            .await
            .unwrap();
        assert_eq!(result["error_count"], 0);
        assert!(result["message"].is_string());
        assert_eq!(result["time_range_days"], 7.0);
    }

    #[tokio::test]
    async fn test_analyze_latency_by_kind() {
        let ctx = context(Arc::new(MockExporter::new(spans())));
        let result = call_tool(
            &ctx,
            "analyze_latency",
            json!({"project_name": "chatbot", "span_kind": "llm"}),
        )
        .await
        .unwrap();

        assert_eq!(result["span_count"], 15);
        assert_eq!(result["span_kind"], "LLM");
        assert_eq!(result["count"], 15);
        assert_eq!(result["min_ms"], 10.0);
        assert_eq!(result["max_ms"], 50.0);
        assert_eq!(result["p50_ms"], 30.0);
    }

    #[tokio::test]
    async fn test_analyze_latency_counts_skipped() {
        let ctx = context(Arc::new(MockExporter::new(spans())));
        let result = call_tool(&ctx, "analyze_latency", json!({"project_name": "chatbot"}))
            .await
            .unwrap();
        assert_eq!(result["span_count"], 21);
        assert_eq!(result["count"], 16);
        assert_eq!(result["skipped"], 5);
        assert_eq!(result["max_ms"], 1000.0);
        assert!(result["span_kind"].is_null());
    }

    #[tokio::test]
    async fn test_trace_statistics() {
        let ctx = context(Arc::new(MockExporter::new(spans())));
        let result = call_tool(&ctx, "get_trace_statistics", json!({"project_name": "chatbot"}))
            .await
            .unwrap();

        assert_eq!(result["total_spans"], 21);
        assert_eq!(result["unique_traces"], 6);
        assert_eq!(result["by_span_kind"]["LLM"], 15);
        assert_eq!(result["by_status"]["ERROR"], 20);
        assert_eq!(result["groups"][0]["span_kind"], "LLM");
        assert_eq!(
            result["token_usage"]["attributes.llm.token_count.total"]["sum"],
            1500.0
        );
    }
}
