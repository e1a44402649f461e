use futures::FutureExt;
use serde::Deserialize;
use serde_json::json;

use super::{default_days, resolve, with_fields, ToolContext, ToolError};
use crate::query::InvalidParameter;
use crate::source::{NamedSource, TracingSchema};

pub const SCHEMA_HINT: &str = "Use export_traces to see the columns present in the trace data.";

/// Lists projects from the first catalog that answers, in catalog order
pub async fn list_projects(ctx: &ToolContext) -> Result<serde_json::Value, ToolError> {
    let sources = ctx
        .catalogs
        .iter()
        .map(|catalog| {
            let catalog = catalog.clone();
            NamedSource::new(
                catalog.name().to_string(),
                async move { catalog.list_projects().await }.boxed(),
            )
        })
        .collect();

    let answer = ctx.dispatcher.dispatch(sources).await?;

    let mut result = json!({
        "projects": answer.value,
        "count": answer.value.len(),
        "source": answer.source,
    });
    if let Some(first) = answer.tried.first().filter(|first| **first != answer.source) {
        result["note"] = json!(format!("Retrieved via {} after {} failed", answer.source, first));
    }
    Ok(result)
}

#[derive(Debug, Deserialize)]
pub struct SchemaArgs {
    pub model_id: String,
    #[serde(default = "default_days")]
    pub days: f64,
}

/// Tracing schema of a model, from the first schema catalog that knows it
pub async fn get_model_schema(ctx: &ToolContext, args: SchemaArgs) -> Result<serde_json::Value, ToolError> {
    let model_id = args.model_id.trim();
    if model_id.is_empty() {
        return Err(InvalidParameter::new("model_id", "must not be empty").into());
    }
    let window = resolve(ctx, args.days, None, None)?;

    let sources = ctx
        .schemas
        .iter()
        .map(|catalog| {
            let catalog = catalog.clone();
            NamedSource::new(
                catalog.name().to_string(),
                async move { catalog.tracing_schema(model_id, &window).await }.boxed(),
            )
        })
        .collect();

    let answer = ctx.dispatcher.dispatch(sources).await?;

    let result = match answer.value {
        Some(schema) => with_fields(&schema, json!({ "source": answer.source })),
        None => with_fields(
            &TracingSchema::default(),
            json!({ "source": answer.source, "hint": SCHEMA_HINT }),
        ),
    };
    Ok(result)
}
