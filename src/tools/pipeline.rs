//! Span retrieval shared by every span-reading tool
//!
//! One call builds the source chain for a predicate, dispatches it, and
//! re-applies whatever the answering source did not evaluate.

use futures::FutureExt;

use super::{ToolContext, ToolError};
use crate::data::Record;
use crate::query::{apply_filters, check_expression, parse_where, Condition, FilterMode, PartialFilter, Predicate, QueryWindow};
use crate::source::{ExportRequest, NamedSource};

/// Export with the pushdown clause; the backend filters
pub const SERVER_FILTER: &str = "server_filter";
/// Unfiltered export; every condition is evaluated locally
pub const CLIENT_FILTER: &str = "client_filter";
/// Plain export when nothing can be pushed down
pub const EXPORT: &str = "export";

pub struct SpanQuery<'a> {
    pub project_name: &'a str,
    pub window: QueryWindow,
    pub predicate: &'a Predicate,
    /// Columns to return; `None` for everything the backend exports
    pub columns: Option<&'a [String]>,
}

#[derive(Debug, Clone)]
pub struct FetchedSpans {
    pub records: Vec<Record>,
    pub dropped: usize,
    pub warnings: Vec<PartialFilter>,
    pub source: String,
}

pub async fn fetch_spans(ctx: &ToolContext, query: SpanQuery<'_>) -> Result<FetchedSpans, ToolError> {
    let predicate = query.predicate;
    let request_columns = query
        .columns
        .map(|requested| with_required_columns(requested, predicate));

    let base = ExportRequest::new(query.project_name, query.window).with_columns(request_columns);

    let mut sources = Vec::with_capacity(2);
    if let Some(clause) = predicate.pushdown_clause() {
        let filtered = base.clone().with_filter(Some(clause));
        let exporter = ctx.exporter.clone();
        sources.push(NamedSource::new(
            SERVER_FILTER,
            async move { exporter.export_spans(&filtered).await }.boxed(),
        ));

        let exporter = ctx.exporter.clone();
        let unfiltered = base;
        let call = async move { exporter.export_spans(&unfiltered).await }.boxed();
        // An empty server answer stands when the client could not redo the filter
        sources.push(if locally_evaluable(predicate) {
            NamedSource::new(CLIENT_FILTER, call)
        } else {
            NamedSource::on_error(CLIENT_FILTER, call)
        });
    } else {
        let exporter = ctx.exporter.clone();
        sources.push(NamedSource::new(
            EXPORT,
            async move { exporter.export_spans(&base).await }.boxed(),
        ));
    }

    let answer = ctx.dispatcher.dispatch(sources).await?;

    let mode = if answer.source == SERVER_FILTER {
        FilterMode::server_filtered()
    } else {
        FilterMode::client_only()
    };
    let mut outcome = apply_filters(answer.value, predicate, &mode);

    if let Some(requested) = query.columns {
        for record in &mut outcome.records {
            record.retain(|column, _| requested.iter().any(|c| c == column));
        }
    }

    tracing::info!(
        project = %query.project_name,
        source = %answer.source,
        returned = outcome.records.len(),
        dropped = outcome.dropped,
        "Fetched spans"
    );

    Ok(FetchedSpans {
        records: outcome.records,
        dropped: outcome.dropped,
        warnings: outcome.warnings,
        source: answer.source,
    })
}

fn locally_evaluable(predicate: &Predicate) -> bool {
    predicate.conditions().iter().all(|condition| match condition {
        Condition::Expression(expr) => check_expression(expr).is_ok(),
        _ => true,
    })
}

/// Requested columns plus whatever a client-side pass needs to read
fn with_required_columns(requested: &[String], predicate: &Predicate) -> Vec<String> {
    let mut columns = requested.to_vec();
    let mut push = |column: &str| {
        if !columns.iter().any(|c| c == column) {
            columns.push(column.to_string());
        }
    };

    for column in predicate.client_columns() {
        push(column);
    }
    for condition in predicate.conditions() {
        if let Condition::Expression(expr) = condition {
            if let Ok(filters) = parse_where(expr) {
                for filter in &filters {
                    push(&filter.column);
                }
            }
        }
    }
    columns
}
