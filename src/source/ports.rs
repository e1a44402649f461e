use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::data::Record;
use crate::query::QueryWindow;

/// One span export against the backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRequest {
    pub project_name: String,
    pub window: QueryWindow,
    /// Backend filter expression, already rendered
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
}

impl ExportRequest {
    pub fn new(project_name: impl Into<String>, window: QueryWindow) -> Self {
        Self {
            project_name: project_name.into(),
            window,
            filter: None,
            columns: None,
        }
    }

    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_columns(mut self, columns: Option<Vec<String>>) -> Self {
        self.columns = columns;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, rename = "modelType", skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
}

/// One column of a project's tracing schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(default, alias = "dataType")]
    pub data_type: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Columns the backend has seen for a project over a window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TracingSchema {
    pub model_name: Option<String>,
    pub span_properties: Vec<SchemaField>,
    pub llm_evals: Vec<SchemaField>,
    pub annotations: Vec<SchemaField>,
}

/// Exports span rows for a project and window
#[async_trait]
pub trait SpanExporter: Send + Sync {
    /// Rows in backend order, normalized
    async fn export_spans(&self, request: &ExportRequest) -> Result<Vec<Record>, SourceError>;
}

/// Lists the projects visible to the configured credentials
#[async_trait]
pub trait ProjectCatalog: Send + Sync {
    /// Source name reported back to callers
    fn name(&self) -> &str;

    async fn list_projects(&self) -> Result<Vec<Project>, SourceError>;
}

/// Describes the columns available for a project
#[async_trait]
pub trait SchemaCatalog: Send + Sync {
    fn name(&self) -> &str;

    /// `None` when the backend knows no schema for the model in the window
    async fn tracing_schema(
        &self,
        model_id: &str,
        window: &QueryWindow,
    ) -> Result<Option<TracingSchema>, SourceError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote error (HTTP {status}): {body}")]
    Remote { status: u16, body: String },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("GraphQL error: {0}")]
    Graphql(String),
}
