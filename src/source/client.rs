use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::ports::{
    ExportRequest, Project, ProjectCatalog, SchemaCatalog, SchemaField, SourceError, SpanExporter,
    TracingSchema,
};
use crate::data::{normalize_json_row, Record};
use crate::query::window::QueryWindow;

const LIST_MODELS_QUERY: &str = r#"
query ListModels($spaceId: ID!) {
  node(id: $spaceId) {
    ... on Space {
      models(first: 50) {
        edges { node { id name modelType } }
        pageInfo { hasNextPage }
      }
    }
  }
}
"#;

const GET_TRACING_SCHEMA_QUERY: &str = r#"
query GetTracingSchema($modelId: ID!, $startTime: DateTime!, $endTime: DateTime!) {
  model: node(id: $modelId) {
    ... on Model {
      name
      tracingSchema(startTime: $startTime, endTime: $endTime) {
        spanProperties(first: 50) { edges { node { dimension { name dataType category } } } }
        llmEvals(first: 50) { edges { node { dimension { name dataType category } } } }
        annotations(first: 50) { edges { node { dimension { name dataType category } } } }
      }
    }
  }
}
"#;

/// Endpoints and credentials of the observability backend
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub api_key: String,
    pub space_id: String,
    pub rest_url: String,
    pub graphql_url: String,
    pub export_url: String,
    pub http_timeout: Duration,
}

/// HTTP client for the observability backend
#[derive(Debug, Clone)]
pub struct BackendClient {
    http_client: reqwest::Client,
    settings: BackendSettings,
}

impl BackendClient {
    pub fn new(settings: BackendSettings) -> Result<Self, SourceError> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.http_timeout)
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            settings,
        })
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    /// Export span rows through the JSON export bridge
    pub async fn export(&self, request: &ExportRequest) -> Result<Vec<Record>, SourceError> {
        let body = export_body(&self.settings.space_id, request);

        tracing::debug!(
            project = %request.project_name,
            filter = request.filter.as_deref().unwrap_or(""),
            "Exporting spans"
        );

        let response = self
            .http_client
            .post(&self.settings.export_url)
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;

        let payload = read_json(response, &request.project_name).await?;
        parse_export_rows(payload)
    }

    /// `GET {rest_url}/projects`
    pub async fn rest_projects(&self) -> Result<Vec<Project>, SourceError> {
        let url = format!("{}/projects", self.settings.rest_url.trim_end_matches('/'));

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.settings.api_key)
            .send()
            .await
            .map_err(network_error)?;

        let payload = read_json(response, "/projects").await?;
        parse_rest_projects(payload)
    }

    /// Models of the configured space via GraphQL
    pub async fn graphql_projects(&self) -> Result<Vec<Project>, SourceError> {
        let request = serde_json::json!({
            "query": LIST_MODELS_QUERY,
            "variables": { "spaceId": self.settings.space_id },
        });

        let response = self
            .http_client
            .post(&self.settings.graphql_url)
            .header("x-api-key", &self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(network_error)?;

        let payload = read_json(response, "graphql").await?;
        parse_graphql_models(payload)
    }

    /// Tracing schema of one model via GraphQL
    pub async fn graphql_tracing_schema(
        &self,
        model_id: &str,
        window: &QueryWindow,
    ) -> Result<Option<TracingSchema>, SourceError> {
        let request = serde_json::json!({
            "query": GET_TRACING_SCHEMA_QUERY,
            "variables": {
                "modelId": model_id,
                "startTime": crate::data::value::to_iso(&window.start),
                "endTime": crate::data::value::to_iso(&window.end),
            },
        });

        tracing::debug!(model_id, "Fetching tracing schema");

        let response = self
            .http_client
            .post(&self.settings.graphql_url)
            .header("x-api-key", &self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(network_error)?;

        let payload = read_json(response, model_id).await?;
        parse_tracing_schema(payload)
    }
}

fn network_error(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Network(format!("request timed out: {}", e))
    } else {
        SourceError::Network(e.to_string())
    }
}

async fn read_json(response: reqwest::Response, resource: &str) -> Result<serde_json::Value, SourceError> {
    let status = response.status().as_u16();
    if !response.status().is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, body, resource));
    }
    response
        .json()
        .await
        .map_err(|e| SourceError::Deserialization(e.to_string()))
}

/// Map a non-success HTTP status to a source error
pub fn status_error(status: u16, body: String, resource: &str) -> SourceError {
    match status {
        401 => {
            let detail = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
                .unwrap_or_else(|| "Invalid API key".to_string());
            SourceError::Authentication(detail)
        }
        403 if body.to_lowercase().contains("developer permissions") => SourceError::Authentication(
            "GraphQL API requires developer permissions. Ensure the API key has developer access enabled."
                .to_string(),
        ),
        404 => SourceError::NotFound(resource.to_string()),
        _ => SourceError::Remote { status, body },
    }
}

pub fn export_body(space_id: &str, request: &ExportRequest) -> serde_json::Value {
    let QueryWindow { start, end } = request.window;
    let mut body = serde_json::json!({
        "space_id": space_id,
        "project_name": request.project_name,
        "start_time": crate::data::value::to_iso(&start),
        "end_time": crate::data::value::to_iso(&end),
    });
    if let Some(filter) = &request.filter {
        body["where"] = serde_json::Value::String(filter.clone());
    }
    if let Some(columns) = &request.columns {
        body["columns"] = serde_json::json!(columns);
    }
    body
}

/// Accepts `{"rows": [...]}` or a bare array of row objects
pub fn parse_export_rows(payload: serde_json::Value) -> Result<Vec<Record>, SourceError> {
    let rows = match payload {
        serde_json::Value::Array(rows) => rows,
        serde_json::Value::Object(mut obj) => match obj.remove("rows") {
            Some(serde_json::Value::Array(rows)) => rows,
            Some(serde_json::Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(SourceError::Deserialization(format!(
                    "expected 'rows' to be an array, got {}",
                    other
                )))
            }
        },
        other => {
            return Err(SourceError::Deserialization(format!(
                "unexpected export payload: {}",
                other
            )))
        }
    };

    rows.iter()
        .map(|row| match row {
            serde_json::Value::Object(obj) => Ok(normalize_json_row(obj)),
            other => Err(SourceError::Deserialization(format!(
                "expected row object, got {}",
                other
            ))),
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct RestProjects {
    #[serde(default)]
    projects: Vec<Project>,
}

pub fn parse_rest_projects(payload: serde_json::Value) -> Result<Vec<Project>, SourceError> {
    serde_json::from_value::<RestProjects>(payload)
        .map(|r| r.projects)
        .map_err(|e| SourceError::Deserialization(e.to_string()))
}

pub fn parse_graphql_models(payload: serde_json::Value) -> Result<Vec<Project>, SourceError> {
    if let Some(errors) = payload.get("errors") {
        return Err(SourceError::Graphql(errors.to_string()));
    }
    let edges = payload
        .pointer("/data/node/models/edges")
        .and_then(|e| e.as_array())
        .cloned()
        .unwrap_or_default();

    edges
        .into_iter()
        .filter_map(|edge| edge.get("node").cloned())
        .map(|node| {
            serde_json::from_value::<Project>(node)
                .map_err(|e| SourceError::Deserialization(e.to_string()))
        })
        .collect()
}

/// `None` when the node is missing or is not a model with a schema
pub fn parse_tracing_schema(payload: serde_json::Value) -> Result<Option<TracingSchema>, SourceError> {
    if let Some(errors) = payload.get("errors") {
        return Err(SourceError::Graphql(errors.to_string()));
    }
    let Some(model) = payload.pointer("/data/model").filter(|m| !m.is_null()) else {
        return Ok(None);
    };
    let Some(schema) = model.get("tracingSchema").filter(|s| !s.is_null()) else {
        return Ok(None);
    };

    Ok(Some(TracingSchema {
        model_name: model.get("name").and_then(|n| n.as_str()).map(String::from),
        span_properties: schema_fields(schema, "spanProperties")?,
        llm_evals: schema_fields(schema, "llmEvals")?,
        annotations: schema_fields(schema, "annotations")?,
    }))
}

fn schema_fields(schema: &serde_json::Value, connection: &str) -> Result<Vec<SchemaField>, SourceError> {
    schema
        .get(connection)
        .and_then(|c| c.get("edges"))
        .and_then(|e| e.as_array())
        .into_iter()
        .flatten()
        .filter_map(|edge| edge.pointer("/node/dimension"))
        .map(|dimension| {
            serde_json::from_value::<SchemaField>(dimension.clone())
                .map_err(|e| SourceError::Deserialization(e.to_string()))
        })
        .collect()
}

#[async_trait]
impl SpanExporter for BackendClient {
    async fn export_spans(&self, request: &ExportRequest) -> Result<Vec<Record>, SourceError> {
        self.export(request).await
    }
}

/// REST project listing, the primary catalog
#[derive(Debug, Clone)]
pub struct RestCatalog {
    client: BackendClient,
}

impl RestCatalog {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProjectCatalog for RestCatalog {
    fn name(&self) -> &str {
        "rest"
    }

    async fn list_projects(&self) -> Result<Vec<Project>, SourceError> {
        self.client.rest_projects().await
    }
}

/// GraphQL model listing, used when REST listing fails
#[derive(Debug, Clone)]
pub struct GraphqlCatalog {
    client: BackendClient,
}

impl GraphqlCatalog {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProjectCatalog for GraphqlCatalog {
    fn name(&self) -> &str {
        "graphql"
    }

    async fn list_projects(&self) -> Result<Vec<Project>, SourceError> {
        self.client.graphql_projects().await
    }
}

#[async_trait]
impl SchemaCatalog for GraphqlCatalog {
    fn name(&self) -> &str {
        "graphql"
    }

    async fn tracing_schema(
        &self,
        model_id: &str,
        window: &QueryWindow,
    ) -> Result<Option<TracingSchema>, SourceError> {
        self.client.graphql_tracing_schema(model_id, window).await
    }
}
