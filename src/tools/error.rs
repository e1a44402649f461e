use serde::Serialize;
use serde_json::json;

use crate::data::SpanKind;
use crate::query::InvalidParameter;
use crate::source::{DispatchError, SourceError};

/// Failure taxonomy surfaced to tool callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidParameter,
    SourceFailure,
    AllSourcesExhausted,
    UnknownTool,
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error(transparent)]
    InvalidParameter(#[from] InvalidParameter),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            ToolError::Source(_) => ErrorKind::SourceFailure,
            ToolError::Dispatch(DispatchError::AllSourcesExhausted { .. }) => {
                ErrorKind::AllSourcesExhausted
            }
            ToolError::Dispatch(DispatchError::NoSources) => ErrorKind::SourceFailure,
            ToolError::UnknownTool(_) => ErrorKind::UnknownTool,
        }
    }

    /// Innermost backend error, if any
    fn source_error(&self) -> Option<&SourceError> {
        match self {
            ToolError::Source(e) => Some(e),
            ToolError::Dispatch(DispatchError::AllSourcesExhausted { last_error, .. }) => {
                Some(last_error)
            }
            _ => None,
        }
    }

    fn is_authentication(&self) -> bool {
        if matches!(self.source_error(), Some(SourceError::Authentication(_))) {
            return true;
        }
        let message = self.to_string().to_lowercase();
        message.contains("unauthenticated") || message.contains("api key") || message.contains("401")
    }

    fn is_not_found(&self) -> bool {
        matches!(self.source_error(), Some(SourceError::NotFound(_)))
            || self.to_string().to_lowercase().contains("not found")
    }

    /// JSON payload `{error, kind, hint, details?}` returned instead of a fault
    pub fn to_payload(&self, tool: &str, project_name: Option<&str>) -> serde_json::Value {
        let kind = self.kind();
        let message = self.to_string();

        let (error, hint, details) = match self {
            ToolError::InvalidParameter(p) if p.parameter == "span_kind" => (
                message,
                "Use one of the valid span kinds (case-insensitive).".to_string(),
                Some(json!({ "valid_kinds": SpanKind::valid_names() })),
            ),
            ToolError::InvalidParameter(p) => (
                message,
                format!("Check the '{}' argument and try again.", p.parameter),
                None,
            ),
            ToolError::UnknownTool(_) => (
                message,
                "List the available tools with GET /tools.".to_string(),
                None,
            ),
            _ if tool == "get_model_schema" => (
                message,
                super::projects::SCHEMA_HINT.to_string(),
                None,
            ),
            _ if self.is_authentication() => (
                "Authentication failed".to_string(),
                "Verify that TRACESCOPE_API_KEY is valid and has export permissions.".to_string(),
                Some(json!(message)),
            ),
            _ if tool == "list_projects" && kind == ErrorKind::AllSourcesExhausted => (
                message,
                "If you know the project name, use it directly with export_traces.".to_string(),
                None,
            ),
            _ if self.is_not_found() => (
                match project_name {
                    Some(name) => format!("Project '{}' not found", name),
                    None => "Not found".to_string(),
                },
                "Check that the project name matches exactly (case-sensitive).".to_string(),
                Some(json!(message)),
            ),
            _ if kind == ErrorKind::AllSourcesExhausted => (
                message,
                "Every data source failed; retry later or narrow the time window.".to_string(),
                None,
            ),
            _ => (
                message,
                "The backend request failed; retry later.".to_string(),
                None,
            ),
        };

        let mut payload = json!({
            "error": error,
            "kind": kind,
            "hint": hint,
        });
        if let Some(details) = details {
            payload["details"] = details;
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_span_kind_lists_valid_kinds() {
        let err = ToolError::from(InvalidParameter::new("span_kind", "unknown span kind 'INVALID'"));
        let payload = err.to_payload("filter_spans", Some("chatbot"));
        assert_eq!(payload["kind"], "invalid_parameter");
        assert_eq!(payload["details"]["valid_kinds"].as_array().map(Vec::len), Some(6));
        assert!(payload["hint"].is_string());
    }

    #[test]
    fn test_authentication_hint() {
        let err = ToolError::from(SourceError::Authentication("Invalid API key".into()));
        let payload = err.to_payload("export_traces", Some("chatbot"));
        assert_eq!(payload["error"], "Authentication failed");
        assert!(payload["hint"].as_str().unwrap().contains("API_KEY"));
        assert_eq!(payload["kind"], "source_failure");

        let err = ToolError::from(SourceError::Remote {
            status: 400,
            body: "request unauthenticated".into(),
        });
        assert_eq!(err.to_payload("export_traces", None)["error"], "Authentication failed");
    }

    #[test]
    fn test_not_found_hint_names_project() {
        let err = ToolError::from(DispatchError::AllSourcesExhausted {
            tried: vec!["server_filter".into(), "client_filter".into()],
            last_error: SourceError::NotFound("chatbot".into()),
        });
        let payload = err.to_payload("filter_spans", Some("chatbot"));
        assert_eq!(payload["error"], "Project 'chatbot' not found");
        assert_eq!(payload["kind"], "all_sources_exhausted");
        assert!(payload["hint"].as_str().unwrap().contains("case-sensitive"));
    }

    #[test]
    fn test_exhausted_project_listing_hint() {
        let err = ToolError::from(DispatchError::AllSourcesExhausted {
            tried: vec!["rest".into(), "graphql".into()],
            last_error: SourceError::Graphql("boom".into()),
        });
        let payload = err.to_payload("list_projects", None);
        assert!(payload["hint"].as_str().unwrap().contains("project name"));
        assert!(payload["error"].as_str().unwrap().contains("rest, graphql"));
    }

    #[test]
    fn test_schema_failures_point_to_export() {
        let err = ToolError::from(SourceError::Authentication("developer permissions".into()));
        let payload = err.to_payload("get_model_schema", None);
        assert_eq!(payload["kind"], "source_failure");
        assert!(payload["error"].as_str().unwrap().contains("developer permissions"));
        assert!(payload["hint"].as_str().unwrap().contains("export_traces"));
    }

    #[test]
    fn test_payload_always_has_error_and_hint() {
        let errors = vec![
            ToolError::UnknownTool("nope".into()),
            ToolError::from(SourceError::Network("connection refused".into())),
            ToolError::from(DispatchError::NoSources),
        ];
        for err in errors {
            let payload = err.to_payload("export_traces", None);
            assert!(payload["error"].is_string());
            assert!(payload["hint"].is_string());
        }
    }
}
