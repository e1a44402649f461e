//! Span field model over normalized records
//!
//! Exported rows carry the same semantic field under different column names
//! depending on backend and SDK version, so every accessor goes through a
//! fixed alias list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Record, Value};

pub const TRACE_ID_FIELDS: &[&str] = &["context.trace_id", "trace_id"];
pub const SPAN_ID_FIELDS: &[&str] = &["context.span_id", "span_id"];
pub const KIND_FIELDS: &[&str] = &["span_kind", "attributes.openinference.span.kind", "kind"];
pub const STATUS_FIELDS: &[&str] = &["status_code", "status"];
pub const STATUS_MESSAGE_FIELDS: &[&str] = &[
    "status_message",
    "exception.message",
    "attributes.exception.message",
];
pub const LATENCY_FIELDS: &[&str] = &["latency_ms", "duration_ms", "attributes.latency_ms"];
pub const START_TIME_FIELD: &str = "start_time";
pub const END_TIME_FIELD: &str = "end_time";

/// Token counters summed by the statistics tools unless configured otherwise
pub const DEFAULT_USAGE_FIELDS: &[&str] = &[
    "attributes.llm.token_count.total",
    "attributes.llm.token_count.prompt",
    "attributes.llm.token_count.completion",
];

/// Span kind as recorded by LLM instrumentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanKind {
    Llm,
    Chain,
    Retriever,
    Tool,
    Embedding,
    Agent,
}

impl SpanKind {
    pub const ALL: [SpanKind; 6] = [
        SpanKind::Llm,
        SpanKind::Chain,
        SpanKind::Retriever,
        SpanKind::Tool,
        SpanKind::Embedding,
        SpanKind::Agent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpanKind::Llm => "LLM",
            SpanKind::Chain => "CHAIN",
            SpanKind::Retriever => "RETRIEVER",
            SpanKind::Tool => "TOOL",
            SpanKind::Embedding => "EMBEDDING",
            SpanKind::Agent => "AGENT",
        }
    }

    /// Case-insensitive lookup; `None` for anything unrecognized
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
    }

    pub fn valid_names() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.as_str()).collect()
    }
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Span status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanStatus {
    Unset,
    Ok,
    Error,
}

impl SpanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanStatus::Unset => "UNSET",
            SpanStatus::Ok => "OK",
            SpanStatus::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "OK" | "STATUS_CODE_OK" => SpanStatus::Ok,
            "ERROR" | "STATUS_CODE_ERROR" => SpanStatus::Error,
            _ => SpanStatus::Unset,
        }
    }

    /// OTLP numeric status codes
    pub fn from_i64(v: i64) -> Self {
        match v {
            1 => SpanStatus::Ok,
            2 => SpanStatus::Error,
            _ => SpanStatus::Unset,
        }
    }
}

/// Read-only semantic view over a normalized record
#[derive(Debug, Clone, Copy)]
pub struct SpanView<'a> {
    record: &'a Record,
}

impl<'a> SpanView<'a> {
    pub fn new(record: &'a Record) -> Self {
        Self { record }
    }

    /// First non-null value among the aliases
    pub fn field(&self, aliases: &[&str]) -> Option<&'a Value> {
        aliases
            .iter()
            .filter_map(|name| self.record.get(*name))
            .find(|v| !v.is_null())
    }

    fn text(&self, aliases: &[&str]) -> Option<&'a str> {
        self.field(aliases).and_then(Value::as_str)
    }

    pub fn trace_id(&self) -> Option<&'a str> {
        self.text(TRACE_ID_FIELDS)
    }

    pub fn span_id(&self) -> Option<&'a str> {
        self.text(SPAN_ID_FIELDS)
    }

    /// Raw kind label as exported, for case-insensitive matching and grouping
    pub fn kind_label(&self) -> Option<&'a str> {
        self.text(KIND_FIELDS).map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn kind(&self) -> Option<SpanKind> {
        self.kind_label().and_then(SpanKind::parse)
    }

    pub fn status(&self) -> SpanStatus {
        match self.field(STATUS_FIELDS) {
            Some(Value::String(s)) => SpanStatus::parse(s),
            Some(Value::Int(code)) => SpanStatus::from_i64(*code),
            _ => SpanStatus::Unset,
        }
    }

    /// Trimmed, non-empty status message
    pub fn status_message(&self) -> Option<&'a str> {
        self.text(STATUS_MESSAGE_FIELDS)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// A span counts as an error when its status says so or when it carries
    /// a status message; backends do not set the status enum consistently.
    pub fn is_error(&self) -> bool {
        self.status() == SpanStatus::Error || self.status_message().is_some()
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.timestamp(START_TIME_FIELD)
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.timestamp(END_TIME_FIELD)
    }

    fn timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        let s = self.record.get(field)?.as_str()?;
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Latency in milliseconds, provided or derived from start/end.
    ///
    /// `None` when missing or when the record violates
    /// `end_time >= start_time` / `latency_ms >= 0`.
    pub fn latency_ms(&self) -> Option<f64> {
        if let Some(value) = self.field(LATENCY_FIELDS) {
            return value.as_f64().filter(|ms| ms.is_finite() && *ms >= 0.0);
        }
        let (start, end) = (self.start_time()?, self.end_time()?);
        if end < start {
            return None;
        }
        let micros = (end - start).num_microseconds()?;
        Some(micros as f64 / 1000.0)
    }
}
