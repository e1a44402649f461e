//! Filter predicate construction
//!
//! Turns tool parameters into a conjunction of conditions. Structural
//! conditions are rendered from fixed column/operator pairs with escaped
//! literals; free-form expressions stay opaque and are only ever ANDed in,
//! parenthesised.

use crate::data::SpanKind;

use super::InvalidParameter;

pub const KIND_COLUMN: &str = "span_kind";
pub const STATUS_COLUMN: &str = "status_code";
pub const TRACE_ID_COLUMN: &str = "context.trace_id";

pub const MAX_WHERE_LEN: usize = 2048;

/// Where a structural condition may be evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pushdown {
    /// Sent to the backend and re-checked on the returned rows
    ServerAndClient,
    /// Backend filtering on this column is unreliable; evaluate locally only
    ClientOnly,
}

/// Per-column pushdown policy
pub const PUSHDOWN_POLICY: &[(&str, Pushdown)] = &[
    (KIND_COLUMN, Pushdown::ClientOnly),
    (STATUS_COLUMN, Pushdown::ServerAndClient),
    (TRACE_ID_COLUMN, Pushdown::ServerAndClient),
];

pub fn pushdown_for(column: &str) -> Pushdown {
    PUSHDOWN_POLICY
        .iter()
        .find(|(c, _)| *c == column)
        .map(|(_, p)| *p)
        .unwrap_or(Pushdown::ServerAndClient)
}

/// Whether span kind filtering has to be applied after retrieval
pub fn kind_filter_deferred() -> bool {
    pushdown_for(KIND_COLUMN) == Pushdown::ClientOnly
}

/// One atomic condition of a predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    SpanKind(SpanKind),
    HasError(bool),
    TraceId(String),
    /// Opaque backend expression, passed through verbatim
    Expression(String),
}

impl Condition {
    /// Column this condition constrains, `None` for free-form expressions
    pub fn column(&self) -> Option<&'static str> {
        match self {
            Condition::SpanKind(_) => Some(KIND_COLUMN),
            Condition::HasError(_) => Some(STATUS_COLUMN),
            Condition::TraceId(_) => Some(TRACE_ID_COLUMN),
            Condition::Expression(_) => None,
        }
    }

    pub fn pushdown(&self) -> Pushdown {
        match self {
            // The backend only sees the status enum, which is narrower than
            // the local error check (a status message alone also counts)
            Condition::HasError(true) => Pushdown::ClientOnly,
            _ => self
                .column()
                .map(pushdown_for)
                .unwrap_or(Pushdown::ServerAndClient),
        }
    }

    pub fn render(&self) -> String {
        match self {
            Condition::SpanKind(kind) => format!("{} = {}", KIND_COLUMN, quote(kind.as_str())),
            Condition::HasError(true) => format!("{} = {}", STATUS_COLUMN, quote("ERROR")),
            Condition::HasError(false) => format!("{} != {}", STATUS_COLUMN, quote("ERROR")),
            Condition::TraceId(id) => format!("{} = {}", TRACE_ID_COLUMN, quote(id)),
            Condition::Expression(expr) => format!("({})", expr),
        }
    }
}

/// Single-quoted SQL literal with embedded quotes doubled
fn quote(literal: &str) -> String {
    format!("'{}'", literal.replace('\'', "''"))
}

/// Conjunction of conditions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Clause sent to the backend: only conditions the policy lets through
    pub fn pushdown_clause(&self) -> Option<String> {
        join(
            self.conditions
                .iter()
                .filter(|c| c.pushdown() == Pushdown::ServerAndClient),
        )
    }

    pub fn has_pushdown(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.pushdown() == Pushdown::ServerAndClient)
    }

    /// Every condition, for display back to the caller
    pub fn describe(&self) -> Option<String> {
        join(self.conditions.iter())
    }

    /// Columns a client-side pass reads
    pub fn client_columns(&self) -> Vec<&'static str> {
        use crate::data::span::{KIND_FIELDS, STATUS_FIELDS, STATUS_MESSAGE_FIELDS, TRACE_ID_FIELDS};

        let mut columns = Vec::new();
        for condition in &self.conditions {
            match condition {
                Condition::SpanKind(_) => columns.extend_from_slice(KIND_FIELDS),
                Condition::HasError(_) => {
                    columns.extend_from_slice(STATUS_FIELDS);
                    columns.extend_from_slice(STATUS_MESSAGE_FIELDS);
                }
                Condition::TraceId(_) => columns.extend_from_slice(TRACE_ID_FIELDS),
                Condition::Expression(_) => {}
            }
        }
        columns.dedup();
        columns
    }
}

fn join<'a>(conditions: impl Iterator<Item = &'a Condition>) -> Option<String> {
    let rendered: Vec<String> = conditions.map(Condition::render).collect();
    if rendered.is_empty() {
        None
    } else {
        Some(rendered.join(" AND "))
    }
}

/// Raw filter parameters of a tool call
#[derive(Debug, Clone, Default)]
pub struct PredicateParams<'a> {
    pub span_kind: Option<&'a str>,
    pub has_error: Option<bool>,
    pub where_clause: Option<&'a str>,
    pub trace_id: Option<&'a str>,
}

/// Built predicate plus the fixed kind-deferral policy
#[derive(Debug, Clone, PartialEq)]
pub struct PredicatePlan {
    pub predicate: Predicate,
    pub defer_kind: bool,
}

pub fn build_predicate(params: &PredicateParams<'_>) -> Result<PredicatePlan, InvalidParameter> {
    let mut predicate = Predicate::new();

    if let Some(trace_id) = params.trace_id {
        predicate = predicate.and(Condition::TraceId(validate_trace_id(trace_id)?.to_string()));
    }

    if let Some(raw) = params.span_kind.filter(|s| !s.trim().is_empty()) {
        let kind = SpanKind::parse(raw).ok_or_else(|| {
            InvalidParameter::new(
                "span_kind",
                format!(
                    "unknown span kind '{}', expected one of {}",
                    raw,
                    SpanKind::valid_names().join(", ")
                ),
            )
        })?;
        predicate = predicate.and(Condition::SpanKind(kind));
    }

    if let Some(has_error) = params.has_error {
        predicate = predicate.and(Condition::HasError(has_error));
    }

    if let Some(expr) = params.where_clause.map(str::trim).filter(|s| !s.is_empty()) {
        validate_where(expr)?;
        predicate = predicate.and(Condition::Expression(expr.to_string()));
    }

    Ok(PredicatePlan {
        predicate,
        defer_kind: kind_filter_deferred(),
    })
}

fn validate_where(expr: &str) -> Result<(), InvalidParameter> {
    if expr.chars().count() > MAX_WHERE_LEN {
        return Err(InvalidParameter::new(
            "where",
            format!("expression longer than {} characters", MAX_WHERE_LEN),
        ));
    }
    if expr.chars().any(|c| c.is_control() && c != ' ' && c != '\t') {
        return Err(InvalidParameter::new("where", "expression contains control characters"));
    }
    check_structure(expr).map_err(|reason| InvalidParameter::new("where", reason))
}

/// The expression must stay inside its own parentheses once embedded:
/// balanced parentheses, closed literals, no comments or statement separators.
fn check_structure(expr: &str) -> Result<(), &'static str> {
    let mut depth: usize = 0;
    let mut quote: Option<char> = None;
    let mut chars = expr.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            return Err("backslash escapes are not supported");
        }
        if let Some(q) = quote {
            if c == q {
                // Doubled quote is an escaped quote
                if chars.peek() == Some(&q) {
                    chars.next();
                } else {
                    quote = None;
                }
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1).ok_or("unbalanced parentheses")?,
            ';' => return Err("statement separators are not allowed"),
            '-' if chars.peek() == Some(&'-') => return Err("comments are not allowed"),
            '/' if chars.peek() == Some(&'*') => return Err("comments are not allowed"),
            _ => {}
        }
    }

    if quote.is_some() {
        return Err("unterminated quoted literal");
    }
    if depth != 0 {
        return Err("unbalanced parentheses");
    }
    Ok(())
}

/// Trace identifiers must look like `^[a-fA-F0-9-]{1,64}$`
pub fn validate_trace_id(trace_id: &str) -> Result<&str, InvalidParameter> {
    let valid = !trace_id.is_empty()
        && trace_id.len() <= 64
        && trace_id.chars().all(|c| c.is_ascii_hexdigit() || c == '-');
    if valid {
        Ok(trace_id)
    } else {
        Err(InvalidParameter::new(
            "trace_id",
            format!("'{}' is not a valid trace id (1-64 hex characters or '-')", trace_id),
        ))
    }
}
