//! Client-side span filtering
//!
//! Re-applies the conditions of a predicate to the rows a source returned.
//! Each condition yields a row mask; masks are ANDed so the surviving
//! records keep their backend order.

use regex::Regex;
use serde::Serialize;

use super::parser::{parse_where, Filter, FilterOperator};
use super::predicate::{Condition, Predicate};
use crate::data::{Record, SpanView, Value};

/// A bitmask representing which records pass a condition
#[derive(Clone, Debug)]
pub struct RowMask {
    /// Bit array where 1 = row passes, 0 = row fails
    bits: Vec<u64>,
    len: usize,
    /// Count of passing rows
    count: usize,
}

impl RowMask {
    /// Create a mask where all rows pass
    pub fn all_true(len: usize) -> Self {
        let num_words = (len + 63) / 64;
        let mut bits = vec![u64::MAX; num_words];

        // Clear bits beyond len
        if len % 64 != 0 {
            bits[num_words - 1] = (1u64 << (len % 64)) - 1;
        }

        Self {
            bits,
            len,
            count: len,
        }
    }

    pub fn all_false(len: usize) -> Self {
        Self {
            bits: vec![0u64; (len + 63) / 64],
            len,
            count: 0,
        }
    }

    /// Build a mask by evaluating `pred` on every row index
    pub fn from_fn(len: usize, mut pred: impl FnMut(usize) -> bool) -> Self {
        let mut mask = Self::all_false(len);
        for i in 0..len {
            if pred(i) {
                mask.set(i);
            }
        }
        mask
    }

    #[inline]
    pub fn get(&self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        (self.bits[index / 64] & (1u64 << (index % 64))) != 0
    }

    #[inline]
    pub fn set(&mut self, index: usize) {
        if index >= self.len {
            return;
        }
        let (word, bit) = (index / 64, index % 64);
        if self.bits[word] & (1u64 << bit) == 0 {
            self.bits[word] |= 1u64 << bit;
            self.count += 1;
        }
    }

    /// AND this mask with another (intersection)
    pub fn and(&mut self, other: &RowMask) {
        for (a, b) in self.bits.iter_mut().zip(other.bits.iter()) {
            *a &= *b;
        }
        self.count = self.bits.iter().map(|w| w.count_ones() as usize).sum();
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn all(&self) -> bool {
        self.count == self.len
    }
}

/// Which of the predicate's conditions the answering source already applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterMode {
    /// The pushdown clause was sent and honoured by the source
    pub server_applied: bool,
}

impl FilterMode {
    pub fn server_filtered() -> Self {
        Self {
            server_applied: true,
        }
    }

    pub fn client_only() -> Self {
        Self {
            server_applied: false,
        }
    }
}

/// A condition that could not be evaluated locally and was not applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialFilter {
    pub expression: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub records: Vec<Record>,
    pub dropped: usize,
    pub warnings: Vec<PartialFilter>,
}

pub fn apply_filters(records: Vec<Record>, predicate: &Predicate, mode: &FilterMode) -> FilterOutcome {
    let len = records.len();
    let mut combined = RowMask::all_true(len);
    let mut warnings = Vec::new();

    for condition in predicate.conditions() {
        let mask = match condition {
            Condition::SpanKind(kind) => RowMask::from_fn(len, |i| {
                SpanView::new(&records[i])
                    .kind_label()
                    .is_some_and(|label| label.eq_ignore_ascii_case(kind.as_str()))
            }),
            Condition::HasError(wanted) => {
                RowMask::from_fn(len, |i| SpanView::new(&records[i]).is_error() == *wanted)
            }
            Condition::TraceId(id) => RowMask::from_fn(len, |i| {
                SpanView::new(&records[i])
                    .trace_id()
                    .is_some_and(|t| t.eq_ignore_ascii_case(id))
            }),
            Condition::Expression(expr) => {
                if mode.server_applied {
                    continue;
                }
                match expression_mask(&records, expr) {
                    Ok(mask) => mask,
                    Err(reason) => {
                        tracing::warn!(expression = %expr, reason = %reason, "Expression not applied client-side");
                        warnings.push(PartialFilter {
                            expression: expr.clone(),
                            reason,
                        });
                        continue;
                    }
                }
            }
        };
        combined.and(&mask);
    }

    let dropped = len - combined.count();
    let records = if combined.all() {
        records
    } else {
        records
            .into_iter()
            .enumerate()
            .filter(|(i, _)| combined.get(*i))
            .map(|(_, r)| r)
            .collect()
    };

    tracing::debug!(kept = records.len(), dropped, "Applied client-side filters");

    FilterOutcome {
        records,
        dropped,
        warnings,
    }
}

/// Whether an expression can be evaluated locally; the error is the reason it can't
pub fn check_expression(expr: &str) -> Result<(), String> {
    expression_mask(&[], expr).map(|_| ())
}

fn expression_mask(records: &[Record], expr: &str) -> Result<RowMask, String> {
    let filters = parse_where(expr).map_err(|e| e.to_string())?;
    let mut mask = RowMask::all_true(records.len());
    for filter in &filters {
        let matcher = Matcher::compile(filter)?;
        mask.and(&RowMask::from_fn(records.len(), |i| {
            matcher.matches(records[i].get(&filter.column).unwrap_or(&Value::Null))
        }));
    }
    Ok(mask)
}

/// A parsed filter with its LIKE pattern compiled once
struct Matcher<'a> {
    filter: &'a Filter,
    pattern: Option<Regex>,
}

impl<'a> Matcher<'a> {
    fn compile(filter: &'a Filter) -> Result<Self, String> {
        let pattern = match filter.operator {
            FilterOperator::Like | FilterOperator::NotLike => {
                let Value::String(p) = &filter.value else {
                    return Err(format!("LIKE pattern must be a string, got {}", filter.value.type_name()));
                };
                Some(like_regex(p).map_err(|e| e.to_string())?)
            }
            _ => None,
        };
        Ok(Self { filter, pattern })
    }

    /// SQL semantics: comparisons against NULL never match
    fn matches(&self, value: &Value) -> bool {
        use std::cmp::Ordering::*;

        let target = &self.filter.value;
        match self.filter.operator {
            FilterOperator::IsNull => value.is_null(),
            FilterOperator::IsNotNull => !value.is_null(),
            FilterOperator::Eq => value.compare(target) == Some(Equal),
            FilterOperator::NotEq => matches!(value.compare(target), Some(Less | Greater)),
            FilterOperator::Lt => value.compare(target) == Some(Less),
            FilterOperator::LtEq => matches!(value.compare(target), Some(Less | Equal)),
            FilterOperator::Gt => value.compare(target) == Some(Greater),
            FilterOperator::GtEq => matches!(value.compare(target), Some(Greater | Equal)),
            FilterOperator::Like | FilterOperator::NotLike => {
                let (Some(re), Some(s)) = (&self.pattern, value.as_str()) else {
                    return false;
                };
                re.is_match(s) == (self.filter.operator == FilterOperator::Like)
            }
        }
    }
}

fn like_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("(?s)^");
    for c in pattern.chars() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            other => re.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    re.push('$');
    Regex::new(&re)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SpanKind;

    fn record(fields: &[(&str, Value)]) -> Record {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn kinded(i: usize) -> Record {
        let kind = if i % 10 < 3 { "LLM" } else { "CHAIN" };
        record(&[
            ("context.span_id", Value::from(format!("span-{}", i))),
            ("span_kind", Value::from(kind)),
        ])
    }

    #[test]
    fn test_row_mask_all_true() {
        let mask = RowMask::all_true(100);
        assert_eq!(mask.count(), 100);
        assert!(mask.all());
        assert!(mask.get(99));
        assert!(!mask.get(100));
    }

    #[test]
    fn test_row_mask_set_and() {
        let mut mask1 = RowMask::all_false(70);
        mask1.set(1);
        mask1.set(2);
        mask1.set(65);
        mask1.set(65);

        let mask2 = RowMask::from_fn(70, |i| i != 1);

        mask1.and(&mask2);
        assert_eq!(mask1.count(), 2);
        assert!(!mask1.get(1));
        assert!(mask1.get(2) && mask1.get(65));
    }

    #[test]
    fn test_kind_filter_keeps_order() {
        let records: Vec<Record> = (0..100).map(kinded).collect();
        let expected: Vec<Record> = records
            .iter()
            .filter(|r| r.get("span_kind") == Some(&Value::from("LLM")))
            .cloned()
            .collect();
        assert_eq!(expected.len(), 30);

        let predicate = Predicate::new().and(Condition::SpanKind(SpanKind::Llm));
        let outcome = apply_filters(records, &predicate, &FilterMode::server_filtered());

        assert_eq!(outcome.records, expected);
        assert_eq!(outcome.dropped, 70);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_kind_match_is_case_insensitive() {
        let records = vec![
            record(&[("span_kind", Value::from("llm"))]),
            record(&[("attributes.openinference.span.kind", Value::from("Llm"))]),
            record(&[("span_kind", Value::from("TOOL"))]),
            record(&[]),
        ];
        let predicate = Predicate::new().and(Condition::SpanKind(SpanKind::Llm));
        let outcome = apply_filters(records, &predicate, &FilterMode::client_only());
        assert_eq!(outcome.records.len(), 2);
    }

    #[test]
    fn test_error_filter_is_lenient() {
        let records = vec![
            record(&[("status_code", Value::from("ERROR"))]),
            record(&[
                ("status_code", Value::from("OK")),
                ("status_message", Value::from("boom")),
            ]),
            record(&[("status_code", Value::from("OK"))]),
        ];

        let errors = apply_filters(
            records.clone(),
            &Predicate::new().and(Condition::HasError(true)),
            &FilterMode::server_filtered(),
        );
        assert_eq!(errors.records.len(), 2);

        let healthy = apply_filters(
            records,
            &Predicate::new().and(Condition::HasError(false)),
            &FilterMode::server_filtered(),
        );
        assert_eq!(healthy.records.len(), 1);
        assert_eq!(healthy.dropped, 2);
    }

    #[test]
    fn test_expression_skipped_when_server_applied() {
        let records = vec![
            record(&[("latency_ms", Value::Int(10))]),
            record(&[("latency_ms", Value::Int(5000))]),
        ];
        let predicate = Predicate::new().and(Condition::Expression("latency_ms > 1000".into()));

        let server = apply_filters(records.clone(), &predicate, &FilterMode::server_filtered());
        assert_eq!(server.records.len(), 2);

        let client = apply_filters(records, &predicate, &FilterMode::client_only());
        assert_eq!(client.records.len(), 1);
        assert_eq!(client.records[0].get("latency_ms"), Some(&Value::Int(5000)));
    }

    #[test]
    fn test_expression_operators() {
        let records = vec![
            record(&[
                ("name", Value::from("retrieve_docs")),
                ("attributes.llm.token_count.total", Value::from("1200")),
            ]),
            record(&[
                ("name", Value::from("ChatCompletion")),
                ("attributes.llm.token_count.total", Value::Int(300)),
                ("status_message", Value::from("rate limited")),
            ]),
            record(&[("name", Value::from("Retrieve_all"))]),
        ];

        let run = |expr: &str| {
            let predicate = Predicate::new().and(Condition::Expression(expr.into()));
            apply_filters(records.clone(), &predicate, &FilterMode::client_only())
                .records
                .len()
        };

        assert_eq!(run("name LIKE 'retrieve%'"), 1);
        assert_eq!(run("name NOT LIKE 'retrieve%'"), 2);
        assert_eq!(run("name LIKE 'Chat_ompletion'"), 1);
        assert_eq!(run("attributes.llm.token_count.total >= 1000"), 1);
        assert_eq!(run("attributes.llm.token_count.total != 300"), 1);
        assert_eq!(run("status_message IS NULL"), 2);
        assert_eq!(run("status_message IS NOT NULL AND name = 'ChatCompletion'"), 1);
    }

    #[test]
    fn test_unsupported_expression_warns_and_keeps_rows() {
        let records = vec![record(&[("span_kind", Value::from("LLM"))]), record(&[])];
        let predicate = Predicate::new()
            .and(Condition::SpanKind(SpanKind::Llm))
            .and(Condition::Expression("a = 1 OR b = 2".into()));

        let outcome = apply_filters(records, &predicate, &FilterMode::client_only());
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].expression, "a = 1 OR b = 2");
        assert!(outcome.warnings[0].reason.contains("OR"));
    }

    #[test]
    fn test_trace_id_filter() {
        let records = vec![
            record(&[("context.trace_id", Value::from("ABC123"))]),
            record(&[("trace_id", Value::from("def456"))]),
        ];
        let predicate = Predicate::new().and(Condition::TraceId("abc123".into()));
        let outcome = apply_filters(records, &predicate, &FilterMode::server_filtered());
        assert_eq!(outcome.records.len(), 1);
    }

    #[test]
    fn test_like_regex_escapes_metacharacters() {
        let re = like_regex("a.b%").unwrap();
        assert!(re.is_match("a.bcd"));
        assert!(!re.is_match("axbcd"));
    }
}
