//! Aggregate statistics over exported spans
//!
//! Every function here is a pure reduction: same records in, same summary
//! out, regardless of how the records were retrieved.

use std::collections::BTreeMap;

use fxhash::{FxHashMap, FxHashSet};
use serde::Serialize;

use super::aggregates::{
    Accumulator, MaxAccumulator, MomentsAccumulator, PercentileAccumulator, SumAccumulator,
};
use crate::data::{Record, SpanView};

pub const LATENCY_PERCENTILES: [f64; 5] = [50.0, 75.0, 90.0, 95.0, 99.0];

/// Label used for spans without a recognizable kind
pub const UNKNOWN_KIND: &str = "UNKNOWN";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    /// Records with a usable latency
    pub count: usize,
    /// Records with a missing or invalid latency
    pub skipped: usize,
    pub min_ms: Option<f64>,
    pub max_ms: Option<f64>,
    pub mean_ms: Option<f64>,
    pub std_ms: Option<f64>,
    pub p50_ms: Option<f64>,
    pub p75_ms: Option<f64>,
    pub p90_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

pub fn latency_summary(records: &[Record]) -> LatencySummary {
    let mut samples = PercentileAccumulator::new();
    let mut moments = MomentsAccumulator::new();
    let mut skipped = 0;

    for record in records {
        match SpanView::new(record).latency_ms() {
            Some(ms) => {
                samples.push(ms);
                moments.push(ms);
            }
            None => skipped += 1,
        }
    }

    let sorted = samples.sorted();
    let ps: Vec<Option<f64>> = LATENCY_PERCENTILES
        .iter()
        .map(|&p| super::aggregates::percentile(&sorted, p))
        .collect();

    LatencySummary {
        count: sorted.len(),
        skipped,
        min_ms: sorted.first().copied(),
        max_ms: sorted.last().copied(),
        mean_ms: moments.mean(),
        std_ms: moments.std_dev(),
        p50_ms: ps[0],
        p75_ms: ps[1],
        p90_ms: ps[2],
        p95_ms: ps[3],
        p99_ms: ps[4],
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPattern {
    pub message: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorSummary {
    pub total_records: usize,
    pub error_count: usize,
    /// Distinct messages before truncation
    pub distinct_messages: usize,
    /// Errors without any status message
    pub unlabeled: usize,
    #[serde(rename = "error_patterns")]
    pub patterns: Vec<ErrorPattern>,
}

/// Cluster error records by their trimmed status message
pub fn error_patterns(records: &[Record], limit: usize) -> ErrorSummary {
    let mut counts: FxHashMap<&str, usize> = FxHashMap::default();
    let mut error_count = 0;
    let mut unlabeled = 0;

    for record in records {
        let span = SpanView::new(record);
        if !span.is_error() {
            continue;
        }
        error_count += 1;
        match span.status_message() {
            Some(message) => *counts.entry(message).or_insert(0) += 1,
            None => unlabeled += 1,
        }
    }

    let distinct_messages = counts.len();
    let mut patterns: Vec<ErrorPattern> = counts
        .into_iter()
        .map(|(message, count)| ErrorPattern {
            message: message.to_string(),
            count,
        })
        .collect();
    patterns.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.message.cmp(&b.message)));
    patterns.truncate(limit);

    ErrorSummary {
        total_records: records.len(),
        error_count,
        distinct_messages,
        unlabeled,
        patterns,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageTotals {
    pub sum: f64,
    pub mean: f64,
    pub max: f64,
    pub count: u64,
}

/// Per-field usage reduction
#[derive(Default)]
struct UsageAccumulator {
    sum: SumAccumulator,
    moments: MomentsAccumulator,
    max: MaxAccumulator,
}

impl UsageAccumulator {
    fn accumulate(&mut self, value: &crate::data::Value) {
        self.sum.accumulate(value);
        self.moments.accumulate(value);
        self.max.accumulate(value);
    }

    fn totals(&self) -> Option<UsageTotals> {
        Some(UsageTotals {
            sum: self.sum.sum()?,
            mean: self.moments.mean()?,
            max: self.max.max()?,
            count: self.moments.count(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub span_kind: String,
    pub status: String,
    pub count: usize,
    /// Sum of each usage field within the group; fields never seen are omitted
    pub usage: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateSummary {
    pub total_spans: usize,
    pub unique_traces: usize,
    pub by_span_kind: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub groups: Vec<GroupStats>,
    pub token_usage: BTreeMap<String, UsageTotals>,
}

/// Counts by (kind, status) plus usage totals for the given numeric fields
pub fn aggregate_stats<S: AsRef<str>>(records: &[Record], usage_fields: &[S]) -> AggregateSummary {
    let mut traces: FxHashSet<&str> = FxHashSet::default();
    let mut groups: FxHashMap<(String, &'static str), (usize, Vec<SumAccumulator>)> =
        FxHashMap::default();
    let mut usage: Vec<UsageAccumulator> = usage_fields.iter().map(|_| UsageAccumulator::default()).collect();

    for record in records {
        let span = SpanView::new(record);
        if let Some(trace_id) = span.trace_id() {
            traces.insert(trace_id);
        }

        let kind = span
            .kind_label()
            .map(str::to_ascii_uppercase)
            .unwrap_or_else(|| UNKNOWN_KIND.to_string());
        let status = span.status().as_str();

        let (count, sums) = groups.entry((kind, status)).or_insert_with(|| {
            (0, usage_fields.iter().map(|_| SumAccumulator::new()).collect())
        });
        *count += 1;

        for (i, field) in usage_fields.iter().enumerate() {
            if let Some(value) = record.get(field.as_ref()) {
                sums[i].accumulate(value);
                usage[i].accumulate(value);
            }
        }
    }

    let mut by_span_kind = BTreeMap::new();
    let mut by_status = BTreeMap::new();
    let mut group_stats: Vec<GroupStats> = groups
        .into_iter()
        .map(|((span_kind, status), (count, sums))| {
            *by_span_kind.entry(span_kind.clone()).or_insert(0) += count;
            *by_status.entry(status.to_string()).or_insert(0) += count;
            let usage = usage_fields
                .iter()
                .zip(sums.iter())
                .filter_map(|(field, acc)| Some((field.as_ref().to_string(), acc.sum()?)))
                .collect();
            GroupStats {
                span_kind,
                status: status.to_string(),
                count,
                usage,
            }
        })
        .collect();
    group_stats.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.span_kind.cmp(&b.span_kind))
            .then_with(|| a.status.cmp(&b.status))
    });

    let token_usage = usage_fields
        .iter()
        .zip(usage.iter())
        .filter_map(|(field, acc)| Some((field.as_ref().to_string(), acc.totals()?)))
        .collect();

    AggregateSummary {
        total_spans: records.len(),
        unique_traces: traces.len(),
        by_span_kind,
        by_status,
        groups: group_stats,
        token_usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;

    fn record(fields: &[(&str, Value)]) -> Record {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn latencies(values: &[i64]) -> Vec<Record> {
        values
            .iter()
            .map(|&ms| record(&[("latency_ms", Value::Int(ms))]))
            .collect()
    }

    fn error(message: &str) -> Record {
        record(&[
            ("status_code", Value::from("ERROR")),
            ("status_message", Value::from(message)),
        ])
    }

    fn close(actual: Option<f64>, expected: f64) -> bool {
        actual.is_some_and(|a| (a - expected).abs() < 1e-9)
    }

    #[test]
    fn test_latency_percentiles() {
        let summary = latency_summary(&latencies(&[10, 20, 30, 40, 50]));
        assert_eq!(summary.count, 5);
        assert_eq!(summary.min_ms, Some(10.0));
        assert_eq!(summary.max_ms, Some(50.0));
        assert!(close(summary.mean_ms, 30.0));
        assert!(close(summary.p50_ms, 30.0));
        assert!(close(summary.p75_ms, 40.0));
        assert!(close(summary.p90_ms, 46.0));
        assert!(close(summary.p95_ms, 48.0));
        assert!(close(summary.p99_ms, 49.6));
    }

    #[test]
    fn test_latency_order_invariant() {
        let a = latency_summary(&latencies(&[10, 20, 30, 40, 50]));
        let b = latency_summary(&latencies(&[40, 10, 50, 30, 20]));
        assert_eq!(a.p90_ms, b.p90_ms);
        assert_eq!(a.p99_ms, b.p99_ms);
        assert_eq!(a.min_ms, b.min_ms);
        assert!(close(b.mean_ms, a.mean_ms.unwrap_or_default()));
    }

    #[test]
    fn test_latency_skips_invalid_records() {
        let mut records = latencies(&[100]);
        records.push(record(&[("name", Value::from("no latency"))]));
        records.push(record(&[
            ("start_time", Value::from("2024-01-01T00:00:02Z")),
            ("end_time", Value::from("2024-01-01T00:00:01Z")),
        ]));
        records.push(record(&[
            ("start_time", Value::from("2024-01-01T00:00:00Z")),
            ("end_time", Value::from("2024-01-01T00:00:00.300Z")),
        ]));

        let summary = latency_summary(&records);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.max_ms, Some(300.0));
    }

    #[test]
    fn test_latency_empty_and_single() {
        let empty = latency_summary(&[]);
        assert_eq!(empty.count, 0);
        assert_eq!(empty.p50_ms, None);
        assert_eq!(empty.std_ms, None);

        let single = latency_summary(&latencies(&[42]));
        assert_eq!(single.std_ms, Some(0.0));
        assert_eq!(single.p99_ms, Some(42.0));
    }

    #[test]
    fn test_error_clustering() {
        let mut records: Vec<Record> = (0..15).map(|_| error("Rate limit exceeded")).collect();
        records.extend((0..5).map(|_| error("Context length exceeded")));

        let summary = error_patterns(&records, 10);
        assert_eq!(summary.error_count, 20);
        assert_eq!(
            summary.patterns,
            vec![
                ErrorPattern {
                    message: "Rate limit exceeded".into(),
                    count: 15
                },
                ErrorPattern {
                    message: "Context length exceeded".into(),
                    count: 5
                },
            ]
        );
    }

    #[test]
    fn test_error_patterns_ties_and_truncation() {
        let records = vec![
            error("b"),
            error("a"),
            error(" a "),
            error("c"),
            record(&[("status_code", Value::from("ERROR"))]),
            record(&[("status_code", Value::from("OK"))]),
            record(&[
                ("status_code", Value::from("OK")),
                ("exception.message", Value::from("c")),
            ]),
        ];

        let summary = error_patterns(&records, 2);
        assert_eq!(summary.total_records, 7);
        assert_eq!(summary.error_count, 6);
        assert_eq!(summary.unlabeled, 1);
        assert_eq!(summary.distinct_messages, 3);
        let top: Vec<(&str, usize)> = summary
            .patterns
            .iter()
            .map(|p| (p.message.as_str(), p.count))
            .collect();
        assert_eq!(top, vec![("a", 2), ("c", 2)]);
    }

    #[test]
    fn test_aggregate_stats() {
        let records = vec![
            record(&[
                ("context.trace_id", Value::from("t1")),
                ("span_kind", Value::from("LLM")),
                ("status_code", Value::from("OK")),
                ("attributes.llm.token_count.total", Value::Int(100)),
            ]),
            record(&[
                ("context.trace_id", Value::from("t1")),
                ("span_kind", Value::from("llm")),
                ("status_code", Value::from("OK")),
                ("attributes.llm.token_count.total", Value::Int(300)),
            ]),
            record(&[
                ("context.trace_id", Value::from("t2")),
                ("span_kind", Value::from("CHAIN")),
                ("status_code", Value::from("ERROR")),
            ]),
            record(&[("context.trace_id", Value::from("t3"))]),
        ];

        let fields = ["attributes.llm.token_count.total", "attributes.llm.token_count.prompt"];
        let summary = aggregate_stats(&records, &fields);

        assert_eq!(summary.total_spans, 4);
        assert_eq!(summary.unique_traces, 3);
        assert_eq!(summary.by_span_kind.get("LLM"), Some(&2));
        assert_eq!(summary.by_span_kind.get(UNKNOWN_KIND), Some(&1));
        assert_eq!(summary.by_status.get("OK"), Some(&2));
        assert_eq!(summary.by_status.get("UNSET"), Some(&1));

        assert_eq!(summary.groups[0].span_kind, "LLM");
        assert_eq!(summary.groups[0].count, 2);
        assert_eq!(
            summary.groups[0].usage.get("attributes.llm.token_count.total"),
            Some(&400.0)
        );
        // Ties broken by kind
        assert_eq!(summary.groups[1].span_kind, "CHAIN");
        assert_eq!(summary.groups[2].span_kind, UNKNOWN_KIND);

        let totals = &summary.token_usage["attributes.llm.token_count.total"];
        assert_eq!(totals.sum, 400.0);
        assert_eq!(totals.mean, 200.0);
        assert_eq!(totals.max, 300.0);
        assert_eq!(totals.count, 2);
        assert!(!summary.token_usage.contains_key("attributes.llm.token_count.prompt"));
    }
}
