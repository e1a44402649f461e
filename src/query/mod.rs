pub mod aggregates;
pub mod filter;
pub mod parser;
pub mod predicate;
pub mod stats;
pub mod window;

pub use filter::{apply_filters, check_expression, FilterMode, FilterOutcome, PartialFilter};
pub use parser::{parse_where, Filter, FilterOperator, ParseError};
pub use predicate::{build_predicate, Condition, Predicate, PredicateParams, PredicatePlan, Pushdown};
pub use stats::{aggregate_stats, error_patterns, latency_summary, AggregateSummary, ErrorSummary, LatencySummary};
pub use window::{resolve_window, Clock, FixedClock, QueryWindow, SystemClock, WindowSpec};

/// A caller-supplied parameter that can never produce a valid query
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid parameter '{parameter}': {reason}")]
pub struct InvalidParameter {
    pub parameter: String,
    pub reason: String,
}

impl InvalidParameter {
    pub fn new(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }
}
