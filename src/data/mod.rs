pub mod span;
pub mod value;

pub use span::{SpanKind, SpanStatus, SpanView};
pub use value::{normalize, normalize_json_row, normalize_row, RawValue, Value};

/// One exported span: column name to normalized value
pub type Record = std::collections::BTreeMap<String, Value>;
