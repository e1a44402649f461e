use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Portable value shape every exported field is reduced to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Plain strings, and timestamps rendered as ISO-8601 UTC
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Numeric view; numeric strings are accepted since some backends
    /// export counters as text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Compare two values the way a backend `WHERE` would.
    ///
    /// Returns `None` when the values are not comparable (null on either
    /// side, or mismatched non-numeric types).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::String(_), _) | (_, Value::String(_)) => {
                // Numeric literal against a numeric-looking string column
                match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) if self.is_numeric() || other.is_numeric() => {
                        a.partial_cmp(&b)
                    }
                    _ => None,
                }
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Infer a value from a JSON cell, using the column name as a hint for
    /// timestamp columns.
    pub fn from_json(json: &serde_json::Value, column_name: &str) -> Self {
        let timestamp_column = is_timestamp_column(column_name);
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if timestamp_column {
                        epoch_to_iso(i).map(Value::String).unwrap_or(Value::Int(i))
                    } else {
                        Value::Int(i)
                    }
                } else if let Some(u) = n.as_u64() {
                    Value::Float(u as f64)
                } else if let Some(f) = n.as_f64() {
                    normalize_float(f)
                } else {
                    Value::String(n.to_string())
                }
            }
            serde_json::Value::String(s) => {
                if timestamp_column {
                    Value::String(reformat_timestamp(s).unwrap_or_else(|| s.clone()))
                } else {
                    Value::String(s.clone())
                }
            }
            serde_json::Value::Array(items) => Value::List(
                items
                    .iter()
                    .map(|item| Value::from_json(item, ""))
                    .collect(),
            ),
            serde_json::Value::Object(obj) => Value::Map(
                obj.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v, k)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::json!(i),
            Value::Float(f) => serde_json::json!(f),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

/// A cell exactly as a backend client library hands it over, before
/// normalization.
///
/// This is the entry point for native (Arrow, dataframe) export clients.
/// The HTTP export bridge already speaks JSON and goes through
/// [`normalize_json_row`] instead; both paths share the same timestamp and
/// float rules.
#[derive(Debug, Clone)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Fixed-point wrapper: `unscaled * 10^-scale`
    Decimal { unscaled: i128, scale: u32 },
    Text(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<FixedOffset>),
    /// Wall-clock time without zone, taken as UTC
    NaiveDateTime(NaiveDateTime),
    EpochNanos(i64),
    List(Vec<RawValue>),
    Map(Vec<(RawValue, RawValue)>),
    Json(serde_json::Value),
    /// Anything the client library could not type
    Opaque { type_name: String, repr: String },
}

/// Reduce a backend value to the portable [`Value`] set.
///
/// Never fails: a value that cannot be classified degrades to its string
/// representation.
pub fn normalize(raw: RawValue) -> Value {
    match raw {
        RawValue::Null => Value::Null,
        RawValue::Bool(b) => Value::Bool(b),
        RawValue::Int(i) => Value::Int(i),
        RawValue::UInt(u) => i64::try_from(u)
            .map(Value::Int)
            .unwrap_or(Value::Float(u as f64)),
        RawValue::Float(f) => normalize_float(f),
        RawValue::Decimal { unscaled, scale } => normalize_decimal(unscaled, scale),
        RawValue::Text(s) => Value::String(s),
        RawValue::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => Value::String(s),
            Err(e) => Value::String(
                e.as_bytes()
                    .iter()
                    .map(|b| format!("{:02x}", b))
                    .collect(),
            ),
        },
        RawValue::DateTime(dt) => Value::String(to_iso(&dt.with_timezone(&Utc))),
        RawValue::NaiveDateTime(naive) => Value::String(to_iso(&Utc.from_utc_datetime(&naive))),
        RawValue::EpochNanos(nanos) => Value::String(to_iso(&Utc.timestamp_nanos(nanos))),
        RawValue::List(items) => Value::List(items.into_iter().map(normalize).collect()),
        RawValue::Map(entries) => Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (map_key(k), normalize(v)))
                .collect(),
        ),
        RawValue::Json(json) => Value::from_json(&json, ""),
        RawValue::Opaque { type_name, repr } => {
            if !repr.trim().is_empty() {
                Value::String(repr)
            } else if !type_name.is_empty() {
                Value::String(format!("<{}>", type_name))
            } else {
                Value::String("<unknown>".to_string())
            }
        }
    }
}

/// Normalize one exported row, applying column-name hints so epoch integers
/// in timestamp columns come out as ISO-8601 strings.
pub fn normalize_row<I>(row: I) -> super::Record
where
    I: IntoIterator<Item = (String, RawValue)>,
{
    row.into_iter()
        .map(|(column, raw)| {
            let value = match raw {
                RawValue::Int(i) if is_timestamp_column(&column) => {
                    epoch_to_iso(i).map(Value::String).unwrap_or(Value::Int(i))
                }
                RawValue::Text(s) if is_timestamp_column(&column) => {
                    Value::String(reformat_timestamp(&s).unwrap_or(s))
                }
                RawValue::Json(json) => Value::from_json(&json, &column),
                other => normalize(other),
            };
            (column, value)
        })
        .collect()
}

/// Normalize a JSON object row (the HTTP export bridge format)
pub fn normalize_json_row(row: &serde_json::Map<String, serde_json::Value>) -> super::Record {
    row.iter()
        .map(|(column, json)| (column.clone(), Value::from_json(json, column)))
        .collect()
}

fn normalize_float(f: f64) -> Value {
    if f.is_nan() {
        Value::Null
    } else if f.is_infinite() {
        Value::String(if f > 0.0 { "inf" } else { "-inf" }.to_string())
    } else {
        Value::Float(f)
    }
}

fn normalize_decimal(unscaled: i128, scale: u32) -> Value {
    if scale == 0 {
        if let Ok(i) = i64::try_from(unscaled) {
            return Value::Int(i);
        }
    }
    // Parsing the scientific form rounds correctly for any scale
    match format!("{}e-{}", unscaled, scale).parse::<f64>() {
        Ok(f) => normalize_float(f),
        Err(_) => Value::String(format!("{}e-{}", unscaled, scale)),
    }
}

fn map_key(key: RawValue) -> String {
    match normalize(key) {
        Value::String(s) => s,
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

pub(crate) fn to_iso(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Top-level span timestamps and explicit `*timestamp` fields. Nested
/// attribute names such as `attributes.processing_time` are durations as
/// often as they are instants, so they are left alone.
fn is_timestamp_column(column: &str) -> bool {
    let lower = column.to_ascii_lowercase();
    if lower.ends_with("timestamp") {
        return true;
    }
    !lower.contains('.') && lower.ends_with("_time")
}

/// Smallest integer read as an epoch (seconds, 1973-03-03)
const MIN_EPOCH: u64 = 100_000_000;

/// Interpret an epoch integer, guessing the unit from its magnitude
fn epoch_to_iso(value: i64) -> Option<String> {
    let magnitude = value.unsigned_abs();
    if magnitude < MIN_EPOCH {
        return None;
    }
    let dt = if magnitude >= 100_000_000_000_000_000 {
        Some(Utc.timestamp_nanos(value))
    } else if magnitude >= 100_000_000_000_000 {
        Utc.timestamp_micros(value).single()
    } else if magnitude >= 100_000_000_000 {
        Utc.timestamp_millis_opt(value).single()
    } else {
        Utc.timestamp_opt(value, 0).single()
    }?;
    Some(to_iso(&dt))
}

fn reformat_timestamp(s: &str) -> Option<String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
        return Some(to_iso(&dt.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| to_iso(&Utc.from_utc_datetime(&naive)))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            // Cross-type numeric comparisons
            (Value::Int(a), Value::Float(b)) => (*a as f64).to_bits() == b.to_bits(),
            (Value::Float(a), Value::Int(b)) => a.to_bits() == (*b as f64).to_bits(),
            _ => false,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        normalize_float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::List(_) | Value::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}
