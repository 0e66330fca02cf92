use std::{cmp::Ordering, fmt};

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// A single non-null table cell. Nulls are represented as `None` by the
/// containing column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDateTime),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.is_finite() && f.fract() == 0.0 {
                    format!("{f:.1}")
                } else {
                    f.to_string()
                }
            }
            Value::Date(dt) => {
                if dt.time() == NaiveTime::MIN {
                    dt.format("%Y-%m-%d").to_string()
                } else {
                    dt.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Hashable identity used when matching or grouping cells. Integral
    /// floats share the integer key, so `1` and `1.0` match while `"1"`
    /// stays distinct.
    pub fn key(&self) -> CellKey {
        match self {
            Value::String(s) => CellKey::Text(s.clone()),
            Value::Integer(i) => CellKey::Integer(*i),
            Value::Float(f) => match float_to_i64(*f) {
                Some(i) if f.fract() == 0.0 => CellKey::Integer(i),
                _ => CellKey::Float(f.to_bits()),
            },
            Value::Date(dt) => CellKey::Date(*dt),
        }
    }

    /// Interprets the cell as a number, parsing string cells on demand.
    /// Integers stay integers; everything else numeric becomes a float.
    pub fn to_numeric(&self) -> Result<Value> {
        match self {
            Value::Integer(_) | Value::Float(_) => Ok(self.clone()),
            Value::String(s) => {
                let trimmed = s.trim();
                if let Ok(parsed) = trimmed.parse::<i64>() {
                    return Ok(Value::Integer(parsed));
                }
                trimmed
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| anyhow!("'{s}' is not numeric"))
            }
            Value::Date(_) => Err(anyhow!("Date '{}' is not numeric", self.as_display())),
        }
    }

    /// Total ordering used for sorted outputs: numbers compare numerically
    /// across integer/float, other mixed variants fall back to a fixed rank.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (left, right) => match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => left.rank().cmp(&right.rank()),
            },
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Integer(_) | Value::Float(_) => 0,
            Value::Date(_) => 1,
            Value::String(_) => 2,
        }
    }

    /// Converts a JSON literal from the configuration into a cell.
    pub fn from_json(value: &serde_json::Value) -> Option<Value> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Value::String(b.to_string())),
            serde_json::Value::Number(n) => Some(match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            other => Some(Value::String(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CellKey {
    Text(String),
    Integer(i64),
    Float(u64),
    Date(NaiveDateTime),
}

/// Converts a whole-valued float into `i64`, refusing anything outside the
/// representable range instead of saturating.
pub fn float_to_i64(value: f64) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if value.is_finite() && (-LIMIT..LIMIT).contains(&value.trunc()) {
        Some(value.trunc() as i64)
    } else {
        None
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

pub fn display_cell(cell: Option<&Value>) -> String {
    cell.map(Value::as_display).unwrap_or_default()
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

/// Parses a timestamp or a bare date (taken at midnight).
pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    let trimmed = value.trim();
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(parsed);
        }
    }
    let date = parse_naive_date(trimmed)
        .with_context(|| format!("Failed to parse '{value}' as datetime"))?;
    Ok(date.and_time(NaiveTime::MIN))
}
