//! In-memory evaluation of filters and search, mirroring the SQL semantics
//! (comparisons against NULL never match, except the empty filter).

use super::{AppliedFilter, FilterOp, FilterValue, SearchQuery};
use crate::config::{ColumnKind, Record};
use crate::filters::parse_temporal;
use serde_json::Value;
use std::cmp::Ordering;

fn text_of(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Order two values of a column. `None` when either side is null or they are incomparable.
pub fn compare_values(kind: ColumnKind, a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => match kind {
            ColumnKind::Date | ColumnKind::DateTime | ColumnKind::Time => {
                match (parse_temporal(kind, x), parse_temporal(kind, y)) {
                    (Some(x), Some(y)) => Some(x.cmp(&y)),
                    _ => Some(x.cmp(y)),
                }
            }
            ColumnKind::Uuid => Some(x.to_lowercase().cmp(&y.to_lowercase())),
            _ => Some(x.cmp(y)),
        },
        (Value::String(x), Value::Number(_)) | (Value::Number(_), Value::String(x)) if x.parse::<f64>().is_ok() => {
            let (fa, fb) = (text_of(a).parse::<f64>().ok()?, text_of(b).parse::<f64>().ok()?);
            fa.partial_cmp(&fb)
        }
        _ => None,
    }
}

fn is_equal(kind: ColumnKind, a: &Value, b: &Value) -> bool {
    compare_values(kind, a, b) == Some(Ordering::Equal)
}

fn matches_one(record: &Record, f: &AppliedFilter) -> bool {
    let value = record.get(&f.column).unwrap_or(&Value::Null);
    match (&f.op, &f.value) {
        (FilterOp::Empty, FilterValue::IsEmpty(empty)) => value.is_null() == *empty,
        (_, _) if value.is_null() => false,
        (FilterOp::Equal, FilterValue::Scalar(v)) => is_equal(f.kind, value, v),
        (FilterOp::NotEqual, FilterValue::Scalar(v)) => !is_equal(f.kind, value, v),
        (FilterOp::Like, FilterValue::Scalar(v)) => super::LikeTerm::parse(&text_of(v)).matches(&text_of(value)),
        (FilterOp::NotLike, FilterValue::Scalar(v)) => !super::LikeTerm::parse(&text_of(v)).matches(&text_of(value)),
        (FilterOp::Greater, FilterValue::Scalar(v)) => compare_values(f.kind, value, v) == Some(Ordering::Greater),
        (FilterOp::Smaller, FilterValue::Scalar(v)) => compare_values(f.kind, value, v) == Some(Ordering::Less),
        (FilterOp::Between, FilterValue::Range(lo, hi)) => in_range(f.kind, value, lo, hi),
        (FilterOp::NotBetween, FilterValue::Range(lo, hi)) => !in_range(f.kind, value, lo, hi),
        (FilterOp::InList, FilterValue::List(vs)) => vs.iter().any(|v| is_equal(f.kind, value, v)),
        (FilterOp::NotInList, FilterValue::List(vs)) => !vs.iter().any(|v| is_equal(f.kind, value, v)),
        _ => false,
    }
}

fn in_range(kind: ColumnKind, value: &Value, lo: &Value, hi: &Value) -> bool {
    matches!(compare_values(kind, value, lo), Some(Ordering::Greater | Ordering::Equal))
        && matches!(compare_values(kind, value, hi), Some(Ordering::Less | Ordering::Equal))
}

/// All filters must match.
pub fn matches_filters(record: &Record, filters: &[AppliedFilter]) -> bool {
    filters.iter().all(|f| matches_one(record, f))
}

/// Every term must match at least one searchable column.
pub fn matches_search(record: &Record, search: &SearchQuery) -> bool {
    search.terms.iter().all(|term| {
        search.columns.iter().any(|col| match record.get(col) {
            Some(Value::Null) | None => false,
            Some(v) => term.matches(&text_of(v)),
        })
    })
}
