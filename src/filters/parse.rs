//! Filter URL arguments (`flt{pos}_{key}=value`) and value cleaning.

use super::{AppliedFilter, ColumnFilter, FilterOp, FilterValue};
use crate::config::ColumnKind;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TIME_FORMAT: &str = "%H:%M:%S";

/// Parse a date/datetime/time string and return it in canonical form.
pub fn parse_temporal(kind: ColumnKind, raw: &str) -> Option<String> {
    let raw = raw.trim();
    match kind {
        ColumnKind::Date => NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .ok()
            .map(|d| d.format(DATE_FORMAT).to_string()),
        ColumnKind::DateTime => {
            let normalized = raw.replacen('T', " ", 1);
            let trimmed = normalized.split(|c| c == '+' || c == 'Z').next().unwrap_or("").trim();
            NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .or_else(|| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M").ok())
                .or_else(|| {
                    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
                .map(|d| d.format(DATETIME_FORMAT).to_string())
        }
        ColumnKind::Time => NaiveTime::parse_from_str(raw, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
            .ok()
            .map(|t| t.format(TIME_FORMAT).to_string()),
        _ => None,
    }
}

fn clean_scalar(kind: ColumnKind, raw: &str) -> Option<Value> {
    let raw = raw.trim();
    match kind {
        ColumnKind::String | ColumnKind::Text | ColumnKind::Enum => Some(Value::String(raw.to_string())),
        ColumnKind::Integer => raw.parse::<i64>().ok().map(Value::from),
        ColumnKind::Float => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        ColumnKind::Boolean => match raw {
            "1" => Some(Value::Bool(true)),
            "0" => Some(Value::Bool(false)),
            _ => None,
        },
        ColumnKind::Uuid => uuid::Uuid::parse_str(raw).ok().map(|u| Value::String(u.to_string())),
        ColumnKind::Date | ColumnKind::DateTime | ColumnKind::Time => parse_temporal(kind, raw).map(Value::String),
        ColumnKind::Json => None,
    }
}

impl ColumnFilter {
    /// Clean a raw argument. `None` means the value is invalid and the filter is skipped.
    pub fn clean(&self, raw: &str) -> Option<FilterValue> {
        match self.op {
            FilterOp::Empty => match raw.trim() {
                "1" => Some(FilterValue::IsEmpty(true)),
                "0" => Some(FilterValue::IsEmpty(false)),
                _ => None,
            },
            FilterOp::Between | FilterOp::NotBetween => {
                let (start, end) = raw.split_once(" to ")?;
                let start = clean_scalar(self.kind, start)?;
                let end = clean_scalar(self.kind, end)?;
                Some(FilterValue::Range(start, end))
            }
            FilterOp::InList | FilterOp::NotInList => {
                let values = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| clean_scalar(self.kind, v))
                    .collect::<Option<Vec<Value>>>()?;
                if values.is_empty() {
                    None
                } else {
                    Some(FilterValue::List(values))
                }
            }
            FilterOp::Like | FilterOp::NotLike => {
                if raw.is_empty() {
                    None
                } else {
                    Some(FilterValue::Scalar(Value::String(raw.to_string())))
                }
            }
            _ => {
                if let Some(options) = &self.options {
                    if !options.iter().any(|(v, _)| v == raw.trim()) {
                        return None;
                    }
                }
                clean_scalar(self.kind, raw).map(FilterValue::Scalar)
            }
        }
    }
}

/// Collect applied filters from query arguments, ordered by their `flt{pos}` position.
/// Unknown keys and invalid values are skipped.
pub fn parse_filter_args(filters: &[ColumnFilter], args: &[(String, String)], named: bool) -> Vec<AppliedFilter> {
    let mut found: Vec<(u32, AppliedFilter)> = Vec::new();
    for (key, raw) in args {
        let Some(rest) = key.strip_prefix("flt") else {
            continue;
        };
        let Some((pos, filter_key)) = rest.split_once('_') else {
            continue;
        };
        let Ok(pos) = pos.parse::<u32>() else {
            continue;
        };
        let index = if named {
            filters
                .iter()
                .enumerate()
                .position(|(i, f)| f.url_key(i, true) == filter_key)
        } else {
            filter_key.parse::<usize>().ok().filter(|i| *i < filters.len())
        };
        let Some(index) = index else {
            tracing::debug!(key = %key, "unknown filter argument");
            continue;
        };
        let filter = &filters[index];
        let Some(value) = filter.clean(raw) else {
            tracing::debug!(key = %key, value = %raw, "invalid filter value ignored");
            continue;
        };
        found.push((
            pos,
            AppliedFilter {
                index,
                column: filter.column.clone(),
                kind: filter.kind,
                op: filter.op,
                value,
                raw: raw.clone(),
            },
        ));
    }
    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, f)| f).collect()
}
