//! Form field definitions and raw value coercion.

use super::inline::InlineFormSpec;
use crate::config::{ColumnKind, PkType, ValidationRule};
use crate::filters::parse_temporal;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    TextArea,
    Integer,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Time,
    Uuid,
    Json,
    Select {
        choices: Vec<(String, String)>,
    },
    /// Foreign key rendered as a select over the target table (or an ajax lookup).
    Relation {
        target: String,
        #[serde(skip)]
        pk_type: PkType,
        ajax: bool,
    },
    Hidden {
        inner: Box<FieldKind>,
    },
}

impl FieldKind {
    pub fn for_column(kind: ColumnKind, enum_values: &[String]) -> FieldKind {
        match kind {
            ColumnKind::String => FieldKind::Text,
            ColumnKind::Text => FieldKind::TextArea,
            ColumnKind::Integer => FieldKind::Integer,
            ColumnKind::Float => FieldKind::Decimal,
            ColumnKind::Boolean => FieldKind::Boolean,
            ColumnKind::Date => FieldKind::Date,
            ColumnKind::DateTime => FieldKind::DateTime,
            ColumnKind::Time => FieldKind::Time,
            ColumnKind::Uuid => FieldKind::Uuid,
            ColumnKind::Json => FieldKind::Json,
            ColumnKind::Enum => FieldKind::Select {
                choices: enum_values.iter().map(|v| (v.clone(), v.clone())).collect(),
            },
        }
    }

    pub fn for_pk(pk_type: &PkType) -> FieldKind {
        match pk_type {
            PkType::Uuid => FieldKind::Uuid,
            PkType::BigInt | PkType::Int => FieldKind::Integer,
            PkType::Text => FieldKind::Text,
        }
    }

    pub fn is_hidden(&self) -> bool {
        matches!(self, FieldKind::Hidden { .. })
    }

    /// Coerce one submitted string. Blank input is null, except for checkboxes.
    pub fn coerce(&self, raw: &str) -> Result<Value, String> {
        if let FieldKind::Boolean = self {
            return Ok(Value::Bool(!matches!(
                raw.trim().to_lowercase().as_str(),
                "" | "false" | "0" | "off" | "n" | "no"
            )));
        }
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Value::Null);
        }
        match self {
            FieldKind::Text | FieldKind::TextArea => Ok(Value::String(raw.to_string())),
            FieldKind::Integer => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| "Not a valid integer value.".to_string()),
            FieldKind::Decimal => raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| "Not a valid decimal value.".to_string()),
            FieldKind::Date => parse_temporal(ColumnKind::Date, raw)
                .map(Value::String)
                .ok_or_else(|| "Not a valid date value.".to_string()),
            FieldKind::DateTime => parse_temporal(ColumnKind::DateTime, raw)
                .map(Value::String)
                .ok_or_else(|| "Not a valid datetime value.".to_string()),
            FieldKind::Time => parse_temporal(ColumnKind::Time, raw)
                .map(Value::String)
                .ok_or_else(|| "Not a valid time value.".to_string()),
            FieldKind::Uuid => uuid::Uuid::parse_str(raw)
                .map(|u| Value::String(u.to_string()))
                .map_err(|_| "Not a valid UUID.".to_string()),
            FieldKind::Json => serde_json::from_str(raw).map_err(|_| "Invalid JSON.".to_string()),
            FieldKind::Select { choices } => {
                if choices.iter().any(|(v, _)| v == raw) {
                    Ok(Value::String(raw.to_string()))
                } else {
                    Err("Not a valid choice.".to_string())
                }
            }
            FieldKind::Relation { pk_type, .. } => pk_type.parse(raw).map_err(|_| "Not a valid choice.".to_string()),
            FieldKind::Hidden { inner } => inner.coerce(raw),
            FieldKind::Boolean => Ok(Value::Bool(true)),
        }
    }
}

/// Render a stored value back into the string a form input would carry.
pub fn raw_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => if *b { "y".into() } else { String::new() },
        other => other.to_string(),
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FormField {
    pub name: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip)]
    pub validation: Option<ValidationRule>,
}

impl FormField {
    pub fn new(name: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        FormField {
            name: name.into(),
            label: label.into(),
            kind,
            required: false,
            description: None,
            default: None,
            validation: None,
        }
    }
}

/// A form definition: ordered fields plus inline child lists.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FormSpec {
    pub fields: Vec<FormField>,
    pub inlines: Vec<InlineFormSpec>,
}

impl FormSpec {
    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn inline(&self, name: &str) -> Option<&InlineFormSpec> {
        self.inlines.iter().find(|i| i.name == name)
    }

    /// Whether `name` names a field or an inline list.
    pub fn has(&self, name: &str) -> bool {
        self.field(name).is_some() || self.inline(name).is_some()
    }

    /// Field and inline list names in definition order.
    pub fn names(&self) -> Vec<String> {
        self.fields
            .iter()
            .map(|f| f.name.clone())
            .chain(self.inlines.iter().map(|i| i.name.clone()))
            .collect()
    }

    pub fn remove(&mut self, names: &[String]) {
        self.fields.retain(|f| !names.contains(&f.name));
        self.inlines.retain(|i| !names.contains(&i.name));
    }

    /// Form with only the named fields, in the given order. Unknown names are skipped.
    pub fn subset(&self, names: &[String]) -> FormSpec {
        FormSpec {
            fields: names.iter().filter_map(|n| self.field(n).cloned()).collect(),
            inlines: Vec::new(),
        }
    }
}
