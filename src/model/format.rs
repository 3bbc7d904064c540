use crate::config::Record;
use serde_json::Value;
use std::sync::Arc;

/// Column formatter: `(record, column) -> text`.
pub type Formatter = Arc<dyn Fn(&Record, &str) -> String + Send + Sync>;

/// Default text for a value in lists, details and exports.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "True".into(),
        Value::Bool(false) => "False".into(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(format_value).collect::<Vec<_>>().join(", "),
        Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn formats_by_type() {
        assert_eq!(format_value(&json!(null)), "");
        assert_eq!(format_value(&json!(true)), "True");
        assert_eq!(format_value(&json!(["a", 1, false])), "a, 1, False");
        assert_eq!(format_value(&json!({ "k": 1 })), r#"{"k":1}"#);
    }
}
