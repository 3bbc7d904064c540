//! Per-field validation from configured rules.

use crate::config::ValidationRule;
use regex::Regex;
use serde_json::Value;

pub const REQUIRED_MESSAGE: &str = "This field is required.";

/// Whether a coerced value counts as missing for a required field.
pub fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Check a non-null value against a rule and return every failure message.
pub fn validate_value(v: &Value, rule: &ValidationRule) -> Vec<String> {
    let mut errors = Vec::new();
    if v.is_null() {
        return errors;
    }
    if let Some(format) = &rule.format {
        if let Some(msg) = validate_format(v, format) {
            errors.push(msg);
        }
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max as usize {
                errors.push(format!("Field cannot be longer than {} characters.", max));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min as usize {
                errors.push(format!("Field must be at least {} characters long.", min));
            }
        }
        if let Some(pattern) = &rule.pattern {
            match Regex::new(pattern) {
                Ok(re) if re.is_match(s) => {}
                Ok(_) => errors.push("Invalid input.".to_string()),
                Err(e) => {
                    tracing::warn!(pattern = %pattern, error = %e, "invalid validation pattern");
                    errors.push("Invalid input.".to_string());
                }
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            errors.push("Not a valid choice.".to_string());
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum {
            if n < min {
                errors.push(format!("Number must be at least {}.", min));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                errors.push(format!("Number must be at most {}.", max));
            }
        }
    }
    errors
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(v: &Value, format: &str) -> Option<String> {
    let s = v.as_str()?;
    match format.to_lowercase().as_str() {
        "email" => {
            let valid = s
                .split_once('@')
                .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.') && !domain.ends_with('.'));
            (!valid).then(|| "Invalid email address.".to_string())
        }
        "uuid" => uuid::Uuid::parse_str(s).is_err().then(|| "Invalid UUID.".to_string()),
        "url" => url::Url::parse(s).is_err().then(|| "Invalid URL.".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collects_every_failure() {
        let rule = ValidationRule {
            min_length: Some(5),
            pattern: Some("^[a-z]+$".into()),
            ..ValidationRule::default()
        };
        let errors = validate_value(&json!("AB"), &rule);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn formats_and_ranges() {
        let email = ValidationRule {
            format: Some("email".into()),
            ..ValidationRule::default()
        };
        assert!(validate_value(&json!("a@b.io"), &email).is_empty());
        assert_eq!(validate_value(&json!("nope"), &email), vec!["Invalid email address."]);

        let range = ValidationRule {
            minimum: Some(1.0),
            maximum: Some(10.0),
            ..ValidationRule::default()
        };
        assert!(validate_value(&json!(5), &range).is_empty());
        assert_eq!(validate_value(&json!(11), &range), vec!["Number must be at most 10."]);
        assert!(validate_value(&Value::Null, &range).is_empty());
    }

    #[test]
    fn blank_values() {
        assert!(is_blank(&json!(null)));
        assert!(is_blank(&json!("  ")));
        assert!(!is_blank(&json!(false)));
    }
}
