//! Structural schema validation plus domain rules
//!
//! # Overview
//!
//! [`SchemaValidator`] checks a candidate configuration in two passes:
//!
//! 1. **Structure**: a JSON-Schema subset (`type`, `properties`, `required`,
//!    `additionalProperties`, `items`, `enum`, `minimum`, `maximum`,
//!    `exclusiveMinimum`, `exclusiveMaximum`, `minLength`, `maxLength`,
//!    `pattern`, `minItems`, `maxItems`). Unknown keywords are ignored.
//! 2. **Domain rules**: fixed limits for speech, window and security values
//!    that apply even without a schema.
//!
//! Every violation found is reported, not just the first one.
//!
//! ```rust
//! use confkeep::SchemaValidator;
//! use serde_json::json;
//!
//! let validator = SchemaValidator::permissive();
//! let config = json!({"speech": {"synthesis": {"rate": 301, "volume": 1.5}}});
//!
//! let violations = validator.validate(&config).unwrap_err();
//! assert_eq!(violations.len(), 2);
//! assert_eq!(violations[0].path, "speech.synthesis.rate");
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One failed check, located by dotted path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Dotted path of the offending value (empty for the root)
    pub path: String,
    /// Human-readable message
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

// =============================================================================
// Domain Rules
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Bound {
    AtMost(f64),
    AtLeast(f64),
    Between(f64, f64),
}

struct DomainRule {
    path: &'static str,
    label: &'static str,
    bound: Bound,
}

const DOMAIN_RULES: &[DomainRule] = &[
    DomainRule {
        path: "speech.synthesis.rate",
        label: "Speech rate",
        bound: Bound::AtMost(300.0),
    },
    DomainRule {
        path: "speech.synthesis.volume",
        label: "Speech volume",
        bound: Bound::Between(0.0, 1.0),
    },
    DomainRule {
        path: "interface.window_size.width",
        label: "Window width",
        bound: Bound::AtLeast(640.0),
    },
    DomainRule {
        path: "interface.window_size.height",
        label: "Window height",
        bound: Bound::AtLeast(480.0),
    },
    DomainRule {
        path: "security.voice_recognition.confidence_threshold",
        label: "Voice confidence threshold",
        bound: Bound::AtLeast(0.5),
    },
];

impl DomainRule {
    fn check(&self, config: &Value) -> Option<Violation> {
        let value = lookup(config, self.path)?;
        let Some(num) = value.as_f64() else {
            return Some(Violation::new(
                self.path,
                format!("{} must be a number", self.label),
            ));
        };

        let message = match self.bound {
            Bound::AtMost(max) if num > max => format!("{} must be at most {max}", self.label),
            Bound::AtLeast(min) if num < min => format!("{} must be at least {min}", self.label),
            Bound::Between(min, max) if num < min || num > max => {
                format!("{} must be between {min} and {max}", self.label)
            }
            _ => return None,
        };
        Some(Violation::new(self.path, message))
    }
}

/// Read a nested value by dotted path
pub(crate) fn lookup<'a>(value: &'a Value, dotted: &str) -> Option<&'a Value> {
    dotted
        .split('.')
        .filter(|s| !s.is_empty())
        .try_fold(value, |current, key| current.as_object()?.get(key))
}

// =============================================================================
// Schema Validator
// =============================================================================

/// Validates candidate configurations
#[derive(Debug, Clone, Default)]
pub struct SchemaValidator {
    schema: Option<Value>,
}

impl SchemaValidator {
    /// Build a validator from an optional schema document
    ///
    /// Without a schema only the root-type check and domain rules apply.
    pub fn new(schema: Option<Value>) -> Self {
        if schema.is_none() {
            log::warn!("No configuration schema loaded, structural validation disabled");
        }
        Self { schema }
    }

    /// Validator with domain rules only
    pub fn permissive() -> Self {
        Self { schema: None }
    }

    pub fn has_schema(&self) -> bool {
        self.schema.is_some()
    }

    pub fn schema(&self) -> Option<&Value> {
        self.schema.as_ref()
    }

    /// Validate a candidate configuration
    ///
    /// # Errors
    ///
    /// Returns every violation found, ordered structural first, then domain.
    pub fn validate(&self, config: &Value) -> Result<(), Vec<Violation>> {
        if !config.is_object() {
            return Err(vec![Violation::new(
                "",
                "Configuration root must be a mapping",
            )]);
        }

        let mut violations = Vec::new();
        if let Some(schema) = &self.schema {
            check_node(schema, config, "", &mut violations);
        }
        violations.extend(DOMAIN_RULES.iter().filter_map(|rule| rule.check(config)));

        if violations.is_empty() {
            Ok(())
        } else {
            log::debug!("Validation found {} violation(s)", violations.len());
            Err(violations)
        }
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64()
                || value.is_u64()
                || value.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_node(schema: &Value, value: &Value, path: &str, out: &mut Vec<Violation>) {
    let Some(schema) = schema.as_object() else {
        return;
    };

    if let Some(expected) = schema.get("type") {
        let ok = match expected {
            Value::String(t) => type_matches(t, value),
            Value::Array(types) => types
                .iter()
                .filter_map(Value::as_str)
                .any(|t| type_matches(t, value)),
            _ => true,
        };
        if !ok {
            out.push(Violation::new(
                path,
                format!("Expected type {expected}, found {}", type_name(value)),
            ));
            // Nested keywords are meaningless once the type is wrong
            return;
        }
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(value) {
            out.push(Violation::new(
                path,
                "Value must be one of the allowed options",
            ));
        }
    }

    match value {
        Value::Number(_) => check_number(schema, value, path, out),
        Value::String(s) => check_string(schema, s, path, out),
        Value::Array(items) => check_array(schema, items, path, out),
        Value::Object(map) => check_object(schema, map, path, out),
        Value::Null | Value::Bool(_) => {}
    }
}

fn check_number(schema: &Map<String, Value>, value: &Value, path: &str, out: &mut Vec<Violation>) {
    let Some(num) = value.as_f64() else {
        return;
    };
    let limit = |key: &str| schema.get(key).and_then(Value::as_f64);

    if let Some(min) = limit("minimum") {
        if num < min {
            out.push(Violation::new(path, format!("Value must be at least {min}")));
        }
    }
    if let Some(max) = limit("maximum") {
        if num > max {
            out.push(Violation::new(path, format!("Value must be at most {max}")));
        }
    }
    if let Some(min) = limit("exclusiveMinimum") {
        if num <= min {
            out.push(Violation::new(path, format!("Value must be greater than {min}")));
        }
    }
    if let Some(max) = limit("exclusiveMaximum") {
        if num >= max {
            out.push(Violation::new(path, format!("Value must be less than {max}")));
        }
    }
}

fn check_string(schema: &Map<String, Value>, text: &str, path: &str, out: &mut Vec<Violation>) {
    let len = text.chars().count() as u64;

    if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
        if len < min {
            out.push(Violation::new(
                path,
                format!("Text must be at least {min} characters"),
            ));
        }
    }
    if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
        if len > max {
            out.push(Violation::new(
                path,
                format!("Text must be at most {max} characters"),
            ));
        }
    }
    if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
        match Regex::new(pattern) {
            Ok(re) if !re.is_match(text) => out.push(Violation::new(
                path,
                format!("Value does not match pattern: {pattern}"),
            )),
            Ok(_) => {}
            Err(e) => out.push(Violation::new(
                path,
                format!("Invalid regex pattern in schema: {e}"),
            )),
        }
    }
}

fn check_array(schema: &Map<String, Value>, items: &[Value], path: &str, out: &mut Vec<Violation>) {
    let len = items.len() as u64;

    if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
        if len < min {
            out.push(Violation::new(path, format!("Expected at least {min} items")));
        }
    }
    if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
        if len > max {
            out.push(Violation::new(path, format!("Expected at most {max} items")));
        }
    }
    if let Some(item_schema) = schema.get("items") {
        for (i, item) in items.iter().enumerate() {
            check_node(item_schema, item, &format!("{path}[{i}]"), out);
        }
    }
}

fn check_object(
    schema: &Map<String, Value>,
    map: &Map<String, Value>,
    path: &str,
    out: &mut Vec<Violation>,
) {
    if let Some(Value::Array(required)) = schema.get("required") {
        for key in required.iter().filter_map(Value::as_str) {
            if !map.contains_key(key) {
                out.push(Violation::new(
                    join(path, key),
                    "Required property is missing",
                ));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    for (key, child) in map {
        let child_path = join(path, key);
        match properties.and_then(|p| p.get(key)) {
            Some(child_schema) => check_node(child_schema, child, &child_path, out),
            None => match schema.get("additionalProperties") {
                Some(Value::Bool(false)) => {
                    out.push(Violation::new(child_path, "Unknown property"));
                }
                Some(extra @ Value::Object(_)) => check_node(extra, child, &child_path, out),
                _ => {}
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths(violations: &[Violation]) -> Vec<&str> {
        violations.iter().map(|v| v.path.as_str()).collect()
    }

    #[test]
    fn test_root_must_be_mapping() {
        let validator = SchemaValidator::permissive();
        let err = validator.validate(&json!([1, 2])).unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err[0].path, "");
    }

    #[test]
    fn test_speech_rate_boundary() {
        let validator = SchemaValidator::permissive();
        assert!(
            validator
                .validate(&json!({"speech": {"synthesis": {"rate": 300}}}))
                .is_ok()
        );
        let err = validator
            .validate(&json!({"speech": {"synthesis": {"rate": 301}}}))
            .unwrap_err();
        assert_eq!(paths(&err), vec!["speech.synthesis.rate"]);
    }

    #[test]
    fn test_speech_volume_boundary() {
        let validator = SchemaValidator::permissive();
        assert!(
            validator
                .validate(&json!({"speech": {"synthesis": {"volume": 1.0}}}))
                .is_ok()
        );
        assert!(
            validator
                .validate(&json!({"speech": {"synthesis": {"volume": 1.5}}}))
                .is_err()
        );
        assert!(
            validator
                .validate(&json!({"speech": {"synthesis": {"volume": -0.1}}}))
                .is_err()
        );
    }

    #[test]
    fn test_window_size_boundary() {
        let validator = SchemaValidator::permissive();
        let ok = json!({"interface": {"window_size": {"width": 640, "height": 480}}});
        assert!(validator.validate(&ok).is_ok());

        let bad = json!({"interface": {"window_size": {"width": 100, "height": 100}}});
        let err = validator.validate(&bad).unwrap_err();
        assert_eq!(
            paths(&err),
            vec!["interface.window_size.width", "interface.window_size.height"]
        );
    }

    #[test]
    fn test_confidence_threshold_boundary() {
        let validator = SchemaValidator::permissive();
        let ok = json!({"security": {"voice_recognition": {"confidence_threshold": 0.5}}});
        assert!(validator.validate(&ok).is_ok());
        let bad = json!({"security": {"voice_recognition": {"confidence_threshold": 0.3}}});
        assert!(validator.validate(&bad).is_err());
    }

    #[test]
    fn test_domain_rules_skip_absent_paths() {
        let validator = SchemaValidator::permissive();
        assert!(validator.validate(&json!({})).is_ok());
        assert!(validator.validate(&json!({"speech": {}})).is_ok());
    }

    #[test]
    fn test_non_numeric_domain_value_is_violation() {
        let validator = SchemaValidator::permissive();
        let err = validator
            .validate(&json!({"speech": {"synthesis": {"rate": "fast"}}}))
            .unwrap_err();
        assert_eq!(err[0].message, "Speech rate must be a number");
    }

    #[test]
    fn test_reports_all_violations() {
        let validator = SchemaValidator::permissive();
        let config = json!({
            "speech": {"synthesis": {"rate": 500, "volume": 2}},
            "interface": {"window_size": {"width": 10}},
            "security": {"voice_recognition": {"confidence_threshold": 0.1}}
        });
        assert_eq!(validator.validate(&config).unwrap_err().len(), 4);
    }

    #[test]
    fn test_structural_schema() {
        let schema = json!({
            "type": "object",
            "required": ["interface"],
            "properties": {
                "interface": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "theme": {"type": "string", "enum": ["dark", "light"]},
                        "font_size": {"type": "integer", "minimum": 8, "maximum": 32},
                        "language": {"type": "string", "pattern": "^[a-z]{2}$"}
                    }
                },
                "plugins": {"type": "array", "items": {"type": "string"}, "maxItems": 2}
            }
        });
        let validator = SchemaValidator::new(Some(schema));

        let ok = json!({"interface": {"theme": "dark", "font_size": 12, "language": "tr"}});
        assert!(validator.validate(&ok).is_ok());

        let bad = json!({
            "interface": {"theme": "blue", "font_size": 4, "language": "turkish", "extra": 1},
            "plugins": ["a", 2, "c"]
        });
        let err = validator.validate(&bad).unwrap_err();
        assert_eq!(
            paths(&err),
            vec![
                "interface.theme",
                "interface.font_size",
                "interface.language",
                "interface.extra",
                "plugins",
                "plugins[1]",
            ]
        );

        let missing = validator.validate(&json!({})).unwrap_err();
        assert_eq!(paths(&missing), vec!["interface"]);
    }

    #[test]
    fn test_wrong_type_stops_descent() {
        let schema = json!({
            "type": "object",
            "properties": {"interface": {"type": "object", "required": ["theme"]}}
        });
        let validator = SchemaValidator::new(Some(schema));
        let err = validator.validate(&json!({"interface": 5})).unwrap_err();
        assert_eq!(err.len(), 1);
        assert!(err[0].message.contains("Expected type"));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let schema = json!({"properties": {"name": {"type": "string", "pattern": "(["}}});
        let validator = SchemaValidator::new(Some(schema));
        let err = validator.validate(&json!({"name": "x"})).unwrap_err();
        assert!(err[0].message.starts_with("Invalid regex pattern"));
    }

    #[test]
    fn test_violation_display() {
        let v = Violation::new("speech.synthesis.rate", "Speech rate must be at most 300");
        assert_eq!(
            v.to_string(),
            "speech.synthesis.rate: Speech rate must be at most 300"
        );
    }

    #[test]
    fn test_lookup() {
        let config = json!({"a": {"b": {"c": 3}}});
        assert_eq!(lookup(&config, "a.b.c"), Some(&json!(3)));
        assert_eq!(lookup(&config, "a.x"), None);
        assert_eq!(lookup(&config, ""), Some(&config));
    }
}
