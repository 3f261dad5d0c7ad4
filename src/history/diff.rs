//! Structural diff between two configuration trees

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Kind of change at one path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

/// One change at a dotted path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub path: String,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
}

impl Change {
    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            change_type: ChangeType::Added,
            old_value: None,
            new_value: Some(value),
        }
    }

    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            change_type: ChangeType::Removed,
            old_value: Some(value),
            new_value: None,
        }
    }

    pub fn modified(path: impl Into<String>, old: Value, new: Value) -> Self {
        Self {
            path: path.into(),
            change_type: ChangeType::Modified,
            old_value: Some(old),
            new_value: Some(new),
        }
    }

    /// Top-level section this change belongs to
    pub fn section(&self) -> &str {
        self.path.split('.').next().unwrap_or_default()
    }

    /// `true` if the change is at `prefix` or below it
    ///
    /// `speech` matches `speech` and `speech.rate` but not `speechless`.
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        prefix.is_empty()
            || self.path == prefix
            || self
                .path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.'))
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Compute the changes turning `old` into `new`, sorted by path
///
/// Nested mappings are compared key by key; any other differing value is a
/// single `modified` change. Equal inputs produce no changes.
///
/// ```rust
/// use confkeep::history::{ChangeType, structural_diff};
/// use serde_json::json;
///
/// let old = json!({"speech": {"rate": 150, "voice": "a"}});
/// let new = json!({"speech": {"rate": 180}, "system": {"volume_step": 5}});
///
/// let changes = structural_diff(&old, &new, "");
/// let summary: Vec<_> = changes.iter().map(|c| (c.path.as_str(), c.change_type)).collect();
/// assert_eq!(summary, vec![
///     ("speech.rate", ChangeType::Modified),
///     ("speech.voice", ChangeType::Removed),
///     ("system", ChangeType::Added),
/// ]);
/// ```
pub fn structural_diff(old: &Value, new: &Value, path: &str) -> Vec<Change> {
    let mut changes = Vec::new();
    diff_into(old, new, path, &mut changes);
    changes.sort_by(|a, b| a.path.cmp(&b.path));
    changes
}

fn diff_into(old: &Value, new: &Value, path: &str, out: &mut Vec<Change>) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            for key in keys {
                let child = join(path, key);
                match (a.get(key), b.get(key)) {
                    (Some(o), Some(n)) => diff_into(o, n, &child, out),
                    (None, Some(n)) => out.push(Change::added(child, n.clone())),
                    (Some(o), None) => out.push(Change::removed(child, o.clone())),
                    (None, None) => {}
                }
            }
        }
        (o, n) if o != n => out.push(Change::modified(path, o.clone(), n.clone())),
        _ => {}
    }
}

/// Apply changes produced by [`structural_diff`] to `base`
///
/// `apply_changes(a, &structural_diff(a, b, ""))` equals `b`.
pub fn apply_changes(base: &Value, changes: &[Change]) -> Value {
    let mut result = base.clone();
    for change in changes {
        match change.change_type {
            ChangeType::Removed => remove_path(&mut result, &change.path),
            ChangeType::Added | ChangeType::Modified => {
                let value = change.new_value.clone().unwrap_or(Value::Null);
                set_path(&mut result, &change.path, value);
            }
        }
    }
    result
}

fn set_path(root: &mut Value, path: &str, value: Value) {
    if path.is_empty() {
        *root = value;
        return;
    }
    let mut current = root;
    let mut parts = path.split('.').peekable();
    while let Some(key) = parts.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if parts.peek().is_none() {
            map.insert(key.to_string(), value);
            return;
        }
        current = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

fn remove_path(root: &mut Value, path: &str) {
    let (parent, key) = match path.rsplit_once('.') {
        Some((parent, key)) => (parent, key),
        None => ("", path),
    };
    let target = parent
        .split('.')
        .filter(|s| !s.is_empty())
        .try_fold(root, |current, k| current.as_object_mut()?.get_mut(k));
    if let Some(Value::Object(map)) = target {
        map.shift_remove(key);
    }
}

// =============================================================================
// File Comparison
// =============================================================================

/// Side-by-side comparison of two configurations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Paths present only in the second configuration
    pub added: Vec<String>,
    /// Paths present only in the first configuration
    pub removed: Vec<String>,
    /// Paths whose values differ
    pub modified: Vec<Change>,
    /// Leaf paths with equal values
    pub unchanged: Vec<String>,
}

impl Comparison {
    pub fn is_identical(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Compare two configurations, listing unchanged leaves as well
pub fn compare(a: &Value, b: &Value) -> Comparison {
    let mut comparison = Comparison::default();
    for change in structural_diff(a, b, "") {
        match change.change_type {
            ChangeType::Added => comparison.added.push(change.path),
            ChangeType::Removed => comparison.removed.push(change.path),
            ChangeType::Modified => comparison.modified.push(change),
        }
    }
    collect_unchanged(a, b, "", &mut comparison.unchanged);
    comparison.unchanged.sort();
    comparison
}

fn collect_unchanged(a: &Value, b: &Value, path: &str, out: &mut Vec<String>) {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => {
            for (key, left) in x {
                if let Some(right) = y.get(key) {
                    collect_unchanged(left, right, &join(path, key), out);
                }
            }
        }
        (x, y) if x == y => out.push(path.to_string()),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_diff_of_equal_values_is_empty() {
        let config = json!({"interface": {"theme": "dark"}, "list": [1, 2]});
        assert!(structural_diff(&config, &config, "").is_empty());
    }

    #[test]
    fn test_diff_kinds() {
        let old = json!({"a": {"x": 1, "y": 2}, "b": true});
        let new = json!({"a": {"x": 1, "y": 3, "z": 4}});
        let changes = structural_diff(&old, &new, "");

        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0], Change::modified("a.y", json!(2), json!(3)));
        assert_eq!(changes[1], Change::added("a.z", json!(4)));
        assert_eq!(changes[2], Change::removed("b", json!(true)));
    }

    #[test]
    fn test_diff_with_base_path() {
        let changes = structural_diff(&json!({"rate": 1}), &json!({"rate": 2}), "speech");
        assert_eq!(changes[0].path, "speech.rate");
        assert_eq!(changes[0].section(), "speech");
    }

    #[test]
    fn test_type_change_is_modified() {
        let changes = structural_diff(&json!({"a": {"b": 1}}), &json!({"a": 5}), "");
        assert_eq!(changes, vec![Change::modified("a", json!({"b": 1}), json!(5))]);
    }

    #[test]
    fn test_apply_reproduces_target() {
        let a = json!({
            "interface": {"theme": "dark", "window_size": {"width": 800}},
            "speech": {"synthesis": {"rate": 150}},
            "old": 1
        });
        let b = json!({
            "interface": {"theme": "light", "window_size": {"width": 800, "height": 600}},
            "speech": {"synthesis": {"rate": 150}},
            "system": {"volume_step": 10}
        });

        let changes = structural_diff(&a, &b, "");
        assert_eq!(apply_changes(&a, &changes), b);
        assert_eq!(apply_changes(&b, &structural_diff(&b, &a, "")), a);
    }

    #[test]
    fn test_matches_prefix() {
        let change = Change::added("speech.synthesis.rate", json!(1));
        assert!(change.matches_prefix("speech"));
        assert!(change.matches_prefix("speech.synthesis"));
        assert!(change.matches_prefix(""));
        assert!(!change.matches_prefix("spe"));
        assert!(!change.matches_prefix("interface"));
    }

    #[test]
    fn test_serialized_shape() {
        let change = Change::modified("speech.rate", json!(150), json!(180));
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(
            value,
            json!({"path": "speech.rate", "type": "modified", "old_value": 150, "new_value": 180})
        );
    }

    #[test]
    fn test_compare() {
        let a = json!({"interface": {"theme": "dark", "font_size": 12}, "gone": 1});
        let b = json!({"interface": {"theme": "light", "font_size": 12}, "new": 2});
        let cmp = compare(&a, &b);

        assert_eq!(cmp.added, vec!["new"]);
        assert_eq!(cmp.removed, vec!["gone"]);
        assert_eq!(cmp.modified.len(), 1);
        assert_eq!(cmp.modified[0].path, "interface.theme");
        assert_eq!(cmp.unchanged, vec!["interface.font_size"]);
        assert!(!cmp.is_identical());
        assert!(compare(&a, &a).is_identical());
    }
}
