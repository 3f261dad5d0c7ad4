//! Layer merging and overlay extraction

use serde_json::{Map, Value};

/// Overlay `overlay` onto `base`
///
/// Nested mappings merge recursively; any other overlay value replaces the
/// base value.
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(b), Value::Object(o)) => {
            let mut merged = b.clone();
            for (key, value) in o {
                let next = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (_, o) => o.clone(),
    }
}

/// Values in `live` that differ from `default`
///
/// This is the user overlay: `deep_merge(default, &overlay_diff(default, live))`
/// reproduces `live` as long as `live` has not dropped keys present in
/// `default`. See [`rebase_on_default`].
pub fn overlay_diff(default: &Value, live: &Value) -> Value {
    match (default, live) {
        (Value::Object(d), Value::Object(l)) => {
            let mut out = Map::new();
            for (key, value) in l {
                match d.get(key) {
                    None => {
                        out.insert(key.clone(), value.clone());
                    }
                    Some(base) if base == value => {}
                    Some(base @ Value::Object(_)) if value.is_object() => {
                        let nested = overlay_diff(base, value);
                        if nested.as_object().is_some_and(|m| !m.is_empty()) {
                            out.insert(key.clone(), nested);
                        }
                    }
                    Some(_) => {
                        out.insert(key.clone(), value.clone());
                    }
                }
            }
            Value::Object(out)
        }
        (_, l) => l.clone(),
    }
}

/// `candidate` as the defaults plus its overlay
///
/// Keys of `default` that `candidate` dropped come back with their default
/// value, so the result survives a save and reload unchanged.
pub fn rebase_on_default(default: &Value, candidate: &Value) -> Value {
    deep_merge(default, &overlay_diff(default, candidate))
}

/// Set `value` at `dotted` below `section`, creating mappings on the way
///
/// An empty `dotted` replaces the whole section. Non-mapping values on the
/// path are replaced by mappings.
pub fn deep_set(root: &mut Value, section: &str, dotted: &str, value: Value) {
    if !root.is_object() {
        *root = Value::Object(Map::new());
    }

    let keys = std::iter::once(section).chain(dotted.split('.').filter(|k| !k.is_empty()));
    let keys: Vec<&str> = keys.collect();

    let mut current = root;
    for (i, key) in keys.iter().enumerate() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if i + 1 == keys.len() {
            map.insert((*key).to_string(), value);
            return;
        }
        current = map
            .entry((*key).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// Top-level keys whose values differ between `old` and `new`
pub fn changed_sections(old: &Value, new: &Value) -> Vec<String> {
    let empty = Map::new();
    let a = old.as_object().unwrap_or(&empty);
    let b = new.as_object().unwrap_or(&empty);

    a.keys()
        .chain(b.keys().filter(|k| !a.contains_key(*k)))
        .filter(|k| a.get(*k) != b.get(*k))
        .cloned()
        .collect()
}
