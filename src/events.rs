//! Change listeners and per-section validators
//!
//! Listeners run after a mutation has been committed; validators run on the
//! candidate section value before it is committed.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Callback receiving (`section`, `old_value`, `new_value`)
pub type ChangeCallback = Arc<dyn Fn(&str, &Value, &Value) + Send + Sync>;

/// Extra validation for one section's candidate value
pub type Validator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Manages event listeners for configuration changes
#[derive(Default)]
pub struct EventManager {
    /// Called for every changed section
    global_listeners: RwLock<Vec<ChangeCallback>>,

    /// Called only when the named section changes
    section_listeners: RwLock<HashMap<String, Vec<ChangeCallback>>>,

    validators: RwLock<HashMap<String, Vec<Validator>>>,
}

impl EventManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener called for every committed section change
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(&str, &Value, &Value) + Send + Sync + 'static,
    {
        self.global_listeners.write().push(Arc::new(callback));
    }

    /// Register a listener for one section
    pub fn watch<F>(&self, section: &str, callback: F)
    where
        F: Fn(&str, &Value, &Value) + Send + Sync + 'static,
    {
        self.section_listeners
            .write()
            .entry(section.to_string())
            .or_default()
            .push(Arc::new(callback));
    }

    /// Register a validator for one section
    ///
    /// Runs in addition to the schema and domain rules; a returned error
    /// rejects the mutation.
    pub fn add_validator<F>(&self, section: &str, validator: F)
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validators
            .write()
            .entry(section.to_string())
            .or_default()
            .push(Arc::new(validator));
    }

    /// Run every validator registered for `section`, collecting all messages
    pub fn validate(&self, section: &str, value: &Value) -> Vec<String> {
        let validators: Vec<Validator> = self
            .validators
            .read()
            .get(section)
            .cloned()
            .unwrap_or_default();

        validators
            .iter()
            .filter_map(|validator| validator(value).err())
            .collect()
    }

    /// Notify listeners about a committed change
    ///
    /// Callbacks are cloned out of the lock first, so a listener may register
    /// further listeners without deadlocking.
    pub fn notify(&self, section: &str, old_value: &Value, new_value: &Value) {
        let mut callbacks: Vec<ChangeCallback> = self.global_listeners.read().clone();
        if let Some(listeners) = self.section_listeners.read().get(section) {
            callbacks.extend(listeners.iter().cloned());
        }

        for callback in callbacks {
            callback(section, old_value, new_value);
        }
    }

    /// Remove all listeners for a section
    pub fn unwatch(&self, section: &str) {
        self.section_listeners.write().remove(section);
    }

    /// Clear all listeners and validators
    pub fn clear(&self) {
        self.global_listeners.write().clear();
        self.section_listeners.write().clear();
        self.validators.write().clear();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_global_listener() {
        let events = EventManager::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        events.on_change(move |_section, _old, _new| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        events.notify("interface", &json!({}), &json!({"theme": "dark"}));

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_section_listener() {
        let events = EventManager::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        events.watch("speech", move |_section, _old, _new| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        events.notify("speech", &json!({"rate": 150}), &json!({"rate": 180}));
        events.notify("interface", &json!({}), &json!({}));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        events.unwatch("speech");
        events.notify("speech", &json!({}), &json!({}));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_may_register_listener() {
        let events = Arc::new(EventManager::new());
        let inner = events.clone();

        events.on_change(move |_, _, _| inner.on_change(|_, _, _| {}));
        events.notify("system", &json!({}), &json!({}));

        assert_eq!(events.global_listeners.read().len(), 2);
    }

    #[test]
    fn test_validator_collects_messages() {
        let events = EventManager::new();

        events.add_validator("system", |value| {
            match value.get("volume_step").and_then(Value::as_i64) {
                Some(step) if (1..=50).contains(&step) => Ok(()),
                _ => Err("volume_step must be between 1 and 50".into()),
            }
        });
        events.add_validator("system", |value| {
            if value.get("brightness_step").is_some_and(|v| !v.is_number()) {
                Err("brightness_step must be a number".into())
            } else {
                Ok(())
            }
        });

        assert!(events.validate("system", &json!({"volume_step": 10})).is_empty());
        let errors = events.validate(
            "system",
            &json!({"volume_step": 90, "brightness_step": "x"}),
        );
        assert_eq!(errors.len(), 2);

        // Sections without validators always pass
        assert!(events.validate("speech", &json!("anything")).is_empty());
    }
}
