//! AI model selection and per-model parameters
//!
//! Models live under `ai.models.<name>`; `ai.default_model` names the one
//! used when a caller does not ask for a specific model.

use super::{ConfigStore, UpdateOutcome};
use crate::config::{Violation, lookup};
use crate::error::Result;

use log::{info, warn};
use serde_json::{Map, Value, json};

pub const AI_SECTION: &str = "ai";

impl ConfigStore {
    /// Name in `ai.default_model`, if set
    pub fn default_model(&self) -> Option<String> {
        self.get_path("ai.default_model")
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// Parameters of `model`, or of the default model when `None`
    ///
    /// Unknown models give an empty mapping.
    pub fn get_model_config(&self, model: Option<&str>) -> Value {
        let name = match model {
            Some(name) => name.to_string(),
            None => match self.default_model() {
                Some(name) => name,
                None => return json!({}),
            },
        };
        let live = self.snapshot();
        live.get(AI_SECTION)
            .and_then(|ai| ai.get("models"))
            .and_then(|models| models.get(name.as_str()))
            .cloned()
            .unwrap_or_else(|| json!({}))
    }

    /// Make `model` the default
    ///
    /// Rejected unless `model` is one of the configured models.
    ///
    /// # Errors
    ///
    /// Returns an error if the validated result cannot be persisted.
    pub fn set_model(&self, model: &str) -> Result<UpdateOutcome> {
        let outcome = self.try_mutate(Some(AI_SECTION), |live, _| {
            known_model(live, model)?;
            let mut candidate = live.clone();
            super::merge::deep_set(&mut candidate, AI_SECTION, "default_model", json!(model));
            Ok(candidate)
        })?;
        match &outcome {
            UpdateOutcome::Applied => info!("Default model set to '{model}'"),
            UpdateOutcome::Rejected(_) => warn!("Cannot select model '{model}'"),
            UpdateOutcome::Unchanged => {}
        }
        Ok(outcome)
    }

    /// Overwrite the given keys of `model`'s parameters
    ///
    /// Keys not named in `params` keep their value. Rejected for unknown
    /// models and for `params` that are not a mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if the validated result cannot be persisted.
    pub fn update_model_config(&self, model: &str, params: &Value) -> Result<UpdateOutcome> {
        let outcome = self.try_mutate(Some(AI_SECTION), |live, _| {
            let Some(params) = params.as_object() else {
                return Err(vec![Violation::new(
                    format!("ai.models.{model}"),
                    "Model parameters must be a mapping",
                )]);
            };
            let mut current = known_model(live, model)?.clone();
            for (key, value) in params {
                current.insert(key.clone(), value.clone());
            }

            let mut candidate = live.clone();
            super::merge::deep_set(
                &mut candidate,
                AI_SECTION,
                &format!("models.{model}"),
                Value::Object(current),
            );
            Ok(candidate)
        })?;
        if outcome.is_applied() {
            info!("Parameters of model '{model}' updated");
        }
        Ok(outcome)
    }
}

/// Parameters of a configured model, or why there are none
fn known_model<'a>(
    live: &'a Value,
    model: &str,
) -> std::result::Result<&'a Map<String, Value>, Vec<Violation>> {
    let unknown = || vec![Violation::new("ai.models", format!("Unknown model '{model}'"))];
    if model.is_empty() || model.contains('.') {
        return Err(unknown());
    }
    lookup(live, "ai.models")
        .and_then(|models| models.get(model))
        .and_then(Value::as_object)
        .ok_or_else(unknown)
}

#[cfg(test)]
mod tests {
    use crate::config::StoreConfig;
    use crate::store::{ConfigStore, UpdateOutcome};
    use serde_json::json;
    use tempfile::TempDir;

    fn open() -> (TempDir, ConfigStore) {
        let temp = tempfile::tempdir().unwrap();
        let default = json!({
            "ai": {
                "default_model": "gpt",
                "models": {
                    "gpt": {"temperature": 0.7, "max_tokens": 1024},
                    "local": {"temperature": 0.2, "max_tokens": 512}
                }
            }
        });
        std::fs::write(temp.path().join("default.json"), default.to_string()).unwrap();
        let config = StoreConfig::builder("test").config_dir(temp.path()).build();
        let store = ConfigStore::open(config).unwrap();
        (temp, store)
    }

    #[test]
    fn test_get_model_config() {
        let (_temp, store) = open();
        assert_eq!(store.get_model_config(None)["max_tokens"], json!(1024));
        assert_eq!(store.get_model_config(Some("local"))["temperature"], json!(0.2));
        assert_eq!(store.get_model_config(Some("missing")), json!({}));
    }

    #[test]
    fn test_set_model() {
        let (temp, store) = open();
        assert!(store.set_model("local").unwrap().is_applied());
        assert_eq!(store.default_model().as_deref(), Some("local"));
        assert_eq!(store.get_model_config(None)["max_tokens"], json!(512));

        let user: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(temp.path().join("user.json")).unwrap())
                .unwrap();
        assert_eq!(user["ai"]["default_model"], json!("local"));

        let outcome = store.set_model("nope").unwrap();
        assert_eq!(outcome.violations()[0].path, "ai.models");
        assert_eq!(store.default_model().as_deref(), Some("local"));
        assert_eq!(store.set_model("local").unwrap(), UpdateOutcome::Unchanged);
    }

    #[test]
    fn test_update_model_config() {
        let (_temp, store) = open();
        let outcome = store
            .update_model_config("gpt", &json!({"temperature": 0.1, "top_p": 0.9}))
            .unwrap();
        assert!(outcome.is_applied());
        assert_eq!(
            store.get_model_config(Some("gpt")),
            json!({"temperature": 0.1, "max_tokens": 1024, "top_p": 0.9})
        );
        assert_eq!(
            store.history().view_history(Some("ai"), 10).unwrap().len(),
            1
        );

        assert!(!store.update_model_config("nope", &json!({"a": 1})).unwrap().is_applied());
        assert!(!store.update_model_config("gpt", &json!(3)).unwrap().is_applied());
        assert_eq!(store.get_model_config(Some("gpt"))["temperature"], json!(0.1));
    }
}
