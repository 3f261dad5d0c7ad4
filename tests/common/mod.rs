//! Common test utilities for confkeep integration tests
//!
//! Provides the assistant's default configuration, a schema for it and
//! fixtures that lay both out in a temporary directory.

#![allow(dead_code)]

use confkeep::{ConfigRuntime, ConfigStore, StoreConfig};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// =============================================================================
// Test Configuration Layers
// =============================================================================

/// Shipped defaults of the assistant
pub fn default_config() -> Value {
    json!({
        "automation": {
            "schedules": {
                "morning": {"time": "08:00", "action": "open_apps"}
            },
            "triggers": {}
        },
        "speech": {
            "recognition": {"engine": "google", "language": "tr-TR", "timeout": 5},
            "synthesis": {"engine": "sapi5", "voice": "tr", "rate": 150, "volume": 0.8}
        },
        "window_management": {"layouts": {}},
        "security": {
            "voice_recognition": {"enabled": false, "confidence_threshold": 0.7},
            "data_privacy": {"encryption_enabled": false, "store_commands": false}
        },
        "interface": {
            "theme": "light",
            "font_size": 11,
            "window_size": {"width": 1024, "height": 768}
        },
        "system": {"volume_step": 5, "brightness_step": 5},
        "sync": {"enabled": false}
    })
}

/// Schema describing the defaults
pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "speech": {
                "type": "object",
                "properties": {
                    "synthesis": {
                        "type": "object",
                        "properties": {
                            "rate": {"type": "integer", "minimum": 0},
                            "volume": {"type": "number"}
                        }
                    }
                }
            },
            "interface": {
                "type": "object",
                "properties": {
                    "theme": {"type": "string", "enum": ["dark", "light", "contrast"]},
                    "font_size": {"type": "integer", "minimum": 8, "maximum": 32}
                }
            },
            "system": {
                "type": "object",
                "properties": {
                    "volume_step": {"type": "integer", "minimum": 1, "maximum": 50}
                }
            }
        }
    })
}

/// Route `log` output through the test harness; safe to call repeatedly
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn write_json(path: &Path, value: &Value) {
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

// =============================================================================
// Test Fixtures
// =============================================================================

/// Temporary directory with default.json and schema.json in place
pub struct TestFixture {
    pub temp_dir: TempDir,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::with_default(default_config())
    }

    pub fn with_default(default: Value) -> Self {
        init_logging();
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        write_json(&temp_dir.path().join("default.json"), &default);
        write_json(&temp_dir.path().join("schema.json"), &schema());
        Self { temp_dir }
    }

    pub fn config(&self) -> StoreConfig {
        StoreConfig::builder("test-app")
            .config_dir(self.temp_dir.path())
            .build()
    }

    pub fn open_store(&self) -> ConfigStore {
        ConfigStore::open(self.config()).expect("Failed to open store")
    }

    pub fn open_runtime(&self) -> ConfigRuntime {
        ConfigRuntime::with_transport(self.config(), None).expect("Failed to open runtime")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    pub fn user_path(&self) -> PathBuf {
        self.temp_dir.path().join("user.json")
    }

    pub fn read_user(&self) -> Value {
        serde_json::from_str(&std::fs::read_to_string(self.user_path()).unwrap()).unwrap()
    }
}
