//! Built-in configuration templates

use serde_json::{Value, json};

/// Named preset merged onto the live configuration by
/// [`ConfigStore::apply_template`](crate::ConfigStore::apply_template)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigTemplate {
    /// Theme, font and speech basics
    Minimal,
    /// Larger window, developer tools and performance monitoring
    Development,
}

impl ConfigTemplate {
    /// Look up a template by name, falling back to [`ConfigTemplate::Minimal`]
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "development" | "dev" => Self::Development,
            "minimal" => Self::Minimal,
            other => {
                log::debug!("Unknown template '{other}', using minimal");
                Self::Minimal
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Development => "development",
        }
    }

    pub fn value(self) -> Value {
        match self {
            Self::Minimal => json!({
                "interface": {"theme": "dark", "font_size": 12},
                "speech": {"synthesis": {"rate": 150, "volume": 0.9}}
            }),
            Self::Development => json!({
                "interface": {
                    "theme": "dark",
                    "font_size": 14,
                    "window_size": {"width": 1920, "height": 1080}
                },
                "system": {
                    "default_apps": {
                        "editor": "cursor",
                        "terminal": "windowsterminal",
                        "browser": "brave"
                    }
                },
                "performance": {
                    "monitoring": {
                        "enabled": true,
                        "metrics": ["cpu", "memory", "response_time"]
                    }
                }
            }),
        }
    }
}

/// User overlay written on first start when no user file exists
pub fn first_run_overlay() -> Value {
    json!({
        "interface": {"theme": "dark", "font_size": 12},
        "speech": {"synthesis": {"rate": 150, "volume": 0.9}},
        "system": {"volume_step": 10, "brightness_step": 10}
    })
}
