//! Typed read views of the well-known sections
//!
//! Consumers such as the speech engine or the window manager only read
//! configuration. Every field has a default, so a missing section or key
//! never fails a read.

use crate::store::ConfigStore;

use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A top-level section with a typed view
pub trait Section: DeserializeOwned + Default {
    /// Key of the section in the configuration
    const NAME: &'static str;
}

impl ConfigStore {
    /// Typed view of a section
    ///
    /// A section that does not deserialize is logged and read as defaults.
    pub fn section<T: Section>(&self) -> T {
        let value = self.get_or(T::NAME, Value::Null);
        if value.is_null() {
            return T::default();
        }
        serde_json::from_value(value).unwrap_or_else(|e| {
            warn!("Section '{}' does not match its expected shape: {e}", T::NAME);
            T::default()
        })
    }
}

// =============================================================================
// automation
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationSettings {
    /// Named tasks run at a time of day, optionally on one weekday
    pub schedules: BTreeMap<String, ScheduledTask>,
    /// Named triggers and their raw settings
    pub triggers: BTreeMap<String, Value>,
}

impl Section for AutomationSettings {
    const NAME: &'static str = "automation";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduledTask {
    /// `HH:MM`
    pub time: Option<String>,
    /// Weekday name for weekly tasks; daily when absent
    pub day: Option<String>,
    pub action: Option<String>,
    pub params: Value,
}

// =============================================================================
// speech
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    pub recognition: RecognitionSettings,
    pub synthesis: SynthesisSettings,
}

impl Section for SpeechSettings {
    const NAME: &'static str = "speech";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    pub engine: String,
    pub language: String,
    /// Seconds to wait for speech
    pub timeout: u64,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            engine: "google".into(),
            language: "tr-TR".into(),
            timeout: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisSettings {
    pub engine: String,
    pub voice: String,
    /// Words per minute, at most 300
    pub rate: u32,
    /// 0.0 to 1.0
    pub volume: f64,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            engine: "sapi5".into(),
            voice: "tr".into(),
            rate: 150,
            volume: 0.9,
        }
    }
}

// =============================================================================
// window_management
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowManagementSettings {
    /// Layout name to per-monitor placement (`monitor1`, `monitor2`, ...)
    pub layouts: BTreeMap<String, BTreeMap<String, Value>>,
}

impl Section for WindowManagementSettings {
    const NAME: &'static str = "window_management";
}

// =============================================================================
// security
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    pub voice_recognition: VoiceRecognitionSettings,
    pub data_privacy: DataPrivacySettings,
}

impl Section for SecuritySettings {
    const NAME: &'static str = "security";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceRecognitionSettings {
    pub enabled: bool,
    /// At least 0.5
    pub confidence_threshold: f64,
    pub authorized_voices: Vec<String>,
    pub allowed_commands: Vec<String>,
}

impl Default for VoiceRecognitionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            confidence_threshold: 0.5,
            authorized_voices: Vec::new(),
            allowed_commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPrivacySettings {
    pub encryption_enabled: bool,
    pub store_commands: bool,
    /// Age after which command history is cleared, e.g. `24h`
    pub auto_clear_history: String,
}

impl Default for DataPrivacySettings {
    fn default() -> Self {
        Self {
            encryption_enabled: false,
            store_commands: false,
            auto_clear_history: "24h".into(),
        }
    }
}

// =============================================================================
// interface
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceSettings {
    pub theme: String,
    pub font_size: u32,
    pub window_size: WindowSize,
}

impl Default for InterfaceSettings {
    fn default() -> Self {
        Self {
            theme: "dark".into(),
            font_size: 12,
            window_size: WindowSize::default(),
        }
    }
}

impl Section for InterfaceSettings {
    const NAME: &'static str = "interface";
}

/// Main window size; at least 640x480
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSize {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

// =============================================================================
// system
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSettings {
    pub volume_step: u32,
    pub brightness_step: u32,
    pub screenshot_dir: String,
    pub log_dir: String,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            volume_step: 10,
            brightness_step: 10,
            screenshot_dir: "screenshots".into(),
            log_dir: "data/logs".into(),
        }
    }
}

impl Section for SystemSettings {
    const NAME: &'static str = "system";
}
