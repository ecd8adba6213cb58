//! Configuration — YAML config + env var overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::types::Voice;

/// Known provider presets
const PROVIDER_PRESETS: &[(&str, Option<&str>)] = &[
    ("gemini", Some("https://generativelanguage.googleapis.com/v1")),
    ("openai", Some("https://api.openai.com/v1")),
    ("openrouter", Some("https://openrouter.ai/api/v1")),
    ("custom", None),
];

/// Provider-specific API key env vars (checked before OPENAI_API_KEY fallback)
const PROVIDER_KEY_ENV_VARS: &[(&str, &str)] = &[
    ("gemini", "GEMINI_API_KEY"),
    ("openrouter", "OPENROUTER_API_KEY"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// "gemini" | "openai" | "openrouter" | "custom"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// LLM model name
    #[serde(default = "default_model")]
    pub model: String,

    /// API key (set here or via env var)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the API (auto-set for known providers)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Delay between typed characters
    #[serde(default = "default_typing_interval")]
    pub typing_interval_ms: u64,

    /// Delay before the check-in message after a completed cycle
    #[serde(default = "default_follow_up_delay")]
    pub follow_up_delay_secs: u64,

    #[serde(default)]
    pub speech: SpeechConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Speak responses aloud
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_locale")]
    pub locale: String,

    /// 1.0 is the driver's normal speaking rate
    #[serde(default = "default_rate")]
    pub rate: f32,

    /// TTS command; `{locale}`, `{wpm}` and `{text}` are substituted
    #[serde(default = "default_speech_command")]
    pub command: Vec<String>,

    /// Speech-to-text command printing one transcript line; `{locale}` is substituted.
    /// Voice input is unavailable when unset.
    #[serde(default)]
    pub recognizer_command: Option<Vec<String>>,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-pro".into()
}
fn default_request_timeout() -> u64 {
    60
}
fn default_typing_interval() -> u64 {
    30
}
fn default_follow_up_delay() -> u64 {
    60
}
fn default_true() -> bool {
    true
}
fn default_locale() -> String {
    "en-US".into()
}
fn default_rate() -> f32 {
    1.0
}
fn default_speech_command() -> Vec<String> {
    ["espeak-ng", "-v", "{locale}", "-s", "{wpm}", "--", "{text}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Config {
    /// Load config from a YAML file with env var overrides.
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config: {}", config_path.display()))?;

        let config: Config =
            serde_yaml::from_str(&content).context("Failed to parse config.yaml")?;

        config.finish()
    }

    /// Load `config.yaml` from a directory, falling back to defaults when it is absent.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join("config.yaml");
        if config_path.is_file() {
            Self::load(&config_path)
        } else {
            Config::default().finish()
        }
    }

    /// Apply env var overrides and provider presets, then validate.
    fn finish(mut self) -> Result<Self> {
        if let Ok(p) = std::env::var("PARLEY_PROVIDER") {
            self.provider = p;
        }

        let preset = PROVIDER_PRESETS
            .iter()
            .find(|(p, _)| *p == self.provider)
            .with_context(|| format!("Unknown provider '{}'", self.provider))?;

        // Base URL: env var > config > provider preset
        if let Ok(url) = std::env::var("PARLEY_BASE_URL") {
            self.base_url = Some(url);
        } else if self.base_url.is_none() {
            self.base_url = preset.1.map(String::from);
        }

        // API key: provider-specific env var > config > OPENAI_API_KEY
        let provider_key_var = PROVIDER_KEY_ENV_VARS
            .iter()
            .find(|(p, _)| *p == self.provider)
            .map(|(_, var)| *var);

        if let Some(var) = provider_key_var {
            if let Ok(key) = std::env::var(var) {
                self.api_key = Some(key);
            }
        }
        if self.api_key.is_none() && self.provider != "gemini" {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                self.api_key = Some(key);
            }
        }

        if let Ok(m) = std::env::var("PARLEY_MODEL") {
            self.model = m;
        }

        if self.provider == "custom" && self.base_url.is_none() {
            anyhow::bail!(
                "Provider 'custom' requires base_url in config.yaml or PARLEY_BASE_URL env var"
            );
        }
        if !(self.speech.rate > 0.0) {
            anyhow::bail!("speech.rate must be positive, got {}", self.speech.rate);
        }

        Ok(self)
    }

    pub fn typing_interval(&self) -> Duration {
        Duration::from_millis(self.typing_interval_ms)
    }

    pub fn follow_up_delay(&self) -> Duration {
        Duration::from_secs(self.follow_up_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn voice(&self) -> Voice {
        Voice {
            locale: self.speech.locale.clone(),
            rate: self.speech.rate,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            request_timeout_secs: default_request_timeout(),
            typing_interval_ms: default_typing_interval(),
            follow_up_delay_secs: default_follow_up_delay(),
            speech: SpeechConfig::default(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            locale: default_locale(),
            rate: default_rate(),
            command: default_speech_command(),
            recognizer_command: None,
        }
    }
}
