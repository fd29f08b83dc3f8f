//! Configuration system (layered: defaults > TOML file > env).

use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, Result};

/// Tunables for history retention and turn pacing.
///
/// Resolution order, lowest to highest:
/// 1. Built-in defaults
/// 2. TOML file (see [`CadenceConfig::default_path`])
/// 3. `CADENCE_*` environment variables (a `.env` file is honored)
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    /// Maximum stored messages. `0` disables retention.
    #[builder(default = 50)]
    pub history_size: usize,
    /// Split responses that carry server turns into paced messages.
    #[builder(default = true)]
    pub multi_turn_enabled: bool,
    /// Minimum gap before a turn is shown.
    #[builder(default = 800)]
    pub base_delay_ms: u64,
    /// Upper bound on the gap before a single turn.
    #[builder(default = 4000)]
    pub max_delay_ms: u64,
    /// Simulated typing speed used to stretch longer turns.
    #[builder(default = 18.0)]
    pub typing_chars_per_second: f64,
    /// Relative randomness applied to each gap, in `[0, 1)`.
    #[builder(default = 0.2)]
    pub jitter_ratio: f64,
    /// Gap before the image pseudo-turn fires.
    #[builder(default = 1500)]
    pub image_turn_delay_ms: u64,
    #[builder(default = String::from("<think>"), into)]
    pub reasoning_open_tag: String,
    #[builder(default = String::from("</think>"), into)]
    pub reasoning_close_tag: String,
    #[builder(into)]
    pub system_prompt: Option<String>,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

const ENV_PREFIX: &str = "CADENCE_";

impl CadenceConfig {
    /// Default config file location (`<config_dir>/cadence.toml`).
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "cadence")
            .map(|dirs| dirs.config_dir().join("cadence.toml"))
    }

    /// Parse a TOML document. Missing keys fall back to defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| CadenceError::Configuration(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Defaults, overlaid with the default file (if present) and the environment.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let base = match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "loading cadence config file");
                Self::from_file(&path)?
            }
            _ => Self::default(),
        };
        let config = base.with_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CADENCE_*` overrides read through `lookup`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = var("HISTORY_SIZE") {
            self.history_size = parse_env("HISTORY_SIZE", &v)?;
        }
        if let Some(v) = var("MULTI_TURN") {
            self.multi_turn_enabled = parse_bool("MULTI_TURN", &v)?;
        }
        if let Some(v) = var("BASE_DELAY_MS") {
            self.base_delay_ms = parse_env("BASE_DELAY_MS", &v)?;
        }
        if let Some(v) = var("MAX_DELAY_MS") {
            self.max_delay_ms = parse_env("MAX_DELAY_MS", &v)?;
        }
        if let Some(v) = var("TYPING_CPS") {
            self.typing_chars_per_second = parse_env("TYPING_CPS", &v)?;
        }
        if let Some(v) = var("JITTER_RATIO") {
            self.jitter_ratio = parse_env("JITTER_RATIO", &v)?;
        }
        if let Some(v) = var("IMAGE_TURN_DELAY_MS") {
            self.image_turn_delay_ms = parse_env("IMAGE_TURN_DELAY_MS", &v)?;
        }
        if let Some(v) = var("SYSTEM_PROMPT") {
            self.system_prompt = Some(v);
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_delay_ms < self.base_delay_ms {
            return Err(CadenceError::Configuration(format!(
                "max_delay_ms ({}) is below base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        if !(self.typing_chars_per_second > 0.0) {
            return Err(CadenceError::Configuration(
                "typing_chars_per_second must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.jitter_ratio) {
            return Err(CadenceError::Configuration(format!(
                "jitter_ratio {} outside [0, 1)",
                self.jitter_ratio
            )));
        }
        if self.reasoning_open_tag.is_empty() || self.reasoning_close_tag.is_empty() {
            return Err(CadenceError::Configuration(
                "reasoning delimiters must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn image_turn_delay(&self) -> Duration {
        Duration::from_millis(self.image_turn_delay_ms)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        CadenceError::Configuration(format!("{ENV_PREFIX}{name}={value:?}: {e}"))
    })
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CadenceError::Configuration(format!(
            "{ENV_PREFIX}{name}={value:?}: expected a boolean"
        ))),
    }
}
