use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::apps::AppEntry;
use crate::errors::{DeskPilotError, DeskPilotResult};

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub lang: Lang,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Print per-step reasoning and actions to stdout.
    #[serde(default = "default_true")]
    pub verbose: bool,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    /// Extra entries for the application registry, keyed by display name.
    #[serde(default)]
    pub apps: BTreeMap<String, AppEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            lang: Lang::default(),
            max_steps: default_max_steps(),
            verbose: true,
            model: ModelConfig::default(),
            timing: TimingConfig::default(),
            safety: SafetyConfig::default(),
            apps: BTreeMap::new(),
        }
    }
}

/// Prompt and console language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Lang {
    #[default]
    Cn,
    En,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// OpenAI-compatible base URL; `/chat/completions` is appended.
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_frequency_penalty")]
    pub frequency_penalty: f64,
    /// Use SSE streaming for completions.
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".into(),
            model: "autoglm-phone-9b".into(),
            api_key: "EMPTY".into(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            frequency_penalty: default_frequency_penalty(),
            stream: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Fixed delays, all in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause between loop iterations.
    pub step_settle: u64,
    /// Pause after a click, drag or shortcut.
    pub after_input: u64,
    pub after_launch: u64,
    /// Pause between clearing a field and typing, and after typing.
    pub type_settle: u64,
    pub long_press_hold: u64,
    pub swipe_duration: u64,
    pub keystroke_interval: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            step_settle: 1000,
            after_input: 1000,
            after_launch: 2000,
            type_settle: 500,
            long_press_hold: 1000,
            swipe_duration: 500,
            keystroke_interval: 10,
        }
    }
}

impl TimingConfig {
    /// All delays set to zero.
    pub fn immediate() -> Self {
        Self {
            step_settle: 0,
            after_input: 0,
            after_launch: 0,
            type_settle: 0,
            long_press_hold: 0,
            swipe_duration: 0,
            keystroke_interval: 0,
        }
    }

    pub fn step_settle(&self) -> Duration {
        Duration::from_millis(self.step_settle)
    }

    pub fn after_input(&self) -> Duration {
        Duration::from_millis(self.after_input)
    }

    pub fn after_launch(&self) -> Duration {
        Duration::from_millis(self.after_launch)
    }

    pub fn type_settle(&self) -> Duration {
        Duration::from_millis(self.type_settle)
    }

    pub fn long_press_hold(&self) -> Duration {
        Duration::from_millis(self.long_press_hold)
    }

    pub fn swipe_duration(&self) -> Duration {
        Duration::from_millis(self.swipe_duration)
    }

    pub fn keystroke_interval(&self) -> Duration {
        Duration::from_millis(self.keystroke_interval)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Ask the operator before executing actions that carry a confirmation message.
    #[serde(default = "default_true")]
    pub confirm_sensitive: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            confirm_sensitive: true,
        }
    }
}

fn default_max_steps() -> u32 {
    50
}

fn default_max_tokens() -> u32 {
    3000
}

fn default_top_p() -> f64 {
    0.85
}

fn default_frequency_penalty() -> f64 {
    0.2
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

/// Settings the loop controller needs, handed over at construction.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_steps: u32,
    pub lang: Lang,
    pub verbose: bool,
    pub step_settle: Duration,
}

impl AppConfig {
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            max_steps: self.max_steps,
            lang: self.lang,
            verbose: self.verbose,
            step_settle: self.timing.step_settle(),
        }
    }
}

fn resolve_config_path() -> DeskPilotResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join(CONFIG_FILE);
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("deskpilot").join(CONFIG_FILE);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config directory");
            return Ok(candidate);
        }
    }

    Err(DeskPilotError::Config(
        "config.toml not found next to executable, in working directory or user config directory"
            .into(),
    ))
}

pub fn load_config() -> DeskPilotResult<AppConfig> {
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), model = %config.model.model, "config loaded");
    Ok(config)
}

pub fn parse_config(content: &str) -> DeskPilotResult<AppConfig> {
    Ok(toml::from_str(content)?)
}

/// Writes `config` to `config.toml` in the working directory.
pub fn save_config(config: &AppConfig) -> DeskPilotResult<PathBuf> {
    let path = std::env::current_dir()?.join(CONFIG_FILE);
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(path)
}
