use clap::Parser;

use crate::config::{AppConfig, Lang};

#[derive(Debug, Parser)]
#[command(name = "deskpilot")]
#[command(version)]
#[command(about = "Drive the desktop with a vision language model")]
#[command(long_about = r#"
DeskPilot screenshots the desktop, asks an OpenAI-compatible vision model for
the next step and performs it with the mouse and keyboard until the task is done.

Examples:
  deskpilot "open Chrome and search for DeepSeek"
  deskpilot --lang en --max-steps 20 "create a new note in Obsidian"
  deskpilot --list-apps
"#)]
pub struct Args {
    /// Task description in natural language
    #[arg(trailing_var_arg = true)]
    pub task: Vec<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "DESKPILOT_BASE_URL")]
    pub base_url: Option<String>,

    /// Model name
    #[arg(long, env = "DESKPILOT_MODEL")]
    pub model: Option<String>,

    /// API key
    #[arg(long, env = "DESKPILOT_API_KEY", hide_env_values = true)]
    pub apikey: Option<String>,

    /// Maximum number of steps before giving up
    #[arg(long, env = "DESKPILOT_MAX_STEPS")]
    pub max_steps: Option<u32>,

    /// Prompt and console language
    #[arg(long, value_enum, env = "DESKPILOT_LANG")]
    pub lang: Option<Lang>,

    /// List supported applications and exit
    #[arg(long)]
    pub list_apps: bool,

    /// Write the effective configuration to ./config.toml and exit
    #[arg(long)]
    pub init_config: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Task words joined with spaces; `None` when no task was given.
    pub fn task(&self) -> Option<String> {
        let task = self.task.join(" ");
        let task = task.trim();
        (!task.is_empty()).then(|| task.to_string())
    }

    /// Overrides file values with flags and environment variables.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(base_url) = &self.base_url {
            config.model.base_url = base_url.clone();
        }
        if let Some(model) = &self.model {
            config.model.model = model.clone();
        }
        if let Some(api_key) = &self.apikey {
            config.model.api_key = api_key.clone();
        }
        if let Some(max_steps) = self.max_steps {
            config.max_steps = max_steps;
        }
        if let Some(lang) = self.lang {
            config.lang = lang;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = Args::try_parse_from([
            "deskpilot",
            "--base-url",
            "http://gpu-box:8000/v1",
            "--max-steps",
            "7",
            "--lang",
            "en",
            "open",
            "Chrome",
        ])
        .unwrap();
        let mut cfg = AppConfig::default();
        args.apply(&mut cfg);
        assert_eq!(cfg.model.base_url, "http://gpu-box:8000/v1");
        assert_eq!(cfg.model.model, "autoglm-phone-9b");
        assert_eq!(cfg.max_steps, 7);
        assert_eq!(cfg.lang, Lang::En);
        assert_eq!(args.task().as_deref(), Some("open Chrome"));
    }

    #[test]
    fn missing_task_is_none() {
        let args = Args::try_parse_from(["deskpilot", "--list-apps"]).unwrap();
        assert!(args.list_apps);
        assert_eq!(args.task(), None);
    }
}
