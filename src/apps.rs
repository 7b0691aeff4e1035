//! Display-name to launch-identifier mapping for supported desktop applications.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Windows,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }
}

/// Per-platform launch identifiers for one application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppEntry {
    /// macOS bundle id, e.g. `com.google.Chrome`.
    #[serde(default)]
    pub macos: Option<String>,
    /// Windows executable, e.g. `chrome.exe`.
    #[serde(default)]
    pub windows: Option<String>,
    /// Linux desktop entry id, e.g. `google-chrome`.
    #[serde(default)]
    pub linux: Option<String>,
    #[serde(default)]
    pub window_title: Option<String>,
}

impl AppEntry {
    pub fn identifier(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::MacOs => self.macos.as_deref(),
            Platform::Windows => self.windows.as_deref(),
            Platform::Linux => self.linux.as_deref(),
        }
    }

    fn matches(&self, raw: &str) -> bool {
        [&self.macos, &self.windows, &self.linux, &self.window_title]
            .into_iter()
            .flatten()
            .any(|id| id == raw)
    }
}

// (display name, macOS bundle id, Windows executable, Linux desktop id, window title)
const BUILTIN_APPS: &[(&str, Option<&str>, Option<&str>, Option<&str>, &str)] = &[
    ("Chrome", Some("com.google.Chrome"), Some("chrome.exe"), Some("google-chrome"), "Google Chrome"),
    ("Safari", Some("com.apple.Safari"), None, None, "Safari"),
    ("Edge", Some("com.microsoft.edgemac"), Some("msedge.exe"), Some("microsoft-edge"), "Microsoft Edge"),
    ("微信", Some("com.tencent.xinWeChat"), Some("WeChat.exe"), None, "微信"),
    ("飞书", Some("com.electron.lark"), Some("Lark.exe"), None, "飞书"),
    ("钉钉", Some("com.alibaba.DingTalkMac"), Some("Dingtalk.exe"), None, "钉钉"),
    ("QQ", Some("com.tencent.qq"), Some("QQ.exe"), None, "QQ"),
    ("VS Code", Some("com.microsoft.VSCode"), Some("Code.exe"), Some("code"), "Visual Studio Code"),
    ("Obsidian", Some("md.obsidian"), Some("Obsidian.exe"), Some("obsidian"), "Obsidian"),
];

/// Registry of launchable applications.
#[derive(Debug, Clone)]
pub struct AppRegistry {
    apps: BTreeMap<String, AppEntry>,
}

impl Default for AppRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AppRegistry {
    pub fn builtin() -> Self {
        let apps = BUILTIN_APPS
            .iter()
            .map(|&(name, macos, windows, linux, title)| {
                (
                    name.to_string(),
                    AppEntry {
                        macos: macos.map(String::from),
                        windows: windows.map(String::from),
                        linux: linux.map(String::from),
                        window_title: Some(title.to_string()),
                    },
                )
            })
            .collect();
        Self { apps }
    }

    /// Built-in apps with `extra` merged over them; an extra entry replaces a built-in
    /// entry of the same display name.
    pub fn with_extra(extra: &BTreeMap<String, AppEntry>) -> Self {
        let mut registry = Self::builtin();
        for (name, entry) in extra {
            registry.apps.insert(name.clone(), entry.clone());
        }
        registry
    }

    pub fn resolve(&self, display_name: &str, platform: Platform) -> Option<String> {
        self.apps
            .get(display_name.trim())
            .and_then(|entry| entry.identifier(platform))
            .map(String::from)
    }

    /// Reverse lookup: bundle id, executable, desktop id or window title to display name.
    pub fn display_name_for(&self, raw: &str) -> Option<String> {
        if self.apps.contains_key(raw) {
            return Some(raw.to_string());
        }
        self.apps
            .iter()
            .find(|(_, entry)| entry.matches(raw))
            .map(|(name, _)| name.clone())
    }

    pub fn list(&self) -> Vec<String> {
        self.apps.keys().cloned().collect()
    }
}
