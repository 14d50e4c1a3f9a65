use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::mode::{self, Mode};
use crate::podcast;

const DEFAULT_ENV_PREFIX: &str = "PODQA";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ask: AskConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_podcast_id")]
    pub podcast_id: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            podcast_id: default_podcast_id(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    podcast::DEFAULT_BASE_URL.to_string()
}

fn default_podcast_id() -> String {
    "1".to_string()
}

fn default_user_agent() -> String {
    format!("podqa/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AskConfig {
    #[serde(default = "default_mode")]
    pub default_mode: Mode,
    #[serde(default = "mode::default_choices")]
    pub modes: Vec<Mode>,
}

impl Default for AskConfig {
    fn default() -> Self {
        Self {
            default_mode: default_mode(),
            modes: mode::default_choices(),
        }
    }
}

fn default_mode() -> Mode {
    Mode::default()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            file: default_log_file(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_log_file() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("podqa").join("podqa.log"))
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        // An explicitly named file has to exist.
        let from_file = read_config_file(path)?;
        cfg = merge_config(cfg, from_file);
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.server.base_url.trim().is_empty() {
        base.server.base_url = other.server.base_url;
    }
    if !other.server.podcast_id.trim().is_empty() {
        base.server.podcast_id = other.server.podcast_id;
    }
    if !other.server.user_agent.trim().is_empty() {
        base.server.user_agent = other.server.user_agent;
    }
    if !other.server.timeout.is_zero() {
        base.server.timeout = other.server.timeout;
    }

    if !other.ask.default_mode.as_str().is_empty() {
        base.ask.default_mode = other.ask.default_mode;
    }
    if !other.ask.modes.is_empty() {
        base.ask.modes = other.ask.modes;
    }

    if !other.logging.filter.trim().is_empty() {
        base.logging.filter = other.logging.filter;
    }
    base.logging.file = other.logging.file;

    base
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "server.base_url" => cfg.server.base_url = value,
        "server.podcast_id" => cfg.server.podcast_id = value,
        "server.user_agent" => cfg.server.user_agent = value,
        "server.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.server.timeout = duration;
            }
        }
        "ask.default_mode" => cfg.ask.default_mode = Mode::new(value),
        "ask.modes" => {
            let modes: Vec<Mode> = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Mode::new)
                .collect();
            if !modes.is_empty() {
                cfg.ask.modes = modes;
            }
        }
        "logging.filter" => cfg.logging.filter = value,
        "logging.file" => {
            cfg.logging.file = if value.trim().is_empty() || value == "off" {
                None
            } else {
                Some(PathBuf::from(value))
            };
        }
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("podqa").join("config.yaml"))
}
