use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

pub const LOG_ENV: &str = "PODQA_LOG";

/// Builds the event filter: `PODQA_LOG` wins over the configured directive.
pub fn filter(cfg: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(&cfg.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. The terminal belongs to the UI, so events
/// go to the configured file; without one, logging stays off.
pub fn init(cfg: &LoggingConfig) -> Result<Option<PathBuf>> {
    let Some(path) = cfg.file.clone() else {
        return Ok(None);
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("logging: failed to create directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("logging: failed to open {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter(cfg))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("logging: install subscriber: {err}"))?;

    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_without_file() {
        let cfg = LoggingConfig {
            filter: "debug".into(),
            file: None,
        };
        assert_eq!(init(&cfg).unwrap(), None);
    }

    #[test]
    fn bad_directive_falls_back() {
        let cfg = LoggingConfig {
            filter: "[[not a filter".into(),
            file: None,
        };
        let rendered = filter(&cfg).to_string();
        assert!(!rendered.is_empty());
    }
}
