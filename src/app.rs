use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{self, Config};
use crate::controller::{Controller, Services, UiState};
use crate::data::{PodcastAnswerService, PodcastCatalogService, PodcastDetailService};
use crate::logging;
use crate::mode::{Mode, ModeSelector};
use crate::podcast;
use crate::ui;

/// Command-line overrides, applied on top of file and environment config.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_file: Option<PathBuf>,
    pub base_url: Option<String>,
    pub podcast_id: Option<String>,
    pub mode: Option<String>,
}

pub fn run(options: RunOptions) -> Result<()> {
    let display_path = friendly_path(options.config_file.clone().or_else(config::default_path).as_ref());
    let cfg = load_config(&options)?;

    let log_file = logging::init(&cfg.logging)?;
    tracing::info!(
        version = crate::VERSION,
        base_url = %cfg.server.base_url,
        podcast = %cfg.server.podcast_id,
        log_file = ?log_file,
        "starting"
    );

    let client = podcast::Client::new(podcast::ClientConfig {
        base_url: cfg.server.base_url.clone(),
        user_agent: cfg.server.user_agent.clone(),
        timeout: cfg.server.timeout,
        http_client: None,
    })
    .context("create podcast client")?;
    let client = Arc::new(client);

    let services = Services {
        catalog: Arc::new(PodcastCatalogService::new(client.clone())),
        details: Arc::new(PodcastDetailService::new(client.clone())),
        answers: Arc::new(PodcastAnswerService::new(client)),
    };
    let modes = ModeSelector::new(cfg.ask.default_mode.clone(), cfg.ask.modes.clone());
    let state = UiState::new(cfg.server.podcast_id.clone(), modes);
    let controller = Controller::new(state, services);

    let mut model = ui::Model::new(
        controller,
        ui::Options {
            config_path: display_path,
        },
    );
    let result = model.run();
    if let Err(err) = &result {
        tracing::error!(error = ?err, "ui exited with error");
    } else {
        tracing::info!("exiting");
    }
    result
}

fn load_config(options: &RunOptions) -> Result<Config> {
    let mut cfg = config::load(config::LoadOptions {
        config_file: options.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;

    if let Some(base_url) = &options.base_url {
        cfg.server.base_url = base_url.clone();
    }
    if let Some(podcast_id) = &options.podcast_id {
        cfg.server.podcast_id = podcast_id.clone();
    }
    if let Some(mode) = &options.mode {
        cfg.ask.default_mode = Mode::new(mode.clone());
    }
    Ok(cfg)
}

fn friendly_path(path: Option<&PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/podqa/config.yaml".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_config_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "server:\n  podcast_id: \"7\"\nlogging:\n  file: null\n").unwrap();

        let cfg = load_config(&RunOptions {
            config_file: Some(path),
            base_url: Some("http://127.0.0.1:9999".into()),
            podcast_id: None,
            mode: Some("fulltext".into()),
        })
        .unwrap();
        assert_eq!(cfg.server.base_url, "http://127.0.0.1:9999");
        assert_eq!(cfg.server.podcast_id, "7");
        assert_eq!(cfg.ask.default_mode, Mode::new("fulltext"));
    }

    #[test]
    fn friendly_path_falls_back_to_default_location() {
        assert_eq!(friendly_path(None), "~/.config/podqa/config.yaml");
        let absolute = PathBuf::from("/etc/podqa.yaml");
        assert_eq!(friendly_path(Some(&absolute)), "/etc/podqa.yaml");
    }
}
