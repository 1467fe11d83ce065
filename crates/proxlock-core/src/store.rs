//! JSON configuration store with change watching.
//!
//! Configuration lives in a single JSON file (by default
//! `~/.config/proxlock/config.json`). The watcher polls the file contents and
//! pushes a whole new [`AppConfig`] value into the engine channel on every
//! external edit; the engine treats each notification as authoritative. An
//! unparseable or invalid file is logged and ignored, so a half-saved edit
//! never tears down a running engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{ProxlockError, Result};
use crate::types::EngineEvent;

/// How often the watcher re-reads the file.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Reads and writes the persisted [`AppConfig`].
#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    /// Store backed by the given file path.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The platform default path, `<config dir>/proxlock/config.json`.
    ///
    /// # Errors
    ///
    /// Returns [`ProxlockError::ConfigDirUnavailable`] if no home directory
    /// can be determined.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "proxlock")
            .ok_or(ProxlockError::ConfigDirUnavailable)?;
        Ok(dirs.config_dir().join("config.json"))
    }

    /// The file this store reads and writes.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the configuration, or create the file with defaults if missing.
    ///
    /// # Errors
    ///
    /// Fails on unreadable, unparseable, or invalid configuration; a broken
    /// file is an error the user must fix, not something to silently replace.
    pub fn load_or_create(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            let config = AppConfig::default();
            self.save(&config)?;
            info!(path = %self.path.display(), "created default configuration");
            return Ok(config);
        }
        let config = self.load()?;
        config.validate()?;
        Ok(config)
    }

    /// Load and parse the file as-is.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing, unreadable, or not valid JSON.
    pub fn load(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            return Err(ProxlockError::ConfigNotFound(self.path.clone()));
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the configuration, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors.
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.path, content)?;
        info!(path = %self.path.display(), "configuration saved");
        Ok(())
    }

    /// Start watching the file for external edits.
    ///
    /// Compares file contents rather than mtime so that editors with coarse
    /// timestamp granularity are still detected. Valid new configurations are
    /// sent as [`EngineEvent::ConfigChanged`]; invalid ones are logged and
    /// dropped. Watching stops when the returned [`StoreWatcher`] is dropped.
    #[must_use]
    pub fn watch(&self, events: mpsc::UnboundedSender<EngineEvent>) -> StoreWatcher {
        self.watch_with_interval(events, DEFAULT_POLL_INTERVAL)
    }

    /// [`watch`](Self::watch) with a custom poll interval.
    #[must_use]
    pub fn watch_with_interval(
        &self,
        events: mpsc::UnboundedSender<EngineEvent>,
        poll_interval: Duration,
    ) -> StoreWatcher {
        let store = self.clone();
        let mut last_seen = std::fs::read_to_string(&store.path).ok();
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll_interval).await;
                let current = std::fs::read_to_string(&store.path).ok();
                if current == last_seen {
                    continue;
                }
                last_seen = current;

                match store.load().and_then(|config| {
                    config.validate()?;
                    Ok(config)
                }) {
                    Ok(config) => {
                        info!(path = %store.path.display(), "configuration changed, reloading");
                        if events.send(EngineEvent::ConfigChanged(config)).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(%err, "ignoring configuration change");
                    }
                }
            }
        });
        StoreWatcher { task }
    }
}

/// Handle for a running configuration watcher; dropping it stops the watch.
#[derive(Debug)]
pub struct StoreWatcher {
    task: JoinHandle<()>,
}

impl Drop for StoreWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}
