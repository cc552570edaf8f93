//! Configuration file watcher for hot reload.
//!
//! Editors tend to fire several modify events per save, so a reload is only
//! published when the file content actually changed and the new content
//! validates. Invalid edits are logged and the running configuration stays.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{load_config_str, ConfigError};
use crate::config::schema::ServiceConfig;

/// Monitors the configuration file and publishes validated reloads.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ServiceConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ServiceConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let mut reloader = Reloader::new(&self.path);
        let tx = self.update_tx;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match reloader.reload() {
                        Ok(Some(config)) => {
                            tracing::info!(path = ?reloader.path, "Configuration file changed, publishing reload");
                            let _ = tx.send(config);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "Rejected configuration reload, keeping current configuration");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Re-reads the file and remembers the last content it published.
struct Reloader {
    path: PathBuf,
    last_content: Option<String>,
}

impl Reloader {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            last_content: std::fs::read_to_string(path).ok(),
        }
    }

    /// `Ok(None)` when the content is unchanged since the last publish.
    fn reload(&mut self) -> Result<Option<ServiceConfig>, ConfigError> {
        let content = std::fs::read_to_string(&self.path)?;
        if self.last_content.as_deref() == Some(content.as_str()) {
            return Ok(None);
        }

        let config = load_config_str(&content)?;
        self.last_content = Some(content);
        Ok(Some(config))
    }
}
