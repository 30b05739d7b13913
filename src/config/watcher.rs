//! Configuration file watcher for hot reload.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::loader::load_config;
use crate::config::schema::ClientConfig;
use crate::config::store::ConfigStore;
use crate::load_balancer::StaticServerDirectory;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ClientConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ClientConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file. Keep the returned watcher alive for as long as reloads are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!(path = ?path, "Config file change detected, reloading");
                        match load_config(&path) {
                            Ok(new_config) => {
                                let _ = tx.send(new_config);
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                            }
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Apply every received configuration to the store, the directory and its stats registry.
///
/// The task ends when the sending side (the watcher) is dropped.
pub fn spawn_reload_task(
    mut updates: mpsc::UnboundedReceiver<ClientConfig>,
    store: Arc<ConfigStore>,
    directory: Arc<StaticServerDirectory>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(config) = updates.recv().await {
            directory.stats().reload_circuit(config.circuit_breaker.clone());
            directory.update_servers(&config);
            store.reload(config);
        }
        tracing::debug!("Config reload task finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::load_balancer::ServerDirectory;
    use crate::stats::ServerStatsRegistry;

    #[tokio::test]
    async fn test_reload_task_updates_store_and_directory() {
        let store = Arc::new(ConfigStore::default());
        let directory = Arc::new(StaticServerDirectory::new(Arc::new(ServerStatsRegistry::default())));
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_reload_task(rx, store.clone(), directory.clone());

        let mut config = ClientConfig::default();
        config.defaults.max_retries_same_server = 2;
        config.circuit_breaker.max_tripped_timeout_secs = 120;
        config.services.insert(
            "users".into(),
            ServiceConfig {
                servers: vec!["127.0.0.1:9001".into()],
                ..Default::default()
            },
        );
        tx.send(config).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(store.settings_for("users").budget.max_retries_same_server, 2);
        assert_eq!(directory.all_servers("users").await.len(), 1);
        assert_eq!(directory.stats().circuit_config().max_tripped_timeout_secs, 120);
    }

    #[tokio::test]
    async fn test_watcher_picks_up_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lb.toml");
        std::fs::write(&path, "[defaults]\nmax_retries_next_server = 1\n").unwrap();

        let (watcher, mut rx) = ConfigWatcher::new(&path);
        let _guard = watcher.run().unwrap();

        // Invalid content is ignored, the following valid write is delivered.
        std::fs::write(&path, "[defaults]\nconnect_timeout_ms = 0\n").unwrap();
        std::fs::write(&path, "[defaults]\nmax_retries_next_server = 3\n").unwrap();

        let config = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                match rx.recv().await {
                    Some(c) if c.defaults.max_retries_next_server == 3 => return c,
                    Some(_) => continue,
                    None => panic!("watcher channel closed"),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(config.defaults.max_retries_next_server, 3);
    }
}
