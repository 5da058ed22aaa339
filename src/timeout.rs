use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use log::{debug, info};
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_FILE: &str = "auto_status_config.json";
pub const DEFAULT_TIMEOUT_MINUTES: i64 = 10;

#[derive(Debug, Error)]
pub enum TimeoutError {
    #[error("writing {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("encoding timeout config: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Debug)]
struct TimeoutFile {
    timeout: Option<i64>,
}

/// The plugin's idle timeout, persisted next to the plugin and cached in
/// memory for the check loop.
#[derive(Debug)]
pub struct TimeoutStore {
    path: PathBuf,
    cached: AtomicI64,
}

impl TimeoutStore {
    pub fn new(plugin_dir: &Path) -> Self {
        let path = plugin_dir.join(CONFIG_FILE);
        let store = TimeoutStore {
            path,
            cached: AtomicI64::new(DEFAULT_TIMEOUT_MINUTES),
        };
        store.refresh();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fresh read of the file. Never fails: anything wrong with the file
    /// yields the default.
    pub fn load(&self) -> i64 {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) => {
                debug!("Timeout config {} unreadable: {}", self.path.display(), err);
                return DEFAULT_TIMEOUT_MINUTES;
            }
        };
        match serde_json::from_str::<TimeoutFile>(&contents) {
            Ok(file) => file.timeout.unwrap_or(DEFAULT_TIMEOUT_MINUTES),
            Err(err) => {
                debug!("Timeout config {} malformed: {}", self.path.display(), err);
                DEFAULT_TIMEOUT_MINUTES
            }
        }
    }

    /// Overwrites the file. The cached value changes immediately, so a loop
    /// in this process sees it on its next tick without re-reading.
    pub fn save(&self, minutes: i64) -> Result<(), TimeoutError> {
        self.cached.store(minutes, Ordering::Relaxed);
        let body = serde_json::to_string(&TimeoutFile {
            timeout: Some(minutes),
        })?;
        std::fs::write(&self.path, body).map_err(|source| TimeoutError::Write {
            path: self.path.clone(),
            source,
        })?;
        info!("Timeout config saved: {} min", minutes);
        Ok(())
    }

    pub fn cached(&self) -> i64 {
        self.cached.load(Ordering::Relaxed)
    }

    /// Re-reads the file into the cache. Picks up edits made by another
    /// process, e.g. `auto-status set-timeout` run against a live host.
    pub fn refresh(&self) -> i64 {
        let minutes = self.load();
        let previous = self.cached.swap(minutes, Ordering::Relaxed);
        if previous != minutes {
            debug!("Timeout changed {} -> {} min", previous, minutes);
        }
        minutes
    }
}
