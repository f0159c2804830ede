//! Reference `ConfigPersistence` adapter: debounced JSON-file storage.
//!
//! Grounded on the teacher's debounced-save idiom in `resource/mod.rs` and
//! `communication/mod.rs` (a single-shot re-armable timer, re-armed on every
//! mutation, with the defensive copy taken under the lock and the I/O done
//! outside it) and generalized here over a serializable `T` instead of being
//! hand-rolled per store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Notify;
use tracing::{debug, error, warn};

use crate::error::{CoreError, CoreResult};
use crate::interfaces::ConfigPersistence;

#[derive(Debug, Clone)]
pub struct PersistenceStatus {
    pub last_save_ok: bool,
    pub last_error: Option<String>,
    pub pending: bool,
}

impl Default for PersistenceStatus {
    fn default() -> Self {
        Self {
            last_save_ok: true,
            last_error: None,
            pending: false,
        }
    }
}

/// JSON-file-backed persistence with debounced writes. One instance guards
/// one file; the owning store calls `schedule_save` on every mutation and
/// `force_save` when it needs a synchronous flush.
pub struct JsonFilePersistence<T> {
    path: PathBuf,
    debounce: Duration,
    status: Arc<RwLock<PersistenceStatus>>,
    rearm: Arc<Notify>,
    _marker: std::marker::PhantomData<T>,
}

impl<T> Clone for JsonFilePersistence<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            debounce: self.debounce,
            status: self.status.clone(),
            rearm: self.rearm.clone(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T> JsonFilePersistence<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(path: impl Into<PathBuf>, debounce: Duration) -> Self {
        Self {
            path: path.into(),
            debounce,
            status: Arc::new(RwLock::new(PersistenceStatus::default())),
            rearm: Arc::new(Notify::new()),
            _marker: std::marker::PhantomData,
        }
    }

    fn write_sync(&self, value: &T) -> CoreResult<()> {
        let json = serde_json::to_string_pretty(value).map_err(|e| CoreError::PersistenceError {
            message: format!("serialize failed: {e}"),
        })?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| CoreError::PersistenceError {
                    message: format!("create_dir_all failed: {e}"),
                })?;
            }
        }
        std::fs::write(&self.path, json).map_err(|e| CoreError::PersistenceError {
            message: format!("write failed: {e}"),
        })
    }

    /// Spawns a debounced-save task: sleeps `debounce`, then writes
    /// `snapshot`, unless `schedule_save` is called again first (which
    /// notifies `rearm`, restarting this sleep).
    pub fn schedule_save(&self, snapshot: T) {
        let path = self.path.clone();
        let debounce = self.debounce;
        let status = self.status.clone();
        let rearm = self.rearm.clone();
        status.write().pending = true;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(debounce) => break,
                    _ = rearm.notified() => continue,
                }
            }
            let persistence = JsonFilePersistence::<T> {
                path,
                debounce,
                status: status.clone(),
                rearm,
                _marker: std::marker::PhantomData,
            };
            match persistence.write_sync(&snapshot) {
                Ok(()) => {
                    debug!(path = %persistence.path.display(), "debounced save completed");
                    let mut s = status.write();
                    s.last_save_ok = true;
                    s.last_error = None;
                    s.pending = false;
                }
                Err(e) => {
                    error!(path = %persistence.path.display(), error = %e, "debounced save failed");
                    let mut s = status.write();
                    s.last_save_ok = false;
                    s.last_error = Some(e.to_string());
                    s.pending = false;
                }
            }
        });
        self.rearm.notify_waiters();
    }

    pub fn status(&self) -> PersistenceStatus {
        self.status.read().clone()
    }
}

impl<T> ConfigPersistence<T> for JsonFilePersistence<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn load(&self) -> CoreResult<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path).map_err(|e| CoreError::PersistenceError {
            message: format!("read failed: {e}"),
        })?;
        if contents.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| CoreError::PersistenceError {
                message: format!("parse failed: {e}"),
            })
    }

    fn save(&self, value: &T) -> CoreResult<()> {
        self.write_sync(value)
    }

    fn force_save(&self, value: &T) -> CoreResult<()> {
        self.rearm.notify_waiters();
        match self.write_sync(value) {
            Ok(()) => {
                let mut s = self.status.write();
                s.last_save_ok = true;
                s.last_error = None;
                s.pending = false;
                Ok(())
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "force_save failed");
                let mut s = self.status.write();
                s.last_save_ok = false;
                s.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Blob {
        values: HashMap<String, u32>,
    }

    #[tokio::test]
    async fn force_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.json");
        let p: JsonFilePersistence<Blob> = JsonFilePersistence::new(&path, Duration::from_secs(5));

        let mut values = HashMap::new();
        values.insert("a".to_string(), 1);
        let blob = Blob { values };

        p.force_save(&blob).unwrap();
        let loaded = p.load().unwrap().unwrap();
        assert_eq!(loaded, blob);
        assert!(p.status().last_save_ok);
    }

    #[tokio::test]
    async fn load_missing_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let p: JsonFilePersistence<Blob> = JsonFilePersistence::new(&path, Duration::from_secs(5));
        assert!(p.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn schedule_save_debounces_and_eventually_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.json");
        let p: JsonFilePersistence<Blob> = JsonFilePersistence::new(&path, Duration::from_millis(20));

        let mut values = HashMap::new();
        values.insert("x".to_string(), 7);
        let blob = Blob { values };
        p.schedule_save(blob.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let loaded = p.load().unwrap().unwrap();
        assert_eq!(loaded, blob);
    }
}
