//! # Download Trigger Module
//!
//! Questo modulo gestisce il salvataggio dei PNG convertiti ("download").
//!
//! ## Responsabilità:
//! - `HandleRegistry`: registra i buffer PNG e restituisce handle riutilizzabili
//! - `DownloadTrigger`: avvia il salvataggio in background (fire-and-forget)
//! - `SaveSink`: destinazione del salvataggio (directory su disco o memoria)
//!
//! ## Ownership degli handle:
//! - Sorgente `Bytes`: il trigger crea un handle proprio e lo rilascia dopo
//!   `release_delay`, il tempo necessario a far partire il salvataggio
//! - Sorgente `Handle`: l'handle appartiene al record (ri-download manuale),
//!   il trigger non lo rilascia mai
//!
//! ## Nomi file:
//! - Solo l'ultimo componente del nome viene usato (niente `../`)
//! - Se il file esiste già: `foto (1).png`, `foto (2).png`, ... come un browser
//! - Con `overwrite` il file esistente viene sostituito
//!
//! ## Esempio:
//! ```ignore
//! let sink = Arc::new(DirectorySink::new(output_dir, false));
//! let trigger = DownloadTrigger::new(sink, Duration::from_millis(100));
//! trigger.trigger(DownloadSource::Bytes(png.into()), "photo.png")?;
//! trigger.flush().await;
//! ```

use crate::converter::path_resolver::PathResolver;
use crate::error::{ConvertError, ConvertResult};
use futures::future::join_all;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Upper bound on `name (n).ext` candidates before giving up
const MAX_NAME_ATTEMPTS: usize = 10_000;

/// Reference to encoded bytes held by a `HandleRegistry`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadHandle {
    id: u64,
}

impl DownloadHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Live download handles and the bytes they reference
#[derive(Debug, Default)]
pub struct HandleRegistry {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, Arc<[u8]>>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<u64, Arc<[u8]>>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register bytes and return a handle to them
    pub fn create(&self, data: Arc<[u8]>) -> DownloadHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries().insert(id, data);
        DownloadHandle { id }
    }

    /// Get the bytes behind a handle that has not been released
    pub fn resolve(&self, handle: &DownloadHandle) -> ConvertResult<Arc<[u8]>> {
        self.entries()
            .get(&handle.id)
            .cloned()
            .ok_or(ConvertError::InvalidHandle(handle.id))
    }

    /// Release a handle. Returns false if it was already released.
    pub fn release(&self, handle: &DownloadHandle) -> bool {
        self.entries().remove(&handle.id).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.entries().len()
    }
}

/// Destination of a download
pub trait SaveSink: Send + Sync {
    /// Store `data` under `filename`, returning where it ended up
    fn save(&self, filename: &str, data: &[u8]) -> ConvertResult<PathBuf>;
}

/// Saves downloads into a directory on disk
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    overwrite: bool,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self {
            dir: dir.into(),
            overwrite,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SaveSink for DirectorySink {
    fn save(&self, filename: &str, data: &[u8]) -> ConvertResult<PathBuf> {
        let name = PathResolver::sanitize_filename(filename);

        if self.overwrite {
            let path = self.dir.join(&name);
            std::fs::write(&path, data)?;
            return Ok(path);
        }

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = self.dir.join(PathResolver::numbered_name(&name, attempt));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(data)?;
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("No free filename for {} in {}", name, self.dir.display()),
        )
        .into())
    }
}

/// A file stored by `MemorySink`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Keeps downloads in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    saved: Mutex<Vec<SavedFile>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved_files(&self) -> Vec<SavedFile> {
        self.saved.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl SaveSink for MemorySink {
    fn save(&self, filename: &str, data: &[u8]) -> ConvertResult<PathBuf> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SavedFile {
                filename: filename.to_string(),
                data: data.to_vec(),
            });
        Ok(PathBuf::from(filename))
    }
}

/// What to download
#[derive(Debug, Clone)]
pub enum DownloadSource {
    /// Raw bytes; the trigger owns the handle it creates for them
    Bytes(Arc<[u8]>),
    /// Handle owned by someone else; never released by the trigger
    Handle(DownloadHandle),
}

/// Dispatches saves in the background
pub struct DownloadTrigger {
    registry: Arc<HandleRegistry>,
    sink: Arc<dyn SaveSink>,
    release_delay: Duration,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl DownloadTrigger {
    pub fn new(sink: Arc<dyn SaveSink>, release_delay: Duration) -> Self {
        Self {
            registry: Arc::new(HandleRegistry::new()),
            sink,
            release_delay,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    fn pending_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start saving `source` as `filename` and return immediately.
    ///
    /// Fails with `Task` when called outside a tokio runtime; nothing is
    /// saved and a handle created for `Bytes` is released again.
    pub fn trigger(&self, source: DownloadSource, filename: &str) -> ConvertResult<()> {
        let (handle, owned) = match source {
            DownloadSource::Bytes(data) => (self.registry.create(data), true),
            DownloadSource::Handle(handle) => (handle, false),
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                if owned {
                    self.registry.release(&handle);
                }
                warn!("Download of {} not started: {}", filename, e);
                return Err(ConvertError::Task(e.to_string()));
            }
        };

        let data = match self.registry.resolve(&handle) {
            Ok(data) => data,
            Err(e) => {
                warn!("Download of {} skipped: {}", filename, e);
                return Ok(());
            }
        };

        let registry = Arc::clone(&self.registry);
        let sink = Arc::clone(&self.sink);
        let release_delay = self.release_delay;
        let filename = filename.to_string();
        debug!("Dispatching download of {} ({} bytes)", filename, data.len());

        let task = runtime.spawn(async move {
            let save_name = filename.clone();
            let save = tokio::task::spawn_blocking(move || sink.save(&save_name, &data));

            if owned {
                tokio::time::sleep(release_delay).await;
                registry.release(&handle);
                debug!("Released download handle {}", handle.id());
            }

            match save.await {
                Ok(Ok(path)) => info!("Saved {}", path.display()),
                Ok(Err(e)) => error!("Failed to save {}: {}", filename, e),
                Err(e) => error!("Save task for {} failed: {}", filename, e),
            }
        });

        let mut pending = self.pending_tasks();
        pending.retain(|task| !task.is_finished());
        pending.push(task);
        Ok(())
    }

    /// Downloads dispatched but not finished yet
    pub fn pending_count(&self) -> usize {
        let mut pending = self.pending_tasks();
        pending.retain(|task| !task.is_finished());
        pending.len()
    }

    /// Wait for every dispatched download to finish
    pub async fn flush(&self) {
        let tasks = std::mem::take(&mut *self.pending_tasks());
        for result in join_all(tasks).await {
            if let Err(e) = result {
                error!("Download task failed: {}", e);
            }
        }
    }
}
