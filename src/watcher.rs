//! Upload Directory Watcher
//!
//! Watches the documents directory and forwards new or changed PDFs to the
//! ingestion loop over a channel.

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::corpus::repository::is_pdf;

/// Quiet period before a burst of file events is reported.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Watcher error: {0}")]
    Notify(#[from] notify::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Serialize for WatcherError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Live watch on one directory. Dropping it stops the watch.
pub struct UploadWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    dir: PathBuf,
}

impl UploadWatcher {
    /// Watch `dir` (non-recursively) and send each changed PDF path to `tx`.
    pub fn start(dir: &Path, debounce: Duration, tx: UnboundedSender<PathBuf>) -> Result<Self, WatcherError> {
        std::fs::create_dir_all(dir)?;
        let dir = dir.canonicalize()?;

        let mut debouncer = new_debouncer(debounce, move |result: Result<Vec<DebouncedEvent>, notify::Error>| {
            match result {
                Ok(events) => {
                    for path in pdf_uploads(&events) {
                        debug!(path = %path.display(), "Upload detected");
                        if tx.send(path).is_err() {
                            warn!("Ingestion loop has stopped, dropping upload event");
                            return;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Watch error"),
            }
        })?;

        debouncer.watcher().watch(&dir, RecursiveMode::NonRecursive)?;
        info!(dir = %dir.display(), "Watching upload directory");

        Ok(Self {
            _debouncer: debouncer,
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Distinct existing PDF files named by a batch of events, in path order.
/// Deleted files are dropped.
pub fn pdf_uploads(events: &[DebouncedEvent]) -> Vec<PathBuf> {
    events
        .iter()
        .map(|e| &e.path)
        .filter(|p| is_pdf(p) && p.is_file())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
