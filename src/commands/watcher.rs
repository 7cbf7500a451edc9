//! File watcher adapter for command manifests
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//!
//! Path-level change detection only; file contents are never inspected here.
//! The commands root is watched recursively and raw notify events are reduced
//! to [`FileEvent`]s, classified against the set of tracked paths.

use anyhow::Result;
use dashmap::DashSet;
use log::{debug, error, info, warn};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// File extensions treated as command modules
pub const COMMAND_EXTENSIONS: &[&str] = &["yaml", "yml"];

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Change notification for one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Added(PathBuf),
    Changed(PathBuf),
    Removed(PathBuf),
}

impl FileEvent {
    pub fn path(&self) -> &Path {
        match self {
            FileEvent::Added(p) | FileEvent::Changed(p) | FileEvent::Removed(p) => p,
        }
    }
}

/// Whether a path looks like a command manifest
pub fn is_command_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| COMMAND_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Canonical form used as the key everywhere paths are compared
pub fn normalize_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Reduce a raw notify event kind to a [`FileEvent`]
///
/// Rename-away events are ignored because editors commonly rename the old file
/// aside before writing the replacement; removal is only reported when the
/// path is really gone.
pub fn classify(kind: &EventKind, path: &Path, tracked: bool, exists: bool) -> Option<FileEvent> {
    if !is_command_file(path) {
        return None;
    }
    let path = path.to_path_buf();
    match kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            if tracked {
                Some(FileEvent::Changed(path))
            } else {
                Some(FileEvent::Added(path))
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => None,
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => {
            if tracked {
                Some(FileEvent::Changed(path))
            } else if exists {
                Some(FileEvent::Added(path))
            } else {
                None
            }
        }
        EventKind::Remove(_) if tracked && !exists => Some(FileEvent::Removed(path)),
        _ => None,
    }
}

/// Watches the commands root and reports changes for tracked manifests
pub struct CommandWatcher {
    watcher: Mutex<RecommendedWatcher>,
    tracked: Arc<DashSet<PathBuf>>,
    root: PathBuf,
}

impl CommandWatcher {
    /// Start watching `root`; events arrive on the returned receiver
    pub fn start(root: &Path) -> Result<(Self, mpsc::Receiver<FileEvent>)> {
        let root = normalize_path(root);
        let tracked: Arc<DashSet<PathBuf>> = Arc::new(DashSet::new());
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let callback_tracked = Arc::clone(&tracked);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!("Watch error: {e:?}");
                    return;
                }
            };
            for path in &event.paths {
                let tracked = callback_tracked.contains(path);
                if let Some(file_event) = classify(&event.kind, path, tracked, path.exists()) {
                    debug!("👀 {file_event:?}");
                    if let Err(e) = tx.blocking_send(file_event) {
                        error!("Failed to forward file event: {e}");
                    }
                }
            }
        })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;
        info!("👀 Watching {} for command changes", root.display());

        Ok((
            Self {
                watcher: Mutex::new(watcher),
                tracked,
                root,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Add a file to the watch set so future edits trigger a reload
    pub fn watch(&self, path: &Path) -> Result<()> {
        let path = normalize_path(path);
        if !path.starts_with(&self.root) {
            self.watcher
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .watch(&path, RecursiveMode::NonRecursive)?;
        }
        if self.tracked.insert(path.clone()) {
            debug!("Tracking {}", path.display());
        }
        Ok(())
    }

    pub fn unwatch(&self, path: &Path) {
        let path = normalize_path(path);
        if self.tracked.remove(&path).is_some() && !path.starts_with(&self.root) {
            if let Err(e) = self
                .watcher
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .unwatch(&path)
            {
                debug!("Unwatch {} failed: {e}", path.display());
            }
        }
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.tracked.contains(&normalize_path(path))
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }
}
