//! Config file watcher for the `stream` command's hot reload.
//!
//! notify delivers events on its own thread; `ConfigWatcher` forwards the
//! ones that concern the config file over an mpsc channel so the caller can
//! poll between messages without blocking.

use std::path::{Path, PathBuf};
use std::sync::mpsc;

use anyhow::{Context, Result};
use log::{debug, trace};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

pub struct ConfigWatcher {
    path: PathBuf,
    rx: mpsc::Receiver<()>,
    _watcher: RecommendedWatcher, // Drop stops watching
}

impl ConfigWatcher {
    /// Watch `path` for modification, creation and replacement.
    ///
    /// Editors save by writing a temp file and renaming it over the original,
    /// which drops an inotify watch on the file itself, so the parent
    /// directory is watched instead and events are filtered by file name.
    /// The file does not need to exist yet.
    pub fn new(path: &Path) -> Result<Self> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("cannot watch {}: no file name", path.display()))?
            .to_os_string();
        let (tx, rx) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                let Ok(event) = res else {
                    return;
                };
                let relevant = matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                );
                let ours = event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(file_name.as_os_str()));
                if relevant && ours {
                    trace!("watch: {:?} on {:?}", event.kind, event.paths);
                    let _ = tx.send(());
                }
            },
            notify::Config::default(),
        )?;
        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", parent.display()))?;
        debug!("watch: watching {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            rx,
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return true if the file has changed since the last check (non-blocking).
    /// A burst of events from one save collapses into a single true.
    pub fn has_changed(&self) -> bool {
        let mut changed = false;
        while self.rx.try_recv().is_ok() {
            changed = true;
        }
        changed
    }
}
