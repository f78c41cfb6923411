// crates/engine_core/src/hot_reload.rs
//! Watches installed modules on disk and reports which ones changed.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

/// Drops repeated notifications for the same path inside a time window.
///
/// A rebuild typically writes a module several times in a row; only the first
/// write of a burst is let through.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: HashMap::new(),
        }
    }

    pub fn accept(&mut self, path: &Path, now: Instant) -> bool {
        if let Some(last) = self.last.get(path) {
            if now.saturating_duration_since(*last) < self.window {
                return false;
            }
        }
        self.last.insert(path.to_path_buf(), now);
        true
    }
}

/// File watcher for plugin modules.
///
/// Watches the parent directory of every registered module; notifications
/// arrive on a background thread and are drained on the main thread.
pub struct HotReloader {
    watcher: RecommendedWatcher,
    changes: Receiver<PathBuf>,
    modules: HashMap<PathBuf, PathBuf>,
    directories: HashMap<PathBuf, usize>,
    debouncer: Debouncer,
}

impl HotReloader {
    pub fn new(debounce: Duration) -> notify::Result<Self> {
        let (sender, changes) = crossbeam_channel::unbounded();
        let watcher = notify::recommended_watcher(forward_changes(sender))?;

        Ok(Self {
            watcher,
            changes,
            modules: HashMap::new(),
            directories: HashMap::new(),
            debouncer: Debouncer::new(debounce),
        })
    }

    /// Starts reporting changes to `module`, which must be canonical.
    pub fn watch(&mut self, module: &Path) -> notify::Result<()> {
        if self.modules.contains_key(module) {
            return Ok(());
        }
        let Some(directory) = module.parent().map(Path::to_path_buf) else {
            return Ok(());
        };

        let watchers = self.directories.entry(directory.clone()).or_insert(0);
        if *watchers == 0 {
            self.watcher.watch(&directory, RecursiveMode::NonRecursive)?;
            debug!(directory = %directory.display(), "Watching plugin directory");
        }
        *watchers += 1;
        self.modules.insert(module.to_path_buf(), directory);
        Ok(())
    }

    /// Stops reporting changes to `module`. Its debounce stamp is kept, so a
    /// reload (unwatch + watch) does not reopen the window mid-burst.
    pub fn unwatch(&mut self, module: &Path) {
        let Some(directory) = self.modules.remove(module) else {
            return;
        };

        let Some(watchers) = self.directories.get_mut(&directory) else {
            return;
        };
        *watchers -= 1;
        if *watchers == 0 {
            self.directories.remove(&directory);
            if let Err(err) = self.watcher.unwatch(&directory) {
                warn!(directory = %directory.display(), error = %err, "Failed to stop watching");
            }
        }
    }

    pub fn is_watching(&self, module: &Path) -> bool {
        self.modules.contains_key(module)
    }

    /// Watched modules that changed since the last call, once each.
    pub fn drain(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut changed: Vec<PathBuf> = Vec::new();
        for path in self.changes.try_iter() {
            let path = fs::canonicalize(&path).unwrap_or(path);
            if !self.modules.contains_key(&path) || changed.contains(&path) {
                continue;
            }
            if self.debouncer.accept(&path, now) {
                changed.push(path);
            }
        }
        changed
    }
}

fn forward_changes(sender: Sender<PathBuf>) -> impl Fn(notify::Result<notify::Event>) {
    move |result| match result {
        Ok(event) => {
            if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                for path in event.paths {
                    let _ = sender.send(path);
                }
            }
        }
        Err(err) => warn!(error = %err, "Plugin file watcher error"),
    }
}
