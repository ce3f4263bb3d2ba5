//! Project file watcher.
//!
//! Produces [`ChangeEvent`]s for the rebuild loop. Events for ignored paths
//! (version control, dependencies, the builder cache) are dropped here so
//! they never trigger a rebuild.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::build::files::{to_key, IgnoreList};
use crate::config::schema::WatcherConfig;

/// Pending events beyond this are dropped; the loop rebuilds anyway.
const EVENT_BUFFER: usize = 64;

/// Paths touched by one file system event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub paths: Vec<PathBuf>,
}

/// A watcher over the project directory.
pub struct ProjectWatcher {
    root: PathBuf,
    ignore: IgnoreList,
    poll_interval: Duration,
}

impl ProjectWatcher {
    pub fn new(root: &Path, ignore: IgnoreList, config: &WatcherConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            ignore,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
        }
    }

    /// Channel sized for the watcher's event buffer.
    pub fn channel() -> (mpsc::Sender<ChangeEvent>, mpsc::Receiver<ChangeEvent>) {
        mpsc::channel(EVENT_BUFFER)
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self, tx: mpsc::Sender<ChangeEvent>) -> Result<RecommendedWatcher, notify::Error> {
        let root = self.root.clone();
        let ignore = self.ignore.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if let Some(change) = relevant_change(&root, &ignore, event) {
                        tracing::debug!(paths = ?change.paths, "Project file changed");
                        if tx.try_send(change).is_err() {
                            tracing::trace!("Change event dropped, rebuild already pending");
                        }
                    }
                }
                Err(e) => tracing::error!(error = %e, "Watch error"),
            },
            Config::default().with_poll_interval(self.poll_interval),
        )?;

        watcher.watch(&self.root, RecursiveMode::Recursive)?;

        tracing::info!(path = %self.root.display(), "Watching project for changes");
        Ok(watcher)
    }
}

/// Keep content changes to non-ignored paths.
fn relevant_change(root: &Path, ignore: &IgnoreList, event: Event) -> Option<ChangeEvent> {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return None;
    }

    let paths: Vec<PathBuf> = event
        .paths
        .into_iter()
        .filter(|path| match path.strip_prefix(root) {
            Ok(rel) => !ignore.ignores(&to_key(rel), path.is_dir()),
            Err(_) => false,
        })
        .collect();

    if paths.is_empty() {
        None
    } else {
        Some(ChangeEvent { paths })
    }
}
