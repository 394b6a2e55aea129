//! Watches `.beads/issues.jsonl` and republishes the snapshot on change.
//!
//! Filesystem events only arm a single-slot [`Notify`] permit; one worker
//! task drains it, so at most one reparse runs at a time and at most one is
//! pending behind it. Start-up goes through the same path by arming the
//! permit before the worker's first wait.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{Mutex, Notify, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::hub::BroadcastHub;
use super::snapshot::load_issues;
use crate::errors::{SnapshotError, WatcherError};

pub const BEADS_DIR: &str = ".beads";
pub const ISSUES_FILE: &str = "issues.jsonl";

/// Location of the watched log inside a workspace.
pub fn issues_path(workspace: &Path) -> PathBuf {
    workspace.join(BEADS_DIR).join(ISSUES_FILE)
}

struct Running {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub struct LogWatcher {
    log_path: PathBuf,
    hub: BroadcastHub,
    running: Mutex<Option<Running>>,
}

impl LogWatcher {
    pub fn new(workspace: &Path, hub: BroadcastHub) -> Self {
        Self {
            log_path: issues_path(workspace),
            hub,
            running: Mutex::new(None),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Subscribe to filesystem events and load the initial snapshot.
    /// Calling this while already running does nothing.
    pub async fn start(&self) -> Result<(), WatcherError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!(path = %self.log_path.display(), "watcher already running");
            return Ok(());
        }

        let pending = Arc::new(Notify::new());
        let subscription = Subscription::new(&self.log_path, pending.clone())?;
        // Process start counts as an "add" event.
        pending.notify_one();

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(reload_loop(
            subscription,
            pending,
            shutdown_rx,
            self.log_path.clone(),
            self.hub.clone(),
        ));

        info!(path = %self.log_path.display(), "Watching issues log");
        *running = Some(Running { shutdown, task });
        Ok(())
    }

    /// Release the filesystem subscription. Returns once the worker has
    /// exited. Safe to call when not started, or more than once.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        let _ = running.shutdown.send(());
        if let Err(e) = running.task.await {
            error!(error = %e, "watcher task failed");
        }
        info!("Watcher stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

async fn reload_loop(
    mut subscription: Subscription,
    pending: Arc<Notify>,
    mut shutdown: oneshot::Receiver<()>,
    log_path: PathBuf,
    hub: BroadcastHub,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = pending.notified() => {
                subscription.sync();
                let _ = reload_once(&log_path, &hub).await;
            }
        }
    }
    // Dropping the watcher removes the OS-level watches.
    drop(subscription);
}

/// Reparse the log and publish the result.
///
/// On failure the cached snapshot is left untouched and nothing is
/// broadcast.
pub async fn reload_once(log_path: &Path, hub: &BroadcastHub) -> Result<usize, SnapshotError> {
    match load_issues(log_path).await {
        Ok(issues) => {
            let count = issues.len();
            let clients = hub.publish_snapshot(Arc::new(issues));
            info!(path = %log_path.display(), issues = count, clients, "Issues reloaded");
            Ok(count)
        }
        Err(e) => {
            error!(path = %log_path.display(), error = %e, "Failed to reload issues, keeping previous snapshot");
            Err(e)
        }
    }
}

// ── Filesystem subscription ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Watching `.beads` itself.
    LogDir,
    /// `.beads` is missing; watching the workspace until it appears.
    Workspace,
}

struct Subscription {
    watcher: RecommendedWatcher,
    log_dir: PathBuf,
    workspace: PathBuf,
    scope: Scope,
}

impl Subscription {
    fn new(log_path: &Path, pending: Arc<Notify>) -> Result<Self, WatcherError> {
        let log_dir = log_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let workspace = log_dir.parent().unwrap_or(Path::new(".")).to_path_buf();

        let mut names = Vec::new();
        if let Some(name) = log_path.file_name() {
            names.push(name.to_os_string());
        }
        if let Some(name) = log_dir.file_name() {
            names.push(name.to_os_string());
        }

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if is_relevant(&event, &names) {
                        pending.notify_one();
                    }
                }
                Err(e) => error!(error = %e, "Watcher error"),
            },
            notify::Config::default(),
        )
        .map_err(WatcherError::Init)?;

        let scope = if log_dir.is_dir() {
            watch(&mut watcher, &log_dir)?;
            Scope::LogDir
        } else if workspace.is_dir() {
            warn!(
                dir = %log_dir.display(),
                "No .beads directory yet, watching the workspace until it appears"
            );
            watch(&mut watcher, &workspace)?;
            Scope::Workspace
        } else {
            return Err(WatcherError::MissingWorkspace { path: log_dir });
        };

        Ok(Self {
            watcher,
            log_dir,
            workspace,
            scope,
        })
    }

    /// Move the watch between the workspace and `.beads` as the directory
    /// appears or disappears.
    fn sync(&mut self) {
        let dir_exists = self.log_dir.is_dir();
        match (self.scope, dir_exists) {
            (Scope::Workspace, true) => match watch(&mut self.watcher, &self.log_dir) {
                Ok(()) => {
                    let _ = self.watcher.unwatch(&self.workspace);
                    self.scope = Scope::LogDir;
                    info!(dir = %self.log_dir.display(), "Now watching .beads directory");
                }
                Err(e) => warn!(error = %e, "Failed to move watch onto .beads"),
            },
            (Scope::LogDir, false) => {
                let _ = self.watcher.unwatch(&self.log_dir);
                match watch(&mut self.watcher, &self.workspace) {
                    Ok(()) => {
                        self.scope = Scope::Workspace;
                        warn!(dir = %self.log_dir.display(), ".beads directory removed");
                    }
                    Err(e) => warn!(error = %e, "Failed to fall back to workspace watch"),
                }
            }
            _ => {}
        }
    }
}

fn watch(watcher: &mut RecommendedWatcher, path: &Path) -> Result<(), WatcherError> {
    watcher
        .watch(path, RecursiveMode::NonRecursive)
        .map_err(|source| WatcherError::Watch {
            path: path.to_path_buf(),
            source,
        })
}

/// Create, modify (including renames) and remove events that touch the log
/// file or its directory.
fn is_relevant(event: &Event, names: &[std::ffi::OsString]) -> bool {
    let kind_matches = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    kind_matches
        && event.paths.iter().any(|p| {
            p.file_name()
                .is_some_and(|name| names.iter().any(|n| n.as_os_str() == name))
        })
}
