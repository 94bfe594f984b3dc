//! Component C: History Writer.
//!
//! One append-only log file per `(server, room-or-peer)` pair, opened
//! lazily, drained non-blockingly through the same [`crate::task_queue`]
//! used for stdout and the socket, and pruned once idle. Grounded on a
//! lazy-open-and-latch-on-failure shape for per-stream bookkeeping,
//! generalized from one socket to many files keyed by path.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::time::Instant;

use chrono::Local;
use tracing::{debug, warn};

use crate::task_queue::{DrainOutcome, OutputTask, TaskQueue};

/// Message kind recorded in a history line: `Room` for open-group chat,
/// `Private` for directed messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    Room,
    Private,
}

impl HistoryKind {
    fn prefix(self) -> &'static str {
        match self {
            HistoryKind::Room => "room-",
            HistoryKind::Private => "private-",
        }
    }
}

/// One lazily-opened log file and its pending writes.
struct Entry {
    path: PathBuf,
    file: Option<std::fs::File>,
    queue: TaskQueue,
    last_activity: Instant,
    permanent_error: bool,
}

impl Entry {
    fn new(path: PathBuf) -> Self {
        Self { path, file: None, queue: TaskQueue::new(), last_activity: Instant::now(), permanent_error: false }
    }

    fn ensure_open(&mut self) -> io::Result<&mut std::fs::File> {
        if self.file.is_none() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o777));
                }
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(&self.path)?;
            self.file = Some(file);
        }
        Ok(self.file.as_mut().expect("just set"))
    }

    fn drain(&mut self) {
        if self.permanent_error || self.queue.is_empty() {
            return;
        }
        let file = match self.ensure_open() {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "history: open failed, dropping queue");
                self.permanent_error = true;
                self.queue = TaskQueue::new();
                return;
            }
        };
        match self.queue.drain(file) {
            DrainOutcome::Drained | DrainOutcome::WouldBlock => {
                self.last_activity = Instant::now();
            }
            DrainOutcome::Failed(e) => {
                warn!(path = %self.path.display(), error = %e, "history: write failed, dropping queue");
                self.permanent_error = true;
                self.file = None;
                self.queue = TaskQueue::new();
            }
        }
    }

    /// An entry is idle once its queue has drained and no activity has
    /// touched it since `now` was captured at the start of this loop
    /// iteration — it is pruned the very next time `drain_and_prune` runs.
    fn idle(&self, now: Instant) -> bool {
        self.queue.is_empty() && self.last_activity < now
    }
}

/// Registry of per-file history entries, keyed by path.
pub struct HistoryWriter {
    enabled: bool,
    server: String,
    entries: HashMap<PathBuf, Entry>,
}

impl HistoryWriter {
    pub fn new(server: impl Into<String>, enabled: bool) -> Self {
        Self { enabled, server: server.into(), entries: HashMap::new() }
    }

    fn path_for(&self, kind: HistoryKind, who: &str, room: &str) -> Option<PathBuf> {
        let who = if kind == HistoryKind::Room { room } else { who };
        let dir = oicb_utils::paths::logs_dir(&self.server)?;
        Some(dir.join(format!("{}{}.log", kind.prefix(), who)))
    }

    /// Queue one history line. A no-op when history logging is disabled or
    /// `HOME` can't be resolved.
    pub fn append(&mut self, kind: HistoryKind, who: &str, room: &str, text: &str) {
        if !self.enabled {
            return;
        }
        let Some(path) = self.path_for(kind, who, room) else {
            debug!("history: no HOME, dropping entry");
            return;
        };
        let line = format!("{} {}: {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"), who, text);
        let entry = self.entries.entry(path.clone()).or_insert_with(|| Entry::new(path));
        if entry.permanent_error {
            return;
        }
        entry.queue.enqueue(OutputTask::new(line.into_bytes()));
    }

    /// Drain every pending entry and prune ones that have gone idle.
    pub fn drain_and_prune(&mut self) {
        let now = Instant::now();
        for entry in self.entries.values_mut() {
            entry.drain();
        }
        self.entries.retain(|_, e| !e.idle(now));
    }

    /// Raw fds of entries with pending writes, for registration with the
    /// poll set.
    pub fn writable_fds(&self) -> Vec<(PathBuf, i32)> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.queue.is_empty() && !e.permanent_error)
            .filter_map(|(p, e)| e.file.as_ref().map(|f| (p.clone(), f.as_raw_fd())))
            .collect()
    }
}
