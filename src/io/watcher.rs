use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::event::{MetadataKind, ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::debug;

use crate::io::cache::TaskCache;
use crate::io::vault_io::vault_dirs;

/// Quiet period before a burst of changes turns into one refresh
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(200);
/// How long after our own write an event for that path is ignored
pub const SELF_WRITE_WINDOW: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    Modified,
    Removed,
    Renamed,
}

/// A change to one markdown file in the vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

/// Signals delivered to the session's foreground loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchSignal {
    /// A file changed on disk (already invalidated in the cache)
    Changed(PathBuf),
    /// The debounce window elapsed: re-evaluate once
    Refresh,
}

fn classify(kind: &EventKind) -> Option<FileEventKind> {
    match kind {
        EventKind::Create(_) => Some(FileEventKind::Created),
        EventKind::Remove(_) => Some(FileEventKind::Removed),
        // The From/To halves already name each path
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => None,
        EventKind::Modify(ModifyKind::Name(_)) => Some(FileEventKind::Renamed),
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime)) => {
            Some(FileEventKind::Modified)
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(FileEventKind::Modified),
        _ => None,
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("md"))
}

/// Watches every non-hidden directory of a vault.
///
/// Directories are registered once, at start; directories created later
/// are not watched.
pub struct VaultWatcher {
    watcher: Option<RecommendedWatcher>,
}

/// Receiving half of a [`VaultWatcher`].
pub struct WatchEvents {
    rx: mpsc::Receiver<FileEvent>,
}

impl VaultWatcher {
    pub fn start(root: &Path) -> Result<(VaultWatcher, WatchEvents), notify::Error> {
        let (tx, rx) = mpsc::channel();
        let root_owned = root.to_path_buf();

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                let event = match result {
                    Ok(e) => e,
                    Err(_) => return,
                };
                let Some(kind) = classify(&event.kind) else {
                    return;
                };
                for path in event.paths {
                    if path.starts_with(&root_owned) && is_markdown(&path) {
                        let _ = tx.send(FileEvent { path, kind });
                    }
                }
            },
            Config::default(),
        )?;

        for dir in vault_dirs(root) {
            watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        }

        Ok((
            VaultWatcher {
                watcher: Some(watcher),
            },
            WatchEvents { rx },
        ))
    }

    /// Stop watching. Pending and future `next_event` calls return `None`.
    pub fn close(&mut self) {
        self.watcher.take();
    }}

impl WatchEvents {
    /// Block until the next relevant event; `None` once the watcher is closed.
    pub fn next_event(&self) -> Option<FileEvent> {
        self.rx.recv().ok()
    }

    /// Like [`WatchEvents::next_event`] but gives up after `timeout`.
    pub fn next_event_timeout(&self, timeout: Duration) -> Result<FileEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

#[derive(Debug, Default)]
struct DebounceState {
    deadline: Option<Instant>,
    shutdown: bool,
}

/// Coalesces bursts of triggers into one [`WatchSignal::Refresh`].
///
/// Each `trigger` (re)arms a single deadline `window` from now; when it
/// passes without another trigger, exactly one signal is sent.
pub struct Debouncer {
    window: Duration,
    shared: Arc<(Mutex<DebounceState>, Condvar)>,
    timer: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(window: Duration, tx: Sender<WatchSignal>) -> Self {
        let shared = Arc::new((Mutex::new(DebounceState::default()), Condvar::new()));
        let timer_shared = Arc::clone(&shared);
        let timer = thread::spawn(move || run_timer(&timer_shared, &tx));
        Debouncer {
            window,
            shared,
            timer: Some(timer),
        }
    }

    pub fn trigger(&self) {
        let (lock, cvar) = &*self.shared;
        let mut state = lock.lock().unwrap_or_else(PoisonError::into_inner);
        state.deadline = Some(Instant::now() + self.window);
        cvar.notify_one();
    }}

fn run_timer(shared: &(Mutex<DebounceState>, Condvar), tx: &Sender<WatchSignal>) {
    let (lock, cvar) = shared;
    loop {
        let mut state = lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if state.shutdown {
                return;
            }
            match state.deadline {
                None => state = cvar.wait(state).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        state.deadline = None;
                        break;
                    }
                    state = cvar
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
        drop(state);

        debug!("debounce window elapsed");
        if tx.send(WatchSignal::Refresh).is_err() {
            return;
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        {
            let (lock, cvar) = &*self.shared;
            let mut state = lock.lock().unwrap_or_else(PoisonError::into_inner);
            state.shutdown = true;
            cvar.notify_one();
        }
        if let Some(timer) = self.timer.take() {
            let _ = timer.join();
        }
    }
}

/// Remembers our own writes so the watch events they cause are dropped.
///
/// Each recorded write covers one event for its path. Writes recorded
/// back to back stack up, and the window runs from the latest one.
#[derive(Debug)]
pub struct SelfWriteGuard {
    window: Duration,
    writes: Mutex<HashMap<PathBuf, (Instant, usize)>>,
}

impl Default for SelfWriteGuard {
    fn default() -> Self {
        Self::with_window(SELF_WRITE_WINDOW)
    }
}

impl SelfWriteGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window: Duration) -> Self {
        SelfWriteGuard {
            window,
            writes: Mutex::new(HashMap::new()),
        }
    }

    /// Call before writing `path`.
    pub fn record(&self, path: &Path) {
        let mut writes = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = writes.entry(path.to_path_buf()).or_insert((Instant::now(), 0));
        entry.0 = Instant::now();
        entry.1 += 1;
    }

    /// Drop the mark for a write that never happened.
    pub fn forget(&self, path: &Path) {
        let mut writes = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        release(&mut writes, path);
    }

    /// Whether an event for `path` was caused by our own recent write.
    /// Each recorded write is consumed by the first event that checks it.
    pub fn is_self_inflicted(&self, path: &Path) -> bool {
        let mut writes = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        match release(&mut writes, path) {
            Some(at) => at.elapsed() < self.window,
            None => false,
        }
    }
}

/// Take one pending write off `path`, returning when it was recorded.
fn release(writes: &mut HashMap<PathBuf, (Instant, usize)>, path: &Path) -> Option<Instant> {
    let (at, pending) = writes.get_mut(path)?;
    let at = *at;
    *pending -= 1;
    if *pending == 0 {
        writes.remove(path);
    }
    Some(at)
}

/// Run the watcher's reader loop on a background thread.
///
/// For every event not caused by our own writes, the path is evicted from
/// the cache, the debouncer is re-armed and a [`WatchSignal::Changed`] is
/// forwarded. The thread exits when the watcher is closed or `tx` hangs up.
pub fn spawn_listener(
    events: WatchEvents,
    cache: Arc<TaskCache>,
    debouncer: Arc<Debouncer>,
    guard: Arc<SelfWriteGuard>,
    tx: Sender<WatchSignal>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        while let Some(event) = events.next_event() {
            if guard.is_self_inflicted(&event.path) {
                debug!(path = %event.path.display(), "ignoring our own write");
                continue;
            }
            debug!(path = %event.path.display(), kind = ?event.kind, "file changed");
            cache.invalidate(&event.path);
            debouncer.trigger();
            if tx.send(WatchSignal::Changed(event.path)).is_err() {
                break;
            }
        }
    })
}
