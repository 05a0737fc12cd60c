use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tracing::{debug, warn};

use crate::io::cache::TaskCache;
use crate::io::mutate;
use crate::io::vault_io::{self, VaultError};
use crate::io::watcher::{
    spawn_listener, Debouncer, SelfWriteGuard, VaultWatcher, WatchSignal, DEBOUNCE_WINDOW,
};
use crate::model::config::{EditorMode, QuerySource, ResolvedProfile};
use crate::model::query::Query;
use crate::model::section::Section;
use crate::model::task::{Priority, TaskRecord};
use crate::ops::eval::Evaluator;
use crate::ops::undo::{apply_undo, UndoEntry, UndoStack};
use crate::parse::parse_inline;

const DEFAULT_EDITOR: &str = "vi";

type Clock = Box<dyn Fn() -> NaiveDate + Send>;

/// A live watch: the OS watcher plus the channel its signals arrive on.
struct WatchHandle {
    watcher: VaultWatcher,
    signals: Receiver<WatchSignal>,
    _debouncer: Arc<Debouncer>,
    _listener: JoinHandle<()>,
}

/// The command line for opening a task in an external editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl EditorCommand {
    /// `$EDITOR +<line> <path>`, falling back to `vi`. Extra words in
    /// `$EDITOR` become leading arguments.
    pub fn for_record(editor: Option<&str>, record: &TaskRecord) -> Self {
        let editor = editor
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .unwrap_or(DEFAULT_EDITOR);
        let mut words = editor.split_whitespace().map(str::to_string);
        let program = words.next().unwrap_or_else(|| DEFAULT_EDITOR.to_string());
        let mut args: Vec<String> = words.collect();
        args.push(format!("+{}", record.line));
        args.push(record.path.display().to_string());
        EditorCommand { program, args }
    }

    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

/// Owns the view of one vault: compiled queries, the last evaluated
/// sections, the undo stack and, optionally, a live watch.
///
/// All mutations go through here, one at a time. Mutations do not refresh
/// by themselves; call [`Session::refresh`] (or react to
/// [`WatchSignal::Refresh`]) to rebuild the sections.
pub struct Session {
    vault: PathBuf,
    source: QuerySource,
    queries: Vec<Query>,
    editor: EditorMode,
    cache: Arc<TaskCache>,
    guard: Arc<SelfWriteGuard>,
    undo: UndoStack,
    sections: Vec<Section>,
    clock: Clock,
    watch: Option<WatchHandle>,
}

fn load_queries(source: &QuerySource) -> Result<Vec<Query>, VaultError> {
    match source {
        QuerySource::All => Ok(vec![Query::default()]),
        QuerySource::File(path) => vault_io::read_query_file(path),
        QuerySource::Inline(text) => Ok(vec![parse_inline(text)]),
    }
}

impl Session {
    /// Compile the queries; nothing is scanned until the first refresh.
    pub fn new(vault: PathBuf, source: QuerySource) -> Result<Self, VaultError> {
        if !vault.is_dir() {
            return Err(VaultError::NotADirectory(vault));
        }
        let queries = load_queries(&source)?;
        Ok(Session {
            vault,
            source,
            queries,
            editor: EditorMode::Inline,
            cache: Arc::new(TaskCache::new()),
            guard: Arc::new(SelfWriteGuard::new()),
            undo: UndoStack::new(),
            sections: Vec::new(),
            clock: Box::new(|| Local::now().date_naive()),
            watch: None,
        })
    }

    /// Open a resolved profile and evaluate it once.
    pub fn open(profile: &ResolvedProfile) -> Result<Self, VaultError> {
        let mut session = Session::new(profile.vault.clone(), profile.query.clone())?;
        session.editor = profile.editor;
        session.refresh()?;
        Ok(session)
    }

    /// Replace the source of "today" (used for done stamps and relative dates).
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDate + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn vault(&self) -> &Path {
        &self.vault
    }

    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo
    }

    pub fn editor_mode(&self) -> EditorMode {
        self.editor
    }

    pub fn cache(&self) -> &TaskCache {
        &self.cache
    }

    pub fn today(&self) -> NaiveDate {
        (self.clock)()
    }

    /// Rescan the vault (through the cache) and re-evaluate every query.
    /// A query file is re-read so edits to it take effect.
    pub fn refresh(&mut self) -> Result<&[Section], VaultError> {
        if matches!(self.source, QuerySource::File(_)) {
            self.queries = load_queries(&self.source)?;
        }
        let records = vault_io::load_vault(&self.vault, &self.cache)?;
        let today = self.today();
        self.sections = Evaluator::new(&self.vault, today)
            .with_undo(&self.undo)
            .evaluate_all(&records, &self.queries);
        debug!(
            records = records.len(),
            sections = self.sections.len(),
            "refreshed"
        );
        Ok(&self.sections)
    }

    /// Forget undo history (so toggled tasks stop being kept visible),
    /// then refresh.
    pub fn hard_refresh(&mut self) -> Result<&[Section], VaultError> {
        self.undo.clear();
        self.refresh()
    }

    /// The task currently at `line` of `path` (relative paths are inside the vault).
    pub fn task_at(&self, path: &Path, line: usize) -> Result<TaskRecord, VaultError> {
        vault_io::read_task_at(&self.resolve(path), line)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.vault.join(path)
        }
    }

    /// Run one write of ours to `path`. The self-write mark goes down
    /// before the file is touched so the watcher never sees the write
    /// unannounced.
    fn write_to<T>(
        &self,
        path: &Path,
        write: impl FnOnce() -> Result<T, VaultError>,
    ) -> Result<T, VaultError> {
        self.guard.record(path);
        let result = write();
        match &result {
            Ok(_) => self.cache.invalidate(path),
            Err(_) => self.guard.forget(path),
        }
        result
    }

    /// Push `entry`, run the write, and take the entry back off if it failed.
    fn undoable<T>(
        &mut self,
        entry: UndoEntry,
        write: impl FnOnce(NaiveDate) -> Result<T, VaultError>,
    ) -> Result<T, VaultError> {
        let path = entry.path.clone();
        let today = self.today();
        self.undo.push(entry);
        let result = self.write_to(&path, || write(today));
        if result.is_err() {
            self.undo.pop();
        }
        result
    }

    pub fn toggle(&mut self, record: &TaskRecord) -> Result<TaskRecord, VaultError> {
        self.undoable(UndoEntry::toggle(record), |today| {
            mutate::toggle(record, today)
        })
    }

    pub fn edit(&mut self, record: &TaskRecord, description: &str) -> Result<TaskRecord, VaultError> {
        self.write_to(&record.path, || mutate::edit(record, description))
    }

    /// Delete a task's line; undo puts it back at the same line number.
    pub fn delete(&mut self, record: &TaskRecord) -> Result<(), VaultError> {
        self.undoable(UndoEntry::delete(record), |_| mutate::delete(record))?;
        Ok(())
    }

    /// Add a new open task below `record`.
    pub fn add(&mut self, record: &TaskRecord, description: &str) -> Result<TaskRecord, VaultError> {
        self.write_to(&record.path, || mutate::insert_after(record, description))
    }

    /// Set a priority. Setting the priority a task already has writes
    /// nothing and records no undo entry.
    pub fn set_priority(
        &mut self,
        record: &TaskRecord,
        priority: Priority,
    ) -> Result<TaskRecord, VaultError> {
        if record.priority == priority {
            return Ok(record.clone());
        }
        self.undoable(UndoEntry::priority_change(record), |_| {
            mutate::set_priority(record, priority)
        })
    }

    /// One step towards Highest; a no-op at the top.
    pub fn cycle_priority_up(&mut self, record: &TaskRecord) -> Result<TaskRecord, VaultError> {
        self.set_priority(record, record.priority.raised())
    }

    /// One step towards Lowest; a no-op at the bottom.
    pub fn cycle_priority_down(&mut self, record: &TaskRecord) -> Result<TaskRecord, VaultError> {
        self.set_priority(record, record.priority.lowered())
    }

    /// Reverse the newest undo entry. Returns it, or `None` if there was
    /// nothing to undo. An entry whose undo failed on I/O stays on the
    /// stack for another try; one that no longer fits the file is dropped.
    pub fn undo(&mut self) -> Result<Option<UndoEntry>, VaultError> {
        let Some(entry) = self.undo.pop() else {
            return Ok(None);
        };
        let today = self.today();
        match self.write_to(&entry.path, || apply_undo(&entry, today)) {
            Ok(()) => Ok(Some(entry)),
            Err(e) => {
                if matches!(
                    e,
                    VaultError::ReadError { .. }
                        | VaultError::WriteError { .. }
                        | VaultError::IoError(_)
                ) {
                    self.undo.push(entry);
                }
                Err(e)
            }
        }
    }

    /// The editor invocation for `record`, using `$EDITOR`.
    pub fn editor_command(&self, record: &TaskRecord) -> EditorCommand {
        let editor = env::var("EDITOR").ok();
        EditorCommand::for_record(editor.as_deref(), record)
    }

    /// Call when the external editor exits. The vault is refreshed either
    /// way; an editor failure is reported after the refresh.
    pub fn editor_finished(
        &mut self,
        result: std::io::Result<()>,
    ) -> Result<&[Section], VaultError> {
        self.refresh()?;
        result?;
        Ok(&self.sections)
    }

    /// Start watching the vault. If the OS watcher cannot be created the
    /// session carries on without live updates and this returns `false`.
    pub fn start_watching(&mut self) -> bool {
        if self.watch.is_some() {
            return true;
        }
        let (watcher, events) = match VaultWatcher::start(&self.vault) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "file watching unavailable, continuing without live updates");
                return false;
            }
        };
        let (tx, signals) = mpsc::channel();
        let debouncer = Arc::new(Debouncer::new(DEBOUNCE_WINDOW, tx.clone()));
        let listener = spawn_listener(
            events,
            Arc::clone(&self.cache),
            Arc::clone(&debouncer),
            Arc::clone(&self.guard),
            tx,
        );
        self.watch = Some(WatchHandle {
            watcher,
            signals,
            _debouncer: debouncer,
            _listener: listener,
        });
        true
    }

    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    /// Stop the OS watch. The reader thread ends on its own.
    pub fn stop_watching(&mut self) {
        if let Some(mut handle) = self.watch.take() {
            handle.watcher.close();
        }
    }

    /// Wait up to `timeout` for the next watch signal. `None` on timeout or
    /// when not watching.
    pub fn next_signal(&self, timeout: Duration) -> Option<WatchSignal> {
        let handle = self.watch.as_ref()?;
        handle.signals.recv_timeout(timeout).ok()
    }

    /// React to a watch signal. Returns `true` if the sections were rebuilt.
    pub fn handle_signal(&mut self, signal: &WatchSignal) -> Result<bool, VaultError> {
        match signal {
            WatchSignal::Changed(path) => {
                debug!(path = %path.display(), "change noticed, waiting for quiet");
                Ok(false)
            }
            WatchSignal::Refresh => {
                self.refresh()?;
                Ok(true)
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_watching();
    }
}
