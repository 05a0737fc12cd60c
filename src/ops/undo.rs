use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};

use crate::io::mutate;
use crate::io::vault_io::{read_task_at, VaultError};
use crate::model::task::{Priority, TaskRecord};

pub const UNDO_STACK_LIMIT: usize = 50;

/// What to do to reverse one mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoKind {
    /// A done toggle; undone by toggling again
    Toggle { was_done: bool },
    /// A deleted line, re-inserted at its old position
    Delete { raw: String },
    /// A priority change; undone by restoring `previous`
    PriorityChange { previous: Priority },
}

/// One reversible mutation, addressed by (path, line)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoEntry {
    pub kind: UndoKind,
    pub path: PathBuf,
    pub line: usize,
    pub timestamp: DateTime<Utc>,
}

impl UndoEntry {
    pub fn new(kind: UndoKind, path: &Path, line: usize) -> Self {
        UndoEntry {
            kind,
            path: path.to_path_buf(),
            line,
            timestamp: Utc::now(),
        }
    }

    pub fn toggle(record: &TaskRecord) -> Self {
        Self::new(
            UndoKind::Toggle {
                was_done: record.done,
            },
            &record.path,
            record.line,
        )
    }

    pub fn delete(record: &TaskRecord) -> Self {
        Self::new(
            UndoKind::Delete {
                raw: record.raw.clone(),
            },
            &record.path,
            record.line,
        )
    }

    pub fn priority_change(record: &TaskRecord) -> Self {
        Self::new(
            UndoKind::PriorityChange {
                previous: record.priority,
            },
            &record.path,
            record.line,
        )
    }
}

/// Bounded LIFO of undo entries. Pushing past the limit evicts the oldest.
#[derive(Debug, Clone, Default)]
pub struct UndoStack {
    entries: Vec<UndoEntry>,
}

impl UndoStack {
    pub fn new() -> Self {
        UndoStack {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: UndoEntry) {
        self.entries.push(entry);
        if self.entries.len() > UNDO_STACK_LIMIT {
            self.entries.drain(..self.entries.len() - UNDO_STACK_LIMIT);
        }
    }

    pub fn pop(&mut self) -> Option<UndoEntry> {
        self.entries.pop()
    }

    /// Drop every entry, and with them all toggle visibility
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a live toggle entry refers to (path, line). Other entry kinds
    /// do not count.
    pub fn is_recently_toggled(&self, path: &Path, line: usize) -> bool {
        self.entries.iter().any(|e| {
            matches!(e.kind, UndoKind::Toggle { .. }) && e.line == line && e.path == path
        })
    }
}

/// Reverse one entry on disk.
pub fn apply_undo(entry: &UndoEntry, today: NaiveDate) -> Result<(), VaultError> {
    match &entry.kind {
        UndoKind::Toggle { was_done } => {
            let record = read_task_at(&entry.path, entry.line)?;
            // Already back in its old state: someone else changed the line
            if record.done == *was_done {
                return Err(VaultError::UndoConflict {
                    path: entry.path.clone(),
                    line: entry.line,
                });
            }
            mutate::toggle(&record, today)?;
        }
        UndoKind::Delete { raw } => {
            mutate::restore_line(&entry.path, entry.line, raw)?;
        }
        UndoKind::PriorityChange { previous } => {
            let record = read_task_at(&entry.path, entry.line)?;
            mutate::set_priority(&record, *previous)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 14).unwrap()
    }

    fn entry(kind: UndoKind, line: usize) -> UndoEntry {
        UndoEntry::new(kind, Path::new("/vault/a.md"), line)
    }

    #[test]
    fn stack_limit_enforcement() {
        let mut stack = UndoStack::new();
        for i in 0..=UNDO_STACK_LIMIT {
            stack.push(entry(UndoKind::Toggle { was_done: false }, i + 1));
        }
        // After pushing 51 entries, the stack should be capped at 50
        assert_eq!(stack.len(), UNDO_STACK_LIMIT);
        // The oldest (line 1) was evicted
        assert!(!stack.is_recently_toggled(Path::new("/vault/a.md"), 1));
        assert!(stack.is_recently_toggled(Path::new("/vault/a.md"), 2));
        assert_eq!(stack.pop().unwrap().line, UNDO_STACK_LIMIT + 1);
    }

    #[test]
    fn pop_on_empty_is_none() {
        let mut stack = UndoStack::new();
        assert!(stack.pop().is_none());
        assert!(stack.is_empty());
    }

    #[test]
    fn only_toggles_count_as_recent() {
        let mut stack = UndoStack::new();
        let path = Path::new("/vault/a.md");
        stack.push(entry(UndoKind::Delete { raw: "- [ ] x".into() }, 3));
        stack.push(entry(
            UndoKind::PriorityChange {
                previous: Priority::High,
            },
            4,
        ));
        assert!(!stack.is_recently_toggled(path, 3));
        assert!(!stack.is_recently_toggled(path, 4));

        stack.push(entry(UndoKind::Toggle { was_done: false }, 5));
        assert!(stack.is_recently_toggled(path, 5));
        assert!(!stack.is_recently_toggled(Path::new("/vault/b.md"), 5));

        stack.clear();
        assert!(!stack.is_recently_toggled(path, 5));
    }

    #[test]
    fn undo_toggle_and_priority_on_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.md");
        fs::write(&path, "- [ ] task 🔼\n").unwrap();

        let rec = read_task_at(&path, 1).unwrap();
        let toggled = mutate::toggle(&rec, today()).unwrap();
        apply_undo(&UndoEntry::toggle(&rec), today()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "- [ ] task 🔼\n");

        let raised = mutate::set_priority(&toggled, Priority::Highest).unwrap();
        assert_eq!(raised.priority, Priority::Highest);
        apply_undo(&UndoEntry::priority_change(&rec), today()).unwrap();
        assert_eq!(read_task_at(&path, 1).unwrap().priority, Priority::Medium);
    }

    #[test]
    fn undo_toggle_refuses_a_line_changed_since() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.md");
        fs::write(&path, "- [ ] task\n").unwrap();

        let rec = read_task_at(&path, 1).unwrap();
        mutate::toggle(&rec, today()).unwrap();
        fs::write(&path, "- [ ] task\n").unwrap();

        let err = apply_undo(&UndoEntry::toggle(&rec), today()).unwrap_err();
        assert!(matches!(err, VaultError::UndoConflict { line: 1, .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "- [ ] task\n");
    }

    #[test]
    fn undo_delete_restores_line() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.md");
        let original = "- [ ] a\n- [ ] b\n- [ ] c\n";
        fs::write(&path, original).unwrap();

        let rec = read_task_at(&path, 2).unwrap();
        mutate::delete(&rec).unwrap();
        apply_undo(&UndoEntry::delete(&rec), today()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }
}
