use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tempfile::NamedTempFile;

use crate::io::vault_io::VaultError;
use crate::model::task::{Priority, TaskRecord};
use crate::parse::task_parser::{
    split_checkbox, strip_done_stamps, strip_priority_glyphs, CheckboxLine, DONE_GLYPH,
};
use crate::parse::parse_task_line;

/// Write `content` to `path` via a temp file in the same directory and a
/// rename. The original file's permissions carry over.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    if let Ok(meta) = fs::metadata(path) {
        tmp.as_file().set_permissions(meta.permissions())?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// A file held as physical lines. Line endings other than the final one are
/// kept inside each line (a trailing `\r` stays with its line).
struct FileLines {
    path: PathBuf,
    lines: Vec<String>,
    trailing_newline: bool,
}

impl FileLines {
    fn read(path: &Path) -> Result<Self, VaultError> {
        let content = fs::read_to_string(path).map_err(|e| VaultError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let trailing_newline = content.ends_with('\n');
        let body = content.strip_suffix('\n').unwrap_or(&content);
        let lines = if body.is_empty() && content.len() <= 1 {
            Vec::new()
        } else {
            body.split('\n').map(str::to_string).collect()
        };
        Ok(FileLines {
            path: path.to_path_buf(),
            lines,
            trailing_newline,
        })
    }

    fn write(&self) -> Result<(), VaultError> {
        let mut out = self.lines.join("\n");
        if self.trailing_newline {
            out.push('\n');
        }
        atomic_write(&self.path, out.as_bytes()).map_err(|e| VaultError::WriteError {
            path: self.path.clone(),
            source: e,
        })
    }

    /// 0-based index of 1-indexed `line`
    fn index(&self, line: usize) -> Result<usize, VaultError> {
        if line == 0 || line > self.lines.len() {
            return Err(VaultError::LineOutOfRange {
                path: self.path.clone(),
                line,
            });
        }
        Ok(line - 1)
    }

    /// The checkbox at `line`, with the line's `\r` if it has one.
    fn checkbox(&self, line: usize) -> Result<(usize, CheckboxLine<'_>, &str), VaultError> {
        let idx = self.index(line)?;
        let (body, cr) = split_cr(&self.lines[idx]);
        let checkbox = split_checkbox(body).ok_or_else(|| VaultError::NotATask {
            path: self.path.clone(),
            line,
        })?;
        Ok((idx, checkbox, cr))
    }

    /// Replace line `idx` and persist; returns the re-extracted record.
    fn replace(mut self, idx: usize, body: String, cr: &str) -> Result<TaskRecord, VaultError> {
        self.lines[idx] = format!("{body}{cr}");
        self.write()?;
        self.record_at(idx + 1, &body)
    }

    fn record_at(&self, line: usize, body: &str) -> Result<TaskRecord, VaultError> {
        let mut record = parse_task_line(&self.path, line, body).ok_or_else(|| {
            VaultError::NotATask {
                path: self.path.clone(),
                line,
            }
        })?;
        record.modified = true;
        Ok(record)
    }
}

fn split_cr(line: &str) -> (&str, &str) {
    match line.strip_suffix('\r') {
        Some(body) => (body, "\r"),
        None => (line, ""),
    }
}

/// Flip a task's done state.
///
/// Existing done stamps are always removed; a newly completed task gets
/// `✅ <today>` appended.
pub fn toggle(record: &TaskRecord, today: NaiveDate) -> Result<TaskRecord, VaultError> {
    let file = FileLines::read(&record.path)?;
    let (idx, checkbox, cr) = file.checkbox(record.line)?;
    let content = strip_done_stamps(checkbox.rest);
    let body = if checkbox.is_done() {
        format!("{}[ ]{}", checkbox.prefix, content)
    } else {
        format!(
            "{}[x]{} {} {}",
            checkbox.prefix,
            content,
            DONE_GLYPH,
            today.format("%Y-%m-%d")
        )
    };
    let cr = cr.to_string();
    file.replace(idx, body, &cr)
}

/// Replace a task's description, keeping its indentation, bullet and done
/// state.
pub fn edit(record: &TaskRecord, description: &str) -> Result<TaskRecord, VaultError> {
    let file = FileLines::read(&record.path)?;
    let (idx, checkbox, cr) = file.checkbox(record.line)?;
    let body = format!(
        "{}[{}] {}",
        checkbox.prefix,
        checkbox.mark,
        description.trim()
    );
    let cr = cr.to_string();
    file.replace(idx, body, &cr)
}

/// Set the priority glyph, replacing any existing ones. `Normal` removes it.
pub fn set_priority(record: &TaskRecord, priority: Priority) -> Result<TaskRecord, VaultError> {
    let file = FileLines::read(&record.path)?;
    let (idx, checkbox, cr) = file.checkbox(record.line)?;
    let mut description = strip_priority_glyphs(checkbox.description());
    if let Some(glyph) = priority.glyph() {
        if !description.is_empty() {
            description.push(' ');
        }
        description.push(glyph);
    }
    let body = format!("{}[{}] {}", checkbox.prefix, checkbox.mark, description);
    let cr = cr.to_string();
    file.replace(idx, body, &cr)
}

/// Remove a task's line. Returns the removed line for [`restore_line`].
/// Line numbers after it in the same file become stale.
pub fn delete(record: &TaskRecord) -> Result<String, VaultError> {
    let mut file = FileLines::read(&record.path)?;
    let (idx, _, _) = file.checkbox(record.line)?;
    let removed = file.lines.remove(idx);
    file.write()?;
    Ok(removed)
}

/// Insert `- [ ] <description>` directly below `record`. The returned
/// record is valid until the next structural edit to the file.
pub fn insert_after(record: &TaskRecord, description: &str) -> Result<TaskRecord, VaultError> {
    let mut file = FileLines::read(&record.path)?;
    let insert_at = record.line.min(file.lines.len());
    let cr = match insert_at.checked_sub(1).and_then(|i| file.lines.get(i)) {
        Some(anchor) => split_cr(anchor).1,
        None => "",
    };
    let body = format!("- [ ] {}", description.trim());
    file.lines.insert(insert_at, format!("{body}{cr}"));
    file.write()?;
    file.record_at(insert_at + 1, &body)
}

/// Put a previously removed line back so that it becomes line `line`,
/// clamped to the file's current length. In a CRLF file the line gets a
/// `\r` if it lacks one.
pub fn restore_line(path: &Path, line: usize, raw: &str) -> Result<(), VaultError> {
    let mut file = FileLines::read(path)?;
    let at = line.saturating_sub(1).min(file.lines.len());
    let crlf = file.lines.first().is_some_and(|l| l.ends_with('\r'));
    let mut restored = raw.to_string();
    if crlf && !restored.ends_with('\r') {
        restored.push('\r');
    }
    file.lines.insert(at, restored);
    file.write()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_tasks;
    use tempfile::TempDir;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 14).unwrap()
    }

    fn setup(content: &str) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tasks.md");
        fs::write(&path, content).unwrap();
        (tmp, path)
    }

    fn record(path: &Path, line: usize) -> TaskRecord {
        let content = fs::read_to_string(path).unwrap();
        parse_tasks(path, &content)
            .into_iter()
            .find(|t| t.line == line)
            .unwrap()
    }

    #[test]
    fn toggle_appends_and_strips_done_stamp() {
        let (_tmp, path) = setup("# Tasks\n- [ ] buy milk 📅 2025-05-20\n");
        let done = toggle(&record(&path, 2), today()).unwrap();
        assert!(done.done);
        assert!(done.modified);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "# Tasks\n- [x] buy milk 📅 2025-05-20 ✅ 2025-05-14\n"
        );

        let undone = toggle(&done, today()).unwrap();
        assert!(!undone.done);
        assert_eq!(undone.due, done.due);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "# Tasks\n- [ ] buy milk 📅 2025-05-20\n"
        );
    }

    #[test]
    fn toggle_keeps_indentation_and_crlf() {
        let (_tmp, path) = setup("  - [X] nested ✅ 2025-01-01\r\nnext\r\n");
        let rec = toggle(&record(&path, 1), today()).unwrap();
        assert_eq!(rec.raw, "  - [ ] nested");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "  - [ ] nested\r\nnext\r\n"
        );
    }

    #[test]
    fn file_without_trailing_newline_stays_that_way() {
        let (_tmp, path) = setup("- [ ] a");
        toggle(&record(&path, 1), today()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "- [x] a ✅ 2025-05-14");
    }

    #[test]
    fn stale_line_is_refused() {
        let (_tmp, path) = setup("- [ ] a\n- [ ] b\n");
        let stale = record(&path, 2);
        fs::write(&path, "- [ ] a\nplain text now\n").unwrap();
        assert!(matches!(
            toggle(&stale, today()),
            Err(VaultError::NotATask { line: 2, .. })
        ));

        fs::write(&path, "- [ ] a\n").unwrap();
        assert!(matches!(
            edit(&stale, "x"),
            Err(VaultError::LineOutOfRange { line: 2, .. })
        ));
    }

    #[test]
    fn edit_preserves_prefix_and_state() {
        let (_tmp, path) = setup("\t- [x] old text\n");
        let rec = edit(&record(&path, 1), "  new text 🔼 ").unwrap();
        assert_eq!(rec.raw, "\t- [x] new text 🔼");
        assert!(rec.done);
        assert_eq!(rec.priority, Priority::Medium);
    }

    #[test]
    fn set_priority_replaces_glyphs() {
        let (_tmp, path) = setup("- [ ] ship ⏫ 📅 2025-06-01\n");
        let rec = set_priority(&record(&path, 1), Priority::Lowest).unwrap();
        assert_eq!(rec.raw, "- [ ] ship  📅 2025-06-01 ⏬");
        assert_eq!(rec.priority, Priority::Lowest);
        assert_eq!(rec.due, NaiveDate::from_ymd_opt(2025, 6, 1));

        let rec = set_priority(&rec, Priority::Normal).unwrap();
        assert_eq!(rec.raw, "- [ ] ship  📅 2025-06-01");
        assert_eq!(rec.priority, Priority::Normal);
    }

    #[test]
    fn delete_then_restore_is_identity() {
        let original = "# Head\n- [ ] one\n- [ ] two\n- [ ] three\n";
        let (_tmp, path) = setup(original);
        let removed = delete(&record(&path, 3)).unwrap();
        assert_eq!(removed, "- [ ] two");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "# Head\n- [ ] one\n- [ ] three\n"
        );

        restore_line(&path, 3, &removed).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn delete_only_line_keeps_missing_newline() {
        let (_tmp, path) = setup("- [ ] a");
        let removed = delete(&record(&path, 1)).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
        restore_line(&path, 1, &removed).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "- [ ] a");
    }

    #[test]
    fn delete_only_line_keeps_trailing_newline() {
        let (_tmp, path) = setup("- [ ] a\n");
        let removed = delete(&record(&path, 1)).unwrap();
        restore_line(&path, 1, &removed).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "- [ ] a\n");
    }

    #[test]
    fn restore_line_clamps_past_end() {
        let (_tmp, path) = setup("- [ ] a\n");
        restore_line(&path, 40, "- [ ] z").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "- [ ] a\n- [ ] z\n");
    }

    #[test]
    fn restore_line_follows_crlf() {
        let (_tmp, path) = setup("- [ ] a\r\n- [ ] c\r\n");
        restore_line(&path, 2, "- [ ] b").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "- [ ] a\r\n- [ ] b\r\n- [ ] c\r\n"
        );
    }

    #[test]
    fn insert_after_returns_new_line_number() {
        let (_tmp, path) = setup("- [ ] a\ntext\n- [ ] c\n");
        let added = insert_after(&record(&path, 1), "b").unwrap();
        assert_eq!(added.line, 2);
        assert_eq!(added.raw, "- [ ] b");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "- [ ] a\n- [ ] b\ntext\n- [ ] c\n"
        );
        assert_eq!(record(&path, 4).description, "c");
    }

    #[test]
    fn atomic_write_overwrites() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.txt");

        atomic_write(&path, b"hello world").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello world");

        atomic_write(&path, b"goodbye").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "goodbye");
    }

    #[cfg(unix)]
    #[test]
    fn atomic_write_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let (_tmp, path) = setup("- [ ] a\n");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();
        atomic_write(&path, b"- [x] a\n").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }
}
