use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::io::cache::TaskCache;
use crate::model::query::Query;
use crate::model::task::TaskRecord;
use crate::parse::{parse_blocks, parse_inline, parse_task_line, parse_tasks};

/// Error type for vault I/O operations
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("no ```tasks block found in {0}")]
    NoQueryBlock(PathBuf),
    #[error("{path}:{line}: line out of range")]
    LineOutOfRange { path: PathBuf, line: usize },
    #[error("{path}:{line}: not a task line")]
    NotATask { path: PathBuf, line: usize },
    #[error("{path}:{line}: task changed since the action being undone")]
    UndoConflict { path: PathBuf, line: usize },
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("md"))
}

/// Every directory under `root` that is not hidden, `root` included.
pub fn vault_dirs(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect()
}

/// Collect every markdown file under `root`, skipping hidden directories.
/// Paths come back sorted by directory walk order, names sorted.
pub fn scan_vault(root: &Path) -> Result<Vec<PathBuf>, VaultError> {
    if !root.is_dir() {
        return Err(VaultError::NotADirectory(root.to_path_buf()));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !(e.file_type().is_dir() && is_hidden(e)));

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) if e.depth() == 0 => {
                return Err(VaultError::ReadError {
                    path: root.to_path_buf(),
                    source: e.into(),
                });
            }
            Err(e) => {
                warn!(error = %e, "skipping unreadable vault entry");
                continue;
            }
        };
        if entry.file_type().is_file() && is_markdown(entry.path()) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Extract the tasks of a single file.
pub fn read_tasks(path: &Path) -> Result<Vec<TaskRecord>, VaultError> {
    let content = fs::read_to_string(path).map_err(|e| VaultError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(parse_tasks(path, &content))
}

/// The task currently at (path, line).
pub fn read_task_at(path: &Path, line: usize) -> Result<TaskRecord, VaultError> {
    let content = fs::read_to_string(path).map_err(|e| VaultError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let text = line
        .checked_sub(1)
        .and_then(|idx| content.lines().nth(idx))
        .ok_or_else(|| VaultError::LineOutOfRange {
            path: path.to_path_buf(),
            line,
        })?;
    parse_task_line(path, line, text).ok_or_else(|| VaultError::NotATask {
        path: path.to_path_buf(),
        line,
    })
}

/// Scan the vault and extract every task, going through the cache.
///
/// Files that cannot be read are skipped; only an unusable root is an error.
pub fn load_vault(root: &Path, cache: &TaskCache) -> Result<Vec<TaskRecord>, VaultError> {
    let mut records = Vec::new();
    for path in scan_vault(root)? {
        if let Some(tasks) = cache.get(&path) {
            records.extend(tasks);
            continue;
        }
        debug!(path = %path.display(), "cache miss");
        match read_tasks(&path) {
            Ok(tasks) => {
                cache.set(&path, tasks.clone());
                records.extend(tasks);
            }
            Err(e) => warn!(error = %e, "skipping file"),
        }
    }
    Ok(records)
}

/// Compile every query block in a query file.
pub fn read_query_file(path: &Path) -> Result<Vec<Query>, VaultError> {
    let content = fs::read_to_string(path).map_err(|e| VaultError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let queries = parse_blocks(&content);
    if queries.is_empty() {
        return Err(VaultError::NoQueryBlock(path.to_path_buf()));
    }
    Ok(queries)
}

/// Where a query argument points: an existing file (absolute or relative
/// to the vault), or nothing, in which case it is inline query text.
pub fn query_file_path(input: &str, vault: &Path) -> Option<PathBuf> {
    let direct = PathBuf::from(input);
    if direct.is_absolute() && direct.is_file() {
        return Some(direct);
    }
    let relative = vault.join(input);
    relative.is_file().then_some(relative)
}

/// Resolve a query argument to compiled queries.
pub fn resolve_query(input: &str, vault: &Path) -> Result<Vec<Query>, VaultError> {
    match query_file_path(input, vault) {
        Some(path) => read_query_file(&path),
        None => Ok(vec![parse_inline(input)]),
    }
}
