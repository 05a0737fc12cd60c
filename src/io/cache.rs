use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

use crate::model::task::TaskRecord;

#[derive(Debug, Clone)]
struct CacheEntry {
    mtime: SystemTime,
    tasks: Vec<TaskRecord>,
}

/// Per-file memo of extracted tasks, keyed by path and gated on mtime.
///
/// Shared between the session and the watcher thread; the watcher only
/// ever calls [`TaskCache::invalidate`].
#[derive(Debug, Default)]
pub struct TaskCache {
    entries: RwLock<HashMap<PathBuf, CacheEntry>>,
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl TaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached tasks for `path`, unless the file changed since they were
    /// stored. A file that cannot be stat'ed is a miss.
    pub fn get(&self, path: &Path) -> Option<Vec<TaskRecord>> {
        let current = modified(path)?;
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(path)?;
        (current <= entry.mtime).then(|| entry.tasks.clone())
    }

    /// Store tasks for `path` under its current mtime. Nothing is stored
    /// if the file cannot be stat'ed.
    pub fn set(&self, path: &Path, tasks: Vec<TaskRecord>) {
        let Some(mtime) = modified(path) else {
            return;
        };
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(path.to_path_buf(), CacheEntry { mtime, tasks });
    }

    pub fn invalidate(&self, path: &Path) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(path);
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_tasks;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_file(path: &Path, content: &str, mtime: SystemTime) {
        fs::write(path, content).unwrap();
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
    }

    #[test]
    fn hit_after_set_until_mtime_advances() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.md");
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        write_file(&path, "- [ ] one\n", base);

        let cache = TaskCache::new();
        assert!(cache.get(&path).is_none());

        cache.set(&path, parse_tasks(&path, "- [ ] one\n"));
        assert_eq!(cache.get(&path).unwrap().len(), 1);

        write_file(&path, "- [ ] one\n- [ ] two\n", base + Duration::from_secs(5));
        assert!(cache.get(&path).is_none());
    }

    #[test]
    fn touch_with_identical_bytes_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.md");
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        write_file(&path, "- [ ] one\n", base);

        let cache = TaskCache::new();
        cache.set(&path, parse_tasks(&path, "- [ ] one\n"));
        assert!(cache.get(&path).is_some());

        write_file(&path, "- [ ] one\n", base + Duration::from_secs(1));
        assert!(cache.get(&path).is_none());

        cache.set(&path, parse_tasks(&path, "- [ ] one\n"));
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(base + Duration::from_secs(2))
            .unwrap();
        assert!(cache.get(&path).is_none());
        assert_eq!(fs::read_to_string(&path).unwrap(), "- [ ] one\n");
    }

    #[test]
    fn older_mtime_is_still_a_hit() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.md");
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        write_file(&path, "- [ ] one\n", base);

        let cache = TaskCache::new();
        cache.set(&path, Vec::new());
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(base - Duration::from_secs(60))
            .unwrap();
        assert!(cache.get(&path).is_some());
    }

    #[test]
    fn invalidate_and_missing_file_are_misses() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.md");
        fs::write(&path, "- [ ] one\n").unwrap();

        let cache = TaskCache::new();
        cache.set(&path, Vec::new());
        cache.invalidate(&path);
        assert!(cache.get(&path).is_none());
        assert!(cache.is_empty());

        cache.set(&path, Vec::new());
        fs::remove_file(&path).unwrap();
        assert!(cache.get(&path).is_none());

        cache.set(&path, Vec::new());
        assert_eq!(cache.len(), 1);
    }
}
