use std::path::Path;

use chrono::NaiveDate;
use indexmap::IndexMap;

use crate::model::query::{DateField, DateFilter, DateOp, GroupBy, Query, SortBy};
use crate::model::section::{Group, Section};
use crate::model::task::TaskRecord;
use crate::ops::undo::UndoStack;

/// Group name for tasks at the vault root under `group by folder`
pub const ROOT_FOLDER: &str = "/";

/// Runs queries over extracted records: filter, group, then sort.
pub struct Evaluator<'a> {
    vault_root: &'a Path,
    today: NaiveDate,
    undo: Option<&'a UndoStack>,
}

impl<'a> Evaluator<'a> {
    pub fn new(vault_root: &'a Path, today: NaiveDate) -> Self {
        Evaluator {
            vault_root,
            today,
            undo: None,
        }
    }

    /// Keep records that were just toggled visible under `not done`.
    pub fn with_undo(mut self, undo: &'a UndoStack) -> Self {
        self.undo = Some(undo);
        self
    }

    /// One independent section per query, in query order.
    pub fn evaluate_all(&self, records: &[TaskRecord], queries: &[Query]) -> Vec<Section> {
        queries.iter().map(|q| self.evaluate(records, q)).collect()
    }

    pub fn evaluate(&self, records: &[TaskRecord], query: &Query) -> Section {
        let kept: Vec<TaskRecord> = records
            .iter()
            .filter(|r| self.keep(r, query))
            .cloned()
            .collect();

        let mut groups = group_tasks(kept, query.group_by, self.vault_root);
        for group in &mut groups {
            sort_tasks(&mut group.tasks, query.sort_by);
        }

        Section::new(query.name.clone(), query.clone(), groups)
    }

    fn keep(&self, record: &TaskRecord, query: &Query) -> bool {
        if !query
            .date_filters
            .iter()
            .all(|f| matches_date_filter(record, f, self.today))
        {
            return false;
        }
        if self
            .undo
            .is_some_and(|u| u.is_recently_toggled(&record.path, record.line))
        {
            return true;
        }
        !(query.not_done && record.done)
    }
}

/// Whether `record` passes one date filter. Only `due` is evaluated; a
/// record without a due date fails every `due` filter.
pub fn matches_date_filter(record: &TaskRecord, filter: &DateFilter, today: NaiveDate) -> bool {
    if filter.field != DateField::Due {
        return true;
    }
    let Some(due) = record.due else {
        return false;
    };
    filter.dates.iter().any(|spec| {
        let date = spec.resolve(today);
        match filter.op {
            DateOp::On => due == date,
            DateOp::Before => due < date,
            DateOp::After => due > date,
        }
    })
}

/// The group a record falls in for `group_by`.
pub fn group_key(record: &TaskRecord, group_by: GroupBy, vault_root: &Path) -> String {
    match group_by {
        GroupBy::None => String::new(),
        GroupBy::Folder => {
            let rel = record
                .path
                .strip_prefix(vault_root)
                .unwrap_or(&record.path);
            match rel.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir.display().to_string(),
                _ => ROOT_FOLDER.to_string(),
            }
        }
        GroupBy::Filename => record
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

/// Split records into groups in first-seen order. Ungrouped queries get
/// a single unnamed group, even when empty.
pub fn group_tasks(tasks: Vec<TaskRecord>, group_by: GroupBy, vault_root: &Path) -> Vec<Group> {
    if group_by == GroupBy::None {
        return vec![Group {
            name: String::new(),
            tasks,
        }];
    }

    let mut buckets: IndexMap<String, Vec<TaskRecord>> = IndexMap::new();
    for task in tasks {
        buckets
            .entry(group_key(&task, group_by, vault_root))
            .or_default()
            .push(task);
    }
    buckets
        .into_iter()
        .map(|(name, tasks)| Group { name, tasks })
        .collect()
}

/// Stable sort: equal keys keep extraction order.
pub fn sort_tasks(tasks: &mut [TaskRecord], sort_by: SortBy) {
    match sort_by {
        SortBy::None => {}
        SortBy::Priority => tasks.sort_by_key(|t| t.priority),
        SortBy::Due => tasks.sort_by_key(|t| (t.due.is_none(), t.due)),
    }
}
