use serde::Serialize;

use crate::model::query::Query;
use crate::model::task::TaskRecord;

/// A named bucket of records inside a section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    /// Folder, filename, or empty when ungrouped
    pub name: String,
    pub tasks: Vec<TaskRecord>,
}

/// The result of evaluating one query.
///
/// `tasks` is always the concatenation of `groups[i].tasks` in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub name: String,
    pub query: Query,
    pub groups: Vec<Group>,
    pub tasks: Vec<TaskRecord>,
}

impl Section {
    pub fn new(name: String, query: Query, groups: Vec<Group>) -> Self {
        let tasks = groups
            .iter()
            .flat_map(|g| g.tasks.iter().cloned())
            .collect();
        Section {
            name,
            query,
            groups,
            tasks,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
