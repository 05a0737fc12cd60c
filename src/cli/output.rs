use std::fmt::Write;
use std::path::Path;

use serde::Serialize;

use crate::model::query::GroupBy;
use crate::model::section::Section;
use crate::model::task::{Priority, TaskRecord};
use crate::ops::search::{MatchField, SearchHit};

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct TaskJson {
    pub file: String,
    pub line: usize,
    pub done: bool,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
    pub priority: Priority,
}

#[derive(Serialize)]
pub struct GroupJson {
    pub name: String,
    pub tasks: Vec<TaskJson>,
}

#[derive(Serialize)]
pub struct SectionJson {
    pub name: String,
    pub count: usize,
    pub groups: Vec<GroupJson>,
}

#[derive(Serialize)]
pub struct SearchHitJson {
    pub section: String,
    pub group: String,
    pub matched: &'static str,
    #[serde(flatten)]
    pub task: TaskJson,
}

/// Result of a write command
#[derive(Serialize)]
pub struct ChangeJson {
    pub action: &'static str,
    pub file: String,
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskJson>,
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// `path` relative to the vault when it is inside it
pub fn rel_path(vault: &Path, path: &Path) -> String {
    path.strip_prefix(vault)
        .unwrap_or(path)
        .display()
        .to_string()
}

pub fn task_to_json(vault: &Path, task: &TaskRecord) -> TaskJson {
    TaskJson {
        file: rel_path(vault, &task.path),
        line: task.line,
        done: task.done,
        description: task.description.clone(),
        due: task.due.map(|d| d.format("%Y-%m-%d").to_string()),
        priority: task.priority,
    }
}

pub fn sections_to_json(vault: &Path, sections: &[Section]) -> Vec<SectionJson> {
    sections
        .iter()
        .map(|s| SectionJson {
            name: s.name.clone(),
            count: s.tasks.len(),
            groups: s
                .groups
                .iter()
                .map(|g| GroupJson {
                    name: g.name.clone(),
                    tasks: g.tasks.iter().map(|t| task_to_json(vault, t)).collect(),
                })
                .collect(),
        })
        .collect()
}

pub fn hit_to_json(vault: &Path, hit: &SearchHit) -> SearchHitJson {
    SearchHitJson {
        section: hit.section.clone(),
        group: hit.group.clone(),
        matched: match hit.field {
            MatchField::Description => "description",
            MatchField::Section => "section",
            MatchField::Group => "group",
        },
        task: task_to_json(vault, &hit.task),
    }
}

pub fn change_to_json(
    vault: &Path,
    action: &'static str,
    path: &Path,
    line: usize,
    task: Option<&TaskRecord>,
) -> ChangeJson {
    ChangeJson {
        action,
        file: rel_path(vault, path),
        line,
        task: task.map(|t| task_to_json(vault, t)),
    }
}

// ---------------------------------------------------------------------------
// Text output
// ---------------------------------------------------------------------------

/// `[x] description (file:line)`
pub fn format_task_line(vault: &Path, task: &TaskRecord) -> String {
    let checkbox = if task.done { "[x]" } else { "[ ]" };
    format!(
        "{} {} ({}:{})",
        checkbox,
        task.description,
        rel_path(vault, &task.path),
        task.line
    )
}

/// The plain-text listing: a `## name (count)` heading per named section,
/// `### group` headings when grouped, one line per task.
pub fn render_sections(vault: &Path, sections: &[Section]) -> String {
    let mut out = String::new();
    let total: usize = sections.iter().map(|s| s.tasks.len()).sum();
    let _ = writeln!(out, "Found {} task(s):\n", total);

    for section in sections {
        if !section.name.is_empty() {
            let _ = writeln!(out, "## {} ({})", section.name, section.tasks.len());
        }
        if section.tasks.is_empty() {
            out.push_str("(no matching tasks)\n\n");
            continue;
        }
        for group in &section.groups {
            if section.query.group_by != GroupBy::None && !group.name.is_empty() {
                let _ = writeln!(out, "### {}", group.name);
            }
            for task in &group.tasks {
                let _ = writeln!(out, "{}", format_task_line(vault, task));
            }
        }
        out.push('\n');
    }
    out
}

pub fn render_hits(vault: &Path, hits: &[SearchHit]) -> String {
    let mut out = String::new();
    for hit in hits {
        let _ = writeln!(out, "{}", format_task_line(vault, &hit.task));
    }
    out
}
