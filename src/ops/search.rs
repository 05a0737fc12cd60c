use std::collections::HashSet;
use std::path::PathBuf;

use regex::{Regex, RegexBuilder};

use crate::model::section::Section;
use crate::model::task::TaskRecord;

/// Which part of the listing matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchField {
    Description,
    Section,
    Group,
}

/// A record that matched, with where it sits in the listing
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub section: String,
    pub group: String,
    pub field: MatchField,
    pub task: TaskRecord,
}

/// Case-insensitive matcher: a regex, or a plain substring when the
/// pattern is not a valid regex.
#[derive(Debug, Clone)]
pub enum Matcher {
    Regex(Regex),
    Literal(String),
}

impl Matcher {
    pub fn new(pattern: &str) -> Self {
        match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => Matcher::Regex(re),
            Err(_) => Matcher::Literal(pattern.to_lowercase()),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Matcher::Regex(re) => re.is_match(text),
            Matcher::Literal(needle) => text.to_lowercase().contains(needle.as_str()),
        }
    }
}

/// Records whose description, section name or group name matches, in
/// listing order. A record listed in several sections is reported once.
pub fn search_sections(sections: &[Section], matcher: &Matcher) -> Vec<SearchHit> {
    let mut hits = Vec::new();
    let mut seen: HashSet<(PathBuf, usize)> = HashSet::new();

    for section in sections {
        for group in &section.groups {
            for task in &group.tasks {
                let key = (task.path.clone(), task.line);
                if seen.contains(&key) {
                    continue;
                }
                let field = if matcher.is_match(&task.description) {
                    MatchField::Description
                } else if matcher.is_match(&section.name) {
                    MatchField::Section
                } else if matcher.is_match(&group.name) {
                    MatchField::Group
                } else {
                    continue;
                };
                seen.insert(key);
                hits.push(SearchHit {
                    section: section.name.clone(),
                    group: group.name.clone(),
                    field,
                    task: task.clone(),
                });
            }
        }
    }

    hits
}
