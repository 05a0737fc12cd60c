use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Task priority, ordered from most to least urgent.
///
/// The derived ordering is the sort order used by `sort by priority`:
/// `Highest < High < Medium < Normal < Low < Lowest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Highest,
    High,
    Medium,
    #[default]
    Normal,
    Low,
    Lowest,
}

impl Priority {
    /// All ranks, most urgent first.
    pub const ALL: [Priority; 6] = [
        Priority::Highest,
        Priority::High,
        Priority::Medium,
        Priority::Normal,
        Priority::Low,
        Priority::Lowest,
    ];

    /// The reserved glyph for this rank. `Normal` has none.
    pub fn glyph(self) -> Option<char> {
        match self {
            Priority::Highest => Some('🔺'),
            Priority::High => Some('⏫'),
            Priority::Medium => Some('🔼'),
            Priority::Normal => None,
            Priority::Low => Some('🔽'),
            Priority::Lowest => Some('⏬'),
        }
    }

    /// Map a glyph back to its rank.
    pub fn from_glyph(c: char) -> Option<Priority> {
        match c {
            '🔺' => Some(Priority::Highest),
            '⏫' => Some(Priority::High),
            '🔼' => Some(Priority::Medium),
            '🔽' => Some(Priority::Low),
            '⏬' => Some(Priority::Lowest),
            _ => None,
        }
    }

    /// Whether `c` is one of the reserved priority glyphs
    pub fn is_glyph(c: char) -> bool {
        Priority::from_glyph(c).is_some()
    }

    fn rank(self) -> usize {
        self as usize
    }

    fn from_rank(rank: usize) -> Priority {
        Priority::ALL[rank.min(Priority::ALL.len() - 1)]
    }

    /// One step towards `Highest`, clamped.
    pub fn raised(self) -> Priority {
        Priority::from_rank(self.rank().saturating_sub(1))
    }

    /// One step towards `Lowest`, clamped.
    pub fn lowered(self) -> Priority {
        Priority::from_rank(self.rank() + 1)
    }

    pub fn parse_name(s: &str) -> Option<Priority> {
        match s.to_ascii_lowercase().as_str() {
            "highest" => Some(Priority::Highest),
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "normal" => Some(Priority::Normal),
            "low" => Some(Priority::Low),
            "lowest" => Some(Priority::Lowest),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Highest => "highest",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Normal => "normal",
            Priority::Low => "low",
            Priority::Lowest => "lowest",
        };
        f.write_str(name)
    }
}

/// One checkbox line extracted from a markdown file.
///
/// Identity is `(path, line)`. The line number is only trustworthy until the
/// next structural edit (delete/insert) to the same file; after that the
/// file must be re-extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Source file
    pub path: PathBuf,
    /// 1-indexed physical line number
    pub line: usize,
    /// The line exactly as it appears on disk
    pub raw: String,
    pub done: bool,
    /// Trimmed text after the checkbox, metadata tokens included
    pub description: String,
    /// From the first `📅 YYYY-MM-DD` token
    pub due: Option<NaiveDate>,
    pub priority: Priority,
    /// Set when this record has been rewritten since extraction
    #[serde(skip)]
    pub modified: bool,
}

impl TaskRecord {
    /// Whether this record refers to `(path, line)`
    pub fn is_at(&self, path: &Path, line: usize) -> bool {
        self.line == line && self.path == path
    }

    /// `path:line`, the form accepted by the CLI
    pub fn location(&self) -> String {
        format!("{}:{}", self.path.display(), self.line)
    }
}
