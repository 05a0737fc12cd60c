use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// Which date a filter looks at.
///
/// Only `Due` is evaluated; `Scheduled` and `Done` are accepted by the
/// compiler but every record passes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateField {
    Due,
    Scheduled,
    Done,
}

impl DateField {
    pub fn keyword(self) -> &'static str {
        match self {
            DateField::Due => "due",
            DateField::Scheduled => "scheduled",
            DateField::Done => "done",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateOp {
    On,
    Before,
    After,
}

/// A date operand as written in a query. Relative forms are resolved
/// against "today" at evaluation time, not at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateSpec {
    Today,
    Tomorrow,
    Yesterday,
    Absolute(NaiveDate),
    /// Anything else; resolves to today
    Unrecognized(String),
}

impl DateSpec {
    pub fn parse(token: &str) -> DateSpec {
        match token {
            "today" => DateSpec::Today,
            "tomorrow" => DateSpec::Tomorrow,
            "yesterday" => DateSpec::Yesterday,
            other => match NaiveDate::parse_from_str(other, "%Y-%m-%d") {
                Ok(d) => DateSpec::Absolute(d),
                Err(_) => DateSpec::Unrecognized(other.to_string()),
            },
        }
    }

    pub fn resolve(&self, today: NaiveDate) -> NaiveDate {
        match self {
            DateSpec::Today | DateSpec::Unrecognized(_) => today,
            DateSpec::Tomorrow => today.checked_add_days(Days::new(1)).unwrap_or(today),
            DateSpec::Yesterday => today.checked_sub_days(Days::new(1)).unwrap_or(today),
            DateSpec::Absolute(d) => *d,
        }
    }
}

/// `due before 2025-01-01`, `due today or tomorrow`, ...
///
/// `dates` is never empty; more than one entry means "any of".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateFilter {
    pub field: DateField,
    pub op: DateOp,
    pub dates: Vec<DateSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    None,
    Folder,
    Filename,
}

impl GroupBy {
    /// Unknown keys are ignored rather than rejected.
    pub fn from_key(key: &str) -> GroupBy {
        match key {
            "folder" => GroupBy::Folder,
            "filename" => GroupBy::Filename,
            _ => GroupBy::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    None,
    Priority,
    Due,
}

impl SortBy {
    pub fn from_key(key: &str) -> SortBy {
        match key {
            "priority" => SortBy::Priority,
            "due" => SortBy::Due,
            _ => SortBy::None,
        }
    }
}

/// A compiled query: filters, grouping and sorting for one section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Query {
    /// Nearest preceding `## ` heading, empty for inline queries
    pub name: String,
    pub not_done: bool,
    /// Conjunctive
    pub date_filters: Vec<DateFilter>,
    pub group_by: GroupBy,
    pub sort_by: SortBy,
}

impl Query {
    /// The fallback used when a query source has nothing usable.
    pub fn not_done() -> Self {
        Query {
            not_done: true,
            ..Default::default()
        }
    }
}
