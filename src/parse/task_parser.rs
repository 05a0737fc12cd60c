use std::path::Path;

use chrono::NaiveDate;

use crate::model::task::{Priority, TaskRecord};

/// Marks the due date: `📅 2025-05-14`
pub const DUE_GLYPH: char = '📅';
/// Marks the completion date appended on toggle: `✅ 2025-05-14`
pub const DONE_GLYPH: char = '✅';

/// Emoji presentation selector that may trail a priority glyph
const VARIATION_SELECTOR: char = '\u{FE0F}';

/// A checkbox line split into its parts.
///
/// `prefix` is the indentation, the `-` bullet and any spacing before `[`.
/// `rest` is everything after `]`, untrimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckboxLine<'a> {
    pub prefix: &'a str,
    pub mark: char,
    pub rest: &'a str,
}

impl CheckboxLine<'_> {
    pub fn is_done(&self) -> bool {
        self.mark != ' '
    }

    pub fn description(&self) -> &str {
        self.rest.trim()
    }
}

fn is_space(b: u8) -> bool {
    b.is_ascii_whitespace()
}

/// Recognize `<ws>-<ws>[ ]`, `[x]` or `[X]` at the start of a line.
pub fn split_checkbox(line: &str) -> Option<CheckboxLine<'_>> {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() && is_space(bytes[i]) {
        i += 1;
    }
    if bytes.get(i) != Some(&b'-') {
        return None;
    }
    i += 1;
    while i < bytes.len() && is_space(bytes[i]) {
        i += 1;
    }
    let prefix_end = i;

    if bytes.get(i) != Some(&b'[') {
        return None;
    }
    let mark = match bytes.get(i + 1) {
        Some(b' ') => ' ',
        Some(b'x') => 'x',
        Some(b'X') => 'X',
        _ => return None,
    };
    if bytes.get(i + 2) != Some(&b']') {
        return None;
    }

    Some(CheckboxLine {
        prefix: &line[..prefix_end],
        mark,
        rest: &line[i + 3..],
    })
}

/// Extract every task line from a file's content, in file order.
/// Line numbers count every physical line, tasks or not.
pub fn parse_tasks(path: &Path, content: &str) -> Vec<TaskRecord> {
    content
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| parse_task_line(path, idx + 1, line))
        .collect()
}

/// Parse one physical line; `None` if it is not a checkbox line.
pub fn parse_task_line(path: &Path, line_no: usize, line: &str) -> Option<TaskRecord> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let checkbox = split_checkbox(line)?;
    let description = checkbox.description().to_string();

    Some(TaskRecord {
        path: path.to_path_buf(),
        line: line_no,
        raw: line.to_string(),
        done: checkbox.is_done(),
        due: parse_due_date(&description),
        priority: parse_priority(&description),
        description,
        modified: false,
    })
}

/// If a `YYYY-MM-DD` token starts at `start` (after optional ASCII
/// whitespace), return it with the byte offset just past it.
fn date_token_at(s: &str, start: usize) -> Option<(&str, usize)> {
    let bytes = s.as_bytes();
    let mut i = start;
    while i < bytes.len() && is_space(bytes[i]) {
        i += 1;
    }
    let token = bytes.get(i..i + 10)?;
    let shape_ok = token.iter().enumerate().all(|(k, b)| match k {
        4 | 7 => *b == b'-',
        _ => b.is_ascii_digit(),
    });
    if shape_ok {
        Some((&s[i..i + 10], i + 10))
    } else {
        None
    }
}

/// The first `📅 YYYY-MM-DD` token. A well-shaped but impossible date
/// (`2025-13-40`) yields `None`, as does a missing token.
pub fn parse_due_date(description: &str) -> Option<NaiveDate> {
    let (token, _) = description
        .match_indices(DUE_GLYPH)
        .find_map(|(k, g)| date_token_at(description, k + g.len()))?;
    NaiveDate::parse_from_str(token, "%Y-%m-%d").ok()
}

/// The rank of the first priority glyph, or `Normal`.
pub fn parse_priority(description: &str) -> Priority {
    description
        .chars()
        .find_map(Priority::from_glyph)
        .unwrap_or_default()
}

/// Remove every `✅ YYYY-MM-DD` stamp along with the whitespace before it.
pub fn strip_done_stamps(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut copied_to = 0;
    for (k, g) in s.match_indices(DONE_GLYPH) {
        if k < copied_to {
            continue;
        }
        if let Some((_, end)) = date_token_at(s, k + g.len()) {
            out.push_str(&s[copied_to..k]);
            let kept = out.trim_end_matches(|c: char| c.is_ascii_whitespace()).len();
            out.truncate(kept);
            copied_to = end;
        }
    }
    out.push_str(&s[copied_to..]);
    out
}

/// Remove all priority glyphs (and a trailing emoji selector) and trim.
pub fn strip_priority_glyphs(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if Priority::is_glyph(c) {
            if chars.peek() == Some(&VARIATION_SELECTOR) {
                chars.next();
            }
            continue;
        }
        out.push(c);
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn p() -> PathBuf {
        PathBuf::from("/vault/notes.md")
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn split_simple_checkbox() {
        let cb = split_checkbox("- [ ] buy milk").unwrap();
        assert_eq!(cb.prefix, "- ");
        assert_eq!(cb.mark, ' ');
        assert_eq!(cb.rest, " buy milk");
        assert!(!cb.is_done());
    }

    #[test]
    fn split_indented_and_tight() {
        let cb = split_checkbox("    -[X]done thing").unwrap();
        assert_eq!(cb.prefix, "    -");
        assert!(cb.is_done());
        assert_eq!(cb.description(), "done thing");

        let cb = split_checkbox("\t-   [x] tabbed").unwrap();
        assert_eq!(cb.prefix, "\t-   ");
    }

    #[test]
    fn non_task_lines_rejected() {
        assert!(split_checkbox("plain text").is_none());
        assert!(split_checkbox("* [ ] star bullet").is_none());
        assert!(split_checkbox("- [>] other state").is_none());
        assert!(split_checkbox("- [ x] malformed").is_none());
        assert!(split_checkbox("- list item").is_none());
        assert!(split_checkbox("").is_none());
    }

    #[test]
    fn empty_description_is_still_a_task() {
        let rec = parse_task_line(&p(), 1, "- [ ] ").unwrap();
        assert_eq!(rec.description, "");
    }

    #[test]
    fn line_numbers_count_every_line() {
        let content = "# Heading\n\n- [ ] one\ntext\n  - [x] two ✅ 2025-01-02\n- [ ] three\n";
        let tasks = parse_tasks(&p(), content);
        let lines: Vec<usize> = tasks.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![3, 5, 6]);
        assert!(tasks[1].done);
        assert_eq!(tasks[1].raw, "  - [x] two ✅ 2025-01-02");
    }

    #[test]
    fn crlf_lines_are_trimmed() {
        let tasks = parse_tasks(&p(), "- [ ] a\r\n- [x] b\r\n");
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].raw, "- [ ] a");
        assert_eq!(tasks[1].description, "b");
    }

    #[test]
    fn due_date_first_valid_token() {
        assert_eq!(
            parse_due_date("pay rent 📅 2025-05-01"),
            Some(date("2025-05-01"))
        );
        assert_eq!(
            parse_due_date("📅2025-05-01 tight spacing"),
            Some(date("2025-05-01"))
        );
        assert_eq!(
            parse_due_date("📅 soon 📅 2025-06-01"),
            Some(date("2025-06-01"))
        );
        assert_eq!(parse_due_date("no date here"), None);
    }

    #[test]
    fn impossible_due_date_is_none() {
        assert_eq!(parse_due_date("bad 📅 2025-13-40"), None);
    }

    #[test]
    fn priority_first_glyph_wins() {
        assert_eq!(parse_priority("a 🔼 b ⏬"), Priority::Medium);
        assert_eq!(parse_priority("urgent 🔺"), Priority::Highest);
        assert_eq!(parse_priority("plain"), Priority::Normal);
    }

    #[test]
    fn done_stamp_stripping() {
        assert_eq!(strip_done_stamps(" task ✅ 2025-01-01"), " task");
        assert_eq!(
            strip_done_stamps(" task ✅ 2025-01-01 📅 2025-02-01"),
            " task 📅 2025-02-01"
        );
        assert_eq!(
            strip_done_stamps(" a  ✅ 2025-01-01 ✅2025-01-02"),
            " a"
        );
        // a bare glyph without a date stays
        assert_eq!(strip_done_stamps(" ✅ keep"), " ✅ keep");
    }

    #[test]
    fn priority_glyph_stripping() {
        assert_eq!(strip_priority_glyphs("ship it ⏫ 📅 2025-01-01"), "ship it  📅 2025-01-01");
        assert_eq!(strip_priority_glyphs("⏫\u{FE0F} first"), "first");
        assert_eq!(strip_priority_glyphs("nothing"), "nothing");
    }

    #[test]
    fn record_fields_from_metadata_tokens() {
        let rec = parse_task_line(&p(), 7, "  - [ ]   call bob 🔽 📅 2030-10-10  ").unwrap();
        assert_eq!(rec.line, 7);
        assert_eq!(rec.description, "call bob 🔽 📅 2030-10-10");
        assert_eq!(rec.priority, Priority::Low);
        assert_eq!(rec.due, Some(date("2030-10-10")));
        assert!(!rec.modified);
    }
}
