use crate::model::query::{DateField, DateFilter, DateOp, DateSpec, GroupBy, Query, SortBy};

/// Opens a query block
pub const QUERY_FENCE: &str = "```tasks";
/// Closes a query block
const CLOSE_FENCE: &str = "```";

const RELATIVE_DAYS: [&str; 3] = ["today", "tomorrow", "yesterday"];
const DATE_FIELDS: [DateField; 3] = [DateField::Due, DateField::Scheduled, DateField::Done];

/// A raw ```tasks block located in a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryBlock<'a> {
    /// Nearest `## ` heading ending before the block
    pub heading: Option<&'a str>,
    pub body: &'a str,
}

fn is_space(b: u8) -> bool {
    b.is_ascii_whitespace()
}

fn is_word(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Skip ASCII whitespace from `i`
fn skip_space(text: &str, i: usize) -> usize {
    i + text.as_bytes()[i..].iter().take_while(|b| is_space(**b)).count()
}

/// Level-2 headings as `(end offset, text)` in file order.
fn level2_headings(content: &str) -> Vec<(usize, &str)> {
    let mut headings = Vec::new();
    let mut offset = 0;
    for line in content.split('\n') {
        let end = offset + line.len();
        if let Some(after) = line.strip_prefix("##")
            && after.starts_with([' ', '\t'])
        {
            let text = after.trim();
            if !text.is_empty() {
                headings.push((end, text));
            }
        }
        offset = end + 1;
    }
    headings
}

/// Locate every ```tasks block.
///
/// The body starts after the line break ending the opening fence's line and
/// runs to the next closing fence. An opening fence with no closing fence
/// after it is ignored.
pub fn find_blocks(content: &str) -> Vec<QueryBlock<'_>> {
    let headings = level2_headings(content);
    let mut blocks = Vec::new();
    let mut pos = 0;

    while let Some(rel) = content[pos..].find(QUERY_FENCE) {
        let open = pos + rel;
        let after = open + QUERY_FENCE.len();
        let ws_end = skip_space(content, after);

        // The fence must be followed by whitespace containing a line break
        let Some(nl) = content[after..ws_end].rfind('\n') else {
            pos = after;
            continue;
        };
        let body_start = after + nl + 1;
        let Some(close_rel) = content[body_start..].find(CLOSE_FENCE) else {
            break;
        };
        let close = body_start + close_rel;

        let heading = headings
            .iter()
            .take_while(|(end, _)| *end < open)
            .last()
            .map(|(_, text)| *text);

        blocks.push(QueryBlock {
            heading,
            body: &content[body_start..close],
        });
        pos = close + CLOSE_FENCE.len();
    }

    blocks
}

/// Compile every ```tasks block in a file. Each query is named after its
/// nearest preceding level-2 heading.
pub fn parse_blocks(content: &str) -> Vec<Query> {
    find_blocks(content)
        .into_iter()
        .map(|block| {
            let mut query = parse_query_body(block.body);
            query.name = block.heading.unwrap_or_default().to_string();
            query
        })
        .collect()
}

/// Compile query text given directly (no heading, no fence).
pub fn parse_inline(text: &str) -> Query {
    parse_query_body(text)
}

/// Compile the clauses of one query. Matching is by substring; anything
/// not recognized is ignored.
pub fn parse_query_body(body: &str) -> Query {
    Query {
        name: String::new(),
        not_done: body.contains("not done"),
        date_filters: scan_date_filters(body),
        group_by: parse_group_by(body),
        sort_by: find_keyword_word(body, "sort by ")
            .map(SortBy::from_key)
            .unwrap_or_default(),
    }
}

fn parse_group_by(body: &str) -> GroupBy {
    if let Some(key) = find_keyword_word(body, "group by function task.file.") {
        return GroupBy::from_key(key);
    }
    match find_keyword_word(body, "group by ") {
        Some(key) if key != "function" => GroupBy::from_key(key),
        _ => GroupBy::None,
    }
}

/// First occurrence of `keyword` immediately followed by a word
/// (`[A-Za-z0-9_]+`); returns that word.
fn find_keyword_word<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    text.match_indices(keyword).find_map(|(k, _)| {
        let start = k + keyword.len();
        let len = text.as_bytes()[start..]
            .iter()
            .take_while(|b| is_word(**b))
            .count();
        (len > 0).then(|| &text[start..start + len])
    })
}

/// All date clauses, left to right, non-overlapping.
fn scan_date_filters(text: &str) -> Vec<DateFilter> {
    let mut filters = Vec::new();
    let mut i = 0;
    while i < text.len() {
        if let Some((filter, end)) = date_filter_at(text, i) {
            filters.push(filter);
            i = end;
        } else {
            i += text[i..].chars().next().map_or(1, char::len_utf8);
        }
    }
    filters
}

/// Try to read `<field> <operand>` starting exactly at `i`.
fn date_filter_at(text: &str, i: usize) -> Option<(DateFilter, usize)> {
    let rest = &text[i..];
    let field = DATE_FIELDS
        .into_iter()
        .find(|f| rest.starts_with(f.keyword()))?;
    let after_field = i + field.keyword().len();
    let operand = skip_space(text, after_field);
    if operand == after_field {
        return None;
    }

    let (op, dates, end) = if let Some((dates, end)) = relative_list_at(text, operand) {
        (DateOp::On, dates, end)
    } else if let Some((token, end)) = keyword_operand_at(text, operand, "before") {
        (DateOp::Before, vec![token], end)
    } else if let Some((token, end)) = keyword_operand_at(text, operand, "after") {
        (DateOp::After, vec![token], end)
    } else if let Some((first, mut end)) = keyword_operand_at(text, operand, "on") {
        let mut tokens = vec![first];
        while let Some((token, next)) = or_continuation_at(text, end, token_at) {
            tokens.push(token);
            end = next;
        }
        (DateOp::On, tokens, end)
    } else {
        return None;
    };

    let filter = DateFilter {
        field,
        op,
        dates: dates.into_iter().map(DateSpec::parse).collect(),
    };
    Some((filter, end))
}

/// `today`, `tomorrow` or `yesterday` at `i`
fn relative_day_at(text: &str, i: usize) -> Option<(&str, usize)> {
    let rest = &text[i..];
    RELATIVE_DAYS
        .into_iter()
        .find(|day| rest.starts_with(day))
        .map(|day| (&text[i..i + day.len()], i + day.len()))
}

/// `today[ or tomorrow[ or ...]]`
fn relative_list_at(text: &str, i: usize) -> Option<(Vec<&str>, usize)> {
    let (first, mut end) = relative_day_at(text, i)?;
    let mut days = vec![first];
    while let Some((day, next)) = or_continuation_at(text, end, relative_day_at) {
        days.push(day);
        end = next;
    }
    Some((days, end))
}

/// A run of non-whitespace at `i`
fn token_at(text: &str, i: usize) -> Option<(&str, usize)> {
    let len = text.as_bytes()[i..]
        .iter()
        .take_while(|b| !is_space(**b))
        .count();
    (len > 0).then(|| (&text[i..i + len], i + len))
}

/// `<keyword><ws><token>` at `i`
fn keyword_operand_at<'a>(text: &'a str, i: usize, keyword: &str) -> Option<(&'a str, usize)> {
    if !text[i..].starts_with(keyword) {
        return None;
    }
    let after = i + keyword.len();
    let token_start = skip_space(text, after);
    if token_start == after {
        return None;
    }
    token_at(text, token_start)
}

/// `<ws>or<ws><item>` at `i`, where the item is read by `item_at`
fn or_continuation_at<'a>(
    text: &'a str,
    i: usize,
    item_at: fn(&'a str, usize) -> Option<(&'a str, usize)>,
) -> Option<(&'a str, usize)> {
    let or_start = skip_space(text, i);
    if or_start == i || !text[or_start..].starts_with("or") {
        return None;
    }
    let after_or = or_start + 2;
    let item_start = skip_space(text, after_or);
    if item_start == after_or {
        return None;
    }
    item_at(text, item_start)
}
