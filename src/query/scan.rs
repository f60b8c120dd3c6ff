//! Literal- and parenthesis-aware scanning of SQL text
//!
//! The repair rules never build a syntax tree. They locate clause boundaries
//! (SELECT list, FROM/JOIN, WHERE, GROUP BY, HAVING, ORDER BY, LIMIT) by
//! scanning for keywords at nesting depth zero, skipping anything inside
//! single-quoted literals or parentheses.

use std::ops::Range;

use regex::{Captures, Match, Regex};

/// Per-byte nesting depth of a SQL string.
///
/// `None` marks bytes inside a single-quoted literal (quotes included). A
/// quote preceded by a backslash does not open or close a literal.
#[derive(Debug, Clone)]
pub struct Layout {
    depth: Vec<Option<i32>>,
}

impl Layout {
    pub fn new(sql: &str) -> Self {
        let bytes = sql.as_bytes();
        let mut depth = Vec::with_capacity(bytes.len());
        let mut level = 0i32;
        let mut in_literal = false;

        for (i, &b) in bytes.iter().enumerate() {
            let escaped = i > 0 && bytes[i - 1] == b'\\';
            if in_literal {
                depth.push(None);
                if b == b'\'' && !escaped {
                    in_literal = false;
                }
                continue;
            }
            match b {
                b'\'' if !escaped => {
                    in_literal = true;
                    depth.push(None);
                }
                b'(' => {
                    depth.push(Some(level));
                    level += 1;
                }
                b')' => {
                    level -= 1;
                    depth.push(Some(level));
                }
                _ => depth.push(Some(level)),
            }
        }

        Self { depth }
    }

    /// Nesting depth at a byte offset, `None` inside a literal
    #[inline]
    pub fn depth_at(&self, idx: usize) -> Option<i32> {
        self.depth.get(idx).copied().flatten()
    }

    #[inline]
    pub fn is_top_level(&self, idx: usize) -> bool {
        self.depth_at(idx) == Some(0)
    }

    #[inline]
    pub fn in_literal(&self, idx: usize) -> bool {
        matches!(self.depth.get(idx), Some(None))
    }
}

/// Top-level clauses of a single SELECT statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    Select,
    From,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
    Offset,
}

impl Clause {
    fn from_keyword(keyword: &str) -> Option<Self> {
        let upper = keyword.to_ascii_uppercase();
        let first = upper.split_whitespace().next()?;
        Some(match first {
            "SELECT" => Clause::Select,
            "FROM" => Clause::From,
            "WHERE" => Clause::Where,
            "GROUP" => Clause::GroupBy,
            "HAVING" => Clause::Having,
            "ORDER" => Clause::OrderBy,
            "LIMIT" => Clause::Limit,
            "OFFSET" => Clause::Offset,
            _ => return None,
        })
    }
}

/// Location of one clause: `keyword` covers e.g. `GROUP BY`, `body` runs up to
/// the next top-level clause keyword (whitespace included).
#[derive(Debug, Clone)]
pub struct ClauseSpan {
    pub clause: Clause,
    pub keyword: Range<usize>,
    pub body: Range<usize>,
}

/// Clause map of the outermost query
#[derive(Debug, Clone)]
pub struct Clauses {
    spans: Vec<ClauseSpan>,
    end: usize,
}

impl Clauses {
    pub fn parse(sql: &str) -> Self {
        Self::parse_with(sql, &Layout::new(sql))
    }

    pub fn parse_with(sql: &str, layout: &Layout) -> Self {
        let keyword = regex!(
            r"(?i)\b(SELECT|FROM|WHERE|GROUP\s+BY|HAVING|ORDER\s+BY|LIMIT|OFFSET|UNION|INTERSECT|EXCEPT)\b"
        );
        let mut end = statement_end(sql);
        let mut found: Vec<(Clause, Range<usize>)> = Vec::new();

        for m in keyword.find_iter(sql) {
            if m.start() >= end || !layout.is_top_level(m.start()) {
                continue;
            }
            let word = m.as_str().to_ascii_uppercase();
            if matches!(word.as_str(), "UNION" | "INTERSECT" | "EXCEPT") {
                end = m.start();
                break;
            }
            if word == "FROM" && sql[..m.start()].trim_end().to_ascii_uppercase().ends_with("DISTINCT") {
                // IS [NOT] DISTINCT FROM
                continue;
            }
            let Some(clause) = Clause::from_keyword(&word) else {
                continue;
            };
            if found.iter().any(|(c, _)| *c == clause) {
                continue;
            }
            found.push((clause, m.range()));
        }

        let mut spans = Vec::with_capacity(found.len());
        for (i, (clause, keyword)) in found.iter().enumerate() {
            let body_end = found.get(i + 1).map(|(_, r)| r.start).unwrap_or(end).max(keyword.end);
            spans.push(ClauseSpan {
                clause: *clause,
                keyword: keyword.clone(),
                body: keyword.end..body_end,
            });
        }

        Self { spans, end }
    }

    pub fn get(&self, clause: Clause) -> Option<&ClauseSpan> {
        self.spans.iter().find(|s| s.clause == clause)
    }

    pub fn has(&self, clause: Clause) -> bool {
        self.get(clause).is_some()
    }

    /// Trimmed body text of a clause
    pub fn body<'a>(&self, sql: &'a str, clause: Clause) -> Option<&'a str> {
        self.get(clause).map(|s| sql[s.body.clone()].trim())
    }

    /// Trimmed byte range of a clause body
    pub fn body_range(&self, sql: &str, clause: Clause) -> Option<Range<usize>> {
        self.get(clause).map(|s| trim_range(sql, s.body.clone()))
    }

    /// End of the statement proper (trailing semicolons and whitespace excluded)
    pub fn end(&self) -> usize {
        self.end
    }

    /// Byte offset just after the text that precedes the first present clause
    /// of `before`, or the statement end when none of them is present.
    pub fn insertion_point(&self, sql: &str, before: &[Clause]) -> usize {
        let at = self
            .spans
            .iter()
            .filter(|s| before.contains(&s.clause))
            .map(|s| s.keyword.start)
            .min()
            .unwrap_or(self.end);
        sql[..at].trim_end().len()
    }
}

/// Offset after the statement body, ignoring trailing semicolons and whitespace
pub fn statement_end(sql: &str) -> usize {
    let mut s = sql.trim_end();
    while let Some(rest) = s.strip_suffix(';') {
        s = rest.trim_end();
    }
    s.len()
}

/// Shrink a range so it excludes surrounding whitespace
pub fn trim_range(sql: &str, range: Range<usize>) -> Range<usize> {
    let text = &sql[range.clone()];
    let start = range.start + (text.len() - text.trim_start().len());
    let end = range.start + text.trim_end().len();
    start..end.max(start)
}

/// Split on commas at depth zero (outside literals and parentheses)
pub fn split_items(list: &str) -> Vec<String> {
    let layout = Layout::new(list);
    let mut items = Vec::new();
    let mut start = 0;
    for (i, b) in list.bytes().enumerate() {
        if b == b',' && layout.is_top_level(i) {
            items.push(list[start..i].trim().to_string());
            start = i + 1;
        }
    }
    let last = list[start..].trim();
    if !last.is_empty() || !items.is_empty() {
        items.push(last.to_string());
    }
    items
}

/// First match of `re` whose start is at depth zero
pub fn find_top_level<'a>(sql: &'a str, layout: &Layout, re: &Regex) -> Option<Match<'a>> {
    re.find_iter(sql).find(|m| layout.is_top_level(m.start()))
}

/// True if `re` matches somewhere outside a string literal
pub fn matches_outside_literals(sql: &str, re: &Regex) -> bool {
    let layout = Layout::new(sql);
    re.find_iter(sql).any(|m| !layout.in_literal(m.start()))
}

/// `Regex::replace_all`, skipping matches that start inside a string literal
pub fn replace_outside_literals(sql: &str, re: &Regex, replacement: &str) -> String {
    let layout = Layout::new(sql);
    re.replace_all(sql, |caps: &Captures| {
        let whole = caps.get(0).map(|m| (m.start(), m.as_str())).unwrap_or((0, ""));
        if layout.in_literal(whole.0) {
            whole.1.to_string()
        } else {
            let mut out = String::new();
            caps.expand(replacement, &mut out);
            out
        }
    })
    .into_owned()
}

/// Replace a byte range with new text
pub fn splice(sql: &str, range: Range<usize>, text: &str) -> String {
    let mut out = String::with_capacity(sql.len() + text.len());
    out.push_str(&sql[..range.start]);
    out.push_str(text);
    out.push_str(&sql[range.end..]);
    out
}

/// The SELECT list of the outermost query, split into items
#[derive(Debug, Clone)]
pub struct SelectList {
    /// Trimmed range of the list inside the statement
    pub range: Range<usize>,
    /// `DISTINCT ` / `DISTINCT ON (...) ` prefix, if any
    pub prefix: String,
    pub items: Vec<String>,
}

impl SelectList {
    pub fn of(sql: &str, clauses: &Clauses) -> Option<Self> {
        let range = clauses.body_range(sql, Clause::Select)?;
        let body = &sql[range.clone()];
        let distinct = regex!(r"(?i)^DISTINCT(?:\s+ON\s*\([^)]*\))?\s+");
        let (prefix, list) = match distinct.find(body) {
            Some(m) => (body[..m.end()].to_string(), &body[m.end()..]),
            None => (String::new(), body),
        };
        Some(Self {
            range,
            prefix,
            items: split_items(list),
        })
    }

    pub fn render(&self) -> String {
        format!("{}{}", self.prefix, self.items.join(", "))
    }

    /// Statement with this list written back in place
    pub fn write_back(&self, sql: &str) -> String {
        splice(sql, self.range.clone(), &self.render())
    }
}

/// Collapse runs of whitespace and uppercase, for comparing expressions
pub fn normalize(expr: &str) -> String {
    expr.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace("( ", "(")
        .replace(" )", ")")
        .to_ascii_uppercase()
}

/// True if the word after a table name in FROM/JOIN is an alias and not the
/// next keyword
pub fn is_alias_word(word: &str) -> bool {
    const RESERVED: &[&str] = &[
        "WHERE", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "OUTER", "ON", "GROUP",
        "ORDER", "HAVING", "LIMIT", "OFFSET", "UNION", "NATURAL", "USING", "WINDOW", "AS",
    ];
    !word.is_empty() && !RESERVED.iter().any(|k| k.eq_ignore_ascii_case(word))
}
