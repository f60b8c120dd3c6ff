//! Isolates a single statement from raw generator output

use super::scan::Layout;

/// Reduce generator output to one trimmed SQL statement.
///
/// Code fences are dropped, leading prose before the first `SELECT` (or
/// `WITH name AS (`) is discarded and the text is cut at the first semicolon
/// outside a single-quoted literal. The terminating semicolon itself is not
/// kept. Text without a statement start is returned trimmed but otherwise
/// untouched; the validator rejects it later.
pub fn extract_statement(raw: &str) -> String {
    let text = strip_fences(raw.trim());

    let start = regex!(r"(?i)\bSELECT\b|\bWITH\s+(?:RECURSIVE\s+)?\w+\s+AS\s*\(");
    let Some(m) = start.find(text) else {
        return text.to_string();
    };

    let mut sql = &text[m.start()..];
    if let Some(fence) = sql.find("```") {
        sql = &sql[..fence];
    }

    truncate_at_terminator(sql).trim().to_string()
}

fn strip_fences(text: &str) -> &str {
    let opening = regex!(r"^```(?:[A-Za-z0-9_-]*[ \t]*\r?\n)?");
    let text = match opening.find(text) {
        Some(m) => &text[m.end()..],
        None => text,
    };
    let text = text.trim_end();
    text.strip_suffix("```").unwrap_or(text).trim()
}

/// Everything before the first semicolon that is not inside a literal
fn truncate_at_terminator(sql: &str) -> &str {
    let layout = Layout::new(sql);
    sql.bytes()
        .enumerate()
        .find(|&(i, b)| b == b';' && !layout.in_literal(i))
        .map(|(i, _)| &sql[..i])
        .unwrap_or(sql)
}
