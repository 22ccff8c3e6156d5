//! Reading and writing the flat `key=value` project file format.
//!
//! Lines starting with `#` or `!` are comments. The key ends at the first
//! unescaped `=` or `:`; whitespace following the separator is skipped and
//! the rest of the line is the value. Backslash escapes (`\\`, `\n`, `\r`,
//! `\t`, and `\` before any other character) make every string representable,
//! so values written by [`render`] come back from [`parse`] unchanged.

use std::collections::BTreeMap;

const HEADER: &str = "# gxp project configuration";

/// Parse the contents of a project file.
///
/// Later duplicates of a key override earlier ones.
pub fn parse(content: &str) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();

    for raw in content.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        let line = line.trim_start_matches([' ', '\t', '\u{c}']);
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        let (key, rest) = split_key(line);
        let key = trim_key_end(key);
        let rest = rest.trim_start_matches([' ', '\t', '\u{c}']);
        values.insert(unescape(key), unescape(rest));
    }

    values
}

/// Render a map into the project file format, keys in sorted order.
pub fn render(values: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(HEADER.len() + values.len() * 32);
    out.push_str(HEADER);
    out.push('\n');
    for (key, value) in values {
        out.push_str(&escape(key, true));
        out.push('=');
        out.push_str(&escape(value, false));
        out.push('\n');
    }
    out
}

/// Splits a line at the first unescaped separator.
///
/// Returns the raw (still escaped) key and the remainder after the
/// separator. A line without a separator is a key with an empty value.
fn split_key(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (idx, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '=' | ':' => return (&line[..idx], &line[idx + 1..]),
            _ => {}
        }
    }
    (line, "")
}

/// Drops unescaped trailing whitespace from a raw key.
fn trim_key_end(key: &str) -> &str {
    let trimmed = key.trim_end_matches([' ', '\t', '\u{c}']);
    if trimmed.len() == key.len() {
        return key;
    }
    let backslashes = trimmed.chars().rev().take_while(|c| *c == '\\').count();
    if backslashes % 2 == 1 {
        // the first dropped character was escaped; keep it
        let kept = trimmed.len() + 1;
        &key[..kept]
    } else {
        trimmed
    }
}

fn escape(text: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for (idx, ch) in text.chars().enumerate() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{c}' => out.push_str("\\f"),
            '=' | ':' if is_key => {
                out.push('\\');
                out.push(ch);
            }
            '#' | '!' if is_key && idx == 0 => {
                out.push('\\');
                out.push(ch);
            }
            ' ' if is_key || idx == 0 => out.push_str("\\ "),
            _ => out.push(ch),
        }
    }
    out
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('f') => out.push('\u{c}'),
            Some(other) => out.push(other),
            // dangling backslash at end of line
            None => out.push('\\'),
        }
    }
    out
}
