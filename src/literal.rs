//! Default-argument literal parser. An `ArgSpec`'s `default_literal` (C1,
//! `=DEFAULT` in a tag's `args(...)` segment) is free-form text rather than
//! a pre-parsed value, so it needs the same lowering into [`InputValue`]
//! that a query-literal argument gets from the external parser (§4.5.2
//! step 2 "the default literal ... coerced the same way"). The grammar
//! recognized here mirrors the tag parser's own bracket/quote-aware
//! splitting (C1, `tag.rs`) rather than reusing GraphQL's full literal
//! grammar, since default literals are written by the schema author in
//! the tag string, not parsed from a client query.

use indexmap::IndexMap;

use crate::value::InputValue;

/// Parses one default-literal string into an [`InputValue`]. Malformed
/// input falls back to `Null` rather than failing schema construction — a
/// default literal's grammar is already validated structurally by the tag
/// parser (C1); only its value-level shape is decoded here, lazily, at
/// first use.
pub fn parse_default_literal(raw: &str) -> InputValue {
    parse_value(raw.trim()).unwrap_or(InputValue::Null)
}

fn parse_value(s: &str) -> Option<InputValue> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    match s {
        "null" => return Some(InputValue::Null),
        "true" => return Some(InputValue::Bool(true)),
        "false" => return Some(InputValue::Bool(false)),
        _ => {}
    }
    if let Some(inner) = s.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        return Some(InputValue::String(inner.to_string()));
    }
    if let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        let mut out = Vec::new();
        for item in top_level_split(inner, ',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            out.push(parse_value(item)?);
        }
        return Some(InputValue::List(out));
    }
    if let Some(inner) = s.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
        let mut out = IndexMap::new();
        for item in top_level_split(inner, ',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let (key, rest) = find_colon(item)?;
            out.insert(key.trim().to_string(), parse_value(rest.trim())?);
        }
        return Some(InputValue::Object(out));
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(InputValue::Int(i));
    }
    if let Ok(f) = s.parse::<f64>() {
        return Some(InputValue::Float(f));
    }
    // A bare identifier that's neither a keyword nor a number is an enum
    // member literal, e.g. `=RED` (§3.1 args default on an enum-typed arg).
    Some(InputValue::Enum(s.to_string()))
}

fn find_colon(s: &str) -> Option<(&str, &str)> {
    let (idx, _) = find_top_level(s, ':')?;
    Some((&s[..idx], &s[idx + 1..]))
}

fn find_top_level(s: &str, delim: char) -> Option<(usize, char)> {
    let mut depth = 0i32;
    let mut in_string = false;
    for (idx, ch) in s.char_indices() {
        if in_string {
            if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            c if depth == 0 && c == delim => return Some((idx, c)),
            _ => {}
        }
    }
    None
}

fn top_level_split(s: &str, delim: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut start = 0usize;
    for (idx, ch) in s.char_indices() {
        if in_string {
            if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            c if depth == 0 && c == delim => {
                out.push(s[start..idx].to_string());
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    out.push(s[start..].to_string());
    out
}
