//! Tag parser (C1).
//!
//! Decodes the per-field metadata string attached to a record field into a
//! [`ParsedTag`]. The grammar is deliberately forgiving of nested
//! brackets and quoted strings inside argument defaults, since a default
//! literal may itself be a GraphQL-ish structured value.

use crate::error::TagError;

/// One parsed `args(...)` entry: `NAME[:TYPE][=DEFAULT][#DESCRIPTION]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: String,
    pub type_annotation: Option<String>,
    pub default_literal: Option<String>,
    pub description: Option<String>,
}

/// The decoded form of one field's tag string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedTag {
    pub name: Option<String>,
    pub gql_type_name: Option<String>,
    pub args: Option<Vec<ArgSpec>>,
    pub subscript: Option<String>,
    pub field_id: Option<String>,
    pub base: i64,
    pub nullable: bool,
    pub no_cache: bool,
    pub description: Option<String>,
}

/// Parses one tag string. `Ok(None)` means the field is omitted (tag is
/// exactly `-`).
pub fn parse_tag(raw: &str) -> Result<Option<ParsedTag>, TagError> {
    if raw == "-" {
        return Ok(None);
    }

    let (body, description) = strip_description(raw);
    let segments = top_level_split(body, ',');

    let mut tag = ParsedTag {
        description,
        ..ParsedTag::default()
    };

    for (i, raw_seg) in segments.iter().enumerate() {
        let seg = raw_seg.trim();
        if seg.is_empty() {
            continue; // rule 2: empty segments ignored
        }

        if i == 0 {
            if seg.starts_with('(') {
                let inner = strip_outer_parens(seg).ok_or_else(|| TagError::new(raw, seg))?;
                tag.args = Some(parse_args_inner(raw, inner)?);
                continue;
            }
            let (name_part, type_part) = split_name_type(seg);
            if !name_part.is_empty() {
                tag.name = Some(name_part.to_string());
            }
            if let Some(t) = type_part {
                tag.gql_type_name = Some(t.to_string());
            }
            continue;
        }

        if let Some(inner) = seg.strip_prefix("args(").and_then(|s| s.strip_suffix(')')) {
            tag.args = Some(parse_args_inner(raw, inner)?);
        } else if seg == "subscript" {
            tag.subscript = Some("id".to_string());
        } else if let Some(rest) = seg.strip_prefix("subscript=") {
            tag.subscript = Some(rest.to_string());
        } else if seg == "field_id" {
            tag.field_id = Some("id".to_string());
        } else if let Some(rest) = seg.strip_prefix("field_id=") {
            tag.field_id = Some(rest.to_string());
        } else if let Some(rest) = seg.strip_prefix("base=") {
            tag.base = rest
                .parse::<i64>()
                .map_err(|_| TagError::new(raw, seg))?;
        } else if seg == "nullable" {
            tag.nullable = true;
        } else if seg == "no_cache" {
            tag.no_cache = true;
        } else {
            return Err(TagError::new(raw, seg));
        }
    }

    validate_cross_segment(raw, &tag)?;
    Ok(Some(tag))
}

fn validate_cross_segment(raw: &str, tag: &ParsedTag) -> Result<(), TagError> {
    if tag.subscript.is_some() && tag.args.is_some() {
        return Err(TagError::new(raw, "subscript+args"));
    }
    if tag.subscript.is_some() && tag.field_id.is_some() {
        return Err(TagError::new(raw, "subscript+field_id"));
    }
    if tag.base != 0 && tag.subscript.is_none() && tag.field_id.is_none() {
        return Err(TagError::new(raw, "base"));
    }
    Ok(())
}

/// `NAME[:TYPE]=DEFAULT[#DESC]` item inside `args(...)`.
fn parse_args_inner(raw: &str, inner: &str) -> Result<Vec<ArgSpec>, TagError> {
    let items = top_level_split(inner, ',');
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim();
        if item.is_empty() {
            continue; // `args()` with stray whitespace is still zero arguments
        }
        let (body, description) = strip_description(item);

        // NAME is everything up to the first top-level ':' or '='.
        let (name_end, delim) = match find_top_level(body, &[':', '=']) {
            Some(pair) => pair,
            None => (body.len(), '\0'),
        };
        let name = body[..name_end].trim().to_string();
        if name.is_empty() {
            return Err(TagError::new(raw, item));
        }
        let mut rest = &body[name_end..];

        let mut type_annotation = None;
        if delim == ':' {
            rest = &rest[1..];
            let (type_end, inner_delim) = match find_top_level(rest, &['=']) {
                Some(pair) => pair,
                None => (rest.len(), '\0'),
            };
            type_annotation = Some(rest[..type_end].trim().to_string());
            rest = &rest[type_end..];
            if inner_delim == '=' {
                rest = &rest[1..];
            }
        } else if delim == '=' {
            rest = &rest[1..];
        }

        let default_literal = if rest.trim().is_empty() {
            None
        } else {
            Some(rest.trim().to_string())
        };

        out.push(ArgSpec {
            name,
            type_annotation,
            default_literal,
            description,
        });
    }
    Ok(out)
}

/// `NAME:TYPE` at the top level of the first segment.
fn split_name_type(seg: &str) -> (&str, Option<&str>) {
    match find_top_level(seg, &[':']) {
        Some((idx, _)) => (&seg[..idx], Some(seg[idx + 1..].trim())),
        None => (seg, None),
    }
}

fn strip_outer_parens(seg: &str) -> Option<&str> {
    seg.strip_prefix('(').and_then(|s| s.strip_suffix(')'))
}

/// Splits off a trailing `#description`, honoring bracket/string nesting so
/// a `#` inside a quoted default literal doesn't truncate the segment.
fn strip_description(s: &str) -> (&str, Option<String>) {
    match find_top_level(s, &['#']) {
        Some((idx, _)) => {
            let desc = s[idx + 1..].trim();
            (
                s[..idx].trim_end(),
                if desc.is_empty() {
                    None
                } else {
                    Some(desc.to_string())
                },
            )
        }
        None => (s, None),
    }
}

/// Finds the first occurrence of any of `delims` outside of quoted strings
/// and bracket nesting, returning its byte offset and which char matched.
fn find_top_level(s: &str, delims: &[char]) -> Option<(usize, char)> {
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
            c if depth == 0 && delims.contains(&c) => return Some((idx, c)),
            _ => {}
        }
    }
    None
}

/// Splits `s` on top-level occurrences of `delim`, honoring bracket/string
/// nesting, without discarding empty segments (callers decide whether to
/// ignore them).
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omit_sentinel() {
        assert_eq!(parse_tag("-").unwrap(), None);
    }

    #[test]
    fn name_and_type() {
        let tag = parse_tag("myField:ID").unwrap().unwrap();
        assert_eq!(tag.name.as_deref(), Some("myField"));
        assert_eq!(tag.gql_type_name.as_deref(), Some("ID"));
    }

    #[test]
    fn bare_args_in_first_position() {
        let tag = parse_tag("(a:Int=1,b:String)").unwrap().unwrap();
        let args = tag.args.unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].name, "a");
        assert_eq!(args[0].type_annotation.as_deref(), Some("Int"));
        assert_eq!(args[0].default_literal.as_deref(), Some("1"));
        assert_eq!(args[1].name, "b");
        assert_eq!(args[1].default_literal, None);
    }

    #[test]
    fn named_args_segment() {
        let tag = parse_tag("slice,args(id:Int=0#index)").unwrap().unwrap();
        assert_eq!(tag.name.as_deref(), Some("slice"));
        let args = tag.args.unwrap();
        assert_eq!(args[0].description.as_deref(), Some("index"));
    }

    #[test]
    fn empty_args_means_zero_args() {
        let tag = parse_tag("f,args()").unwrap().unwrap();
        assert_eq!(tag.args, Some(vec![]));
    }

    #[test]
    fn subscript_default_name() {
        let tag = parse_tag("slice,subscript").unwrap().unwrap();
        assert_eq!(tag.subscript.as_deref(), Some("id"));
    }

    #[test]
    fn subscript_named() {
        let tag = parse_tag("slice,subscript=key").unwrap().unwrap();
        assert_eq!(tag.subscript.as_deref(), Some("key"));
    }

    #[test]
    fn base_requires_subscript() {
        assert!(parse_tag("slice,base=1").is_err());
    }

    #[test]
    fn subscript_with_args_rejected() {
        assert!(parse_tag("slice,subscript,args(a:Int)").is_err());
    }

    #[test]
    fn unknown_segment_rejected() {
        assert!(parse_tag("f,bogus").is_err());
    }

    #[test]
    fn description_with_hash_outside_brackets() {
        let tag = parse_tag("f#a top level description").unwrap().unwrap();
        assert_eq!(tag.description.as_deref(), Some("a top level description"));
    }

    #[test]
    fn hash_inside_quotes_is_not_a_description_marker() {
        let tag = parse_tag(r#"f,args(a:String="#not-a-desc")"#).unwrap().unwrap();
        let args = tag.args.unwrap();
        assert_eq!(args[0].default_literal.as_deref(), Some(r#""#not-a-desc""#));
    }

    #[test]
    fn no_cache_flag() {
        let tag = parse_tag("f,no_cache").unwrap().unwrap();
        assert!(tag.no_cache);
    }
}
