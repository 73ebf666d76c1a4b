//! Locating, parsing and rendering the id enums inside `opnpool_ids.h`.

use std::ops::Range;

use regex::Regex;

use super::SyncError;
use crate::catalog::member_name;
use crate::catalog::Category;
use crate::catalog::MAX_MEMBERS;

/// Pattern matching the whole declaration of `category`'s enum.
///
/// `switch_id_t` and the older `SwitchId` and `Switchid` spellings are
/// accepted, with any fixed-width unsigned storage type. Forward
/// declarations (no body) never match. Braces inside comments do not end
/// the body.
pub fn block_pattern(category: Category) -> Regex {
    let [camel, flat] = category.legacy_enum_names();
    let pattern = format!(
        r"(?s)enum\s+class\s+(?:{}|{}|{})\s*:\s*(?:std::)?uint(?:8|16|32|64)_t\s*\{{((?://[^\n]*|/\*.*?\*/|[^}}/]|/[^/*}}])*)\}}\s*;",
        regex::escape(&category.enum_name()),
        regex::escape(&camel),
        regex::escape(&flat),
    );
    // Built from escaped identifiers around a fixed skeleton
    Regex::new(&pattern).expect("enum block pattern is valid")
}

/// A located enum declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumBlock {
    /// Byte range of the whole declaration in the header
    pub span: Range<usize>,
    /// Byte range of the text between the braces
    pub body: Range<usize>,
}

/// Every declaration of `category`'s enum in `content`, in file order
pub fn locate_blocks(content: &str, category: Category) -> Vec<EnumBlock> {
    block_pattern(category)
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let body = caps.get(1)?;
            Some(EnumBlock {
                span: whole.range(),
                body: body.range(),
            })
        })
        .collect()
}

/// Line ending to render `block` with: its own, or the header's first
/// line ending when the declaration sits on one line
pub fn line_ending(content: &str, block: &EnumBlock) -> &'static str {
    let text = &content[block.span.clone()];
    let sample = if text.contains('\n') { text } else { content };
    match sample.find('\n') {
        Some(i) if sample[..i].ends_with('\r') => "\r\n",
        _ => "\n",
    }
}

/// Render the canonical declaration for `keys`, lines joined by `newline`.
///
/// ```text
/// enum class switch_id_t : uint8_t {
///     SPA = 0,
///     AUX1 = 1,
/// };
/// ```
pub fn render_block(
    category: Category,
    keys: &[String],
    newline: &str,
) -> Result<String, SyncError> {
    if keys.len() > MAX_MEMBERS {
        return Err(SyncError::TooManyMembers {
            category,
            count: keys.len(),
        });
    }

    let mut lines = Vec::with_capacity(keys.len() + 2);
    lines.push(format!("enum class {} : uint8_t {{", category.enum_name()));
    for (ordinal, key) in keys.iter().enumerate() {
        lines.push(format!("    {} = {},", member_name(key), ordinal));
    }
    lines.push("};".to_string());

    Ok(lines.join(newline))
}

/// Members of an enum body with their values, following C++ rules for
/// implicit values (one more than the previous member, starting at 0).
///
/// Returns `None` when the body contains something other than plain
/// `NAME` / `NAME = <integer>` members.
pub fn parse_members(body: &str) -> Option<Vec<(String, u64)>> {
    let stripped = strip_comments(body);
    let mut members = Vec::new();
    let mut next = 0u64;

    for item in stripped.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }

        let (name, value) = match item.split_once('=') {
            Some((name, value)) => (name.trim(), parse_integer(value.trim())?),
            None => (item, next),
        };

        if !is_identifier(name) {
            return None;
        }

        members.push((name.to_string(), value));
        next = value + 1;
    }

    Some(members)
}

fn parse_integer(text: &str) -> Option<u64> {
    let text = text.trim_end_matches(['u', 'U']);
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("//") {
            rest = after.find('\n').map_or("", |i| &after[i..]);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.find("*/").map_or("", |i| &after[i + 2..]);
            out.push(' ');
        } else {
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                out.push(c);
            }
            rest = chars.as_str();
        }
    }

    out
}
