//! Minimal JSONPath-style extraction over `serde_json` values.
//!
//! Supports dot access (`data.items`), bracket indexing (`items[0]`) and
//! the `[*]` wildcard (`data[*].id`). Lookups never fail: a type mismatch
//! or missing key simply produces no matches.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
}

fn parse_path(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();

    for part in path.split('.') {
        if part.is_empty() {
            continue;
        }

        // Split off bracket suffixes: "items[0][*]" -> key "items", [0], [*]
        let mut rest = part;
        if let Some(bracket) = rest.find('[') {
            let key = &rest[..bracket];
            if !key.is_empty() && key != "$" {
                segments.push(Segment::Key(key.to_string()));
            }
            rest = &rest[bracket..];
            while let Some(end) = rest.find(']') {
                let inner = &rest[1..end];
                if inner == "*" {
                    segments.push(Segment::Wildcard);
                } else if let Ok(idx) = inner.parse::<usize>() {
                    segments.push(Segment::Index(idx));
                } else {
                    // Quoted key form: ['name'] / ["name"]
                    let trimmed = inner.trim_matches(|c| c == '\'' || c == '"');
                    segments.push(Segment::Key(trimmed.to_string()));
                }
                rest = &rest[end + 1..];
                if !rest.starts_with('[') {
                    break;
                }
            }
        } else if part == "*" {
            segments.push(Segment::Wildcard);
        } else if part != "$" {
            segments.push(Segment::Key(part.to_string()));
        }
    }

    segments
}

fn walk<'a>(value: &'a Value, segments: &[Segment], out: &mut Vec<&'a Value>) {
    let Some((head, tail)) = segments.split_first() else {
        out.push(value);
        return;
    };

    match head {
        Segment::Key(key) => {
            if let Value::Object(map) = value {
                if let Some(child) = map.get(key) {
                    walk(child, tail, out);
                }
            }
        }
        Segment::Index(idx) => {
            if let Value::Array(items) = value {
                if let Some(child) = items.get(*idx) {
                    walk(child, tail, out);
                }
            }
        }
        Segment::Wildcard => match value {
            Value::Array(items) => {
                for child in items {
                    walk(child, tail, out);
                }
            }
            Value::Object(map) => {
                for child in map.values() {
                    walk(child, tail, out);
                }
            }
            _ => {}
        },
    }
}

/// Return every match for `path` within `document`. Never errors; a path
/// that matches nothing returns an empty vec.
pub fn find_values(path: &str, document: &Value) -> Vec<Value> {
    let segments = parse_path(path);
    let mut matches = Vec::new();
    walk(document, &segments, &mut matches);
    matches.into_iter().cloned().collect()
}

/// Convenience lookup with the collapse rule the rest of the engine relies
/// on: a single match comes back as the bare value, multiple matches as a
/// list, zero matches as `None`. `None` or `"$"` returns the document
/// unchanged. This asymmetry lets one selector config serve both record
/// arrays (`"items"`) and scalar metadata (`"total"`).
pub fn extract_value(document: &Value, path: Option<&str>) -> Option<Value> {
    let path = match path {
        None | Some("$") | Some("") => return Some(document.clone()),
        Some(p) => p,
    };

    let mut matches = find_values(path, document);
    match matches.len() {
        0 => None,
        1 => Some(matches.remove(0)),
        _ => Some(Value::Array(matches)),
    }
}
