//! Response extraction helpers
//!
//! Gemini answers with a multi-line body: an anti-XSSI prefix (`)]}'`),
//! chunk length lines, and one or more JSON arrays of frames shaped like
//! `["wrb.fr", null, "<json string>", ...]`. The schema is undocumented and
//! positional, so every field access goes through [`get_path`], which treats
//! a missing, null or mistyped step as "absent" instead of failing.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Could not find a valid JSON object or array in the response")]
pub struct ParseError;

/// One step of a lookup path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSeg<'a> {
    Index(usize),
    Key(&'a str),
}

impl From<usize> for PathSeg<'_> {
    fn from(index: usize) -> Self {
        PathSeg::Index(index)
    }
}

impl<'a> From<&'a str> for PathSeg<'a> {
    fn from(key: &'a str) -> Self {
        PathSeg::Key(key)
    }
}

fn parse_container(line: &str) -> Option<Value> {
    let line = line.trim();
    if !(line.starts_with('[') || line.starts_with('{')) {
        return None;
    }
    serde_json::from_str::<Value>(line)
        .ok()
        .filter(|v| v.is_array() || v.is_object())
}

/// Return the first line of `text` that parses as a JSON array or object.
pub fn extract_json(text: &str) -> Result<Value, ParseError> {
    text.lines().find_map(parse_container).ok_or(ParseError)
}

/// Collect every frame from every JSON line of `text`, in stream order.
///
/// A line is normally an array of frames. A line whose first element is a
/// string is itself a single frame.
pub fn extract_frames(text: &str) -> Vec<Value> {
    let mut frames = Vec::new();
    for value in text.lines().filter_map(parse_container) {
        match value {
            Value::Array(items) if items.first().is_some_and(Value::is_string) => {
                frames.push(Value::Array(items));
            }
            Value::Array(items) => frames.extend(items),
            other => frames.push(other),
        }
    }
    frames
}

/// Walk `value` through `path`. Stops at the first missing, null or
/// mistyped step and returns `None`. A null leaf is also `None`.
pub fn get_in<'v>(value: &'v Value, path: &[PathSeg<'_>]) -> Option<&'v Value> {
    let mut current = value;
    for (depth, seg) in path.iter().enumerate() {
        let next = match seg {
            PathSeg::Index(i) => current.as_array().and_then(|items| items.get(*i)),
            PathSeg::Key(k) => current.as_object().and_then(|map| map.get(*k)),
        };
        match next {
            Some(v) if !v.is_null() => current = v,
            _ => {
                tracing::trace!(?path, depth, "Safe navigation ended early");
                return None;
            }
        }
    }
    if current.is_null() { None } else { Some(current) }
}

/// Index-only form of [`get_in`]; the wire format is arrays all the way down.
pub fn get_path<'v>(value: &'v Value, path: &[usize]) -> Option<&'v Value> {
    let segs: Vec<PathSeg<'_>> = path.iter().copied().map(PathSeg::Index).collect();
    get_in(value, &segs)
}

/// [`get_path`] with a fallback.
pub fn get_path_or<'v>(value: &'v Value, path: &[usize], default: &'v Value) -> &'v Value {
    get_path(value, path).unwrap_or(default)
}

pub fn get_str<'v>(value: &'v Value, path: &[usize]) -> Option<&'v str> {
    get_path(value, path).and_then(Value::as_str)
}

/// Array at `path`, or an empty slice.
pub fn get_array<'v>(value: &'v Value, path: &[usize]) -> &'v [Value] {
    get_path(value, path)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Whether the value at `path` is present and not falsy (`false`, `0`, `""`).
pub fn is_truthy(value: &Value, path: &[usize]) -> bool {
    match get_path(value, path) {
        None => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Parse the JSON string embedded at index 2 of a frame.
pub fn frame_body(frame: &Value) -> Option<Value> {
    let raw = get_str(frame, &[2])?;
    serde_json::from_str::<Value>(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_json_skips_framing_lines() {
        let text = ")]}'\n\n25\n[[\"wrb.fr\",null,\"[]\"]]\n";
        let value = extract_json(text).unwrap();
        assert_eq!(value, json!([["wrb.fr", null, "[]"]]));
    }

    #[test]
    fn extract_json_fails_without_container_line() {
        assert_eq!(extract_json(")]}'\n42\nnot json"), Err(ParseError));
        assert_eq!(extract_json(""), Err(ParseError));
    }

    #[test]
    fn extract_frames_flattens_lines_and_accepts_bare_frames() {
        let text = ")]}'\n[[\"wrb.fr\",null,\"a\"],[\"di\",1]]\n12\n[\"wrb.fr\",null,\"b\"]\n";
        let frames = extract_frames(text);
        assert_eq!(frames.len(), 3);
        assert_eq!(get_str(&frames[2], &[2]), Some("b"));
    }

    #[test]
    fn get_path_never_fails() {
        let value = json!([1, [2, null, {"k": [3]}], "s"]);
        let cases: &[&[usize]] = &[
            &[],
            &[9],
            &[0, 0],
            &[1, 1, 0],
            &[1, 2, 0],
            &[2, 0],
            &[1, 0, 5, 5, 5],
        ];
        for path in cases.iter().skip(1) {
            assert_eq!(get_path(&value, path), None, "path {path:?}");
        }
        assert_eq!(get_path(&value, cases[0]), Some(&value));
        assert_eq!(get_path(&json!(null), &[]), None);
    }

    #[test]
    fn get_path_or_returns_default_on_miss() {
        let fallback = json!("default");
        let value = json!([[1]]);
        assert_eq!(get_path_or(&value, &[0, 3], &fallback), &fallback);
        assert_eq!(get_path_or(&value, &[0, 0], &fallback), &json!(1));
    }

    #[test]
    fn get_in_mixes_keys_and_indices() {
        let value = json!({"a": [{"b": "c"}]});
        let path = [PathSeg::from("a"), PathSeg::Index(0), PathSeg::from("b")];
        assert_eq!(get_in(&value, &path), Some(&json!("c")));
        let bad = [PathSeg::Index(0), PathSeg::Key("a")];
        assert_eq!(get_in(&value, &bad), None);
    }

    #[test]
    fn truthiness_follows_wire_conventions() {
        let value = json!([0, "", [], false, 1, "x"]);
        assert!(!is_truthy(&value, &[0]));
        assert!(!is_truthy(&value, &[1]));
        assert!(is_truthy(&value, &[2]));
        assert!(!is_truthy(&value, &[3]));
        assert!(is_truthy(&value, &[4]));
        assert!(is_truthy(&value, &[5]));
        assert!(!is_truthy(&value, &[6]));
    }
}
