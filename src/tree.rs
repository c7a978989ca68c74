//! Key/value tree operations used while merging sources.
//!
//! The merged tree is a `serde_json::Value` object whose maps keep insertion
//! order. Keys are addressed by dotted paths (`server.url`). Values below a
//! path are opaque: the tree never interprets them beyond the scalar coercion
//! applied to raw strings coming from the environment or the command line.

use serde_json::{Map, Value};

/// Deep merge two values, with `overlay` taking precedence over `base`.
///
/// - Objects are merged recursively: keys in overlay override keys in base
/// - Arrays, strings, numbers, booleans are replaced entirely
/// - If overlay is null, the base value is preserved (null means "not specified")
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = if let Some(base_value) = base_map.remove(&key) {
                    deep_merge(base_value, overlay_value)
                } else {
                    overlay_value
                };
                base_map.insert(key, merged_value);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Look up the value at a dotted key path.
pub fn get_path<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(tree, |node, segment| node.as_object()?.get(segment))
}

/// Set the value at a dotted key path, creating intermediate objects.
///
/// A non-object value sitting on an intermediate segment is replaced by an
/// object: the more specific key wins.
pub fn set_path(tree: &mut Value, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut node = tree;
    while let Some(segment) = segments.next() {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            unreachable!("node was just made an object");
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// Remove the value at a dotted key path, returning it.
pub fn remove_path(tree: &mut Value, path: &str) -> Option<Value> {
    match path.rsplit_once('.') {
        Some((parent, leaf)) => {
            let mut node = tree;
            for segment in parent.split('.') {
                node = node.as_object_mut()?.get_mut(segment)?;
            }
            node.as_object_mut()?.shift_remove(leaf)
        }
        None => tree.as_object_mut()?.shift_remove(path),
    }
}

/// Enumerate every leaf key path in declaration order.
///
/// Objects are walked; every other value (including arrays and empty
/// objects) is a leaf. This is the schema walk used to derive environment
/// variable names from a serialized configuration.
pub fn leaf_keys(tree: &Value) -> Vec<String> {
    let mut keys = Vec::new();
    if let Value::Object(map) = tree {
        collect_leaves(map, "", &mut keys);
    }
    keys
}

fn collect_leaves(map: &Map<String, Value>, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(child) if !child.is_empty() => collect_leaves(child, &path, out),
            _ => out.push(path),
        }
    }
}

/// Convert a raw string into a tree value shaped like `existing`.
///
/// Environment variables and flag values arrive as strings. When the target
/// path already holds a bool, number or sequence the string is parsed as
/// that type; sequences are comma-separated. Without a typed existing value
/// the string is kept verbatim and [`lenient`](crate::lenient) converts it
/// when the tree is decoded into the target type. A string that does not
/// parse is also kept, so the final decode reports the mismatch.
pub fn coerce(raw: &str, existing: Option<&Value>) -> Value {
    match existing {
        Some(Value::String(_)) => Value::String(raw.to_string()),
        Some(Value::Bool(_)) => parse_bool(raw)
            .map(Value::Bool)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        Some(Value::Number(_)) => {
            parse_number(raw.trim()).unwrap_or_else(|| Value::String(raw.to_string()))
        }
        Some(Value::Array(items)) => {
            let element = items.first();
            let parts = raw
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| coerce(part, element))
                .collect();
            Value::Array(parts)
        }
        Some(Value::Object(_)) | Some(Value::Null) | None => Value::String(raw.to_string()),
    }
}

/// Parse the usual spellings of a boolean; the empty string is false.
pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_number(raw: &str) -> Option<Value> {
    if let Ok(n) = raw.parse::<i64>() {
        return Some(Value::from(n));
    }
    if let Ok(n) = raw.parse::<u64>() {
        return Some(Value::from(n));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}
