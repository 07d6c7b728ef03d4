//! JSON document helpers shared by the config tree and the search engine.
//!
//! Documents are plain [`serde_json::Value`] trees addressed with RFC 6901
//! JSON pointers (`/lro/ck/reconstructed/kernels`).

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::config::ConfigError;

/// Escape a single object key for use as a pointer token.
pub fn escape_token(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// Undo [`escape_token`].
pub fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Append `key` to `pointer`.
pub fn push_token(pointer: &str, key: &str) -> String {
    format!("{}/{}", pointer, escape_token(key))
}

/// Normalise a bare key or pointer into a pointer (`"lro"` → `"/lro"`).
pub fn to_pointer(key_or_pointer: &str) -> String {
    if key_or_pointer.is_empty() || key_or_pointer.starts_with('/') {
        key_or_pointer.to_string()
    } else {
        format!("/{}", escape_token(key_or_pointer))
    }
}

/// Pointer to the parent of `pointer` (`""` for top-level entries).
pub fn parent_pointer(pointer: &str) -> &str {
    match pointer.rfind('/') {
        Some(idx) => &pointer[..idx],
        None => "",
    }
}

/// Last token of `pointer`, unescaped.
pub fn last_token(pointer: &str) -> Option<String> {
    pointer.rfind('/').map(|idx| unescape_token(&pointer[idx + 1..]))
}

/// Split a pointer into unescaped tokens.
pub fn tokens(pointer: &str) -> Vec<String> {
    pointer
        .split('/')
        .skip(1)
        .map(unescape_token)
        .collect()
}

/// Find every occurrence of `key` below the root of `doc`.
///
/// Matches nested deeper in a subtree are listed before the subtree's own key,
/// so erasing matches in order never invalidates a later pointer.
pub fn find_key(doc: &Value, key: &str, recursive: bool) -> Vec<String> {
    let mut found = Vec::new();
    collect_key(doc, "", key, recursive, &mut found);
    found
}

fn collect_key(node: &Value, pointer: &str, key: &str, recursive: bool, found: &mut Vec<String>) {
    match node {
        Value::Object(map) => {
            for (k, child) in map {
                let child_pointer = push_token(pointer, k);
                if recursive && is_structured(child) {
                    collect_key(child, &child_pointer, key, recursive, found);
                }
                if k == key {
                    found.push(child_pointer);
                }
            }
        }
        Value::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                if recursive && is_structured(child) {
                    let child_pointer = format!("{}/{}", pointer, idx);
                    collect_key(child, &child_pointer, key, recursive, found);
                }
            }
        }
        _ => {}
    }
}

fn is_structured(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

/// Remove the entry addressed by `pointer`. Returns the removed value.
pub fn erase_at_pointer(doc: &mut Value, pointer: &str) -> Option<Value> {
    let key = last_token(pointer)?;
    let parent = doc.pointer_mut(parent_pointer(pointer))?;
    match parent {
        Value::Object(map) => map.remove(&key),
        Value::Array(items) => {
            let idx = key.parse::<usize>().ok()?;
            (idx < items.len()).then(|| items.remove(idx))
        }
        _ => None,
    }
}

/// Merge `merging` into `base`.
///
/// Objects merge key by key. When both sides hold non-objects under the same
/// key, the base value becomes an array and the merging value(s) are appended.
/// An object meeting a non-object is a structural error.
pub fn merge_configs(base: &mut Value, merging: &Value) -> Result<(), ConfigError> {
    merge_at(base, merging, "")
}

fn merge_at(base: &mut Value, merging: &Value, pointer: &str) -> Result<(), ConfigError> {
    let Some(incoming) = merging.as_object() else {
        return Err(ConfigError::InvalidMerge {
            pointer: pointer.to_string(),
        });
    };
    if base.is_null() {
        *base = Value::Object(Map::new());
    }
    let Some(target) = base.as_object_mut() else {
        return Err(ConfigError::InvalidMerge {
            pointer: pointer.to_string(),
        });
    };

    for (key, value) in incoming {
        let child_pointer = push_token(pointer, key);
        let Some(existing) = target.get_mut(key) else {
            target.insert(key.clone(), value.clone());
            continue;
        };
        if existing.is_object() != value.is_object() {
            return Err(ConfigError::InvalidMerge {
                pointer: child_pointer,
            });
        }
        if existing.is_object() {
            merge_at(existing, value, &child_pointer)?;
            continue;
        }
        if !existing.is_array() {
            let scalar = existing.take();
            *existing = Value::Array(vec![scalar]);
        }
        if let Value::Array(items) = existing {
            match value {
                Value::Array(more) => items.extend(more.iter().cloned()),
                other => items.push(other.clone()),
            }
        }
    }
    Ok(())
}

/// Merge two search result documents.
///
/// With `overwrite` the incoming document is applied as a merge patch (fields
/// are replaced wholesale). Otherwise array fields present on both sides are
/// unioned without duplicates, comparing by exact equality, and every other
/// field takes the incoming value.
pub fn merge_results(base: &mut Value, incoming: &Value, overwrite: bool) {
    if base.is_null() {
        *base = incoming.clone();
        return;
    }
    let (Some(target), Some(source)) = (base.as_object_mut(), incoming.as_object()) else {
        *base = incoming.clone();
        return;
    };

    for (key, value) in source {
        if overwrite {
            if value.is_null() {
                target.remove(key);
            } else {
                target.insert(key.clone(), value.clone());
            }
            continue;
        }
        let union = matches!(
            (target.get(key), value),
            (Some(Value::Array(_)), Value::Array(_))
        );
        if !union {
            target.insert(key.clone(), value.clone());
            continue;
        }
        if let (Some(Value::Array(existing)), Value::Array(more)) = (target.get_mut(key), value) {
            let mut seen: HashSet<String> = existing.iter().map(|v| v.to_string()).collect();
            for item in more {
                if seen.insert(item.to_string()) {
                    existing.push(item.clone());
                }
            }
        }
    }
}

/// Read a string or array of strings at `pointer`.
pub fn string_list(doc: &Value, pointer: &str) -> Result<Vec<String>, ConfigError> {
    let value = doc
        .pointer(pointer)
        .ok_or_else(|| ConfigError::MissingPointer(pointer.to_string()))?;
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ConfigError::NotAStringList(pointer.to_string()))
            })
            .collect(),
        _ => Err(ConfigError::NotAStringList(pointer.to_string())),
    }
}

/// Read a resolved kernel leaf (array of arrays of paths).
///
/// A flat array of strings is accepted as a single group.
pub fn kernel_groups(value: &Value) -> Vec<Vec<String>> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    if items.iter().all(Value::is_string) {
        let group: Vec<String> = items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        return if group.is_empty() { Vec::new() } else { vec![group] };
    }
    items
        .iter()
        .filter_map(Value::as_array)
        .map(|group| {
            group
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect::<Vec<_>>()
        })
        .filter(|group| !group.is_empty())
        .collect()
}

/// All kernel paths under every `kernels` leaf of `doc`, in document order,
/// without duplicates.
pub fn flatten_kernels(doc: &Value) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for pointer in find_key(doc, "kernels", true) {
        if let Some(leaf) = doc.pointer(&pointer) {
            for path in kernel_groups(leaf).into_iter().flatten() {
                if seen.insert(path.clone()) {
                    out.push(path);
                }
            }
        }
    }
    out
}
