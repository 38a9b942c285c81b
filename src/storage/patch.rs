//! Dotted-path partial updates.
//!
//! A patch is an ordered list of `path -> value` assignments. `"ranking.p1"` replaces the
//! `p1` entry of the `ranking` map and leaves every other entry untouched; missing
//! intermediate objects are created.

use serde::Serialize;
use serde_json::{Map, Value};

use super::StorageError;

/// An ordered set of field assignments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldPatch {
    fields: Vec<(String, Value)>,
}

impl FieldPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `value` at `path`. Later assignments win.
    pub fn set<T: Serialize + ?Sized>(&mut self, path: &str, value: &T) -> Result<(), StorageError> {
        validate_path(path)?;
        self.fields.push((path.to_string(), serde_json::to_value(value)?));
        Ok(())
    }

    /// Merge another patch's assignments after this one's.
    pub fn extend(&mut self, other: FieldPatch) {
        self.fields.extend(other.fields);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(p, _)| p.as_str())
    }

    /// Apply every assignment to a JSON document.
    pub fn apply(&self, target: &mut Value) -> Result<(), StorageError> {
        for (path, value) in &self.fields {
            set_path(target, path, value.clone())?;
        }
        Ok(())
    }
}

fn validate_path(path: &str) -> Result<(), StorageError> {
    if path.is_empty() || path.split('.').any(|segment| segment.is_empty()) {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}

fn set_path(target: &mut Value, path: &str, value: Value) -> Result<(), StorageError> {
    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| StorageError::InvalidPath(path.to_string()))?;

    let mut current = target;
    for segment in parents {
        let object = as_object(current, path)?;
        current = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
    }

    as_object(current, path)?.insert(last.to_string(), value);
    Ok(())
}

fn as_object<'a>(value: &'a mut Value, path: &str) -> Result<&'a mut Map<String, Value>, StorageError> {
    value
        .as_object_mut()
        .ok_or_else(|| StorageError::InvalidPath(format!("{} crosses a non-object value", path)))
}
