// Nested validation errors and the field checks that produce them.
// Error bodies mirror the request shape: objects are keyed by field name,
// list items by their index, and leaves hold a list of messages.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::value::parse_iso_datetime;

pub const NON_FIELD_ERRORS: &str = "non_field_errors";
pub const REQUIRED: &str = "This field is required.";
pub const MAY_NOT_BE_NULL: &str = "This field may not be null.";
pub const MAY_NOT_BE_BLANK: &str = "This field may not be blank.";
pub const NOT_A_STRING: &str = "Not a valid string.";
pub const INVALID_UUID: &str = "Must be a valid UUID.";
pub const INVALID_DATETIME: &str = "Datetime has wrong format. Use one of these formats instead: \
     YYYY-MM-DDThh:mm[:ss[.uuuuuu]][+HH:MM|-HH:MM|Z].";

/// A tree of field errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorTree {
    messages: Vec<String>,
    children: BTreeMap<String, ErrorTree>,
}

impl ErrorTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a message directly at this node
    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Adds a message under `field`
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.child(field).push(message);
    }

    /// Returns the subtree for `field`, creating it if needed
    pub fn child(&mut self, field: impl Into<String>) -> &mut ErrorTree {
        self.children.entry(field.into()).or_default()
    }

    /// Stores `result` when it is ok, otherwise records the message under `field`
    pub fn check<T>(&mut self, field: &str, result: Result<T, String>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(message) => {
                self.add(field, message);
                None
            }
        }
    }

    /// Grafts `other` under `field`, merging with anything already there
    pub fn nest(&mut self, field: impl Into<String>, other: ErrorTree) {
        if !other.is_empty() {
            self.child(field).merge(other);
        }
    }

    pub fn merge(&mut self, other: ErrorTree) {
        self.messages.extend(other.messages);
        for (key, subtree) in other.children {
            self.child(key).merge(subtree);
        }
    }

    /// Removes and returns the subtree at `field`
    pub fn take(&mut self, field: &str) -> Option<ErrorTree> {
        self.children.remove(field)
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn get(&self, field: &str) -> Option<&ErrorTree> {
        self.children.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.children.values().all(ErrorTree::is_empty)
    }

    /// `Ok(value)` when no errors were recorded
    pub fn finish<T>(self, value: T) -> Result<T, ErrorTree> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for ErrorTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let children: Vec<(&String, &ErrorTree)> = self
            .children
            .iter()
            .filter(|(_, subtree)| !subtree.is_empty())
            .collect();

        if children.is_empty() {
            return self.messages.serialize(serializer);
        }

        let extra: usize = usize::from(!self.messages.is_empty());
        let mut map = serializer.serialize_map(Some(children.len() + extra))?;
        if !self.messages.is_empty() {
            map.serialize_entry(NON_FIELD_ERRORS, &self.messages)?;
        }
        for (key, subtree) in children {
            map.serialize_entry(key, subtree)?;
        }
        map.end()
    }
}

// =============================================================================
// FIELD CHECKS
// =============================================================================

/// Name of a JSON value's type, used in messages
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Renders a value for messages: strings bare, everything else as JSON
pub fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A nested object; records a non-field error at this node when `value` isn't one
pub fn nested_object<'v>(value: &'v Value, errors: &mut ErrorTree) -> Option<&'v Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        other => {
            errors.add(
                NON_FIELD_ERRORS,
                format!("Invalid data. Expected a dictionary, but got {}.", type_name(other)),
            );
            None
        }
    }
}

/// A required key; missing and null both count as errors
pub fn required<'v>(
    object: &'v Map<String, Value>,
    key: &str,
    errors: &mut ErrorTree,
) -> Option<&'v Value> {
    match object.get(key) {
        None => {
            errors.add(key, REQUIRED);
            None
        }
        Some(Value::Null) => {
            errors.add(key, MAY_NOT_BE_NULL);
            None
        }
        Some(value) => Some(value),
    }
}

pub fn choice(value: &Value, choices: &[&str]) -> Result<String, String> {
    match value {
        Value::String(s) if choices.contains(&s.as_str()) => Ok(s.clone()),
        other => Err(format!("\"{}\" is not a valid choice.", display(other))),
    }
}

/// A string field; numbers are accepted and converted
pub fn char_field(value: &Value, max_length: Option<usize>, allow_blank: bool) -> Result<String, String> {
    let text: String = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return Err(NOT_A_STRING.to_string()),
    };

    if !allow_blank && text.trim().is_empty() {
        return Err(MAY_NOT_BE_BLANK.to_string());
    }

    if let Some(max) = max_length {
        if text.chars().count() > max {
            return Err(format!("Ensure this field has no more than {max} characters."));
        }
    }

    Ok(text)
}

pub fn uuid_field(value: &Value) -> Result<Uuid, String> {
    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .ok_or_else(|| INVALID_UUID.to_string())
}

pub fn datetime_field(value: &Value) -> Result<DateTime<Utc>, String> {
    value
        .as_str()
        .and_then(parse_iso_datetime)
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| INVALID_DATETIME.to_string())
}

pub fn list_field(value: &Value) -> Result<&Vec<Value>, String> {
    value.as_array().ok_or_else(|| {
        format!("Expected a list of items but got type \"{}\".", type_name(value))
    })
}

pub fn dict_field(value: &Value) -> Result<&Map<String, Value>, String> {
    value.as_object().ok_or_else(|| {
        format!("Expected a dictionary of items but got type \"{}\".", type_name(value))
    })
}
