use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::validation::ErrorTree;

const MAX_LENGTH: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SelectOne,
    SelectMany,
    Numeric,
    Open,
    Text,
    Image,
    Video,
    Audio,
    GeoPoint,
    #[serde(rename = "datetime")]
    DateTime,
    Date,
    Time,
}

impl QuestionType {
    pub const ALL: [QuestionType; 12] = [
        Self::SelectOne,
        Self::SelectMany,
        Self::Numeric,
        Self::Open,
        Self::Text,
        Self::Image,
        Self::Video,
        Self::Audio,
        Self::GeoPoint,
        Self::DateTime,
        Self::Date,
        Self::Time,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SelectOne => "select_one",
            Self::SelectMany => "select_many",
            Self::Numeric => "numeric",
            Self::Open => "open",
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::GeoPoint => "geo_point",
            Self::DateTime => "datetime",
            Self::Date => "date",
            Self::Time => "time",
        }
    }

    /// Types an `open` question's response may declare, sorted by name
    pub fn open_response_types() -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Self::ALL
            .iter()
            .filter(|t| **t != Self::Open)
            .map(|t| t.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Value '{s}' is not a valid choice."))
    }
}

/// A stored question
#[derive(Debug, Clone, PartialEq)]
pub struct FlowQuestion {
    pub primary_key: i64,
    pub flow_key: i64,
    pub id: String,
    pub question_type: QuestionType,
    pub label: String,
    pub type_options: Map<String, Value>,
}

/// A validated question waiting to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuestion {
    pub id: String,
    pub question_type: QuestionType,
    pub label: String,
    pub type_options: Map<String, Value>,
}

impl NewQuestion {
    /// Model-level checks. Errors are keyed by field name.
    pub fn build(
        id: &str,
        raw_type: &str,
        label: &str,
        type_options: Map<String, Value>,
    ) -> Result<Self, ErrorTree> {
        let mut errors: ErrorTree = ErrorTree::new();

        check_length(&mut errors, "id", id);
        check_length(&mut errors, "label", label);

        let question_type: Option<QuestionType> = errors.check("type", raw_type.parse());

        if let Some(question_type) = question_type {
            for message in validate_type_options(question_type, &type_options) {
                errors.add("type_options", message);
            }
        }

        match question_type {
            Some(question_type) => errors.finish(Self {
                id: id.to_string(),
                question_type,
                label: label.to_string(),
                type_options,
            }),
            None => Err(errors),
        }
    }
}

fn check_length(errors: &mut ErrorTree, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, "This field cannot be blank.");
    }
    let length: usize = value.chars().count();
    if length > MAX_LENGTH {
        errors.add(
            field,
            format!("Ensure this value has at most {MAX_LENGTH} characters (it has {length})."),
        );
    }
}

/// Checks the options a question type requires. Returns one message per problem.
pub fn validate_type_options(question_type: QuestionType, type_options: &Map<String, Value>) -> Vec<String> {
    let mut messages: Vec<String> = Vec::new();

    match question_type {
        QuestionType::SelectOne | QuestionType::SelectMany => match type_options.get("choices") {
            None => messages.push(format!("choices is required for {question_type} type")),
            Some(Value::Array(_)) => {}
            Some(_) => messages.push("choices must be an array".to_string()),
        },
        QuestionType::Numeric => match type_options.get("range") {
            None => {}
            Some(Value::Array(items)) => {
                if !items.iter().all(|item| item.is_i64() || item.is_u64()) {
                    messages.push("range can only contain integers".to_string());
                } else if items.len() != 2 {
                    messages.push("range must contain exactly 2 items".to_string());
                }
            }
            Some(_) => messages.push("range must be an array".to_string()),
        },
        _ => {}
    }

    messages
}
