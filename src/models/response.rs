use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::models::question::{validate_type_options, FlowQuestion, QuestionType};
use crate::models::value::{format_utc, parse_iso_date, parse_iso_datetime, parse_iso_time, TypedValue};
use crate::utils::pagination::{Position, Positioned};
use crate::utils::validation::{display, ErrorTree};

pub const NOT_AN_IDENTIFIER: &str = "must be string or integer";

/// A stored response row
#[derive(Debug, Clone, PartialEq)]
pub struct FlowResponse {
    pub id: i64,
    pub flow_key: i64,
    pub question_key: i64,
    pub question_id: String,
    pub timestamp: DateTime<Utc>,
    pub row_id: TypedValue,
    pub contact_id: TypedValue,
    pub session_id: TypedValue,
    pub response: TypedValue,
    pub response_metadata: Map<String, Value>,
}

impl FlowResponse {
    /// Row in the order the responses resource uses:
    /// timestamp, row_id, contact_id, session_id, question_id, response, metadata
    pub fn to_row(&self) -> Value {
        Value::Array(vec![
            Value::String(format_utc(&self.timestamp)),
            self.row_id.to_json(),
            self.contact_id.to_json(),
            self.session_id.to_json(),
            Value::String(self.question_id.clone()),
            self.response.to_json(),
            Value::Object(self.response_metadata.clone()),
        ])
    }
}

impl Positioned for FlowResponse {
    fn position(&self) -> Position {
        Position {
            timestamp: self.timestamp,
            key: self.id,
        }
    }
}

/// A validated response waiting to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewFlowResponse {
    pub flow_key: i64,
    pub question_key: i64,
    pub timestamp: DateTime<Utc>,
    pub row_id: TypedValue,
    pub contact_id: TypedValue,
    pub session_id: TypedValue,
    pub response: TypedValue,
    pub response_metadata: Map<String, Value>,
}

/// Parses a row, contact or session id
pub fn identifier(value: &Value) -> Result<TypedValue, String> {
    TypedValue::classify(value)
        .filter(TypedValue::is_identifier)
        .ok_or_else(|| NOT_AN_IDENTIFIER.to_string())
}

/// Validates `response` against its question and returns the value to store.
///
/// Errors are keyed `response` and `response_metadata`.
pub fn validate_response(
    question: &FlowQuestion,
    response: &Value,
    metadata: &Map<String, Value>,
) -> Result<TypedValue, ErrorTree> {
    let mut errors: ErrorTree = ErrorTree::new();
    let mut question_type: QuestionType = question.question_type;
    let mut type_options: &Map<String, Value> = &question.type_options;

    if question_type == QuestionType::Open {
        let (declared_type, declared_options) = open_declaration(metadata, &mut errors);
        if !errors.is_empty() {
            return Err(errors);
        }
        if let (Some(declared_type), Some(declared_options)) = (declared_type, declared_options) {
            question_type = declared_type;
            type_options = declared_options;
        }
    }

    let value: Option<TypedValue> = match question_type {
        QuestionType::SelectOne => {
            let choices: &[Value] = choices(type_options);
            if !choices.contains(response) {
                errors.add(
                    "response",
                    format!(
                        "{} is not a valid choice. Valid choices are {}",
                        display(response),
                        Value::from(choices.to_vec())
                    ),
                );
            }
            check_choice_order(choices, metadata, &mut errors);
            classify(response, &mut errors)
        }
        QuestionType::SelectMany => {
            let choices: &[Value] = choices(type_options);
            match response {
                Value::Array(items) => {
                    if !items.iter().all(|item| choices.contains(item)) {
                        errors.add(
                            "response",
                            format!(
                                "{} contains choices not in {}",
                                response,
                                Value::from(choices.to_vec())
                            ),
                        );
                    }
                }
                _ => errors.add("response", "must be an array"),
            }
            check_choice_order(choices, metadata, &mut errors);
            classify(response, &mut errors)
        }
        QuestionType::Numeric => {
            if !response.is_number() {
                errors.add("response", "must be float or integer");
            }
            classify(response, &mut errors)
        }
        QuestionType::Text => {
            if !response.is_string() {
                errors.add("response", "must be a string");
            }
            check_string(metadata, "language", &mut errors);
            classify(response, &mut errors)
        }
        QuestionType::Image | QuestionType::Video | QuestionType::Audio => {
            check_media_metadata(metadata, &mut errors);
            match response {
                Value::String(url) => Some(TypedValue::Url(url.clone())),
                _ => {
                    errors.add("response", "must be a URL");
                    None
                }
            }
        }
        QuestionType::GeoPoint => match response {
            Value::Array(items) => {
                let coordinates: Option<Vec<f64>> = items.iter().map(Value::as_f64).collect();
                if coordinates.is_none() {
                    errors.add("response", "array may only contain floats");
                }
                if !(2..=4).contains(&items.len()) {
                    errors.add("response", "number of array elements must be between 2 and 4 inclusive");
                }
                coordinates.map(TypedValue::ArrayOfFloat)
            }
            _ => {
                errors.add("response", "must be an array");
                None
            }
        },
        QuestionType::DateTime => {
            let parsed = response.as_str().and_then(parse_iso_datetime).map(TypedValue::DateTime);
            if parsed.is_none() {
                errors.add("response", "must be an RFC 3339 date-time");
            }
            parsed
        }
        QuestionType::Date => {
            let parsed = response.as_str().and_then(parse_iso_date).map(TypedValue::Date);
            if parsed.is_none() {
                errors.add("response", "must be an RFC 3339 date");
            }
            parsed
        }
        QuestionType::Time => {
            let parsed = response
                .as_str()
                .and_then(parse_iso_time)
                .map(|(time, offset)| TypedValue::Time(time, offset));
            if parsed.is_none() {
                errors.add("response", "must be an RFC 3339 time");
            }
            parsed
        }
        // an open question always resolves to its declared type above
        QuestionType::Open => classify(response, &mut errors),
    };

    match value {
        Some(value) => errors.finish(value),
        None => Err(errors),
    }
}

/// Reads the `type` and `type_options` an open question's response declares
fn open_declaration<'m>(
    metadata: &'m Map<String, Value>,
    errors: &mut ErrorTree,
) -> (Option<QuestionType>, Option<&'m Map<String, Value>>) {
    let valid_types: Vec<&'static str> = QuestionType::open_response_types();

    let declared_type: Option<QuestionType> = match metadata.get("type") {
        None => {
            errors.add("response_metadata", "type is required");
            None
        }
        Some(Value::String(name)) if valid_types.contains(&name.as_str()) => name.parse().ok(),
        Some(_) => {
            errors.add(
                "response_metadata",
                format!("type must be one of {}", Value::from(valid_types.clone())),
            );
            None
        }
    };

    let declared_options: Option<&Map<String, Value>> = match metadata.get("type_options") {
        None => {
            errors.add("response_metadata", "type_options is required");
            None
        }
        Some(Value::Object(options)) => Some(options),
        Some(_) => {
            errors.add("response_metadata", "type_options must be an object");
            None
        }
    };

    if let Some(question_type) = declared_type {
        let empty: Map<String, Value> = Map::new();
        for message in validate_type_options(question_type, declared_options.unwrap_or(&empty)) {
            errors.add("response_metadata", format!("type_options.{message}"));
        }
    }

    (declared_type, declared_options)
}

fn choices(type_options: &Map<String, Value>) -> &[Value] {
    type_options
        .get("choices")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn check_choice_order(choices: &[Value], metadata: &Map<String, Value>, errors: &mut ErrorTree) {
    match metadata.get("choice_order") {
        None => {}
        // the order must be a permutation of the question's choices
        Some(Value::Array(order)) => {
            let complete: bool = choices.iter().all(|choice| order.contains(choice));
            let known: bool = order.iter().all(|choice| choices.contains(choice));
            if !complete || !known {
                errors.add(
                    "response_metadata",
                    format!(
                        "choice_order {} contains choices not in {}",
                        Value::from(order.clone()),
                        Value::from(choices.to_vec())
                    ),
                );
            }
        }
        Some(_) => errors.add("response_metadata", "choice_order must be an array"),
    }
}

fn check_string(metadata: &Map<String, Value>, key: &str, errors: &mut ErrorTree) {
    if let Some(value) = metadata.get(key) {
        if !value.is_string() {
            errors.add("response_metadata", format!("{key} must be a string"));
        }
    }
}

fn check_number(metadata: &Map<String, Value>, key: &str, errors: &mut ErrorTree) {
    if let Some(value) = metadata.get(key) {
        if !value.is_number() {
            errors.add("response_metadata", format!("{key} must be integer or float"));
        }
    }
}

fn check_media_metadata(metadata: &Map<String, Value>, errors: &mut ErrorTree) {
    check_string(metadata, "format", errors);

    match metadata.get("dimensions") {
        None => {}
        Some(Value::Array(dimensions)) => {
            if dimensions.len() != 2 {
                errors.add("response_metadata", "dimensions must have a length of 2");
            }
            if !dimensions.iter().all(|item| item.is_i64() || item.is_u64()) {
                errors.add("response_metadata", "dimensions items must be integers");
            }
        }
        Some(_) => errors.add("response_metadata", "dimensions must be an array"),
    }

    check_number(metadata, "file_size_mb", errors);
    check_number(metadata, "duration_s", errors);
    check_string(metadata, "language", errors);
}

fn classify(response: &Value, errors: &mut ErrorTree) -> Option<TypedValue> {
    let value: Option<TypedValue> = TypedValue::classify(response);
    if value.is_none() && errors.get("response").is_none() {
        errors.add("response", "must be a string, number or array of strings or floats");
    }
    value
}
