// Response batch parsing, row validation and rendering

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use crate::database::store::{row_key, ResponseFilter, RowKey};
use crate::models::response::{identifier, validate_response};
use crate::models::value::parse_iso_datetime;
use crate::models::{Flow, FlowQuestion, FlowResponse, NewFlowResponse, TypedValue};
use crate::utils::validation::{
    char_field, choice, datetime_field, dict_field, display, list_field, nested_object, required, ErrorTree,
    INVALID_DATETIME,
};

pub const RESPONSES_TYPE: &str = "responses";
pub const START_FILTER: &str = "filter[start-timestamp]";
pub const END_FILTER: &str = "filter[end-timestamp]";
pub const ID_MISMATCH: &str = "Must match the package id in the URL.";
pub const DUPLICATE_ROW: &str = "Flow response with this Question and Row id already exists.";
const ROW_LENGTH: usize = 7;

/// A structurally valid response batch
#[derive(Debug, Clone, PartialEq)]
pub struct ResponsesInput {
    pub id: String,
    pub rows: Vec<Vec<Value>>,
}

/// Reads a response batch body, reporting every structural problem at once.
pub fn parse_responses(body: &Value) -> Result<ResponsesInput, ErrorTree> {
    let mut errors: ErrorTree = ErrorTree::new();

    let Some(root) = nested_object(body, &mut errors) else {
        return Err(errors);
    };
    let data: Option<&Map<String, Value>> =
        required(root, "data", &mut errors).and_then(|value| nested_object(value, errors.child("data")));
    let Some(data) = data else {
        return Err(errors);
    };

    let data_errors: &mut ErrorTree = errors.child("data");
    if let Some(value) = required(data, "type", data_errors) {
        data_errors.check("type", choice(value, &[RESPONSES_TYPE]));
    }
    let id: Option<String> =
        required(data, "id", data_errors).and_then(|value| data_errors.check("id", char_field(value, None, false)));

    let rows: Option<Vec<Vec<Value>>> = required(data, "attributes", data_errors)
        .and_then(|value| nested_object(value, data_errors.child("attributes")))
        .and_then(|attributes| {
            let attr_errors: &mut ErrorTree = data_errors.child("attributes");
            required(attributes, "responses", attr_errors)
                .and_then(|value| attr_errors.check("responses", list_field(value)))
                .map(|rows| parse_rows(rows, attr_errors.child("responses")))
        });

    match (id, rows) {
        (Some(id), Some(rows)) if errors.is_empty() => Ok(ResponsesInput { id, rows }),
        _ => Err(errors),
    }
}

fn parse_rows(rows: &[Value], errors: &mut ErrorTree) -> Vec<Vec<Value>> {
    let mut parsed: Vec<Vec<Value>> = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let outcome: Result<&Vec<Value>, String> = list_field(row).and_then(|items| match items.len() {
            n if n < ROW_LENGTH => Err(format!("Ensure this field has at least {ROW_LENGTH} elements.")),
            n if n > ROW_LENGTH => Err(format!("Ensure this field has no more than {ROW_LENGTH} elements.")),
            _ => Ok(items),
        });
        if let Some(items) = errors.check(&index.to_string(), outcome) {
            parsed.push(items.clone());
        }
    }
    parsed
}

/// Validates every row against the package's questions and the rows already stored.
///
/// `stored` holds the `(question, row id)` pairs that already exist. Errors are
/// keyed by row index and field name.
pub fn validate_rows(
    flow: &Flow,
    questions: &[FlowQuestion],
    rows: &[Vec<Value>],
    stored: &HashSet<RowKey>,
) -> Result<Vec<NewFlowResponse>, ErrorTree> {
    let by_id: HashMap<&str, &FlowQuestion> = questions.iter().map(|q| (q.id.as_str(), q)).collect();
    let mut errors: ErrorTree = ErrorTree::new();
    let mut seen: HashSet<RowKey> = HashSet::new();
    let mut responses: Vec<NewFlowResponse> = Vec::with_capacity(rows.len());

    for (index, row) in rows.iter().enumerate() {
        let row_errors: &mut ErrorTree = errors.child(index.to_string());
        if let Some(response) = validate_row(flow, &by_id, row, row_errors) {
            let key: RowKey = row_key(response.question_key, &response.row_id);
            if stored.contains(&key) || !seen.insert(key) {
                row_errors.add("row_id", DUPLICATE_ROW);
            } else {
                responses.push(response);
            }
        }
    }

    errors.finish(responses)
}

fn validate_row(
    flow: &Flow,
    questions: &HashMap<&str, &FlowQuestion>,
    row: &[Value],
    errors: &mut ErrorTree,
) -> Option<NewFlowResponse> {
    let [timestamp, row_id, contact_id, session_id, question_id, response, metadata] = row else {
        errors.push(format!("Ensure this field has {ROW_LENGTH} elements."));
        return None;
    };

    let timestamp: Option<DateTime<Utc>> = errors.check("timestamp", datetime_field(timestamp));
    let row_id: Option<TypedValue> = errors.check("row_id", identifier(row_id));
    let contact_id: Option<TypedValue> = errors.check("contact_id", identifier(contact_id));
    let session_id: Option<TypedValue> = errors.check("session_id", identifier(session_id));

    let question: Option<&FlowQuestion> = match question_id.as_str().and_then(|id| questions.get(id)) {
        Some(question) => Some(*question),
        None => {
            errors.add(
                "question_id",
                format!("\"{}\" is not a question in this package.", display(question_id)),
            );
            None
        }
    };

    let metadata: Option<Map<String, Value>> =
        errors.check("response_metadata", dict_field(metadata).cloned());

    let value: Option<TypedValue> = match (question, &metadata) {
        (Some(question), Some(metadata)) => match validate_response(question, response, metadata) {
            Ok(value) => Some(value),
            Err(tree) => {
                errors.merge(tree);
                None
            }
        },
        _ => None,
    };

    Some(NewFlowResponse {
        flow_key: flow.primary_key,
        question_key: question?.primary_key,
        timestamp: timestamp?,
        row_id: row_id?,
        contact_id: contact_id?,
        session_id: session_id?,
        response: value?,
        response_metadata: metadata?,
    })
}

/// Places row errors where the request carried each row
pub fn wrap_row_errors(rows: ErrorTree) -> ErrorTree {
    let mut errors: ErrorTree = ErrorTree::new();
    errors.child("data").child("attributes").nest("responses", rows);
    errors
}

/// Reads the timestamp filters from decoded query parameters
pub fn parse_filter(params: &HashMap<String, String>) -> Result<ResponseFilter, ErrorTree> {
    let mut errors: ErrorTree = ErrorTree::new();
    let start: Option<DateTime<Utc>> = filter_timestamp(params, START_FILTER, &mut errors);
    let end: Option<DateTime<Utc>> = filter_timestamp(params, END_FILTER, &mut errors);
    errors.finish(ResponseFilter { start, end })
}

fn filter_timestamp(params: &HashMap<String, String>, key: &str, errors: &mut ErrorTree) -> Option<DateTime<Utc>> {
    let raw: &str = params.get(key).map(|s| s.trim()).filter(|s| !s.is_empty())?;
    let parsed = parse_iso_datetime(raw).or_else(|| {
        // an unescaped `+` in the offset arrives as a space
        raw.rfind(' ')
            .filter(|at| *at > 10)
            .and_then(|at| parse_iso_datetime(&format!("{}+{}", &raw[..at], &raw[at + 1..])))
    });
    match parsed {
        Some(timestamp) => Some(timestamp.with_timezone(&Utc)),
        None => {
            errors.add(key, INVALID_DATETIME);
            None
        }
    }
}

/// Body for a page of responses
pub fn responses_document(flow: &Flow, rows: &[FlowResponse], package_url: &str, links: Value) -> Value {
    let rows: Vec<Value> = rows.iter().map(FlowResponse::to_row).collect();
    json!({
        "data": {
            "type": RESPONSES_TYPE,
            "id": flow.id.to_string(),
            "attributes": {
                "responses": rows
            },
            "relationships": {
                "descriptor": {
                    "links": {
                        "self": package_url
                    }
                }
            }
        },
        "links": links
    })
}
