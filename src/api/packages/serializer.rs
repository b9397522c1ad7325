// Package descriptor parsing and rendering

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::models::value::format_utc;
use crate::models::{Flow, FlowDraft, FlowQuestion};
use crate::utils::validation::{
    char_field, choice, datetime_field, dict_field, list_field, nested_object, required, uuid_field, ErrorTree,
    MAY_NOT_BE_NULL,
};

pub const PACKAGE_TYPE: &str = "packages";
pub const PACKAGE_PROFILE: &str = "flow-results-package";
pub const SPECIFICATION_FIELD: &str = "flow-results-specification";
const MEDIATYPE: &str = "application/json";
const ENCODING: &str = "utf-8";
const MAX_LENGTH: usize = 255;
const LANGUAGE_LENGTH: usize = 3;

/// A question as submitted, before model checks
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionInput {
    pub id: String,
    pub question_type: String,
    pub label: String,
    pub type_options: Map<String, Value>,
}

/// A structurally valid package descriptor
#[derive(Debug, Clone)]
pub struct PackageInput {
    pub flow: FlowDraft,
    pub questions: Vec<QuestionInput>,
}

/// Reads a package creation body, reporting every structural problem at once.
pub fn parse_package(body: &Value) -> Result<PackageInput, ErrorTree> {
    let mut errors: ErrorTree = ErrorTree::new();
    let now: DateTime<Utc> = Utc::now();

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
        data_errors.check("type", choice(value, &[PACKAGE_TYPE]));
    }

    let attributes: Option<&Map<String, Value>> = required(data, "attributes", data_errors)
        .and_then(|value| nested_object(value, data_errors.child("attributes")));
    let Some(attributes) = attributes else {
        return Err(errors);
    };

    let attr_errors: &mut ErrorTree = data_errors.child("attributes");

    if let Some(value) = required(attributes, "profile", attr_errors) {
        attr_errors.check("profile", choice(value, &[PACKAGE_PROFILE]));
    }

    let name: Option<String> = string_with_default(attributes, "name", Some(MAX_LENGTH), attr_errors);
    let title: Option<String> = string_with_default(attributes, "title", Some(MAX_LENGTH), attr_errors);

    let version: Option<String> = required(attributes, SPECIFICATION_FIELD, attr_errors)
        .and_then(|value| attr_errors.check(SPECIFICATION_FIELD, char_field(value, None, false)));

    let created: Option<DateTime<Utc>> = datetime_with_default(attributes, "created", now, attr_errors);
    let modified: Option<DateTime<Utc>> = datetime_with_default(attributes, "modified", now, attr_errors);

    let id: Option<Uuid> = match attributes.get("id") {
        None | Some(Value::Null) => Some(Uuid::new_v4()),
        Some(value) => attr_errors.check("id", uuid_field(value)),
    };

    let resource: Option<(String, Vec<QuestionInput>)> = required(attributes, "resources", attr_errors)
        .and_then(|value| attr_errors.check("resources", list_field(value)))
        .and_then(|resources| parse_resources(resources, attr_errors.child("resources")));

    match (name, title, version, created, modified, id, resource) {
        (Some(name), Some(title), Some(version), Some(created), Some(modified), Some(id), Some((language, questions)))
            if errors.is_empty() =>
        {
            Ok(PackageInput {
                flow: FlowDraft {
                    id,
                    name,
                    version,
                    created,
                    modified,
                    title,
                    language,
                },
                questions,
            })
        }
        _ => Err(errors),
    }
}

/// Parses the single resource a package carries: its language and questions
fn parse_resources(resources: &[Value], errors: &mut ErrorTree) -> Option<(String, Vec<QuestionInput>)> {
    let mut parsed: Vec<(String, Vec<QuestionInput>)> = Vec::new();

    for (index, resource) in resources.iter().enumerate() {
        let item_errors: &mut ErrorTree = errors.child(index.to_string());
        if let Some(resource) = nested_object(resource, item_errors) {
            if let Some(result) = parse_resource(resource, item_errors) {
                parsed.push(result);
            }
        }
    }

    if !errors.is_empty() {
        return None;
    }
    if parsed.len() != 1 {
        errors.push("Ensure this field has exactly 1 element.");
        return None;
    }
    parsed.pop()
}

fn parse_resource(resource: &Map<String, Value>, errors: &mut ErrorTree) -> Option<(String, Vec<QuestionInput>)> {
    if let Some(value) = required(resource, "mediatype", errors) {
        errors.check("mediatype", choice(value, &[MEDIATYPE]));
    }
    if let Some(value) = required(resource, "encoding", errors) {
        errors.check("encoding", choice(value, &[ENCODING]));
    }

    let schema: &Map<String, Value> =
        required(resource, "schema", errors).and_then(|value| nested_object(value, errors.child("schema")))?;
    let schema_errors: &mut ErrorTree = errors.child("schema");

    let language: Option<String> = string_with_default(schema, "language", Some(LANGUAGE_LENGTH), schema_errors);

    let questions: &Map<String, Value> = required(schema, "questions", schema_errors)
        .and_then(|value| schema_errors.check("questions", dict_field(value)))?;

    let mut parsed: Vec<QuestionInput> = Vec::with_capacity(questions.len());
    for (question_id, question) in questions {
        let question_errors: &mut ErrorTree = schema_errors.child("questions").child(question_id.clone());
        if let Some(question) = nested_object(question, question_errors) {
            if let Some(question) = parse_question(question_id, question, question_errors) {
                parsed.push(question);
            }
        }
    }

    if !errors.is_empty() {
        return None;
    }
    Some((language?, parsed))
}

fn parse_question(id: &str, question: &Map<String, Value>, errors: &mut ErrorTree) -> Option<QuestionInput> {
    let question_type: Option<String> = required(question, "type", errors)
        .and_then(|value| errors.check("type", char_field(value, None, false)));
    let label: Option<String> = required(question, "label", errors)
        .and_then(|value| errors.check("label", char_field(value, Some(MAX_LENGTH), false)));
    let type_options: Option<Map<String, Value>> = required(question, "type_options", errors)
        .and_then(|value| errors.check("type_options", dict_field(value).cloned()));

    Some(QuestionInput {
        id: id.to_string(),
        question_type: question_type?,
        label: label?,
        type_options: type_options?,
    })
}

/// An optional string that defaults to blank
fn string_with_default(
    object: &Map<String, Value>,
    key: &str,
    max_length: Option<usize>,
    errors: &mut ErrorTree,
) -> Option<String> {
    match object.get(key) {
        None => Some(String::new()),
        Some(Value::Null) => {
            errors.add(key, MAY_NOT_BE_NULL);
            None
        }
        Some(value) => errors.check(key, char_field(value, max_length, true)),
    }
}

fn datetime_with_default(
    object: &Map<String, Value>,
    key: &str,
    default: DateTime<Utc>,
    errors: &mut ErrorTree,
) -> Option<DateTime<Utc>> {
    match object.get(key) {
        None => Some(default),
        Some(Value::Null) => {
            errors.add(key, MAY_NOT_BE_NULL);
            None
        }
        Some(value) => errors.check(key, datetime_field(value)),
    }
}

/// Moves model-level flow errors to where the descriptor carries each field
pub fn remap_flow_errors(mut errors: ErrorTree) -> ErrorTree {
    let mut attributes: ErrorTree = ErrorTree::new();

    if let Some(version) = errors.take("version") {
        attributes.nest(SPECIFICATION_FIELD, version);
    }
    if let Some(language) = errors.take("language") {
        attributes.child("resources").child("0").child("schema").nest("language", language);
    }
    attributes.merge(errors);

    wrap_attributes(attributes)
}

/// Places question errors under their question in the resource schema
pub fn question_errors(errors: Vec<(String, ErrorTree)>) -> ErrorTree {
    let mut attributes: ErrorTree = ErrorTree::new();
    let questions: &mut ErrorTree = attributes.child("resources").child("0").child("schema").child("questions");
    for (question_id, tree) in errors {
        questions.nest(question_id, tree);
    }
    wrap_attributes(attributes)
}

pub fn wrap_attributes(attributes: ErrorTree) -> ErrorTree {
    let mut errors: ErrorTree = ErrorTree::new();
    errors.child("data").nest("attributes", attributes);
    errors
}

/// The fields every response row carries, in row order
fn standard_fields() -> Value {
    json!([
        {"name": "timestamp", "title": "Timestamp", "type": "datetime"},
        {"name": "row_id", "title": "Row ID", "type": "string"},
        {"name": "contact_id", "title": "Contact ID", "type": "string"},
        {"name": "session_id", "title": "Session ID", "type": "string"},
        {"name": "question_id", "title": "Question ID", "type": "string"},
        {"name": "response_id", "title": "Response ID", "type": "any"},
        {"name": "response_metadata", "title": "Response Metadata", "type": "object"}
    ])
}

/// Full package descriptor
pub fn descriptor(flow: &Flow, questions: &[FlowQuestion], package_url: &str, responses_url: &str) -> Value {
    let questions: Map<String, Value> = questions
        .iter()
        .map(|question| {
            (
                question.id.clone(),
                json!({
                    "type": question.question_type.as_str(),
                    "label": question.label,
                    "type_options": question.type_options,
                }),
            )
        })
        .collect();

    json!({
        "data": {
            "type": PACKAGE_TYPE,
            "id": flow.id.to_string(),
            "attributes": {
                "profile": PACKAGE_PROFILE,
                "name": flow.name,
                SPECIFICATION_FIELD: flow.version.as_str(),
                "created": format_utc(&flow.created),
                "modified": format_utc(&flow.modified),
                "id": flow.id.to_string(),
                "title": flow.title,
                "resources": [{
                    "path": null,
                    "api-data-url": responses_url,
                    "mediatype": MEDIATYPE,
                    "encoding": ENCODING,
                    "schema": {
                        "language": flow.language,
                        "fields": standard_fields(),
                        "questions": questions,
                    }
                }]
            }
        },
        "links": {
            "self": package_url
        }
    })
}

/// Entry in the package list
pub fn summary(flow: &Flow) -> Value {
    json!({
        "type": PACKAGE_TYPE,
        "id": flow.id.to_string(),
        "attributes": {
            "created": format_utc(&flow.created),
            "modified": format_utc(&flow.modified),
            "name": flow.name,
            "title": flow.title,
        }
    })
}
