use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::utils::pagination::{Position, Positioned};
use crate::utils::validation::ErrorTree;

const MAX_LENGTH: usize = 255;
const LANGUAGE_LENGTH: usize = 3;
const NAME_RULE: &str = "can only contain lowercase, alphanumeric characters and '-', '_', '.'";

/// Versions of the Flow Results specification this service accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowVersion {
    V1_0_0Rc1,
}

impl FlowVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1_0_0Rc1 => "1.0.0-rc1",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "1.0.0-rc1" => Ok(Self::V1_0_0Rc1),
            other => Err(format!("Value '{other}' is not a valid choice.")),
        }
    }
}

/// A stored package
#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    pub primary_key: i64,
    pub id: Uuid,
    pub name: String,
    pub version: FlowVersion,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub title: String,
    pub language: String,
}

impl Positioned for Flow {
    fn position(&self) -> Position {
        Position {
            timestamp: self.modified,
            key: self.primary_key,
        }
    }
}

/// Raw package fields, before model checks
#[derive(Debug, Clone)]
pub struct FlowDraft {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub title: String,
    pub language: String,
}

/// A validated package waiting to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewFlow {
    pub id: Uuid,
    pub name: String,
    pub version: FlowVersion,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub title: String,
    pub language: String,
}

impl FlowDraft {
    /// Model-level checks. Errors are keyed by model field name
    /// (`name`, `version`, `title`, `language`).
    pub fn clean(self) -> Result<NewFlow, ErrorTree> {
        let mut errors: ErrorTree = ErrorTree::new();

        check_max_length(&mut errors, "name", &self.name, MAX_LENGTH);
        if !is_valid_name(&self.name) {
            errors.add("name", NAME_RULE);
        }

        check_max_length(&mut errors, "title", &self.title, MAX_LENGTH);

        // blank, or exactly three characters
        let language_length: usize = self.language.chars().count();
        if language_length > 0 && language_length < LANGUAGE_LENGTH {
            errors.add(
                "language",
                format!("Ensure this value has at least {LANGUAGE_LENGTH} characters (it has {language_length})."),
            );
        }
        check_max_length(&mut errors, "language", &self.language, LANGUAGE_LENGTH);

        let version: Option<FlowVersion> = errors.check("version", FlowVersion::parse(&self.version));

        match version {
            Some(version) => errors.finish(NewFlow {
                id: self.id,
                name: self.name,
                version,
                created: self.created,
                modified: self.modified,
                title: self.title,
                language: self.language,
            }),
            None => Err(errors),
        }
    }
}

fn check_max_length(errors: &mut ErrorTree, field: &str, value: &str, max: usize) {
    let length: usize = value.chars().count();
    if length > max {
        errors.add(
            field,
            format!("Ensure this value has at most {max} characters (it has {length})."),
        );
    }
}

fn is_valid_name(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
}
