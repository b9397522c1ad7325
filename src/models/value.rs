// Typed response values.
//
// Response fields can hold several JSON shapes plus a few types JSON has no
// representation for (URLs, dates, times). Each value is persisted as a
// `(type code, JSON)` pair so it reads back as the same variant.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, SubsecRound, Utc};
use serde_json::{Number, Value};

/// Storage codes; these are persisted and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum ValueType {
    String = 0,
    Integer = 1,
    ArrayOfString = 2,
    Float = 3,
    Url = 4,
    ArrayOfFloat = 5,
    DateTime = 6,
    Date = 7,
    Time = 8,
}

impl ValueType {
    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn from_code(code: i16) -> Option<Self> {
        Some(match code {
            0 => Self::String,
            1 => Self::Integer,
            2 => Self::ArrayOfString,
            3 => Self::Float,
            4 => Self::Url,
            5 => Self::ArrayOfFloat,
            6 => Self::DateTime,
            7 => Self::Date,
            8 => Self::Time,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    String(String),
    Integer(i64),
    ArrayOfString(Vec<String>),
    Float(f64),
    Url(String),
    ArrayOfFloat(Vec<f64>),
    DateTime(DateTime<FixedOffset>),
    Date(NaiveDate),
    Time(NaiveTime, Option<FixedOffset>),
}

impl TypedValue {
    /// Infers the variant of a plain JSON value.
    ///
    /// URLs and temporal values are never inferred: those come from the
    /// question type during validation. Returns `None` for shapes that have
    /// no storage type (null, booleans, objects, mixed arrays).
    pub fn classify(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Number(n) if n.is_f64() => n.as_f64().map(Self::Float),
            Value::Number(n) => n.as_i64().map(Self::Integer),
            Value::Array(items) => {
                let strings: Option<Vec<String>> = items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect();
                if let Some(strings) = strings {
                    return Some(Self::ArrayOfString(strings));
                }

                let floats: Option<Vec<f64>> = items
                    .iter()
                    .map(|item| match item {
                        Value::Number(n) if n.is_f64() => n.as_f64(),
                        _ => None,
                    })
                    .collect();
                floats.map(Self::ArrayOfFloat)
            }
            _ => None,
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Self::String(_) => ValueType::String,
            Self::Integer(_) => ValueType::Integer,
            Self::ArrayOfString(_) => ValueType::ArrayOfString,
            Self::Float(_) => ValueType::Float,
            Self::Url(_) => ValueType::Url,
            Self::ArrayOfFloat(_) => ValueType::ArrayOfFloat,
            Self::DateTime(_) => ValueType::DateTime,
            Self::Date(_) => ValueType::Date,
            Self::Time(..) => ValueType::Time,
        }
    }

    /// Row, contact and session ids may only be strings or integers
    pub fn is_identifier(&self) -> bool {
        matches!(self, Self::String(_) | Self::Integer(_))
    }

    /// JSON form, as stored and as returned by the API
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) | Self::Url(s) => Value::String(s.clone()),
            Self::Integer(n) => Value::from(*n),
            Self::ArrayOfString(items) => Value::from(items.clone()),
            Self::Float(f) => float_json(*f),
            Self::ArrayOfFloat(items) => Value::Array(items.iter().map(|f| float_json(*f)).collect()),
            Self::DateTime(dt) => Value::String(format_datetime(dt)),
            Self::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            Self::Time(t, offset) => Value::String(format_time(t, offset.as_ref())),
        }
    }

    /// `(code, JSON)` pair for persistence
    pub fn to_stored(&self) -> (i16, Value) {
        (self.value_type().code(), self.to_json())
    }

    /// Rebuilds a value from its persisted pair
    pub fn from_stored(code: i16, value: &Value) -> Result<Self, String> {
        let value_type: ValueType =
            ValueType::from_code(code).ok_or_else(|| format!("unknown value type code {code}"))?;
        let mismatch = || format!("stored value {value} does not match type code {code}");

        match value_type {
            ValueType::String => value.as_str().map(|s| Self::String(s.to_string())).ok_or_else(mismatch),
            ValueType::Url => value.as_str().map(|s| Self::Url(s.to_string())).ok_or_else(mismatch),
            ValueType::Integer => match value {
                Value::Number(n) => n.as_i64().map(Self::Integer).ok_or_else(mismatch),
                // row ids are stored as text
                Value::String(s) => s.parse().map(Self::Integer).map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            ValueType::Float => value.as_f64().map(Self::Float).ok_or_else(mismatch),
            ValueType::ArrayOfString => value
                .as_array()
                .and_then(|items| items.iter().map(|i| i.as_str().map(str::to_string)).collect())
                .map(Self::ArrayOfString)
                .ok_or_else(mismatch),
            ValueType::ArrayOfFloat => value
                .as_array()
                .and_then(|items| items.iter().map(Value::as_f64).collect())
                .map(Self::ArrayOfFloat)
                .ok_or_else(mismatch),
            ValueType::DateTime => value
                .as_str()
                .and_then(parse_iso_datetime)
                .map(Self::DateTime)
                .ok_or_else(mismatch),
            ValueType::Date => value
                .as_str()
                .and_then(parse_iso_date)
                .map(Self::Date)
                .ok_or_else(mismatch),
            ValueType::Time => value
                .as_str()
                .and_then(parse_iso_time)
                .map(|(t, offset)| Self::Time(t, offset))
                .ok_or_else(mismatch),
        }
    }

    /// Text key used for the per-question uniqueness of row ids
    pub fn identifier_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            other => display_json(&other.to_json()),
        }
    }
}

fn display_json(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn float_json(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

// =============================================================================
// ISO-8601 HELPERS
// =============================================================================

/// Formats a timestamp like `2015-11-26T02:59:24+00:00`
pub fn format_datetime<Tz: chrono::TimeZone>(value: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    value.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Timestamps are stored, compared and carried in cursors at microsecond precision
pub fn storage_precision(value: DateTime<Utc>) -> DateTime<Utc> {
    value.trunc_subsecs(6)
}

pub fn format_utc(value: &DateTime<Utc>) -> String {
    format_datetime(value)
}

fn format_time(value: &NaiveTime, offset: Option<&FixedOffset>) -> String {
    let base: String = value.format("%H:%M:%S%.f").to_string();
    match offset {
        Some(offset) => format!("{base}{offset}"),
        None => base,
    }
}

/// Parses an ISO-8601 / RFC 3339 date-time. A space may separate date and
/// time, seconds are optional, and values without an offset are read as UTC.
pub fn parse_iso_datetime(input: &str) -> Option<DateTime<FixedOffset>> {
    let input: &str = input.trim();
    if input.len() < 16 {
        return None;
    }

    let normalized: String = match input.as_bytes().get(10) {
        Some(b' ') | Some(b't') => format!("{}T{}", &input[..10], &input[11..]),
        _ => input.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt);
    }

    const WITH_OFFSET: [&str; 2] = ["%Y-%m-%dT%H:%M%:z", "%Y-%m-%dT%H:%M:%S%.f%z"];
    for format in WITH_OFFSET {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, format) {
            return Some(dt);
        }
    }

    if let Some(stripped) = normalized.strip_suffix('Z').or_else(|| normalized.strip_suffix('z')) {
        return parse_naive_datetime(stripped);
    }

    parse_naive_datetime(&normalized)
}

fn parse_naive_datetime(input: &str) -> Option<DateTime<FixedOffset>> {
    const NAIVE: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];
    NAIVE
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
        .map(|naive| naive.and_utc().fixed_offset())
}

pub fn parse_iso_date(input: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").ok()
}

/// Parses `HH:MM[:SS[.ffffff]]` with an optional `Z` or `±HH:MM` suffix
pub fn parse_iso_time(input: &str) -> Option<(NaiveTime, Option<FixedOffset>)> {
    let input: &str = input.trim();

    let (clock, offset): (&str, Option<FixedOffset>) = if let Some(clock) = input.strip_suffix('Z') {
        (clock, FixedOffset::east_opt(0))
    } else if let Some(position) = input.rfind(['+', '-']) {
        let (clock, suffix) = input.split_at(position);
        (clock, Some(parse_offset(suffix)?))
    } else {
        (input, None)
    };

    const CLOCK: [&str; 2] = ["%H:%M:%S%.f", "%H:%M"];
    CLOCK
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(clock, format).ok())
        .map(|time| (time, offset))
}

fn parse_offset(suffix: &str) -> Option<FixedOffset> {
    let sign: i32 = if suffix.starts_with('-') { -1 } else { 1 };
    let digits: &str = &suffix[1..];
    let (hours, minutes) = digits.split_once(':').unwrap_or((digits, "0"));
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
