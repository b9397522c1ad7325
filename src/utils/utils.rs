// Start of file: src/utils/utils.rs

use axum::body::Bytes;
use axum::http::{header::{CONTENT_TYPE, HOST}, HeaderMap};
use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Serializer, Value};

use crate::config::environment::EnvironmentVariables;
use crate::utils::error_handler::ApiError;

/*
    * Convert any `Serialize` type into a two-space-indented JSON string.
*/
pub fn to_two_space_indented_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    let mut writer: Vec<u8> = Vec::new();

    let formatter: PrettyFormatter<'_> = PrettyFormatter::with_indent(b"  ");

    let mut ser: Serializer<&mut Vec<u8>, PrettyFormatter<'_>> =
        Serializer::with_formatter(&mut writer, formatter);

    value.serialize(&mut ser)?;

    Ok(String::from_utf8(writer)?)
}

/*
    * Parses a request body as JSON.
    * An empty body reads as `{}`; anything else must declare a JSON media type
    * (`application/json` or any `+json` suffix such as `application/vnd.api+json`).
*/
pub fn parse_json_body(headers: &HeaderMap, body: &Bytes) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }

    let content_type: &str = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if !is_json_media_type(content_type) {
        return Err(ApiError::UnsupportedMediaType(content_type.to_string()));
    }

    serde_json::from_slice(body).map_err(|e| ApiError::ParseError(e.to_string()))
}

fn is_json_media_type(content_type: &str) -> bool {
    let essence: String = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    essence == "application/json" || (essence.starts_with("application/") && essence.ends_with("+json"))
}

/*
    * The `Host` header as sent, port included.
*/
pub fn request_host(headers: &HeaderMap) -> &str {
    headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

/*
    * Absolute URL for `path` on the host the client addressed.
*/
pub fn absolute_url(env: &EnvironmentVariables, headers: &HeaderMap, path: &str) -> String {
    format!("{}://{}{}", env.protocol, request_host(headers), path)
}


// End of file: src/utils/utils.rs
