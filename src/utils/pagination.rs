// Cursor pagination.
//
// Results are ordered by `(timestamp, key)` ascending. A cursor marks a
// position in that ordering plus a direction: forward cursors select rows
// strictly after the position, reverse cursors rows strictly before it.
// Cursors travel as opaque tokens carrying an HMAC-SHA256 tag keyed by the
// secret key.

use std::collections::HashMap;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const CURSOR_PARAM: &str = "cursor";
pub const PAGE_SIZE_PARAM: &str = "page[size]";
const SIGNATURE_LENGTH: usize = 16;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid cursor")]
pub struct InvalidCursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub timestamp: DateTime<Utc>,
    pub key: i64,
}

/// Anything with a place in the pagination ordering
pub trait Positioned {
    fn position(&self) -> Position;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub position: Position,
    pub reverse: bool,
}

impl Cursor {
    pub fn encode(&self, secret_key: &str) -> String {
        let payload: String = format!(
            "{}:{}:{}",
            self.position.timestamp.timestamp_micros(),
            self.position.key,
            u8::from(self.reverse)
        );
        let tag: Vec<u8> = cursor_mac(&payload, secret_key).finalize().into_bytes().to_vec();
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(&tag[..SIGNATURE_LENGTH])
        )
    }

    pub fn decode(token: &str, secret_key: &str) -> Result<Self, InvalidCursor> {
        let (encoded, signature) = token.split_once('.').ok_or(InvalidCursor)?;
        let payload: Vec<u8> = URL_SAFE_NO_PAD.decode(encoded).map_err(|_| InvalidCursor)?;
        let payload: String = String::from_utf8(payload).map_err(|_| InvalidCursor)?;

        let signature: Vec<u8> = URL_SAFE_NO_PAD.decode(signature).map_err(|_| InvalidCursor)?;
        if signature.len() != SIGNATURE_LENGTH {
            return Err(InvalidCursor);
        }
        cursor_mac(&payload, secret_key)
            .verify_truncated_left(&signature)
            .map_err(|_| InvalidCursor)?;

        let mut parts = payload.split(':');
        let micros: i64 = parts.next().and_then(|p| p.parse().ok()).ok_or(InvalidCursor)?;
        let key: i64 = parts.next().and_then(|p| p.parse().ok()).ok_or(InvalidCursor)?;
        let reverse: bool = match parts.next() {
            Some("0") => false,
            Some("1") => true,
            _ => return Err(InvalidCursor),
        };
        if parts.next().is_some() {
            return Err(InvalidCursor);
        }

        let timestamp: DateTime<Utc> = DateTime::from_timestamp_micros(micros).ok_or(InvalidCursor)?;
        Ok(Self {
            position: Position { timestamp, key },
            reverse,
        })
    }
}

fn cursor_mac(payload: &str, secret_key: &str) -> Hmac<Sha256> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret_key.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC keys have no length limit"));
    mac.update(payload.as_bytes());
    mac
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub cursor: Option<Cursor>,
    pub size: usize,
}

impl PageRequest {
    /// Reads `cursor` and `page[size]` from decoded query parameters.
    /// A missing or unusable page size falls back to the default; larger
    /// sizes are capped at `max_size`.
    pub fn from_query(
        params: &HashMap<String, String>,
        default_size: usize,
        max_size: usize,
        secret_key: &str,
    ) -> Result<Self, InvalidCursor> {
        let cursor: Option<Cursor> = params
            .get(CURSOR_PARAM)
            .filter(|token| !token.is_empty())
            .map(|token| Cursor::decode(token, secret_key))
            .transpose()?;

        let size: usize = params
            .get(PAGE_SIZE_PARAM)
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|size| *size > 0)
            .map(|size| size.min(max_size))
            .unwrap_or(default_size);

        Ok(Self { cursor, size })
    }

    pub fn first(size: usize) -> Self {
        Self { cursor: None, size }
    }

    pub fn is_reverse(&self) -> bool {
        self.cursor.map(|c| c.reverse).unwrap_or(false)
    }

    /// Whether a row at `position` falls on the requested side of the cursor
    pub fn admits(&self, position: &Position) -> bool {
        match self.cursor {
            None => true,
            Some(Cursor { position: bound, reverse: false }) => *position > bound,
            Some(Cursor { position: bound, reverse: true }) => *position < bound,
        }
    }

    /// Rows a store should fetch: one extra tells us whether more exist
    pub fn fetch_limit(&self) -> usize {
        self.size + 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<Cursor>,
    pub previous: Option<Cursor>,
}

impl<T: Positioned> Page<T> {
    /// Builds a page from up to `size + 1` rows fetched in query order:
    /// ascending for forward requests, descending for reverse ones.
    pub fn from_window(mut rows: Vec<T>, request: &PageRequest) -> Self {
        let has_more: bool = rows.len() > request.size;
        rows.truncate(request.size);

        if request.is_reverse() {
            rows.reverse();
        }

        let first: Option<Position> = rows.first().map(Positioned::position);
        let last: Option<Position> = rows.last().map(Positioned::position);

        let (next, previous) = match request.cursor {
            None => (last.filter(|_| has_more).map(forward_from), None),
            Some(cursor) if !cursor.reverse => {
                let next: Option<Cursor> = last.filter(|_| has_more).map(forward_from);
                // an empty page still links back to everything up to and including the cursor
                let previous: Position = first.unwrap_or(Position {
                    timestamp: cursor.position.timestamp,
                    key: cursor.position.key.saturating_add(1),
                });
                (next, Some(backward_from(previous)))
            }
            Some(cursor) => {
                let previous: Option<Cursor> = first.filter(|_| has_more).map(backward_from);
                let next: Position = last.unwrap_or(Position {
                    timestamp: cursor.position.timestamp,
                    key: cursor.position.key.saturating_sub(1),
                });
                (Some(forward_from(next)), previous)
            }
        };

        Self {
            items: rows,
            next,
            previous,
        }
    }
}

fn forward_from(position: Position) -> Cursor {
    Cursor { position, reverse: false }
}

fn backward_from(position: Position) -> Cursor {
    Cursor { position, reverse: true }
}

/// The request URL with its `cursor` parameter replaced
pub fn cursor_link(base_url: &str, raw_query: Option<&str>, cursor: &Cursor, secret_key: &str) -> String {
    let mut pairs: Vec<String> = raw_query
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split('=').next() != Some(CURSOR_PARAM))
        .map(str::to_string)
        .collect();
    pairs.push(format!("{CURSOR_PARAM}={}", cursor.encode(secret_key)));
    format!("{base_url}?{}", pairs.join("&"))
}

/// The request URL as received
pub fn self_link(base_url: &str, raw_query: Option<&str>) -> String {
    match raw_query.filter(|q| !q.is_empty()) {
        Some(query) => format!("{base_url}?{query}"),
        None => base_url.to_string(),
    }
}
