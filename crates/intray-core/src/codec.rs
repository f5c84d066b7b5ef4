// ABOUTME: Tab-separated record codec shared by the flat-file store and SQLite output.
// ABOUTME: Owns the field order and the message escaping rules so both backends emit identical lines.

use thiserror::Error;

use crate::notification::{Level, Notification, NotificationState};
use crate::timestamp::is_rfc3339;

pub const FIELD_ID: usize = 0;
pub const FIELD_TIMESTAMP: usize = 1;
pub const FIELD_STATE: usize = 2;
pub const FIELD_SESSION: usize = 3;
pub const FIELD_WINDOW: usize = 4;
pub const FIELD_PANE: usize = 5;
pub const FIELD_MESSAGE: usize = 6;
pub const FIELD_PANE_CREATED: usize = 7;
pub const FIELD_LEVEL: usize = 8;
pub const FIELD_READ_TIMESTAMP: usize = 9;

/// Fields in a current-format record.
pub const NUM_FIELDS: usize = 10;
/// Records written before read tracking have no read_timestamp column.
pub const MIN_FIELDS: usize = 9;

pub const FIELD_NAMES: [&str; NUM_FIELDS] = [
    "id",
    "timestamp",
    "state",
    "session",
    "window",
    "pane",
    "message",
    "pane_created",
    "level",
    "read_timestamp",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid field count: got {0}, expected {MIN_FIELDS} or {NUM_FIELDS}")]
    FieldCount(usize),

    #[error("invalid id '{0}'")]
    InvalidId(String),

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("invalid state '{0}'")]
    InvalidState(String),

    #[error("invalid level '{0}'")]
    InvalidLevel(String),
}

pub fn escape_message(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for ch in message.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

/// Inverse of [`escape_message`]. Unknown escape sequences and a trailing
/// lone backslash are kept as-is.
pub fn unescape_message(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

pub fn encode_fields(n: &Notification) -> [String; NUM_FIELDS] {
    [
        n.id.to_string(),
        n.timestamp.clone(),
        n.state.as_str().to_string(),
        n.session.clone(),
        n.window.clone(),
        n.pane.clone(),
        escape_message(&n.message),
        n.pane_created.clone(),
        n.level.as_str().to_string(),
        n.read_timestamp.clone(),
    ]
}

/// One record as a tab-joined line, without the trailing newline.
pub fn encode_line(n: &Notification) -> String {
    encode_fields(n).join("\t")
}

/// Split a line into exactly [`NUM_FIELDS`] raw fields. Nine-field legacy
/// lines are padded with an empty read timestamp.
pub fn split_fields(line: &str) -> Result<Vec<&str>, DecodeError> {
    let mut fields: Vec<&str> = line.split('\t').collect();
    match fields.len() {
        NUM_FIELDS => Ok(fields),
        MIN_FIELDS => {
            fields.push("");
            Ok(fields)
        }
        n => Err(DecodeError::FieldCount(n)),
    }
}

/// Extract just the id of a line, if it has one. Used to keep id assignment
/// monotonic even across lines that fail full decoding.
pub fn peek_id(line: &str) -> Option<u64> {
    let raw = line.split('\t').next()?;
    raw.parse::<u64>().ok().filter(|id| *id > 0)
}

pub fn decode_line(line: &str) -> Result<Notification, DecodeError> {
    let fields = split_fields(line)?;

    let raw_id = fields[FIELD_ID];
    let id = raw_id
        .parse::<u64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| DecodeError::InvalidId(raw_id.to_string()))?;

    let timestamp = fields[FIELD_TIMESTAMP];
    if !is_rfc3339(timestamp) {
        return Err(DecodeError::InvalidTimestamp(timestamp.to_string()));
    }

    let state: NotificationState = fields[FIELD_STATE]
        .parse()
        .map_err(|_| DecodeError::InvalidState(fields[FIELD_STATE].to_string()))?;

    let level: Level = fields[FIELD_LEVEL]
        .parse()
        .map_err(|_| DecodeError::InvalidLevel(fields[FIELD_LEVEL].to_string()))?;

    Ok(Notification {
        id,
        timestamp: timestamp.to_string(),
        state,
        session: fields[FIELD_SESSION].to_string(),
        window: fields[FIELD_WINDOW].to_string(),
        pane: fields[FIELD_PANE].to_string(),
        message: unescape_message(fields[FIELD_MESSAGE]),
        pane_created: fields[FIELD_PANE_CREATED].to_string(),
        level,
        read_timestamp: fields[FIELD_READ_TIMESTAMP].to_string(),
    })
}
