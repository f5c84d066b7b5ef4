// ABOUTME: Input validation shared by every storage backend.
// ABOUTME: Rejects bad ids, levels, states, timestamps and whitespace-only location fields.

use thiserror::Error;

use crate::notification::{Level, NewNotification};
use crate::timestamp::is_rfc3339;

/// Reasons an input is rejected before any mutation happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid notification id '{0}'")]
    InvalidId(String),

    #[error("message cannot be empty")]
    EmptyMessage,

    #[error("level cannot be empty")]
    EmptyLevel,

    #[error("invalid level '{0}', must be one of: info, warning, error, critical")]
    InvalidLevel(String),

    #[error("invalid state '{0}', must be one of: active, dismissed, all, or empty")]
    InvalidState(String),

    #[error("invalid read filter '{0}', must be one of: read, unread, or empty")]
    InvalidReadFilter(String),

    #[error("invalid {field} format '{value}', expected RFC3339")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("{0} cannot be whitespace only")]
    WhitespaceOnly(&'static str),

    #[error("{0} cannot contain tabs or line breaks")]
    ControlCharacter(&'static str),
}

/// Parse a caller-supplied id. Empty, non-numeric and non-positive values
/// are all `InvalidId`.
pub fn parse_id(raw: &str) -> Result<u64, ValidationError> {
    let trimmed = raw.trim();
    match trimmed.parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ValidationError::InvalidId(raw.to_string())),
    }
}

pub fn validate_timestamp(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if is_rfc3339(value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidTimestamp {
            field,
            value: value.to_string(),
        })
    }
}

fn reject_whitespace_only(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if !value.is_empty() && value.trim().is_empty() {
        return Err(ValidationError::WhitespaceOnly(field));
    }
    Ok(())
}

/// Location fields are stored verbatim in a tab-separated record.
fn reject_separators(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.contains(['\t', '\n', '\r']) {
        return Err(ValidationError::ControlCharacter(field));
    }
    Ok(())
}

/// Validate creation input and return the parsed level.
pub fn validate_new_notification(input: &NewNotification) -> Result<Level, ValidationError> {
    if input.message.trim().is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    let level: Level = input.level.parse()?;
    if !input.timestamp.is_empty() {
        validate_timestamp("timestamp", &input.timestamp)?;
    }
    reject_whitespace_only("session", &input.session)?;
    reject_whitespace_only("window", &input.window)?;
    reject_whitespace_only("pane", &input.pane)?;
    reject_separators("session", &input.session)?;
    reject_separators("window", &input.window)?;
    reject_separators("pane", &input.pane)?;
    reject_separators("pane_created", &input.pane_created)?;
    Ok(level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_accepts_positive_integers() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert_eq!(parse_id(" 7 ").unwrap(), 7);
    }

    #[test]
    fn parse_id_rejects_garbage() {
        for raw in ["", "   ", "0", "-3", "abc", "1.5"] {
            assert!(
                matches!(parse_id(raw), Err(ValidationError::InvalidId(_))),
                "expected InvalidId for {:?}",
                raw
            );
        }
    }

    #[test]
    fn validation_covers_each_rule() {
        let ok = NewNotification::new("msg", "info");
        assert_eq!(validate_new_notification(&ok).unwrap(), Level::Info);

        let cases = [
            (NewNotification::new("   ", "info"), ValidationError::EmptyMessage),
            (NewNotification::new("msg", ""), ValidationError::EmptyLevel),
            (
                NewNotification::new("msg", "debug"),
                ValidationError::InvalidLevel("debug".to_string()),
            ),
            (
                NewNotification::new("msg", "info").with_timestamp("yesterday"),
                ValidationError::InvalidTimestamp {
                    field: "timestamp",
                    value: "yesterday".to_string(),
                },
            ),
            (
                NewNotification::new("msg", "info").with_location(" ", "", ""),
                ValidationError::WhitespaceOnly("session"),
            ),
            (
                NewNotification::new("msg", "info").with_location("", "\t", ""),
                ValidationError::WhitespaceOnly("window"),
            ),
            (
                NewNotification::new("msg", "info").with_location("", "", "  "),
                ValidationError::WhitespaceOnly("pane"),
            ),
        ];

        for (input, expected) in cases {
            assert_eq!(validate_new_notification(&input).unwrap_err(), expected);
        }
    }

    #[test]
    fn separators_in_location_fields_are_rejected() {
        let cases = [
            (
                NewNotification::new("msg", "info").with_location("work\tspace", "@1", "%1"),
                "session",
            ),
            (
                NewNotification::new("msg", "info").with_location("s", "@1\n", "%1"),
                "window",
            ),
            (
                NewNotification::new("msg", "info").with_location("s", "@1", "%1\r"),
                "pane",
            ),
            (
                NewNotification::new("msg", "info").with_pane_created("17\t12"),
                "pane_created",
            ),
        ];
        for (input, field) in cases {
            assert_eq!(
                validate_new_notification(&input).unwrap_err(),
                ValidationError::ControlCharacter(field)
            );
        }

        // Messages are escaped by the codec, so they may contain both
        let ok = NewNotification::new("a\tb\nc", "info");
        assert!(validate_new_notification(&ok).is_ok());
    }

    #[test]
    fn pane_created_is_not_validated() {
        let input = NewNotification::new("msg", "warning").with_pane_created("1712345678");
        assert!(validate_new_notification(&input).is_ok());
    }
}
