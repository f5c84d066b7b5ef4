// ABOUTME: Defines the Notification record and its state and level enums.
// ABOUTME: Also holds NewNotification, the raw creation input validated by every backend.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::validate::ValidationError;

/// Lifecycle state of a notification. The only transition is Active -> Dismissed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationState {
    Active,
    Dismissed,
}

impl NotificationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Dismissed => "dismissed",
        }
    }
}

impl fmt::Display for NotificationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "dismissed" => Ok(Self::Dismissed),
            other => Err(ValidationError::InvalidState(other.to_string())),
        }
    }
}

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Info,
    Warning,
    Error,
    Critical,
}

impl Level {
    pub const ALL: [Level; 4] = [Level::Info, Level::Warning, Level::Error, Level::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Err(ValidationError::EmptyLevel),
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            other => Err(ValidationError::InvalidLevel(other.to_string())),
        }
    }
}

/// The current version of a stored notification.
///
/// Timestamps are kept as the exact strings that were stored so that two
/// backends holding the same data produce byte-identical records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub timestamp: String,
    pub state: NotificationState,
    pub session: String,
    pub window: String,
    pub pane: String,
    pub message: String,
    pub pane_created: String,
    pub level: Level,
    /// Empty when unread, otherwise the RFC3339 time it was read.
    pub read_timestamp: String,
}

impl Notification {
    pub fn is_active(&self) -> bool {
        self.state == NotificationState::Active
    }

    pub fn is_read(&self) -> bool {
        !self.read_timestamp.is_empty()
    }

    /// Copy of this notification with the state flipped to dismissed.
    pub fn dismissed(&self) -> Self {
        Self {
            state: NotificationState::Dismissed,
            ..self.clone()
        }
    }

    /// Copy of this notification with a new read marker.
    pub fn with_read_timestamp(&self, read_timestamp: &str) -> Self {
        Self {
            read_timestamp: read_timestamp.to_string(),
            ..self.clone()
        }
    }

    /// True when the notification sits at the given tmux location. Empty
    /// arguments match anything.
    pub fn is_at(&self, session: &str, window: &str, pane: &str) -> bool {
        (session.is_empty() || self.session == session)
            && (window.is_empty() || self.window == window)
            && (pane.is_empty() || self.pane == pane)
    }
}

/// Raw input for creating a notification. Fields are plain strings so that
/// every backend runs the same validation and reports the same errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewNotification {
    pub message: String,
    /// Empty means "now".
    pub timestamp: String,
    pub session: String,
    pub window: String,
    pub pane: String,
    pub pane_created: String,
    pub level: String,
}

impl NewNotification {
    pub fn new(message: impl Into<String>, level: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: level.into(),
            ..Self::default()
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn with_location(
        mut self,
        session: impl Into<String>,
        window: impl Into<String>,
        pane: impl Into<String>,
    ) -> Self {
        self.session = session.into();
        self.window = window.into();
        self.pane = pane.into();
        self
    }

    pub fn with_pane_created(mut self, pane_created: impl Into<String>) -> Self {
        self.pane_created = pane_created.into();
        self
    }

    /// Validate the input and build the stored record for the given id.
    /// An empty timestamp is replaced by `now`.
    pub fn into_notification(self, id: u64, now: &str) -> Result<Notification, ValidationError> {
        let level = crate::validate::validate_new_notification(&self)?;
        let timestamp = if self.timestamp.is_empty() {
            now.to_string()
        } else {
            self.timestamp
        };
        Ok(Notification {
            id,
            timestamp,
            state: NotificationState::Active,
            session: self.session,
            window: self.window,
            pane: self.pane,
            message: self.message,
            pane_created: self.pane_created,
            level,
            read_timestamp: String::new(),
        })
    }
}
