// ABOUTME: List filters applied to the latest-per-id snapshot by every backend.
// ABOUTME: Parses raw filter strings once so both stores validate them identically.

use crate::notification::{Level, Notification, NotificationState};
use crate::validate::{ValidationError, validate_timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateFilter {
    #[default]
    All,
    Only(NotificationState),
}

impl StateFilter {
    /// `""` and `"all"` mean no state filter.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "" | "all" => Ok(Self::All),
            other => Ok(Self::Only(other.parse()?)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadFilter {
    #[default]
    Any,
    Read,
    Unread,
}

impl ReadFilter {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "" => Ok(Self::Any),
            "read" => Ok(Self::Read),
            "unread" => Ok(Self::Unread),
            other => Err(ValidationError::InvalidReadFilter(other.to_string())),
        }
    }
}

/// Conjunction of optional predicates over a notification. An unset field
/// matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub state: StateFilter,
    pub level: Option<Level>,
    pub session: Option<String>,
    pub window: Option<String>,
    pub pane: Option<String>,
    /// Exclusive: keeps rows with `timestamp < older_than`.
    pub older_than: Option<String>,
    /// Exclusive: keeps rows with `timestamp > newer_than`.
    pub newer_than: Option<String>,
    pub read: ReadFilter,
}

fn non_empty(raw: &str) -> Option<String> {
    (!raw.is_empty()).then(|| raw.to_string())
}

impl ListFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn active() -> Self {
        Self {
            state: StateFilter::Only(NotificationState::Active),
            ..Self::default()
        }
    }

    /// Build a filter from the raw strings a caller supplies. Empty strings
    /// mean "no filter" for every argument.
    #[allow(clippy::too_many_arguments)]
    pub fn parse(
        state: &str,
        level: &str,
        session: &str,
        window: &str,
        pane: &str,
        older_than: &str,
        newer_than: &str,
        read: &str,
    ) -> Result<Self, ValidationError> {
        let level = if level.is_empty() {
            None
        } else {
            Some(level.parse::<Level>()?)
        };
        if !older_than.is_empty() {
            validate_timestamp("older_than", older_than)?;
        }
        if !newer_than.is_empty() {
            validate_timestamp("newer_than", newer_than)?;
        }
        Ok(Self {
            state: StateFilter::parse(state)?,
            level,
            session: non_empty(session),
            window: non_empty(window),
            pane: non_empty(pane),
            older_than: non_empty(older_than),
            newer_than: non_empty(newer_than),
            read: ReadFilter::parse(read)?,
        })
    }

    pub fn matches(&self, n: &Notification) -> bool {
        if let StateFilter::Only(state) = self.state
            && n.state != state
        {
            return false;
        }
        if self.level.is_some_and(|level| n.level != level) {
            return false;
        }
        if self.session.as_deref().is_some_and(|s| n.session != s)
            || self.window.as_deref().is_some_and(|w| n.window != w)
            || self.pane.as_deref().is_some_and(|p| n.pane != p)
        {
            return false;
        }
        if self
            .older_than
            .as_deref()
            .is_some_and(|cutoff| n.timestamp.as_str() >= cutoff)
        {
            return false;
        }
        if self
            .newer_than
            .as_deref()
            .is_some_and(|cutoff| n.timestamp.as_str() <= cutoff)
        {
            return false;
        }
        match self.read {
            ReadFilter::Any => true,
            ReadFilter::Read => n.is_read(),
            ReadFilter::Unread => !n.is_read(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::NewNotification;

    fn at(id: u64, ts: &str, level: &str, session: &str) -> Notification {
        NewNotification::new(format!("n{}", id), level)
            .with_timestamp(ts)
            .with_location(session, "@1", "%1")
            .into_notification(id, ts)
            .unwrap()
    }

    #[test]
    fn empty_filter_matches_everything() {
        let f = ListFilter::parse("", "", "", "", "", "", "", "").unwrap();
        assert_eq!(f, ListFilter::all());
        assert!(f.matches(&at(1, "2026-01-01T00:00:00Z", "info", "s")));
        assert_eq!(StateFilter::parse("all").unwrap(), StateFilter::All);
    }

    #[test]
    fn parse_rejects_bad_values() {
        assert!(matches!(
            ListFilter::parse("gone", "", "", "", "", "", "", ""),
            Err(ValidationError::InvalidState(_))
        ));
        assert!(matches!(
            ListFilter::parse("", "loud", "", "", "", "", "", ""),
            Err(ValidationError::InvalidLevel(_))
        ));
        assert!(matches!(
            ListFilter::parse("", "", "", "", "", "soon", "", ""),
            Err(ValidationError::InvalidTimestamp { field: "older_than", .. })
        ));
        assert!(matches!(
            ListFilter::parse("", "", "", "", "", "", "", "maybe"),
            Err(ValidationError::InvalidReadFilter(_))
        ));
    }

    #[test]
    fn time_bounds_are_exclusive() {
        let n = at(1, "2026-01-02T00:00:00Z", "info", "s");

        let older = ListFilter::parse("", "", "", "", "", "2026-01-02T00:00:00Z", "", "").unwrap();
        assert!(!older.matches(&n));
        let older = ListFilter::parse("", "", "", "", "", "2026-01-02T00:00:01Z", "", "").unwrap();
        assert!(older.matches(&n));

        let newer = ListFilter::parse("", "", "", "", "", "", "2026-01-02T00:00:00Z", "").unwrap();
        assert!(!newer.matches(&n));
        let newer = ListFilter::parse("", "", "", "", "", "", "2026-01-01T23:59:59Z", "").unwrap();
        assert!(newer.matches(&n));
    }

    #[test]
    fn predicates_combine() {
        let n = at(1, "2026-01-02T00:00:00Z", "error", "work");
        let f = ListFilter::parse("active", "error", "work", "@1", "%1", "", "", "unread").unwrap();
        assert!(f.matches(&n));

        let f = ListFilter::parse("active", "error", "home", "", "", "", "", "").unwrap();
        assert!(!f.matches(&n));

        let f = ListFilter::parse("dismissed", "", "", "", "", "", "", "").unwrap();
        assert!(!f.matches(&n));
        assert!(f.matches(&n.dismissed()));

        let read = n.with_read_timestamp("2026-01-03T00:00:00Z");
        assert!(ListFilter::parse("", "", "", "", "", "", "", "read").unwrap().matches(&read));
        assert!(!ListFilter::parse("", "", "", "", "", "", "", "unread").unwrap().matches(&read));
    }
}
