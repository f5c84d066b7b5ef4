// ABOUTME: The NotificationStore trait implemented by the flat-file, SQLite and dual backends.
// ABOUTME: Also defines cleanup request/outcome types and the tab-separated output adapters.

use chrono::Utc;
use intray_core::timestamp::{cutoff_days_before, utc_now};
use intray_core::validate::{parse_id, validate_timestamp};
use intray_core::{ListFilter, NewNotification, Notification, encode_line};
use serde::Serialize;

use crate::error::StorageError;

/// Which dismissed notifications a cleanup removes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CleanupRequest {
    /// Age threshold in days. Zero means every dismissed notification.
    pub days_threshold: u32,
    /// Pre-computed cutoff. Takes precedence over `days_threshold`.
    pub cutoff: Option<String>,
    pub dry_run: bool,
}

impl CleanupRequest {
    pub fn older_than_days(days_threshold: u32, dry_run: bool) -> Self {
        Self {
            days_threshold,
            cutoff: None,
            dry_run,
        }
    }

    /// The exclusive cutoff timestamp, or `None` when there is no threshold.
    pub fn resolve_cutoff(&self) -> Result<Option<String>, StorageError> {
        match &self.cutoff {
            Some(cutoff) => {
                validate_timestamp("cutoff", cutoff)?;
                Ok(Some(cutoff.clone()))
            }
            None => Ok(cutoff_days_before(Utc::now(), self.days_threshold)),
        }
    }

    /// Copy of this request with the cutoff pinned, so that it can be
    /// replayed against another store with the same result.
    pub fn resolved(&self) -> Result<Self, StorageError> {
        Ok(Self {
            cutoff: self.resolve_cutoff()?,
            ..self.clone()
        })
    }

    pub fn removes(cutoff: Option<&str>, n: &Notification) -> bool {
        !n.is_active() && cutoff.is_none_or(|c| n.timestamp.as_str() < c)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CleanupOutcome {
    pub cutoff: Option<String>,
    /// Dismissed notifications older than the cutoff.
    pub matched: usize,
    /// Notifications actually deleted. Zero on a dry run.
    pub deleted: usize,
}

/// Reject id zero, which no store ever assigns.
pub(crate) fn check_id(id: u64) -> Result<(), StorageError> {
    if id == 0 {
        return Err(StorageError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Storage operations over notifications. Every implementation runs the
/// same validation and reports the same `ErrorKind` for the same input.
pub trait NotificationStore: Send + Sync {
    /// Create an active, unread notification and return its id.
    fn add(&self, input: NewNotification) -> Result<u64, StorageError>;

    /// Current notifications matching `filter`, sorted by id.
    fn list(&self, filter: &ListFilter) -> Result<Vec<Notification>, StorageError>;

    fn get(&self, id: u64) -> Result<Notification, StorageError>;

    fn dismiss(&self, id: u64) -> Result<(), StorageError>;

    /// Dismiss every active notification. Returns how many were dismissed.
    fn dismiss_all(&self) -> Result<usize, StorageError>;

    /// Dismiss active notifications at a tmux location. Empty arguments
    /// match anything.
    fn dismiss_matching(&self, session: &str, window: &str, pane: &str)
    -> Result<usize, StorageError>;

    fn mark_read(&self, id: u64) -> Result<(), StorageError> {
        self.mark_read_at(id, &utc_now())
    }

    fn mark_read_at(&self, id: u64, read_timestamp: &str) -> Result<(), StorageError>;

    fn mark_unread(&self, id: u64) -> Result<(), StorageError>;

    fn cleanup(&self, request: &CleanupRequest) -> Result<CleanupOutcome, StorageError>;

    fn cleanup_old_notifications(
        &self,
        days_threshold: u32,
        dry_run: bool,
    ) -> Result<CleanupOutcome, StorageError> {
        self.cleanup(&CleanupRequest::older_than_days(days_threshold, dry_run))
    }

    fn active_count(&self) -> Result<usize, StorageError>;

    /// True when the store holds no notifications at all.
    fn is_empty(&self) -> Result<bool, StorageError>;

    /// Highest id this store has ever issued or reserved, including ids of
    /// rows that have since been deleted.
    fn high_water(&self) -> Result<u64, StorageError>;

    /// Ensure no id at or below `id` is ever issued again.
    fn reserve_ids(&self, id: u64) -> Result<(), StorageError>;

    /// Store the given rows verbatim, replacing any with the same id.
    fn import(&self, rows: &[Notification]) -> Result<usize, StorageError>;

    /// Matching notifications as tab-separated lines joined by newlines.
    fn list_tsv(&self, filter: &ListFilter) -> Result<String, StorageError> {
        let rows = self.list(filter)?;
        Ok(rows.iter().map(encode_line).collect::<Vec<_>>().join("\n"))
    }

    /// One notification as a tab-separated line, looked up by a raw id.
    fn get_line(&self, raw_id: &str) -> Result<String, StorageError> {
        let id = parse_id(raw_id)?;
        Ok(encode_line(&self.get(id)?))
    }
}
