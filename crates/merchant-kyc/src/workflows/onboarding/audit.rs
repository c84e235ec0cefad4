use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mockable::Clock;
use tracing::error;

use super::domain::{ApplicationId, ApplicationStatus, EntryId, StatusHistoryEntry, UserId};
use super::error::DependencyError;
use super::repository::HistoryRepository;

static ENTRY_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_entry_id() -> EntryId {
    let id = ENTRY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    EntryId(format!("hist-{id:06}"))
}

/// Facts about one status change, before it is stamped and stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionEvent {
    pub application_id: ApplicationId,
    pub changed_by: UserId,
    pub old_status: Option<ApplicationStatus>,
    pub new_status: ApplicationStatus,
    pub comment: Option<String>,
}

/// Append-only log of status transitions.
pub struct AuditTrail {
    history: Arc<dyn HistoryRepository>,
    clock: Arc<dyn Clock>,
}

impl AuditTrail {
    pub fn new(history: Arc<dyn HistoryRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { history, clock }
    }

    /// Append one entry. Failures are logged and returned; they never undo the transition.
    pub fn record(&self, event: TransitionEvent) -> Result<StatusHistoryEntry, DependencyError> {
        let entry = StatusHistoryEntry {
            id: next_entry_id(),
            application_id: event.application_id,
            changed_by: event.changed_by,
            old_status: event.old_status,
            new_status: event.new_status,
            comment: event.comment,
            changed_at: self.clock.utc(),
        };

        self.history.append(entry.clone()).map_err(|err| {
            error!(
                application_id = %entry.application_id,
                new_status = %entry.new_status,
                error = %err,
                "status history append failed"
            );
            DependencyError::from(err)
        })
    }

    /// Entries of one application, oldest first.
    pub fn history_for(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<StatusHistoryEntry>, DependencyError> {
        let mut entries = self.history.list_for(application_id)?;
        entries.sort_by_key(|entry| entry.changed_at);
        Ok(entries)
    }
}

pub const CSV_HEADER: [&str; 7] = [
    "id",
    "application_id",
    "changed_by",
    "old_status",
    "new_status",
    "comment",
    "changed_at",
];

/// Write entries as CSV for compliance exports. Unknown prior statuses become empty cells.
pub fn write_csv<W: Write>(entries: &[StatusHistoryEntry], writer: W) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(CSV_HEADER)?;

    for entry in entries {
        let changed_at = entry.changed_at.to_rfc3339();
        csv_writer.write_record([
            entry.id.0.as_str(),
            entry.application_id.0.as_str(),
            entry.changed_by.0.as_str(),
            entry.old_status.map_or("", ApplicationStatus::label),
            entry.new_status.label(),
            entry.comment.as_deref().unwrap_or_default(),
            changed_at.as_str(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}
