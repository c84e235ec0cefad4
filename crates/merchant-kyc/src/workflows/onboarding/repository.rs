use chrono::{DateTime, Utc};

use super::domain::{
    Application, ApplicationId, ApplicationStatus, BusinessProfile, Document, DocumentId,
    StatusHistoryEntry, User, UserId,
};

/// Mutation applied to a single application row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationChange {
    Profile(BusinessProfile),
    Status(ApplicationStatus),
    Review {
        status: ApplicationStatus,
        reviewer_id: UserId,
        comment: Option<String>,
    },
}

/// A change that only lands when the row is still in one of `allowed_from`.
///
/// Implementations must check the guard and write the change as one atomic step, returning
/// [`RepositoryError::StateConflict`] with the observed status when the guard fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardedUpdate {
    pub allowed_from: Option<Vec<ApplicationStatus>>,
    pub change: ApplicationChange,
    pub at: DateTime<Utc>,
}

impl GuardedUpdate {
    pub fn permits(&self, current: ApplicationStatus) -> bool {
        self.allowed_from
            .as_ref()
            .map_or(true, |allowed| allowed.contains(&current))
    }
}

/// Storage abstraction for applications so the service can run against any datastore.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError>;
    /// Most recent application by creation time; later inserts win ties.
    fn latest_for_merchant(
        &self,
        merchant_id: &UserId,
    ) -> Result<Option<Application>, RepositoryError>;
    /// All applications, optionally with one status, most recently updated first.
    fn list(&self, status: Option<ApplicationStatus>)
        -> Result<Vec<Application>, RepositoryError>;
    fn apply(
        &self,
        id: &ApplicationId,
        update: GuardedUpdate,
    ) -> Result<Application, RepositoryError>;
}

pub trait DocumentRepository: Send + Sync {
    fn insert(&self, document: Document) -> Result<Document, RepositoryError>;
    fn fetch(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError>;
    /// Documents of one application in upload order.
    fn list_for(&self, application_id: &ApplicationId) -> Result<Vec<Document>, RepositoryError>;
}

/// Append-only store for the audit trail. Entries are never updated or deleted.
pub trait HistoryRepository: Send + Sync {
    fn append(&self, entry: StatusHistoryEntry) -> Result<StatusHistoryEntry, RepositoryError>;
    fn list_for(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError>;
}

/// Read side of the user table owned by the auth provider.
pub trait UserDirectory: Send + Sync {
    fn fetch(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record is {found}, change not permitted")]
    StateConflict { found: ApplicationStatus },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
