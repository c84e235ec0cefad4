//! In-process adapters for every port, used by the standalone service, the demo and tests.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{
    Application, ApplicationId, ApplicationStatus, Document, DocumentId, StatusHistoryEntry,
    StorageLocator, User, UserId,
};
use super::repository::{
    ApplicationChange, ApplicationRepository, DocumentRepository, GuardedUpdate,
    HistoryRepository, RepositoryError, UserDirectory,
};
use super::service::OnboardingPorts;
use super::storage::{object_key, NewObject, ObjectStore, StorageError, StreamedObject};

#[derive(Debug, Default)]
struct Tables {
    applications: Vec<Application>,
    documents: Vec<Document>,
    history: Vec<StatusHistoryEntry>,
    users: BTreeMap<UserId, User>,
}

/// Mutex guarded tables. Each port call holds the lock for its whole duration, so guarded
/// updates are atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    fn tables(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("memory store lock poisoned".to_string()))
    }

    pub fn register_user(&self, user: User) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if tables.users.contains_key(&user.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.users.insert(user.id.clone(), user);
        Ok(())
    }

    pub fn history_len(&self) -> Result<usize, RepositoryError> {
        Ok(self.tables()?.history.len())
    }

    pub fn document_len(&self) -> Result<usize, RepositoryError> {
        Ok(self.tables()?.documents.len())
    }
}

impl ApplicationRepository for MemoryStore {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        let mut tables = self.tables()?;
        if tables
            .applications
            .iter()
            .any(|existing| existing.id == application.id)
        {
            return Err(RepositoryError::Conflict);
        }
        tables.applications.push(application.clone());
        Ok(application)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let tables = self.tables()?;
        Ok(tables
            .applications
            .iter()
            .find(|application| &application.id == id)
            .cloned())
    }

    fn latest_for_merchant(
        &self,
        merchant_id: &UserId,
    ) -> Result<Option<Application>, RepositoryError> {
        let tables = self.tables()?;
        // max_by_key keeps the last of equal keys, so later inserts win ties.
        Ok(tables
            .applications
            .iter()
            .filter(|application| &application.merchant_id == merchant_id)
            .max_by_key(|application| application.created_at)
            .cloned())
    }

    fn list(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<Application>, RepositoryError> {
        let tables = self.tables()?;
        let mut applications: Vec<Application> = tables
            .applications
            .iter()
            .filter(|application| status.map_or(true, |status| application.status == status))
            .cloned()
            .collect();
        applications.sort_by(|left, right| right.updated_at.cmp(&left.updated_at));
        Ok(applications)
    }

    fn apply(
        &self,
        id: &ApplicationId,
        update: GuardedUpdate,
    ) -> Result<Application, RepositoryError> {
        let mut tables = self.tables()?;
        let application = tables
            .applications
            .iter_mut()
            .find(|application| &application.id == id)
            .ok_or(RepositoryError::NotFound)?;

        if !update.permits(application.status) {
            return Err(RepositoryError::StateConflict {
                found: application.status,
            });
        }

        match update.change {
            ApplicationChange::Profile(profile) => application.profile = profile,
            ApplicationChange::Status(status) => application.status = status,
            ApplicationChange::Review {
                status,
                reviewer_id,
                comment,
            } => {
                application.status = status;
                application.reviewer_id = Some(reviewer_id);
                application.reviewer_comment = comment;
            }
        }
        application.updated_at = update.at;

        Ok(application.clone())
    }
}

impl DocumentRepository for MemoryStore {
    fn insert(&self, document: Document) -> Result<Document, RepositoryError> {
        let mut tables = self.tables()?;
        if tables.documents.iter().any(|existing| existing.id == document.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.documents.push(document.clone());
        Ok(document)
    }

    fn fetch(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        let tables = self.tables()?;
        Ok(tables
            .documents
            .iter()
            .find(|document| &document.id == id)
            .cloned())
    }

    fn list_for(&self, application_id: &ApplicationId) -> Result<Vec<Document>, RepositoryError> {
        let tables = self.tables()?;
        Ok(tables
            .documents
            .iter()
            .filter(|document| &document.application_id == application_id)
            .cloned()
            .collect())
    }
}

impl HistoryRepository for MemoryStore {
    fn append(&self, entry: StatusHistoryEntry) -> Result<StatusHistoryEntry, RepositoryError> {
        let mut tables = self.tables()?;
        tables.history.push(entry.clone());
        Ok(entry)
    }

    fn list_for(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError> {
        let tables = self.tables()?;
        Ok(tables
            .history
            .iter()
            .filter(|entry| &entry.application_id == application_id)
            .cloned()
            .collect())
    }
}

impl UserDirectory for MemoryStore {
    fn fetch(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables()?;
        Ok(tables.users.get(id).cloned())
    }
}

#[derive(Debug, Clone)]
struct StoredBytes {
    content_type: String,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredBytes>>,
    sequence: AtomicU64,
}

impl MemoryObjectStore {
    fn objects(&self) -> Result<MutexGuard<'_, BTreeMap<String, StoredBytes>>, StorageError> {
        self.objects
            .lock()
            .map_err(|_| StorageError::Backend("object map lock poisoned".to_string()))
    }

    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.objects()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.objects()?.is_empty())
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(&self, object: NewObject<'_>) -> Result<StorageLocator, StorageError> {
        let unique = self.sequence.fetch_add(1, Ordering::Relaxed).to_string();
        let key = object_key(object.application_id, &unique, object.file_name);
        self.objects()?.insert(
            key.clone(),
            StoredBytes {
                content_type: object.content_type.to_string(),
                bytes: object.bytes.to_vec(),
            },
        );
        Ok(StorageLocator(key))
    }

    fn stream_to(
        &self,
        locator: &StorageLocator,
        sink: &mut dyn Write,
    ) -> Result<StreamedObject, StorageError> {
        let stored = self
            .objects()?
            .get(&locator.0)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(locator.clone()))?;

        sink.write_all(&stored.bytes)?;
        Ok(StreamedObject {
            content_type: stored.content_type,
            bytes_written: stored.bytes.len() as u64,
        })
    }
}

impl OnboardingPorts {
    /// Wire every persistence port to one shared [`MemoryStore`].
    pub fn from_memory(store: Arc<MemoryStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            applications: store.clone(),
            documents: store.clone(),
            history: store.clone(),
            users: store,
            objects,
        }
    }
}
