use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mockable::Clock;

use super::domain::{ApplicationId, Document, DocumentId, StorageLocator};
use super::error::OnboardingError;
use super::repository::{ApplicationRepository, DocumentRepository};

static DOCUMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_document_id() -> DocumentId {
    let id = DOCUMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    DocumentId(format!("doc-{id:06}"))
}

/// Metadata of a file that has already been written to the object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    pub application_id: ApplicationId,
    pub doc_type: String,
    pub original_name: String,
    pub storage_path: StorageLocator,
    pub mime_type: String,
    pub file_size: u64,
}

/// What a caller needs to stream a stored document back out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDocument {
    pub application_id: ApplicationId,
    pub storage_path: StorageLocator,
    pub original_name: String,
    pub mime_type: String,
}

/// Tracks uploaded file metadata per application.
pub struct DocumentRegistry {
    applications: Arc<dyn ApplicationRepository>,
    documents: Arc<dyn DocumentRepository>,
    clock: Arc<dyn Clock>,
}

impl DocumentRegistry {
    pub fn new(
        applications: Arc<dyn ApplicationRepository>,
        documents: Arc<dyn DocumentRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            applications,
            documents,
            clock,
        }
    }

    /// Append a document row. Repeated uploads under one `doc_type` add further rows.
    pub fn attach(&self, document: NewDocument) -> Result<Document, OnboardingError> {
        if self.applications.fetch(&document.application_id)?.is_none() {
            return Err(OnboardingError::NotFound("application"));
        }

        let doc_type = document.doc_type.trim();
        if doc_type.is_empty() {
            return Err(OnboardingError::Validation("doc_type is required".to_string()));
        }

        let record = Document {
            id: next_document_id(),
            application_id: document.application_id,
            doc_type: doc_type.to_string(),
            original_name: document.original_name,
            storage_path: document.storage_path,
            mime_type: document.mime_type,
            file_size: document.file_size,
            uploaded_at: self.clock.utc(),
        };

        Ok(self.documents.insert(record)?)
    }

    /// Documents in upload order; empty when nothing has been uploaded.
    pub fn list_for(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<Document>, OnboardingError> {
        let mut documents = self.documents.list_for(application_id)?;
        documents.sort_by_key(|document| document.uploaded_at);
        Ok(documents)
    }

    pub fn resolve(&self, document_id: &DocumentId) -> Result<ResolvedDocument, OnboardingError> {
        let document = self
            .documents
            .fetch(document_id)?
            .ok_or(OnboardingError::NotFound("document"))?;

        Ok(ResolvedDocument {
            application_id: document.application_id,
            storage_path: document.storage_path,
            original_name: document.original_name,
            mime_type: document.mime_type,
        })
    }
}
