//! Merchant KYC application lifecycle and review workflow.
//!
//! A merchant drafts an application, attaches documents, and submits it; a reviewer approves,
//! rejects, or asks for more material. Every status change is attributed to an actor and
//! appended to the audit trail. Persistence and object storage sit behind the ports in
//! [`repository`] and [`storage`].

pub mod audit;
pub mod config;
pub mod documents;
pub mod domain;
pub mod error;
pub mod memory;
pub mod policy;
pub mod repository;
pub mod router;
pub mod service;
pub mod storage;

#[cfg(test)]
mod tests;

pub use audit::{write_csv, AuditTrail, TransitionEvent};
pub use config::WorkflowConfig;
pub use documents::{DocumentRegistry, NewDocument, ResolvedDocument};
pub use domain::{
    Actor, Application, ApplicationDetail, ApplicationId, ApplicationStatus, ApplicationSummary,
    BusinessProfile, Caller, Document, DocumentId, EntryId, ReviewDecision, Role,
    StatusHistoryEntry, StorageLocator, User, UserId,
};
pub use error::{DependencyError, OnboardingError};
pub use memory::{MemoryObjectStore, MemoryStore};
pub use mockable::{Clock, DefaultClock};
pub use policy::{authorize, AccessDecision, DenialReason, Operation, OperationScope};
pub use repository::{
    ApplicationChange, ApplicationRepository, DocumentRepository, GuardedUpdate,
    HistoryRepository, RepositoryError, UserDirectory,
};
pub use router::{application_router, caller_from_headers, USER_ID_HEADER, USER_ROLE_HEADER};
pub use service::{
    DocumentUpload, FetchedDocument, OnboardingPorts, OnboardingService, TransitionReceipt,
};
pub use storage::{NewObject, ObjectStore, StorageError, StreamedObject};
