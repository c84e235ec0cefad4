use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mockable::{Clock, DefaultClock};
use tracing::{debug, info, warn};

use super::audit::{AuditTrail, TransitionEvent};
use super::config::WorkflowConfig;
use super::documents::{DocumentRegistry, NewDocument};
use super::domain::{
    Actor, Application, ApplicationDetail, ApplicationId, ApplicationStatus, ApplicationSummary,
    BusinessProfile, Caller, Document, DocumentId, ReviewDecision, Role, StatusHistoryEntry,
    User, UserId,
};
use super::error::{DependencyError, OnboardingError};
use super::policy::{self, AccessDecision, DenialReason, Operation};
use super::repository::{
    ApplicationChange, ApplicationRepository, DocumentRepository, GuardedUpdate,
    HistoryRepository, RepositoryError, UserDirectory,
};
use super::storage::{NewObject, ObjectStore};

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

/// The collaborators the workflow runs against.
#[derive(Clone)]
pub struct OnboardingPorts {
    pub applications: Arc<dyn ApplicationRepository>,
    pub documents: Arc<dyn DocumentRepository>,
    pub history: Arc<dyn HistoryRepository>,
    pub users: Arc<dyn UserDirectory>,
    pub objects: Arc<dyn ObjectStore>,
}

/// Result of a status transition.
///
/// The transition itself has been applied when this is returned. `audit_error` carries a
/// failed history append, which is reported but never rolled back.
#[derive(Debug)]
pub struct TransitionReceipt {
    pub application: Application,
    pub entry: Option<StatusHistoryEntry>,
    pub audit_error: Option<DependencyError>,
}

/// A file handed in by a merchant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUpload {
    pub doc_type: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub original_name: String,
    pub mime_type: String,
    pub bytes_written: u64,
}

/// Service composing the access policy, document registry, and audit trail around the
/// application state machine.
pub struct OnboardingService {
    applications: Arc<dyn ApplicationRepository>,
    users: Arc<dyn UserDirectory>,
    objects: Arc<dyn ObjectStore>,
    documents: DocumentRegistry,
    audit: AuditTrail,
    config: WorkflowConfig,
    clock: Arc<dyn Clock>,
}

impl OnboardingService {
    pub fn new(ports: OnboardingPorts, config: WorkflowConfig) -> Self {
        Self::with_clock(ports, config, Arc::new(DefaultClock))
    }

    pub fn with_clock(
        ports: OnboardingPorts,
        config: WorkflowConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let OnboardingPorts {
            applications,
            documents,
            history,
            users,
            objects,
        } = ports;

        Self {
            documents: DocumentRegistry::new(applications.clone(), documents, clock.clone()),
            audit: AuditTrail::new(history, clock.clone()),
            applications,
            users,
            objects,
            config,
            clock,
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn documents(&self) -> &DocumentRegistry {
        &self.documents
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// Open a new draft. Partial profiles are fine at this stage.
    pub fn create(
        &self,
        caller: &Caller,
        profile: BusinessProfile,
    ) -> Result<Application, OnboardingError> {
        let actor = authorize(caller, Operation::CreateApplication, None)?;
        let profile = sanitize(profile)?;
        let now = self.clock.utc();

        let application = Application {
            id: next_application_id(),
            merchant_id: actor.id.clone(),
            profile,
            status: ApplicationStatus::Draft,
            reviewer_comment: None,
            reviewer_id: None,
            created_at: now,
            updated_at: now,
        };

        let stored = self.applications.insert(application)?;
        info!(application_id = %stored.id, merchant_id = %actor.id, "application created");
        Ok(stored)
    }

    /// Overwrite the profile of the merchant's most recent application.
    pub fn edit(
        &self,
        caller: &Caller,
        profile: BusinessProfile,
    ) -> Result<Application, OnboardingError> {
        let actor = authorize(caller, Operation::EditApplication, None)?;
        let profile = sanitize(profile)?;
        let current = self.own_latest(caller, actor, Operation::EditApplication)?;
        ensure_editable(&current, Operation::EditApplication)?;

        let update = GuardedUpdate {
            allowed_from: Some(ApplicationStatus::EDITABLE.to_vec()),
            change: ApplicationChange::Profile(profile),
            at: self.clock.utc(),
        };
        let updated = self
            .applications
            .apply(&current.id, update)
            .map_err(|err| transition_error(err, Operation::EditApplication))?;

        debug!(application_id = %updated.id, "application profile updated");
        Ok(updated)
    }

    /// Hand the merchant's most recent application to the review queue.
    pub fn submit(&self, caller: &Caller) -> Result<TransitionReceipt, OnboardingError> {
        let actor = authorize(caller, Operation::SubmitApplication, None)?;
        let current = self.own_latest(caller, actor, Operation::SubmitApplication)?;
        ensure_editable(&current, Operation::SubmitApplication)?;

        let missing = current.profile.missing_for_submission();
        if !missing.is_empty() {
            return Err(OnboardingError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let minimum = self.config.minimum_documents_on_submit;
        if minimum > 0 {
            let attached = self.documents.list_for(&current.id)?.len();
            if attached < minimum {
                return Err(OnboardingError::Validation(format!(
                    "at least {minimum} document(s) required before submission, found {attached}"
                )));
            }
        }

        let update = GuardedUpdate {
            allowed_from: Some(ApplicationStatus::EDITABLE.to_vec()),
            change: ApplicationChange::Status(ApplicationStatus::Pending),
            at: self.clock.utc(),
        };
        let updated = self
            .applications
            .apply(&current.id, update)
            .map_err(|err| transition_error(err, Operation::SubmitApplication))?;

        Ok(self.finish_transition(updated, &actor.id, Some(current.status), None))
    }

    /// Record a reviewer decision.
    ///
    /// The prior status is read on a best-effort basis: when that read fails the decision is
    /// still applied and audited, with the prior status left unknown.
    pub fn review(
        &self,
        caller: &Caller,
        application_id: &ApplicationId,
        decision: &str,
        comment: Option<String>,
    ) -> Result<TransitionReceipt, OnboardingError> {
        let actor = authorize(caller, Operation::ReviewApplication, None)?;
        let decision: ReviewDecision = decision
            .parse()
            .map_err(|err| OnboardingError::Validation(format!("{err}")))?;
        let comment = comment
            .map(|comment| comment.trim().to_string())
            .filter(|comment| !comment.is_empty());

        let old_status = match self.applications.fetch(application_id) {
            Ok(Some(application)) => Some(application.status),
            Ok(None) => return Err(OnboardingError::NotFound("application")),
            Err(err) => {
                warn!(
                    application_id = %application_id,
                    error = %err,
                    "prior status unreadable, recording review with unknown old status"
                );
                None
            }
        };

        let allowed_from = if self.config.reopen_terminal {
            None
        } else {
            Some(ApplicationStatus::non_terminal())
        };
        let update = GuardedUpdate {
            allowed_from,
            change: ApplicationChange::Review {
                status: decision.status(),
                reviewer_id: actor.id.clone(),
                comment: comment.clone(),
            },
            at: self.clock.utc(),
        };
        let updated = self
            .applications
            .apply(application_id, update)
            .map_err(|err| transition_error(err, Operation::ReviewApplication))?;

        Ok(self.finish_transition(updated, &actor.id, old_status, comment))
    }

    /// The merchant's most recent application, if any.
    pub fn application_for(&self, caller: &Caller) -> Result<Option<Application>, OnboardingError> {
        let actor = authorize(caller, Operation::ViewOwnApplication, None)?;
        Ok(self.applications.latest_for_merchant(&actor.id)?)
    }

    /// Reviewer queue, most recently updated first.
    pub fn list_for_review(
        &self,
        caller: &Caller,
        status_filter: Option<&str>,
    ) -> Result<Vec<ApplicationSummary>, OnboardingError> {
        authorize(caller, Operation::ListApplications, None)?;
        let status = status_filter
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(|raw| raw.parse::<ApplicationStatus>())
            .transpose()
            .map_err(|err| OnboardingError::Validation(format!("{err}")))?;

        let applications = self.applications.list(status)?;
        let mut merchants: BTreeMap<UserId, Option<User>> = BTreeMap::new();
        let mut summaries = Vec::with_capacity(applications.len());

        for application in &applications {
            if !merchants.contains_key(&application.merchant_id) {
                let merchant = self.users.fetch(&application.merchant_id)?;
                merchants.insert(application.merchant_id.clone(), merchant);
            }
            let merchant = merchants
                .get(&application.merchant_id)
                .and_then(Option::as_ref);
            summaries.push(ApplicationSummary::new(application, merchant));
        }

        Ok(summaries)
    }

    /// Full profile, merchant contact, documents in upload order, and the audit trail.
    pub fn application_detail(
        &self,
        caller: &Caller,
        application_id: &ApplicationId,
    ) -> Result<ApplicationDetail, OnboardingError> {
        authorize(caller, Operation::ViewApplicationDetail, None)?;
        let application = self
            .applications
            .fetch(application_id)?
            .ok_or(OnboardingError::NotFound("application"))?;

        let merchant = self.users.fetch(&application.merchant_id)?;
        let documents = self.documents.list_for(application_id)?;
        let history = self.audit.history_for(application_id)?;

        Ok(ApplicationDetail {
            merchant_name: merchant.as_ref().map(|user| user.full_name.clone()),
            email: merchant.map(|user| user.email),
            application,
            documents,
            history,
        })
    }

    pub fn history(
        &self,
        caller: &Caller,
        application_id: &ApplicationId,
    ) -> Result<Vec<StatusHistoryEntry>, OnboardingError> {
        authorize(caller, Operation::ViewHistory, None)?;
        if self.applications.fetch(application_id)?.is_none() {
            return Err(OnboardingError::NotFound("application"));
        }
        Ok(self.audit.history_for(application_id)?)
    }

    /// Store a file and attach it to the merchant's most recent application.
    ///
    /// The application status is left untouched. Uploads are accepted in any status unless
    /// `uploads_require_editable` is set.
    pub fn upload_document(
        &self,
        caller: &Caller,
        upload: DocumentUpload,
    ) -> Result<Document, OnboardingError> {
        let actor = authorize(caller, Operation::UploadDocument, None)?;
        let current = self.own_latest(caller, actor, Operation::UploadDocument)?;
        if self.config.uploads_require_editable {
            ensure_editable(&current, Operation::UploadDocument)?;
        }

        let DocumentUpload {
            doc_type,
            file_name,
            content_type,
            bytes,
        } = upload;

        if doc_type.trim().is_empty() {
            return Err(OnboardingError::Validation("doc_type is required".to_string()));
        }
        if bytes.is_empty() {
            return Err(OnboardingError::Validation("file is empty".to_string()));
        }
        if bytes.len() > self.config.max_upload_bytes {
            return Err(OnboardingError::Validation(format!(
                "file exceeds {} bytes",
                self.config.max_upload_bytes
            )));
        }
        let mime_type = normalize_content_type(content_type.as_deref())?;
        let original_name = match file_name.trim() {
            "" => "upload".to_string(),
            name => name.to_string(),
        };

        let storage_path = self.objects.put(NewObject {
            application_id: &current.id,
            file_name: &original_name,
            content_type: &mime_type,
            bytes: &bytes,
        })?;

        let document = self.documents.attach(NewDocument {
            application_id: current.id,
            doc_type,
            original_name,
            storage_path,
            mime_type,
            file_size: bytes.len() as u64,
        })?;

        info!(
            application_id = %document.application_id,
            document_id = %document.id,
            doc_type = %document.doc_type,
            "document attached"
        );
        Ok(document)
    }

    /// Stream a stored document into `sink`.
    ///
    /// Merchants asking for a document that is missing or belongs to someone else get the
    /// same authorization error, so existence never leaks.
    pub fn fetch_document(
        &self,
        caller: &Caller,
        document_id: &DocumentId,
        sink: &mut dyn Write,
    ) -> Result<FetchedDocument, OnboardingError> {
        let actor = authorize(caller, Operation::FetchDocument, None)?;
        let is_reviewer = actor.role == Role::Reviewer;

        let resolved = match self.documents.resolve(document_id) {
            Ok(resolved) => resolved,
            Err(OnboardingError::NotFound(_)) if !is_reviewer => {
                return Err(denied(Operation::FetchDocument, DenialReason::NotOwner));
            }
            Err(err) => return Err(err),
        };

        if !is_reviewer {
            let owner = self
                .applications
                .fetch(&resolved.application_id)?
                .map(|application| application.merchant_id);
            match owner {
                Some(owner) => {
                    authorize(caller, Operation::FetchDocument, Some(&owner))?;
                }
                None => return Err(denied(Operation::FetchDocument, DenialReason::NotOwner)),
            }
        }

        let streamed = self.objects.stream_to(&resolved.storage_path, sink)?;
        Ok(FetchedDocument {
            original_name: resolved.original_name,
            mime_type: resolved.mime_type,
            bytes_written: streamed.bytes_written,
        })
    }

    fn own_latest(
        &self,
        caller: &Caller,
        actor: &Actor,
        operation: Operation,
    ) -> Result<Application, OnboardingError> {
        let application = self
            .applications
            .latest_for_merchant(&actor.id)?
            .ok_or(OnboardingError::NotFound("application"))?;
        authorize(caller, operation, Some(&application.merchant_id))?;
        Ok(application)
    }

    fn finish_transition(
        &self,
        application: Application,
        changed_by: &UserId,
        old_status: Option<ApplicationStatus>,
        comment: Option<String>,
    ) -> TransitionReceipt {
        info!(
            application_id = %application.id,
            changed_by = %changed_by,
            old_status = old_status.map_or("unknown", ApplicationStatus::label),
            new_status = %application.status,
            "application status changed"
        );

        let event = TransitionEvent {
            application_id: application.id.clone(),
            changed_by: changed_by.clone(),
            old_status,
            new_status: application.status,
            comment,
        };

        match self.audit.record(event) {
            Ok(entry) => TransitionReceipt {
                application,
                entry: Some(entry),
                audit_error: None,
            },
            Err(err) => TransitionReceipt {
                application,
                entry: None,
                audit_error: Some(err),
            },
        }
    }
}

fn authorize<'a>(
    caller: &'a Caller,
    operation: Operation,
    owner: Option<&UserId>,
) -> Result<&'a Actor, OnboardingError> {
    match policy::authorize(caller, operation, owner) {
        AccessDecision::Allow(actor) => Ok(actor),
        AccessDecision::Deny(reason) => {
            debug!(%operation, ?reason, "access denied");
            Err(denied(operation, reason))
        }
    }
}

fn denied(operation: Operation, reason: DenialReason) -> OnboardingError {
    OnboardingError::Authorization { operation, reason }
}

fn sanitize(profile: BusinessProfile) -> Result<BusinessProfile, OnboardingError> {
    profile
        .sanitized()
        .map_err(|err| OnboardingError::Validation(err.to_string()))
}

fn ensure_editable(application: &Application, operation: Operation) -> Result<(), OnboardingError> {
    if application.status.is_editable() {
        Ok(())
    } else {
        Err(OnboardingError::InvalidState {
            operation,
            status: application.status,
        })
    }
}

fn transition_error(err: RepositoryError, operation: Operation) -> OnboardingError {
    match err {
        RepositoryError::NotFound => OnboardingError::NotFound("application"),
        RepositoryError::StateConflict { found } => OnboardingError::InvalidState {
            operation,
            status: found,
        },
        other => other.into(),
    }
}

fn normalize_content_type(raw: Option<&str>) -> Result<String, OnboardingError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(mime::APPLICATION_OCTET_STREAM.to_string());
    };

    raw.parse::<mime::Mime>()
        .map(|parsed| parsed.essence_str().to_string())
        .map_err(|_| OnboardingError::Validation(format!("invalid content type '{raw}'")))
}
