use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for merchant applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

/// Identifier wrapper for uploaded documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

/// Identifier wrapper for audit trail entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub String);

/// Identity issued by the upstream auth provider for merchants and reviewers alike.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Opaque key into the object store. Never parsed by the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageLocator(pub String);

macro_rules! display_inner {
    ($($name:ident),+) => {
        $(
            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }
        )+
    };
}

display_inner!(ApplicationId, DocumentId, EntryId, UserId, StorageLocator);

/// Error raised when a plain text token does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownToken {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownToken {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Merchant,
    Reviewer,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Merchant => "merchant",
            Role::Reviewer => "reviewer",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownToken;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "merchant" => Ok(Self::Merchant),
            "reviewer" => Ok(Self::Reviewer),
            other => Err(UnknownToken::new("role", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Verified identity and role handed over by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

/// Whoever is invoking a workflow operation. Anonymous callers are always denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    Authenticated(Actor),
}

impl Caller {
    pub fn merchant(id: impl Into<String>) -> Self {
        Self::Authenticated(Actor {
            id: UserId(id.into()),
            role: Role::Merchant,
        })
    }

    pub fn reviewer(id: impl Into<String>) -> Self {
        Self::Authenticated(Actor {
            id: UserId(id.into()),
            role: Role::Reviewer,
        })
    }

    pub fn actor(&self) -> Option<&Actor> {
        match self {
            Caller::Anonymous => None,
            Caller::Authenticated(actor) => Some(actor),
        }
    }
}

/// Lifecycle states an application can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
    NeedsMoreDocs,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 5] = [
        ApplicationStatus::Draft,
        ApplicationStatus::Pending,
        ApplicationStatus::Approved,
        ApplicationStatus::Rejected,
        ApplicationStatus::NeedsMoreDocs,
    ];

    /// States in which the owning merchant may still edit and submit.
    pub const EDITABLE: [ApplicationStatus; 2] =
        [ApplicationStatus::Draft, ApplicationStatus::NeedsMoreDocs];

    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::NeedsMoreDocs => "needs_more_docs",
        }
    }

    pub const fn is_editable(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Draft | ApplicationStatus::NeedsMoreDocs
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, ApplicationStatus::Approved | ApplicationStatus::Rejected)
    }

    pub fn non_terminal() -> Vec<ApplicationStatus> {
        Self::ALL
            .into_iter()
            .filter(|status| !status.is_terminal())
            .collect()
    }
}

impl FromStr for ApplicationStatus {
    type Err = UnknownToken;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.label() == value)
            .ok_or_else(|| UnknownToken::new("status", value))
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcomes a reviewer may record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
    NeedsMoreDocs,
}

impl ReviewDecision {
    pub const fn status(self) -> ApplicationStatus {
        match self {
            ReviewDecision::Approved => ApplicationStatus::Approved,
            ReviewDecision::Rejected => ApplicationStatus::Rejected,
            ReviewDecision::NeedsMoreDocs => ApplicationStatus::NeedsMoreDocs,
        }
    }
}

impl FromStr for ReviewDecision {
    type Err = UnknownToken;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "needs_more_docs" => Ok(Self::NeedsMoreDocs),
            other => Err(UnknownToken::new("review decision", other)),
        }
    }
}

pub const MAX_FIELD_CHARS: usize = 512;

/// Business details a merchant fills in. Every text field may be absent while drafting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessProfile {
    pub business_name: Option<String>,
    pub business_category: Option<String>,
    pub business_subcategory: Option<String>,
    pub free_zone: bool,
    pub country: Option<String>,
    pub website: Option<String>,
    pub business_description: Option<String>,
    pub monthly_volume: Option<String>,
    pub owner_name: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("{field} exceeds {max} characters")]
    FieldTooLong { field: &'static str, max: usize },
    #[error("website must start with http:// or https://")]
    InvalidWebsite,
}

impl BusinessProfile {
    /// Trim every field, drop blanks, and enforce structural limits.
    pub fn sanitized(self) -> Result<Self, ProfileError> {
        let profile = Self {
            business_name: clean("business_name", self.business_name)?,
            business_category: clean("business_category", self.business_category)?,
            business_subcategory: clean("business_subcategory", self.business_subcategory)?,
            free_zone: self.free_zone,
            country: clean("country", self.country)?,
            website: clean("website", self.website)?,
            business_description: clean("business_description", self.business_description)?,
            monthly_volume: clean("monthly_volume", self.monthly_volume)?,
            owner_name: clean("owner_name", self.owner_name)?,
            contact_phone: clean("contact_phone", self.contact_phone)?,
            contact_address: clean("contact_address", self.contact_address)?,
        };

        if let Some(website) = &profile.website {
            let lower = website.to_ascii_lowercase();
            if !(lower.starts_with("http://") || lower.starts_with("https://")) {
                return Err(ProfileError::InvalidWebsite);
            }
        }

        Ok(profile)
    }

    /// Fields that must be present before the application can be submitted.
    pub fn missing_for_submission(&self) -> Vec<&'static str> {
        [
            ("business_name", &self.business_name),
            ("business_category", &self.business_category),
            ("country", &self.country),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(field, _)| field)
        .collect()
    }
}

fn clean(field: &'static str, value: Option<String>) -> Result<Option<String>, ProfileError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_FIELD_CHARS {
        return Err(ProfileError::FieldTooLong {
            field,
            max: MAX_FIELD_CHARS,
        });
    }
    Ok(Some(trimmed.to_string()))
}

/// A merchant's KYC submission and its review status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub merchant_id: UserId,
    #[serde(flatten)]
    pub profile: BusinessProfile,
    pub status: ApplicationStatus,
    pub reviewer_comment: Option<String>,
    pub reviewer_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata for an uploaded file. The bytes live in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub application_id: ApplicationId,
    pub doc_type: String,
    pub original_name: String,
    pub storage_path: StorageLocator,
    pub mime_type: String,
    pub file_size: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// One immutable row of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: EntryId,
    pub application_id: ApplicationId,
    pub changed_by: UserId,
    /// `None` when the prior status could not be read.
    pub old_status: Option<ApplicationStatus>,
    pub new_status: ApplicationStatus,
    pub comment: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub full_name: String,
    pub role: Role,
}

/// Row of the reviewer queue: the application joined with its merchant's contact data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationSummary {
    pub id: ApplicationId,
    pub merchant_id: UserId,
    pub merchant_name: Option<String>,
    pub email: Option<String>,
    pub business_name: Option<String>,
    pub country: Option<String>,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationSummary {
    pub fn new(application: &Application, merchant: Option<&User>) -> Self {
        Self {
            id: application.id.clone(),
            merchant_id: application.merchant_id.clone(),
            merchant_name: merchant.map(|user| user.full_name.clone()),
            email: merchant.map(|user| user.email.clone()),
            business_name: application.profile.business_name.clone(),
            country: application.profile.country.clone(),
            status: application.status,
            created_at: application.created_at,
            updated_at: application.updated_at,
        }
    }
}

/// Everything a reviewer needs to decide on one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationDetail {
    #[serde(flatten)]
    pub application: Application,
    pub merchant_name: Option<String>,
    pub email: Option<String>,
    pub documents: Vec<Document>,
    pub history: Vec<StatusHistoryEntry>,
}
