//! Single decision point for role and ownership checks.
//!
//! Every operation of the workflow is tagged with the scope that may invoke it. The service
//! consults [`authorize`] before it touches any repository, so a denied caller never observes
//! whether the target exists.

use std::fmt;

use super::domain::{Actor, Caller, Role, UserId};

/// Operations the workflow exposes to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateApplication,
    EditApplication,
    SubmitApplication,
    ViewOwnApplication,
    UploadDocument,
    ListApplications,
    ViewApplicationDetail,
    ReviewApplication,
    ViewHistory,
    FetchDocument,
}

/// Which role an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationScope {
    /// Owning merchant only.
    Merchant,
    /// Any reviewer, against any application.
    Reviewer,
    /// Reviewers, or the merchant owning the target.
    Shared,
}

impl Operation {
    pub const fn scope(self) -> OperationScope {
        match self {
            Operation::CreateApplication
            | Operation::EditApplication
            | Operation::SubmitApplication
            | Operation::ViewOwnApplication
            | Operation::UploadDocument => OperationScope::Merchant,
            Operation::ListApplications
            | Operation::ViewApplicationDetail
            | Operation::ReviewApplication
            | Operation::ViewHistory => OperationScope::Reviewer,
            Operation::FetchDocument => OperationScope::Shared,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Operation::CreateApplication => "create application",
            Operation::EditApplication => "edit application",
            Operation::SubmitApplication => "submit application",
            Operation::ViewOwnApplication => "view application",
            Operation::UploadDocument => "upload document",
            Operation::ListApplications => "list applications",
            Operation::ViewApplicationDetail => "view application detail",
            Operation::ReviewApplication => "review application",
            Operation::ViewHistory => "view status history",
            Operation::FetchDocument => "fetch document",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    Unauthenticated,
    RoleNotPermitted,
    NotOwner,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision<'a> {
    Allow(&'a Actor),
    Deny(DenialReason),
}

impl AccessDecision<'_> {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow(_))
    }
}

/// Decide whether `caller` may perform `operation` on a target owned by `owner`.
///
/// Passing `None` as owner checks role eligibility only; callers resolve the target afterwards
/// and check again with the real owner when the scope depends on ownership.
pub fn authorize<'a>(
    caller: &'a Caller,
    operation: Operation,
    owner: Option<&UserId>,
) -> AccessDecision<'a> {
    let Some(actor) = caller.actor() else {
        return AccessDecision::Deny(DenialReason::Unauthenticated);
    };

    let owns_target = owner.map_or(true, |owner| owner == &actor.id);

    match (operation.scope(), actor.role) {
        (OperationScope::Reviewer, Role::Reviewer) | (OperationScope::Shared, Role::Reviewer) => {
            AccessDecision::Allow(actor)
        }
        (OperationScope::Merchant, Role::Merchant) | (OperationScope::Shared, Role::Merchant) => {
            if owns_target {
                AccessDecision::Allow(actor)
            } else {
                AccessDecision::Deny(DenialReason::NotOwner)
            }
        }
        (OperationScope::Merchant, Role::Reviewer) | (OperationScope::Reviewer, Role::Merchant) => {
            AccessDecision::Deny(DenialReason::RoleNotPermitted)
        }
    }
}
