//! Merchant know-your-customer onboarding.
//!
//! The [`workflows::onboarding`] module holds the application lifecycle, access policy,
//! document registry, and audit trail. [`config`], [`telemetry`], and [`error`] carry the
//! process-level plumbing shared with the API service.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
