pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Policy dials for the onboarding workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    /// Let reviewers move `approved`/`rejected` applications to another decision.
    pub reopen_terminal: bool,
    pub minimum_documents_on_submit: usize,
    pub max_upload_bytes: usize,
    /// Only accept uploads while the application is `draft` or `needs_more_docs`.
    pub uploads_require_editable: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            reopen_terminal: true,
            minimum_documents_on_submit: 0,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            uploads_require_editable: false,
        }
    }
}
