use std::io::Write;

use super::domain::{ApplicationId, StorageLocator};

/// Bytes handed to the object store together with the metadata used to name them.
#[derive(Debug, Clone, Copy)]
pub struct NewObject<'a> {
    pub application_id: &'a ApplicationId,
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub bytes: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamedObject {
    pub content_type: String,
    pub bytes_written: u64,
}

/// Binary object store holding uploaded files.
pub trait ObjectStore: Send + Sync {
    fn put(&self, object: NewObject<'_>) -> Result<StorageLocator, StorageError>;
    fn stream_to(
        &self,
        locator: &StorageLocator,
        sink: &mut dyn Write,
    ) -> Result<StreamedObject, StorageError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("object {0} not found")]
    NotFound(StorageLocator),
    #[error("object store unavailable: {0}")]
    Backend(String),
    #[error("object store io failure: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

/// Reduce a client supplied filename to a single safe path segment.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Object key layout shared by the store adapters: `{application}/{unique}_{file name}`.
pub fn object_key(application_id: &ApplicationId, unique: &str, file_name: &str) -> String {
    format!(
        "{}/{}_{}",
        sanitize_file_name(&application_id.0),
        unique,
        sanitize_file_name(file_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories_and_odd_characters() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\scans\\my id.pdf"), "my_id.pdf");
        assert_eq!(sanitize_file_name("..."), "upload");
        assert_eq!(sanitize_file_name(""), "upload");
    }

    #[test]
    fn object_key_nests_under_application() {
        let key = object_key(&ApplicationId("app-000007".to_string()), "42", "passport.png");
        assert_eq!(key, "app-000007/42_passport.png");
    }
}
