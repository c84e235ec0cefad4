use chrono::Utc;
use merchant_kyc::error::AppError;
use merchant_kyc::workflows::onboarding::storage::object_key;
use merchant_kyc::workflows::onboarding::{
    MemoryStore, NewObject, ObjectStore, OnboardingError, StorageError, StorageLocator,
    StreamedObject, User,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

const MAX_KEY_ATTEMPTS: i64 = 8;

/// Object store writing each upload to `{root}/{application}/{nanos}_{file name}`.
#[derive(Debug, Clone)]
pub(crate) struct FilesystemObjectStore {
    root: PathBuf,
}

impl FilesystemObjectStore {
    pub(crate) fn new(root: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn resolve(&self, locator: &StorageLocator) -> Option<PathBuf> {
        let relative = Path::new(&locator.0);
        let contained = !locator.0.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        contained.then(|| self.root.join(relative))
    }
}

impl ObjectStore for FilesystemObjectStore {
    fn put(&self, object: NewObject<'_>) -> Result<StorageLocator, StorageError> {
        let nanos = Utc::now()
            .timestamp_nanos_opt()
            .ok_or_else(|| StorageError::Backend("clock outside nanosecond range".to_string()))?;

        for attempt in 0..MAX_KEY_ATTEMPTS {
            let key = object_key(
                object.application_id,
                &(nanos + attempt).to_string(),
                object.file_name,
            );
            let path = self.root.join(&key);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(object.bytes)?;
                    file.sync_all()?;
                    return Ok(StorageLocator(key));
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err.into()),
            }
        }

        Err(StorageError::Backend(format!(
            "no free object key for {}",
            object.file_name
        )))
    }

    fn stream_to(
        &self,
        locator: &StorageLocator,
        sink: &mut dyn Write,
    ) -> Result<StreamedObject, StorageError> {
        let path = self
            .resolve(locator)
            .ok_or_else(|| StorageError::NotFound(locator.clone()))?;

        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(locator.clone()))
            }
            Err(err) => return Err(err.into()),
        };

        let bytes_written = io::copy(&mut file, sink)?;
        let content_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(StreamedObject {
            content_type,
            bytes_written,
        })
    }
}

/// Load a JSON array of users into the directory. Returns how many were registered.
pub(crate) fn seed_users(store: &MemoryStore, path: &Path) -> Result<usize, AppError> {
    let raw = fs::read(path)?;
    let users: Vec<User> = serde_json::from_slice(&raw).map_err(io::Error::from)?;
    let count = users.len();
    for user in users {
        store
            .register_user(user)
            .map_err(|err| AppError::Workflow(OnboardingError::from(err)))?;
    }
    Ok(count)
}
