use std::sync::{Arc, Mutex};

use axum::http::{Request, StatusCode};
use axum::response::Response;
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use mockable::Clock;
use serde_json::Value;

use crate::workflows::onboarding::domain::{
    Application, ApplicationId, ApplicationStatus, BusinessProfile, Role, StatusHistoryEntry,
    User, UserId,
};
use crate::workflows::onboarding::memory::{MemoryObjectStore, MemoryStore};
use crate::workflows::onboarding::repository::{
    ApplicationRepository, GuardedUpdate, HistoryRepository, RepositoryError,
};
use crate::workflows::onboarding::{
    application_router, OnboardingPorts, OnboardingService, WorkflowConfig,
};

pub(super) const MERCHANT: &str = "merchant-1";
pub(super) const OTHER_MERCHANT: &str = "merchant-2";
pub(super) const REVIEWER: &str = "reviewer-1";

/// Clock that advances one second per reading so orderings are deterministic.
pub(super) struct SteppingClock {
    next: Mutex<DateTime<Utc>>,
}

impl Default for SteppingClock {
    fn default() -> Self {
        Self {
            next: Mutex::new(
                Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
                    .single()
                    .expect("valid start time"),
            ),
        }
    }
}

impl Clock for SteppingClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        let mut next = self.next.lock().expect("clock mutex poisoned");
        let now = *next;
        *next = now + Duration::seconds(1);
        now
    }
}

pub(super) fn profile() -> BusinessProfile {
    BusinessProfile {
        business_name: Some("Falcon Spices LLC".to_string()),
        business_category: Some("retail".to_string()),
        business_subcategory: Some("food".to_string()),
        free_zone: true,
        country: Some("AE".to_string()),
        website: Some("https://falconspices.example".to_string()),
        business_description: Some("Online spice shop".to_string()),
        monthly_volume: Some("50000-100000".to_string()),
        owner_name: Some("Layla Haddad".to_string()),
        contact_phone: Some("+971 4 555 0100".to_string()),
        contact_address: Some("Dubai Silicon Oasis".to_string()),
    }
}

pub(super) fn partial_profile() -> BusinessProfile {
    BusinessProfile {
        business_name: Some("Falcon Spices LLC".to_string()),
        ..BusinessProfile::default()
    }
}

pub(super) fn users() -> Vec<User> {
    vec![
        User {
            id: UserId(MERCHANT.to_string()),
            email: "layla@falconspices.example".to_string(),
            full_name: "Layla Haddad".to_string(),
            role: Role::Merchant,
        },
        User {
            id: UserId(OTHER_MERCHANT.to_string()),
            email: "omar@cedar.example".to_string(),
            full_name: "Omar Nassar".to_string(),
            role: Role::Merchant,
        },
        User {
            id: UserId(REVIEWER.to_string()),
            email: "compliance@kyc.example".to_string(),
            full_name: "Compliance Desk".to_string(),
            role: Role::Reviewer,
        },
    ]
}

pub(super) fn memory_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::default());
    for user in users() {
        store.register_user(user).expect("user registers");
    }
    store
}

pub(super) struct Harness {
    pub(super) service: OnboardingService,
    pub(super) store: Arc<MemoryStore>,
    pub(super) objects: Arc<MemoryObjectStore>,
}

pub(super) fn build_service() -> Harness {
    build_service_with(WorkflowConfig::default())
}

pub(super) fn build_service_with(config: WorkflowConfig) -> Harness {
    let store = memory_store();
    let objects = Arc::new(MemoryObjectStore::default());
    let ports = OnboardingPorts::from_memory(store.clone(), objects.clone());
    let service = OnboardingService::with_clock(ports, config, Arc::new(SteppingClock::default()));
    Harness {
        service,
        store,
        objects,
    }
}

pub(super) fn history_of(store: &MemoryStore, id: &ApplicationId) -> Vec<StatusHistoryEntry> {
    HistoryRepository::list_for(store, id).expect("history readable")
}

pub(super) fn stored(store: &MemoryStore, id: &ApplicationId) -> Application {
    ApplicationRepository::fetch(store, id)
        .expect("fetch succeeds")
        .expect("application present")
}

/// Delegates to a memory store but fails every single-row read.
pub(super) struct UnreadableApplications {
    pub(super) inner: Arc<MemoryStore>,
}

impl ApplicationRepository for UnreadableApplications {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        ApplicationRepository::insert(self.inner.as_ref(), application)
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        Err(RepositoryError::Unavailable("replica lagging".to_string()))
    }

    fn latest_for_merchant(
        &self,
        merchant_id: &UserId,
    ) -> Result<Option<Application>, RepositoryError> {
        self.inner.latest_for_merchant(merchant_id)
    }

    fn list(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<Application>, RepositoryError> {
        self.inner.list(status)
    }

    fn apply(
        &self,
        id: &ApplicationId,
        update: GuardedUpdate,
    ) -> Result<Application, RepositoryError> {
        self.inner.apply(id, update)
    }
}

pub(super) struct FailingHistory;

impl HistoryRepository for FailingHistory {
    fn append(&self, _entry: StatusHistoryEntry) -> Result<StatusHistoryEntry, RepositoryError> {
        Err(RepositoryError::Unavailable("audit table locked".to_string()))
    }

    fn list_for(
        &self,
        _application_id: &ApplicationId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError> {
        Err(RepositoryError::Unavailable("audit table locked".to_string()))
    }
}

pub(super) fn service_with_ports(
    store: Arc<MemoryStore>,
    customize: impl FnOnce(&mut OnboardingPorts),
) -> OnboardingService {
    let mut ports = OnboardingPorts::from_memory(store, Arc::new(MemoryObjectStore::default()));
    customize(&mut ports);
    OnboardingService::with_clock(
        ports,
        WorkflowConfig::default(),
        Arc::new(SteppingClock::default()),
    )
}

pub(super) fn router_for(service: OnboardingService) -> axum::Router {
    application_router(Arc::new(service))
}

pub(super) fn request(
    method: &str,
    uri: &str,
    user: Option<(&str, &str)>,
) -> axum::http::request::Builder {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((id, role)) = user {
        builder = builder
            .header("x-user-id", id)
            .header("x-user-role", role);
    }
    builder
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(response.status(), expected);
}
