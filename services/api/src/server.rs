use crate::cli::ServeArgs;
use crate::infra::{seed_users, AppState, FilesystemObjectStore};
use crate::routes::with_application_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use merchant_kyc::config::AppConfig;
use merchant_kyc::error::AppError;
use merchant_kyc::telemetry;
use merchant_kyc::workflows::onboarding::{MemoryStore, OnboardingPorts, OnboardingService};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(MemoryStore::default());
    if let Some(path) = args.users.take() {
        let seeded = seed_users(&store, &path)?;
        info!(users = seeded, path = %path.display(), "user directory seeded");
    }
    let objects = Arc::new(FilesystemObjectStore::new(config.storage.root.clone())?);
    let ports = OnboardingPorts::from_memory(store, objects);
    let service = Arc::new(OnboardingService::new(ports, config.workflow.clone()));

    let app = with_application_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        storage_root = %config.storage.root.display(),
        "merchant kyc service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
