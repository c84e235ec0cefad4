use std::io;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::task::{self, JoinError};
use tracing::error;

use crate::error::AppError;

use super::audit::write_csv;
use super::domain::{Actor, ApplicationId, BusinessProfile, Caller, DocumentId, Role, UserId};
use super::error::OnboardingError;
use super::policy::DenialReason;
use super::service::{DocumentUpload, OnboardingService, TransitionReceipt};

/// Header carrying the identity the upstream gateway authenticated.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the authenticated role token (`merchant` or `reviewer`).
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Allowance above `max_upload_bytes` so oversized files reach the size check and get a 422.
const UPLOAD_BODY_HEADROOM: usize = 64 * 1024;

type SharedService = Arc<OnboardingService>;

/// Router builder exposing the merchant and reviewer endpoints.
pub fn application_router(service: SharedService) -> Router {
    let upload_body_limit = service
        .config()
        .max_upload_bytes
        .saturating_add(UPLOAD_BODY_HEADROOM);

    Router::new()
        .route(
            "/api/application",
            get(my_application_handler)
                .post(create_handler)
                .put(update_handler),
        )
        .route("/api/application/submit", post(submit_handler))
        .route(
            "/api/application/documents",
            post(upload_handler).layer(DefaultBodyLimit::max(upload_body_limit)),
        )
        .route("/api/applications", get(list_handler))
        .route("/api/applications/:application_id", get(detail_handler))
        .route(
            "/api/applications/:application_id/review",
            post(review_handler),
        )
        .route(
            "/api/applications/:application_id/history",
            get(history_handler),
        )
        .route("/api/documents/:document_id/content", get(document_handler))
        .with_state(service)
}

/// Build the caller from gateway headers. Missing or malformed headers mean anonymous.
pub fn caller_from_headers(headers: &HeaderMap) -> Caller {
    let header_text = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let (Some(id), Some(role)) = (header_text(USER_ID_HEADER), header_text(USER_ROLE_HEADER))
    else {
        return Caller::Anonymous;
    };

    match role.parse::<Role>() {
        Ok(role) => Caller::Authenticated(Actor {
            id: UserId(id.to_string()),
            role,
        }),
        Err(_) => Caller::Anonymous,
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewRequest {
    pub(crate) status: String,
    #[serde(default)]
    pub(crate) comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListQuery {
    #[serde(default)]
    pub(crate) status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UploadQuery {
    #[serde(default)]
    pub(crate) doc_type: Option<String>,
    #[serde(default)]
    pub(crate) file_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct HistoryQuery {
    #[serde(default)]
    pub(crate) format: Option<String>,
}

pub(crate) async fn my_application_handler(
    State(service): State<SharedService>,
    headers: HeaderMap,
) -> Response {
    match service.application_for(&caller_from_headers(&headers)) {
        Ok(application) => (StatusCode::OK, Json(application)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn create_handler(
    State(service): State<SharedService>,
    headers: HeaderMap,
    Json(profile): Json<BusinessProfile>,
) -> Response {
    match service.create(&caller_from_headers(&headers), profile) {
        Ok(application) => {
            let payload = json!({
                "id": application.id,
                "status": application.status,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_handler(
    State(service): State<SharedService>,
    headers: HeaderMap,
    Json(profile): Json<BusinessProfile>,
) -> Response {
    match service.edit(&caller_from_headers(&headers), profile) {
        Ok(application) => {
            let payload = json!({
                "message": "Updated",
                "application": application,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler(
    State(service): State<SharedService>,
    headers: HeaderMap,
) -> Response {
    match service.submit(&caller_from_headers(&headers)) {
        Ok(receipt) => receipt_response("Application submitted for review", receipt),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn upload_handler(
    State(service): State<SharedService>,
    headers: HeaderMap,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let upload = DocumentUpload {
        doc_type: query.doc_type.unwrap_or_default(),
        file_name: query.file_name.unwrap_or_default(),
        content_type,
        bytes: body.to_vec(),
    };

    let caller = caller_from_headers(&headers);
    let outcome = task::spawn_blocking(move || service.upload_document(&caller, upload)).await;

    match outcome {
        Ok(Ok(document)) => {
            let payload = json!({
                "id": document.id,
                "path": document.storage_path,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Ok(Err(error)) => error_response(error),
        Err(error) => blocking_failure(error),
    }
}

pub(crate) async fn list_handler(
    State(service): State<SharedService>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    match service.list_for_review(&caller_from_headers(&headers), query.status.as_deref()) {
        Ok(summaries) => (StatusCode::OK, Json(summaries)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn detail_handler(
    State(service): State<SharedService>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Response {
    let id = ApplicationId(application_id);
    match service.application_detail(&caller_from_headers(&headers), &id) {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn review_handler(
    State(service): State<SharedService>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    Json(request): Json<ReviewRequest>,
) -> Response {
    let id = ApplicationId(application_id);
    match service.review(
        &caller_from_headers(&headers),
        &id,
        &request.status,
        request.comment,
    ) {
        Ok(receipt) => receipt_response("Status updated", receipt),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn history_handler(
    State(service): State<SharedService>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let id = ApplicationId(application_id);
    let entries = match service.history(&caller_from_headers(&headers), &id) {
        Ok(entries) => entries,
        Err(error) => return error_response(error),
    };

    if query.format.as_deref() != Some("csv") {
        return (StatusCode::OK, Json(entries)).into_response();
    }

    let mut buffer = Vec::new();
    match write_csv(&entries, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            buffer,
        )
            .into_response(),
        Err(error) => AppError::from(error).into_response(),
    }
}

pub(crate) async fn document_handler(
    State(service): State<SharedService>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
) -> Response {
    let id = DocumentId(document_id);
    let caller = caller_from_headers(&headers);
    let outcome = task::spawn_blocking(move || {
        let mut buffer = Vec::new();
        service
            .fetch_document(&caller, &id, &mut buffer)
            .map(|fetched| (fetched, buffer))
    })
    .await;

    let (fetched, buffer) = match outcome {
        Ok(Ok(fetched)) => fetched,
        Ok(Err(error)) => return error_response(error),
        Err(error) => return blocking_failure(error),
    };

    let content_type = HeaderValue::from_str(&fetched.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = format!(
        "inline; filename=\"{}\"",
        fetched.original_name.replace(['"', '\\'], "_")
    );
    let disposition = HeaderValue::from_str(&disposition)
        .unwrap_or_else(|_| HeaderValue::from_static("inline"));

    let mut response = Body::from(buffer).into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(header::CONTENT_TYPE, content_type);
    response_headers.insert(header::CONTENT_DISPOSITION, disposition);
    response
}

fn receipt_response(message: &str, receipt: TransitionReceipt) -> Response {
    let mut payload = json!({
        "message": message,
        "id": receipt.application.id,
        "status": receipt.application.status,
    });
    if let Some(audit_error) = receipt.audit_error {
        payload["audit_warning"] = Value::String(audit_error.to_string());
    }
    (StatusCode::OK, Json(payload)).into_response()
}

pub(crate) fn status_for(error: &OnboardingError) -> StatusCode {
    match error {
        OnboardingError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        OnboardingError::Authorization {
            reason: DenialReason::Unauthenticated,
            ..
        } => StatusCode::UNAUTHORIZED,
        OnboardingError::Authorization { .. } => StatusCode::FORBIDDEN,
        OnboardingError::NotFound(_) => StatusCode::NOT_FOUND,
        OnboardingError::InvalidState { .. } => StatusCode::CONFLICT,
        OnboardingError::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn blocking_failure(join_error: JoinError) -> Response {
    error!(error = %join_error, "storage task did not complete");
    AppError::from(io::Error::other(join_error)).into_response()
}

fn error_response(error: OnboardingError) -> Response {
    let payload = json!({
        "error": error.to_string(),
        "kind": error.kind(),
    });
    (status_for(&error), Json(payload)).into_response()
}
