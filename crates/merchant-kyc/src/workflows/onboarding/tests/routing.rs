use super::common::*;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::workflows::onboarding::domain::{ApplicationStatus, Caller};
use crate::workflows::onboarding::router::{self, caller_from_headers};
use crate::workflows::onboarding::WorkflowConfig;

fn json_body(value: Value) -> Body {
    Body::from(serde_json::to_vec(&value).expect("serializable payload"))
}

fn merchant_headers() -> Option<(&'static str, &'static str)> {
    Some((MERCHANT, "merchant"))
}

fn reviewer_headers() -> Option<(&'static str, &'static str)> {
    Some((REVIEWER, "reviewer"))
}

#[test]
fn caller_from_headers_requires_known_role() {
    let mut headers = HeaderMap::new();
    assert_eq!(caller_from_headers(&headers), Caller::Anonymous);

    headers.insert("x-user-id", HeaderValue::from_static("merchant-1"));
    assert_eq!(caller_from_headers(&headers), Caller::Anonymous);

    headers.insert("x-user-role", HeaderValue::from_static("admin"));
    assert_eq!(caller_from_headers(&headers), Caller::Anonymous);

    headers.insert("x-user-role", HeaderValue::from_static("merchant"));
    assert_eq!(caller_from_headers(&headers), Caller::merchant("merchant-1"));
}

#[tokio::test]
async fn submit_handler_returns_not_found_without_application() {
    let harness = build_service();
    let mut headers = HeaderMap::new();
    headers.insert("x-user-id", HeaderValue::from_static(MERCHANT));
    headers.insert("x-user-role", HeaderValue::from_static("merchant"));

    let response = router::submit_handler(State(Arc::new(harness.service)), headers).await;

    assert_status(&response, StatusCode::NOT_FOUND);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn anonymous_requests_are_unauthorized() {
    let harness = build_service();
    let router = router_for(harness.service);

    let response = router
        .oneshot(
            request("GET", "/api/applications", None)
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_status(&response, StatusCode::UNAUTHORIZED);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "authorization_error");
}

#[tokio::test]
async fn merchants_are_forbidden_from_review_routes() {
    let harness = build_service();
    let router = router_for(harness.service);

    let response = router
        .oneshot(
            request("POST", "/api/applications/app-000001/review", merchant_headers())
                .header(header::CONTENT_TYPE, "application/json")
                .body(json_body(json!({ "status": "approved" })))
                .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_status(&response, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn create_route_returns_created_draft() {
    let harness = build_service();
    let router = router_for(harness.service);

    let response = router
        .oneshot(
            request("POST", "/api/application", merchant_headers())
                .header(header::CONTENT_TYPE, "application/json")
                .body(json_body(json!({
                    "business_name": "Falcon Spices LLC",
                    "free_zone": true
                })))
                .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_status(&response, StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "draft");
    assert!(body["id"].as_str().is_some_and(|id| id.starts_with("app-")));
}

#[tokio::test]
async fn my_application_route_returns_null_before_create() {
    let harness = build_service();
    let router = router_for(harness.service);

    let response = router
        .oneshot(
            request("GET", "/api/application", merchant_headers())
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_status(&response, StatusCode::OK);
    assert_eq!(read_json_body(response).await, Value::Null);
}

#[tokio::test]
async fn submit_route_maps_missing_fields_and_double_submit() {
    let harness = build_service();
    harness
        .service
        .create(&Caller::merchant(MERCHANT), partial_profile())
        .expect("draft");
    let router = router_for(harness.service);

    let response = router
        .clone()
        .oneshot(
            request("POST", "/api/application/submit", merchant_headers())
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_status(&response, StatusCode::UNPROCESSABLE_ENTITY);

    let response = router
        .clone()
        .oneshot(
            request("PUT", "/api/application", merchant_headers())
                .header(header::CONTENT_TYPE, "application/json")
                .body(json_body(serde_json::to_value(profile()).expect("profile json")))
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_status(&response, StatusCode::OK);

    let response = router
        .clone()
        .oneshot(
            request("POST", "/api/application/submit", merchant_headers())
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_status(&response, StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "pending");
    assert!(body.get("audit_warning").is_none());

    let response = router
        .oneshot(
            request("POST", "/api/application/submit", merchant_headers())
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_status(&response, StatusCode::CONFLICT);
}

#[tokio::test]
async fn review_route_rejects_unknown_decision() {
    let harness = build_service();
    let created = harness
        .service
        .create(&Caller::merchant(MERCHANT), profile())
        .expect("draft");
    let router = router_for(harness.service);

    let response = router
        .oneshot(
            request(
                "POST",
                &format!("/api/applications/{}/review", created.id),
                reviewer_headers(),
            )
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body(json!({ "status": "pending" })))
            .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_status(&response, StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "validation_error");
}

#[tokio::test]
async fn upload_and_download_round_trip_through_routes() {
    let harness = build_service();
    harness
        .service
        .create(&Caller::merchant(MERCHANT), profile())
        .expect("draft");
    let router = router_for(harness.service);

    let response = router
        .clone()
        .oneshot(
            request(
                "POST",
                "/api/application/documents?doc_type=passport&file_name=passport.pdf",
                merchant_headers(),
            )
            .header(header::CONTENT_TYPE, "application/pdf")
            .body(Body::from("%PDF-1.7 scan"))
            .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_status(&response, StatusCode::CREATED);
    let body = read_json_body(response).await;
    let document_id = body["id"].as_str().expect("document id").to_string();

    let response = router
        .clone()
        .oneshot(
            request(
                "GET",
                &format!("/api/documents/{document_id}/content"),
                Some((OTHER_MERCHANT, "merchant")),
            )
            .body(Body::empty())
            .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_status(&response, StatusCode::FORBIDDEN);

    let response = router
        .oneshot(
            request(
                "GET",
                &format!("/api/documents/{document_id}/content"),
                reviewer_headers(),
            )
            .body(Body::empty())
            .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_status(&response, StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        HeaderValue::from_static("application/pdf")
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        HeaderValue::from_static("inline; filename=\"passport.pdf\"")
    );
    let bytes = axum::body::to_bytes(response.into_body(), 1024)
        .await
        .expect("read body");
    assert_eq!(&bytes[..], b"%PDF-1.7 scan");
}

#[tokio::test]
async fn list_route_filters_by_status_query() {
    let harness = build_service();
    harness
        .service
        .create(&Caller::merchant(MERCHANT), profile())
        .expect("draft");
    harness
        .service
        .submit(&Caller::merchant(MERCHANT))
        .expect("submits");
    harness
        .service
        .create(&Caller::merchant(OTHER_MERCHANT), profile())
        .expect("draft");
    let router = router_for(harness.service);

    let response = router
        .clone()
        .oneshot(
            request("GET", "/api/applications?status=pending", reviewer_headers())
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_status(&response, StatusCode::OK);
    let body = read_json_body(response).await;
    let rows = body.as_array().expect("array payload");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["merchant_name"], "Layla Haddad");
    assert_eq!(rows[0]["status"], ApplicationStatus::Pending.label());

    let response = router
        .oneshot(
            request("GET", "/api/applications?status=archived", reviewer_headers())
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_status(&response, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn history_route_exports_csv() {
    let harness = build_service();
    let created = harness
        .service
        .create(&Caller::merchant(MERCHANT), profile())
        .expect("draft");
    harness
        .service
        .submit(&Caller::merchant(MERCHANT))
        .expect("submits");
    let router = router_for(harness.service);

    let response = router
        .clone()
        .oneshot(
            request(
                "GET",
                &format!("/api/applications/{}/history?format=csv", created.id),
                reviewer_headers(),
            )
            .body(Body::empty())
            .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_status(&response, StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        HeaderValue::from_static("text/csv; charset=utf-8")
    );
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    let text = String::from_utf8(bytes.to_vec()).expect("utf8 csv");
    let mut lines = text.lines();
    assert!(lines
        .next()
        .is_some_and(|line| line.starts_with("id,application_id")));
    assert!(lines
        .next()
        .is_some_and(|line| line.contains(",draft,pending,")));

    let response = router
        .oneshot(
            request(
                "GET",
                &format!("/api/applications/{}/history", created.id),
                reviewer_headers(),
            )
            .body(Body::empty())
            .expect("request builds"),
        )
        .await
        .expect("router responds");
    let body = read_json_body(response).await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn dependency_failures_map_to_service_unavailable() {
    let store = memory_store();
    let service = service_with_ports(store.clone(), |ports| {
        ports.applications = Arc::new(UnreadableApplications {
            inner: store.clone(),
        });
    });
    let router = router_for(service);

    let response = router
        .oneshot(
            request("GET", "/api/applications/app-000001", reviewer_headers())
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_status(&response, StatusCode::SERVICE_UNAVAILABLE);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "dependency_error");
}

async fn upload_scan(router: axum::Router, size: usize) -> axum::response::Response {
    router
        .oneshot(
            request(
                "POST",
                "/api/application/documents?doc_type=passport&file_name=scan.pdf",
                merchant_headers(),
            )
            .header(header::CONTENT_TYPE, "application/pdf")
            .body(Body::from(vec![0x25_u8; size]))
            .expect("request builds"),
        )
        .await
        .expect("router responds")
}

#[tokio::test]
async fn upload_route_accepts_scans_up_to_configured_limit() {
    let harness = build_service();
    harness
        .service
        .create(&Caller::merchant(MERCHANT), profile())
        .expect("draft");
    let objects = harness.objects.clone();
    let router = router_for(harness.service);

    let response = upload_scan(router, 3 * 1024 * 1024).await;

    assert_status(&response, StatusCode::CREATED);
    assert_eq!(objects.len().expect("readable"), 1);
}

#[tokio::test]
async fn upload_route_reports_oversized_scans_as_validation_errors() {
    let limit = 3 * 1024 * 1024;
    let harness = build_service_with(WorkflowConfig {
        max_upload_bytes: limit,
        ..WorkflowConfig::default()
    });
    harness
        .service
        .create(&Caller::merchant(MERCHANT), profile())
        .expect("draft");
    let objects = harness.objects.clone();
    let router = router_for(harness.service);

    let response = upload_scan(router, limit + 1).await;

    assert_status(&response, StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "validation_error");
    assert!(objects.is_empty().expect("readable"));
}
