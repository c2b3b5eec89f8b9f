//! Router tests that need no database
//!
//! Each request here is rejected before any query runs, so the router is
//! built over a lazy pool pointing at a closed port.

mod common;

use axum::http::{header, Method, Request, StatusCode};
use axum::body::Body;
use common::{lazy_app, send};
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn test_protected_route_requires_bearer_token() {
    let app = lazy_app();

    let (status, body) = send(&app, Method::GET, "/v1/events", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_non_bearer_scheme_is_rejected() {
    let app = lazy_app();
    let request = Request::builder()
        .uri("/v1/groups")
        .header(header::AUTHORIZATION, "Basic a2luOnNoaXA=")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_garbage_token_is_rejected() {
    let app = lazy_app();

    let (status, _) = send(&app, Method::GET, "/v1/settings", Some("not.a.jwt"), None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = lazy_app();

    let (status, _) = send(&app, Method::GET, "/v2/nothing-here", None, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_security_headers_on_error_responses() {
    let app = lazy_app();
    let request = Request::builder()
        .uri("/v1/events")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let headers = response.headers();

    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.contains_key("content-security-policy"));
    assert!(
        !headers.contains_key("strict-transport-security"),
        "HSTS is production-only"
    );
}

#[tokio::test]
async fn test_bad_feed_token_looks_like_missing_feed() {
    let app = lazy_app();

    let (status, body) = send(
        &app,
        Method::GET,
        "/v1/calendar/feed/3f1c7f0e-8f0e-4b8e-9a43-0b1b0c0d0e0f.deadbeef.ics",
        None,
        None,
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_event_file_must_name_an_event_id() {
    let app = lazy_app();

    let (status, _) = send(&app, Method::GET, "/v1/calendar/events/dinner.ics", None, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_signup_rejects_weak_password() {
    let app = lazy_app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/auth/signup",
        None,
        Some(json!({
            "handle": "nana",
            "password": "password",
            "display_name": "Nana",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_signup_rejects_family_name_with_invite_code() {
    let app = lazy_app();

    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/auth/signup",
        None,
        Some(json!({
            "handle": "nana",
            "password": "Grandma-2025",
            "display_name": "Nana",
            "family_name": "The Okafors",
            "invite_code": "K7MQ2XPA",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_reports_degraded_without_database() {
    let app = lazy_app();

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"], "disconnected");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
