use super::*;
use crate::state::test_helpers::*;
use axum::http::header::LOCATION;
use serde_json::json;

#[tokio::test]
async fn healthz_is_ok() {
    let h = harness();
    let app = test_router(test_app_state(&h));

    let (status, _, _) = send(&app, request("GET", "/healthz", None, None)).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn error_response_wraps_message() {
    let resp = error_response(StatusCode::BAD_REQUEST, "nope");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({ "error": "nope" }));
}

#[tokio::test]
async fn missing_static_page_is_not_found() {
    let h = harness();
    let app = test_router(test_app_state(&h));

    let (status, _, _) = send(&app, request("GET", "/no-such-page.html", None, None)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn login_dashboard_logout_round_trip() {
    let h = harness();
    let identity = h.backend.add_account("alice@institution.edu", "pw", Some("researcher"));
    h.profiles.insert(profile_for(&identity, "researcher"));
    let app = test_router(test_app_state(&h));

    let body = Some(json!({ "email": "alice@institution.edu", "password": "pw" }));
    let (status, headers, _) = send(&app, request("POST", "/api/auth/login", None, body)).await;
    assert_eq!(status, StatusCode::OK);
    let token = session_cookie_value(&headers).unwrap();

    let (status, headers, _) = send(&app, request("GET", "/dashboard", Some(&token), None)).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers.get(LOCATION).unwrap(), "/dashboard/researcher");

    let (status, _, view) = send(&app, request("GET", "/dashboard/researcher", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["user"]["email"], "alice@institution.edu");

    let (status, _, _) = send(&app, request("POST", "/api/auth/logout", None, None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, _) = send(&app, request("POST", "/api/auth/logout", Some(&token), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, me) = send(&app, request("GET", "/api/auth/me", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["isAuthenticated"], false);
    let (status, _, _) = send(&app, request("GET", "/dashboard/researcher", None, None)).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
}
