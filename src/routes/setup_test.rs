use super::*;
use crate::services::setup::AdminSetupClient;
use crate::state::test_helpers::*;
use serde_json::json;

#[test]
fn setup_errors_map_to_statuses() {
    assert_eq!(setup_error_to_status(&SetupError::EmptyPassword), StatusCode::BAD_REQUEST);
    assert_eq!(setup_error_to_status(&SetupError::Rejected("exists".into())), StatusCode::BAD_REQUEST);
    assert_eq!(setup_error_to_status(&SetupError::Request("refused".into())), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn setup_without_endpoint_is_unavailable() {
    let h = harness();
    let app = test_router(test_app_state(&h));

    let (status, _, body) = send(&app, request("POST", "/api/setup/admin", None, Some(json!({ "password": "pw" })))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "admin setup not configured");
}

#[tokio::test]
async fn empty_password_is_rejected_before_any_request() {
    let h = harness();
    let setup = AdminSetupClient::new("http://127.0.0.1:9/setup".into(), "admin@institution.edu".into()).unwrap();
    let state = crate::state::AppState::new(h.deps.clone(), Some(setup), test_settings());
    let app = test_router(state);

    let (status, _, _) = send(&app, request("POST", "/api/setup/admin", None, Some(json!({ "password": "" })))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
