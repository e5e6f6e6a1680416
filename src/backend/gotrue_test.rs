use super::*;

const USER_JSON: &str = r#"{
    "id": "6f1b7c1e-2d1a-4c43-9d2b-1b8f0f5c2a10",
    "aud": "authenticated",
    "email": "ada@institution.edu",
    "user_metadata": { "name": "Ada", "role": "researcher" }
}"#;

// =============================================================================
// parse_session
// =============================================================================

#[test]
fn parse_session_reads_tokens_and_user() {
    let json = format!(
        r#"{{"access_token":"at","token_type":"bearer","expires_in":3600,"refresh_token":"rt","user":{USER_JSON}}}"#
    );
    let session = parse_session(&json).unwrap();
    assert_eq!(session.access_token, "at");
    assert_eq!(session.refresh_token.as_deref(), Some("rt"));
    assert_eq!(session.expires_in, Some(3600));
    assert_eq!(session.identity.email, "ada@institution.edu");
    assert_eq!(session.identity.user_metadata.role.as_deref(), Some("researcher"));
}

#[test]
fn parse_session_without_user_is_parse_error() {
    let err = parse_session(r#"{"access_token":"at"}"#).unwrap_err();
    assert!(matches!(err, BackendError::Parse(_)));
}

#[test]
fn parse_identity_tolerates_missing_metadata() {
    let identity = parse_identity(r#"{"id":"6f1b7c1e-2d1a-4c43-9d2b-1b8f0f5c2a10","email":"x@institution.edu"}"#).unwrap();
    assert_eq!(identity.user_metadata, UserMetadata::default());
}

// =============================================================================
// parse_signup
// =============================================================================

#[test]
fn parse_signup_bare_user() {
    let identity = parse_signup(USER_JSON).unwrap();
    assert_eq!(identity.email, "ada@institution.edu");
}

#[test]
fn parse_signup_session_wrapped_user() {
    let json = format!(r#"{{"access_token":"at","refresh_token":"rt","user":{USER_JSON}}}"#);
    let identity = parse_signup(&json).unwrap();
    assert_eq!(identity.user_metadata.name.as_deref(), Some("Ada"));
}

// =============================================================================
// rejection
// =============================================================================

#[test]
fn rejection_prefers_error_description() {
    let err = rejection(400, r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#);
    assert_eq!(err.to_string(), "Invalid login credentials");
    assert!(err.is_rejection());
}

#[test]
fn rejection_reads_msg_field() {
    let err = rejection(422, r#"{"code":422,"msg":"User already registered"}"#);
    assert_eq!(err.to_string(), "User already registered");
}

#[test]
fn rejection_falls_back_to_status_for_non_json() {
    let err = rejection(503, "<html>bad gateway</html>");
    assert!(err.to_string().contains("503"));
    assert!(!err.is_rejection());
}

// =============================================================================
// client construction
// =============================================================================

#[test]
fn url_strips_trailing_slash() {
    let client = GoTrueClient::new("https://auth.example.com/", "anon".into(), 5).unwrap();
    assert_eq!(client.url("token"), "https://auth.example.com/auth/v1/token");
}
