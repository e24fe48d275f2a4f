//! Integration tests for the OAuth session against a local token endpoint

use axum::{http::StatusCode, routing::post, Form, Json, Router};
use linear_tools::auth::{
    AuthMode, AuthParams, AuthSession, OAuthClientParams, OAuthHandler, SessionState, TokenStore,
};
use linear_tools::linear::{HttpTransport, LinearFacade};
use linear_tools::{Dispatcher, LinearError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Seen = Arc<Mutex<Vec<HashMap<String, String>>>>;

/// Token endpoint that knows a handful of codes and refresh tokens
async fn spawn_token_server() -> (String, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();

    let app = Router::new().route(
        "/oauth/token",
        post(move |Form(form): Form<HashMap<String, String>>| {
            let recorder = recorder.clone();
            async move {
                recorder.lock().unwrap().push(form.clone());
                token_response(&form)
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/oauth/token", addr), seen)
}

fn token_response(form: &HashMap<String, String>) -> (StatusCode, Json<Value>) {
    let rejected = (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "invalid_grant", "error_description": "grant is invalid or expired"})),
    );
    let field = |key: &str| form.get(key).map(String::as_str);

    match (field("grant_type"), field("code"), field("refresh_token")) {
        (Some("authorization_code"), Some("good-code"), _) => (
            StatusCode::OK,
            Json(json!({
                "access_token": "at-1",
                "refresh_token": "rt-good",
                "expires_in": 60,
                "token_type": "Bearer",
                "scope": "read,write"
            })),
        ),
        (Some("authorization_code"), Some("revoked-code"), _) => (
            StatusCode::OK,
            Json(json!({
                "access_token": "at-1",
                "refresh_token": "rt-revoked",
                "expires_in": 60
            })),
        ),
        (Some("refresh_token"), _, Some("rt-good")) => (
            StatusCode::OK,
            Json(json!({"access_token": "at-2", "expires_in": 3600})),
        ),
        _ => rejected,
    }
}

fn session(token_url: &str) -> AuthSession {
    AuthSession::new(OAuthHandler::new(
        "https://linear.app/oauth/authorize",
        token_url,
        vec!["read".to_string(), "write".to_string()],
    ))
}

fn oauth_params() -> AuthParams {
    AuthParams::OAuth(OAuthClientParams {
        client_id: "c".to_string(),
        client_secret: "s".to_string(),
        redirect_uri: "https://cb".to_string(),
    })
}

#[tokio::test]
async fn test_bad_code_leaves_session_unchanged() {
    let (token_url, seen) = spawn_token_server().await;
    let mut session = session(&token_url);
    session.initialize(oauth_params()).unwrap();

    let url = session.authorization_url().unwrap();
    assert!(url.contains("client_id=c"));
    assert!(url.contains("redirect_uri=https%3A%2F%2Fcb"));

    let err = session.handle_callback("bad-code").await.unwrap_err();
    assert!(matches!(err, LinearError::AuthExchange(_)));
    assert!(err.to_string().contains("invalid_grant"));

    assert!(!session.is_authenticated());
    assert_eq!(session.state(), SessionState::AwaitingCode);
    assert!(session.client().is_err());
    // The flow can be retried with the same URL
    assert_eq!(session.authorization_url().unwrap(), url);

    let requests = seen.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["grant_type"], "authorization_code");
    assert_eq!(requests[0]["client_secret"], "s");
    assert_eq!(requests[0]["redirect_uri"], "https://cb");
}

#[tokio::test]
async fn test_callback_then_refresh() {
    let (token_url, seen) = spawn_token_server().await;
    let mut session = session(&token_url);
    session.initialize(oauth_params()).unwrap();

    session.handle_callback("good-code").await.unwrap();
    assert_eq!(session.state(), SessionState::Authenticated(AuthMode::OAuth));
    assert_eq!(session.client().unwrap().authorization_header(), "Bearer at-1");

    // 60 second lifetime is inside the default 5 minute margin
    assert!(session.needs_token_refresh());

    session.refresh_access_token().await.unwrap();
    assert_eq!(session.client().unwrap().authorization_header(), "Bearer at-2");
    assert!(!session.needs_token_refresh());

    // The provider did not rotate the refresh token, so the old one is reused
    session.refresh_access_token().await.unwrap();
    let requests = seen.lock().unwrap();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[2]["refresh_token"], "rt-good");
}

#[tokio::test]
async fn test_rejected_refresh_forces_reauthorization() {
    let (token_url, _) = spawn_token_server().await;
    let mut session = session(&token_url);
    session.initialize(oauth_params()).unwrap();
    session.handle_callback("revoked-code").await.unwrap();
    assert!(session.is_authenticated());

    let err = session.refresh_access_token().await.unwrap_err();
    assert!(matches!(err, LinearError::AuthExchange(_)));
    assert!(!session.is_authenticated());
    assert_eq!(session.state(), SessionState::AwaitingCode);
    assert!(session.authorization_url().is_ok());

    // A new callback restores the session
    session.handle_callback("good-code").await.unwrap();
    assert!(session.is_authenticated());
}

#[tokio::test]
async fn test_unreachable_token_endpoint() {
    let mut session = session("http://127.0.0.1:1/oauth/token");
    session.initialize(oauth_params()).unwrap();

    let err = session.handle_callback("good-code").await.unwrap_err();
    assert!(matches!(err, LinearError::AuthExchange(_)));
    assert_eq!(session.state(), SessionState::AwaitingCode);
}

#[tokio::test]
async fn test_tokens_persisted_and_cleared() {
    let (token_url, _) = spawn_token_server().await;
    let dir = tempfile::tempdir().unwrap();
    let store = TokenStore::at(dir.path().join("oauth.json"));

    let mut session = session(&token_url).with_token_store(store.clone());
    session.initialize(oauth_params()).unwrap();
    session.handle_callback("revoked-code").await.unwrap();

    let stored = store.load("c").unwrap().unwrap();
    assert_eq!(stored.access_token, "at-1");

    // A second process restores from disk
    let mut restored = self::session(&token_url);
    restored.initialize(oauth_params()).unwrap();
    restored.restore_tokens(stored).unwrap();
    assert!(restored.is_authenticated());

    assert!(session.refresh_access_token().await.is_err());
    assert!(store.load("c").unwrap().is_none());
}

#[tokio::test]
async fn test_auth_tool_restart_discards_persisted_tokens() {
    let (token_url, _) = spawn_token_server().await;
    let dir = tempfile::tempdir().unwrap();
    let store = TokenStore::at(dir.path().join("oauth.json"));

    let session = session(&token_url).with_token_store(store.clone());
    let facade = LinearFacade::new(Arc::new(HttpTransport::new("http://127.0.0.1:1/graphql")));
    let mut dispatcher = Dispatcher::new(session, facade);

    let client = json!({"clientId": "c", "clientSecret": "s", "redirectUri": "https://cb"});
    dispatcher.call("linear_auth", client.clone()).await.unwrap();
    dispatcher
        .call("linear_auth_callback", json!({"code": "good-code"}))
        .await
        .unwrap();
    assert!(store.load("c").unwrap().is_some());

    let restarted = dispatcher.call("linear_auth", client).await.unwrap();
    assert!(restarted["authorizationUrl"].is_string());
    assert!(!dispatcher.session().is_authenticated());
    // A later process must not pick the old tokens back up
    assert!(store.load("c").unwrap().is_none());
}
