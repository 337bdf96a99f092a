//! End-to-end tests of the reqwest backend against a local axum server.
//!
//! Run with: `cargo test --features "http-client mocks" --test e2e_http`

#![cfg(all(feature = "http-client", feature = "mocks"))]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::sync::{Arc, Mutex};

use ats_session::backend::{MockAccount, MockAuthBackend, RefreshBehavior};
use ats_session::http::HttpBackend;
use ats_session::{
    ApiRequest, AuthBackend, AuthClient, AuthError, ClientConfig, Credentials, SecretString,
    SessionState,
};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Duration;
use serde_json::{Value, json};

#[derive(Clone)]
struct Server {
    backend: MockAuthBackend,
    seen_tenants: Arc<Mutex<Vec<Option<String>>>>,
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(ToOwned::to_owned)
}

async fn login(State(server): State<Server>, Json(body): Json<Value>) -> Response {
    let credentials = Credentials::new(
        body["email"].as_str().unwrap_or_default(),
        body["password"].as_str().unwrap_or_default(),
    );
    match server.backend.authenticate(&credentials).await {
        Ok(grant) => Json(json!({
            "accessToken": grant.access_token.expose_secret(),
            "refreshToken": grant.refresh_token.expose_secret(),
        }))
        .into_response(),
        Err(_) => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn refresh(State(server): State<Server>, Json(body): Json<Value>) -> Response {
    let token = SecretString::new(body["refreshToken"].as_str().unwrap_or_default());
    match server.backend.refresh(&token).await {
        Ok(grant) => Json(json!({
            "access_token": grant.access_token.expose_secret(),
            "refresh_token": grant.refresh_token.as_ref().map(SecretString::expose_secret),
        }))
        .into_response(),
        Err(AuthError::TransientNetworkFailure(_)) => {
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
        Err(_) => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn logout(State(server): State<Server>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = bearer(&headers) {
        let _ = server.backend.logout(&SecretString::new(token)).await;
    }
    StatusCode::NO_CONTENT
}

async fn jobs(State(server): State<Server>, headers: HeaderMap) -> Response {
    let accepted = bearer(&headers).is_some_and(|t| server.backend.accepts_access_token(&t));
    if !accepted {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let tenant = headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);
    server.seen_tenants.lock().unwrap().push(tenant);
    Json(json!([{ "id": 1, "title": "Backend Engineer" }])).into_response()
}

async fn spawn_server(backend: MockAuthBackend) -> (String, Server) {
    let server = Server {
        backend,
        seen_tenants: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/jobs", get(jobs))
        .with_state(server.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), server)
}

fn backend() -> MockAuthBackend {
    MockAuthBackend::new().with_account(MockAccount::new(
        "rita@example.com",
        "rita-pw",
        &["RECRUITER"],
        Some("acme"),
    ))
}

fn client(base_url: &str) -> AuthClient {
    let config = ClientConfig::new(base_url);
    let http = HttpBackend::new(&config).unwrap();
    AuthClient::builder(config, http.clone(), http).build().unwrap()
}

#[tokio::test]
async fn test_login_and_authenticated_request() {
    let (url, server) = spawn_server(backend()).await;
    let client = client(&url);

    client
        .login(&Credentials::new("rita@example.com", "rita-pw"))
        .await
        .unwrap();
    let response = client.send(&ApiRequest::get("/jobs")).await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
    let body: Value = response.json().unwrap();
    assert_eq!(body[0]["title"], "Backend Engineer");
    assert_eq!(
        *server.seen_tenants.lock().unwrap(),
        vec![Some("acme".to_owned())]
    );
}

#[tokio::test]
async fn test_wrong_password() {
    let (url, _server) = spawn_server(backend()).await;
    let client = client(&url);

    let result = client
        .login(&Credentials::new("rita@example.com", "nope"))
        .await;

    assert_eq!(result.unwrap_err(), AuthError::InvalidCredentials);
    assert_eq!(client.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn test_misrouted_login_is_not_a_credential_error() {
    let (url, server) = spawn_server(backend()).await;
    let mut config = ClientConfig::new(&url);
    config.endpoints.login = "/auth/signin".to_owned();
    let http = HttpBackend::new(&config).unwrap();
    let client = AuthClient::builder(config, http.clone(), http).build().unwrap();

    let result = client
        .login(&Credentials::new("rita@example.com", "rita-pw"))
        .await;

    match result {
        Err(AuthError::TransientNetworkFailure(msg)) => assert!(msg.contains("404")),
        other => panic!("expected a transport failure, got {other:?}"),
    }
    assert_eq!(server.backend.login_calls(), 0);
    assert_eq!(client.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn test_expired_token_refreshed_over_http() {
    let backend = backend();
    let (url, server) = spawn_server(backend.clone()).await;
    let client = client(&url);
    backend.set_access_ttl(-Duration::seconds(10));
    client
        .login(&Credentials::new("rita@example.com", "rita-pw"))
        .await
        .unwrap();
    backend.set_access_ttl(Duration::minutes(15));

    let response = client.send(&ApiRequest::get("/jobs")).await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(server.backend.refresh_calls(), 1);
    assert!(!client.session().unwrap().is_expired());
}

#[tokio::test]
async fn test_rejected_refresh_over_http() {
    let backend = backend();
    let (url, _server) = spawn_server(backend.clone()).await;
    let client = client(&url);
    backend.set_access_ttl(-Duration::seconds(10));
    client
        .login(&Credentials::new("rita@example.com", "rita-pw"))
        .await
        .unwrap();
    backend.set_refresh_behavior(RefreshBehavior::Reject);

    let result = client.send(&ApiRequest::get("/jobs")).await;

    assert_eq!(result.unwrap_err(), AuthError::SessionExpired);
    assert!(client.session().is_none());
}

#[tokio::test]
async fn test_refresh_outage_keeps_session() {
    let backend = backend();
    let (url, _server) = spawn_server(backend.clone()).await;
    let client = client(&url);
    backend.set_access_ttl(-Duration::seconds(10));
    client
        .login(&Credentials::new("rita@example.com", "rita-pw"))
        .await
        .unwrap();
    backend.set_refresh_behavior(RefreshBehavior::NetworkFailure);

    let result = client.send(&ApiRequest::get("/jobs")).await;

    assert!(matches!(result, Err(AuthError::TransientNetworkFailure(_))));
    assert!(client.session().is_some());
}

#[tokio::test]
async fn test_logout_revokes_server_side() {
    let backend = backend();
    let (url, server) = spawn_server(backend.clone()).await;
    let client = client(&url);
    let session = client
        .login(&Credentials::new("rita@example.com", "rita-pw"))
        .await
        .unwrap();

    client.logout().await.unwrap();

    assert_eq!(server.backend.logout_calls(), 1);
    assert!(
        !server
            .backend
            .accepts_access_token(session.access_token().expose_secret())
    );
    assert_eq!(client.state(), SessionState::Unauthenticated);
}
