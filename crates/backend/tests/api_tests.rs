use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use backend::auth::types::Claims;
use backend::auth::{GoogleClient, TokenService};
use backend::build_router;
use backend::repository::{InMemoryUserStore, UserStore};
use backend::test_util::{test_settings, test_state, FakeIdentityProvider, FAKE_STATE};
use serde_json::{json, Value};
use shared_types::{AuthUrlResponse, TokenValidationResponse, User};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DASHBOARD_URL: &str = "http://localhost:5173/dashboard";
const LOGIN_ERROR_URL: &str = "http://localhost:5173/login?error=authentication_failed";

fn app_with(provider: FakeIdentityProvider, users: Arc<InMemoryUserStore>) -> Router {
    build_router(test_state(test_settings(), provider, users))
}

fn tokens() -> TokenService {
    TokenService::from_settings(&test_settings())
}

async fn send(app: &Router, method: Method, uri: &str, bearer: Option<&str>) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Callback request, optionally carrying the browser's `oauth_state` cookie.
async fn callback(app: &Router, query: &str, state_cookie: Option<&str>) -> Response {
    let mut builder = Request::builder().uri(format!("/api/v1/auth/callback/google?{}", query));
    if let Some(state) = state_cookie {
        builder = builder.header(header::COOKIE, format!("oauth_state={}", state));
    }
    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

fn header_str<'a>(response: &'a Response, name: header::HeaderName) -> &'a str {
    response.headers().get(name).unwrap().to_str().unwrap()
}

fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Value of the named cookie in the response's `Set-Cookie` headers.
fn cookie_set(response: &Response, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    set_cookies(response).into_iter().find_map(|cookie| {
        cookie
            .strip_prefix(&prefix)
            .and_then(|rest| rest.split(';').next())
            .map(str::to_string)
    })
}

/// Session token set by a successful callback.
fn session_token(response: &Response) -> String {
    cookie_set(response, "access_token")
        .filter(|token| !token.is_empty())
        .expect("session cookie should be set")
}

#[tokio::test]
async fn test_root_and_health() {
    let app = app_with(FakeIdentityProvider::failing(), Arc::new(InMemoryUserStore::new()));

    let response = send(&app, Method::GET, "/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = json_body(response).await;
    assert_eq!(body["message"], "Welcome to the Mission OAuth SaaS API");

    let response = send(&app, Method::GET, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_google_login_url() {
    let app = app_with(
        FakeIdentityProvider::returning("x@gmail.com", None),
        Arc::new(InMemoryUserStore::new()),
    );

    let response = send(&app, Method::GET, "/api/v1/auth/login/google", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: AuthUrlResponse = json_body(response).await;
    assert!(body
        .authorization_url
        .contains("accounts.google.com/o/oauth2/v2/auth"));
    assert!(body.authorization_url.contains(
        "redirect_uri=http%3A%2F%2F127.0.0.1%3A8000%2Fapi%2Fv1%2Fauth%2Fcallback%2Fgoogle"
    ));
    assert!(body.authorization_url.contains("state="));
}

#[tokio::test]
async fn test_google_login_binds_state_to_browser() {
    let app = app_with(
        FakeIdentityProvider::returning("x@gmail.com", None),
        Arc::new(InMemoryUserStore::new()),
    );

    let response = send(&app, Method::GET, "/api/v1/auth/login/google", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = header_str(&response, header::SET_COOKIE).to_string();
    assert!(cookie.starts_with(&format!("oauth_state={};", FAKE_STATE)));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Path=/api/v1/auth/callback/google"));
    assert!(cookie.contains("Max-Age=600"));
}

#[tokio::test]
async fn test_google_login_url_error_is_500() {
    let app = app_with(FakeIdentityProvider::failing(), Arc::new(InMemoryUserStore::new()));

    let response = send(&app, Method::GET, "/api/v1/auth/login/google", None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = json_body(response).await;
    assert_eq!(body["error"], "Failed to generate authorization URL");
}

#[tokio::test]
async fn test_callback_new_user() {
    let users = Arc::new(InMemoryUserStore::new());
    let app = app_with(
        FakeIdentityProvider::returning("newuser@gmail.com", Some("New User")),
        users.clone(),
    );

    let query = format!("code=mock_code&state={}", FAKE_STATE);
    let response = callback(&app, &query, Some(FAKE_STATE)).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(header_str(&response, header::LOCATION), DASHBOARD_URL);

    let cookie = set_cookies(&response)
        .into_iter()
        .find(|c| c.starts_with("access_token="))
        .unwrap();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Max-Age=1800"));
    // login state is single-use
    assert_eq!(cookie_set(&response, "oauth_state").as_deref(), Some(""));

    let user = users
        .find_by_email("newuser@gmail.com")
        .await
        .unwrap()
        .expect("user should be created");
    assert!(user.is_active);
    assert_eq!(user.full_name.as_deref(), Some("New User"));
    assert_eq!(users.len().await, 1);

    let validated = tokens().verify(&session_token(&response)).unwrap();
    assert_eq!(validated.subject, Some(user.id.to_string()));
}

#[tokio::test]
async fn test_callback_existing_user() {
    let users = Arc::new(InMemoryUserStore::new());
    let existing = users
        .create("existing@gmail.com", Some("Existing User"))
        .await
        .unwrap();
    let app = app_with(
        FakeIdentityProvider::returning("existing@gmail.com", Some("Existing User Updated")),
        users.clone(),
    );

    let query = format!("code=mock_code&state={}", FAKE_STATE);
    let response = callback(&app, &query, Some(FAKE_STATE)).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(users.len().await, 1);

    let validated = tokens().verify(&session_token(&response)).unwrap();
    assert_eq!(validated.subject, Some(existing.id.to_string()));
}

#[tokio::test]
async fn test_callback_failures_redirect_to_login_error() {
    let users = Arc::new(InMemoryUserStore::new());
    let ok_app = app_with(
        FakeIdentityProvider::returning("x@gmail.com", None),
        users.clone(),
    );
    let failing_app = app_with(FakeIdentityProvider::failing(), users.clone());

    let good = format!("code=mock_code&state={}", FAKE_STATE);
    let cases = [
        (&ok_app, "state=fake-state".to_string(), Some(FAKE_STATE)),
        (&ok_app, "code=mock_code".to_string(), Some(FAKE_STATE)),
        (&ok_app, "code=c&state=forged".to_string(), Some(FAKE_STATE)),
        (&ok_app, "code=c&state=forged".to_string(), Some("forged")),
        (&ok_app, "error=access_denied".to_string(), Some(FAKE_STATE)),
        (
            &ok_app,
            "error=access_denied&state=fake-state".to_string(),
            Some(FAKE_STATE),
        ),
        (&ok_app, good.clone(), None),
        (&ok_app, good.clone(), Some("other-browser")),
        (&failing_app, good.clone(), Some(FAKE_STATE)),
    ];

    for (app, query, state_cookie) in cases {
        let response = callback(app, &query, state_cookie).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT, "{query}");
        assert_eq!(header_str(&response, header::LOCATION), LOGIN_ERROR_URL, "{query}");
        assert_eq!(cookie_set(&response, "access_token"), None, "{query}");
        assert_eq!(cookie_set(&response, "oauth_state").as_deref(), Some(""), "{query}");
    }
    assert!(users.is_empty().await);
}

/// A callback link replayed in a browser that never started the login must
/// not log that browser in, even with a live state.
#[tokio::test]
async fn test_callback_requires_state_cookie_from_same_browser() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access_token": "google-token"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"email": "owner@gmail.com", "name": "Owner"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut settings = test_settings();
    settings.google_token_url = format!("{}/token", server.uri());
    settings.google_userinfo_url = format!("{}/userinfo", server.uri());
    let users = Arc::new(InMemoryUserStore::new());
    let app = build_router(test_state(
        settings.clone(),
        GoogleClient::new(&settings),
        users.clone(),
    ));

    let response = send(&app, Method::GET, "/api/v1/auth/login/google", None).await;
    let state = cookie_set(&response, "oauth_state").expect("state cookie should be set");
    let body: AuthUrlResponse = json_body(response).await;
    assert!(body.authorization_url.ends_with(&format!("state={}", state)));

    let query = format!("code=owner-code&state={}", state);

    let replayed = callback(&app, &query, None).await;
    assert_eq!(header_str(&replayed, header::LOCATION), LOGIN_ERROR_URL);
    assert_eq!(cookie_set(&replayed, "access_token"), None);
    assert!(users.is_empty().await);

    let own = callback(&app, &query, Some(&state)).await;
    assert_eq!(header_str(&own, header::LOCATION), DASHBOARD_URL);
    let validated = tokens().verify(&session_token(&own)).unwrap();
    let user = users.find_by_email("owner@gmail.com").await.unwrap().unwrap();
    assert_eq!(validated.subject, Some(user.id.to_string()));
}

#[tokio::test]
async fn test_validate_token() {
    let app = app_with(FakeIdentityProvider::failing(), Arc::new(InMemoryUserStore::new()));
    let subject = Uuid::new_v4().to_string();
    let token = tokens().issue_for_subject(&subject).unwrap();

    let response = send(&app, Method::GET, "/api/v1/auth/validate", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: TokenValidationResponse = json_body(response).await;
    assert!(body.valid);
    assert_eq!(body.user_id, Some(subject));
    assert!(body.expires_at > chrono::Utc::now().timestamp());
}

#[tokio::test]
async fn test_validate_accepts_any_bearer_case() {
    let app = app_with(FakeIdentityProvider::failing(), Arc::new(InMemoryUserStore::new()));
    let token = tokens().issue_for_subject("user-1").unwrap();

    for scheme in ["bearer", "BEARER"] {
        let request = Request::builder()
            .uri("/api/v1/auth/validate")
            .header(header::AUTHORIZATION, format!("{} {}", scheme, token))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{scheme}");
    }
}

#[tokio::test]
async fn test_validate_token_without_subject_has_null_user_id() {
    let app = app_with(FakeIdentityProvider::failing(), Arc::new(InMemoryUserStore::new()));
    let token = tokens().issue(&Claims::new(), None).unwrap();

    let response = send(&app, Method::GET, "/api/v1/auth/validate", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = json_body(response).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["user_id"], Value::Null);
    assert!(body["expires_at"].as_i64().unwrap() > chrono::Utc::now().timestamp());
}

#[tokio::test]
async fn test_validate_rejects_bad_tokens_uniformly() {
    let app = app_with(FakeIdentityProvider::failing(), Arc::new(InMemoryUserStore::new()));
    let expired = tokens()
        .issue(&Default::default(), Some(chrono::Duration::minutes(-5)))
        .unwrap();

    for token in [None, Some("garbage"), Some(expired.as_str())] {
        let response = send(&app, Method::GET, "/api/v1/auth/validate", token).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(header_str(&response, header::WWW_AUTHENTICATE), "Bearer");
        let body: Value = json_body(response).await;
        assert_eq!(body["error"], "Could not validate credentials");
    }
}

#[tokio::test]
async fn test_get_me_success() {
    let users = Arc::new(InMemoryUserStore::new());
    let user = users.create("me@example.com", Some("Test User")).await.unwrap();
    let app = app_with(FakeIdentityProvider::failing(), users);
    let token = tokens().issue_for_subject(&user.id.to_string()).unwrap();

    let response = send(&app, Method::GET, "/api/v1/users/me", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: User = json_body(response).await;
    assert_eq!(body, user);
}

#[tokio::test]
async fn test_get_me_with_session_cookie() {
    let users = Arc::new(InMemoryUserStore::new());
    let user = users.create("cookie@example.com", None).await.unwrap();
    let app = app_with(FakeIdentityProvider::failing(), users);
    let token = tokens().issue_for_subject(&user.id.to_string()).unwrap();

    let request = Request::builder()
        .uri("/api/v1/users/me")
        .header(header::COOKIE, format!("access_token={}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_get_me_unknown_subject_is_404() {
    let app = app_with(FakeIdentityProvider::failing(), Arc::new(InMemoryUserStore::new()));
    let token = tokens().issue_for_subject(&Uuid::new_v4().to_string()).unwrap();

    let response = send(&app, Method::GET, "/api/v1/users/me", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = json_body(response).await;
    assert_eq!(body["error"], "User not found");
}

#[tokio::test]
async fn test_get_me_after_user_removed_is_404() {
    let users = Arc::new(InMemoryUserStore::new());
    let user = users.create("gone@example.com", None).await.unwrap();
    let app = app_with(FakeIdentityProvider::failing(), users.clone());
    let token = tokens().issue_for_subject(&user.id.to_string()).unwrap();

    users.remove(user.id).await;

    // token itself is still valid
    let response = send(&app, Method::GET, "/api/v1/auth/validate", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, Method::GET, "/api/v1/users/me", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_me_without_token_is_401() {
    let app = app_with(FakeIdentityProvider::failing(), Arc::new(InMemoryUserStore::new()));

    let response = send(&app, Method::GET, "/api/v1/users/me", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_without_cookie_is_idempotent() {
    let app = app_with(FakeIdentityProvider::failing(), Arc::new(InMemoryUserStore::new()));

    for _ in 0..2 {
        let response = send(&app, Method::POST, "/api/v1/auth/logout", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let cookie = header_str(&response, header::SET_COOKIE).to_string();
        assert!(cookie.starts_with("access_token=;"));
        assert!(cookie.contains("Max-Age=0"));

        let body: Value = json_body(response).await;
        assert_eq!(body["message"], "Successfully logged out");
    }
}

#[tokio::test]
async fn test_logout_with_token_and_with_garbage() {
    let app = app_with(FakeIdentityProvider::failing(), Arc::new(InMemoryUserStore::new()));
    let token = tokens().issue_for_subject(&Uuid::new_v4().to_string()).unwrap();

    for bearer in [Some(token.as_str()), Some("garbage")] {
        let response = send(&app, Method::POST, "/api/v1/auth/logout", bearer).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
