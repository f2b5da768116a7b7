//! End-to-end authorization-code flow against mocked provider endpoints.

use std::collections::HashSet;

use axum::{
    Router,
    body::Body,
    extract::Request,
    http::{StatusCode, header},
    response::Response,
    routing::get,
};
use heroku_gate::{AccessPolicy, Gate, GateConfig, RemoteUser};
use tower::ServiceExt;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{bearer_token, body_string_contains, method, path},
};

const CODE: &str = "SplxlOBeZQQYbYS6WxSbIA";
const ACCESS_TOKEN: &str = "heroku-access-token";

async fn whoami(req: Request) -> String {
    match req.extensions().get::<RemoteUser>() {
        Some(RemoteUser(email)) => format!("remote user: {email}"),
        None => "no remote user".to_string(),
    }
}

fn demo_app() -> Router {
    Router::new()
        .route("/", get(whoami))
        .route("/reports", get(whoami))
        .route("/auth/heroku/forbidden/", get(whoami))
}

fn gate_config(server: &MockServer) -> heroku_gate::GateConfigBuilder {
    GateConfig::builder(
        "test-client".to_string(),
        "test-secret".to_string(),
        "test-sealing-secret".to_string(),
    )
    .authorize_url(format!("{}/oauth/authorize", server.uri()))
    .token_url(format!("{}/oauth/token", server.uri()))
    .account_url(format!("{}/account", server.uri()))
    .secure_cookies(false)
}

fn gated_app(server: &MockServer) -> Router {
    let gate = Gate::new(gate_config(server).build()).expect("gate");
    gate.wrap(demo_app())
}

fn get_request(uri: &str, cookies: &str) -> Request {
    let mut builder = Request::builder()
        .uri(uri)
        .header(header::HOST, "app.example");
    if !cookies.is_empty() {
        builder = builder.header(header::COOKIE, cookies);
    }
    builder.body(Body::empty()).expect("request")
}

async fn send(app: &Router, request: Request) -> Response {
    app.clone().oneshot(request).await.expect("response")
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

/// Returns the `name=value` pairs set by the response, dropping attributes.
fn set_cookies(response: &Response) -> Vec<(String, String)> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

fn cookie_value(response: &Response, name: &str) -> Option<String> {
    set_cookies(response)
        .into_iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v)
}

fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("location header")
        .to_str()
        .expect("ascii location")
        .to_string()
}

fn state_param(location: &str) -> String {
    let url = url::Url::parse(location).expect("absolute location");
    url.query_pairs()
        .find(|(name, _)| name == "state")
        .map(|(_, value)| value.into_owned())
        .expect("state parameter")
}

/// Runs the challenge leg and returns the state nonce plus the pending
/// cookie to replay on the callback.
async fn challenge(app: &Router, uri: &str) -> (String, String) {
    let response = send(app, get_request(uri, "")).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let state = state_param(&location(&response));
    let pending = cookie_value(&response, "herokuoauthsess_state").expect("pending cookie");
    (state, format!("herokuoauthsess_state={pending}"))
}

/// Completes a full login and returns the session cookie to replay.
async fn login(app: &Router, uri: &str) -> String {
    let (state, pending_cookie) = challenge(app, uri).await;

    let callback_uri = format!("/auth/heroku/callback/?code={CODE}&state={state}");
    let response = send(app, get_request(&callback_uri, &pending_cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), uri);

    let session = cookie_value(&response, "herokuoauthsess").expect("session cookie");
    format!("herokuoauthsess={session}")
}

async fn mount_token_endpoint(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains(format!("code={CODE}")))
        .and(body_string_contains("client_id=test-client"))
        .and(body_string_contains("client_secret=test-secret"))
        .and(body_string_contains(
            "redirect_uri=http%3A%2F%2Fapp.example%2Fauth%2Fheroku%2Fcallback%2F",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": ACCESS_TOKEN,
            "token_type": "bearer"
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_account_endpoint(server: &MockServer, email: &str, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/account"))
        .and(bearer_token(ACCESS_TOKEN))
        .and(wiremock::matchers::header(
            "accept",
            "application/vnd.heroku+json; version=3",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "0bdc7f51-e284-4a34-9a44-e1f12b451f7b",
            "email": email,
            "verified": true
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn unauthenticated_request_is_redirected_to_the_provider() {
    let server = MockServer::start().await;
    let app = gated_app(&server);

    let response = send(&app, get_request("/", "")).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = location(&response);
    assert!(location.starts_with(&format!("{}/oauth/authorize", server.uri())));

    let url = url::Url::parse(&location).expect("authorize URL");
    let params: std::collections::HashMap<String, String> =
        url.query_pairs().into_owned().collect();
    assert_eq!(params.get("response_type").map(String::as_str), Some("code"));
    assert_eq!(params.get("client_id").map(String::as_str), Some("test-client"));
    assert_eq!(params.get("scope").map(String::as_str), Some("identity"));
    assert_eq!(
        params.get("redirect_uri").map(String::as_str),
        Some("http://app.example/auth/heroku/callback/")
    );

    let state = params.get("state").expect("state parameter");
    assert_eq!(state.len(), 32);
    assert!(state.chars().all(|c| c.is_ascii_hexdigit()));

    assert!(cookie_value(&response, "herokuoauthsess_state").is_some());
}

#[tokio::test]
async fn each_challenge_issues_a_distinct_state() {
    let server = MockServer::start().await;
    let app = gated_app(&server);

    let mut states = HashSet::new();
    for _ in 0..5 {
        let response = send(&app, get_request("/", "")).await;
        states.insert(state_param(&location(&response)));
    }

    assert_eq!(states.len(), 5);
}

#[tokio::test]
async fn forged_callback_state_never_reaches_the_provider() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 0).await;
    let app = gated_app(&server);

    let (_state, pending_cookie) = challenge(&app, "/").await;

    // Right cookie, wrong state parameter.
    let forged = format!("/auth/heroku/callback/?code={CODE}&state={}", "f".repeat(32));
    let response = send(&app, get_request(&forged, &pending_cookie)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // No pending cookie at all.
    let bare = format!("/auth/heroku/callback/?code={CODE}&state={}", "f".repeat(32));
    let response = send(&app, get_request(&bare, "")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let outbound = server.received_requests().await.expect("request recording");
    assert!(outbound.is_empty());
}

#[tokio::test]
async fn callback_without_code_is_rejected() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 0).await;
    let app = gated_app(&server);

    let (state, pending_cookie) = challenge(&app, "/").await;

    let callback_uri = format!("/auth/heroku/callback/?state={state}");
    let response = send(&app, get_request(&callback_uri, &pending_cookie)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let outbound = server.received_requests().await.expect("request recording");
    assert!(outbound.is_empty());
}

#[tokio::test]
async fn full_login_establishes_a_replayable_session() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 1).await;
    mount_account_endpoint(&server, "user@heroku.com", 1).await;
    let app = gated_app(&server);

    let session_cookie = login(&app, "/reports?week=12").await;

    // The replayed cookie passes straight through; the token endpoint's
    // expectation of one call proves no re-exchange happened.
    let response = send(&app, get_request("/reports?week=12", &session_cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "remote user: user@heroku.com");
}

#[tokio::test]
async fn login_can_be_driven_from_a_spawned_task() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 1).await;
    mount_account_endpoint(&server, "user@heroku.com", 1).await;
    let app = gated_app(&server);

    // Spawning requires the whole login future to be `Send`.
    let session_cookie = tokio::spawn(async move { login(&app, "/").await })
        .await
        .expect("spawned login");

    assert!(session_cookie.starts_with("herokuoauthsess="));
}

#[tokio::test]
async fn callback_clears_the_pending_cookie() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 1).await;
    mount_account_endpoint(&server, "user@heroku.com", 1).await;
    let app = gated_app(&server);

    let (state, pending_cookie) = challenge(&app, "/").await;
    let callback_uri = format!("/auth/heroku/callback/?code={CODE}&state={state}");
    let response = send(&app, get_request(&callback_uri, &pending_cookie)).await;

    assert_eq!(
        cookie_value(&response, "herokuoauthsess_state"),
        Some(String::new())
    );
}

#[tokio::test]
async fn protocol_relative_return_target_falls_back_to_the_root() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 1).await;
    mount_account_endpoint(&server, "user@heroku.com", 1).await;
    let app = gated_app(&server);

    // Browsers resolve a `//evil.example/` Location onto another origin, so
    // the resume target must collapse to the root instead of echoing it.
    let (state, pending_cookie) = challenge(&app, "//evil.example/").await;
    let callback_uri = format!("/auth/heroku/callback/?code={CODE}&state={state}");
    let response = send(&app, get_request(&callback_uri, &pending_cookie)).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn rejected_identity_is_redirected_to_the_forbidden_page() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 1).await;
    mount_account_endpoint(&server, "user@example.com", 1).await;

    let config = gate_config(&server)
        .policy(AccessPolicy::email_domain("@heroku.com"))
        .build();
    let gate = Gate::new(config).expect("gate");
    let app = gate.wrap(demo_app());

    let (state, pending_cookie) = challenge(&app, "/").await;
    let callback_uri = format!("/auth/heroku/callback/?code={CODE}&state={state}");
    let response = send(&app, get_request(&callback_uri, &pending_cookie)).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth/heroku/forbidden/");
    assert_eq!(cookie_value(&response, "herokuoauthsess"), None);

    // The forbidden page is served by the gate, not the application.
    let response = send(&app, get_request("/auth/heroku/forbidden/", "")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(body_text(response).await.contains("403 Forbidden"));
}

#[tokio::test]
async fn forbidden_passthrough_reaches_the_application_without_identity() {
    let server = MockServer::start().await;
    let config = gate_config(&server).forbidden_passthrough(true).build();
    let gate = Gate::new(config).expect("gate");
    let app = gate.wrap(demo_app());

    let response = send(&app, get_request("/auth/heroku/forbidden/", "")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "no remote user");
}

#[tokio::test]
async fn tampered_session_cookie_is_treated_as_unauthenticated() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 1).await;
    mount_account_endpoint(&server, "user@heroku.com", 1).await;
    let app = gated_app(&server);

    let session_cookie = login(&app, "/").await;
    let mut tampered: Vec<char> = session_cookie.chars().collect();
    let mid = tampered.len() / 2;
    tampered[mid] = if tampered[mid] == 'A' { 'B' } else { 'A' };
    let tampered: String = tampered.into_iter().collect();

    let response = send(&app, get_request("/", &tampered)).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

#[tokio::test]
async fn token_endpoint_failure_surfaces_as_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    let app = gated_app(&server);

    let (state, pending_cookie) = challenge(&app, "/").await;
    let callback_uri = format!("/auth/heroku/callback/?code={CODE}&state={state}");
    let response = send(&app, get_request(&callback_uri, &pending_cookie)).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(cookie_value(&response, "herokuoauthsess"), None);
}

#[tokio::test]
async fn account_endpoint_failure_surfaces_as_bad_gateway() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/account"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;
    let app = gated_app(&server);

    let (state, pending_cookie) = challenge(&app, "/").await;
    let callback_uri = format!("/auth/heroku/callback/?code={CODE}&state={state}");
    let response = send(&app, get_request(&callback_uri, &pending_cookie)).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn remote_user_injection_can_be_disabled() {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, 1).await;
    mount_account_endpoint(&server, "user@heroku.com", 1).await;

    let config = gate_config(&server).set_remote_user(false).build();
    let gate = Gate::new(config).expect("gate");
    let app = gate.wrap(demo_app());

    let session_cookie = login(&app, "/").await;
    let response = send(&app, get_request("/", &session_cookie)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "no remote user");
}
