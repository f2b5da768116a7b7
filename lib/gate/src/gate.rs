//! The gate itself: every request entering a wrapped router is dispatched
//! here before the application sees it.
//!
//! Dispatch order, per request:
//! 1. the callback path completes a pending authorization,
//! 2. the forbidden path answers with the canned 403 page (or passes
//!    through, identity-free, when configured),
//! 3. a request with an unsealable-or-absent session cookie is redirected
//!    to the provider,
//! 4. everything else passes through with the remote user injected.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    http::{StatusCode, Uri, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Key, PrivateCookieJar};

use crate::{
    config::GateConfig,
    error::{ConfigError, GateError},
    identity::IdentityClient,
    session::{AuthorizationRequest, Session, sealing_key},
};

/// Timeout for each outbound provider call.
const PROVIDER_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Canned response body for the forbidden path.
const FORBIDDEN_BODY: &str = r"<!DOCTYPE html>
<html>
<head><title>Forbidden</title></head>
<body>
<h1>403 Forbidden</h1>
<p>You are signed in, but your account is not permitted to use this
application.</p>
</body>
</html>
";

/// Identity of the signed-in user, injected as a request extension on
/// passed-through requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUser(pub String);

/// The authentication gate.
///
/// Cheap to clone; all state is immutable and shared. Build one per
/// application with [`Gate::new`] and mount it with [`Gate::wrap`].
#[derive(Clone)]
pub struct Gate {
    inner: Arc<GateInner>,
}

struct GateInner {
    config: GateConfig,
    identity: IdentityClient,
    key: Key,
}

impl Gate {
    /// Builds a gate from the configuration.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` when a required credential is empty, an
    /// endpoint URL does not parse, or the outbound HTTP client cannot be
    /// built. Nothing is deferred to request time.
    pub fn new(config: GateConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::HttpClient {
                reason: e.to_string(),
            })?;

        let identity = IdentityClient::new(&config, http);
        let key = sealing_key(config.secret_key());

        Ok(Self {
            inner: Arc::new(GateInner {
                config,
                identity,
                key,
            }),
        })
    }

    /// Returns the gate configuration.
    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.inner.config
    }

    /// Returns the provider client.
    #[must_use]
    pub fn identity(&self) -> &IdentityClient {
        &self.inner.identity
    }

    /// Wraps a router so every request passes through the gate first.
    #[must_use]
    pub fn wrap(&self, app: Router) -> Router {
        app.layer(middleware::from_fn_with_state(self.clone(), intercept))
    }

    async fn handle(&self, req: Request, next: Next) -> Response {
        let config = &self.inner.config;
        let jar = PrivateCookieJar::from_headers(req.headers(), self.inner.key.clone());

        if req.uri().path() == config.path() {
            return match self.handle_callback(req, jar).await {
                Ok(response) => response,
                Err(error) => error.into_response(),
            };
        }

        if req.uri().path() == config.forbidden_path() {
            if config.forbidden_passthrough() {
                return next.run(req).await;
            }
            return forbidden_response();
        }

        if let Some(session) = Session::from_jar(&jar, config.cookie()) {
            let mut req = req;
            if config.set_remote_user() {
                req.extensions_mut()
                    .insert(RemoteUser(session.username().to_string()));
            }
            return next.run(req).await;
        }

        match self.challenge(&req, jar) {
            Ok(response) => response,
            Err(error) => error.into_response(),
        }
    }

    /// Completes a return trip from the provider.
    ///
    /// The state check runs before anything touches the network; a callback
    /// that cannot be correlated with a pending authorization never causes
    /// an outbound call.
    async fn handle_callback(
        &self,
        req: Request,
        jar: PrivateCookieJar,
    ) -> Result<Response, GateError> {
        let config = &self.inner.config;
        let query = parse_query(req.uri());

        let pending = AuthorizationRequest::from_jar(&jar, config.cookie())
            .ok_or(GateError::StateMismatch)?;
        if query.get("state").map(String::as_str) != Some(pending.state()) {
            return Err(GateError::StateMismatch);
        }
        let code = query.get("code").ok_or(GateError::MissingCode)?;

        let redirect_uri = self.callback_url(&req)?;
        let token = self.inner.identity.exchange_code(code, &redirect_uri).await?;
        let record = self.inner.identity.fetch_identity(&token).await?;

        let jar = AuthorizationRequest::clear(jar, config.cookie());

        if !config.policy().evaluate(&record) {
            tracing::info!(user = record.email(), "Identity rejected by the access policy");
            return Ok((jar, Redirect::to(config.forbidden_path())).into_response());
        }

        tracing::info!(user = record.email(), "Authentication succeeded");
        let session = Session::new(token, record);
        let jar = session.seal(
            jar,
            config.cookie(),
            config.secure_cookies(),
            config.session_ttl(),
        );

        Ok((jar, Redirect::to(pending.return_to())).into_response())
    }

    /// Starts a fresh authorization for an unauthenticated request.
    fn challenge(&self, req: &Request, jar: PrivateCookieJar) -> Result<Response, GateError> {
        let config = &self.inner.config;
        let redirect_uri = self.callback_url(req)?;

        let pending = AuthorizationRequest::new(resume_target(req.uri()));

        let authorize = self
            .inner
            .identity
            .authorization_url(pending.state(), &redirect_uri)
            .map_err(|_| GateError::InvalidHost)?;

        tracing::debug!(state = pending.state(), "Redirecting to the identity provider");
        let jar = pending.seal(jar, config.cookie(), config.secure_cookies());

        Ok((jar, Redirect::temporary(authorize.as_str())).into_response())
    }

    /// Rebuilds the externally visible callback URL for this request.
    ///
    /// Scheme comes from `X-Forwarded-Proto` when a proxy supplies it. The
    /// authority comes from the request URI when the client sent one (HTTP/2
    /// requests carry it there instead of a `Host` header), otherwise from
    /// the `Host` header.
    fn callback_url(&self, req: &Request) -> Result<String, GateError> {
        let host = req
            .uri()
            .authority()
            .map(|authority| authority.as_str())
            .or_else(|| {
                req.headers()
                    .get(header::HOST)
                    .and_then(|value| value.to_str().ok())
            })
            .ok_or(GateError::InvalidHost)?;
        let proto = req
            .headers()
            .get("x-forwarded-proto")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("http");

        Ok(format!("{proto}://{host}{}", self.inner.config.path()))
    }
}

/// Gate middleware entry point, for mounting by hand with
/// `axum::middleware::from_fn_with_state`. [`Gate::wrap`] does this for you.
pub async fn intercept(State(gate): State<Gate>, req: Request, next: Next) -> Response {
    gate.handle(req, next).await
}

fn forbidden_response() -> Response {
    (StatusCode::FORBIDDEN, Html(FORBIDDEN_BODY)).into_response()
}

/// Picks the path to resume after authentication.
///
/// Only a target with a single leading slash is kept. Anything else, in
/// particular a network-path reference such as `//evil.example/` that a
/// browser would resolve onto another origin, falls back to the root.
fn resume_target(uri: &Uri) -> String {
    let target = uri
        .path_and_query()
        .map_or_else(|| "/".to_string(), |pq| pq.to_string());
    if target.starts_with('/') && !target.starts_with("//") && !target.starts_with("/\\") {
        target
    } else {
        "/".to_string()
    }
}

fn parse_query(uri: &Uri) -> HashMap<String, String> {
    uri.query()
        .map(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}
