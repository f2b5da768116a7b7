//! Heroku identity provider adapter and the access policy.
//!
//! `IdentityClient` owns the three provider-facing operations: building the
//! authorization URL, exchanging an authorization code, and fetching the
//! account document for a bearer token. `AccessPolicy` is the pluggable
//! predicate deciding whether a fetched identity may use the application.

use std::fmt;
use std::sync::Arc;

use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EmptyExtraTokenFields, RedirectUrl, Scope, StandardTokenResponse, TokenResponse, TokenUrl,
    basic::{BasicClient, BasicTokenType},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::GateConfig;
use crate::error::{ConfigError, IdentityError};

/// Accept header for the Heroku Platform API.
const ACCOUNT_ACCEPT: &str = "application/vnd.heroku+json; version=3";

/// Type alias for the token response type.
type ExchangeResponse = StandardTokenResponse<EmptyExtraTokenFields, BasicTokenType>;

/// Normalized provider account data.
///
/// Produced once per callback from the account document and folded into the
/// session; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// The account email, used as the remote-user value.
    email: String,
    /// The full account document as returned by the provider.
    raw: serde_json::Value,
}

impl IdentityRecord {
    /// Builds a record from the provider's account document.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::AccountFetch` if the document carries neither
    /// an `email` nor a `username` field.
    pub fn from_payload(payload: serde_json::Value) -> Result<Self, IdentityError> {
        let email = payload
            .get("email")
            .or_else(|| payload.get("username"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| IdentityError::AccountFetch {
                reason: "account document has no email or username field".to_string(),
            })?;

        Ok(Self {
            email,
            raw: payload,
        })
    }

    /// Returns the account email.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the full account document.
    #[must_use]
    pub fn raw(&self) -> &serde_json::Value {
        &self.raw
    }
}

/// Predicate deciding whether an authenticated identity may pass the gate.
///
/// Evaluated once per callback, against the record fetched for that login.
/// Policies must be pure functions of the record.
#[derive(Clone)]
pub struct AccessPolicy(Arc<dyn Fn(&IdentityRecord) -> bool + Send + Sync>);

impl AccessPolicy {
    /// Policy admitting every authenticated identity.
    #[must_use]
    pub fn allow_all() -> Self {
        Self(Arc::new(|_| true))
    }

    /// Policy admitting identities whose email ends with `suffix`.
    ///
    /// `AccessPolicy::email_domain("@heroku.com")` restricts the gate to
    /// Heroku staff accounts.
    #[must_use]
    pub fn email_domain(suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        Self(Arc::new(move |record| record.email().ends_with(&suffix)))
    }

    /// Wraps an arbitrary predicate.
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&IdentityRecord) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    /// Evaluates the policy against a record.
    #[must_use]
    pub fn evaluate(&self, record: &IdentityRecord) -> bool {
        (self.0)(record)
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::allow_all()
    }
}

impl fmt::Debug for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessPolicy(..)")
    }
}

/// Client for the provider's authorization, token, and account endpoints.
#[derive(Clone)]
pub struct IdentityClient {
    client_id: String,
    client_secret: String,
    authorize_url: String,
    token_url: String,
    account_url: String,
    scope: String,
    http: reqwest::Client,
}

impl IdentityClient {
    /// Creates a client from validated configuration and a shared HTTP
    /// client.
    pub(crate) fn new(config: &GateConfig, http: reqwest::Client) -> Self {
        Self {
            client_id: config.client_id().to_string(),
            client_secret: config.client_secret().to_string(),
            authorize_url: config.authorize_url().to_string(),
            token_url: config.token_url().to_string(),
            account_url: config.account_url().to_string(),
            scope: config.scope().to_string(),
            http,
        }
    }

    /// Builds the provider authorization URL for one pending request.
    ///
    /// Pure construction: carries `response_type=code`, the client ID, the
    /// scope, the callback `redirect_uri`, and the caller's `state` nonce.
    ///
    /// # Errors
    ///
    /// Returns an error if `redirect_uri` is not an absolute URL.
    pub fn authorization_url(&self, state: &str, redirect_uri: &str) -> Result<Url, ConfigError> {
        let redirect =
            RedirectUrl::new(redirect_uri.to_string()).map_err(|e| ConfigError::InvalidField {
                field: "redirect_uri",
                reason: e.to_string(),
            })?;

        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_auth_uri(AuthUrl::new(self.authorize_url.clone()).expect("valid authorize URL"))
            .set_redirect_uri(redirect);

        let state = state.to_string();
        let (url, _state) = client
            .authorize_url(move || CsrfToken::new(state))
            .add_scope(Scope::new(self.scope.clone()))
            .url();

        Ok(url)
    }

    /// Exchanges an authorization code for a bearer access token.
    ///
    /// One POST to the token endpoint, credentials in the request body as
    /// the Heroku variant expects. Not retried.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::TokenExchange` for transport and provider
    /// failures alike.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<String, IdentityError> {
        let redirect = RedirectUrl::new(redirect_uri.to_string()).map_err(|e| {
            IdentityError::TokenExchange {
                reason: format!("invalid redirect URL: {e}"),
            }
        })?;

        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.client_secret.clone()))
            .set_auth_type(AuthType::RequestBody)
            .set_token_uri(TokenUrl::new(self.token_url.clone()).expect("valid token URL"))
            .set_redirect_uri(redirect);

        tracing::debug!("Exchanging authorization code at {}", self.token_url);
        let token: ExchangeResponse = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| IdentityError::TokenExchange {
                reason: e.to_string(),
            })?;

        Ok(token.access_token().secret().clone())
    }

    /// Fetches and normalizes the account document for a bearer token.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::AccountFetch` for transport failures, non-2xx
    /// responses, and undecodable documents.
    pub async fn fetch_identity(
        &self,
        access_token: &str,
    ) -> Result<IdentityRecord, IdentityError> {
        tracing::debug!("Fetching account document from {}", self.account_url);
        let response = self
            .http
            .get(&self.account_url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, ACCOUNT_ACCEPT)
            .send()
            .await
            .map_err(|e| IdentityError::AccountFetch {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IdentityError::AccountFetch {
                reason: format!("account endpoint returned {status}"),
            });
        }

        let payload: serde_json::Value =
            response.json().await.map_err(|e| IdentityError::AccountFetch {
                reason: format!("malformed account document: {e}"),
            })?;

        IdentityRecord::from_payload(payload)
    }
}
