//! Gate configuration.
//!
//! All settings are fixed when the gate is constructed. The three
//! credentials (`client_id`, `client_secret`, `secret_key`) are required;
//! everything else defaults to the values the Heroku identity platform
//! expects.

use serde::{Deserialize, Serialize};
use time::Duration;

use crate::error::ConfigError;
use crate::identity::AccessPolicy;

/// Heroku OAuth authorization URL.
const HEROKU_AUTHORIZE_URL: &str = "https://id.heroku.com/oauth/authorize";

/// Heroku OAuth token URL.
const HEROKU_TOKEN_URL: &str = "https://id.heroku.com/oauth/token";

/// Heroku Platform API account endpoint.
const HEROKU_ACCOUNT_URL: &str = "https://api.heroku.com/account";

/// Configuration for the authentication gate.
///
/// Fields with defaults can be omitted when loading from environment
/// variables; the access policy is not deserializable and defaults to
/// admitting every authenticated identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// OAuth client ID issued by the identity provider.
    client_id: String,
    /// OAuth client secret issued by the identity provider.
    client_secret: String,
    /// Secret the cookie sealing key is derived from.
    secret_key: String,
    /// OAuth scope to request. Default: "identity"
    #[serde(default = "default_scope")]
    scope: String,
    /// Name of the session cookie. Default: "herokuoauthsess"
    #[serde(default = "default_cookie")]
    cookie: String,
    /// Path the provider redirects back to after authorization.
    /// Default: "/auth/heroku/callback/"
    #[serde(default = "default_path")]
    path: String,
    /// Path rejected identities are sent to.
    /// Default: "/auth/heroku/forbidden/"
    #[serde(default = "default_forbidden_path")]
    forbidden_path: String,
    /// Whether requests for `forbidden_path` reach the wrapped application
    /// instead of a canned 403 page. Default: false
    #[serde(default)]
    forbidden_passthrough: bool,
    /// Whether the signed-in identity is injected into passed-through
    /// requests as a `RemoteUser` extension. Default: true
    #[serde(default = "default_set_remote_user")]
    set_remote_user: bool,
    /// Provider authorization endpoint.
    #[serde(default = "default_authorize_url")]
    authorize_url: String,
    /// Provider token endpoint.
    #[serde(default = "default_token_url")]
    token_url: String,
    /// Provider account endpoint.
    #[serde(default = "default_account_url")]
    account_url: String,
    /// Whether cookies are marked `Secure`. Disable only for plain-HTTP
    /// development setups. Default: true
    #[serde(default = "default_secure_cookies")]
    secure_cookies: bool,
    /// Session cookie lifetime in minutes. Absent means a browser-session
    /// cookie with no `Max-Age`.
    #[serde(default)]
    session_ttl_minutes: Option<i64>,
    /// Predicate deciding whether an authenticated identity may pass.
    #[serde(skip, default)]
    policy: AccessPolicy,
}

fn default_scope() -> String {
    "identity".to_string()
}

fn default_cookie() -> String {
    "herokuoauthsess".to_string()
}

fn default_path() -> String {
    "/auth/heroku/callback/".to_string()
}

fn default_forbidden_path() -> String {
    "/auth/heroku/forbidden/".to_string()
}

fn default_set_remote_user() -> bool {
    true
}

fn default_authorize_url() -> String {
    HEROKU_AUTHORIZE_URL.to_string()
}

fn default_token_url() -> String {
    HEROKU_TOKEN_URL.to_string()
}

fn default_account_url() -> String {
    HEROKU_ACCOUNT_URL.to_string()
}

fn default_secure_cookies() -> bool {
    true
}

impl GateConfig {
    /// Creates a configuration with defaults for all optional settings.
    #[must_use]
    pub fn new(client_id: String, client_secret: String, secret_key: String) -> Self {
        Self {
            client_id,
            client_secret,
            secret_key,
            scope: default_scope(),
            cookie: default_cookie(),
            path: default_path(),
            forbidden_path: default_forbidden_path(),
            forbidden_passthrough: false,
            set_remote_user: default_set_remote_user(),
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            account_url: default_account_url(),
            secure_cookies: default_secure_cookies(),
            session_ttl_minutes: None,
            policy: AccessPolicy::default(),
        }
    }

    /// Creates a configuration builder for more customization.
    #[must_use]
    pub fn builder(
        client_id: String,
        client_secret: String,
        secret_key: String,
    ) -> GateConfigBuilder {
        GateConfigBuilder::new(client_id, client_secret, secret_key)
    }

    /// Checks that required settings are present and endpoint URLs parse.
    ///
    /// # Errors
    ///
    /// Returns the first rejected setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.is_empty() {
            return Err(ConfigError::MissingField { field: "client_id" });
        }
        if self.client_secret.is_empty() {
            return Err(ConfigError::MissingField {
                field: "client_secret",
            });
        }
        if self.secret_key.is_empty() {
            return Err(ConfigError::MissingField {
                field: "secret_key",
            });
        }

        for (field, value) in [
            ("authorize_url", &self.authorize_url),
            ("token_url", &self.token_url),
            ("account_url", &self.account_url),
        ] {
            url::Url::parse(value).map_err(|e| ConfigError::InvalidField {
                field,
                reason: e.to_string(),
            })?;
        }

        for (field, value) in [
            ("path", &self.path),
            ("forbidden_path", &self.forbidden_path),
        ] {
            if !value.starts_with('/') {
                return Err(ConfigError::InvalidField {
                    field,
                    reason: "must be an absolute path".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Returns the OAuth client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the OAuth client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Returns the cookie sealing secret.
    #[must_use]
    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    /// Returns the OAuth scope to request.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Returns the session cookie name.
    #[must_use]
    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    /// Returns the callback path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the forbidden path.
    #[must_use]
    pub fn forbidden_path(&self) -> &str {
        &self.forbidden_path
    }

    /// Returns whether forbidden-path requests reach the application.
    #[must_use]
    pub fn forbidden_passthrough(&self) -> bool {
        self.forbidden_passthrough
    }

    /// Returns whether the identity is injected into passed-through requests.
    #[must_use]
    pub fn set_remote_user(&self) -> bool {
        self.set_remote_user
    }

    /// Returns the provider authorization endpoint.
    #[must_use]
    pub fn authorize_url(&self) -> &str {
        &self.authorize_url
    }

    /// Returns the provider token endpoint.
    #[must_use]
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Returns the provider account endpoint.
    #[must_use]
    pub fn account_url(&self) -> &str {
        &self.account_url
    }

    /// Returns whether cookies are marked `Secure`.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }

    /// Returns the session cookie lifetime, if one is configured.
    #[must_use]
    pub fn session_ttl(&self) -> Option<Duration> {
        self.session_ttl_minutes.map(Duration::minutes)
    }

    /// Returns the access policy.
    #[must_use]
    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }
}

/// Builder for `GateConfig`.
#[derive(Debug)]
pub struct GateConfigBuilder {
    config: GateConfig,
}

impl GateConfigBuilder {
    /// Creates a new builder with required fields.
    #[must_use]
    pub fn new(client_id: String, client_secret: String, secret_key: String) -> Self {
        Self {
            config: GateConfig::new(client_id, client_secret, secret_key),
        }
    }

    /// Sets the OAuth scope to request.
    #[must_use]
    pub fn scope(mut self, scope: String) -> Self {
        self.config.scope = scope;
        self
    }

    /// Sets the session cookie name.
    #[must_use]
    pub fn cookie(mut self, cookie: String) -> Self {
        self.config.cookie = cookie;
        self
    }

    /// Sets the callback path.
    #[must_use]
    pub fn path(mut self, path: String) -> Self {
        self.config.path = path;
        self
    }

    /// Sets the forbidden path.
    #[must_use]
    pub fn forbidden_path(mut self, forbidden_path: String) -> Self {
        self.config.forbidden_path = forbidden_path;
        self
    }

    /// Forwards forbidden-path requests to the application instead of the
    /// canned 403 page.
    #[must_use]
    pub fn forbidden_passthrough(mut self, passthrough: bool) -> Self {
        self.config.forbidden_passthrough = passthrough;
        self
    }

    /// Controls `RemoteUser` injection into passed-through requests.
    #[must_use]
    pub fn set_remote_user(mut self, set_remote_user: bool) -> Self {
        self.config.set_remote_user = set_remote_user;
        self
    }

    /// Sets the provider authorization endpoint.
    #[must_use]
    pub fn authorize_url(mut self, authorize_url: String) -> Self {
        self.config.authorize_url = authorize_url;
        self
    }

    /// Sets the provider token endpoint.
    #[must_use]
    pub fn token_url(mut self, token_url: String) -> Self {
        self.config.token_url = token_url;
        self
    }

    /// Sets the provider account endpoint.
    #[must_use]
    pub fn account_url(mut self, account_url: String) -> Self {
        self.config.account_url = account_url;
        self
    }

    /// Controls the `Secure` attribute on issued cookies.
    #[must_use]
    pub fn secure_cookies(mut self, secure: bool) -> Self {
        self.config.secure_cookies = secure;
        self
    }

    /// Sets the session cookie lifetime in minutes.
    #[must_use]
    pub fn session_ttl_minutes(mut self, minutes: i64) -> Self {
        self.config.session_ttl_minutes = Some(minutes);
        self
    }

    /// Sets the access policy.
    #[must_use]
    pub fn policy(mut self, policy: AccessPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    /// Builds the `GateConfig`.
    #[must_use]
    pub fn build(self) -> GateConfig {
        self.config
    }
}
