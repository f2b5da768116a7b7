//! Session state and pending-authorization state, both carried in sealed
//! cookies.
//!
//! Cookies are sealed through a `PrivateCookieJar`, so their contents are
//! encrypted and authenticated with a key derived from the configured
//! secret. Anything that fails to unseal is treated as absent.

use axum_extra::extract::cookie::{Cookie, Key, PrivateCookieJar, SameSite};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use time::Duration;

use crate::identity::IdentityRecord;

/// Lifetime of the pending-authorization cookie.
const PENDING_TTL: Duration = Duration::minutes(10);

/// Suffix appended to the session cookie name for the pending cookie.
const PENDING_SUFFIX: &str = "_state";

/// Derives the cookie sealing key from the configured secret.
///
/// The digest widens any non-empty secret to the 64 key bytes the jar
/// requires, and keeps the key stable across restarts.
pub(crate) fn sealing_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}

/// Generates a state nonce: 16 bytes from the thread CSPRNG, hex encoded.
fn state_nonce() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    hex::encode(bytes)
}

/// An established session, sealed into the configured cookie after a
/// successful callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token returned by the provider's token endpoint.
    access_token: String,
    /// Identity fetched from the provider's account endpoint.
    user: IdentityRecord,
}

impl Session {
    /// Creates a session from a completed code exchange.
    #[must_use]
    pub fn new(access_token: String, user: IdentityRecord) -> Self {
        Self { access_token, user }
    }

    /// Returns the bearer access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the signed-in identity.
    #[must_use]
    pub fn user(&self) -> &IdentityRecord {
        &self.user
    }

    /// Returns the identity's email, the value injected as the remote user.
    #[must_use]
    pub fn username(&self) -> &str {
        self.user.email()
    }

    /// Reads and unseals the session from the jar.
    ///
    /// A missing cookie, a failed unseal, and an undecodable payload are all
    /// the same answer: no session.
    #[must_use]
    pub fn from_jar(jar: &PrivateCookieJar, name: &str) -> Option<Self> {
        let cookie = jar.get(name)?;
        serde_json::from_str(cookie.value()).ok()
    }

    /// Seals the session into the jar under `name`.
    #[must_use]
    pub fn seal(
        &self,
        jar: PrivateCookieJar,
        name: &str,
        secure: bool,
        ttl: Option<Duration>,
    ) -> PrivateCookieJar {
        let value = serde_json::to_string(self).expect("serialize session");
        let mut cookie = Cookie::build((name.to_string(), value))
            .path("/")
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Lax);
        if let Some(ttl) = ttl {
            cookie = cookie.max_age(ttl);
        }
        jar.add(cookie)
    }
}

/// A pending authorization: the state nonce embedded in the outbound
/// authorization URL plus the path to resume once the callback lands.
///
/// Sealed into a short-lived sibling of the session cookie so callback
/// correlation needs no server-side storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Anti-forgery nonce the provider must echo back.
    state: String,
    /// Originally requested path and query, resumed after the callback.
    return_to: String,
}

impl AuthorizationRequest {
    /// Creates a pending authorization with a fresh state nonce.
    #[must_use]
    pub fn new(return_to: String) -> Self {
        Self {
            state: state_nonce(),
            return_to,
        }
    }

    /// Returns the state nonce.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Returns the path to resume after the callback.
    #[must_use]
    pub fn return_to(&self) -> &str {
        &self.return_to
    }

    /// Returns the pending-cookie name for a session cookie name.
    #[must_use]
    pub fn cookie_name(session_cookie: &str) -> String {
        format!("{session_cookie}{PENDING_SUFFIX}")
    }

    /// Reads and unseals the pending authorization from the jar.
    #[must_use]
    pub fn from_jar(jar: &PrivateCookieJar, session_cookie: &str) -> Option<Self> {
        let cookie = jar.get(&Self::cookie_name(session_cookie))?;
        serde_json::from_str(cookie.value()).ok()
    }

    /// Seals the pending authorization into the jar.
    #[must_use]
    pub fn seal(
        &self,
        jar: PrivateCookieJar,
        session_cookie: &str,
        secure: bool,
    ) -> PrivateCookieJar {
        let value = serde_json::to_string(self).expect("serialize pending authorization");
        let cookie = Cookie::build((Self::cookie_name(session_cookie), value))
            .path("/")
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Lax)
            .max_age(PENDING_TTL);
        jar.add(cookie)
    }

    /// Expires the pending cookie once the authorization is consumed.
    ///
    /// Goes through `remove` rather than `add` so the expiry reaches the
    /// client as a plain empty value instead of a sealed one.
    #[must_use]
    pub fn clear(jar: PrivateCookieJar, session_cookie: &str) -> PrivateCookieJar {
        let removal = Cookie::build((Self::cookie_name(session_cookie), String::new())).path("/");
        jar.remove(removal)
    }
}
