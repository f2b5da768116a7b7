//! Error types for the gate.
//!
//! Three layers of failure:
//! - `ConfigError`: rejected settings, returned from `Gate::new` before any
//!   request is served
//! - `IdentityError`: provider calls that failed during a callback
//! - `GateError`: everything a callback request can answer with, including
//!   wrapped `IdentityError`s, mapped onto HTTP responses
//!
//! An unsealable session cookie is not an error anywhere in this crate; it
//! is treated as the absence of a session.

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Errors from validating gate configuration.
///
/// These are construction-time failures; a running gate never produces them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting is empty or absent.
    MissingField { field: &'static str },
    /// A setting is present but unusable.
    InvalidField { field: &'static str, reason: String },
    /// The outbound HTTP client could not be constructed.
    HttpClient { reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field } => {
                write!(f, "missing required setting: {field}")
            }
            Self::InvalidField { field, reason } => {
                write!(f, "invalid setting {field}: {reason}")
            }
            Self::HttpClient { reason } => {
                write!(f, "failed to build HTTP client: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors from the provider's token and account endpoints.
///
/// Neither operation is retried; a failure fails the single callback request
/// that triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The authorization-code exchange failed.
    TokenExchange { reason: String },
    /// The account fetch failed or returned an unusable document.
    AccountFetch { reason: String },
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenExchange { reason } => {
                write!(f, "token exchange failed: {reason}")
            }
            Self::AccountFetch { reason } => {
                write!(f, "account fetch failed: {reason}")
            }
        }
    }
}

impl std::error::Error for IdentityError {}

/// Errors a gated request can be answered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// The callback `state` does not match a pending authorization.
    StateMismatch,
    /// The callback carried no authorization `code`.
    MissingCode,
    /// The request carried no usable `Host` header, so no callback URL can
    /// be derived for it.
    InvalidHost,
    /// A provider call failed during the callback.
    Identity(IdentityError),
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateMismatch => {
                write!(f, "state parameter does not match the pending authorization")
            }
            Self::MissingCode => {
                write!(f, "callback request carried no authorization code")
            }
            Self::InvalidHost => {
                write!(f, "request carried no usable Host header")
            }
            Self::Identity(error) => {
                write!(f, "{error}")
            }
        }
    }
}

impl std::error::Error for GateError {}

impl From<IdentityError> for GateError {
    fn from(error: IdentityError) -> Self {
        Self::Identity(error)
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::StateMismatch => (StatusCode::FORBIDDEN, "Invalid authorization state"),
            Self::MissingCode => (StatusCode::BAD_REQUEST, "Missing authorization code"),
            Self::InvalidHost => (StatusCode::BAD_REQUEST, "Missing Host header"),
            Self::Identity(error) => {
                tracing::error!("Identity provider call failed: {}", error);
                (StatusCode::BAD_GATEWAY, "Identity provider error")
            }
        };

        (status, message).into_response()
    }
}
