//! OAuth2 authentication gate for axum applications, speaking the Heroku
//! identity platform's dialect.
//!
//! Wrap a router with [`Gate::wrap`] and every request must pass the OAuth2
//! authorization-code flow before the application sees it:
//! - unauthenticated requests are redirected to the provider's authorize
//!   endpoint with a fresh anti-forgery state nonce,
//! - the provider's callback is validated, the code exchanged, and the
//!   account identity fetched and checked against an [`AccessPolicy`],
//! - accepted identities get a sealed session cookie and resume the path
//!   they originally asked for,
//! - later requests replay the cookie and pass straight through, with the
//!   signed-in email injected as a [`RemoteUser`] extension.
//!
//! # Example
//!
//! ```
//! use axum::{Router, extract::Request, routing::get};
//! use heroku_gate::{AccessPolicy, Gate, GateConfig, RemoteUser};
//!
//! let config = GateConfig::builder(
//!     "client-id".to_string(),
//!     "client-secret".to_string(),
//!     "sealing-secret".to_string(),
//! )
//! .policy(AccessPolicy::email_domain("@heroku.com"))
//! .build();
//!
//! let gate = Gate::new(config).expect("valid gate configuration");
//!
//! let app = Router::new().route(
//!     "/",
//!     get(|req: Request| async move {
//!         match req.extensions().get::<RemoteUser>() {
//!             Some(RemoteUser(email)) => format!("Hello, {email}!"),
//!             None => "Hello!".to_string(),
//!         }
//!     }),
//! );
//! let app = gate.wrap(app);
//! # let _ = app;
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod identity;
pub mod session;

// Re-export main types at crate root
pub use config::{GateConfig, GateConfigBuilder};
pub use error::{ConfigError, GateError, IdentityError};
pub use gate::{Gate, RemoteUser, intercept};
pub use identity::{AccessPolicy, IdentityClient, IdentityRecord};
pub use session::{AuthorizationRequest, Session};
