use axum::{Extension, Router, response::Html, routing::get};
use heroku_gate::{Gate, RemoteUser};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    let gate = Gate::new(config.gate).expect("failed to configure the authentication gate");

    let app = gate.wrap(Router::new().route("/", get(greet)));

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.bind);

    axum::serve(listener, app.into_make_service())
        .await
        .expect("server error");
}

/// Greets whoever the gate let through.
async fn greet(user: Option<Extension<RemoteUser>>) -> Html<String> {
    match user {
        Some(Extension(RemoteUser(email))) => Html(format!("<h1>Hello, {email}!</h1>")),
        None => Html("<h1>Hello, anonymous visitor!</h1>".to_string()),
    }
}
