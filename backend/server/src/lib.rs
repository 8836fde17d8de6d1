//! Documentation of the campus site: public marketing pages and the admin dashboard.
//!
//!
//!
//! # General Infrastructure
//! - One hosted project provides both the database (row API) and authentication (auth API)
//! - This server renders page shells and hands each one the rows it needs
//! - Interactive tables and forms are client components; their writes go straight to the row API
//! - Row-level policies on the project decide what a signed-in admin may read
//!
//!
//!
//! # Request Lifecycle
//!
//! **Goal**: Every page does the same small thing, the same way.
//!
//! - Read the session cookies into credentials
//! - Resolve them into a session, refreshing the access token if it is about to expire
//! - Admin page and nobody signed in: redirect to the login path, nothing is queried
//! - Otherwise run at most one read against the row API
//! - Single record missing: 404, or back to the list where the route says so
//! - Render, with any refreshed cookies attached no matter how the page ended
//!
//!
//!
//! # Notes
//!
//! ## Failed reads
//! A table that failed to load still renders, but the props say `loadFailed: true`.
//! An outage should never look like "no data yet".
//!
//! ## Locales
//! Public pages live under `/{locale}` with locale one of `en`, `ru`, `fr`, `es`, `ar`, `zh`.
//! Anything else is a 404. Translations themselves are the client's job.
//!
//!
//!
//! # Setup
//!
//! Environment.
//! ```sh
//! export STORE_URL=https://<project>.example.co
//! export STORE_ANON_KEY=<anon key>     # or /run/secrets/STORE_ANON_KEY
//! export RUST_LOG=server=info,tower_http=info
//! ```
//!
//! Run.
//! ```sh
//! cargo run
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::{future::pending, sync::Arc};

use axum::{
    Router,
    routing::{get, post},
};
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod cookies;
pub mod error;
pub mod locale;
pub mod pages;
pub mod routes;
pub mod session;
pub mod state;
pub mod views;

use config::Config;
use routes::{
    admin_list, admin_new, admin_record, dashboard, fallback, healthz, login, login_form, logout,
    public_home, public_record, public_section, root,
};
use state::AppState;

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = AppState::new(config)?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");

    Ok(())
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route(&state.config.login_path, get(login_form).post(login))
        .route("/auth/logout", post(logout))
        .route("/admin", get(dashboard))
        .route("/admin/{resource}", get(admin_list))
        .route("/admin/{resource}/new", get(admin_new))
        .route("/admin/{resource}/{id}", get(admin_record))
        .route("/{locale}", get(public_home))
        .route("/{locale}/{section}", get(public_section))
        .route("/{locale}/{section}/{key}", get(public_record))
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
