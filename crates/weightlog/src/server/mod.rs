//! Web front end.
//!
//! A small axum application over a [`RecordStore`]. Every request reads the
//! whole store; store and chart work runs on the blocking pool.

mod handlers;
pub mod pages;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::chart::STATIC_URL_PREFIX;
use crate::client_info::{geolocator_from_config, Geolocator};
use crate::config::{ChartOutput, Config};
use crate::error::Result;
use crate::storage::{open_store, RecordStore};

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Where measurements live.
    pub store: Arc<dyn RecordStore>,
    /// Loaded configuration.
    pub config: Arc<Config>,
    /// Location lookup for `/user_info`.
    pub geolocator: Arc<dyn Geolocator>,
}

impl AppState {
    /// Build state from configuration: open the store and pick a geolocator.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened.
    pub fn from_config(config: Config) -> Result<Self> {
        let store = open_store(&config)?;
        let geolocator = geolocator_from_config(&config)?;
        Ok(Self {
            store,
            config: Arc::new(config),
            geolocator,
        })
    }
}

/// Build the application router.
#[must_use]
pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/", get(handlers::index).post(handlers::submit))
        .route("/entries", get(handlers::entries))
        .route("/delete_entry", post(handlers::delete_entry))
        .route("/percentage_change", get(handlers::percentage_change))
        .route("/plot", get(handlers::plot))
        .route("/user_info", get(handlers::user_info));

    if state.config.chart.output == ChartOutput::File {
        app = app.nest_service(STATIC_URL_PREFIX, ServeDir::new(state.config.static_dir()));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Serve until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        "serving on http://{} ({} store at {})",
        listener.local_addr()?,
        state.store.name(),
        state.store.location().display()
    );

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
