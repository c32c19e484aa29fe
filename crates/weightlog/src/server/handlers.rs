//! Request handlers.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Form;
use serde::Deserialize;
use tracing::{error, info, warn};

use super::{pages, AppState};
use crate::aggregate::{compute_change, compute_series};
use crate::chart;
use crate::client_info::ClientReport;
use crate::error::{Error, Result};
use crate::measurement::{parse_value, validate_subject, Measurement};

/// Error returned from a handler.
///
/// Input errors become a 400 page; anything else is logged and rendered as
/// a generic 500 page.
#[derive(Debug)]
pub struct WebError(Error);

impl From<Error> for WebError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        if self.0.is_invalid_input() {
            warn!("rejected request: {}", self.0);
            let page = pages::message("Bad request", &self.0.to_string());
            return (StatusCode::BAD_REQUEST, Html(page)).into_response();
        }

        error!("request failed: {}", self.0);
        let page = pages::message(
            "Something went wrong",
            "The server could not complete the request.",
        );
        (StatusCode::INTERNAL_SERVER_ERROR, Html(page)).into_response()
    }
}

type PageResult = std::result::Result<Html<String>, WebError>;

/// Run blocking store or chart work off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::internal(format!("blocking task failed: {e}")))?
}

/// Fields of the submission form. Missing fields arrive empty and are
/// rejected by validation.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EntryForm {
    name: String,
    weight: String,
}

/// Fields of a delete request.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeleteForm {
    name: String,
    weight: String,
    timestamp: String,
}

#[allow(clippy::unused_async)]
pub async fn index() -> Html<String> {
    Html(pages::index())
}

pub async fn submit(State(state): State<AppState>, Form(form): Form<EntryForm>) -> PageResult {
    let subject = validate_subject(&form.name)?;
    let value = parse_value(&form.weight)?;
    let record = Measurement::new(subject, value);

    let store = state.store.clone();
    let stored = record.clone();
    blocking(move || store.append(&stored)).await?;

    Ok(Html(pages::submitted(&record)))
}

pub async fn entries(State(state): State<AppState>) -> PageResult {
    let store = state.store.clone();
    let records = blocking(move || store.read_all()).await?;
    Ok(Html(pages::entries(&records)))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    Form(form): Form<DeleteForm>,
) -> PageResult {
    let record = Measurement::from_input(&form.name, &form.weight, &form.timestamp)?;

    let store = state.store.clone();
    let target = record.clone();
    let removed = blocking(move || store.delete_exact(&target)).await?;
    if !removed {
        info!("no stored entry matched {record}");
    }

    Ok(Html(pages::deleted(&record, removed)))
}

pub async fn percentage_change(State(state): State<AppState>) -> PageResult {
    let store = state.store.clone();
    let policy = state.config.aggregation.order;
    let result = blocking(move || compute_change(&store.read_all()?, policy)).await;

    match result {
        Ok(report) => Ok(Html(pages::change_report(&report))),
        Err(e) if e.is_insufficient_data() => Ok(Html(pages::message(
            "Percentage change",
            pages::NOT_ENOUGH_FOR_CHANGE,
        ))),
        Err(e) => Err(e.into()),
    }
}

pub async fn plot(State(state): State<AppState>) -> PageResult {
    let store = state.store.clone();
    let config = state.config.clone();
    let result = blocking(move || {
        let points = compute_series(&store.read_all()?)?;
        let svg = chart::render_svg(&points, config.chart.width, config.chart.height)?;
        chart::publish(&svg, &config)
    })
    .await;

    match result {
        Ok(artifact) => Ok(Html(pages::plot(artifact.src()))),
        Err(e) if e.is_insufficient_data() => Ok(Html(pages::message(
            "Percent change over time",
            pages::NOT_ENOUGH_FOR_PLOT,
        ))),
        Err(e) => Err(e.into()),
    }
}

pub async fn user_info(State(state): State<AppState>, request: Request) -> Html<String> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let report = ClientReport::gather(request.headers(), peer, state.geolocator.as_ref()).await;

    let log_path = state.config.client_log_path();
    let entry = report.clone();
    if let Err(e) = blocking(move || entry.append_to(&log_path)).await {
        warn!("failed to write client log: {e}");
    }

    Html(pages::user_info(&report))
}
