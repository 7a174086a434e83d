//! HTTP admin surface.
//!
//! Decodes request bodies into registry inputs, calls the registries and
//! encodes the results. Everything interesting happens in
//! [`StubRegistry`] and [`UqlRegistry`].

use crate::config::{FindRequest, GlobalSettings, Output, Stub};
use crate::error::{FindError, ValidationError};
use crate::registry::StubRegistry;
use crate::uql::{Response as UqlResponse, UqlRegistration, UqlRegistry};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Shared state handed to every handler. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub stubs: Arc<StubRegistry>,
    pub uql: Arc<UqlRegistry>,
    pub settings: Arc<GlobalSettings>,
}

impl AppState {
    pub fn new(stubs: StubRegistry, uql: UqlRegistry, settings: GlobalSettings) -> Self {
        Self {
            stubs: Arc::new(stubs),
            uql: Arc::new(uql),
            settings: Arc::new(settings),
        }
    }
}

/// Failure of an admin request, rendered as a plain-text body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Find(#[from] FindError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Decode(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Find(FindError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Find(FindError::Evaluator(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Assembles the router.
///
/// Routes:
/// - `POST /add` -- register a stub
/// - `GET /` -- list stubs
/// - `POST /find` -- look up a stub output
/// - `GET /clear` -- clear stubs and UQL responses
/// - `POST /uql/add` -- register a UQL response
/// - `GET /uql/` -- list UQL responses
/// - `POST /uql/monitoring/v1dev/query/execute` -- answer a raw UQL query
///
/// Failures carry a plain-text message: 400 for undecodable bodies and
/// rejected stubs, 404 when no stub matches, 500 when a stored rule cannot
/// be evaluated.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_stubs))
        .route("/add", post(add_stub))
        .route("/find", post(find_stub))
        .route("/clear", get(clear_all))
        .route("/uql/", get(list_uql))
        .route("/uql/add", post(add_uql))
        .route("/uql/monitoring/v1dev/query/execute", post(execute_uql))
        .with_state(state)
}

/// Serves the router on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "Serving stub admin on http://{}", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Stub server stopped");
    Ok(())
}

async fn add_stub(State(state): State<AppState>, body: Bytes) -> Result<&'static str, ApiError> {
    let stub: Stub = serde_json::from_slice(&body)?;
    state.stubs.add(stub)?;
    Ok("Success add stub")
}

async fn list_stubs(State(state): State<AppState>) -> Json<Vec<Stub>> {
    Json(state.stubs.list())
}

async fn find_stub(State(state): State<AppState>, body: Bytes) -> Result<Json<Output>, ApiError> {
    let request: FindRequest = serde_json::from_slice(&body)?;

    match state.stubs.find(&request) {
        Ok(output) => {
            if state.settings.log_matches {
                info!(
                    service = %request.service,
                    method = %request.method,
                    "Request matched stub"
                );
            }
            Ok(Json(output))
        }
        Err(e) => {
            if !e.is_not_found() || state.settings.log_unmatched {
                warn!(
                    service = %request.service,
                    method = %request.method,
                    error = %e,
                    "Stub lookup failed"
                );
            }
            Err(e.into())
        }
    }
}

async fn clear_all(State(state): State<AppState>) -> &'static str {
    state.stubs.clear();
    state.uql.clear();
    "OK"
}

async fn add_uql(State(state): State<AppState>, body: Bytes) -> Result<&'static str, ApiError> {
    let registration: UqlRegistration = serde_json::from_slice(&body)?;
    state.uql.put(registration.query, registration.response);
    Ok("Updated uql response")
}

async fn list_uql(State(state): State<AppState>) -> Json<BTreeMap<String, Vec<UqlResponse>>> {
    Json(state.uql.list())
}

/// Answers with the responses of the last stored query found in the body.
async fn execute_uql(State(state): State<AppState>, body: Bytes) -> Json<Vec<UqlResponse>> {
    let raw = String::from_utf8_lossy(&body);
    let mut hits = state.uql.lookup_by_substring(&raw);

    if hits.len() > 1 {
        let queries: Vec<_> = hits.iter().map(|h| h.query.as_str()).collect();
        warn!(?queries, "Several UQL responses match, answering with the last");
    } else if hits.is_empty() && state.settings.log_unmatched {
        warn!(query = %raw, "No UQL response matches");
    }

    Json(hits.pop().map(|hit| hit.responses).unwrap_or_default())
}
