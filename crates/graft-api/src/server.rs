use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use axum::extract::{Path, Query, Request, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::Method;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use contracts::{
    ApiError, CommandResult, ErrorCode, Event, EventType, GraftConfig, GraftStatus, Household,
    QueryResponse, ResidentId, SCHEMA_VERSION_V1,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::{GraftApi, PersistedRunSummary, PersistenceError};

const DEFAULT_PAGE_SIZE: usize = 500;
const MAX_PAGE_SIZE: usize = 5000;
const DEFAULT_SQLITE_PATH: &str = "graft_runs.sqlite";

include!("server/error.rs");
include!("server/state.rs");
include!("server/routes/control.rs");
include!("server/routes/inspect.rs");
include!("server/util.rs");

pub async fn serve(addr: SocketAddr) -> Result<(), ServerError> {
    let state = AppState::new();
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/runs", post(create_run).get(list_runs))
        .route("/api/v1/runs/{run_id}/step", post(step_run))
        .route("/api/v1/runs/{run_id}/status", get(get_status))
        .route("/api/v1/runs/{run_id}/migration", get(get_migration))
        .route("/api/v1/runs/{run_id}/pool", get(get_pool))
        .route("/api/v1/runs/{run_id}/draw", post(draw_household))
        .route("/api/v1/runs/{run_id}/release", post(release_resident))
        .route("/api/v1/runs/{run_id}/timeline", get(get_timeline))
        .layer(middleware::from_fn(cors_middleware))
        .with_state(state)
}

async fn cors_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = Response::new(axum::body::Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests;
