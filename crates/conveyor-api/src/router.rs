//! Gateway routes
//!
//! - `GET /` - liveness message
//! - `GET /healthz` - health check
//! - `POST /upload_file/` - multipart upload of a Dockerfile (field `file`)
//! - `GET /status/` - every job, or one job with `?job_id=<id>`

use std::sync::Arc;

use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::debug;

use conveyor_pipeline::{Accepted, JobId, JobService};

use crate::error::{Error, Result};

/// Multipart field carrying the uploaded file
pub const UPLOAD_FIELD: &str = "file";

/// Message returned by the root route
pub const SERVICE_UP_MESSAGE: &str = "Container execution service up for work.";

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    /// Submission and status service
    pub service: Arc<JobService>,
}

/// Query parameters of `GET /status/`
#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    /// Restrict the answer to one job
    pub job_id: Option<String>,
}

/// Build the gateway router
pub fn router(service: Arc<JobService>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/healthz", get(|| async { "ok" }))
        .route("/upload_file/", post(upload_handler))
        .route("/status/", get(status_handler))
        .with_state(AppState { service })
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "msg": SERVICE_UP_MESSAGE }))
}

async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Accepted>)> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            debug!(field = ?field.name(), "ignoring multipart field");
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let content = field.bytes().await?;
        let accepted = state.service.submit(&filename, &content).await?;
        return Ok((StatusCode::ACCEPTED, Json(accepted)));
    }

    Err(Error::BadRequest(format!(
        "missing multipart field '{}'",
        UPLOAD_FIELD
    )))
}

async fn status_handler(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Response> {
    match query.job_id {
        Some(id) => {
            let job = state
                .service
                .get_status(&JobId::new(id.as_str()))
                .ok_or(Error::JobNotFound(id))?;
            Ok(Json(job).into_response())
        }
        None => Ok(Json(state.service.list_statuses()).into_response()),
    }
}
