use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::JobState;
use crate::models::render::{DownloadResponse, JobStatusResponse, RenderRequest, SubmitResponse};
use crate::routes::error::ApiError;

/// POST /api/v1/render: validate and enqueue a render job.
pub async fn submit_render(
    State(state): State<AppState>,
    payload: Result<Json<RenderRequest>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let Json(request) = payload?;
    let spec = request.into_spec().map_err(ApiError::Validation)?;

    let job = state.queue.enqueue(spec).await?;
    metrics::counter!("render_jobs_submitted").increment(1);

    tracing::info!(
        job_id = %job.id,
        input_type = %job.spec.input_type,
        "Render job queued"
    );

    Ok(Json(SubmitResponse {
        job_id: job.id,
        status: JobState::Queued,
    }))
}

/// GET /api/v1/status/{id}: current state of a job.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let id = Uuid::parse_str(&id).map_err(|_| ApiError::NotFound)?;
    let job = state.queue.get(id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(job.into()))
}

/// GET /api/v1/download/{id}: artifact reference of a completed job.
pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let id = Uuid::parse_str(&id).map_err(|_| ApiError::NotReady)?;
    let job = state.queue.get(id).await?.ok_or(ApiError::NotReady)?;

    match (job.state, job.result) {
        (JobState::Completed, Some(download_url)) => Ok(Json(DownloadResponse { download_url })),
        _ => Err(ApiError::NotReady),
    }
}
