//! Upload session handlers.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use attest_core::SessionId;
use attest_upload::file_header;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Actor recorded in the audit trail. The control plane carries no user
/// identity of its own; authentication lives in front of it.
const AUDIT_ACTOR: &str = "system";

/// Response for session creation.
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub success: bool,
    pub session_id: String,
    /// Chunk size clients should split files into.
    pub chunk_size: u64,
}

/// Response for a stored chunk.
#[derive(Debug, Serialize)]
pub struct ChunkResponse {
    pub success: bool,
    pub chunks_received: u32,
    pub total_chunks: u32,
    pub complete: bool,
}

/// Response for a status query.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub session_id: String,
    pub chunks_received: u32,
    pub total_chunks: u32,
    pub filename: String,
    pub complete: bool,
}

/// Response for a completed (assembled and validated) upload.
#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub success: bool,
    pub session_id: String,
    pub filename: String,
    pub mime_type: String,
}

/// Response for a cancelled upload.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub message: String,
}

/// Query parameters accompanying a chunk upload.
#[derive(Debug, Deserialize)]
pub struct ChunkParams {
    /// Total number of chunks for this upload.
    pub total: u32,
    /// Original filename; only honored alongside chunk 0.
    pub filename: Option<String>,
}

fn parse_session_id(raw: &str) -> ApiResult<SessionId> {
    SessionId::parse(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Record an audit entry without failing the request if the write fails.
async fn record_audit(state: &AppState, action: &str, session_id: &SessionId, detail: String) {
    if let Err(e) = state
        .audit
        .record(
            AUDIT_ACTOR,
            action,
            "upload",
            &session_id.to_string(),
            Some(&detail),
        )
        .await
    {
        tracing::warn!(
            session_id = %session_id,
            action,
            error = %e,
            "failed to record audit entry"
        );
    }
}

/// POST /api/uploads - create a new upload session.
#[tracing::instrument(skip(state))]
pub async fn create_session(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<CreateSessionResponse>)> {
    let session_id = state.store.create_session().await?;

    record_audit(
        &state,
        "Create Upload Session",
        &session_id,
        format!("Created chunked upload session {session_id}"),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            success: true,
            session_id: session_id.to_string(),
            chunk_size: state.config.upload.chunk_size,
        }),
    ))
}

/// PUT /api/uploads/{session_id}/chunks/{chunk_index} - store one chunk.
///
/// The chunk bytes are the request body; `total` and the optional
/// `filename` ride in the query string.
#[tracing::instrument(skip(state, body), fields(session_id = %session_id, chunk_index))]
pub async fn upload_chunk(
    State(state): State<AppState>,
    Path((session_id, chunk_index)): Path<(String, u32)>,
    Query(params): Query<ChunkParams>,
    body: Bytes,
) -> ApiResult<Json<ChunkResponse>> {
    let session_id = parse_session_id(&session_id)?;

    if body.is_empty() {
        return Err(ApiError::BadRequest("empty chunk".to_string()));
    }
    if body.len() as u64 > state.config.upload.max_chunk_size {
        return Err(ApiError::BadRequest(format!(
            "chunk of {} bytes exceeds maximum {}",
            body.len(),
            state.config.upload.max_chunk_size
        )));
    }
    if params.total == 0 {
        return Err(ApiError::BadRequest(
            "total must be at least 1".to_string(),
        ));
    }

    let filename = if chunk_index == 0 {
        params.filename.as_deref()
    } else {
        None
    };

    let metadata = state
        .store
        .save_chunk(&session_id, chunk_index, params.total, body, filename)
        .await?;

    Ok(Json(ChunkResponse {
        success: true,
        chunks_received: metadata.chunks_received,
        total_chunks: metadata.total_chunks,
        complete: metadata.complete,
    }))
}

/// GET /api/uploads/{session_id} - session status snapshot.
#[tracing::instrument(skip(state), fields(session_id = %session_id))]
pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let session_id = parse_session_id(&session_id)?;
    let metadata = state.store.status(&session_id).await?;

    Ok(Json(StatusResponse {
        success: true,
        session_id: session_id.to_string(),
        chunks_received: metadata.chunks_received,
        total_chunks: metadata.total_chunks,
        filename: metadata.filename,
        complete: metadata.complete,
    }))
}

/// POST /api/uploads/{session_id}/complete - assemble and validate.
///
/// Assembles the chunks into the final file, then sniffs its magic numbers
/// against the MIME allow-list. A file that fails validation never survives:
/// the session is cleaned up before the error response goes out.
#[tracing::instrument(skip(state), fields(session_id = %session_id))]
pub async fn complete_upload(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<CompleteResponse>> {
    let session_id = parse_session_id(&session_id)?;

    let assembled = state.store.assemble(&session_id).await?;
    let header = file_header(&assembled.path).await?;
    let (allowed, detected) = state.mime_policy.check(&header);

    let mime_type = match detected {
        Some(mime) if allowed => mime.to_string(),
        _ => {
            let detected = detected.unwrap_or("unknown");
            if let Err(e) = state.store.cleanup(&session_id, false).await {
                tracing::error!(
                    session_id = %session_id,
                    error = %e,
                    "failed to clean up rejected upload"
                );
            }
            return Err(ApiError::BadRequest(format!(
                "file type validation failed: detected type {detected:?} is not allowed"
            )));
        }
    };

    record_audit(
        &state,
        "Complete Upload",
        &session_id,
        format!("Completed chunked upload for file {}", assembled.filename),
    )
    .await;

    Ok(Json(CompleteResponse {
        success: true,
        session_id: session_id.to_string(),
        filename: assembled.filename,
        mime_type,
    }))
}

/// POST /api/uploads/{session_id}/cancel - cancel and clean up.
///
/// Cancelling a session that no longer exists still succeeds.
#[tracing::instrument(skip(state), fields(session_id = %session_id))]
pub async fn cancel_upload(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    let session_id = parse_session_id(&session_id)?;
    state.store.cleanup(&session_id, false).await?;

    record_audit(
        &state,
        "Cancel Upload",
        &session_id,
        format!("Cancelled chunked upload session {session_id}"),
    )
    .await;

    Ok(Json(CancelResponse {
        success: true,
        message: "upload cancelled".to_string(),
    }))
}
