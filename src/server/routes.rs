use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Serialize;

use super::AppState;
use crate::cache::CacheStats;
use crate::stream::CompletePayload;
use crate::validation::validate_frame;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Serialize)]
pub struct ApiHealth {
    pub message: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct OcrHealth {
    pub status: &'static str,
    pub model_loaded: bool,
    pub language: String,
    pub active_sessions: usize,
    pub cache: CacheStats,
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

fn failure(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            success: false,
            error: error.into(),
        }),
    )
        .into_response()
}

pub async fn api_health() -> Json<ApiHealth> {
    Json(ApiHealth {
        message: "ClassSight API is running",
        version: env!("CARGO_PKG_VERSION"),
        status: "healthy",
    })
}

pub async fn ocr_health(State(state): State<AppState>) -> Json<OcrHealth> {
    let recognition = state.pipeline.recognition();
    let ready = recognition.is_ready();
    Json(OcrHealth {
        status: if ready { "ready" } else { "initializing" },
        model_loaded: ready,
        language: recognition.language().to_string(),
        active_sessions: state.registry.active_count(),
        cache: state.pipeline.cache().stats(),
    })
}

/// Single-shot analysis of the multipart field `file`.
pub async fn analyze(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut upload: Option<Bytes> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => match field.bytes().await {
                Ok(bytes) => {
                    upload = Some(bytes);
                    break;
                }
                Err(err) => return failure(StatusCode::BAD_REQUEST, format!("Invalid upload: {err}")),
            },
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(err) => return failure(StatusCode::BAD_REQUEST, format!("Invalid upload: {err}")),
        }
    }

    let Some(frame) = upload else {
        return failure(StatusCode::BAD_REQUEST, "Missing multipart field 'file'");
    };
    if let Err(err) = validate_frame(&frame, state.config.limits.max_frame_bytes) {
        log_warn!("rejected upload of {} bytes: {err}", frame.len());
        return failure(StatusCode::BAD_REQUEST, err.to_string());
    }

    match state.facade.analyze(frame).await {
        Ok(analyzed) => Json(CompletePayload {
            result: analyzed.result,
            origin: analyzed.origin,
        })
        .into_response(),
        Err(err) => {
            log_warn!("upload analysis failed: {err}");
            failure(StatusCode::INTERNAL_SERVER_ERROR, err.user_message())
        }
    }
}

pub async fn clear_cache(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cleared = state.pipeline.cache().len();
    state.pipeline.clear_caches();
    log_info!("cache cleared ({} entries)", cleared);
    Json(serde_json::json!({ "success": true, "cleared": cleared }))
}
