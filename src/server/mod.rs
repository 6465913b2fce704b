pub mod routes;
pub mod websocket;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::analysis::AnalysisFacade;
use crate::pipeline::Pipeline;
use crate::settings::AppConfig;
use crate::stream::SessionRegistry;

/// Multipart framing overhead allowed on top of the frame size limit.
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub facade: Arc<AnalysisFacade>,
    pub registry: SessionRegistry,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, registry: SessionRegistry, config: Arc<AppConfig>) -> Self {
        Self {
            facade: Arc::new(AnalysisFacade::new(Arc::clone(&pipeline))),
            pipeline,
            registry,
            config,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.limits.max_frame_bytes + UPLOAD_OVERHEAD_BYTES;

    Router::new()
        .route("/api/health", get(routes::api_health))
        .route("/api/ocr/health", get(routes::ocr_health))
        .route("/api/ocr/analyze", post(routes::analyze))
        .route("/api/cache", delete(routes::clear_cache))
        .route("/ws/stream", get(websocket::stream_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
