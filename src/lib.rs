pub mod analysis;
pub mod cache;
pub mod explanation;
pub mod fingerprint;
pub mod models;
pub mod pipeline;
pub mod recognition;
pub mod server;
pub mod settings;
pub mod stream;
pub mod utils;
pub mod validation;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::time::Duration;

use cache::{spawn_sweeper, ExplanationCache, ResultCache, Sweep};
use explanation::{ExplanationAdapter, ExplanationModel, GeminiClient};
use pipeline::Pipeline;
use recognition::{
    RecognitionAdapter, RecognitionError, RecognizerLoader, TesseractEngine, TextRecognizer,
};
use settings::AppConfig;
use stream::SessionRegistry;

const CACHE_SWEEP_INTERVAL_SECS: u64 = 60;

/// Builds every shared component from `config`. Nothing is loaded yet; the
/// recognition engine loads on first use or via `initialize()`.
pub fn build_pipeline(config: &AppConfig) -> Result<Arc<Pipeline>> {
    let cache = Arc::new(ResultCache::new(config.cache_config()));

    let binary = config.ocr.binary.clone();
    let language = config.ocr.language.clone();
    let timeout = Duration::from_secs(config.ocr.timeout_secs);
    let loader: RecognizerLoader =
        Box::new(move || -> Result<Arc<dyn TextRecognizer>, RecognitionError> {
            Ok(Arc::new(TesseractEngine::load(
                binary.clone(),
                &language,
                timeout,
            )?))
        });
    let recognition = Arc::new(RecognitionAdapter::new(
        loader,
        config.ocr.language.clone(),
        config.ocr.max_dimension,
    ));

    let model: Arc<dyn ExplanationModel> = Arc::new(
        GeminiClient::new(config.gemini_config()).context("failed to build explanation client")?,
    );
    let memo = ExplanationCache::new(config.cache_config());
    let explanation = Arc::new(ExplanationAdapter::new(model, Some(memo)));

    Ok(Arc::new(Pipeline::new(
        cache,
        recognition,
        explanation,
        config.pipeline_options(),
    )))
}

pub async fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("ClassSight starting up...");

    let config = Arc::new(AppConfig::load().context("failed to load configuration")?);
    let pipeline = build_pipeline(&config)?;
    let registry = SessionRegistry::new();

    // Load the recognizer in the background so the server accepts connections
    // while it warms up; the health endpoint reports "initializing" meanwhile.
    {
        let pipeline = Arc::clone(&pipeline);
        tokio::task::spawn_blocking(move || {
            if let Err(err) = pipeline.recognition().initialize() {
                log::error!("OCR engine unavailable: {err}");
            }
        });
    }

    let sweeper = spawn_sweeper(
        vec![pipeline_cache(&pipeline)],
        Duration::from_secs(CACHE_SWEEP_INTERVAL_SECS),
        registry.shutdown_token(),
    );

    let state = server::AppState::new(Arc::clone(&pipeline), registry.clone(), Arc::clone(&config));
    let app = server::router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    log::info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry.clone()))
        .await
        .context("server error")?;

    registry.cancel_all();
    if let Err(err) = sweeper.await {
        log::warn!("cache sweeper failed to join: {err}");
    }
    log::info!("ClassSight stopped");
    Ok(())
}

fn pipeline_cache(pipeline: &Arc<Pipeline>) -> Arc<dyn Sweep> {
    Arc::new(PipelineCaches(Arc::clone(pipeline)))
}

/// Sweeps the result cache and the explanation memo together.
struct PipelineCaches(Arc<Pipeline>);

impl Sweep for PipelineCaches {
    fn purge_expired(&self) -> usize {
        let memo = self
            .0
            .explanation()
            .memo()
            .map(|memo| memo.purge_expired())
            .unwrap_or(0);
        self.0.cache().purge_expired() + memo
    }
}

async fn shutdown_signal(registry: SessionRegistry) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    log::info!("shutdown requested");
    registry.cancel_all();
}
