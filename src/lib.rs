//! ONLYTECH Leaf Scan API
//!
//! Classifies an uploaded leaf photo and attaches static advisories.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                    ONLYTECH SCAN API                       │
//! ├────────────────────────────────────────────────────────────┤
//! │  POST /scan ──► UploadStore ──► InferenceAdapter           │
//! │                  (uuid key)      (ONNX classifier)         │
//! │                                      │                     │
//! │                                      ▼                     │
//! │                               AdvisoryBook                 │
//! │             (treatment / safety / market / sustainability) │
//! │                                      │                     │
//! │                                      ▼                     │
//! │                                ScanResponse                │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod advisory;
pub mod config;
pub mod error;
pub mod handlers;
pub mod inference;
pub mod storage;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
    compression::CompressionLayer,
};

pub use error::{AppError, AppResult};

use advisory::AdvisoryBook;
use config::Config;
use inference::{InferenceAdapter, LabelTable, OnnxClassifier};
use storage::UploadStore;

/// Shared application state, built once at startup
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub inference: InferenceAdapter,
    pub advisories: Arc<AdvisoryBook>,
    pub uploads: UploadStore,
}

impl AppState {
    pub fn new(
        config: Config,
        inference: InferenceAdapter,
        advisories: AdvisoryBook,
        uploads: UploadStore,
    ) -> Self {
        Self {
            config: Arc::new(config),
            inference,
            advisories: Arc::new(advisories),
            uploads,
        }
    }

    /// Load labels, model, advisories and the upload area from `config`
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let inference = load_inference(&config)?;
        let advisories = load_advisories(&config)?;
        let uploads = UploadStore::open(&config.upload_dir, config.upload_retention)
            .with_context(|| format!("creating upload dir {}", config.upload_dir.display()))?;

        Ok(Self::new(config, inference, advisories, uploads))
    }
}

/// ONNX classifier wrapped in the inference adapter
pub fn load_inference(config: &Config) -> anyhow::Result<InferenceAdapter> {
    let labels = config.labels_path.as_deref().map(LabelTable::from_file).transpose()?;
    let classifier = OnnxClassifier::load(&config.model_path, labels, config.image_size)?;
    Ok(InferenceAdapter::new(Arc::new(classifier), config.inference_timeout))
}

/// Built-in advisories, optionally overridden from `ADVISORY_PATH`
pub fn load_advisories(config: &Config) -> anyhow::Result<AdvisoryBook> {
    match &config.advisory_path {
        Some(path) => {
            let book = AdvisoryBook::from_json_file(path)?;
            tracing::info!("Advisory tables loaded from {}", path.display());
            Ok(book)
        }
        None => Ok(AdvisoryBook::builtin()),
    }
}

/// Create the router with all routes, CORS and tracing
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::check))
        .route(
            "/scan",
            post(handlers::scan::scan_leaf).layer(DefaultBodyLimit::max(body_limit)),
        )
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Allow-listed origins, any method and header, no credentials.
/// `*` is not an origin: `AllowOrigin::list` rejects it, so it is skipped.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter(|o| {
            let wildcard = o.trim() == "*";
            if wildcard {
                tracing::warn!("Ignoring wildcard CORS origin; list explicit origins instead");
            }
            !wildcard
        })
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_credentials(false)
}
