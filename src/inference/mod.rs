//! Inference Module - leaf classifier adapter
//!
//! The classifier itself is opaque: anything that maps an image file to a
//! top-1 class index and confidence. This module turns that raw output into
//! a [`ClassificationResult`] (crop / disease / rounded confidence) and owns
//! the "no prediction" fallback.

pub mod labels;
pub mod onnx;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

pub use labels::LabelTable;
pub use onnx::OnnxClassifier;

/// Separator between crop and disease in classifier labels
pub const LABEL_DELIMITER: &str = "___";

/// Crop reported when a label carries no delimiter
pub const UNKNOWN_CROP: &str = "Unknown";

/// Disease reported when the classifier produced nothing usable
pub const PREDICTION_FAILED: &str = "Prediction failed";

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("failed to load model: {0}")]
    Load(String),

    #[error("invalid label table: {0}")]
    Labels(String),

    #[error("cannot decode image: {0}")]
    Decode(String),

    #[error("inference failed: {0}")]
    Runtime(String),

    #[error("inference cancelled")]
    Cancelled,
}

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Raw top-1 output of a classifier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Top1 {
    pub class_index: usize,
    pub confidence: f32,
}

/// Normalized classification of one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub crop: Option<String>,
    pub disease: String,
    pub confidence: f64,
}

impl ClassificationResult {
    /// Result for an image the classifier could not label
    pub fn prediction_failed() -> Self {
        Self {
            crop: None,
            disease: PREDICTION_FAILED.to_string(),
            confidence: 0.0,
        }
    }

    /// Split `label` into crop and disease and round the confidence
    pub fn from_label(label: &str, confidence: f32) -> Self {
        let (crop, disease) = match label.split_once(LABEL_DELIMITER) {
            Some((crop, disease)) => (crop, disease),
            None => (UNKNOWN_CROP, label),
        };

        Self {
            crop: Some(crop.to_string()),
            disease: disease.to_string(),
            confidence: round3(f64::from(confidence).clamp(0.0, 1.0)),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.crop.is_none() && self.disease == PREDICTION_FAILED
    }
}

/// Round half away from zero to 3 decimals
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

// ============================================================================
// CANCELLATION
// ============================================================================

type CancelHook = Box<dyn FnOnce() + Send>;

/// Cancellation flag shared between a request and its inference call.
///
/// A backend checks [`Cancellation::is_cancelled`] while it waits and may
/// register a hook that aborts work already in flight.
#[derive(Default)]
pub struct Cancellation {
    cancelled: AtomicBool,
    hook: Mutex<Option<CancelHook>>,
}

impl Cancellation {
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let hook = self.hook.lock().take();
        if let Some(hook) = hook {
            hook();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Run `hook` on cancel, or right away if already cancelled.
    /// Replaces any earlier hook.
    pub fn on_cancel(&self, hook: impl FnOnce() + Send + 'static) {
        let mut slot = self.hook.lock();
        if self.is_cancelled() {
            drop(slot);
            hook();
            return;
        }
        *slot = Some(Box::new(hook));
    }

    /// Forget the registered hook once the work it aborts has finished
    pub fn clear(&self) {
        self.hook.lock().take();
    }
}

/// Poll interval while waiting for a busy model
const LOCK_POLL: Duration = Duration::from_millis(25);

/// Lock `mutex`, giving up once `cancel` fires
pub fn lock_unless_cancelled<'a, T>(
    mutex: &'a Mutex<T>,
    cancel: &Cancellation,
) -> Result<MutexGuard<'a, T>, InferenceError> {
    loop {
        if cancel.is_cancelled() {
            return Err(InferenceError::Cancelled);
        }
        if let Some(guard) = mutex.try_lock_for(LOCK_POLL) {
            return Ok(guard);
        }
    }
}

// ============================================================================
// CLASSIFIER TRAIT
// ============================================================================

/// Image classifier consumed as a black box
pub trait Classifier: Send + Sync {
    /// Top-1 class for the image at `image`; `Ok(None)` when the model
    /// produced no class scores. Implementations should stop early with
    /// [`InferenceError::Cancelled`] once `cancel` fires.
    fn top1(&self, image: &Path, cancel: &Cancellation) -> Result<Option<Top1>, InferenceError>;

    /// Label for a class index
    fn label(&self, class_index: usize) -> Option<&str>;

    /// Number of known labels
    fn label_count(&self) -> usize;

    /// Human readable model identifier
    fn name(&self) -> &str;
}

// ============================================================================
// STATS
// ============================================================================

#[derive(Debug, Default)]
pub struct InferenceStats {
    count: AtomicU64,
    failures: AtomicU64,
    latency_us: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub scans_total: u64,
    pub prediction_failures: u64,
    pub avg_inference_ms: f64,
}

impl InferenceStats {
    fn record(&self, elapsed: Duration, failed: bool) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.latency_us.fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        if failed {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let sum = self.latency_us.load(Ordering::Relaxed);
        let avg = if count > 0 { (sum as f64 / count as f64) / 1000.0 } else { 0.0 };

        StatsSnapshot {
            scans_total: count,
            prediction_failures: self.failures.load(Ordering::Relaxed),
            avg_inference_ms: avg,
        }
    }
}

// ============================================================================
// ADAPTER
// ============================================================================

/// Wraps a [`Classifier`] and always yields a [`ClassificationResult`]
#[derive(Clone)]
pub struct InferenceAdapter {
    classifier: Arc<dyn Classifier>,
    timeout: Duration,
    stats: Arc<InferenceStats>,
}

impl InferenceAdapter {
    pub fn new(classifier: Arc<dyn Classifier>, timeout: Duration) -> Self {
        Self {
            classifier,
            timeout,
            stats: Arc::new(InferenceStats::default()),
        }
    }

    pub fn model_name(&self) -> &str {
        self.classifier.name()
    }

    pub fn label_count(&self) -> usize {
        self.classifier.label_count()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Classify on the current thread. Never fails.
    pub fn classify_blocking(&self, image: &Path) -> ClassificationResult {
        self.classify_with(image, &Cancellation::default())
    }

    fn classify_with(&self, image: &Path, cancel: &Cancellation) -> ClassificationResult {
        match self.classifier.top1(image, cancel) {
            Ok(Some(top)) => self.resolve(top),
            Ok(None) => {
                tracing::debug!("No class scores for {}", image.display());
                ClassificationResult::prediction_failed()
            }
            Err(InferenceError::Cancelled) => {
                tracing::debug!("Classification of {} cancelled", image.display());
                ClassificationResult::prediction_failed()
            }
            Err(e) => {
                tracing::warn!("Classifier error on {}: {}", image.display(), e);
                ClassificationResult::prediction_failed()
            }
        }
    }

    /// Classify on the blocking pool, bounded by the configured timeout.
    /// On timeout the classifier is cancelled so the blocking thread is
    /// handed back instead of finishing work nobody waits for.
    pub async fn classify(&self, image: PathBuf) -> ClassificationResult {
        let start = Instant::now();
        let cancel = Arc::new(Cancellation::default());

        let adapter = self.clone();
        let task_cancel = cancel.clone();
        let task = tokio::task::spawn_blocking(move || adapter.classify_with(&image, &task_cancel));

        let result = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!("Inference task aborted: {}", e);
                ClassificationResult::prediction_failed()
            }
            Err(_) => {
                tracing::warn!("Inference exceeded {:?}, cancelling", self.timeout);
                cancel.cancel();
                ClassificationResult::prediction_failed()
            }
        };

        self.stats.record(start.elapsed(), result.is_failure());
        result
    }

    fn resolve(&self, top: Top1) -> ClassificationResult {
        if !top.confidence.is_finite() {
            tracing::warn!("Non-finite confidence for class {}", top.class_index);
            return ClassificationResult::prediction_failed();
        }

        match self.classifier.label(top.class_index) {
            Some(label) => ClassificationResult::from_label(label, top.confidence),
            None => {
                tracing::warn!(
                    "Class index {} outside label table ({} labels)",
                    top.class_index,
                    self.classifier.label_count()
                );
                ClassificationResult::prediction_failed()
            }
        }
    }
}
